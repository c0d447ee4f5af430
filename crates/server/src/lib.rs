//! Content-addressed interception proxy.
//!
//! This crate provides the request path of Pantry:
//! - Transfer queue bridging pushed chunks to pulled response bodies
//! - Retrieval client boundary and the HTTP provider client
//! - Worker lifecycle (install/activate) and the interception controller
//! - HTTP router, status endpoints and Prometheus metrics

pub mod bootstrap;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod retrieval;
pub mod routes;
pub mod state;
pub mod transfer;

pub use controller::Controller;
pub use error::{ProxyError, ProxyResult, TransferError};
pub use lifecycle::WorkerLifecycleState;
pub use routes::create_router;
pub use state::{AppState, WorkerContext};
pub use transfer::TransferQueue;
