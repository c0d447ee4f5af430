//! HTTP request handlers.

pub mod intercept;
pub mod status;

pub use intercept::*;
pub use status::*;
