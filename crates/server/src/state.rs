//! Per-generation worker context and router state.

use crate::controller::Controller;
use crate::retrieval::RetrievalClient;
use pantry_core::config::AppConfig;
use pantry_core::RetrievalConfig;
use pantry_storage::ContentCache;
use std::sync::Arc;

/// Everything one worker generation needs to serve requests.
///
/// Built by `install`, promoted by `activate`, and held by each in-flight
/// request for its whole lifetime.
pub struct WorkerContext {
    /// Monotonic generation number, starting at 1.
    pub generation: u64,
    /// Retrieval parameters loaded at install. Never changes afterwards.
    pub retrieval: RetrievalConfig,
    /// Retrieval client built from `retrieval`.
    pub client: Arc<dyn RetrievalClient>,
    /// Content cache shared by all generations.
    pub cache: ContentCache,
}

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The interception controller.
    pub controller: Arc<Controller>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, controller: Arc<Controller>) -> Self {
        Self { config, controller }
    }
}
