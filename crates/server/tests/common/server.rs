//! Server test utilities.

use super::fixtures::UPSTREAM;
use super::mocks::{RecordingNetwork, Script, StubBuilder, StubClient};
use pantry_core::config::AppConfig;
use pantry_server::bootstrap::start_worker;
use pantry_server::{AppState, Controller, create_router};
use pantry_storage::{ContentCache, Datastore, MemoryDatastore};
use std::sync::Arc;

/// A controller wired to scripted collaborators.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub controller: Arc<Controller>,
    pub client: Arc<StubClient>,
    pub builder: Arc<StubBuilder>,
    pub network: Arc<RecordingNetwork>,
    pub datastore: Arc<dyn Datastore>,
    pub config: Arc<AppConfig>,
}

#[allow(dead_code)]
impl TestServer {
    /// Config used by every test server: in-memory storage, fixed origin and upstream.
    pub fn config() -> AppConfig {
        let mut config = AppConfig::for_testing();
        config.server.upstream = Some(UPSTREAM.to_string());
        config
    }

    /// Build without installing anything.
    pub fn unstarted(config: AppConfig, script: Script) -> Self {
        let client = StubClient::new(script);
        let builder = StubBuilder::new(client.clone());
        let network = RecordingNetwork::new();
        let datastore: Arc<dyn Datastore> = Arc::new(MemoryDatastore::new());
        let config = Arc::new(config);

        let controller = Arc::new(
            Controller::new(
                &config.server,
                datastore.clone(),
                builder.clone(),
                network.clone(),
            )
            .expect("Failed to create controller"),
        );
        let router = create_router(AppState::new(config.clone(), controller.clone()));

        Self {
            router,
            controller,
            client,
            builder,
            network,
            datastore,
            config,
        }
    }

    /// Build, register, install and activate.
    pub async fn start(script: Script) -> Self {
        Self::start_with_config(Self::config(), script).await
    }

    pub async fn start_with_config(config: AppConfig, script: Script) -> Self {
        let server = Self::unstarted(config, script);
        start_worker(&server.controller, &server.config.worker)
            .await
            .expect("Failed to start worker");
        server
    }

    pub fn cache(&self) -> &ContentCache {
        self.controller.cache()
    }
}
