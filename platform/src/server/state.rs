//! Server state

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bus::MessageBus;
use crate::dispatch::Dispatcher;
use crate::relay;
use crate::router::SiteRouter;
use crate::store::fs::FsStore;

/// State shared across API handlers
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
    pub bus: Arc<dyn MessageBus>,
    pub relay_options: relay::Options,
    /// Relay sessions end when this fires
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ServerState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        bus: Arc<dyn MessageBus>,
        relay_options: relay::Options,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            dispatcher,
            bus,
            relay_options,
            shutdown_tx,
        }
    }
}

/// State of the site listener
pub struct SiteState {
    pub router: Arc<SiteRouter>,
    /// Filesystem store served under `/artifacts`, if any
    pub artifacts: Option<FsStore>,
}

impl SiteState {
    pub fn new(router: Arc<SiteRouter>) -> Self {
        Self {
            router,
            artifacts: None,
        }
    }

    pub fn with_artifacts(mut self, store: FsStore) -> Self {
        self.artifacts = Some(store);
        self
    }
}
