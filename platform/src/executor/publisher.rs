//! Publishes a build's log events to its bus channel

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::bus::channels::Channels;
use crate::bus::MessageBus;
use crate::models::deployment::DeploymentId;
use crate::models::event::{LogEvent, Severity};

/// Best-effort event publisher bound to one deployment's channel.
///
/// Every event is also written to the local log. A failed publish is logged
/// and otherwise ignored; the build goes on without its audience.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    channel: String,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, deployment_id: &DeploymentId) -> Self {
        Self {
            bus,
            channel: Channels::logs(deployment_id),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn emit(&self, event: LogEvent) {
        match event.severity {
            Severity::Info => info!(channel = %self.channel, "{}", event.message),
            Severity::Error => error!(channel = %self.channel, "{}", event.message),
        }

        if let Err(e) = self.bus.publish(&self.channel, &event.to_wire()).await {
            warn!("Failed to publish log event to {}: {}", self.channel, e);
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.emit(LogEvent::info(message)).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.emit(LogEvent::error(message)).await
    }
}
