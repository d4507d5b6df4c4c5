//! In-process message bus

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::bus::{MessageBus, Subscription};
use crate::errors::PlatformError;

/// Per-channel buffer. A subscriber further behind than this loses messages.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Message bus backed by one `tokio::sync::broadcast` channel per bus channel.
///
/// Only usable when publisher and subscribers live in the same process.
pub struct MemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Number of live subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of channels currently tracked
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every channel; open subscriptions end
    pub fn shutdown(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Sender<String>>> {
        // A poisoned map is still structurally valid
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), PlatformError> {
        let mut channels = self.lock();
        channels.retain(|_, tx| tx.receiver_count() > 0);

        match channels.get(channel) {
            Some(tx) => {
                // Receivers may detach between the check above and the send
                let _ = tx.send(message.to_string());
            }
            None => debug!("No subscribers on {}, message dropped", channel),
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, PlatformError> {
        let rx = {
            let mut channels = self.lock();
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let name = channel.to_string();
        let messages = futures::stream::unfold(rx, move |mut rx| {
            let name = name.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => return Some((Ok(message), rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscriber on {} lagged, {} messages lost", name, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        })
        .boxed();

        Ok(Subscription::new(channel, messages))
    }
}
