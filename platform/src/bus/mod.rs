//! Message bus abstraction
//!
//! Build jobs publish log events to a per-deployment channel and relay
//! connections subscribe to it. Delivery is at-most-once and only reaches
//! subscribers connected at publish time; there is no replay.

pub mod channels;
pub mod memory;
pub mod mqtt;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};

use crate::errors::PlatformError;

/// Publish/subscribe capability
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a message to every current subscriber of `channel`
    async fn publish(&self, channel: &str, message: &str) -> Result<(), PlatformError>;

    /// Subscribe to `channel`. The subscription is released when dropped.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, PlatformError>;

    /// Flush pending publishes and release the connection
    async fn close(&self) -> Result<(), PlatformError> {
        Ok(())
    }
}

/// A live subscription to one channel.
///
/// Yields messages in publish order. The stream ends when the bus goes away
/// and yields an error when the underlying connection fails.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, Result<String, PlatformError>>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        messages: BoxStream<'static, Result<String, PlatformError>>,
    ) -> Self {
        Self {
            channel: channel.into(),
            messages,
            on_release: None,
        }
    }

    /// Run `release` when the subscription is dropped
    pub fn with_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(release));
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = Result<String, PlatformError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.on_release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}
