//! Log relay
//!
//! Bridges one deployment's log channel to one WebSocket client. Each client
//! gets its own bus subscription, held only for the life of the connection.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::channels::Channels;
use crate::bus::{MessageBus, Subscription};
use crate::models::deployment::DeploymentId;

/// Relay options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval of keep-alive pings to the client
    pub ping_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Why a relay session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client sent a close frame or hung up
    ClientClosed,
    /// Reading from or writing to the client failed
    ClientError(String),
    /// The bus subscription failed
    BusError(String),
    /// The bus stopped delivering
    BusClosed,
    /// The hosting process is shutting down
    Shutdown,
}

/// Attach an upgraded WebSocket to the log channel of `deployment_id`
pub async fn attach(
    mut socket: WebSocket,
    deployment_id: DeploymentId,
    bus: Arc<dyn MessageBus>,
    options: Options,
    shutdown: broadcast::Receiver<()>,
) -> RelayEnd {
    let channel = Channels::logs(&deployment_id);
    let subscription = match bus.subscribe(&channel).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("Unable to subscribe to {}: {}", channel, e);
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::ERROR,
                    reason: "log stream unavailable".into(),
                })))
                .await;
            return RelayEnd::BusError(e.to_string());
        }
    };

    info!("Listening on channel: {}", channel);
    let (sender, receiver) = socket.split();
    let end = run(sender, receiver, subscription, &options, shutdown).await;
    info!("Relay on {} ended: {:?}", channel, end);
    end
}

/// Forward every message of `subscription` to `sender` until one side goes
/// away or shutdown is signalled. The subscription is dropped, and thereby
/// released, before this returns on every path.
pub async fn run<S, R>(
    mut sender: S,
    mut receiver: R,
    mut subscription: Subscription,
    options: &Options,
    mut shutdown: broadcast::Receiver<()>,
) -> RelayEnd
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut ping_interval = tokio::time::interval(options.ping_interval);
    // The first tick completes immediately
    ping_interval.tick().await;

    let end = loop {
        tokio::select! {
            _ = shutdown.recv() => break RelayEnd::Shutdown,

            message = subscription.next() => match message {
                Some(Ok(text)) => {
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        break RelayEnd::ClientError(e.to_string());
                    }
                }
                Some(Err(e)) => {
                    error!("Unable to receive message from {}: {}", subscription.channel(), e);
                    break RelayEnd::BusError(e.to_string());
                }
                None => break RelayEnd::BusClosed,
            },

            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break RelayEnd::ClientClosed,
                Some(Ok(_)) => {
                    // No application messages are expected from the client
                }
                Some(Err(e)) => break RelayEnd::ClientError(e.to_string()),
            },

            _ = ping_interval.tick() => {
                if let Err(e) = sender.send(Message::Ping(Default::default())).await {
                    break RelayEnd::ClientError(e.to_string());
                }
            }
        }
    };

    debug!("Releasing subscription to {}", subscription.channel());
    drop(subscription);

    match &end {
        RelayEnd::ClientClosed | RelayEnd::ClientError(_) => {}
        RelayEnd::BusError(_) | RelayEnd::BusClosed | RelayEnd::Shutdown => {
            let code = if end == RelayEnd::Shutdown {
                close_code::AWAY
            } else {
                close_code::ERROR
            };
            if let Err(e) = sender
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: "log stream closed".into(),
                })))
                .await
            {
                warn!("Unable to close client connection: {}", e);
            }
        }
    }

    end
}
