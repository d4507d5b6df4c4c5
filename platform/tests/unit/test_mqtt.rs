//! MQTT bus tests against a minimal in-process MQTT 3.1.1 broker
//!
//! The broker speaks just enough of the protocol for QoS 0 traffic:
//! CONNECT, SUBSCRIBE, PUBLISH, PINGREQ and DISCONNECT.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use sitemesh::bus::mqtt::{MqttAddress, MqttBus, Options};
use sitemesh::bus::MessageBus;
use sitemesh::errors::PlatformError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::doubles::wait_until;

const CHANNEL: &str = "logs:ab3de";

type Routes = Arc<Mutex<HashMap<String, Vec<(u64, mpsc::UnboundedSender<Vec<u8>>)>>>>;

struct Broker {
    addr: SocketAddr,
    routes: Routes,
    stop: watch::Sender<bool>,
}

impl Broker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();
        let (stop, stop_rx) = watch::channel(false);

        let accept_routes = routes.clone();
        tokio::spawn(async move {
            let mut next_conn = 0;
            let mut stop_rx = stop_rx;
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { return };
                        next_conn += 1;
                        tokio::spawn(serve_connection(
                            stream,
                            next_conn,
                            accept_routes.clone(),
                            stop_rx.clone(),
                        ));
                    }
                }
            }
        });

        Self { addr, routes, stop }
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.routes
            .lock()
            .unwrap()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every client connection and stop accepting new ones
    fn stop(&self) {
        let _ = self.stop.send(true);
    }

    fn bus(&self) -> MqttBus {
        MqttBus::connect(Options {
            address: MqttAddress {
                host: self.addr.ip().to_string(),
                port: self.addr.port(),
                ..Default::default()
            },
            subscribe_timeout: Duration::from_secs(2),
            close_timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }
}

async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<(u8, Vec<u8>)> {
    let header = reader.read_u8().await?;
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8().await?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    Ok((header, body))
}

fn encode_packet(header: u8, body: &[u8]) -> Vec<u8> {
    let mut packet = vec![header];
    let mut len = body.len();
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if len == 0 {
            break;
        }
    }
    packet.extend_from_slice(body);
    packet
}

fn topic_at(body: &[u8], offset: usize) -> String {
    let len = u16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
    String::from_utf8_lossy(&body[offset + 2..offset + 2 + len]).into_owned()
}

async fn serve_connection(
    stream: TcpStream,
    conn: u64,
    routes: Routes,
    mut stop_rx: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let outbound = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                return;
            }
        }
    });

    loop {
        let packet = tokio::select! {
            _ = stop_rx.changed() => break,
            packet = read_packet(&mut reader) => packet,
        };
        let Ok((header, body)) = packet else { break };

        match header >> 4 {
            // CONNECT
            1 => {
                let _ = tx.send(vec![0x20, 0x02, 0x00, 0x00]);
            }
            // PUBLISH, QoS 0 only
            3 => {
                let topic = topic_at(&body, 0);
                let packet = encode_packet(header, &body);
                if let Some(subscribers) = routes.lock().unwrap().get(&topic) {
                    for (_, subscriber) in subscribers {
                        let _ = subscriber.send(packet.clone());
                    }
                }
            }
            // SUBSCRIBE
            8 => {
                let topic = topic_at(&body, 2);
                routes
                    .lock()
                    .unwrap()
                    .entry(topic)
                    .or_default()
                    .push((conn, tx.clone()));
                let _ = tx.send(vec![0x90, 0x03, body[0], body[1], 0x00]);
            }
            // PINGREQ
            12 => {
                let _ = tx.send(vec![0xd0, 0x00]);
            }
            // DISCONNECT
            14 => break,
            _ => {}
        }
    }

    for subscribers in routes.lock().unwrap().values_mut() {
        subscribers.retain(|(id, _)| *id != conn);
    }
    drop(tx);
    outbound.abort();
}

async fn next_message(subscription: &mut sitemesh::bus::Subscription) -> Option<Result<String, PlatformError>> {
    tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .expect("timed out waiting for a message")
}

#[tokio::test]
async fn test_subscription_receives_in_publish_order() {
    let broker = Broker::start().await;
    let bus = broker.bus();
    let mut subscription = bus.subscribe(CHANNEL).await.unwrap();

    for i in 0..10 {
        bus.publish(CHANNEL, &format!("INFO: step {}", i)).await.unwrap();
    }
    for i in 0..10 {
        assert_eq!(
            next_message(&mut subscription).await.unwrap().unwrap(),
            format!("INFO: step {}", i)
        );
    }
    bus.close().await.unwrap();
}

#[tokio::test]
async fn test_subscription_only_sees_its_channel() {
    let broker = Broker::start().await;
    let bus = broker.bus();
    let mut subscription = bus.subscribe(CHANNEL).await.unwrap();

    bus.publish("logs:zzzzz", "INFO: other deployment").await.unwrap();
    bus.publish(CHANNEL, "INFO: mine").await.unwrap();

    assert_eq!(next_message(&mut subscription).await.unwrap().unwrap(), "INFO: mine");
}

#[tokio::test]
async fn test_dropping_subscription_releases_connection() {
    let broker = Broker::start().await;
    let bus = broker.bus();

    let subscription = bus.subscribe(CHANNEL).await.unwrap();
    assert_eq!(broker.subscriber_count(CHANNEL), 1);

    drop(subscription);
    assert!(wait_until(Duration::from_secs(5), || broker.subscriber_count(CHANNEL) == 0).await);
}

#[tokio::test]
async fn test_broker_loss_ends_subscription_with_error() {
    let broker = Broker::start().await;
    let bus = broker.bus();
    let mut subscription = bus.subscribe(CHANNEL).await.unwrap();

    broker.stop();

    match next_message(&mut subscription).await {
        Some(Err(PlatformError::BusError(_))) => {}
        other => panic!("expected a bus error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_returns_after_broker_loss() {
    let broker = Broker::start().await;
    let bus = broker.bus();
    bus.publish(CHANNEL, "INFO: before").await.unwrap();

    broker.stop();
    for i in 0..200 {
        let _ = bus.publish(CHANNEL, &format!("INFO: {}", i)).await;
    }

    let closed = tokio::time::timeout(Duration::from_secs(5), bus.close()).await;
    assert!(closed.is_ok(), "close did not return");
}
