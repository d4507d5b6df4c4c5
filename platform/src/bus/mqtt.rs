//! MQTT-backed message bus

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::errors::PlatformError;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Requests buffered between the client handle and its event loop
const REQUEST_CAPACITY: usize = 64;

/// Messages buffered per subscription before the relay reads them
const SUBSCRIPTION_BUFFER: usize = 256;

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: 1883,
            use_tls: false,
            ca_cert_path: None,
            username: None,
            password: None,
        }
    }
}

/// MQTT bus options
#[derive(Debug, Clone)]
pub struct Options {
    pub address: MqttAddress,

    /// Keep-alive interval sent to the broker
    pub keep_alive: Duration,

    /// Backoff between reconnect attempts of the publishing connection
    pub reconnect: CooldownOptions,

    /// How long `subscribe` waits for the broker to acknowledge
    pub subscribe_timeout: Duration,

    /// How long `close` waits for queued publishes to drain
    pub close_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            address: MqttAddress::default(),
            keep_alive: Duration::from_secs(30),
            reconnect: CooldownOptions::default(),
            subscribe_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Message bus over an MQTT broker.
///
/// Publishes go through one shared connection at QoS 0. Each subscription
/// opens its own connection, so dropping it closes exactly that session.
pub struct MqttBus {
    options: Options,
    client: AsyncClient,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBus {
    /// Create the publishing connection. The broker is contacted lazily.
    pub fn connect(options: Options) -> Result<Self, PlatformError> {
        let mqtt_options = build_mqtt_options(&options, "sitemesh-pub")?;
        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        info!(
            "Publishing to MQTT broker {}:{}",
            options.address.host, options.address.port
        );
        let driver = tokio::spawn(drive_publisher(eventloop, options.reconnect.clone()));

        Ok(Self {
            options,
            client,
            driver: Mutex::new(Some(driver)),
        })
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), PlatformError> {
        // Never wait on a full request queue: log delivery must not stall a build
        self.client
            .try_publish(channel, QoS::AtMostOnce, false, message.as_bytes().to_vec())
            .map_err(|e| PlatformError::BusError(e.to_string()))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, PlatformError> {
        let mqtt_options = build_mqtt_options(&self.options, "sitemesh-sub")?;
        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        client
            .subscribe(channel, QoS::AtMostOnce)
            .await
            .map_err(|e| PlatformError::BusError(e.to_string()))?;

        tokio::time::timeout(self.options.subscribe_timeout, await_suback(&mut eventloop))
            .await
            .map_err(|_| PlatformError::BusError(format!("timed out subscribing to {}", channel)))??;
        debug!("Subscribed to: {}", channel);

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let pump = tokio::spawn(pump_subscription(eventloop, channel.to_string(), tx));

        let messages = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        let name = channel.to_string();
        Ok(Subscription::new(channel, messages).with_release(move || {
            let _ = client.try_disconnect();
            pump.abort();
            debug!("Released subscription to: {}", name);
        }))
    }

    async fn close(&self) -> Result<(), PlatformError> {
        let Some(driver) = self.driver.lock().await.take() else {
            return Ok(());
        };

        // A full request queue means the broker is gone; the driver is dropped below
        if let Err(e) = self.client.try_disconnect() {
            warn!("MQTT disconnect request failed: {}", e);
        }

        let abort = driver.abort_handle();
        match tokio::time::timeout(self.options.close_timeout, driver).await {
            Ok(_) => info!("MQTT disconnected"),
            Err(_) => {
                warn!("MQTT connection did not drain in {:?}, dropping it", self.options.close_timeout);
                abort.abort();
            }
        }
        Ok(())
    }
}

fn build_mqtt_options(options: &Options, role: &str) -> Result<MqttOptions, PlatformError> {
    let address = &options.address;
    if address.host.is_empty() {
        return Err(PlatformError::ConfigError("MQTT host is not configured".to_string()));
    }

    let client_id = format!("{}-{}", role, uuid::Uuid::new_v4().simple());
    let mut mqtt_options = MqttOptions::new(client_id, &address.host, address.port);
    mqtt_options.set_keep_alive(options.keep_alive);
    mqtt_options.set_clean_session(true);

    if let Some(username) = &address.username {
        let password = address
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string())
            .unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    if address.use_tls {
        use rumqttc::{TlsConfiguration, Transport};
        use rustls::ClientConfig;

        let mut root_cert_store = rustls::RootCertStore::empty();

        if let Some(ref ca_path) = address.ca_cert_path {
            let ca_pem = std::fs::read(ca_path).map_err(|e| {
                PlatformError::ConfigError(format!("Failed to read CA cert {ca_path}: {e}"))
            })?;
            let mut cursor = std::io::Cursor::new(ca_pem);
            for cert in rustls_pemfile::certs(&mut cursor).flatten() {
                let _ = root_cert_store.add(cert);
            }
        } else {
            for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
                let _ = root_cert_store.add(cert);
            }
        }

        let client_config = ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        mqtt_options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
            Arc::new(client_config),
        )));
    }

    Ok(mqtt_options)
}

/// Keep the publishing connection alive until a disconnect goes out
async fn drive_publisher(mut eventloop: EventLoop, reconnect: CooldownOptions) {
    let mut failures = 0;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                debug!("MQTT publisher connected");
                failures = 0;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
            Ok(_) => {}
            Err(e) => {
                let wait = calc_exp_backoff(&reconnect, failures);
                failures = failures.saturating_add(1);
                warn!("MQTT publisher connection error: {}, retrying in {:?}", e, wait);
                tokio::time::sleep(wait).await;
            }
        }
    }
}

async fn await_suback(eventloop: &mut EventLoop) -> Result<(), PlatformError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(PlatformError::BusError(e.to_string())),
        }
    }
}

/// Forward publishes on `channel` until the connection fails or the
/// subscriber goes away
async fn pump_subscription(
    mut eventloop: EventLoop,
    channel: String,
    tx: mpsc::Sender<Result<String, PlatformError>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != channel {
                    continue;
                }
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                if tx.send(Ok(payload)).await.is_err() {
                    return;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
            Ok(_) => {}
            Err(e) => {
                error!("MQTT subscription to {} lost: {}", channel, e);
                let _ = tx.send(Err(PlatformError::BusError(e.to_string()))).await;
                return;
            }
        }
    }
}
