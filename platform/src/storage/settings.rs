//! Settings file management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::app::options::{
    AppOptions, BusOptions, ComputeOptions, LifecycleOptions, ServerOptions, SiteOptions,
    StoreOptions,
};
use crate::bus::mqtt::{self, MqttAddress};
use crate::compute::{docker, process};
use crate::logs::{LogLevel, LogOptions};
use crate::store::http;
use crate::{dispatch, executor};

/// Platform settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Deployment API listener
    #[serde(default = "default_api_server")]
    pub api_server: ListenerSettings,

    /// Site router listener
    #[serde(default)]
    pub site_server: ListenerSettings,

    /// Site URLs
    #[serde(default)]
    pub site: SiteSettings,

    /// Message bus
    #[serde(default)]
    pub bus: BusSettings,

    /// Compute backend
    #[serde(default)]
    pub compute: ComputeSettings,

    /// Artifact store
    #[serde(default)]
    pub store: StoreSettings,

    /// Build jobs
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Append-only deployment records; disabled when absent
    #[serde(default)]
    pub records_file: Option<PathBuf>,

    /// Maximum delay for graceful shutdown in seconds
    #[serde(default = "default_max_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            logging: LoggingSettings::default(),
            api_server: default_api_server(),
            site_server: ListenerSettings::default(),
            site: SiteSettings::default(),
            bus: BusSettings::default(),
            compute: ComputeSettings::default(),
            store: StoreSettings::default(),
            executor: ExecutorSettings::default(),
            records_file: None,
            max_shutdown_delay_secs: default_max_shutdown_delay(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,

    /// Also write a daily rolling log file here
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSettings {
    #[serde(default = "default_listen_host")]
    pub host: String,

    #[serde(default = "default_site_port")]
    pub port: u16,
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_site_port() -> u16 {
    8080
}

fn default_api_server() -> ListenerSettings {
    ListenerSettings {
        host: default_listen_host(),
        port: 9000,
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_site_port(),
        }
    }
}

/// Site URL settings
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSettings {
    /// Scheme of predicted site URLs
    #[serde(default = "default_site_scheme")]
    pub scheme: String,

    /// Host deployment subdomains hang off, with port if any
    #[serde(default = "default_base_host")]
    pub base_host: String,

    /// Base URL of the artifact store as seen by browsers
    #[serde(default = "default_artifact_base_url")]
    pub artifact_base_url: String,

    /// Serve a filesystem store from the site listener
    #[serde(default = "default_true")]
    pub serve_artifacts: bool,
}

fn default_site_scheme() -> String {
    "http".to_string()
}

fn default_base_host() -> String {
    "localhost:8080".to_string()
}

fn default_artifact_base_url() -> String {
    "http://localhost:8080/artifacts".to_string()
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            scheme: default_site_scheme(),
            base_host: default_base_host(),
            artifact_base_url: default_artifact_base_url(),
            serve_artifacts: true,
        }
    }
}

/// Message bus settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusSettings {
    #[default]
    Memory,
    Mqtt(MqttBrokerSettings),
}

/// MQTT broker settings
#[derive(Debug, Clone, Deserialize)]
pub struct MqttBrokerSettings {
    /// Broker host
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Use TLS
    #[serde(default)]
    pub tls: bool,

    /// Optional path to a PEM-encoded CA certificate for broker TLS verification.
    /// When absent, the system certificate store is used.
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Compute backend settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputeSettings {
    #[default]
    InProcess,
    Process(ProcessSettings),
    Docker(DockerSettings),
}

/// Local process backend settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessSettings {
    /// Build program; this binary when absent
    #[serde(default)]
    pub program: Option<PathBuf>,

    /// Extra environment for every build
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Docker backend settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerSettings {
    #[serde(default)]
    pub docker_bin: Option<String>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub network: Option<String>,

    /// Volumes mounted into every build container, in `-v` syntax
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Extra environment for every build
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Artifact store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreSettings {
    Memory,
    Filesystem {
        root: PathBuf,
    },
    Http {
        base_url: String,
        #[serde(default)]
        token: Option<SecretString>,
        #[serde(default = "default_store_timeout")]
        timeout_secs: u64,
    },
}

fn default_store_timeout() -> u64 {
    60
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings::Filesystem {
            root: PathBuf::from("artifacts"),
        }
    }
}

/// Build job settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Build this checked-out tree instead of cloning
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub build_command: Option<String>,

    #[serde(default)]
    pub cleanup: Option<bool>,
}

impl Settings {
    /// Logging options derived from these settings
    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level.clone(),
            json_format: self.logging.json,
            log_dir: self.logging.log_dir.clone(),
            ..Default::default()
        }
    }

    /// Application options derived from these settings. `config_path` is
    /// handed to locally spawned build processes so they load the same file.
    pub fn app_options(&self, config_path: Option<&str>) -> AppOptions {
        AppOptions {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: Duration::from_secs(self.max_shutdown_delay_secs),
            },
            api_server: self.api_server.to_options(),
            site_server: self.site_server.to_options(),
            site: SiteOptions {
                artifact_base_url: self.site.artifact_base_url.clone(),
                serve_artifacts: self.site.serve_artifacts,
            },
            dispatcher: dispatch::Options {
                site_scheme: self.site.scheme.clone(),
                site_base_host: self.site.base_host.clone(),
            },
            bus: self.bus.to_options(),
            compute: self.compute.to_options(config_path),
            store: self.store.to_options(),
            executor: self.executor.to_options(),
            records_file: self.records_file.clone(),
            ..Default::default()
        }
    }
}

impl ListenerSettings {
    fn to_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

impl BusSettings {
    fn to_options(&self) -> BusOptions {
        match self {
            BusSettings::Memory => BusOptions::Memory,
            BusSettings::Mqtt(broker) => BusOptions::Mqtt(mqtt::Options {
                address: MqttAddress {
                    host: broker.host.clone(),
                    port: broker.port,
                    use_tls: broker.tls,
                    ca_cert_path: broker.ca_cert_path.clone(),
                    username: broker.username.clone(),
                    password: broker.password.clone(),
                },
                ..Default::default()
            }),
        }
    }
}

impl ComputeSettings {
    fn to_options(&self, config_path: Option<&str>) -> ComputeOptions {
        match self {
            ComputeSettings::InProcess => ComputeOptions::InProcess,
            ComputeSettings::Process(settings) => {
                let mut options = process::Options {
                    program: settings.program.clone(),
                    extra_env: env_pairs(&settings.env),
                    ..Default::default()
                };
                if let Some(path) = config_path {
                    options.args.push(format!("--config={}", path));
                }
                ComputeOptions::Process(options)
            }
            ComputeSettings::Docker(settings) => {
                let defaults = docker::Options::default();
                let mut options = docker::Options {
                    docker_bin: settings.docker_bin.clone().unwrap_or(defaults.docker_bin),
                    image: settings.image.clone().unwrap_or(defaults.image),
                    network: settings.network.clone(),
                    volumes: settings.volumes.clone(),
                    extra_env: env_pairs(&settings.env),
                    ..defaults
                };
                if let Some(path) = config_path {
                    options = options.with_config_file(path);
                }
                ComputeOptions::Docker(options)
            }
        }
    }
}

impl StoreSettings {
    fn to_options(&self) -> StoreOptions {
        match self {
            StoreSettings::Memory => StoreOptions::Memory,
            StoreSettings::Filesystem { root } => StoreOptions::Filesystem { root: root.clone() },
            StoreSettings::Http {
                base_url,
                token,
                timeout_secs,
            } => StoreOptions::Http(http::Options {
                base_url: base_url.clone(),
                token: token.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            }),
        }
    }
}

impl ExecutorSettings {
    fn to_options(&self) -> executor::Options {
        let defaults = executor::Options::default();
        executor::Options {
            workspace_root: self.workspace_root.clone().unwrap_or(defaults.workspace_root),
            source_dir: self.source_dir.clone(),
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            build_command: self.build_command.clone().unwrap_or(defaults.build_command),
            cleanup: self.cleanup.unwrap_or(defaults.cleanup),
            ..defaults
        }
    }
}

fn env_pairs(env: &BTreeMap<String, String>) -> Vec<(String, String)> {
    env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
