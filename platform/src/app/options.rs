//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::bus::mqtt;
use crate::compute::{docker, process};
use crate::store::http;
use crate::{dispatch, executor, relay};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Deployment API listener
    pub api_server: ServerOptions,

    /// Site router listener
    pub site_server: ServerOptions,

    /// Site routing
    pub site: SiteOptions,

    /// Dispatcher options
    pub dispatcher: dispatch::Options,

    /// Message bus
    pub bus: BusOptions,

    /// Compute backend
    pub compute: ComputeOptions,

    /// Artifact store
    pub store: StoreOptions,

    /// Build executor options, used by build jobs
    pub executor: executor::Options,

    /// Log relay options
    pub relay: relay::Options,

    /// Append a record of every dispatched deployment to this file
    pub records_file: Option<PathBuf>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            api_server: ServerOptions {
                host: "127.0.0.1".to_string(),
                port: 9000,
            },
            site_server: ServerOptions::default(),
            site: SiteOptions::default(),
            dispatcher: dispatch::Options::default(),
            bus: BusOptions::default(),
            compute: ComputeOptions::default(),
            store: StoreOptions::default(),
            executor: executor::Options::default(),
            relay: relay::Options::default(),
            records_file: None,
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP listener options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Site routing options
#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// Where deployment prefixes live in the artifact store, as seen by browsers
    pub artifact_base_url: String,

    /// Serve a filesystem store from the site listener
    pub serve_artifacts: bool,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            artifact_base_url: "http://localhost:8080/artifacts".to_string(),
            serve_artifacts: true,
        }
    }
}

/// Message bus selection
#[derive(Debug, Clone, Default)]
pub enum BusOptions {
    /// In-process bus; only reaches builds run by the in-process backend
    #[default]
    Memory,
    Mqtt(mqtt::Options),
}

/// Compute backend selection
#[derive(Debug, Clone, Default)]
pub enum ComputeOptions {
    #[default]
    InProcess,
    Process(process::Options),
    Docker(docker::Options),
}

/// Artifact store selection
#[derive(Debug, Clone)]
pub enum StoreOptions {
    Memory,
    Filesystem { root: PathBuf },
    Http(http::Options),
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions::Filesystem {
            root: PathBuf::from("artifacts"),
        }
    }
}

impl StoreOptions {
    /// Root directory of a filesystem store
    pub fn filesystem_root(&self) -> Option<&PathBuf> {
        match self {
            StoreOptions::Filesystem { root } => Some(root),
            _ => None,
        }
    }
}
