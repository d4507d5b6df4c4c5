//! sitemesh - Entry Point
//!
//! Serves the deployment API and the site router by default. `--build` runs a
//! single build job from `DEPLOYMENT_ID`/`REPOSITORY_URL`, which is how the
//! process and docker backends launch builds. `--tail=<id>` follows a
//! deployment's log stream.

use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context};
use sitemesh::app::run::{run, run_build};
use sitemesh::compute::JobContext;
use sitemesh::filesys::file::File;
use sitemesh::logs::init_logging;
use sitemesh::models::deployment::DeploymentId;
use sitemesh::storage::settings::Settings;
use sitemesh::tail::{tail, TailOutcome};
use sitemesh::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    // Retrieve the settings file
    let config_path = cli_args.get("config").cloned();
    let settings = match &config_path {
        Some(path) => File::new(path)
            .read_json::<Settings>()
            .await
            .with_context(|| format!("unable to read settings file {}", path))?,
        None => Settings::default(),
    };

    // Initialize logging
    let _log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = settings.app_options(config_path.as_deref());

    // Run one build job
    if cli_args.contains_key("build") {
        let context = JobContext::from_env().context("build job context is incomplete")?;
        let summary = run_build(&options, context).await?;
        info!("Build finished, {} artifacts uploaded", summary.uploaded.len());
        return Ok(());
    }

    // Follow a log stream
    if let Some(raw_id) = cli_args.get("tail") {
        let deployment_id = DeploymentId::parse(raw_id)?;
        let server = cli_args.get("server").cloned().unwrap_or_else(|| {
            format!("http://{}:{}", options.api_server.host, options.api_server.port)
        });
        return match tail(&server, &deployment_id).await? {
            TailOutcome::Succeeded => Ok(()),
            TailOutcome::Failed(message) => bail!("deployment {} failed: {}", deployment_id, message),
            TailOutcome::Disconnected => bail!("log stream of {} closed early", deployment_id),
        };
    }

    // Run the servers
    info!("Running sitemesh {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run sitemesh: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, waiting for Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
