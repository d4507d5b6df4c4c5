//! Log stream client
//!
//! Attaches to a deployment's log stream the way the browser does and prints
//! every event until the build reaches a terminal event or the server goes
//! away.

use colored::Colorize;
use futures::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info};
use url::Url;

use crate::errors::PlatformError;
use crate::executor::MSG_ARTIFACTS_UPLOADED;
use crate::models::deployment::DeploymentId;
use crate::models::event::LogEvent;

/// How a tail session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutcome {
    /// The artifacts were uploaded
    Succeeded,
    /// The build reported an error
    Failed(String),
    /// The stream closed before a terminal event
    Disconnected,
}

/// Follow the log stream of `deployment_id` on `server` and print it
pub async fn tail(server: &str, deployment_id: &DeploymentId) -> Result<TailOutcome, PlatformError> {
    let url = build_logs_url(server, deployment_id)?;
    info!("Connecting to log stream: {}", url);

    let (mut ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| PlatformError::ServerError(format!("unable to connect to {}: {}", url, e)))?;

    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                println!("{}", render(text.as_str()));
                if let Some(outcome) = terminal_outcome(text.as_str()) {
                    let _ = ws_stream.close(None).await;
                    return Ok(outcome);
                }
            }
            Some(Ok(Message::Close(frame))) => {
                debug!("Log stream closed: {:?}", frame);
                return Ok(TailOutcome::Disconnected);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Log stream error: {}", e);
                return Ok(TailOutcome::Disconnected);
            }
            None => return Ok(TailOutcome::Disconnected),
        }
    }
}

/// `{server}/logs/{id}` with http(s) mapped to ws(s)
pub fn build_logs_url(server: &str, deployment_id: &DeploymentId) -> Result<Url, PlatformError> {
    let mut url = Url::parse(server).map_err(|e| PlatformError::ConfigError(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PlatformError::ConfigError(format!(
                "unsupported server URL scheme: {}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PlatformError::ConfigError("Failed to set scheme".to_string()))?;

    url.set_path(&format!(
        "{}/logs/{}",
        url.path().trim_end_matches('/'),
        deployment_id
    ));
    Ok(url)
}

/// Terminal line for one frame; ERROR events are highlighted
pub fn render(text: &str) -> String {
    match LogEvent::from_wire(text) {
        Some(event) if event.is_error() => text.red().bold().to_string(),
        Some(event) if event.message == MSG_ARTIFACTS_UPLOADED => text.green().to_string(),
        _ => text.to_string(),
    }
}

fn terminal_outcome(text: &str) -> Option<TailOutcome> {
    let event = LogEvent::from_wire(text)?;
    if event.is_error() {
        Some(TailOutcome::Failed(event.message))
    } else if event.message == MSG_ARTIFACTS_UPLOADED {
        Some(TailOutcome::Succeeded)
    } else {
        None
    }
}
