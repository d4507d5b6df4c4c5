//! Build log events

use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event emitted by a build job.
///
/// On the wire an event is the text `"{SEVERITY}: {message}"`; the deployment
/// it belongs to is implied by the channel it travels on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
}

impl LogEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Text form published on the bus and forwarded to clients
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// Parse the text form. Returns `None` for payloads without a known prefix.
    pub fn from_wire(text: &str) -> Option<Self> {
        let (prefix, message) = text.split_once(": ")?;
        let severity = match prefix {
            "INFO" => Severity::Info,
            "ERROR" => Severity::Error,
            _ => return None,
        };
        Some(Self {
            severity,
            message: message.to_string(),
        })
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}
