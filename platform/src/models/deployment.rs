//! Deployment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;

/// Characters a deployment ID is drawn from. Lowercase only, since the ID is
/// also a DNS label.
pub const DEPLOYMENT_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed length of a deployment ID
pub const DEPLOYMENT_ID_LEN: usize = 5;

/// Opaque identifier of one build attempt. Names the log channel and the
/// artifact prefix of that attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Draw a fresh random ID
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..DEPLOYMENT_ID_LEN)
            .map(|_| DEPLOYMENT_ID_ALPHABET[rng.random_range(0..DEPLOYMENT_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Validate and wrap an existing ID
    pub fn parse(raw: &str) -> Result<Self, PlatformError> {
        if raw.len() != DEPLOYMENT_ID_LEN {
            return Err(PlatformError::InvalidRequest(format!(
                "deployment id must be {} characters, got {:?}",
                DEPLOYMENT_ID_LEN, raw
            )));
        }
        if !raw.bytes().all(|b| DEPLOYMENT_ID_ALPHABET.contains(&b)) {
            return Err(PlatformError::InvalidRequest(format!(
                "deployment id contains invalid characters: {:?}",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeploymentId {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeploymentId {
    type Error = PlatformError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeploymentId> for String {
    fn from(id: DeploymentId) -> Self {
        id.0
    }
}

/// What the compute backend needs to run one build job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub repository_url: String,
    pub deployment_id: DeploymentId,
}

/// Lifecycle status of a recorded deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Queued,
    Building,
    Ready,
    Failed,
}

/// Row written by the persistence-backed dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployment_id: DeploymentId,
    pub repository_url: String,
    pub website_url: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
}
