//! Site router
//!
//! Maps the leading DNS label of a request's host to a deployment and
//! redirects to that deployment's entry page in the artifact store. There is
//! no existence check: an unknown deployment surfaces as the store's 404.

use crate::errors::PlatformError;

/// Entry page of every deployment
pub const ENTRY_DOCUMENT: &str = "index.html";

/// Resolves hostnames to artifact locations
#[derive(Debug, Clone)]
pub struct SiteRouter {
    artifact_base_url: String,
}

impl SiteRouter {
    pub fn new(artifact_base_url: impl Into<String>) -> Self {
        let artifact_base_url = artifact_base_url.into();
        Self {
            artifact_base_url: artifact_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn artifact_base_url(&self) -> &str {
        &self.artifact_base_url
    }

    /// Redirect target for a request addressed to `hostname`
    pub fn resolve(&self, hostname: &str) -> Result<String, PlatformError> {
        let label = leading_label(hostname)?;
        Ok(format!(
            "{}/{}/{}",
            self.artifact_base_url, label, ENTRY_DOCUMENT
        ))
    }
}

/// The label before the first `.`, lowercased, with any port stripped.
///
/// A host without a `.` has no separable label and is rejected, as is a
/// label with characters that cannot appear in a DNS label.
pub fn leading_label(hostname: &str) -> Result<String, PlatformError> {
    let host = hostname.trim();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    let Some((label, rest)) = host.split_once('.') else {
        return Err(PlatformError::MalformedHost(hostname.to_string()));
    };
    if label.is_empty() || rest.is_empty() {
        return Err(PlatformError::MalformedHost(hostname.to_string()));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(PlatformError::MalformedHost(hostname.to_string()));
    }
    Ok(label.to_ascii_lowercase())
}
