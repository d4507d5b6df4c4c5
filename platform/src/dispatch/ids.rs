//! Deployment ID allocation

use std::collections::HashSet;
use std::sync::Mutex;

use crate::errors::PlatformError;
use crate::models::deployment::DeploymentId;

/// Draws before giving up on finding an unused ID
const MAX_ATTEMPTS: usize = 64;

/// Source of fresh deployment IDs
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Result<DeploymentId, PlatformError>;
}

/// Random IDs, never handing out the same one twice in this process.
///
/// Every issued ID is remembered for the life of the process. Once draws keep
/// hitting issued IDs, allocation fails instead of spinning.
pub struct RandomIds {
    issued: Mutex<HashSet<DeploymentId>>,
    generate: fn() -> DeploymentId,
}

impl RandomIds {
    pub fn new() -> Self {
        Self::with_generator(DeploymentId::generate)
    }

    pub fn with_generator(generate: fn() -> DeploymentId) -> Self {
        Self {
            issued: Mutex::new(HashSet::new()),
            generate,
        }
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIds {
    fn next_id(&self) -> Result<DeploymentId, PlatformError> {
        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..MAX_ATTEMPTS {
            let id = (self.generate)();
            if issued.insert(id.clone()) {
                return Ok(id);
            }
        }
        Err(PlatformError::Internal(format!(
            "no unused deployment ID after {} attempts, {} issued",
            MAX_ATTEMPTS,
            issued.len()
        )))
    }
}
