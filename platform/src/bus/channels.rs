//! Bus channel naming

use crate::models::deployment::DeploymentId;

const LOGS_PREFIX: &str = "logs:";

/// Channel name patterns
pub struct Channels;

impl Channels {
    /// Log channel of one deployment
    pub fn logs(deployment_id: &DeploymentId) -> String {
        format!("{}{}", LOGS_PREFIX, deployment_id)
    }
}
