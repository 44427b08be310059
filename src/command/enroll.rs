use anyhow::Result;

use crate::constants::defaults;
use crate::helpers::{backoff_retry, retry_if};
use crate::node_mgmt::AgentConfig;

use super::{api_client, credential_store};

pub fn enroll(config: &AgentConfig) -> Result<()> {
    let api = api_client(config)?;
    let mut credentials = credential_store(config);

    backoff_retry(
        || {
            credentials.enroll(&api).map_err(|e| {
                let transient = e.is_transient();
                retry_if(e, transient)
            })
        },
        Some(defaults::PROVISION_MAX_ELAPSED),
    )?;
    log::info!("Enrollment complete");
    Ok(())
}
