use anyhow::Result;

use crate::constants::defaults;
use crate::helpers::{backoff_retry, retry_if};
use crate::node_mgmt::{AgentConfig, Provisioned, Provisioner};

use super::{api_client, credential_store};

/// Register the device with the collector, retrying transient failures
pub(super) fn provision_device(config: &AgentConfig) -> Result<Provisioned> {
    let api = api_client(config)?;
    let mut credentials = credential_store(config);

    let provisioned = backoff_retry(
        || {
            Provisioner::new(&api, config, &mut credentials)
                .run()
                .map_err(|e| {
                    let transient = e.is_transient();
                    retry_if(e, transient)
                })
        },
        Some(defaults::PROVISION_MAX_ELAPSED),
    )?;
    log::info!(
        "Provisioned device {} ({})",
        provisioned.device_id,
        provisioned.name
    );
    Ok(provisioned)
}

pub fn provision(config: &AgentConfig) -> Result<()> {
    let provisioned = provision_device(config)?;
    println!(
        "deviceId={} name={} created={} enrolled={}",
        provisioned.device_id, provisioned.name, provisioned.created, provisioned.enrolled
    );
    Ok(())
}
