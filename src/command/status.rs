use anyhow::Result;
use serde_json::json;

use crate::data_mgmt::{scheduler::parse_schedule, OfflineQueue};
use crate::helpers::now_iso;
use crate::node_mgmt::AgentConfig;

use super::credential_store;

/// Print what the agent would run with, without touching the hardware
pub fn status(config: &AgentConfig) -> Result<()> {
    let mut credentials = credential_store(config);
    let queue = OfflineQueue::in_dir(&config.data_dir);

    let report = json!({
        "time": now_iso(),
        "backendUrl": config.backend_url,
        "deviceId": credentials.device_id()?,
        "apiKey": credentials.api_key()?.is_some(),
        "enrollToken": config.enroll_token.is_some(),
        "schedule": {
            "expression": config.cron_schedule,
            "valid": parse_schedule(&config.cron_schedule).is_ok(),
        },
        "queued": queue.len()?,
        "dataDir": config.data_dir,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
