use anyhow::Result;

use crate::data_mgmt::TickScheduler;
use crate::node_mgmt::AgentConfig;

use super::provision::provision_device;
use super::upload_cycle;

fn start_scheduler(config: &AgentConfig, expression: &str) -> Result<()> {
    if config.auto_provision {
        if let Err(e) = provision_device(config) {
            log::error!("Auto-provisioning failed, continuing with stored credentials: {e:#}");
        }
    }

    let cycle = upload_cycle(config)?;
    let mut scheduler = TickScheduler::new(cycle)?;
    scheduler.start(expression)?;
    log::info!(
        "Agent started (device {}, backend {}, schedule {:?})",
        config
            .device_id
            .map_or_else(|| "from device.json".to_string(), |id| id.to_string()),
        config.backend_url.as_deref().unwrap_or("<none>"),
        expression
    );
    scheduler.wait();
    Ok(())
}

pub fn run(config: &AgentConfig) -> Result<()> {
    start_scheduler(config, &config.cron_schedule)
}

/// Run with a schedule given on the command line instead of CRON_SCHEDULE
pub fn set_cron(config: &AgentConfig, expression: &str) -> Result<()> {
    start_scheduler(config, expression)
}
