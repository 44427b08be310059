use anyhow::Result;

use crate::node_mgmt::AgentConfig;

use super::upload_cycle;

pub fn once(config: &AgentConfig) -> Result<()> {
    let mut cycle = upload_cycle(config)?;
    let outcome = cycle.tick()?;
    log::info!("Single upload finished: {outcome}");
    println!("{outcome}");
    Ok(())
}
