use anyhow::{anyhow, Result};
use env_logger::Env;

use field_agent::command;
use field_agent::constants::{defaults, envvars};
use field_agent::helpers::load_dotenv;
use field_agent::node_mgmt::AgentConfig;

const CMD_RUN: &str = "run";
const CMD_ONCE: &str = "once";
const CMD_ENROLL: &str = "enroll";
const CMD_PROVISION: &str = "provision";
const CMD_SET_CRON: &str = "set-cron";
const CMD_STATUS: &str = "status";

fn main() -> Result<()> {
    load_dotenv();
    env_logger::Builder::from_env(Env::default().filter_or(envvars::LOG_LEVEL, defaults::LOG_LEVEL))
        .init();

    let mut args = pico_args::Arguments::from_env();
    let subcommand = args.subcommand()?;
    let config = AgentConfig::from_env()?;

    match subcommand.as_deref() {
        None | Some(CMD_RUN) => command::run(&config),
        Some(CMD_ONCE) => command::once(&config),
        Some(CMD_ENROLL) => command::enroll(&config),
        Some(CMD_PROVISION) => command::provision(&config),
        Some(CMD_SET_CRON) => {
            let expression: String = args
                .free_from_str()
                .map_err(|_| anyhow!("Usage: field-agent set-cron \"*/5 * * * *\""))?;
            command::set_cron(&config, &expression)
        }
        Some(CMD_STATUS) => command::status(&config),
        Some(other) => Err(anyhow!(
            "Unknown subcommand '{other}'; must be one of \
             'run', 'once', 'enroll', 'provision', 'set-cron', 'status'"
        )),
    }
}
