mod enroll;
mod once;
mod provision;
mod run;
mod status;

pub use enroll::enroll;
pub use once::once;
pub use provision::provision;
pub use run::{run, set_cron};
pub use status::status;

use anyhow::Result;

use crate::data_mgmt::{OfflineQueue, UploadCycle};
use crate::hal::{I2cConnector, SerialConnector};
use crate::interfaces::{AgentState, ApiClient};
use crate::node_mgmt::{AgentConfig, CredentialStore};
use crate::readers::pms5003::Pms5003;
use crate::readers::position::PositionProvider;
use crate::readers::sensors::SensorHub;
use crate::readers::shtc3::Shtc3;
use crate::readers::sim7000::ModemSession;

type HardwareSensors = SensorHub<I2cConnector, SerialConnector>;
type HardwarePosition = PositionProvider<SerialConnector>;
type HardwareCycle = UploadCycle<HardwareSensors, HardwarePosition>;

fn credential_store(config: &AgentConfig) -> CredentialStore {
    CredentialStore::new(AgentState::new(&config.data_dir), config)
}

fn api_client(config: &AgentConfig) -> Result<ApiClient> {
    Ok(ApiClient::new(config.require_backend()?)?)
}

/// Bring up the sensors and modem and wire them into an upload cycle
fn upload_cycle(config: &AgentConfig) -> Result<HardwareCycle> {
    let api = match config.backend_url.as_deref() {
        Some(url) => Some(ApiClient::new(url)?),
        None => {
            log::warn!("BACKEND_URL not set; readings will be queued offline");
            None
        }
    };

    let sensors = SensorHub::init(
        Shtc3::new(I2cConnector::new(config.i2c_bus)),
        Pms5003::new(SerialConnector::new(config.pms_serial())),
    );
    let session = ModemSession::new(
        SerialConnector::new(config.sim7_serial()),
        config.gnss_profile,
        config.gnss_power_on,
    );
    let mut position = PositionProvider::new(session, config.fallback_fix());
    position.init();

    Ok(UploadCycle::new(
        sensors,
        position,
        api,
        credential_store(config),
        OfflineQueue::in_dir(&config.data_dir),
    ))
}
