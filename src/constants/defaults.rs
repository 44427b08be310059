use std::time::Duration;

pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);
pub const LOG_LEVEL: &str = "info";
pub const DATA_DIR: &str = "data";

pub const CRON_SCHEDULE: &str = "*/30 * * * * *";

pub const I2C_BUS: u8 = 1;
pub const PMS_PORT: &str = "/dev/serial0";
pub const PMS_BAUD: u32 = 9600;
pub const SIM7_PORT: &str = "/dev/ttyUSB3";
pub const SIM7_BAUD: u32 = 115_200;
pub const SIM7_GNSS_PROFILE: &str = "CGNS";

pub const GPS_ACCURACY: f64 = 30.0;

/// How long to wait before retrying modem initialisation after a failed attempt
pub const POSITION_REINIT_BACKOFF: Duration = Duration::from_secs(3);

/// Time budget for waiting on a complete particulate frame within one tick
pub const PM_FRAME_BUDGET: Duration = Duration::from_millis(1500);

/// Upper bound on the explicit enrollment/provisioning retries
pub const PROVISION_MAX_ELAPSED: Duration = Duration::from_secs(120);
