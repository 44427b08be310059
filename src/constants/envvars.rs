pub const BACKEND_URL: &str = "BACKEND_URL";
pub const DEVICE_ID: &str = "DEVICE_ID";
pub const ENROLL_TOKEN: &str = "ENROLL_TOKEN";
pub const API_KEY: &str = "API_KEY";
pub const CRON_SCHEDULE: &str = "CRON_SCHEDULE";

pub const I2C_BUS: &str = "I2C_BUS";
pub const PMS_PORT: &str = "PMS_PORT";
pub const PMS_BAUD: &str = "PMS_BAUD";
pub const SIM7_PORT: &str = "SIM7_PORT";
pub const SIM7_BAUD: &str = "SIM7_BAUD";
pub const SIM7_GNSS_POWER_ON: &str = "SIM7_GNSS_POWER_ON";
pub const SIM7_GNSS_PROFILE: &str = "SIM7_GNSS_PROFILE";

pub const LAT: &str = "LAT";
pub const LNG: &str = "LNG";
pub const GPS_ACCURACY: &str = "GPS_ACCURACY";

pub const AUTO_PROVISION: &str = "AUTO_PROVISION";
pub const AGENT_EMAIL: &str = "AGENT_EMAIL";
pub const AGENT_PASSWORD: &str = "AGENT_PASSWORD";
pub const DEVICE_NAME: &str = "DEVICE_NAME";
pub const DEVICE_LOCATION: &str = "DEVICE_LOCATION";
pub const OWNER_ID: &str = "OWNER_ID";

pub const DATA_DIR: &str = "AGENT_DATA_DIR";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
