use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::constants::{defaults, envvars};
use crate::data_mgmt::models::Fix;
use crate::hal::SerialSettings;
use crate::readers::sim7000::GnssProfile;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
    #[error("{} is required", envvars::BACKEND_URL)]
    MissingBackend,
}

/// Agent settings, taken from the process environment
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub backend_url: Option<String>,
    pub device_id: Option<u64>,
    pub enroll_token: Option<String>,
    pub api_key: Option<String>,
    pub cron_schedule: String,

    pub i2c_bus: u8,
    pub pms_port: String,
    pub pms_baud: u32,
    pub sim7_port: String,
    pub sim7_baud: u32,
    pub gnss_power_on: bool,
    pub gnss_profile: GnssProfile,

    pub lat: f64,
    pub lng: f64,
    pub gps_accuracy: f64,

    pub auto_provision: bool,
    pub agent_email: Option<String>,
    pub agent_password: Option<String>,
    pub device_name: Option<String>,
    pub device_location: Option<String>,
    pub owner_id: Option<u64>,

    pub data_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            backend_url: None,
            device_id: None,
            enroll_token: None,
            api_key: None,
            cron_schedule: defaults::CRON_SCHEDULE.to_string(),
            i2c_bus: defaults::I2C_BUS,
            pms_port: defaults::PMS_PORT.to_string(),
            pms_baud: defaults::PMS_BAUD,
            sim7_port: defaults::SIM7_PORT.to_string(),
            sim7_baud: defaults::SIM7_BAUD,
            gnss_power_on: true,
            gnss_profile: GnssProfile::Cgns,
            lat: 0.0,
            lng: 0.0,
            gps_accuracy: defaults::GPS_ACCURACY,
            auto_provision: false,
            agent_email: None,
            agent_password: None,
            device_name: None,
            device_location: None,
            owner_id: None,
            data_dir: PathBuf::from(defaults::DATA_DIR),
        }
    }
}

/// Set and non-blank
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var: name, value }),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = var(name) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { var: name, value }),
    }
}

/// Must be an absolute http(s) URL; trailing slashes are dropped
fn backend_url() -> Result<Option<String>, ConfigError> {
    let Some(value) = var(envvars::BACKEND_URL) else {
        return Ok(None);
    };
    match Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(Some(value.trim_end_matches('/').to_string()))
        }
        _ => Err(ConfigError::Invalid {
            var: envvars::BACKEND_URL,
            value,
        }),
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AgentConfig {
            backend_url: backend_url()?,
            device_id: parse_var::<u64>(envvars::DEVICE_ID)?.filter(|id| *id != 0),
            enroll_token: var(envvars::ENROLL_TOKEN),
            api_key: var(envvars::API_KEY),
            cron_schedule: var(envvars::CRON_SCHEDULE)
                .unwrap_or_else(|| defaults::CRON_SCHEDULE.to_string()),

            i2c_bus: parse_var(envvars::I2C_BUS)?.unwrap_or(defaults::I2C_BUS),
            pms_port: var(envvars::PMS_PORT).unwrap_or_else(|| defaults::PMS_PORT.to_string()),
            pms_baud: parse_var(envvars::PMS_BAUD)?.unwrap_or(defaults::PMS_BAUD),
            sim7_port: var(envvars::SIM7_PORT).unwrap_or_else(|| defaults::SIM7_PORT.to_string()),
            sim7_baud: parse_var(envvars::SIM7_BAUD)?.unwrap_or(defaults::SIM7_BAUD),
            gnss_power_on: parse_flag(envvars::SIM7_GNSS_POWER_ON, true)?,
            gnss_profile: GnssProfile::from_name(
                &var(envvars::SIM7_GNSS_PROFILE)
                    .unwrap_or_else(|| defaults::SIM7_GNSS_PROFILE.to_string()),
            ),

            lat: parse_var(envvars::LAT)?.unwrap_or(0.0),
            lng: parse_var(envvars::LNG)?.unwrap_or(0.0),
            gps_accuracy: parse_var(envvars::GPS_ACCURACY)?.unwrap_or(defaults::GPS_ACCURACY),

            auto_provision: parse_flag(envvars::AUTO_PROVISION, false)?,
            agent_email: var(envvars::AGENT_EMAIL),
            agent_password: var(envvars::AGENT_PASSWORD),
            device_name: var(envvars::DEVICE_NAME),
            device_location: var(envvars::DEVICE_LOCATION),
            owner_id: parse_var(envvars::OWNER_ID)?,

            data_dir: var(envvars::DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(defaults::DATA_DIR)),
        })
    }

    pub fn require_backend(&self) -> Result<&str, ConfigError> {
        self.backend_url
            .as_deref()
            .ok_or(ConfigError::MissingBackend)
    }

    pub fn fallback_fix(&self) -> Fix {
        Fix::fallback(self.lat, self.lng, self.gps_accuracy)
    }

    pub fn pms_serial(&self) -> SerialSettings {
        SerialSettings::new(&self.pms_port, self.pms_baud)
    }

    pub fn sim7_serial(&self) -> SerialSettings {
        SerialSettings::new(&self.sim7_port, self.sim7_baud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: &[&str] = &[
        envvars::BACKEND_URL,
        envvars::DEVICE_ID,
        envvars::ENROLL_TOKEN,
        envvars::API_KEY,
        envvars::CRON_SCHEDULE,
        envvars::I2C_BUS,
        envvars::PMS_PORT,
        envvars::PMS_BAUD,
        envvars::SIM7_PORT,
        envvars::SIM7_BAUD,
        envvars::SIM7_GNSS_POWER_ON,
        envvars::SIM7_GNSS_PROFILE,
        envvars::LAT,
        envvars::LNG,
        envvars::GPS_ACCURACY,
        envvars::AUTO_PROVISION,
        envvars::AGENT_EMAIL,
        envvars::AGENT_PASSWORD,
        envvars::DEVICE_NAME,
        envvars::DEVICE_LOCATION,
        envvars::OWNER_ID,
        envvars::DATA_DIR,
    ];

    /// Run `f` with every agent variable unset except `set`
    fn with_env<R>(set: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let vars: Vec<(&str, Option<&str>)> = ALL_VARS
            .iter()
            .map(|name| {
                let value = set.iter().find(|(k, _)| k == name).map(|(_, v)| *v);
                (*name, value)
            })
            .collect();
        temp_env::with_vars(vars, f)
    }

    #[test]
    fn defaults() {
        let cfg = with_env(&[], AgentConfig::from_env).unwrap();
        assert_eq!(cfg, AgentConfig::default());

        assert_eq!(cfg.backend_url, None);
        assert_eq!(cfg.device_id, None);
        assert_eq!(cfg.cron_schedule, "*/30 * * * * *");
        assert_eq!(cfg.i2c_bus, 1);
        assert_eq!(cfg.pms_port, "/dev/serial0");
        assert_eq!(cfg.pms_baud, 9600);
        assert_eq!(cfg.sim7_port, "/dev/ttyUSB3");
        assert_eq!(cfg.sim7_baud, 115200);
        assert!(cfg.gnss_power_on);
        assert_eq!(cfg.gnss_profile, GnssProfile::Cgns);
        assert_eq!(cfg.fallback_fix(), Fix::fallback(0.0, 0.0, 30.0));
        assert!(!cfg.auto_provision);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.require_backend(), Err(ConfigError::MissingBackend));
    }

    #[test]
    fn overrides() {
        let cfg = with_env(
            &[
                (envvars::BACKEND_URL, "https://collector.example.org//"),
                (envvars::DEVICE_ID, "42"),
                (envvars::API_KEY, "k-1"),
                (envvars::SIM7_GNSS_POWER_ON, "0"),
                (envvars::SIM7_GNSS_PROFILE, "cgps"),
                (envvars::LAT, "-33.45"),
                (envvars::LNG, "-70.66"),
                (envvars::AUTO_PROVISION, "TRUE"),
                (envvars::OWNER_ID, "3"),
                (envvars::DATA_DIR, "/var/lib/field-agent"),
            ],
            AgentConfig::from_env,
        )
        .unwrap();

        assert_eq!(cfg.require_backend(), Ok("https://collector.example.org"));
        assert_eq!(cfg.device_id, Some(42));
        assert_eq!(cfg.api_key.as_deref(), Some("k-1"));
        assert!(!cfg.gnss_power_on);
        assert_eq!(cfg.gnss_profile, GnssProfile::Cgps);
        assert_eq!(cfg.lat, -33.45);
        assert_eq!(cfg.lng, -70.66);
        assert!(cfg.auto_provision);
        assert_eq!(cfg.owner_id, Some(3));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/field-agent"));
    }

    #[test]
    fn zero_device_id_means_unset() {
        let cfg = with_env(&[(envvars::DEVICE_ID, "0")], AgentConfig::from_env).unwrap();
        assert_eq!(cfg.device_id, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            with_env(&[(envvars::PMS_BAUD, "fast")], AgentConfig::from_env),
            Err(ConfigError::Invalid {
                var: envvars::PMS_BAUD,
                value: "fast".into()
            })
        );
        assert!(with_env(&[(envvars::AUTO_PROVISION, "maybe")], AgentConfig::from_env).is_err());
        assert!(
            with_env(&[(envvars::BACKEND_URL, "collector:8080")], AgentConfig::from_env).is_err()
        );
    }
}
