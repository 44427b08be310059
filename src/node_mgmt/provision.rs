//! Register this node with the collector and obtain its credentials.
//!
//! Logs in with the agent account, finds or creates the device by name,
//! stores the device identity and enrolls when no API key exists yet.

use statefile::StateFileError;
use thiserror::Error;

use crate::interfaces::http_api::{ApiClient, ApiError, NewDevice, RemoteDevice};
use crate::interfaces::state::DeviceInfo;
use crate::node_mgmt::config::AgentConfig;
use crate::node_mgmt::credentials::{CredentialError, CredentialStore};
use crate::node_mgmt::node_id::{default_device_name, node_serial};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("AGENT_EMAIL and AGENT_PASSWORD are required to provision")]
    MissingLogin,
    #[error("collector returned device id 0 for {0:?}")]
    InvalidDeviceId(String),
    #[error("collector request failed: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Storage(#[from] StateFileError),
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisionError::Api(e) => e.is_transient(),
            ProvisionError::Credentials(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provisioned {
    pub device_id: u64,
    pub name: String,
    pub created: bool,
    pub enrolled: bool,
}

pub struct Provisioner<'a> {
    api: &'a ApiClient,
    config: &'a AgentConfig,
    credentials: &'a mut CredentialStore,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        api: &'a ApiClient,
        config: &'a AgentConfig,
        credentials: &'a mut CredentialStore,
    ) -> Self {
        Provisioner {
            api,
            config,
            credentials,
        }
    }

    fn login(&self) -> Result<String, ProvisionError> {
        let (Some(email), Some(password)) = (&self.config.agent_email, &self.config.agent_password)
        else {
            return Err(ProvisionError::MissingLogin);
        };
        let token = self.api.login(email, password)?;
        self.credentials.state().save_jwt(&token)?;
        log::info!("Logged in as {email}");
        Ok(token)
    }

    fn token(&self) -> Result<String, ProvisionError> {
        match self.credentials.state().load_jwt()? {
            Some(token) => Ok(token),
            None => self.login(),
        }
    }

    /// Call `request` with the session token; a stale token is replaced once
    fn authorized<T>(
        &self,
        request: impl Fn(&ApiClient, &str) -> Result<T, ApiError>,
    ) -> Result<T, ProvisionError> {
        let token = self.token()?;
        match request(self.api, &token) {
            Err(e) if e.is_unauthorized() => {
                log::info!("Session token rejected, logging in again");
                self.credentials.state().clear_jwt()?;
                let token = self.login()?;
                Ok(request(self.api, &token)?)
            }
            other => Ok(other?),
        }
    }

    fn find_device(&self, name: &str) -> Result<Option<RemoteDevice>, ProvisionError> {
        let wanted = name.to_lowercase();
        let devices = self.authorized(|api, jwt| api.list_devices(jwt))?;
        Ok(devices.into_iter().find(|d| d.name.to_lowercase() == wanted))
    }

    fn new_device(&self, name: &str) -> NewDevice {
        NewDevice {
            name: name.to_string(),
            location: self.config.device_location.clone(),
            owner_id: self.config.owner_id,
            lat: Some(self.config.lat).filter(|v| v.is_finite()),
            lng: Some(self.config.lng).filter(|v| v.is_finite()),
        }
    }

    pub fn device_name(&self) -> String {
        self.config
            .device_name
            .clone()
            .unwrap_or_else(|| default_device_name(&node_serial()))
    }

    pub fn run(&mut self) -> Result<Provisioned, ProvisionError> {
        let name = self.device_name();

        let (device, created) = match self.find_device(&name)? {
            Some(device) => {
                log::info!("Device {name:?} already registered as {}", device.id);
                (device, false)
            }
            None => {
                let body = self.new_device(&name);
                let device = self.authorized(|api, jwt| api.create_device(jwt, &body))?;
                log::info!("Registered device {name:?} as {}", device.id);
                (device, true)
            }
        };
        if device.id == 0 {
            return Err(ProvisionError::InvalidDeviceId(name));
        }

        self.credentials.store_device(&DeviceInfo {
            device_id: device.id,
            name: name.clone(),
        })?;

        let enrolled = if self.credentials.api_key()?.is_none() {
            self.credentials.enroll_device(self.api, device.id)?;
            true
        } else {
            false
        };

        Ok(Provisioned {
            device_id: device.id,
            name,
            created,
            enrolled,
        })
    }
}
