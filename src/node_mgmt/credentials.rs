use statefile::StateFileError;
use thiserror::Error;

use crate::interfaces::http_api::{ApiClient, ApiError};
use crate::interfaces::state::{AgentState, DeviceInfo};
use crate::node_mgmt::config::AgentConfig;

/// What a reading upload needs to authenticate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub device_id: u64,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no device id (set DEVICE_ID or run provisioning)")]
    MissingDeviceId,
    #[error("no API key (set API_KEY, ENROLL_TOKEN or run enroll)")]
    MissingApiKey,
    #[error("ENROLL_TOKEN is required to enroll")]
    MissingEnrollToken,
    #[error("enrollment failed: {0}")]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StateFileError),
}

impl CredentialError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CredentialError::Api(e) if e.is_transient())
    }
}

/// API key and device identity, loaded lazily and cached for the life of
/// the process. Statically configured values take precedence over the
/// persisted ones.
pub struct CredentialStore {
    state: AgentState,
    static_api_key: Option<String>,
    static_device_id: Option<u64>,
    enroll_token: Option<String>,
    api_key: Option<String>,
    device_id: Option<u64>,
}

impl CredentialStore {
    pub fn new(state: AgentState, config: &AgentConfig) -> Self {
        CredentialStore {
            state,
            static_api_key: config.api_key.clone(),
            static_device_id: config.device_id,
            enroll_token: config.enroll_token.clone(),
            api_key: None,
            device_id: None,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn device_id(&mut self) -> Result<Option<u64>, StateFileError> {
        if let Some(id) = self.static_device_id.or(self.device_id) {
            return Ok(Some(id));
        }
        self.device_id = self.state.load_device()?.map(|d| d.device_id);
        Ok(self.device_id)
    }

    pub fn api_key(&mut self) -> Result<Option<String>, StateFileError> {
        if let Some(key) = self.static_api_key.as_ref().or(self.api_key.as_ref()) {
            return Ok(Some(key.clone()));
        }
        self.api_key = self.state.load_api_key()?;
        Ok(self.api_key.clone())
    }

    pub fn store_api_key(&mut self, api_key: &str) -> Result<(), StateFileError> {
        self.state.save_api_key(api_key)?;
        self.api_key = Some(api_key.to_string());
        Ok(())
    }

    pub fn store_device(&mut self, device: &DeviceInfo) -> Result<(), StateFileError> {
        self.state.save_device(device)?;
        self.device_id = Some(device.device_id);
        Ok(())
    }

    /// Exchange the enrollment token for an API key and persist it
    pub fn enroll(&mut self, api: &ApiClient) -> Result<String, CredentialError> {
        let device_id = self.device_id()?.ok_or(CredentialError::MissingDeviceId)?;
        self.enroll_device(api, device_id)
    }

    pub fn enroll_device(
        &mut self,
        api: &ApiClient,
        device_id: u64,
    ) -> Result<String, CredentialError> {
        let token = self
            .enroll_token
            .clone()
            .ok_or(CredentialError::MissingEnrollToken)?;
        let api_key = api.enroll(&token, device_id)?;
        self.store_api_key(&api_key)?;
        log::info!(
            "Enrolled device {device_id}; API key saved in {}",
            self.state.data_dir().display()
        );
        Ok(api_key)
    }

    /// Credentials for an upload, enrolling first when there is no key but
    /// an enrollment token is configured.
    pub fn resolve(&mut self, api: &ApiClient) -> Result<Credentials, CredentialError> {
        let device_id = self.device_id()?.ok_or(CredentialError::MissingDeviceId)?;
        let api_key = match self.api_key()? {
            Some(key) => key,
            None if self.enroll_token.is_some() => {
                log::info!("No API key, trying to enroll");
                self.enroll_device(api, device_id)?
            }
            None => return Err(CredentialError::MissingApiKey),
        };
        Ok(Credentials { api_key, device_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use crate::constants::{endpoints, files};

    fn config() -> AgentConfig {
        AgentConfig::default()
    }

    #[test]
    fn static_values_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let state = AgentState::new(dir.path());
        state.save_api_key("persisted").unwrap();
        let mut cfg = config();
        cfg.api_key = Some("static".into());
        cfg.device_id = Some(5);

        let mut store = CredentialStore::new(state, &cfg);
        assert_eq!(store.api_key().unwrap().as_deref(), Some("static"));
        assert_eq!(store.device_id().unwrap(), Some(5));
    }

    #[test]
    fn persisted_values_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let state = AgentState::new(dir.path());
        state.save_api_key("k-1").unwrap();
        state
            .save_device(&DeviceInfo {
                device_id: 8,
                name: "lab".into(),
            })
            .unwrap();

        let mut store = CredentialStore::new(state, &config());
        assert_eq!(store.device_id().unwrap(), Some(8));
        assert_eq!(store.api_key().unwrap().as_deref(), Some("k-1"));

        fs::remove_file(dir.path().join(files::API_KEY)).unwrap();
        fs::remove_file(dir.path().join(files::DEVICE)).unwrap();
        assert_eq!(store.device_id().unwrap(), Some(8));
        assert_eq!(store.api_key().unwrap().as_deref(), Some("k-1"));
    }

    #[test]
    fn missing_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CredentialStore::new(AgentState::new(dir.path()), &config());
        let api = ApiClient::new("http://127.0.0.1:1").unwrap();

        assert!(matches!(
            store.resolve(&api),
            Err(CredentialError::MissingDeviceId)
        ));
    }

    #[test]
    fn missing_key_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.device_id = Some(3);
        let mut store = CredentialStore::new(AgentState::new(dir.path()), &cfg);
        let api = ApiClient::new("http://127.0.0.1:1").unwrap();

        assert!(matches!(
            store.resolve(&api),
            Err(CredentialError::MissingApiKey)
        ));
    }

    #[test]
    fn resolve_enrolls_and_persists() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("POST", endpoints::ENROLL)
            .match_header(endpoints::HEADER_ENROLL_TOKEN, "tok")
            .with_body(r#"{"apiKey":"fresh"}"#)
            .expect(1)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.device_id = Some(3);
        cfg.enroll_token = Some("tok".into());
        let mut store = CredentialStore::new(AgentState::new(dir.path()), &cfg);
        let api = ApiClient::new(&server.url()).unwrap();

        let creds = store.resolve(&api).unwrap();
        assert_eq!(
            creds,
            Credentials {
                api_key: "fresh".into(),
                device_id: 3
            }
        );
        // Second resolve uses the cached key
        store.resolve(&api).unwrap();
        m.assert();
        assert_eq!(
            AgentState::new(dir.path()).load_api_key().unwrap().as_deref(),
            Some("fresh")
        );
    }

    #[test]
    fn corrupt_key_file_leads_to_enrollment() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("POST", endpoints::ENROLL)
            .with_body(r#"{"apiKey":"re-enrolled"}"#)
            .expect(1)
            .create();

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(files::API_KEY), r#"{"apiKey": "#).unwrap();
        let mut cfg = config();
        cfg.device_id = Some(3);
        cfg.enroll_token = Some("tok".into());
        let mut store = CredentialStore::new(AgentState::new(dir.path()), &cfg);
        let api = ApiClient::new(&server.url()).unwrap();

        assert_eq!(store.resolve(&api).unwrap().api_key, "re-enrolled");
        m.assert();
        assert_eq!(
            AgentState::new(dir.path()).load_api_key().unwrap().as_deref(),
            Some("re-enrolled")
        );
    }
}
