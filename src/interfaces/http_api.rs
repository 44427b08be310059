use std::io;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{defaults, endpoints};
use crate::data_mgmt::models::Payload;
use crate::node_mgmt::credentials::Credentials;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("could not decode response: {0}")]
    Decode(#[from] io::Error),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
    #[error("could not set up TLS: {0}")]
    Tls(#[from] native_tls::Error),
}

impl ApiError {
    /// Connection problems, server errors and rate limiting are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }
}

impl From<ureq::Error> for ApiError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, resp) => ApiError::Status {
                status,
                url: resp.get_url().to_string(),
            },
            ureq::Error::Transport(t) => ApiError::Transport(t.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrollRequest {
    device_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollResponse {
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Device as listed by `GET /api/devices`
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RemoteDevice {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Blocking client for the collector API
#[derive(Clone)]
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let agent = ureq::AgentBuilder::new()
            .tls_connector(Arc::new(native_tls::TlsConnector::new()?))
            .timeout(defaults::API_REQUEST_TIMEOUT)
            .build();
        Ok(ApiClient {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange an enrollment token for an API key
    pub fn enroll(&self, token: &str, device_id: u64) -> Result<String, ApiError> {
        log::debug!("Enrolling device {device_id}");
        let resp = self
            .agent
            .post(&self.url(endpoints::ENROLL))
            .set(endpoints::HEADER_ENROLL_TOKEN, token)
            .send_json(EnrollRequest { device_id })?;
        let body: EnrollResponse = resp.into_json()?;
        body.api_key
            .filter(|k| !k.is_empty())
            .ok_or(ApiError::MissingField("apiKey"))
    }

    /// Deliver one payload. Any non-error HTTP status counts as delivered.
    pub fn send_reading(&self, payload: &Payload, creds: &Credentials) -> Result<(), ApiError> {
        self.agent
            .post(&self.url(endpoints::READINGS))
            .set(endpoints::HEADER_API_KEY, &creds.api_key)
            .set(endpoints::HEADER_DEVICE_ID, &creds.device_id.to_string())
            .send_json(payload)?;
        Ok(())
    }

    pub fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let resp = self
            .agent
            .post(&self.url(endpoints::LOGIN))
            .send_json(LoginRequest { email, password })?;
        let body: LoginResponse = resp.into_json()?;
        body.token
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingField("token"))
    }

    pub fn list_devices(&self, jwt: &str) -> Result<Vec<RemoteDevice>, ApiError> {
        let resp = self
            .agent
            .get(&self.url(endpoints::DEVICES))
            .set("Authorization", &format!("Bearer {jwt}"))
            .call()?;
        decode_or_default(resp)
    }

    pub fn create_device(&self, jwt: &str, device: &NewDevice) -> Result<RemoteDevice, ApiError> {
        let resp = self
            .agent
            .post(&self.url(endpoints::DEVICES))
            .set("Authorization", &format!("Bearer {jwt}"))
            .send_json(device)?;
        Ok(resp.into_json()?)
    }
}

/// A `null` or empty body decodes as the type's default
fn decode_or_default<T: DeserializeOwned + Default>(resp: ureq::Response) -> Result<T, ApiError> {
    let raw = resp.into_string()?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    let value: Option<T> = serde_json::from_str(&raw).map_err(io::Error::from)?;
    Ok(value.unwrap_or_default())
}
