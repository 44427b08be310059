//! Credential documents kept in the agent data directory.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use statefile::{JsonFile, StateFileError};

use crate::constants::files;
use crate::helpers::now_epoch_millis;

/// Load `file`, moving it aside and reporting it absent when it cannot be parsed
fn load_or_quarantine<T>(file: &JsonFile) -> Result<Option<T>, StateFileError>
where
    T: DeserializeOwned,
{
    match file.load::<T>() {
        Err(e) if e.is_parse_error() => {
            log::error!("{e}");
            file.quarantine(&format!("corrupt-{}", now_epoch_millis()))?;
            Ok(None)
        }
        other => other,
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyDoc {
    #[serde(default)]
    api_key: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct JwtDoc {
    #[serde(default)]
    token: String,
}

pub struct AgentState {
    data_dir: PathBuf,
    api_key: JsonFile,
    device: JsonFile,
    jwt: JsonFile,
}

impl AgentState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        AgentState {
            api_key: JsonFile::new(data_dir.join(files::API_KEY)),
            device: JsonFile::new(data_dir.join(files::DEVICE)),
            jwt: JsonFile::new(data_dir.join(files::JWT)),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Persisted API key; an empty key counts as none
    pub fn load_api_key(&self) -> Result<Option<String>, StateFileError> {
        Ok(load_or_quarantine::<ApiKeyDoc>(&self.api_key)?
            .map(|doc| doc.api_key)
            .filter(|k| !k.is_empty()))
    }

    pub fn save_api_key(&self, api_key: &str) -> Result<(), StateFileError> {
        self.api_key.save(&ApiKeyDoc {
            api_key: api_key.to_string(),
        })
    }

    pub fn load_device(&self) -> Result<Option<DeviceInfo>, StateFileError> {
        Ok(load_or_quarantine::<DeviceInfo>(&self.device)?.filter(|d| d.device_id != 0))
    }

    pub fn save_device(&self, device: &DeviceInfo) -> Result<(), StateFileError> {
        self.device.save(device)
    }

    pub fn load_jwt(&self) -> Result<Option<String>, StateFileError> {
        Ok(load_or_quarantine::<JwtDoc>(&self.jwt)?
            .map(|doc| doc.token)
            .filter(|t| !t.is_empty()))
    }

    pub fn save_jwt(&self, token: &str) -> Result<(), StateFileError> {
        self.jwt.save(&JwtDoc {
            token: token.to_string(),
        })
    }

    pub fn clear_jwt(&self) -> Result<(), StateFileError> {
        self.jwt.remove()
    }
}
