pub mod config;
pub mod credentials;
pub mod node_id;
pub mod provision;

pub use config::{AgentConfig, ConfigError};
pub use credentials::{CredentialError, CredentialStore, Credentials};
pub use provision::{ProvisionError, Provisioned, Provisioner};
