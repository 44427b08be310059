pub mod http_api;
pub mod state;

pub use http_api::{ApiClient, ApiError};
pub use state::{AgentState, DeviceInfo};
