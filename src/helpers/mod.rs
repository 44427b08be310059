mod backoff_retry;
mod load_dotenv;
mod time;

pub use backoff_retry::{backoff_retry, retry_if};
pub use load_dotenv::load_dotenv;
pub use time::{now_epoch_millis, now_iso};

pub mod checksum;
pub mod retry;
