pub mod models;
pub mod queue;
pub mod scheduler;
pub mod upload;

pub use queue::{DrainOutcome, OfflineQueue, QueueError, QueueItem};
pub use scheduler::{Job, ScheduleStatus, TickScheduler, TriggerResult};
pub use upload::{CycleOutcome, QueueReason, UploadCycle};
