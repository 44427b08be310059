//! One acquire-and-deliver tick.

use std::fmt;

use crate::data_mgmt::models::Payload;
use crate::data_mgmt::queue::{DrainOutcome, OfflineQueue, QueueError};
use crate::data_mgmt::scheduler::Job;
use crate::interfaces::http_api::ApiClient;
use crate::node_mgmt::credentials::CredentialStore;
use crate::readers::{PositionSource, SensorSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueReason {
    NoBackend,
    NoCredentials(String),
    SendFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was obtained, nothing sent or queued
    Empty,
    Queued(QueueReason),
    /// The current payload was delivered; `drained` older ones went with it
    Delivered { drained: usize, remaining: usize },
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Empty => write!(f, "empty: no sensor or position data"),
            CycleOutcome::Queued(QueueReason::NoBackend) => {
                write!(f, "queued: no backend configured")
            }
            CycleOutcome::Queued(QueueReason::NoCredentials(why)) => {
                write!(f, "queued: no credentials ({why})")
            }
            CycleOutcome::Queued(QueueReason::SendFailed(why)) => {
                write!(f, "queued: send failed ({why})")
            }
            CycleOutcome::Delivered { drained, remaining } => write!(
                f,
                "delivered (offline queue: {drained} sent, {remaining} remaining)"
            ),
        }
    }
}

pub struct UploadCycle<S, P> {
    sensors: S,
    position: P,
    api: Option<ApiClient>,
    credentials: CredentialStore,
    queue: OfflineQueue,
}

fn park(
    queue: &OfflineQueue,
    payload: Payload,
    reason: QueueReason,
) -> Result<CycleOutcome, QueueError> {
    queue.enqueue(payload)?;
    Ok(CycleOutcome::Queued(reason))
}

impl<S: SensorSource, P: PositionSource> UploadCycle<S, P> {
    /// `api` is `None` when no backend URL is configured; every payload is then queued.
    pub fn new(
        sensors: S,
        position: P,
        api: Option<ApiClient>,
        credentials: CredentialStore,
        queue: OfflineQueue,
    ) -> Self {
        UploadCycle {
            sensors,
            position,
            api,
            credentials,
            queue,
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Run one tick. Only a failure to persist the offline queue is an error.
    pub fn tick(&mut self) -> Result<CycleOutcome, QueueError> {
        let reading = self.sensors.read();
        let fix = self.position.current_position();
        let payload = Payload::compose(&reading, Some(&fix));
        if payload.is_empty() {
            log::warn!("Nothing to send this tick");
            return Ok(CycleOutcome::Empty);
        }

        let Some(api) = self.api.as_ref() else {
            log::warn!("No backend configured, queueing payload");
            return park(&self.queue, payload, QueueReason::NoBackend);
        };

        let creds = match self.credentials.resolve(api) {
            Ok(creds) => creds,
            Err(e) => {
                log::warn!("Credentials unavailable, queueing payload: {e}");
                return park(&self.queue, payload, QueueReason::NoCredentials(e.to_string()));
            }
        };

        if let Err(e) = api.send_reading(&payload, &creds) {
            log::warn!("Error sending reading, queueing payload: {e}");
            return park(&self.queue, payload, QueueReason::SendFailed(e.to_string()));
        }
        log::info!(
            "Reading sent for device {}: {}",
            creds.device_id,
            serde_json::to_string(&payload).unwrap_or_default()
        );

        let drained = match self.queue.drain(|p| api.send_reading(p, &creds)) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Could not drain offline queue: {e}");
                DrainOutcome::default()
            }
        };
        if drained.delivered > 0 {
            log::info!(
                "Offline queue drained: {} sent, {} remaining",
                drained.delivered,
                drained.remaining
            );
        }
        Ok(CycleOutcome::Delivered {
            drained: drained.delivered,
            remaining: drained.remaining,
        })
    }
}

impl<S, P> Job for UploadCycle<S, P>
where
    S: SensorSource + 'static,
    P: PositionSource + 'static,
{
    fn run(&mut self) {
        match self.tick() {
            Ok(outcome) => log::debug!("Tick finished: {outcome}"),
            Err(e) => log::error!("Tick failed: {e}"),
        }
    }
}
