//! Durable list of payloads that could not be delivered.
//!
//! The whole list is read and rewritten on every operation. Items keep the
//! order in which they were queued, across restarts.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use statefile::{JsonFile, StateFileError};
use thiserror::Error;

use crate::constants::files;
use crate::data_mgmt::models::Payload;
use crate::helpers::now_epoch_millis;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("offline queue storage: {0}")]
    Storage(#[from] StateFileError),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct QueueItem {
    /// Epoch milliseconds at which the payload was queued
    pub ts: i64,
    pub payload: Payload,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub delivered: usize,
    pub remaining: usize,
}

pub struct OfflineQueue {
    file: JsonFile,
}

impl OfflineQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OfflineQueue {
            file: JsonFile::new(path),
        }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(files::QUEUE))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// An unreadable queue file is moved aside rather than overwritten
    fn load_items(&self) -> Result<Vec<QueueItem>, QueueError> {
        match self.file.load::<Vec<QueueItem>>() {
            Ok(items) => Ok(items.unwrap_or_default()),
            Err(e) if e.is_parse_error() => {
                log::error!("{e}");
                self.file
                    .quarantine(&format!("corrupt-{}", now_epoch_millis()))?;
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn items(&self) -> Result<Vec<QueueItem>, QueueError> {
        self.load_items()
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.load_items()?.len())
    }

    pub fn enqueue(&self, payload: Payload) -> Result<(), QueueError> {
        let mut items = self.load_items()?;
        items.push(QueueItem {
            ts: now_epoch_millis(),
            payload,
        });
        self.file.save(&items)?;
        log::info!("Queued payload offline ({} pending)", items.len());
        Ok(())
    }

    /// Try to deliver every queued payload in order. Delivered items are
    /// dropped, failed ones are kept in their original relative order.
    pub fn drain<F, E>(&self, mut deliver: F) -> Result<DrainOutcome, QueueError>
    where
        F: FnMut(&Payload) -> Result<(), E>,
        E: Display,
    {
        let items = self.load_items()?;
        if items.is_empty() {
            return Ok(DrainOutcome::default());
        }

        let total = items.len();
        let mut remaining = Vec::new();
        for item in items {
            if let Err(e) = deliver(&item.payload) {
                log::debug!("Queued payload from {} not delivered: {e}", item.ts);
                remaining.push(item);
            }
        }
        self.file.save(&remaining)?;

        Ok(DrainOutcome {
            delivered: total - remaining.len(),
            remaining: remaining.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn payload(temperature: f64) -> Payload {
        Payload {
            temperature: Some(temperature),
            ..Default::default()
        }
    }

    #[test]
    fn missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::in_dir(dir.path());

        assert_eq!(queue.len().unwrap(), 0);
        let outcome = queue.drain(|_| Ok::<(), String>(())).unwrap();
        assert_eq!(outcome, DrainOutcome::default());
        assert!(!queue.path().exists());
    }

    #[test]
    fn partial_drain_keeps_failed_item_and_its_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::in_dir(dir.path());
        queue.enqueue(payload(1.0)).unwrap();
        queue.enqueue(payload(2.0)).unwrap();
        let p2_ts = queue.items().unwrap()[1].ts;

        let outcome = queue
            .drain(|p| {
                if p.temperature == Some(1.0) {
                    Ok(())
                } else {
                    Err("HTTP 503")
                }
            })
            .unwrap();

        assert_eq!(
            outcome,
            DrainOutcome {
                delivered: 1,
                remaining: 1
            }
        );
        let left = OfflineQueue::in_dir(dir.path()).items().unwrap();
        assert_eq!(
            left,
            vec![QueueItem {
                ts: p2_ts,
                payload: payload(2.0)
            }]
        );
    }

    #[test]
    fn drain_preserves_order_of_failures() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::in_dir(dir.path());
        for t in [1.0, 2.0, 3.0, 4.0] {
            queue.enqueue(payload(t)).unwrap();
        }

        let mut attempts = Vec::new();
        let outcome = queue
            .drain(|p| {
                attempts.push(p.temperature);
                if p.temperature == Some(2.0) {
                    Ok(())
                } else {
                    Err("down")
                }
            })
            .unwrap();

        assert_eq!(attempts, vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        assert_eq!(outcome.remaining, 3);
        let left: Vec<_> = queue
            .items()
            .unwrap()
            .into_iter()
            .map(|i| i.payload.temperature)
            .collect();
        assert_eq!(left, vec![Some(1.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn file_format() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::in_dir(dir.path());
        queue
            .enqueue(Payload {
                pm25: Some(12),
                ..Default::default()
            })
            .unwrap();

        let raw = fs::read_to_string(queue.path()).unwrap();
        let re = regex::Regex::new(
            r#"^\[\n  \{\n    "ts": \d{13},\n    "payload": \{\n      "pm25": 12\n    \}\n  \}\n\]$"#,
        )
        .unwrap();
        assert!(re.is_match(&raw), "unexpected queue file: {raw}");
    }

    #[test]
    fn corrupt_store_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::in_dir(dir.path());
        fs::write(queue.path(), "[{\"ts\": 1, \"payload\"").unwrap();

        queue.enqueue(payload(3.0)).unwrap();

        assert_eq!(queue.len().unwrap(), 1);
        let quarantined: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("queue.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
    }
}
