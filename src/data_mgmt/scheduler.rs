//! Cron-driven tick scheduler.
//!
//! A timer thread sleeps until the next fire time and hands triggers to a
//! single worker thread. A trigger that arrives while the previous tick is
//! still running is dropped, never queued.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use flume::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid schedule expression {expression:?}: {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("could not start scheduler thread: {0}")]
    Spawn(#[from] io::Error),
}

pub trait Job: Send + 'static {
    fn run(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerResult {
    Started,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleStatus {
    pub expression: Option<String>,
    pub running: bool,
}

/// Accepts 5-field (minute resolution) and 6/7-field (with seconds) expressions
pub fn parse_schedule(expression: &str) -> Result<Schedule, SchedulerError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// Next fire time strictly after `now`, in the wall-clock time of `now`'s zone
pub fn next_fire<Tz: TimeZone>(schedule: &Schedule, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    schedule.after(now).next()
}

/// Clears the busy flag when the tick ends, panicking or not
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
struct Trigger {
    busy: Arc<AtomicBool>,
    jobs: Sender<()>,
}

impl Trigger {
    fn fire(&self) -> TriggerResult {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Previous tick still running, skipping this one");
            return TriggerResult::Skipped;
        }
        if self.jobs.send(()).is_err() {
            self.busy.store(false, Ordering::Release);
            log::error!("Tick worker is gone");
            return TriggerResult::Skipped;
        }
        TriggerResult::Started
    }
}

struct Timer {
    expression: String,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

pub struct TickScheduler {
    trigger: Trigger,
    worker: Option<JoinHandle<()>>,
    timer: Option<Timer>,
}

fn worker_loop<J: Job>(mut job: J, jobs: Receiver<()>, busy: Arc<AtomicBool>) {
    for () in jobs.iter() {
        let _guard = BusyGuard(&busy);
        if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
            log::error!("Tick panicked");
        }
    }
}

fn timer_loop(schedule: Schedule, stop: Receiver<()>, trigger: Trigger) {
    loop {
        let Some(next) = next_fire(&schedule, &Local::now()) else {
            log::warn!("Schedule has no upcoming fire times");
            return;
        };
        let wait = (next - Local::now()).to_std().unwrap_or_default();
        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                trigger.fire();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

impl TickScheduler {
    pub fn new<J: Job>(job: J) -> Result<Self, SchedulerError> {
        let busy = Arc::new(AtomicBool::new(false));
        let (tx, rx) = flume::unbounded();
        let worker = {
            let busy = busy.clone();
            thread::Builder::new()
                .name("tick-worker".into())
                .spawn(move || worker_loop(job, rx, busy))?
        };
        Ok(TickScheduler {
            trigger: Trigger { busy, jobs: tx },
            worker: Some(worker),
            timer: None,
        })
    }

    /// Run a tick now unless one is already in progress
    pub fn trigger(&self) -> TriggerResult {
        self.trigger.fire()
    }

    pub fn is_busy(&self) -> bool {
        self.trigger.busy.load(Ordering::Acquire)
    }

    /// Install `expression` as the schedule, replacing any previous one
    pub fn start(&mut self, expression: &str) -> Result<(), SchedulerError> {
        let schedule = parse_schedule(expression)?;
        self.stop();

        let (stop_tx, stop_rx) = flume::bounded(1);
        let trigger = self.trigger.clone();
        let thread = thread::Builder::new()
            .name("tick-timer".into())
            .spawn(move || timer_loop(schedule, stop_rx, trigger))?;
        self.timer = Some(Timer {
            expression: expression.to_string(),
            stop: stop_tx,
            thread,
        });
        log::info!("Scheduler running with {expression:?}");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            let _ = timer.stop.send(());
            if timer.thread.join().is_err() {
                log::error!("Timer thread panicked");
            }
            log::info!("Stopped schedule {:?}", timer.expression);
        }
    }

    pub fn status(&self) -> ScheduleStatus {
        ScheduleStatus {
            expression: self.timer.as_ref().map(|t| t.expression.clone()),
            running: self.timer.is_some(),
        }
    }

    /// Block until the schedule is stopped from another thread or ends
    pub fn wait(&mut self) {
        if let Some(timer) = self.timer.take() {
            if timer.thread.join().is_err() {
                log::error!("Timer thread panicked");
            }
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
        // Closing the channel ends the worker once the current tick is done
        let (closed, _) = flume::bounded(0);
        self.trigger.jobs = closed;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
