//! Daily medication reminders.
//!
//! The scheduler polls on a fixed interval and fires every prescription whose
//! reminder time equals the current hour and minute. No "last sent" state is
//! kept: a poll cadence that visits the same minute twice fires twice, and a
//! restart inside a matching minute fires again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use smarthealth_core::{
    CareDirectory, Clock, CoreResult, HealthStore, Patient, Prescription, PrescriptionBook,
    ReminderTime, SystemClock,
};

use crate::alerting::NotificationQueue;

/// Default polling interval.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderScan {
    /// Reminders handed to the delivery queue
    pub dispatched: usize,
    /// Matches without a destination (or refused by a full queue)
    pub skipped: usize,
}

/// Compose the reminder text for one prescription.
pub fn reminder_message(patient: &Patient, prescription: &Prescription) -> String {
    format!(
        "**Medicine Reminder!**\n\n\
         Hello {},\n\n\
         It's time to take your medicine:\n\
         - **{}** ({})",
        patient.user.first_name, prescription.medicine_name, prescription.dose,
    )
}

/// Periodic reminder scan.
#[derive(Clone)]
pub struct ReminderScheduler {
    store: Arc<dyn HealthStore>,
    queue: NotificationQueue,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl ReminderScheduler {
    /// Create a scheduler polling every `interval`.
    pub fn new(store: Arc<dyn HealthStore>, queue: NotificationQueue, interval: Duration) -> Self {
        Self {
            store,
            queue,
            clock: Arc::new(SystemClock),
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Read the wall clock from `clock` instead of the system.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fire every reminder due at `time`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the prescription lookup fails. Per-patient
    /// problems are logged and counted as skips.
    pub fn scan(&self, time: ReminderTime) -> CoreResult<ReminderScan> {
        let due = self.store.prescriptions_due_at(time)?;
        let mut scan = ReminderScan::default();

        if due.is_empty() {
            return Ok(scan);
        }
        debug!(time = %time, due = due.len(), "Reminders due");

        for prescription in &due {
            let patient = match self.store.patient(prescription.patient_id) {
                Ok(Some(p)) => p,
                Ok(None) => {
                    scan.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        prescription_id = %prescription.id,
                        error = %e,
                        "Patient lookup failed"
                    );
                    scan.skipped += 1;
                    continue;
                }
            };

            let Some(destination) = patient.destination.clone() else {
                info!(
                    username = %patient.user.username,
                    prescription_id = %prescription.id,
                    "Patient has a reminder but no destination"
                );
                scan.skipped += 1;
                continue;
            };

            let text = reminder_message(&patient, prescription);
            if self.queue.send("reminder", destination, text) {
                scan.dispatched += 1;
            } else {
                scan.skipped += 1;
            }
        }

        Ok(scan)
    }

    /// Poll forever, matching against local wall-clock time. The first scan
    /// happens immediately.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Reminder scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let time = ReminderTime::from_time(&self.clock.now().with_timezone(&Local));
            match self.scan(time) {
                Ok(scan) if scan.dispatched + scan.skipped > 0 => {
                    info!(
                        time = %time,
                        dispatched = scan.dispatched,
                        skipped = scan.skipped,
                        "Reminder scan"
                    );
                }
                Ok(_) => {}
                // Transient backend failures are retried by the next tick
                Err(e) if e.is_recoverable() => {
                    warn!(time = %time, error = %e, "Reminder scan failed");
                }
                Err(e) => error!(time = %time, error = %e, "Reminder scan failed"),
            }
        }
    }
}
