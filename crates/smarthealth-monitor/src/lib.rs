//! # SmartHealth Monitor
//!
//! Reading ingestion, device status, SOS escalation and medication reminders
//! for the SmartHealth patient monitoring system.
//!
//! ## Components
//!
//! - [`store`]: SQLite persistence implementing [`smarthealth_core::HealthStore`]
//! - [`ingest`]: the identity-key-authenticated ingestion gateway
//! - [`status`]: liveness, signal/battery labels, fleet status and averages
//! - [`alerting`]: SOS escalation, notification transports and the bounded
//!   delivery queue
//! - [`reminders`]: the periodic medication reminder scan
//! - [`care`]: dashboards, prescriptions and notes
//! - [`api`]: the axum REST API over all of the above
//!
//! ## Data flow
//!
//! ```text
//! device -> IngestionGateway -> ReadingStore -> { LiveStatus, EscalationEvaluator }
//!                                                          |
//!                          ReminderScheduler -> NotificationQueue -> Notifier
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod alerting;
pub mod api;
pub mod care;
pub mod ingest;
pub mod reminders;
pub mod status;
pub mod store;

pub use alerting::{
    Diagnosis, EscalationEvaluator, LogNotifier, NotificationQueue, Notifier, NotifyError,
    QueueConfig, RecordingNotifier, SosOutcome, TelegramConfig, TelegramNotifier,
};
pub use api::{create_router, AppState};
pub use care::CareService;
pub use ingest::{IngestionGateway, ReadingSubmission};
pub use reminders::{ReminderScan, ReminderScheduler};
pub use status::{Averages, LiveStatus, Metric, SignalQuality, SystemStatus};
pub use store::SqliteStore;
