//! # SmartHealth Core
//!
//! Core types, traits, and error handling for the SmartHealth patient
//! monitoring system.
//!
//! This crate provides the building blocks shared by the monitoring service
//! and its binary:
//!
//! - **Core Data Types**: [`Patient`], [`Responder`], [`Reading`],
//!   [`Prescription`], [`Note`] and the tagged session [`Identity`].
//!
//! - **Error Types**: [`CoreError`] carries the failure taxonomy of the
//!   ingestion, escalation and record-keeping operations; [`StorageError`]
//!   covers the persistence layer.
//!
//! - **Traits**: [`HealthStore`] and its parts describe the persistence
//!   contract, and [`Clock`] abstracts "now" for freshness thresholds.
//!
//! - **Freshness windows**: the three independent recency thresholds used by
//!   the status and escalation evaluators.
//!
//! ## Example
//!
//! ```rust
//! use smarthealth_core::{ReminderTime, LIVENESS_WINDOW_SECS};
//!
//! let t: ReminderTime = "08:30".parse().unwrap();
//! assert_eq!(t.minute_of_day(), 510);
//! assert_eq!(LIVENESS_WINDOW_SECS, 15);
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{CoreError, CoreResult, StorageError, StorageResult};
pub use traits::{
    CareDirectory, Clock, FixedClock, HealthStore, NoteBook, PrescriptionBook, ReadingStore,
    SystemClock,
};
pub use types::{
    ApiKey, Destination, Identity, NewPatient, NewPrescription, NewResponder, NewUser, Note,
    NoteId, Patient, PatientId, PatientProfile, Prescription, PrescriptionId, Reading, ReadingId,
    ReminderTime, Responder, ResponderId, ResponderProfile, User, UserDetails, UserId,
    VitalSample,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A patient's device is "active" while its newest reading is younger than this.
pub const LIVENESS_WINDOW_SECS: i64 = 15;

/// The whole system is "Online" while the newest reading anywhere is younger than this.
pub const SYSTEM_ONLINE_WINDOW_SECS: i64 = 30;

/// An SOS reports the device offline when the newest reading is older than this.
pub const SOS_FRESHNESS_WINDOW_SECS: i64 = 60;

/// Placeholder rendered for any value that is absent or undefined.
pub const UNAVAILABLE: &str = "--";
