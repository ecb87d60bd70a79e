//! Core data types for the SmartHealth monitoring system.
//!
//! This module defines the entities persisted by the store and passed
//! between the ingestion, status, escalation and reminder components:
//!
//! - **Identifiers**: [`PatientId`], [`ResponderId`], [`UserId`], [`ReadingId`],
//!   [`PrescriptionId`], [`NoteId`], plus the device-facing [`ApiKey`]
//! - **People**: [`User`], [`Patient`], [`Responder`] and their profiles
//! - **Measurements**: [`VitalSample`] and the persisted [`Reading`]
//! - **Care records**: [`Prescription`], [`ReminderTime`], [`Note`]
//! - **Session**: the tagged [`Identity`] of a caller

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Identifier of a login account.
    UserId
);
row_id!(
    /// Identifier of a monitored patient.
    PatientId
);
row_id!(
    /// Identifier of a responder (doctor).
    ResponderId
);
row_id!(
    /// Identifier of a stored sensor reading.
    ReadingId
);
row_id!(
    /// Identifier of a prescription.
    PrescriptionId
);
row_id!(
    /// Identifier of a patient note.
    NoteId
);

/// Opaque identity key issued to a patient and used by their device.
///
/// Keys are random v4 UUIDs, unique across all patients, and never change
/// after issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(Uuid);

impl ApiKey {
    /// Issue a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApiKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Address used by the notification collaborator to route a message
/// (a chat identifier for the Telegram transport).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Build a destination, rejecting blank identifiers.
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// People
// =============================================================================

/// A login account. Patients and responders are each linked to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account id
    pub id: UserId,
    /// Unique login name
    pub username: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Whether the account administers the whole system
    pub is_admin: bool,
    /// When the account was created
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// "First Last", trimmed when either part is empty.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// First letter of the given name, used as an avatar placeholder.
    #[must_use]
    pub fn initial(&self, fallback: char) -> char {
        self.first_name.chars().next().unwrap_or(fallback)
    }
}

/// Fields needed to create a [`User`].
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Unique login name
    pub username: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
    /// Administrator flag
    pub is_admin: bool,
}

/// Name and contact fields a user may edit on their own settings page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Contact email
    pub email: String,
}

/// Descriptive attributes of a patient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    /// Age in years
    pub age: Option<i64>,
    /// Blood type, e.g. "O+"
    pub blood_type: String,
    /// Phone number
    pub contact_number: String,
    /// Occupation
    pub occupation: Option<String>,
    /// Home address
    pub address: Option<String>,
    /// Known medical condition
    pub medical_condition: Option<String>,
}

/// A monitored patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Patient id
    pub id: PatientId,
    /// Linked login account
    pub user: User,
    /// Assigned responder, if any
    pub responder_id: Option<ResponderId>,
    /// Device-facing identity key
    pub api_key: ApiKey,
    /// Where medication reminders are sent
    pub destination: Option<Destination>,
    /// Descriptive attributes
    pub profile: PatientProfile,
}

impl Patient {
    /// Display name of the patient.
    #[must_use]
    pub fn name(&self) -> String {
        self.user.full_name()
    }

    /// Whether this patient is assigned to the given responder.
    #[must_use]
    pub fn is_assigned_to(&self, responder: ResponderId) -> bool {
        self.responder_id == Some(responder)
    }
}

/// Fields needed to register a [`Patient`]. The identity key is issued by the store.
#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    /// Linked login account
    pub user_id: UserId,
    /// Assigned responder
    pub responder_id: Option<ResponderId>,
    /// Reminder destination
    pub destination: Option<Destination>,
    /// Descriptive attributes
    pub profile: PatientProfile,
}

/// Descriptive attributes of a responder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponderProfile {
    /// Medical specialty
    pub specialty: String,
    /// Phone number
    pub contact_number: String,
    /// Free-form working hours
    pub working_hours: String,
    /// Blood type
    pub blood_type: String,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
}

/// A responder (doctor) who serves zero or more patients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    /// Responder id
    pub id: ResponderId,
    /// Linked login account
    pub user: User,
    /// Where SOS alerts are sent; may be unset
    pub destination: Option<Destination>,
    /// Descriptive attributes
    pub profile: ResponderProfile,
}

impl Responder {
    /// "Dr. First Last"
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("Dr. {}", self.user.full_name())
    }
}

/// Fields needed to register a [`Responder`].
#[derive(Debug, Clone, Default)]
pub struct NewResponder {
    /// Linked login account
    pub user_id: UserId,
    /// SOS destination
    pub destination: Option<Destination>,
    /// Descriptive attributes
    pub profile: ResponderProfile,
}

// =============================================================================
// Readings
// =============================================================================

/// The numeric fields a device submits. Values are not range-checked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VitalSample {
    /// Beats per minute
    pub heart_rate: f64,
    /// Degrees Celsius
    pub body_temperature: f64,
    /// Degrees Celsius
    pub room_temperature: Option<f64>,
    /// Relative humidity, percent
    pub humidity: Option<f64>,
    /// Expected 0-100
    pub battery_level: Option<i64>,
    /// RSSI-like scale, usually negative
    pub signal_strength: Option<i64>,
}

/// A persisted sensor reading. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Reading id
    pub id: ReadingId,
    /// Owning patient
    pub patient_id: PatientId,
    /// Submitted values
    #[serde(flatten)]
    pub vitals: VitalSample,
    /// Server-assigned acceptance time
    pub recorded_at: DateTime<Utc>,
}

impl Reading {
    /// Age of the reading relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.recorded_at
    }
}

// =============================================================================
// Care records
// =============================================================================

/// A daily time of day at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime {
    hour: u8,
    minute: u8,
}

impl ReminderTime {
    /// Build from hour (0-23) and minute (0-59).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPayload`] when either part is out of range.
    pub fn new(hour: u32, minute: u32) -> Result<Self, CoreError> {
        if hour > 23 || minute > 59 {
            return Err(CoreError::malformed(format!(
                "reminder time {hour:02}:{minute:02} is out of range"
            )));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    /// Hour of day.
    #[must_use]
    pub fn hour(&self) -> u32 {
        u32::from(self.hour)
    }

    /// Minute of hour.
    #[must_use]
    pub fn minute(&self) -> u32 {
        u32::from(self.minute)
    }

    /// Minutes since midnight.
    #[must_use]
    pub fn minute_of_day(&self) -> u32 {
        self.hour() * 60 + self.minute()
    }

    /// Inverse of [`ReminderTime::minute_of_day`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPayload`] for values past 23:59.
    pub fn from_minute_of_day(value: u32) -> Result<Self, CoreError> {
        Self::new(value / 60, value % 60)
    }

    /// Truncate any time of day to its hour and minute.
    #[must_use]
    pub fn from_time<T: chrono::Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ReminderTime {
    type Err = CoreError;

    /// Accepts `HH:MM` or `HH:MM:SS`; seconds are discarded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let field = |p: Option<&str>| -> Result<u32, CoreError> {
            p.filter(|v| !v.is_empty() && v.len() <= 2)
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or_else(|| CoreError::malformed(format!("invalid reminder time '{s}'")))
        };
        let hour = field(parts.next())?;
        let minute = field(parts.next())?;
        if let Some(seconds) = parts.next() {
            if field(Some(seconds))? > 59 {
                return Err(CoreError::malformed(format!("invalid reminder time '{s}'")));
            }
        }
        if parts.next().is_some() {
            return Err(CoreError::malformed(format!("invalid reminder time '{s}'")));
        }
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(value: ReminderTime) -> Self {
        value.to_string()
    }
}

/// A medication schedule written by a responder for one of their patients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    /// Prescription id
    pub id: PrescriptionId,
    /// Patient taking the medicine
    pub patient_id: PatientId,
    /// Prescribing responder
    pub responder_id: ResponderId,
    /// Medicine name
    pub medicine_name: String,
    /// Free-form dose, e.g. "500mg"
    pub dose: String,
    /// Daily reminder time
    pub reminder_time: ReminderTime,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create a [`Prescription`].
#[derive(Debug, Clone)]
pub struct NewPrescription {
    /// Patient taking the medicine
    pub patient_id: PatientId,
    /// Prescribing responder
    pub responder_id: ResponderId,
    /// Medicine name
    pub medicine_name: String,
    /// Free-form dose
    pub dose: String,
    /// Daily reminder time
    pub reminder_time: ReminderTime,
}

/// Free-text annotation on a patient, authored by a responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note id
    pub id: NoteId,
    /// Annotated patient
    pub patient_id: PatientId,
    /// Author
    pub responder_id: ResponderId,
    /// Body
    pub text: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Day/month label shown next to the note.
    #[must_use]
    pub fn short_date(&self) -> String {
        self.created_at.format("%d/%m").to_string()
    }
}

// =============================================================================
// Session identity
// =============================================================================

/// Role of the current caller, resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Identity {
    /// System administrator
    Admin,
    /// A responder (doctor)
    Responder(ResponderId),
    /// A patient
    Patient(PatientId),
    /// An account with no role link
    Unassigned,
}

impl Identity {
    /// Label used in user listings.
    #[must_use]
    pub fn role_label(&self) -> &'static str {
        match self {
            Identity::Admin => "Admin",
            Identity::Responder(_) => "Doctor",
            Identity::Patient(_) => "Patient",
            Identity::Unassigned => "Staff",
        }
    }

    /// Landing page for this role.
    #[must_use]
    pub fn home_path(&self) -> &'static str {
        match self {
            Identity::Responder(_) => "/dashboard/doctor/",
            Identity::Patient(_) => "/dashboard/patient/",
            Identity::Admin => "/dashboard/admin/",
            Identity::Unassigned => "/admin/",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_reminder_time_parse() {
        let t: ReminderTime = "08:30".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (8, 30));

        let t: ReminderTime = "21:05:44".parse().unwrap();
        assert_eq!(t.to_string(), "21:05");

        assert!("24:00".parse::<ReminderTime>().is_err());
        assert!("8".parse::<ReminderTime>().is_err());
        assert!("08:61".parse::<ReminderTime>().is_err());
        assert!("08:30:00:00".parse::<ReminderTime>().is_err());
        assert!("ab:cd".parse::<ReminderTime>().is_err());
    }

    #[test]
    fn test_reminder_time_minute_of_day() {
        let t = ReminderTime::new(23, 59).unwrap();
        assert_eq!(t.minute_of_day(), 1439);
        assert_eq!(ReminderTime::from_minute_of_day(1439).unwrap(), t);
        assert!(ReminderTime::from_minute_of_day(1440).is_err());

        let clock = NaiveTime::from_hms_opt(8, 30, 59).unwrap();
        assert_eq!(ReminderTime::from_time(&clock).to_string(), "08:30");
    }

    #[test]
    fn test_reminder_time_serde() {
        let t = ReminderTime::new(7, 5).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"07:05\"");
        let back: ReminderTime = serde_json::from_str("\"07:05:00\"").unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_api_key_parse() {
        let key = ApiKey::generate();
        let parsed: ApiKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
        assert!("not-a-key".parse::<ApiKey>().is_err());
    }

    #[test]
    fn test_destination_rejects_blank() {
        assert!(Destination::parse("   ").is_none());
        assert_eq!(Destination::parse(" 12345 ").unwrap().as_str(), "12345");
    }

    #[test]
    fn test_identity_routing() {
        assert_eq!(Identity::Responder(ResponderId::new(1)).home_path(), "/dashboard/doctor/");
        assert_eq!(Identity::Patient(PatientId::new(1)).home_path(), "/dashboard/patient/");
        assert_eq!(Identity::Admin.home_path(), "/dashboard/admin/");
        assert_eq!(Identity::Unassigned.home_path(), "/admin/");
        assert_eq!(Identity::Unassigned.role_label(), "Staff");
    }

    #[test]
    fn test_identity_serde_tagged() {
        let json = serde_json::to_value(Identity::Patient(PatientId::new(9))).unwrap();
        assert_eq!(json, serde_json::json!({"role": "patient", "id": 9}));
    }
}
