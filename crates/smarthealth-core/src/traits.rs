//! Core trait definitions for the SmartHealth system.
//!
//! These traits are the seams between the evaluators and their collaborators:
//!
//! - [`Clock`]: source of "now" for freshness thresholds and acceptance stamps
//! - [`CareDirectory`]: users, patients and responders
//! - [`ReadingStore`]: the append-only reading log
//! - [`PrescriptionBook`]: medication schedules
//! - [`NoteBook`]: responder annotations
//! - [`HealthStore`]: everything above, as one object-safe bound

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StorageResult;
use crate::types::{
    ApiKey, Destination, Identity, NewPatient, NewPrescription, NewResponder, NewUser, Note,
    NoteId, Patient, PatientId, PatientProfile, Prescription, PrescriptionId, Reading,
    ReminderTime, Responder, ResponderId, ResponderProfile, User, UserDetails, UserId,
    VitalSample,
};

// =============================================================================
// Time
// =============================================================================

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by simulations and tests that
/// need exact threshold boundaries.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Users, patients and responders.
pub trait CareDirectory: Send + Sync {
    /// Creates a login account.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if the username is taken.
    fn insert_user(&self, user: &NewUser) -> StorageResult<User>;

    /// Looks up an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn user(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Accounts by join time, newest first, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn users(&self, limit: Option<usize>) -> StorageResult<Vec<User>>;

    /// Resolves the tagged role of an account, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn identity_of(&self, user: UserId) -> StorageResult<Option<Identity>>;

    /// Registers a responder.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if the account already has a role.
    fn insert_responder(&self, responder: &NewResponder) -> StorageResult<Responder>;

    /// Looks up a responder.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn responder(&self, id: ResponderId) -> StorageResult<Option<Responder>>;

    /// Every responder, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn responders(&self) -> StorageResult<Vec<Responder>>;

    /// Replaces a responder's profile and the editable fields of its account.
    /// Returns `None` if the responder does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails; nothing is changed in that case.
    fn update_responder_profile(
        &self,
        id: ResponderId,
        details: &UserDetails,
        profile: &ResponderProfile,
    ) -> StorageResult<Option<Responder>>;

    /// Sets or clears a responder's SOS destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn set_responder_destination(
        &self,
        id: ResponderId,
        destination: Option<&Destination>,
    ) -> StorageResult<bool>;

    /// Registers a patient and issues their identity key.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if the account already has a role.
    fn insert_patient(&self, patient: &NewPatient) -> StorageResult<Patient>;

    /// Looks up a patient.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn patient(&self, id: PatientId) -> StorageResult<Option<Patient>>;

    /// Finds the patient whose identity key exactly matches `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn patient_by_api_key(&self, key: &ApiKey) -> StorageResult<Option<Patient>>;

    /// Every patient, in registration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn patients(&self) -> StorageResult<Vec<Patient>>;

    /// Replaces a patient's profile and the editable fields of its account.
    /// Returns `None` if the patient does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails; nothing is changed in that case.
    fn update_patient_profile(
        &self,
        id: PatientId,
        details: &UserDetails,
        profile: &PatientProfile,
    ) -> StorageResult<Option<Patient>>;

    /// All patients assigned to a responder.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn patients_of(&self, responder: ResponderId) -> StorageResult<Vec<Patient>>;

    /// Assigns (or unassigns) a patient's responder.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn assign_responder(
        &self,
        patient: PatientId,
        responder: Option<ResponderId>,
    ) -> StorageResult<bool>;

    /// Sets or clears a patient's reminder destination.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if another patient already uses it.
    fn set_patient_destination(
        &self,
        id: PatientId,
        destination: Option<&Destination>,
    ) -> StorageResult<bool>;

    /// Number of responders.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn responder_count(&self) -> StorageResult<u64>;

    /// Number of patients.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn patient_count(&self) -> StorageResult<u64>;
}

/// The append-only log of sensor readings.
///
/// "Latest" always means greatest `recorded_at`, ties broken by insertion order.
pub trait ReadingStore: Send + Sync {
    /// Appends a reading stamped with `recorded_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the patient does not exist or the insert fails.
    fn append_reading(
        &self,
        patient: PatientId,
        vitals: &VitalSample,
        recorded_at: DateTime<Utc>,
    ) -> StorageResult<Reading>;

    /// The most recent reading of one patient.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn latest_reading(&self, patient: PatientId) -> StorageResult<Option<Reading>>;

    /// The most recent reading across all patients.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn latest_reading_overall(&self) -> StorageResult<Option<Reading>>;

    /// A patient's readings, newest first, optionally limited.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn reading_history(
        &self,
        patient: PatientId,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Reading>>;

    /// Every reading belonging to any of `patients`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn readings_for(&self, patients: &[PatientId]) -> StorageResult<Vec<Reading>>;

    /// Total number of readings.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn reading_count(&self) -> StorageResult<u64>;
}

/// Medication schedules.
pub trait PrescriptionBook: Send + Sync {
    /// Records a prescription.
    ///
    /// # Errors
    ///
    /// Returns an error if the patient or responder does not exist.
    fn insert_prescription(&self, prescription: &NewPrescription) -> StorageResult<Prescription>;

    /// Looks up a prescription.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn prescription(&self, id: PrescriptionId) -> StorageResult<Option<Prescription>>;

    /// A patient's prescriptions ordered by reminder time.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn prescriptions_for(&self, patient: PatientId) -> StorageResult<Vec<Prescription>>;

    /// Every prescription whose reminder falls on exactly this hour and minute.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn prescriptions_due_at(&self, time: ReminderTime) -> StorageResult<Vec<Prescription>>;

    /// Total number of prescriptions.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn prescription_count(&self) -> StorageResult<u64>;
}

/// Responder annotations on patients.
pub trait NoteBook: Send + Sync {
    /// Records a note stamped with `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the patient or responder does not exist.
    fn insert_note(
        &self,
        patient: PatientId,
        author: ResponderId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> StorageResult<Note>;

    /// Looks up a note.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn note(&self, id: NoteId) -> StorageResult<Option<Note>>;

    /// A patient's notes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn notes_for(&self, patient: PatientId) -> StorageResult<Vec<Note>>;

    /// Deletes a note, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_note(&self, id: NoteId) -> StorageResult<bool>;
}

/// The full persistence surface used by the monitoring service.
pub trait HealthStore: CareDirectory + ReadingStore + PrescriptionBook + NoteBook {}

impl<T> HealthStore for T where T: CareDirectory + ReadingStore + PrescriptionBook + NoteBook {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::seconds(15));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(15));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
