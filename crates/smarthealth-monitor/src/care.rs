//! Care records and dashboard projections.
//!
//! [`CareService`] owns every read model shown to patients, responders and
//! administrators, plus the two responder-authored records: prescriptions and
//! notes. Ownership rules live here so the HTTP layer only maps errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use smarthealth_core::{
    CareDirectory, Clock, CoreError, CoreResult, HealthStore, NewPrescription, Note, NoteBook,
    NoteId, Patient, PatientId, PatientProfile, Prescription, PrescriptionBook, Reading,
    ReadingStore, ReminderTime, Responder, ResponderId, ResponderProfile, User, UserDetails,
    UserId, UNAVAILABLE,
};

use crate::status::{
    battery, classify_signal, is_active, monitoring_label, one_decimal, whole, Averages,
    LiveStatus, Metric, SignalQuality, SystemStatus,
};

/// Items shown in the short lists on the patient dashboard.
pub const DASHBOARD_LIST_LEN: usize = 5;

/// Users listed on the admin dashboard.
pub const RECENT_USERS_LEN: usize = 5;

fn or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNAVAILABLE.to_string(),
    }
}

fn trimmed(details: UserDetails) -> UserDetails {
    UserDetails {
        first_name: details.first_name.trim().to_string(),
        last_name: details.last_name.trim().to_string(),
        email: details.email.trim().to_string(),
    }
}

// =============================================================================
// Views
// =============================================================================

/// Patient's own dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    /// The patient
    pub patient: Patient,
    /// Polled status of the device
    pub live: LiveStatus,
    /// Battery level of the newest reading
    pub battery: Metric<i64>,
    /// Signal label of the newest reading
    pub signal: Metric<SignalQuality>,
    /// Earliest prescriptions of the day
    pub prescriptions: Vec<Prescription>,
    /// Most recent readings, newest first
    pub recent_readings: Vec<Reading>,
    /// When the view was built
    pub generated_at: DateTime<Utc>,
}

/// A note as shown on a patient card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteView {
    /// Note id
    pub id: NoteId,
    /// Body
    pub text: String,
    /// `dd/mm`
    pub date: String,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            text: note.text.clone(),
            date: note.short_date(),
        }
    }
}

/// One patient on a responder's dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PatientCard {
    pub id: PatientId,
    pub name: String,
    pub age: Metric<i64>,
    pub blood: String,
    pub contact: String,
    pub occupation: String,
    pub address: String,
    pub condition: String,
    pub initial: char,
    pub heart_rate: Metric<i64>,
    pub temp: Metric<f64>,
    pub room_temp: Metric<f64>,
    pub humidity: Metric<i64>,
    pub is_active: bool,
    pub status: &'static str,
    pub notes: Vec<NoteView>,
}

impl PatientCard {
    fn build(
        patient: &Patient,
        latest: Option<&Reading>,
        notes: &[Note],
        now: DateTime<Utc>,
    ) -> Self {
        let profile = &patient.profile;
        let active = is_active(latest, now);
        let vitals = latest.map(|r| r.vitals);

        Self {
            id: patient.id,
            name: patient.name(),
            age: profile.age.into(),
            blood: or_placeholder(Some(&profile.blood_type)),
            contact: or_placeholder(Some(&profile.contact_number)),
            occupation: or_placeholder(profile.occupation.as_deref()),
            address: or_placeholder(profile.address.as_deref()),
            condition: profile
                .medical_condition
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or("Healthy")
                .to_string(),
            initial: patient.user.initial('P'),
            heart_rate: vitals.map(|v| whole(v.heart_rate)).into(),
            temp: vitals.map(|v| one_decimal(v.body_temperature)).into(),
            room_temp: vitals.and_then(|v| v.room_temperature).map(one_decimal).into(),
            humidity: vitals.and_then(|v| v.humidity).map(whole).into(),
            is_active: active,
            status: monitoring_label(active),
            notes: notes.iter().map(NoteView::from).collect(),
        }
    }
}

/// A responder's dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ResponderDashboard {
    /// "Dr. First Last"
    pub responder: String,
    /// Number of assigned patients
    pub total_patients: usize,
    /// One card per assigned patient
    pub patients: Vec<PatientCard>,
    /// Averages over every reading of every assigned patient
    pub averages: Averages,
    /// e.g. "Monday, January 01, 2024"
    pub today: String,
}

/// A responder's view of one of their patients.
#[derive(Debug, Clone, Serialize)]
pub struct PatientDetail {
    /// The patient
    pub patient: Patient,
    /// All prescriptions by time of day
    pub prescriptions: Vec<Prescription>,
    /// All readings, newest first
    pub readings: Vec<Reading>,
}

/// A user row on the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub date_joined: DateTime<Utc>,
    /// "Admin", "Doctor", "Patient" or "Staff"
    pub role: &'static str,
}

/// Administrator overview.
#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_doctors: u64,
    pub total_patients: u64,
    pub total_prescriptions: u64,
    pub total_readings: u64,
    pub recent_users: Vec<UserSummary>,
    pub system_status: SystemStatus,
}

// =============================================================================
// Service
// =============================================================================

/// Read models and responder-authored records.
#[derive(Clone)]
pub struct CareService {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
}

impl CareService {
    /// Create a service over a store.
    pub fn new(store: Arc<dyn HealthStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// A patient record.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the patient does not exist.
    pub fn patient(&self, id: PatientId) -> CoreResult<Patient> {
        self.store
            .patient(id)?
            .ok_or_else(|| CoreError::not_found("Patient", id.to_string()))
    }

    /// A responder record.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the responder does not exist.
    pub fn responder(&self, id: ResponderId) -> CoreResult<Responder> {
        self.store
            .responder(id)?
            .ok_or_else(|| CoreError::not_found("Responder", id.to_string()))
    }

    /// Patient that `responder` is allowed to act on.
    fn owned_patient(&self, responder: ResponderId, id: PatientId) -> CoreResult<Patient> {
        let patient = self.patient(id)?;
        if !patient.is_assigned_to(responder) {
            return Err(CoreError::forbidden(format!(
                "patient {id} is not assigned to responder {responder}"
            )));
        }
        Ok(patient)
    }

    // ---- patient -----------------------------------------------------------

    /// Live status of a patient's device.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn live_status(&self, patient: PatientId) -> CoreResult<LiveStatus> {
        let latest = self.store.latest_reading(patient)?;
        Ok(LiveStatus::evaluate(latest.as_ref(), self.clock.now()))
    }

    /// The patient's own dashboard.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the patient does not exist.
    pub fn patient_dashboard(&self, id: PatientId) -> CoreResult<PatientDashboard> {
        let patient = self.patient(id)?;
        let now = self.clock.now();

        let recent_readings = self.store.reading_history(id, Some(DASHBOARD_LIST_LEN))?;
        let latest = recent_readings.first();
        let mut prescriptions = self.store.prescriptions_for(id)?;
        prescriptions.truncate(DASHBOARD_LIST_LEN);

        Ok(PatientDashboard {
            live: LiveStatus::evaluate(latest, now),
            battery: battery(latest.and_then(|r| r.vitals.battery_level)),
            signal: classify_signal(latest.and_then(|r| r.vitals.signal_strength)),
            patient,
            prescriptions,
            recent_readings,
            generated_at: now,
        })
    }

    /// Every reading of a patient, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn patient_history(&self, id: PatientId) -> CoreResult<Vec<Reading>> {
        Ok(self.store.reading_history(id, None)?)
    }

    /// Every prescription of a patient by time of day.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn patient_medications(&self, id: PatientId) -> CoreResult<Vec<Prescription>> {
        Ok(self.store.prescriptions_for(id)?)
    }

    /// Apply a patient's own settings form.
    ///
    /// The medical condition is maintained by responders and kept as stored.
    ///
    /// # Errors
    ///
    /// [`CoreError::MalformedPayload`] for an out-of-range age,
    /// [`CoreError::NotFound`] if the patient does not exist.
    pub fn update_patient_settings(
        &self,
        id: PatientId,
        details: UserDetails,
        mut profile: PatientProfile,
    ) -> CoreResult<Patient> {
        if let Some(age) = profile.age.filter(|age| !(0..=150).contains(age)) {
            return Err(CoreError::malformed(format!("age {age} is out of range")));
        }
        let current = self.patient(id)?;
        profile.medical_condition = current.profile.medical_condition;

        let patient = self
            .store
            .update_patient_profile(id, &trimmed(details), &profile)?
            .ok_or_else(|| CoreError::not_found("Patient", id.to_string()))?;
        info!(patient_id = %id, "Patient settings updated");
        Ok(patient)
    }

    // ---- responder ---------------------------------------------------------

    /// Apply a responder's own settings form.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the responder does not exist.
    pub fn update_responder_settings(
        &self,
        id: ResponderId,
        details: UserDetails,
        profile: ResponderProfile,
    ) -> CoreResult<Responder> {
        let responder = self
            .store
            .update_responder_profile(id, &trimmed(details), &profile)?
            .ok_or_else(|| CoreError::not_found("Responder", id.to_string()))?;
        info!(responder_id = %id, "Responder settings updated");
        Ok(responder)
    }

    /// A responder's dashboard.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the responder does not exist.
    pub fn responder_dashboard(&self, id: ResponderId) -> CoreResult<ResponderDashboard> {
        let responder = self.responder(id)?;
        let patients = self.store.patients_of(id)?;
        let now = self.clock.now();

        let mut cards = Vec::with_capacity(patients.len());
        for patient in &patients {
            let latest = self.store.latest_reading(patient.id)?;
            let notes = self.store.notes_for(patient.id)?;
            cards.push(PatientCard::build(patient, latest.as_ref(), &notes, now));
        }

        let ids: Vec<PatientId> = patients.iter().map(|p| p.id).collect();
        let readings = self.store.readings_for(&ids)?;

        Ok(ResponderDashboard {
            responder: responder.display_name(),
            total_patients: patients.len(),
            patients: cards,
            averages: Averages::over(&readings),
            today: now.format("%A, %B %d, %Y").to_string(),
        })
    }

    /// A responder's view of one of their own patients.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the patient does not exist,
    /// [`CoreError::Forbidden`] if it is not assigned to `responder`.
    pub fn patient_detail(
        &self,
        responder: ResponderId,
        id: PatientId,
    ) -> CoreResult<PatientDetail> {
        let patient = self.owned_patient(responder, id)?;
        Ok(PatientDetail {
            prescriptions: self.store.prescriptions_for(id)?,
            readings: self.store.reading_history(id, None)?,
            patient,
        })
    }

    /// Prescribe a medicine with a daily reminder.
    ///
    /// `reminder_time` accepts `HH:MM` or `HH:MM:SS`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MalformedPayload`] for an empty name or dose, or a bad time.
    /// - [`CoreError::NotFound`] if the patient does not exist.
    /// - [`CoreError::Forbidden`] if the patient is not assigned to `responder`.
    pub fn create_prescription(
        &self,
        responder: ResponderId,
        patient: PatientId,
        medicine_name: &str,
        dose: &str,
        reminder_time: &str,
    ) -> CoreResult<Prescription> {
        let medicine_name = medicine_name.trim();
        let dose = dose.trim();
        if medicine_name.is_empty() || dose.is_empty() {
            return Err(CoreError::malformed("medicine name and dose are required"));
        }
        let reminder_time: ReminderTime = reminder_time.parse()?;

        self.owned_patient(responder, patient)?;
        let prescription = self.store.insert_prescription(&NewPrescription {
            patient_id: patient,
            responder_id: responder,
            medicine_name: medicine_name.to_string(),
            dose: dose.to_string(),
            reminder_time,
        })?;

        info!(
            prescription_id = %prescription.id,
            patient_id = %patient,
            responder_id = %responder,
            reminder_time = %reminder_time,
            "Prescription created"
        );
        Ok(prescription)
    }

    /// Annotate a patient.
    ///
    /// # Errors
    ///
    /// [`CoreError::MalformedPayload`] for empty text, [`CoreError::NotFound`]
    /// if the patient does not exist.
    pub fn add_note(
        &self,
        author: ResponderId,
        patient: PatientId,
        text: &str,
    ) -> CoreResult<Note> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::malformed("note text is required"));
        }
        self.patient(patient)?;
        let note = self
            .store
            .insert_note(patient, author, text, self.clock.now())?;
        info!(note_id = %note.id, patient_id = %patient, responder_id = %author, "Note added");
        Ok(note)
    }

    /// Delete a note written by `author`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if the note does not exist,
    /// [`CoreError::Forbidden`] if someone else wrote it.
    pub fn delete_note(&self, author: ResponderId, id: NoteId) -> CoreResult<()> {
        let note = self
            .store
            .note(id)?
            .ok_or_else(|| CoreError::not_found("Note", id.to_string()))?;
        if note.responder_id != author {
            return Err(CoreError::forbidden(format!(
                "note {id} was written by another responder"
            )));
        }
        self.store.delete_note(id)?;
        info!(note_id = %id, responder_id = %author, "Note deleted");
        Ok(())
    }

    // ---- admin -------------------------------------------------------------

    fn summarize(&self, user: User) -> CoreResult<UserSummary> {
        let role = if user.is_admin {
            "Admin"
        } else {
            self.store
                .identity_of(user.id)?
                .map_or("Staff", |identity| identity.role_label())
        };
        Ok(UserSummary {
            id: user.id,
            full_name: user.full_name(),
            username: user.username,
            email: user.email,
            date_joined: user.date_joined,
            role,
        })
    }

    fn user_summaries(&self, limit: Option<usize>) -> CoreResult<Vec<UserSummary>> {
        self.store
            .users(limit)?
            .into_iter()
            .map(|u| self.summarize(u))
            .collect()
    }

    /// Every account with its role label, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub fn admin_users(&self) -> CoreResult<Vec<UserSummary>> {
        self.user_summaries(None)
    }

    /// Every responder.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn admin_responders(&self) -> CoreResult<Vec<Responder>> {
        Ok(self.store.responders()?)
    }

    /// Every patient.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn admin_patients(&self) -> CoreResult<Vec<Patient>> {
        Ok(self.store.patients()?)
    }

    /// Administrator overview.
    ///
    /// # Errors
    ///
    /// Returns an error if a lookup fails.
    pub fn admin_dashboard(&self) -> CoreResult<AdminDashboard> {
        let recent_users = self.user_summaries(Some(RECENT_USERS_LEN))?;
        let latest = self.store.latest_reading_overall()?;

        Ok(AdminDashboard {
            total_doctors: self.store.responder_count()?,
            total_patients: self.store.patient_count()?,
            total_prescriptions: self.store.prescription_count()?,
            total_readings: self.store.reading_count()?,
            recent_users,
            system_status: SystemStatus::evaluate(latest.as_ref(), self.clock.now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::{Duration, TimeZone};
    use smarthealth_core::{
        CareDirectory, FixedClock, NewPatient, NewResponder, NewUser, PatientProfile,
        ReadingStore, VitalSample,
    };

    struct Fixture {
        store: Arc<SqliteStore>,
        clock: Arc<FixedClock>,
        care: CareService,
        doc: ResponderId,
        other_doc: ResponderId,
        patient: PatientId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
        ));

        let mut responders = Vec::new();
        for name in ["house", "wilson"] {
            let user = store
                .insert_user(&NewUser {
                    username: name.to_string(),
                    first_name: "Greg".to_string(),
                    last_name: name.to_string(),
                    ..NewUser::default()
                })
                .unwrap();
            responders.push(
                store
                    .insert_responder(&NewResponder {
                        user_id: user.id,
                        ..NewResponder::default()
                    })
                    .unwrap()
                    .id,
            );
        }

        let user = store
            .insert_user(&NewUser {
                username: "pat".to_string(),
                first_name: "Pat".to_string(),
                last_name: "Doe".to_string(),
                ..NewUser::default()
            })
            .unwrap();
        let patient = store
            .insert_patient(&NewPatient {
                user_id: user.id,
                responder_id: Some(responders[0]),
                profile: PatientProfile {
                    blood_type: "A+".to_string(),
                    ..PatientProfile::default()
                },
                ..NewPatient::default()
            })
            .unwrap()
            .id;

        let care = CareService::new(store.clone(), clock.clone());
        Fixture {
            store,
            clock,
            care,
            doc: responders[0],
            other_doc: responders[1],
            patient,
        }
    }

    fn record(f: &Fixture, hr: f64, temp: f64, age_secs: i64) {
        f.store
            .append_reading(
                f.patient,
                &VitalSample {
                    heart_rate: hr,
                    body_temperature: temp,
                    ..VitalSample::default()
                },
                f.clock.now() - Duration::seconds(age_secs),
            )
            .unwrap();
    }

    #[test]
    fn test_responder_dashboard_cards() {
        let f = fixture();
        record(&f, 80.0, 37.0, 40);
        record(&f, 70.0, 36.0, 5);
        f.care.add_note(f.doc, f.patient, "check bp").unwrap();

        let dash = f.care.responder_dashboard(f.doc).unwrap();
        assert_eq!(dash.total_patients, 1);
        assert_eq!(dash.responder, "Dr. Greg house");
        assert_eq!(dash.today, "Monday, March 04, 2024");
        assert_eq!(dash.averages.heart_rate, Metric::Value(75));
        assert_eq!(dash.averages.body_temperature, Metric::Value(36.5));

        let card = &dash.patients[0];
        assert_eq!(card.name, "Pat Doe");
        assert_eq!(card.blood, "A+");
        assert_eq!(card.contact, "--");
        assert_eq!(card.condition, "Healthy");
        assert_eq!(card.initial, 'P');
        assert_eq!(card.heart_rate, Metric::Value(70));
        assert_eq!(card.status, "Active Monitoring");
        assert_eq!(card.notes.len(), 1);
        assert_eq!(card.notes[0].date, "04/03");
    }

    #[test]
    fn test_responder_without_patients() {
        let f = fixture();
        let dash = f.care.responder_dashboard(f.other_doc).unwrap();
        assert_eq!(dash.total_patients, 0);
        assert_eq!(dash.averages.heart_rate, Metric::Unavailable);
    }

    #[test]
    fn test_patient_detail_requires_ownership() {
        let f = fixture();
        assert!(f.care.patient_detail(f.doc, f.patient).is_ok());
        assert!(matches!(
            f.care.patient_detail(f.other_doc, f.patient),
            Err(CoreError::Forbidden { .. })
        ));
        assert!(matches!(
            f.care.patient_detail(f.doc, PatientId::new(999)),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_create_prescription_rules() {
        let f = fixture();
        let p = f
            .care
            .create_prescription(f.doc, f.patient, "Metformin", "500mg", "07:45")
            .unwrap();
        assert_eq!(p.reminder_time.to_string(), "07:45");

        assert!(matches!(
            f.care.create_prescription(f.other_doc, f.patient, "X", "1", "07:45"),
            Err(CoreError::Forbidden { .. })
        ));
        assert!(matches!(
            f.care.create_prescription(f.doc, f.patient, "X", "1", "7.45"),
            Err(CoreError::MalformedPayload { .. })
        ));
        assert!(matches!(
            f.care.create_prescription(f.doc, f.patient, " ", "1", "07:45"),
            Err(CoreError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_only_author_deletes_note() {
        let f = fixture();
        let note = f.care.add_note(f.doc, f.patient, "hello").unwrap();

        assert!(matches!(
            f.care.delete_note(f.other_doc, note.id),
            Err(CoreError::Forbidden { .. })
        ));
        f.care.delete_note(f.doc, note.id).unwrap();
        assert!(matches!(
            f.care.delete_note(f.doc, note.id),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_note_for_unknown_patient() {
        let f = fixture();
        assert!(matches!(
            f.care.add_note(f.doc, PatientId::new(77), "x"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_admin_dashboard() {
        let f = fixture();
        record(&f, 70.0, 36.0, 25);

        let dash = f.care.admin_dashboard().unwrap();
        assert_eq!(dash.total_doctors, 2);
        assert_eq!(dash.total_patients, 1);
        assert_eq!(dash.total_readings, 1);
        assert_eq!(dash.system_status, SystemStatus::Online);
        assert_eq!(dash.recent_users.len(), 3);
        let roles: Vec<_> = dash.recent_users.iter().map(|u| u.role).collect();
        assert!(roles.contains(&"Doctor"));
        assert!(roles.contains(&"Patient"));

        f.clock.advance(Duration::seconds(10));
        assert_eq!(
            f.care.admin_dashboard().unwrap().system_status,
            SystemStatus::Offline
        );
    }

    #[test]
    fn test_patient_dashboard_lists() {
        let f = fixture();
        for i in 0..7 {
            record(&f, 60.0 + f64::from(i), 36.5, 100 - i64::from(i));
        }
        let dash = f.care.patient_dashboard(f.patient).unwrap();
        assert_eq!(dash.recent_readings.len(), DASHBOARD_LIST_LEN);
        assert_eq!(dash.recent_readings[0].vitals.heart_rate, 66.0);
        assert!(!dash.live.is_active);
        assert_eq!(dash.battery, Metric::Unavailable);
    }

    #[test]
    fn test_admin_listings() {
        let f = fixture();
        let admin = f
            .store
            .insert_user(&NewUser {
                username: "root".to_string(),
                is_admin: true,
                ..NewUser::default()
            })
            .unwrap();

        let users = f.care.admin_users().unwrap();
        assert_eq!(users.len(), 4);
        assert_eq!(users[0].id, admin.id);
        assert_eq!(users[0].role, "Admin");
        assert_eq!(users.iter().filter(|u| u.role == "Doctor").count(), 2);

        let responders = f.care.admin_responders().unwrap();
        let ids: Vec<_> = responders.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![f.doc, f.other_doc]);

        let patients = f.care.admin_patients().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].id, f.patient);
    }

    #[test]
    fn test_patient_settings_keep_condition() {
        let f = fixture();
        f.store
            .update_patient_profile(
                f.patient,
                &UserDetails::default(),
                &PatientProfile {
                    medical_condition: Some("Asthma".to_string()),
                    ..PatientProfile::default()
                },
            )
            .unwrap();

        let updated = f
            .care
            .update_patient_settings(
                f.patient,
                UserDetails {
                    first_name: " Patricia ".to_string(),
                    last_name: "Doe".to_string(),
                    email: "pat@example.com".to_string(),
                },
                PatientProfile {
                    age: Some(41),
                    blood_type: "B-".to_string(),
                    medical_condition: None,
                    ..PatientProfile::default()
                },
            )
            .unwrap();
        assert_eq!(updated.user.first_name, "Patricia");
        assert_eq!(updated.user.email, "pat@example.com");
        assert_eq!(updated.profile.age, Some(41));
        assert_eq!(updated.profile.blood_type, "B-");
        assert_eq!(updated.profile.medical_condition.as_deref(), Some("Asthma"));
    }

    #[test]
    fn test_patient_settings_rules() {
        let f = fixture();
        let bad_age = PatientProfile {
            age: Some(-1),
            ..PatientProfile::default()
        };
        assert!(matches!(
            f.care
                .update_patient_settings(f.patient, UserDetails::default(), bad_age),
            Err(CoreError::MalformedPayload { .. })
        ));
        assert!(matches!(
            f.care.update_patient_settings(
                PatientId::new(99),
                UserDetails::default(),
                PatientProfile::default()
            ),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_responder_settings() {
        let f = fixture();
        let updated = f
            .care
            .update_responder_settings(
                f.doc,
                UserDetails {
                    first_name: "Gregory".to_string(),
                    last_name: "House".to_string(),
                    email: String::new(),
                },
                ResponderProfile {
                    specialty: "Nephrology".to_string(),
                    working_hours: "9-5".to_string(),
                    ..ResponderProfile::default()
                },
            )
            .unwrap();
        assert_eq!(updated.display_name(), "Dr. Gregory House");
        assert_eq!(updated.profile.specialty, "Nephrology");
        assert_eq!(f.care.responder(f.doc).unwrap(), updated);

        assert!(matches!(
            f.care.update_responder_settings(
                ResponderId::new(99),
                UserDetails::default(),
                ResponderProfile::default()
            ),
            Err(CoreError::NotFound { .. })
        ));
    }
}
