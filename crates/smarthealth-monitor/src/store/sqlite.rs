//! SQLite implementation of [`HealthStore`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use smarthealth_core::{
    ApiKey, CareDirectory, Destination, Identity, NewPatient, NewPrescription, NewResponder,
    NewUser, Note, NoteBook, NoteId, Patient, PatientId, PatientProfile, Prescription,
    PrescriptionBook, PrescriptionId, Reading, ReadingId, ReadingStore, ReminderTime, Responder,
    ResponderId, ResponderProfile, StorageError, StorageResult, User, UserDetails, UserId,
    VitalSample,
};

use super::SCHEMA;

/// SQLite-backed store for every SmartHealth record.
///
/// A single connection is shared behind a mutex; each trait method holds the
/// lock for exactly one statement or one read-after-write pair, so appends
/// from concurrent requests are serialized and never interleave.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be applied.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path).storage()?;

        // WAL lets dashboard reads proceed while a device is writing
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )
        .storage()?;

        Self::init(conn)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().storage()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;").storage()?;
        conn.execute_batch(SCHEMA).storage()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// =============================================================================
// Conversions
// =============================================================================

trait SqlResultExt<T> {
    fn storage(self) -> StorageResult<T>;
}

impl<T> SqlResultExt<T> for rusqlite::Result<T> {
    fn storage(self) -> StorageResult<T> {
        self.map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::conflict(msg.unwrap_or_else(|| err.to_string()))
            }
            rusqlite::Error::FromSqlConversionFailure(idx, _, source) => {
                StorageError::corrupt("row", format!("column {idx}: {source}"))
            }
            other => StorageError::backend(other.to_string()),
        })
    }
}

fn conversion(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, message.into())
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| conversion(idx, Type::Integer, format!("timestamp {micros} out of range")))
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn destination(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Destination>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(Destination::parse))
}

// Column order shared by every user-joined query: id, username, first_name,
// last_name, email, is_admin, date_joined.
const USER_COLUMNS: &str =
    "u.id, u.username, u.first_name, u.last_name, u.email, u.is_admin, u.date_joined";

fn user_at(row: &Row<'_>, base: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId::new(row.get(base)?),
        username: row.get(base + 1)?,
        first_name: row.get(base + 2)?,
        last_name: row.get(base + 3)?,
        email: row.get(base + 4)?,
        is_admin: row.get(base + 5)?,
        date_joined: timestamp(row, base + 6)?,
    })
}

const PATIENT_SELECT: &str = "SELECT p.id, p.responder_id, p.api_key, p.destination, p.age,
        p.blood_type, p.contact_number, p.occupation, p.address, p.medical_condition,
        u.id, u.username, u.first_name, u.last_name, u.email, u.is_admin, u.date_joined
    FROM patients p JOIN users u ON u.id = p.user_id";

fn patient_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let api_key: String = row.get(2)?;
    let api_key = api_key
        .parse::<ApiKey>()
        .map_err(|e| conversion(2, Type::Text, e.to_string()))?;

    Ok(Patient {
        id: PatientId::new(row.get(0)?),
        responder_id: row.get::<_, Option<i64>>(1)?.map(ResponderId::new),
        api_key,
        destination: destination(row, 3)?,
        profile: PatientProfile {
            age: row.get(4)?,
            blood_type: row.get(5)?,
            contact_number: row.get(6)?,
            occupation: row.get(7)?,
            address: row.get(8)?,
            medical_condition: row.get(9)?,
        },
        user: user_at(row, 10)?,
    })
}

const RESPONDER_SELECT: &str = "SELECT r.id, r.destination, r.specialty, r.contact_number,
        r.working_hours, r.blood_type, r.date_of_birth,
        u.id, u.username, u.first_name, u.last_name, u.email, u.is_admin, u.date_joined
    FROM responders r JOIN users u ON u.id = r.user_id";

fn responder_row(row: &Row<'_>) -> rusqlite::Result<Responder> {
    let date_of_birth = row
        .get::<_, Option<String>>(6)?
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map_err(|e| conversion(6, Type::Text, e.to_string()))
        })
        .transpose()?;

    Ok(Responder {
        id: ResponderId::new(row.get(0)?),
        destination: destination(row, 1)?,
        profile: ResponderProfile {
            specialty: row.get(2)?,
            contact_number: row.get(3)?,
            working_hours: row.get(4)?,
            blood_type: row.get(5)?,
            date_of_birth,
        },
        user: user_at(row, 7)?,
    })
}

const READING_SELECT: &str = "SELECT id, patient_id, heart_rate, body_temperature,
        room_temperature, humidity, battery_level, signal_strength, recorded_at
    FROM readings";

fn reading_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: ReadingId::new(row.get(0)?),
        patient_id: PatientId::new(row.get(1)?),
        vitals: VitalSample {
            heart_rate: row.get(2)?,
            body_temperature: row.get(3)?,
            room_temperature: row.get(4)?,
            humidity: row.get(5)?,
            battery_level: row.get(6)?,
            signal_strength: row.get(7)?,
        },
        recorded_at: timestamp(row, 8)?,
    })
}

const PRESCRIPTION_SELECT: &str = "SELECT id, patient_id, responder_id, medicine_name, dose,
        reminder_minute, created_at
    FROM prescriptions";

fn prescription_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    let minute: u32 = row.get(5)?;
    let reminder_time = ReminderTime::from_minute_of_day(minute)
        .map_err(|e| conversion(5, Type::Integer, e.to_string()))?;

    Ok(Prescription {
        id: PrescriptionId::new(row.get(0)?),
        patient_id: PatientId::new(row.get(1)?),
        responder_id: ResponderId::new(row.get(2)?),
        medicine_name: row.get(3)?,
        dose: row.get(4)?,
        reminder_time,
        created_at: timestamp(row, 6)?,
    })
}

const NOTE_SELECT: &str = "SELECT id, patient_id, responder_id, text, created_at FROM notes";

fn note_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: NoteId::new(row.get(0)?),
        patient_id: PatientId::new(row.get(1)?),
        responder_id: ResponderId::new(row.get(2)?),
        text: row.get(3)?,
        created_at: timestamp(row, 4)?,
    })
}

fn load_user(conn: &Connection, id: UserId) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
        params![id.get()],
        |row| user_at(row, 0),
    )
    .optional()
}

fn load_patient(conn: &Connection, id: PatientId) -> rusqlite::Result<Option<Patient>> {
    conn.query_row(
        &format!("{PATIENT_SELECT} WHERE p.id = ?1"),
        params![id.get()],
        patient_row,
    )
    .optional()
}

fn load_responder(conn: &Connection, id: ResponderId) -> rusqlite::Result<Option<Responder>> {
    conn.query_row(
        &format!("{RESPONDER_SELECT} WHERE r.id = ?1"),
        params![id.get()],
        responder_row,
    )
    .optional()
}

fn count(conn: &Connection, table: &str) -> StorageResult<u64> {
    let n: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .storage()?;
    Ok(n.max(0) as u64)
}

/// `LIMIT -1` means no limit in SQLite.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

fn inserted<T>(found: Option<T>, table: &'static str) -> StorageResult<T> {
    found.ok_or_else(|| StorageError::corrupt(table, "row vanished after insert"))
}

// =============================================================================
// CareDirectory
// =============================================================================

impl CareDirectory for SqliteStore {
    fn insert_user(&self, user: &NewUser) -> StorageResult<User> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (username, first_name, last_name, email, is_admin, date_joined)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.username,
                user.first_name,
                user.last_name,
                user.email,
                user.is_admin,
                to_micros(Utc::now()),
            ],
        )
        .storage()?;
        let id = UserId::new(conn.last_insert_rowid());
        inserted(load_user(&conn, id).storage()?, "users")
    }

    fn user(&self, id: UserId) -> StorageResult<Option<User>> {
        load_user(&self.conn.lock(), id).storage()
    }

    fn users(&self, limit: Option<usize>) -> StorageResult<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users u
                 ORDER BY u.date_joined DESC, u.id DESC LIMIT ?1"
            ))
            .storage()?;
        let rows = stmt
            .query_map(params![sql_limit(limit)], |row| user_at(row, 0))
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn identity_of(&self, user: UserId) -> StorageResult<Option<Identity>> {
        let conn = self.conn.lock();

        let is_admin: Option<bool> = conn
            .query_row(
                "SELECT is_admin FROM users WHERE id = ?1",
                params![user.get()],
                |row| row.get(0),
            )
            .optional()
            .storage()?;
        let Some(is_admin) = is_admin else {
            return Ok(None);
        };

        let responder: Option<i64> = conn
            .query_row(
                "SELECT id FROM responders WHERE user_id = ?1",
                params![user.get()],
                |row| row.get(0),
            )
            .optional()
            .storage()?;
        if let Some(id) = responder {
            return Ok(Some(Identity::Responder(ResponderId::new(id))));
        }

        let patient: Option<i64> = conn
            .query_row(
                "SELECT id FROM patients WHERE user_id = ?1",
                params![user.get()],
                |row| row.get(0),
            )
            .optional()
            .storage()?;
        if let Some(id) = patient {
            return Ok(Some(Identity::Patient(PatientId::new(id))));
        }

        Ok(Some(if is_admin {
            Identity::Admin
        } else {
            Identity::Unassigned
        }))
    }

    fn insert_responder(&self, responder: &NewResponder) -> StorageResult<Responder> {
        let conn = self.conn.lock();
        let profile = &responder.profile;
        conn.execute(
            "INSERT INTO responders (user_id, destination, specialty, contact_number,
                 working_hours, blood_type, date_of_birth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                responder.user_id.get(),
                responder.destination.as_ref().map(Destination::as_str),
                profile.specialty,
                profile.contact_number,
                profile.working_hours,
                profile.blood_type,
                date_text(profile.date_of_birth),
            ],
        )
        .storage()?;
        let id = ResponderId::new(conn.last_insert_rowid());
        inserted(load_responder(&conn, id).storage()?, "responders")
    }

    fn responder(&self, id: ResponderId) -> StorageResult<Option<Responder>> {
        load_responder(&self.conn.lock(), id).storage()
    }

    fn responders(&self) -> StorageResult<Vec<Responder>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{RESPONDER_SELECT} ORDER BY r.id"))
            .storage()?;
        let rows = stmt.query_map([], responder_row).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn update_responder_profile(
        &self,
        id: ResponderId,
        details: &UserDetails,
        profile: &ResponderProfile,
    ) -> StorageResult<Option<Responder>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().storage()?;

        let changed = tx
            .execute(
                "UPDATE responders SET specialty = ?1, contact_number = ?2, working_hours = ?3,
                     blood_type = ?4, date_of_birth = ?5
                 WHERE id = ?6",
                params![
                    profile.specialty,
                    profile.contact_number,
                    profile.working_hours,
                    profile.blood_type,
                    date_text(profile.date_of_birth),
                    id.get(),
                ],
            )
            .storage()?;
        if changed == 0 {
            return Ok(None);
        }

        tx.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2, email = ?3
             WHERE id = (SELECT user_id FROM responders WHERE id = ?4)",
            params![details.first_name, details.last_name, details.email, id.get()],
        )
        .storage()?;

        let responder = load_responder(&tx, id).storage()?;
        tx.commit().storage()?;
        Ok(responder)
    }

    fn set_responder_destination(
        &self,
        id: ResponderId,
        destination: Option<&Destination>,
    ) -> StorageResult<bool> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE responders SET destination = ?1 WHERE id = ?2",
                params![destination.map(Destination::as_str), id.get()],
            )
            .storage()?;
        Ok(changed > 0)
    }

    fn insert_patient(&self, patient: &NewPatient) -> StorageResult<Patient> {
        let conn = self.conn.lock();
        let profile = &patient.profile;
        conn.execute(
            "INSERT INTO patients (user_id, responder_id, api_key, destination, age, blood_type,
                 contact_number, occupation, address, medical_condition)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                patient.user_id.get(),
                patient.responder_id.map(ResponderId::get),
                ApiKey::generate().to_string(),
                patient.destination.as_ref().map(Destination::as_str),
                profile.age,
                profile.blood_type,
                profile.contact_number,
                profile.occupation,
                profile.address,
                profile.medical_condition,
            ],
        )
        .storage()?;
        let id = PatientId::new(conn.last_insert_rowid());
        inserted(load_patient(&conn, id).storage()?, "patients")
    }

    fn patient(&self, id: PatientId) -> StorageResult<Option<Patient>> {
        load_patient(&self.conn.lock(), id).storage()
    }

    fn patient_by_api_key(&self, key: &ApiKey) -> StorageResult<Option<Patient>> {
        self.conn
            .lock()
            .query_row(
                &format!("{PATIENT_SELECT} WHERE p.api_key = ?1"),
                params![key.to_string()],
                patient_row,
            )
            .optional()
            .storage()
    }

    fn patients(&self) -> StorageResult<Vec<Patient>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{PATIENT_SELECT} ORDER BY p.id"))
            .storage()?;
        let rows = stmt.query_map([], patient_row).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn update_patient_profile(
        &self,
        id: PatientId,
        details: &UserDetails,
        profile: &PatientProfile,
    ) -> StorageResult<Option<Patient>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().storage()?;

        let changed = tx
            .execute(
                "UPDATE patients SET age = ?1, blood_type = ?2, contact_number = ?3,
                     occupation = ?4, address = ?5, medical_condition = ?6
                 WHERE id = ?7",
                params![
                    profile.age,
                    profile.blood_type,
                    profile.contact_number,
                    profile.occupation,
                    profile.address,
                    profile.medical_condition,
                    id.get(),
                ],
            )
            .storage()?;
        if changed == 0 {
            return Ok(None);
        }

        tx.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2, email = ?3
             WHERE id = (SELECT user_id FROM patients WHERE id = ?4)",
            params![details.first_name, details.last_name, details.email, id.get()],
        )
        .storage()?;

        let patient = load_patient(&tx, id).storage()?;
        tx.commit().storage()?;
        Ok(patient)
    }

    fn patients_of(&self, responder: ResponderId) -> StorageResult<Vec<Patient>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{PATIENT_SELECT} WHERE p.responder_id = ?1 ORDER BY p.id"))
            .storage()?;
        let rows = stmt
            .query_map(params![responder.get()], patient_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn assign_responder(
        &self,
        patient: PatientId,
        responder: Option<ResponderId>,
    ) -> StorageResult<bool> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE patients SET responder_id = ?1 WHERE id = ?2",
                params![responder.map(ResponderId::get), patient.get()],
            )
            .storage()?;
        Ok(changed > 0)
    }

    fn set_patient_destination(
        &self,
        id: PatientId,
        destination: Option<&Destination>,
    ) -> StorageResult<bool> {
        let changed = self
            .conn
            .lock()
            .execute(
                "UPDATE patients SET destination = ?1 WHERE id = ?2",
                params![destination.map(Destination::as_str), id.get()],
            )
            .storage()?;
        Ok(changed > 0)
    }

    fn responder_count(&self) -> StorageResult<u64> {
        count(&self.conn.lock(), "responders")
    }

    fn patient_count(&self) -> StorageResult<u64> {
        count(&self.conn.lock(), "patients")
    }
}

// =============================================================================
// ReadingStore
// =============================================================================

impl ReadingStore for SqliteStore {
    fn append_reading(
        &self,
        patient: PatientId,
        vitals: &VitalSample,
        recorded_at: DateTime<Utc>,
    ) -> StorageResult<Reading> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO readings (patient_id, heart_rate, body_temperature, room_temperature,
                 humidity, battery_level, signal_strength, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                patient.get(),
                vitals.heart_rate,
                vitals.body_temperature,
                vitals.room_temperature,
                vitals.humidity,
                vitals.battery_level,
                vitals.signal_strength,
                to_micros(recorded_at),
            ],
        )
        .storage()?;

        Ok(Reading {
            id: ReadingId::new(conn.last_insert_rowid()),
            patient_id: patient,
            vitals: *vitals,
            recorded_at: timestamp_roundtrip(recorded_at),
        })
    }

    fn latest_reading(&self, patient: PatientId) -> StorageResult<Option<Reading>> {
        self.conn
            .lock()
            .query_row(
                &format!(
                    "{READING_SELECT} WHERE patient_id = ?1 \
                     ORDER BY recorded_at DESC, id DESC LIMIT 1"
                ),
                params![patient.get()],
                reading_row,
            )
            .optional()
            .storage()
    }

    fn latest_reading_overall(&self) -> StorageResult<Option<Reading>> {
        self.conn
            .lock()
            .query_row(
                &format!("{READING_SELECT} ORDER BY recorded_at DESC, id DESC LIMIT 1"),
                [],
                reading_row,
            )
            .optional()
            .storage()
    }

    fn reading_history(
        &self,
        patient: PatientId,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Reading>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{READING_SELECT} WHERE patient_id = ?1 ORDER BY recorded_at DESC, id DESC LIMIT ?2"
            ))
            .storage()?;
        let rows = stmt
            .query_map(params![patient.get(), sql_limit(limit)], reading_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn readings_for(&self, patients: &[PatientId]) -> StorageResult<Vec<Reading>> {
        if patients.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; patients.len()].join(", ");
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{READING_SELECT} WHERE patient_id IN ({placeholders}) ORDER BY recorded_at, id"
            ))
            .storage()?;
        let rows = stmt
            .query_map(params_from_iter(patients.iter().map(|p| p.get())), reading_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn reading_count(&self) -> StorageResult<u64> {
        count(&self.conn.lock(), "readings")
    }
}

// =============================================================================
// PrescriptionBook
// =============================================================================

impl PrescriptionBook for SqliteStore {
    fn insert_prescription(&self, prescription: &NewPrescription) -> StorageResult<Prescription> {
        let conn = self.conn.lock();
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO prescriptions (patient_id, responder_id, medicine_name, dose,
                 reminder_minute, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                prescription.patient_id.get(),
                prescription.responder_id.get(),
                prescription.medicine_name,
                prescription.dose,
                prescription.reminder_time.minute_of_day(),
                to_micros(created_at),
            ],
        )
        .storage()?;

        Ok(Prescription {
            id: PrescriptionId::new(conn.last_insert_rowid()),
            patient_id: prescription.patient_id,
            responder_id: prescription.responder_id,
            medicine_name: prescription.medicine_name.clone(),
            dose: prescription.dose.clone(),
            reminder_time: prescription.reminder_time,
            created_at: timestamp_roundtrip(created_at),
        })
    }

    fn prescription(&self, id: PrescriptionId) -> StorageResult<Option<Prescription>> {
        self.conn
            .lock()
            .query_row(
                &format!("{PRESCRIPTION_SELECT} WHERE id = ?1"),
                params![id.get()],
                prescription_row,
            )
            .optional()
            .storage()
    }

    fn prescriptions_for(&self, patient: PatientId) -> StorageResult<Vec<Prescription>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{PRESCRIPTION_SELECT} WHERE patient_id = ?1 ORDER BY reminder_minute, id"
            ))
            .storage()?;
        let rows = stmt
            .query_map(params![patient.get()], prescription_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn prescriptions_due_at(&self, time: ReminderTime) -> StorageResult<Vec<Prescription>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{PRESCRIPTION_SELECT} WHERE reminder_minute = ?1 ORDER BY id"
            ))
            .storage()?;
        let rows = stmt
            .query_map(params![time.minute_of_day()], prescription_row)
            .storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn prescription_count(&self) -> StorageResult<u64> {
        count(&self.conn.lock(), "prescriptions")
    }
}

// =============================================================================
// NoteBook
// =============================================================================

impl NoteBook for SqliteStore {
    fn insert_note(
        &self,
        patient: PatientId,
        author: ResponderId,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> StorageResult<Note> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO notes (patient_id, responder_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![patient.get(), author.get(), text, to_micros(created_at)],
        )
        .storage()?;

        Ok(Note {
            id: NoteId::new(conn.last_insert_rowid()),
            patient_id: patient,
            responder_id: author,
            text: text.to_string(),
            created_at: timestamp_roundtrip(created_at),
        })
    }

    fn note(&self, id: NoteId) -> StorageResult<Option<Note>> {
        self.conn
            .lock()
            .query_row(
                &format!("{NOTE_SELECT} WHERE id = ?1"),
                params![id.get()],
                note_row,
            )
            .optional()
            .storage()
    }

    fn notes_for(&self, patient: PatientId) -> StorageResult<Vec<Note>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "{NOTE_SELECT} WHERE patient_id = ?1 ORDER BY created_at DESC, id DESC"
            ))
            .storage()?;
        let rows = stmt.query_map(params![patient.get()], note_row).storage()?;
        rows.collect::<rusqlite::Result<Vec<_>>>().storage()
    }

    fn delete_note(&self, id: NoteId) -> StorageResult<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM notes WHERE id = ?1", params![id.get()])
            .storage()?;
        Ok(removed > 0)
    }
}

/// Truncate to the microsecond precision the database keeps, so values
/// returned from inserts compare equal to values read back later.
fn timestamp_roundtrip(at: DateTime<Utc>) -> DateTime<Utc> {
    let micros = to_micros(at);
    Utc.timestamp_opt(
        micros.div_euclid(1_000_000),
        (micros.rem_euclid(1_000_000) * 1_000) as u32,
    )
    .single()
    .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn user(store: &SqliteStore, name: &str) -> User {
        store
            .insert_user(&NewUser {
                username: name.to_string(),
                first_name: name.to_string(),
                last_name: "Tester".to_string(),
                ..NewUser::default()
            })
            .unwrap()
    }

    fn patient(store: &SqliteStore, name: &str) -> Patient {
        let user = user(store, name);
        store
            .insert_patient(&NewPatient {
                user_id: user.id,
                ..NewPatient::default()
            })
            .unwrap()
    }

    fn vitals(hr: f64) -> VitalSample {
        VitalSample {
            heart_rate: hr,
            body_temperature: 36.8,
            ..VitalSample::default()
        }
    }

    #[test]
    fn test_patient_roundtrip_and_key_lookup() {
        let store = store();
        let p = patient(&store, "ana");

        let by_key = store.patient_by_api_key(&p.api_key).unwrap().unwrap();
        assert_eq!(by_key.id, p.id);
        assert_eq!(by_key.user.username, "ana");

        assert!(store
            .patient_by_api_key(&ApiKey::generate())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_identity_keys_are_unique() {
        let store = store();
        let a = patient(&store, "a");
        let b = patient(&store, "b");
        assert_ne!(a.api_key, b.api_key);
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let store = store();
        user(&store, "dup");
        let err = store
            .insert_user(&NewUser {
                username: "dup".to_string(),
                ..NewUser::default()
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_identity_resolution_order() {
        let store = store();

        let admin = store
            .insert_user(&NewUser {
                username: "root".to_string(),
                is_admin: true,
                ..NewUser::default()
            })
            .unwrap();
        assert_eq!(store.identity_of(admin.id).unwrap(), Some(Identity::Admin));

        // An admin who is also a responder resolves as the responder
        let responder = store
            .insert_responder(&NewResponder {
                user_id: admin.id,
                ..NewResponder::default()
            })
            .unwrap();
        assert_eq!(
            store.identity_of(admin.id).unwrap(),
            Some(Identity::Responder(responder.id))
        );

        let p = patient(&store, "pat");
        assert_eq!(
            store.identity_of(p.user.id).unwrap(),
            Some(Identity::Patient(p.id))
        );

        let plain = user(&store, "staff");
        assert_eq!(
            store.identity_of(plain.id).unwrap(),
            Some(Identity::Unassigned)
        );
        assert_eq!(store.identity_of(UserId::new(999)).unwrap(), None);
    }

    #[test]
    fn test_latest_reading_uses_timestamp_order() {
        let store = store();
        let p = patient(&store, "p");
        let t0 = Utc::now();

        store.append_reading(p.id, &vitals(80.0), t0).unwrap();
        // Inserted later but stamped earlier
        store
            .append_reading(p.id, &vitals(70.0), t0 - Duration::seconds(5))
            .unwrap();

        let latest = store.latest_reading(p.id).unwrap().unwrap();
        assert_eq!(latest.vitals.heart_rate, 80.0);

        let history = store.reading_history(p.id, None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].vitals.heart_rate, 80.0);

        let limited = store.reading_history(p.id, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_latest_overall_spans_patients() {
        let store = store();
        let a = patient(&store, "a");
        let b = patient(&store, "b");
        let t0 = Utc::now();

        store.append_reading(a.id, &vitals(60.0), t0).unwrap();
        store
            .append_reading(b.id, &vitals(90.0), t0 + Duration::seconds(1))
            .unwrap();

        let latest = store.latest_reading_overall().unwrap().unwrap();
        assert_eq!(latest.patient_id, b.id);
        assert_eq!(store.reading_count().unwrap(), 2);
    }

    #[test]
    fn test_reading_for_unknown_patient_rejected() {
        let store = store();
        let err = store
            .append_reading(PatientId::new(42), &vitals(70.0), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_optional_fields_roundtrip() {
        let store = store();
        let p = patient(&store, "p");
        let sample = VitalSample {
            heart_rate: 72.5,
            body_temperature: 36.6,
            room_temperature: Some(25.1),
            humidity: None,
            battery_level: Some(0),
            signal_strength: Some(-67),
        };
        let stored = store.append_reading(p.id, &sample, Utc::now()).unwrap();
        let loaded = store.latest_reading(p.id).unwrap().unwrap();
        assert_eq!(loaded.vitals, sample);
        assert_eq!(loaded.id, stored.id);
    }

    #[test]
    fn test_appended_reading_matches_stored_row() {
        let store = store();
        let p = patient(&store, "p");
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();

        let stored = store.append_reading(p.id, &vitals(70.0), at).unwrap();
        let loaded = store.latest_reading(p.id).unwrap().unwrap();
        assert_eq!(stored, loaded);
        assert_eq!(stored.recorded_at.timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_prescriptions_due_ignore_seconds_and_date() {
        let store = store();
        let p = patient(&store, "p");
        let doc_user = user(&store, "doc");
        let doc = store
            .insert_responder(&NewResponder {
                user_id: doc_user.id,
                ..NewResponder::default()
            })
            .unwrap();

        for (name, time) in [("a", "08:30"), ("b", "08:30:45"), ("c", "08:31"), ("d", "20:30")] {
            store
                .insert_prescription(&NewPrescription {
                    patient_id: p.id,
                    responder_id: doc.id,
                    medicine_name: name.to_string(),
                    dose: "1 tab".to_string(),
                    reminder_time: time.parse().unwrap(),
                })
                .unwrap();
        }

        let due = store
            .prescriptions_due_at(ReminderTime::new(8, 30).unwrap())
            .unwrap();
        let names: Vec<_> = due.iter().map(|p| p.medicine_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let ordered = store.prescriptions_for(p.id).unwrap();
        let names: Vec<_> = ordered.iter().map(|p| p.medicine_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_responder_removal_unassigns_patients() {
        let store = store();
        let doc_user = user(&store, "doc");
        let doc = store
            .insert_responder(&NewResponder {
                user_id: doc_user.id,
                destination: Destination::parse("555"),
                ..NewResponder::default()
            })
            .unwrap();
        let p = patient(&store, "p");
        assert!(store.assign_responder(p.id, Some(doc.id)).unwrap());
        assert_eq!(store.patients_of(doc.id).unwrap().len(), 1);

        store
            .conn
            .lock()
            .execute("DELETE FROM users WHERE id = ?1", params![doc_user.id.get()])
            .unwrap();

        let reloaded = store.patient(p.id).unwrap().unwrap();
        assert_eq!(reloaded.responder_id, None);
    }

    #[test]
    fn test_notes_newest_first_and_delete() {
        let store = store();
        let p = patient(&store, "p");
        let doc_user = user(&store, "doc");
        let doc = store
            .insert_responder(&NewResponder {
                user_id: doc_user.id,
                ..NewResponder::default()
            })
            .unwrap();
        let t0 = Utc::now();

        let first = store.insert_note(p.id, doc.id, "first", t0).unwrap();
        store
            .insert_note(p.id, doc.id, "second", t0 + Duration::minutes(1))
            .unwrap();

        let notes = store.notes_for(p.id).unwrap();
        assert_eq!(notes[0].text, "second");
        assert_eq!(store.note(first.id).unwrap().unwrap(), first);

        assert!(store.delete_note(first.id).unwrap());
        assert!(!store.delete_note(first.id).unwrap());
    }

    #[test]
    fn test_listings() {
        let store = store();
        let first = user(&store, "first");
        let doc = store
            .insert_responder(&NewResponder {
                user_id: first.id,
                ..NewResponder::default()
            })
            .unwrap();
        let a = patient(&store, "a");
        let b = patient(&store, "b");

        let responders = store.responders().unwrap();
        assert_eq!(responders.len(), 1);
        assert_eq!(responders[0].id, doc.id);

        let ids: Vec<_> = store.patients().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);

        assert_eq!(store.users(None).unwrap().len(), 3);
        let newest = store.users(Some(1)).unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].id, b.user.id);
    }

    #[test]
    fn test_update_patient_profile() {
        let store = store();
        let p = patient(&store, "p");
        let details = UserDetails {
            first_name: "Petra".to_string(),
            last_name: "Novak".to_string(),
            email: "petra@example.org".to_string(),
        };
        let profile = PatientProfile {
            age: Some(52),
            blood_type: "A-".to_string(),
            contact_number: "555-0101".to_string(),
            occupation: Some("Teacher".to_string()),
            address: None,
            medical_condition: Some("Asthma".to_string()),
        };

        let updated = store
            .update_patient_profile(p.id, &details, &profile)
            .unwrap()
            .unwrap();
        assert_eq!(updated.profile, profile);
        assert_eq!(updated.user.first_name, "Petra");
        assert_eq!(updated.user.email, "petra@example.org");
        assert_eq!(updated.user.username, "p");
        assert_eq!(updated.api_key, p.api_key);

        let missing = store
            .update_patient_profile(PatientId::new(999), &details, &profile)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_responder_profile() {
        let store = store();
        let account = user(&store, "doc");
        let doc = store
            .insert_responder(&NewResponder {
                user_id: account.id,
                destination: Destination::parse("42"),
                ..NewResponder::default()
            })
            .unwrap();
        let profile = ResponderProfile {
            specialty: "Cardiology".to_string(),
            contact_number: "555-0199".to_string(),
            working_hours: "Mon-Fri 9-17".to_string(),
            blood_type: "O+".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1970, 5, 17),
        };
        let details = UserDetails {
            first_name: "Lisa".to_string(),
            last_name: "Cuddy".to_string(),
            email: String::new(),
        };

        let updated = store
            .update_responder_profile(doc.id, &details, &profile)
            .unwrap()
            .unwrap();
        assert_eq!(updated.profile, profile);
        assert_eq!(updated.display_name(), "Dr. Lisa Cuddy");
        assert_eq!(updated.destination, doc.destination);
        assert_eq!(store.responder(doc.id).unwrap().unwrap(), updated);
    }
}
