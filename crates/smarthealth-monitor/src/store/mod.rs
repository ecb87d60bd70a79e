//! Relational persistence for users, patients, readings and care records.

mod sqlite;

pub use sqlite::SqliteStore;

/// Schema applied on open. Every statement is idempotent.
///
/// Cascades: removing a patient removes its readings, prescriptions and notes;
/// removing a responder unassigns their patients and removes what they wrote.
pub(crate) const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    username    TEXT NOT NULL UNIQUE,
    first_name  TEXT NOT NULL DEFAULT '',
    last_name   TEXT NOT NULL DEFAULT '',
    email       TEXT NOT NULL DEFAULT '',
    is_admin    INTEGER NOT NULL DEFAULT 0,
    date_joined INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS responders (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    destination    TEXT,
    specialty      TEXT NOT NULL DEFAULT '',
    contact_number TEXT NOT NULL DEFAULT '',
    working_hours  TEXT NOT NULL DEFAULT '',
    blood_type     TEXT NOT NULL DEFAULT '',
    date_of_birth  TEXT
);

CREATE TABLE IF NOT EXISTS patients (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id           INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    responder_id      INTEGER REFERENCES responders(id) ON DELETE SET NULL,
    api_key           TEXT NOT NULL UNIQUE,
    destination       TEXT UNIQUE,
    age               INTEGER,
    blood_type        TEXT NOT NULL DEFAULT '',
    contact_number    TEXT NOT NULL DEFAULT '',
    occupation        TEXT,
    address           TEXT,
    medical_condition TEXT
);

CREATE TABLE IF NOT EXISTS readings (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id       INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    heart_rate       REAL NOT NULL,
    body_temperature REAL NOT NULL,
    room_temperature REAL,
    humidity         REAL,
    battery_level    INTEGER,
    signal_strength  INTEGER,
    recorded_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_readings_patient_time ON readings(patient_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_readings_time ON readings(recorded_at);

CREATE TABLE IF NOT EXISTS prescriptions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id      INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    responder_id    INTEGER NOT NULL REFERENCES responders(id) ON DELETE CASCADE,
    medicine_name   TEXT NOT NULL,
    dose            TEXT NOT NULL,
    reminder_minute INTEGER NOT NULL,
    created_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_reminder ON prescriptions(reminder_minute);

CREATE TABLE IF NOT EXISTS notes (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id   INTEGER NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    responder_id INTEGER NOT NULL REFERENCES responders(id) ON DELETE CASCADE,
    text         TEXT NOT NULL,
    created_at   INTEGER NOT NULL
);
";
