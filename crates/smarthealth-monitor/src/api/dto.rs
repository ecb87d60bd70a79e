//! Request and response bodies for the SmartHealth REST API.
//!
//! Dashboard bodies are the read models from [`crate::care`]; this module
//! only holds the request payloads and the small acknowledgement shapes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use smarthealth_core::{
    NoteId, PatientId, PatientProfile, PrescriptionId, ResponderProfile, UserDetails,
};

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /dashboard/add_note/`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddNoteRequest {
    /// Annotated patient
    pub patient_id: PatientId,
    /// Note body
    pub text: String,
}

/// Body of a prescription submission. `patient_id` is taken from the path
/// on the patient-detail route.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrescriptionRequest {
    /// Patient, when not given by the path
    #[serde(default)]
    pub patient_id: Option<PatientId>,
    /// Medicine name
    pub medicine_name: String,
    /// Dose, e.g. "500mg"
    pub dose: String,
    /// `HH:MM` or `HH:MM:SS`
    pub reminder_time: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Body of `POST /patient/settings/`. Omitted fields are cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatientSettingsRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub occupation: Option<String>,
    pub address: Option<String>,
    pub age: Option<i64>,
    pub blood_type: String,
}

impl PatientSettingsRequest {
    /// Split into account and profile fields.
    pub fn into_parts(self) -> (UserDetails, PatientProfile) {
        let details = UserDetails {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
        };
        let profile = PatientProfile {
            age: self.age,
            blood_type: self.blood_type,
            contact_number: self.contact_number,
            occupation: non_empty(self.occupation),
            address: non_empty(self.address),
            medical_condition: None,
        };
        (details, profile)
    }
}

/// Body of `POST /settings/` for responders. Omitted fields are cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponderSettingsRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact_number: String,
    pub specialty: String,
    pub working_hours: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<NaiveDate>,
    pub blood_type: String,
}

impl ResponderSettingsRequest {
    /// Split into account and profile fields.
    pub fn into_parts(self) -> (UserDetails, ResponderProfile) {
        let details = UserDetails {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
        };
        let profile = ResponderProfile {
            specialty: self.specialty,
            contact_number: self.contact_number,
            working_hours: self.working_hours,
            blood_type: self.blood_type,
            date_of_birth: self.date_of_birth,
        };
        (details, profile)
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Plain status acknowledgement.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// "success"
    pub status: &'static str,
    /// Optional human message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl StatusResponse {
    /// `{"status":"success"}`
    pub fn success() -> Self {
        Self {
            status: "success",
            message: None,
        }
    }

    /// `{"status":"success","message":..}`
    pub fn success_with(message: &'static str) -> Self {
        Self {
            status: "success",
            message: Some(message),
        }
    }
}

/// Response to a created note.
#[derive(Debug, Clone, Serialize)]
pub struct NoteCreatedResponse {
    /// "success"
    pub status: &'static str,
    /// New note id
    pub note_id: NoteId,
    /// `dd/mm`
    pub date: String,
}

/// Response to a created prescription.
#[derive(Debug, Clone, Serialize)]
pub struct PrescriptionCreatedResponse {
    /// "success"
    pub status: &'static str,
    /// New prescription id
    pub prescription_id: PrescriptionId,
    /// Normalized `HH:MM`
    pub reminder_time: String,
}

/// Outcome of an SOS as shown to the patient.
#[derive(Debug, Clone, Serialize)]
pub struct SosResponse {
    /// Whether a destination existed and the alert was handed off
    pub sent: bool,
    /// Message for the patient
    pub message: String,
}

/// Health check body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "ok"
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}
