//! Axum request handlers for the SmartHealth REST API.
//!
//! Handlers resolve the caller, enforce the role the route needs, call into
//! the services on [`AppState`] and map the outcome to JSON.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::Redirect,
    Json,
};
use serde::de::DeserializeOwned;

use smarthealth_core::{
    CoreError, NoteId, Patient, PatientId, Prescription, Reading, Responder, VERSION,
};

use super::dto::*;
use super::error::{ApiError, ApiResult};
use super::identity::CurrentIdentity;
use super::state::AppState;
use crate::alerting::NO_RESPONDER_MESSAGE;
use crate::care::{
    AdminDashboard, PatientDashboard, PatientDetail, ResponderDashboard, UserSummary,
};
use crate::status::LiveStatus;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON: {e}")))
}

// ============================================================================
// Device ingestion
// ============================================================================

/// Accept a reading from a device.
///
/// `POST /api/submit_data/` with `{api_key, heart_rate, body_temperature,
/// room_temperature?, humidity?, battery_level?, signal_strength?}`.
///
/// - 200 `{"status":"success","message":"Data received"}`
/// - 400 if the body is not valid JSON of that shape
/// - 403 if the key matches no patient
#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
pub async fn submit_data(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<StatusResponse>> {
    state.gateway().ingest(&body)?;
    Ok(Json(StatusResponse::success_with("Data received")))
}

/// Any other method on a POST-only route.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
    })
}

// ============================================================================
// Home
// ============================================================================

/// Redirect the caller to their role's landing page.
#[tracing::instrument]
pub async fn home(identity: CurrentIdentity) -> Redirect {
    Redirect::to(identity.identity.home_path())
}

// ============================================================================
// Patient
// ============================================================================

/// Live status polled by the patient dashboard.
#[tracing::instrument(skip(state))]
pub async fn live_data(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<LiveStatus>> {
    let patient = identity.patient()?;
    Ok(Json(state.care().live_status(patient)?))
}

/// The patient's own dashboard.
#[tracing::instrument(skip(state))]
pub async fn patient_dashboard(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<PatientDashboard>> {
    let patient = identity.patient()?;
    Ok(Json(state.care().patient_dashboard(patient)?))
}

/// Every reading of the caller, newest first.
#[tracing::instrument(skip(state))]
pub async fn patient_history(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Vec<Reading>>> {
    let patient = identity.patient()?;
    Ok(Json(state.care().patient_history(patient)?))
}

/// Every prescription of the caller by time of day.
#[tracing::instrument(skip(state))]
pub async fn patient_medications(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Vec<Prescription>>> {
    let patient = identity.patient()?;
    Ok(Json(state.care().patient_medications(patient)?))
}

/// The caller's own patient record for the settings form.
#[tracing::instrument(skip(state))]
pub async fn patient_settings(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Patient>> {
    let patient = identity.patient()?;
    Ok(Json(state.care().patient(patient)?))
}

/// Save the patient settings form and return the updated record.
#[tracing::instrument(skip(state, body))]
pub async fn update_patient_settings(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    body: Bytes,
) -> ApiResult<Json<Patient>> {
    let patient = identity.patient()?;
    let request: PatientSettingsRequest = parse_body(&body)?;
    let (details, profile) = request.into_parts();
    Ok(Json(
        state
            .care()
            .update_patient_settings(patient, details, profile)?,
    ))
}

/// Raise an SOS.
///
/// Always 200 for a patient caller: `sent` is false when no responder
/// destination is configured, and nothing is dispatched in that case.
#[tracing::instrument(skip(state))]
pub async fn send_sos(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<SosResponse>> {
    let patient = identity.patient()?;

    match state.escalation().raise(patient) {
        Ok(outcome) => Ok(Json(SosResponse {
            sent: true,
            message: outcome.confirmation(),
        })),
        Err(CoreError::NoResponderConfigured { .. }) => Ok(Json(SosResponse {
            sent: false,
            message: NO_RESPONDER_MESSAGE.to_string(),
        })),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Responder
// ============================================================================

/// The responder dashboard.
#[tracing::instrument(skip(state))]
pub async fn doctor_dashboard(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<ResponderDashboard>> {
    let responder = identity.responder()?;
    Ok(Json(state.care().responder_dashboard(responder)?))
}

/// The caller's own responder record for the settings form.
#[tracing::instrument(skip(state))]
pub async fn responder_settings(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Responder>> {
    let responder = identity.responder()?;
    Ok(Json(state.care().responder(responder)?))
}

/// Save the responder settings form and return the updated record.
#[tracing::instrument(skip(state, body))]
pub async fn update_responder_settings(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    body: Bytes,
) -> ApiResult<Json<Responder>> {
    let responder = identity.responder()?;
    let request: ResponderSettingsRequest = parse_body(&body)?;
    let (details, profile) = request.into_parts();
    Ok(Json(
        state
            .care()
            .update_responder_settings(responder, details, profile)?,
    ))
}

/// One of the responder's patients.
#[tracing::instrument(skip(state))]
pub async fn patient_detail(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    Path(patient_id): Path<PatientId>,
) -> ApiResult<Json<PatientDetail>> {
    let responder = identity.responder()?;
    Ok(Json(state.care().patient_detail(responder, patient_id)?))
}

fn create_prescription(
    state: &AppState,
    identity: CurrentIdentity,
    patient_id: Option<PatientId>,
    body: &Bytes,
) -> ApiResult<Json<PrescriptionCreatedResponse>> {
    let responder = identity.responder()?;
    let request: CreatePrescriptionRequest = parse_body(body)?;
    let patient_id = patient_id
        .or(request.patient_id)
        .ok_or_else(|| ApiError::bad_request("patient_id is required"))?;

    let prescription = state.care().create_prescription(
        responder,
        patient_id,
        &request.medicine_name,
        &request.dose,
        &request.reminder_time,
    )?;

    Ok(Json(PrescriptionCreatedResponse {
        status: "success",
        prescription_id: prescription.id,
        reminder_time: prescription.reminder_time.to_string(),
    }))
}

/// Prescribe for a patient named in the body.
#[tracing::instrument(skip(state, body))]
pub async fn add_prescription(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    body: Bytes,
) -> ApiResult<Json<PrescriptionCreatedResponse>> {
    create_prescription(&state, identity, None, &body)
}

/// Prescribe from the patient-detail page.
#[tracing::instrument(skip(state, body))]
pub async fn add_prescription_for(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    Path(patient_id): Path<PatientId>,
    body: Bytes,
) -> ApiResult<Json<PrescriptionCreatedResponse>> {
    create_prescription(&state, identity, Some(patient_id), &body)
}

/// Annotate a patient.
#[tracing::instrument(skip(state, body))]
pub async fn add_note(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    body: Bytes,
) -> ApiResult<Json<NoteCreatedResponse>> {
    let responder = identity.responder()?;
    let request: AddNoteRequest = parse_body(&body)?;
    let note = state
        .care()
        .add_note(responder, request.patient_id, &request.text)?;

    Ok(Json(NoteCreatedResponse {
        status: "success",
        date: note.short_date(),
        note_id: note.id,
    }))
}

/// Delete one of the caller's notes.
#[tracing::instrument(skip(state))]
pub async fn delete_note(
    State(state): State<AppState>,
    identity: CurrentIdentity,
    Path(note_id): Path<NoteId>,
) -> ApiResult<Json<StatusResponse>> {
    let responder = identity.responder()?;
    state.care().delete_note(responder, note_id)?;
    Ok(Json(StatusResponse::success()))
}

// ============================================================================
// Admin
// ============================================================================

/// Administrator overview.
#[tracing::instrument(skip(state))]
pub async fn admin_dashboard(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<AdminDashboard>> {
    identity.admin()?;
    Ok(Json(state.care().admin_dashboard()?))
}

/// Every account, newest first.
#[tracing::instrument(skip(state))]
pub async fn admin_users(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Vec<UserSummary>>> {
    identity.admin()?;
    Ok(Json(state.care().admin_users()?))
}

/// Every responder.
#[tracing::instrument(skip(state))]
pub async fn admin_doctors(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Vec<Responder>>> {
    identity.admin()?;
    Ok(Json(state.care().admin_responders()?))
}

/// Every patient.
#[tracing::instrument(skip(state))]
pub async fn admin_patients(
    State(state): State<AppState>,
    identity: CurrentIdentity,
) -> ApiResult<Json<Vec<Patient>>> {
    identity.admin()?;
    Ok(Json(state.care().admin_patients()?))
}
