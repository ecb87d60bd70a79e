//! REST API for SmartHealth.
//!
//! ## Endpoints
//!
//! ### Devices
//! - `POST /api/submit_data/` - Submit a reading (identity key in the body)
//!
//! ### Patients
//! - `GET /dashboard/patient/` - Dashboard
//! - `GET /patient/live-data/` - Live status for polling
//! - `GET /patient/history/` - All readings
//! - `GET /patient/medications/` - All prescriptions
//! - `POST /patient/sos/` - Raise an SOS
//! - `GET|POST /patient/settings/` - Own profile
//!
//! ### Responders
//! - `GET /dashboard/doctor/` - Dashboard with patient cards
//! - `GET /dashboard/patient/{id}/` - One patient
//! - `POST /dashboard/patient/{id}/` - Prescribe for that patient
//! - `POST /dashboard/add_prescription/` - Prescribe (patient in body)
//! - `POST /dashboard/add_note/` - Add a note
//! - `POST|DELETE /dashboard/delete_note/{id}/` - Delete own note
//! - `GET|POST /settings/` - Own profile
//!
//! ### Admin
//! - `GET /dashboard/admin/` - Overview
//! - `GET /dashboard/admin/users/` - Every account
//! - `GET /dashboard/admin/doctors/` - Every responder
//! - `GET /dashboard/admin/patients/` - Every patient
//!
//! Every route except device ingestion and `/health` requires the
//! `X-Session-User` header.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use dto::*;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use identity::{CurrentIdentity, SESSION_USER_HEADER};
pub use state::AppState;

/// Create the SmartHealth router with all endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use smarthealth_monitor::alerting::{LogNotifier, NotificationQueue, QueueConfig};
/// use smarthealth_monitor::api::{create_router, AppState};
/// use smarthealth_monitor::store::SqliteStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(SqliteStore::in_memory().unwrap());
///     let (queue, _workers) =
///         NotificationQueue::start(Arc::new(LogNotifier), &QueueConfig::default());
///     let app = create_router(AppState::new(store, queue));
///     // ... serve with axum
/// }
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))
        // Device ingestion
        .route(
            "/api/submit_data/",
            post(handlers::submit_data).fallback(handlers::method_not_allowed),
        )
        // Patient endpoints
        .route("/dashboard/patient/", get(handlers::patient_dashboard))
        .route("/patient/live-data/", get(handlers::live_data))
        .route("/patient/history/", get(handlers::patient_history))
        .route("/patient/medications/", get(handlers::patient_medications))
        .route("/patient/sos/", post(handlers::send_sos))
        .route(
            "/patient/settings/",
            get(handlers::patient_settings).post(handlers::update_patient_settings),
        )
        // Responder endpoints
        .route("/dashboard/doctor/", get(handlers::doctor_dashboard))
        .route(
            "/dashboard/patient/:patient_id/",
            get(handlers::patient_detail).post(handlers::add_prescription_for),
        )
        .route("/dashboard/add_prescription/", post(handlers::add_prescription))
        .route("/dashboard/add_note/", post(handlers::add_note))
        .route(
            "/dashboard/delete_note/:note_id/",
            post(handlers::delete_note).delete(handlers::delete_note),
        )
        .route(
            "/settings/",
            get(handlers::responder_settings).post(handlers::update_responder_settings),
        )
        // Admin endpoints
        .route("/dashboard/admin/", get(handlers::admin_dashboard))
        .route("/dashboard/admin/users/", get(handlers::admin_users))
        .route("/dashboard/admin/doctors/", get(handlers::admin_doctors))
        .route("/dashboard/admin/patients/", get(handlers::admin_patients))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
