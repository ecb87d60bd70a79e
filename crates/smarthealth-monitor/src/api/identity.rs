//! Resolution of the calling user.
//!
//! Login and sessions live outside this service. The session layer in front
//! of it forwards the authenticated user id in the [`SESSION_USER_HEADER`]
//! header; the tagged [`Identity`] is resolved once per request from it.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use smarthealth_core::{CareDirectory, Identity, PatientId, ResponderId, UserId};

use super::error::ApiError;
use super::state::AppState;

/// Header carrying the authenticated user id.
pub const SESSION_USER_HEADER: &str = "x-session-user";

/// The resolved caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentIdentity {
    /// Role record the account resolves to
    pub identity: Identity,
    /// Administrator flag, independent of any role record
    pub is_admin: bool,
}

impl CurrentIdentity {
    /// The caller's patient id, or `Forbidden`.
    pub fn patient(&self) -> Result<PatientId, ApiError> {
        match self.identity {
            Identity::Patient(id) => Ok(id),
            other => Err(ApiError::forbidden(format!(
                "{} accounts have no patient record",
                other.role_label()
            ))),
        }
    }

    /// The caller's responder id, or `Forbidden`.
    pub fn responder(&self) -> Result<ResponderId, ApiError> {
        match self.identity {
            Identity::Responder(id) => Ok(id),
            other => Err(ApiError::forbidden(format!(
                "{} accounts have no responder record",
                other.role_label()
            ))),
        }
    }

    /// Succeeds for any account carrying the administrator flag.
    pub fn admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "{} accounts cannot view the admin pages",
                self.identity.role_label()
            )))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(SESSION_USER_HEADER)
            .ok_or_else(|| ApiError::unauthenticated("missing session user"))?;

        let user = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(UserId::new)
            .ok_or_else(|| ApiError::unauthenticated("malformed session user"))?;

        let unknown = || ApiError::unauthenticated(format!("unknown user {user}"));
        let account = state.store().user(user)?.ok_or_else(unknown)?;
        let identity = state.store().identity_of(user)?.ok_or_else(unknown)?;

        tracing::debug!(user_id = %user, identity = ?identity, "Resolved caller");
        Ok(Self {
            identity,
            is_admin: account.is_admin,
        })
    }
}
