//! Error types for the SmartHealth system.
//!
//! This module provides error handling using [`thiserror`] for automatic
//! `Display` and `Error` trait implementations.
//!
//! # Error Hierarchy
//!
//! - [`CoreError`]: Top-level error type covering ingestion, escalation,
//!   ownership and lookup failures
//! - [`StorageError`]: Errors from the persistence layer
//!
//! # Example
//!
//! ```rust
//! use smarthealth_core::error::CoreError;
//!
//! fn lookup() -> Result<(), CoreError> {
//!     Err(CoreError::not_found("Patient", "42"))
//! }
//!
//! assert!(lookup().is_err());
//! ```

use thiserror::Error;

use crate::types::PatientId;

/// A specialized `Result` type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// A specialized `Result` type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Top-level error type for the SmartHealth system.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    /// A device presented an identity key that matches no patient.
    #[error("Authentication failed: unknown device identity key")]
    Authentication,

    /// A submission could not be parsed as the expected structure.
    #[error("Malformed payload: {message}")]
    MalformedPayload {
        /// What was wrong with the payload
        message: String,
    },

    /// SOS raised for a patient whose responder cannot be reached.
    #[error("No responder configured for patient {patient_id}: {reason}")]
    NoResponderConfigured {
        /// Patient who raised the alert
        patient_id: PatientId,
        /// Why no destination is available
        reason: &'static str,
    },

    /// Resource not found
    #[error("Resource not found: {resource_type} with id '{id}'")]
    NotFound {
        /// Type of resource that was not found
        resource_type: &'static str,
        /// Identifier of the missing resource
        id: String,
    },

    /// The caller is known but may not act on the resource.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of the refused action
        message: String,
    },

    /// No caller identity could be resolved.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Why resolution failed
        message: String,
    },

    /// Data storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    /// Creates a new malformed payload error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Creates a new forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new unauthenticated error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same operation could succeed.
    ///
    /// Nothing in this system retries automatically; callers use this to decide
    /// how loudly to log.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_recoverable(),
            Self::Authentication
            | Self::MalformedPayload { .. }
            | Self::NoResponderConfigured { .. }
            | Self::NotFound { .. }
            | Self::Forbidden { .. }
            | Self::Unauthenticated { .. } => false,
        }
    }
}

/// Errors from data persistence operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// The storage backend failed.
    #[error("Backend failure: {message}")]
    Backend {
        /// Backend error description
        message: String,
    },

    /// A stored row could not be converted back into a domain value.
    #[error("Corrupt record in {table}: {message}")]
    Corrupt {
        /// Table holding the record
        table: &'static str,
        /// What could not be decoded
        message: String,
    },

    /// A uniqueness or referential constraint rejected the write.
    #[error("Constraint violated: {message}")]
    Conflict {
        /// Constraint description
        message: String,
    },
}

impl StorageError {
    /// Creates a new backend error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a new corrupt record error.
    #[must_use]
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            message: message.into(),
        }
    }

    /// Creates a new conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::not_found("Patient", "7");
        assert_eq!(err.to_string(), "Resource not found: Patient with id '7'");

        let err = CoreError::NoResponderConfigured {
            patient_id: PatientId::new(3),
            reason: "no responder assigned",
        };
        assert!(err.to_string().contains("patient 3"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: CoreError = StorageError::backend("disk full").into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(err.is_recoverable());

        let err: CoreError = StorageError::conflict("duplicate key").into();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_domain_errors_not_recoverable() {
        assert!(!CoreError::Authentication.is_recoverable());
        assert!(!CoreError::malformed("bad json").is_recoverable());
        assert!(!CoreError::forbidden("not yours").is_recoverable());
    }
}
