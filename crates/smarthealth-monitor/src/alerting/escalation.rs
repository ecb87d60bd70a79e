//! Patient-initiated SOS escalation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use smarthealth_core::{
    CareDirectory, Clock, CoreError, CoreResult, Destination, HealthStore, Patient, PatientId,
    Reading, ReadingStore, Responder, SOS_FRESHNESS_WINDOW_SECS,
};

use super::queue::NotificationQueue;

/// Message shown to a patient whose alert could not be routed.
pub const NO_RESPONDER_MESSAGE: &str = "Your doctor has not set up alerts.";

/// Device state attached to an SOS, derived from the newest reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// The device has never submitted a reading
    NoDataReceived,
    /// The newest reading is older than the SOS window
    DeviceOffline,
    /// Recent data exists; the alert was raised by hand
    SensorsOperational,
}

impl Diagnosis {
    /// Classify the newest reading. A reading exactly at the window edge still
    /// counts as operational.
    pub fn evaluate(latest: Option<&Reading>, now: DateTime<Utc>) -> Self {
        match latest {
            None => Diagnosis::NoDataReceived,
            Some(r) if r.age(now) > Duration::seconds(SOS_FRESHNESS_WINDOW_SECS) => {
                Diagnosis::DeviceOffline
            }
            Some(_) => Diagnosis::SensorsOperational,
        }
    }

    /// Whether the diagnosis is critical.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Diagnosis::SensorsOperational)
    }

    /// Markdown body of the diagnostic section.
    pub fn describe(&self) -> &'static str {
        match self {
            Diagnosis::NoDataReceived => {
                "**CRITICAL:** No data has ever been received from this device."
            }
            Diagnosis::DeviceOffline => {
                "**CRITICAL: DEVICE OFFLINE**\nLast data received over 1 minute ago."
            }
            Diagnosis::SensorsOperational => {
                "**Sensors seem operational.** Patient initiated alert manually."
            }
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Compose the alert text sent to a responder.
pub fn sos_message(patient: &Patient, diagnosis: Diagnosis) -> String {
    format!(
        "**SOS: EMERGENCY ALERT**\n\n\
         **Patient:** {} {}\n\
         **Contact:** {}\n\n\
         **SYSTEM DIAGNOSTIC:**\n{}",
        patient.user.first_name,
        patient.user.last_name,
        patient.profile.contact_number,
        diagnosis.describe(),
    )
}

/// Result of a routed SOS.
#[derive(Debug, Clone)]
pub struct SosOutcome {
    /// Responder the alert was addressed to
    pub responder: Responder,
    /// Device state at the time of the alert
    pub diagnosis: Diagnosis,
    /// Full message text
    pub message: String,
    /// Whether the delivery queue accepted the message. Not shown to the patient.
    pub queued: bool,
}

impl SosOutcome {
    /// Confirmation shown to the patient.
    pub fn confirmation(&self) -> String {
        format!("Emergency Alert sent to Dr. {}", self.responder.user.last_name)
    }
}

/// Routes patient SOS alerts to their assigned responder.
#[derive(Clone)]
pub struct EscalationEvaluator {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    queue: NotificationQueue,
}

impl EscalationEvaluator {
    /// Create an evaluator that hands messages to `queue`.
    pub fn new(
        store: Arc<dyn HealthStore>,
        clock: Arc<dyn Clock>,
        queue: NotificationQueue,
    ) -> Self {
        Self { store, clock, queue }
    }

    /// Resolve the destination an SOS from `patient` would go to.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoResponderConfigured`] if the patient has no responder or
    /// the responder has no destination.
    pub fn route(&self, patient: &Patient) -> CoreResult<(Responder, Destination)> {
        let unrouted = |reason| CoreError::NoResponderConfigured {
            patient_id: patient.id,
            reason,
        };

        let responder_id = patient
            .responder_id
            .ok_or_else(|| unrouted("no responder assigned"))?;
        let responder = self
            .store
            .responder(responder_id)?
            .ok_or_else(|| unrouted("assigned responder no longer exists"))?;
        let destination = responder
            .destination
            .clone()
            .ok_or_else(|| unrouted("responder has no notification destination"))?;

        Ok((responder, destination))
    }

    /// Raise an SOS for a patient.
    ///
    /// Delivery is queued and never awaited; once a destination exists the
    /// alert counts as sent whatever the transport later reports.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the patient does not exist.
    /// - [`CoreError::NoResponderConfigured`] if there is nowhere to send it.
    ///   Nothing is queued in that case.
    /// - [`CoreError::Storage`] if a lookup fails.
    pub fn raise(&self, patient_id: PatientId) -> CoreResult<SosOutcome> {
        let patient = self
            .store
            .patient(patient_id)?
            .ok_or_else(|| CoreError::not_found("Patient", patient_id.to_string()))?;

        let (responder, destination) = match self.route(&patient) {
            Ok(route) => route,
            Err(e) => {
                warn!(patient_id = %patient_id, error = %e, "SOS not routed");
                return Err(e);
            }
        };

        let latest = self.store.latest_reading(patient_id)?;
        let diagnosis = Diagnosis::evaluate(latest.as_ref(), self.clock.now());
        let message = sos_message(&patient, diagnosis);

        let queued = self.queue.send("sos", destination, message.clone());

        info!(
            patient_id = %patient_id,
            responder_id = %responder.id,
            diagnosis = ?diagnosis,
            queued,
            "SOS raised"
        );

        Ok(SosOutcome {
            responder,
            diagnosis,
            message,
            queued,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smarthealth_core::{ApiKey, PatientProfile, ReadingId, User, UserId, VitalSample};

    fn reading(at: DateTime<Utc>) -> Reading {
        Reading {
            id: ReadingId::new(1),
            patient_id: PatientId::new(1),
            vitals: VitalSample::default(),
            recorded_at: at,
        }
    }

    #[test]
    fn test_diagnosis_thresholds() {
        let now = Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).unwrap();
        assert_eq!(Diagnosis::evaluate(None, now), Diagnosis::NoDataReceived);

        let r = reading(now - Duration::seconds(90));
        assert_eq!(Diagnosis::evaluate(Some(&r), now), Diagnosis::DeviceOffline);

        let r = reading(now - Duration::seconds(60));
        assert_eq!(Diagnosis::evaluate(Some(&r), now), Diagnosis::SensorsOperational);

        // Stale for liveness but not for SOS
        let r = reading(now - Duration::seconds(45));
        assert_eq!(Diagnosis::evaluate(Some(&r), now), Diagnosis::SensorsOperational);
    }

    #[test]
    fn test_message_contains_patient_and_diagnosis() {
        let patient = Patient {
            id: PatientId::new(3),
            user: User {
                id: UserId::new(3),
                username: "mk".to_string(),
                first_name: "Mary".to_string(),
                last_name: "Kay".to_string(),
                email: String::new(),
                is_admin: false,
                date_joined: Utc::now(),
            },
            responder_id: None,
            api_key: ApiKey::generate(),
            destination: None,
            profile: PatientProfile {
                contact_number: "555-0101".to_string(),
                ..PatientProfile::default()
            },
        };

        let text = sos_message(&patient, Diagnosis::DeviceOffline);
        assert!(text.starts_with("**SOS: EMERGENCY ALERT**"));
        assert!(text.contains("**Patient:** Mary Kay"));
        assert!(text.contains("**Contact:** 555-0101"));
        assert!(text.contains("DEVICE OFFLINE"));
        assert!(Diagnosis::DeviceOffline.is_critical());
        assert!(!Diagnosis::SensorsOperational.is_critical());
    }
}
