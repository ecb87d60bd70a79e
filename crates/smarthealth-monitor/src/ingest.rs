//! Ingestion gateway: the only external write path into the reading log.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use smarthealth_core::{
    ApiKey, CareDirectory, Clock, CoreError, CoreResult, HealthStore, Reading, ReadingStore,
    VitalSample,
};

/// A device submission as received on the wire.
///
/// Every field is optional at this layer so that a bad identity key is
/// reported as an authentication failure even when the vitals are incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingSubmission {
    /// Patient identity key
    #[serde(default)]
    pub api_key: Option<String>,
    /// Beats per minute
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Degrees Celsius
    #[serde(default)]
    pub body_temperature: Option<f64>,
    /// Degrees Celsius
    #[serde(default)]
    pub room_temperature: Option<f64>,
    /// Percent
    #[serde(default)]
    pub humidity: Option<f64>,
    /// 0-100
    #[serde(default)]
    pub battery_level: Option<i64>,
    /// Usually negative
    #[serde(default)]
    pub signal_strength: Option<i64>,
}

impl ReadingSubmission {
    /// Parse a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPayload`] if the body is not a JSON object
    /// of the expected shape.
    pub fn from_json(body: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(body).map_err(|e| CoreError::malformed(format!("Invalid JSON: {e}")))
    }

    /// The numeric fields, with the two required ones checked.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPayload`] if heart rate or body
    /// temperature is missing.
    pub fn vitals(&self) -> CoreResult<VitalSample> {
        let heart_rate = self
            .heart_rate
            .ok_or_else(|| CoreError::malformed("missing field `heart_rate`"))?;
        let body_temperature = self
            .body_temperature
            .ok_or_else(|| CoreError::malformed("missing field `body_temperature`"))?;

        Ok(VitalSample {
            heart_rate,
            body_temperature,
            room_temperature: self.room_temperature,
            humidity: self.humidity,
            battery_level: self.battery_level,
            signal_strength: self.signal_strength,
        })
    }
}

/// Authenticates device submissions and appends them to the reading log.
#[derive(Clone)]
pub struct IngestionGateway {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
}

impl IngestionGateway {
    /// Create a gateway over a store, stamping readings with `clock`.
    pub fn new(store: Arc<dyn HealthStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Parse and accept a raw JSON body.
    ///
    /// # Errors
    ///
    /// See [`IngestionGateway::submit`]; additionally returns
    /// [`CoreError::MalformedPayload`] if the body does not parse.
    pub fn ingest(&self, body: &[u8]) -> CoreResult<Reading> {
        let submission = ReadingSubmission::from_json(body)?;
        self.submit(&submission)
    }

    /// Accept a parsed submission.
    ///
    /// The reading is stamped with the gateway's clock at acceptance; devices
    /// cannot supply their own timestamps. Values are not range-checked.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Authentication`] if the key matches no patient. Nothing is stored.
    /// - [`CoreError::MalformedPayload`] if a required vital is missing.
    /// - [`CoreError::Storage`] if the append fails.
    pub fn submit(&self, submission: &ReadingSubmission) -> CoreResult<Reading> {
        let key = submission
            .api_key
            .as_deref()
            .and_then(|raw| raw.parse::<ApiKey>().ok())
            .ok_or(CoreError::Authentication)?;

        let Some(patient) = self.store.patient_by_api_key(&key)? else {
            warn!("Rejected reading with unknown identity key");
            return Err(CoreError::Authentication);
        };

        let vitals = submission.vitals()?;
        let reading = self
            .store
            .append_reading(patient.id, &vitals, self.clock.now())?;

        debug!(
            patient_id = %patient.id,
            reading_id = %reading.id,
            heart_rate = vitals.heart_rate,
            "Reading accepted"
        );

        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use chrono::{TimeZone, Utc};
    use smarthealth_core::{CareDirectory, FixedClock, NewPatient, NewUser, ReadingStore};

    fn setup() -> (Arc<SqliteStore>, IngestionGateway, ApiKey) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let user = store
            .insert_user(&NewUser {
                username: "dev".to_string(),
                ..NewUser::default()
            })
            .unwrap();
        let patient = store
            .insert_patient(&NewPatient {
                user_id: user.id,
                ..NewPatient::default()
            })
            .unwrap();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        ));
        let gateway = IngestionGateway::new(store.clone(), clock);
        (store, gateway, patient.api_key)
    }

    #[test]
    fn test_accepts_known_key() {
        let (store, gateway, key) = setup();
        let body = format!(
            r#"{{"api_key":"{key}","heart_rate":71,"body_temperature":36.4,"signal_strength":-60}}"#
        );

        let reading = gateway.ingest(body.as_bytes()).unwrap();
        assert_eq!(reading.vitals.signal_strength, Some(-60));
        assert_eq!(
            reading.recorded_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(store.reading_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_key_stores_nothing() {
        let (store, gateway, _) = setup();
        let body = format!(
            r#"{{"api_key":"{}","heart_rate":71,"body_temperature":36.4}}"#,
            ApiKey::generate()
        );
        assert!(matches!(
            gateway.ingest(body.as_bytes()),
            Err(CoreError::Authentication)
        ));

        let garbage = br#"{"api_key":"nope","heart_rate":71,"body_temperature":36.4}"#;
        assert!(matches!(gateway.ingest(garbage), Err(CoreError::Authentication)));
        assert!(matches!(
            gateway.ingest(br#"{"heart_rate":71}"#),
            Err(CoreError::Authentication)
        ));
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_malformed_body() {
        let (store, gateway, key) = setup();
        assert!(matches!(
            gateway.ingest(b"{not json"),
            Err(CoreError::MalformedPayload { .. })
        ));
        assert!(matches!(
            gateway.ingest(b"[1,2,3]"),
            Err(CoreError::MalformedPayload { .. })
        ));

        let missing = format!(r#"{{"api_key":"{key}","heart_rate":71}}"#);
        assert!(matches!(
            gateway.ingest(missing.as_bytes()),
            Err(CoreError::MalformedPayload { .. })
        ));
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        let (_, gateway, key) = setup();
        let body = format!(
            r#"{{"api_key":"{key}","heart_rate":-5,"body_temperature":99.9,"battery_level":250}}"#
        );
        let reading = gateway.ingest(body.as_bytes()).unwrap();
        assert_eq!(reading.vitals.heart_rate, -5.0);
        assert_eq!(reading.vitals.battery_level, Some(250));
    }
}
