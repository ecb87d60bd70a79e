//! Liveness and status evaluation.
//!
//! Everything here is a pure function of one or more [`Reading`]s and the
//! current instant. Three independent windows apply:
//!
//! - a patient device is *active* while its newest reading is younger than
//!   [`LIVENESS_WINDOW_SECS`];
//! - the whole system is *Online* while the newest reading anywhere is younger
//!   than [`SYSTEM_ONLINE_WINDOW_SECS`];
//! - the SOS diagnosis uses its own window, see [`crate::alerting`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};

use smarthealth_core::{Reading, LIVENESS_WINDOW_SECS, SYSTEM_ONLINE_WINDOW_SECS, UNAVAILABLE};

// =============================================================================
// Metric
// =============================================================================

/// A displayed value that may be unavailable.
///
/// Serializes as the inner value, or as the `"--"` placeholder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric<T> {
    /// A known value
    Value(T),
    /// Nothing to show
    Unavailable,
}

impl<T> Default for Metric<T> {
    fn default() -> Self {
        Metric::Unavailable
    }
}

impl<T> From<Option<T>> for Metric<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Metric::Unavailable, Metric::Value)
    }
}

impl<T: Serialize> Serialize for Metric<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => v.serialize(serializer),
            Metric::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Metric<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => v.fmt(f),
            Metric::Unavailable => f.write_str(UNAVAILABLE),
        }
    }
}

/// Round to one decimal place.
pub(crate) fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Integer part, as shown for heart rate and humidity.
pub(crate) fn whole(value: f64) -> i64 {
    value.trunc() as i64
}

// =============================================================================
// Signal / battery
// =============================================================================

/// Human label for a signal strength reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignalQuality {
    /// Above -50
    Excellent,
    /// Above -70, up to -50
    Good,
    /// Above -85, up to -70
    Weak,
    /// -85 or lower
    Poor,
}

impl SignalQuality {
    /// Classify a raw strength value. Total over all integers.
    pub fn classify(strength: i64) -> Self {
        if strength > -50 {
            SignalQuality::Excellent
        } else if strength > -70 {
            SignalQuality::Good
        } else if strength > -85 {
            SignalQuality::Weak
        } else {
            SignalQuality::Poor
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            SignalQuality::Excellent => "Excellent",
            SignalQuality::Good => "Good",
            SignalQuality::Weak => "Weak",
            SignalQuality::Poor => "Poor",
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify an optional strength; absent values are unavailable.
pub fn classify_signal(strength: Option<i64>) -> Metric<SignalQuality> {
    strength.map(SignalQuality::classify).into()
}

/// Battery level passthrough.
pub fn battery(level: Option<i64>) -> Metric<i64> {
    level.into()
}

// =============================================================================
// Liveness
// =============================================================================

fn newer_than(reading: Option<&Reading>, now: DateTime<Utc>, window_secs: i64) -> bool {
    reading.is_some_and(|r| r.recorded_at > now - Duration::seconds(window_secs))
}

/// Whether a patient's device is connected: its newest reading is strictly
/// younger than the liveness window. A reading exactly at the boundary is stale.
pub fn is_active(latest: Option<&Reading>, now: DateTime<Utc>) -> bool {
    newer_than(latest, now, LIVENESS_WINDOW_SECS)
}

/// Monitoring label for a patient card.
pub fn monitoring_label(active: bool) -> &'static str {
    if active {
        "Active Monitoring"
    } else {
        "Not Active"
    }
}

/// Fleet-level status shown to administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemStatus {
    /// Some device reported within the system window
    Online,
    /// Nothing recent anywhere
    Offline,
}

impl SystemStatus {
    /// Evaluate from the newest reading across every patient.
    pub fn evaluate(latest_overall: Option<&Reading>, now: DateTime<Utc>) -> Self {
        if newer_than(latest_overall, now, SYSTEM_ONLINE_WINDOW_SECS) {
            SystemStatus::Online
        } else {
            SystemStatus::Offline
        }
    }
}

// =============================================================================
// Averages
// =============================================================================

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Mean heart rate over `readings`, `None` when empty.
pub fn mean_heart_rate(readings: &[Reading]) -> Option<f64> {
    mean(readings.iter().map(|r| r.vitals.heart_rate))
}

/// Mean body temperature over `readings`, `None` when empty.
pub fn mean_body_temperature(readings: &[Reading]) -> Option<f64> {
    mean(readings.iter().map(|r| r.vitals.body_temperature))
}

/// Averages shown on a responder's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Averages {
    /// Mean heart rate, integer part
    pub heart_rate: Metric<i64>,
    /// Mean body temperature, one decimal
    pub body_temperature: Metric<f64>,
}

impl Averages {
    /// Compute over any set of readings. An empty set gives unavailable values.
    pub fn over(readings: &[Reading]) -> Self {
        Self {
            heart_rate: mean_heart_rate(readings).map(whole).into(),
            body_temperature: mean_body_temperature(readings).map(one_decimal).into(),
        }
    }
}

// =============================================================================
// Live status
// =============================================================================

/// Snapshot polled by a patient's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LiveStatus {
    /// Device connected per the liveness window
    pub is_active: bool,
    /// Beats per minute, integer part
    pub heart_rate: Metric<i64>,
    /// Body temperature, one decimal
    pub body_temp: Metric<f64>,
    /// Room temperature, one decimal
    pub room_temp: Metric<f64>,
    /// Humidity, integer part
    pub humidity: Metric<i64>,
    /// Battery level
    pub battery: Metric<i64>,
    /// Signal label
    pub signal: Metric<SignalQuality>,
}

impl LiveStatus {
    /// Derive from the newest reading of a patient, if any.
    ///
    /// Values of the newest reading are shown even when the device is no
    /// longer active.
    pub fn evaluate(latest: Option<&Reading>, now: DateTime<Utc>) -> Self {
        let Some(reading) = latest else {
            return Self::unavailable();
        };
        let v = &reading.vitals;

        Self {
            is_active: is_active(latest, now),
            heart_rate: Metric::Value(whole(v.heart_rate)),
            body_temp: Metric::Value(one_decimal(v.body_temperature)),
            room_temp: v.room_temperature.map(one_decimal).into(),
            humidity: v.humidity.map(whole).into(),
            battery: battery(v.battery_level),
            signal: classify_signal(v.signal_strength),
        }
    }

    /// Status of a patient who has never reported.
    pub fn unavailable() -> Self {
        Self {
            is_active: false,
            heart_rate: Metric::Unavailable,
            body_temp: Metric::Unavailable,
            room_temp: Metric::Unavailable,
            humidity: Metric::Unavailable,
            battery: Metric::Unavailable,
            signal: Metric::Unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smarthealth_core::{PatientId, ReadingId, VitalSample};

    fn at(now: DateTime<Utc>, age: Duration) -> Reading {
        Reading {
            id: ReadingId::new(1),
            patient_id: PatientId::new(1),
            vitals: VitalSample {
                heart_rate: 72.9,
                body_temperature: 36.66,
                ..VitalSample::default()
            },
            recorded_at: now - age,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_signal_boundaries() {
        assert_eq!(SignalQuality::classify(-49), SignalQuality::Excellent);
        assert_eq!(SignalQuality::classify(-50), SignalQuality::Good);
        assert_eq!(SignalQuality::classify(-69), SignalQuality::Good);
        assert_eq!(SignalQuality::classify(-70), SignalQuality::Weak);
        assert_eq!(SignalQuality::classify(-84), SignalQuality::Weak);
        assert_eq!(SignalQuality::classify(-85), SignalQuality::Poor);
        assert_eq!(SignalQuality::classify(i64::MIN), SignalQuality::Poor);
        assert_eq!(SignalQuality::classify(30), SignalQuality::Excellent);
        assert_eq!(classify_signal(None), Metric::Unavailable);
    }

    #[test]
    fn test_liveness_boundary_is_exclusive() {
        let now = now();
        let fresh = at(now, Duration::milliseconds(14_999));
        let edge = at(now, Duration::seconds(15));
        assert!(is_active(Some(&fresh), now));
        assert!(!is_active(Some(&edge), now));
        assert!(!is_active(None, now));
    }

    #[test]
    fn test_system_window_independent_of_liveness() {
        let now = now();
        let r = at(now, Duration::seconds(20));
        assert!(!is_active(Some(&r), now));
        assert_eq!(SystemStatus::evaluate(Some(&r), now), SystemStatus::Online);

        let r = at(now, Duration::seconds(30));
        assert_eq!(SystemStatus::evaluate(Some(&r), now), SystemStatus::Offline);
        assert_eq!(SystemStatus::evaluate(None, now), SystemStatus::Offline);
    }

    #[test]
    fn test_averages_empty_is_unavailable() {
        let avg = Averages::over(&[]);
        assert_eq!(avg.heart_rate, Metric::Unavailable);
        assert_eq!(avg.body_temperature, Metric::Unavailable);

        let json = serde_json::to_value(avg).unwrap();
        assert_eq!(json["heart_rate"], "--");
    }

    #[test]
    fn test_averages_values() {
        let now = now();
        let mut a = at(now, Duration::zero());
        a.vitals.heart_rate = 70.0;
        a.vitals.body_temperature = 36.5;
        let mut b = a.clone();
        b.vitals.heart_rate = 75.0;
        b.vitals.body_temperature = 37.0;

        let avg = Averages::over(&[a, b]);
        assert_eq!(avg.heart_rate, Metric::Value(72));
        assert_eq!(avg.body_temperature, Metric::Value(36.8));
    }

    #[test]
    fn test_live_status_rendering() {
        let now = now();
        let mut r = at(now, Duration::seconds(3));
        r.vitals.room_temperature = Some(24.04);
        r.vitals.battery_level = Some(0);
        r.vitals.signal_strength = Some(-72);

        let status = LiveStatus::evaluate(Some(&r), now);
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["is_active"], true);
        assert_eq!(json["heart_rate"], 72);
        assert_eq!(json["body_temp"], 36.7);
        assert_eq!(json["room_temp"], 24.0);
        assert_eq!(json["humidity"], "--");
        assert_eq!(json["battery"], 0);
        assert_eq!(json["signal"], "Weak");
    }

    #[test]
    fn test_live_status_without_readings() {
        let json = serde_json::to_value(LiveStatus::evaluate(None, now())).unwrap();
        assert_eq!(json["is_active"], false);
        for field in ["heart_rate", "body_temp", "room_temp", "humidity", "battery", "signal"] {
            assert_eq!(json[field], "--", "{field}");
        }
    }

    #[test]
    fn test_stale_reading_keeps_values() {
        let now = now();
        let r = at(now, Duration::minutes(10));
        let status = LiveStatus::evaluate(Some(&r), now);
        assert!(!status.is_active);
        assert_eq!(status.heart_rate, Metric::Value(72));
    }
}
