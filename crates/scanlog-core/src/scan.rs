use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::store::ScanStoreError;

/// One persisted scan: the decoded payload plus optional location and timing metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRecord {
    /// Backend-assigned, never reused within one backend's lifetime.
    pub id: i64,
    pub qr_data: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Client capture time in epoch milliseconds.
    pub timestamp: i64,
    /// ISO-8601 UTC persistence time, assigned by the backend.
    pub created_at: String,
}

impl ScanRecord {
    /// The caller-supplied part of this record.
    pub fn to_new_scan(&self) -> NewScan {
        NewScan {
            qr_data: self.qr_data.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            accuracy: self.accuracy,
            timestamp: self.timestamp,
        }
    }
}

/// A scan as submitted by the caller, before the backend assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewScan {
    pub qr_data: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp: i64,
}

/// Position fix reported by the platform location capability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScanLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
}

impl NewScan {
    /// A scan without location metadata.
    pub fn new(qr_data: impl Into<String>, timestamp: i64) -> Self {
        Self {
            qr_data: qr_data.into(),
            latitude: None,
            longitude: None,
            altitude: None,
            accuracy: None,
            timestamp,
        }
    }

    /// Attach a location fix; `None` leaves every location field empty.
    pub fn with_location(mut self, location: Option<ScanLocation>) -> Self {
        match location {
            Some(fix) => {
                self.latitude = Some(fix.latitude);
                self.longitude = Some(fix.longitude);
                self.altitude = fix.altitude;
                self.accuracy = fix.accuracy;
            }
            None => {
                self.latitude = None;
                self.longitude = None;
                self.altitude = None;
                self.accuracy = None;
            }
        }
        self
    }

    /// Reject input no backend can persist faithfully.
    pub fn validate(&self) -> Result<(), ScanStoreError> {
        if self.qr_data.is_empty() {
            return Err(ScanStoreError::InvalidScan {
                reason: "qr_data must not be empty".to_string(),
            });
        }

        let fields = [
            ("latitude", self.latitude),
            ("longitude", self.longitude),
            ("altitude", self.altitude),
            ("accuracy", self.accuracy),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(ScanStoreError::InvalidScan {
                        reason: format!("{name} must be a finite number, got {v}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Complete the record with backend-assigned fields.
    pub fn into_record(self, id: i64, created_at: String) -> ScanRecord {
        ScanRecord {
            id,
            qr_data: self.qr_data,
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude,
            accuracy: self.accuracy,
            timestamp: self.timestamp,
            created_at,
        }
    }
}

/// Current time in the `created_at` format (`2024-01-31T12:00:00.000Z`).
///
/// Matches what the SQLite backend's column default produces.
pub fn created_at_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as epoch milliseconds, the unit of `timestamp`.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Order records most recent first. Stable, so equal timestamps keep their input order.
pub fn sort_newest_first(records: &mut [ScanRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, timestamp: i64) -> ScanRecord {
        NewScan::new(format!("scan-{id}"), timestamp).into_record(id, created_at_now())
    }

    #[test]
    fn validate_rejects_empty_payload() {
        let err = NewScan::new("", 1).validate().expect_err("empty qr_data");
        assert!(matches!(err, ScanStoreError::InvalidScan { .. }));
    }

    #[test]
    fn validate_rejects_non_finite_location() {
        let mut scan = NewScan::new("hello", 1);
        scan.latitude = Some(f64::NAN);
        let err = scan.validate().expect_err("nan latitude");
        assert!(matches!(err, ScanStoreError::InvalidScan { ref reason } if reason.contains("latitude")));

        let mut scan = NewScan::new("hello", 1);
        scan.accuracy = Some(f64::INFINITY);
        assert!(scan.validate().is_err());
    }

    #[test]
    fn validate_accepts_missing_location() {
        NewScan::new("https://example.com", 1000)
            .validate()
            .expect("no location is fine");
    }

    #[test]
    fn with_location_sets_and_clears_fields() {
        let scan = NewScan::new("x", 1).with_location(Some(ScanLocation {
            latitude: 40.0,
            longitude: -3.0,
            altitude: None,
            accuracy: Some(5.0),
        }));
        assert_eq!(scan.latitude, Some(40.0));
        assert_eq!(scan.longitude, Some(-3.0));
        assert_eq!(scan.altitude, None);
        assert_eq!(scan.accuracy, Some(5.0));

        let cleared = scan.with_location(None);
        assert_eq!(cleared.latitude, None);
        assert_eq!(cleared.accuracy, None);
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut records = vec![record(1, 100), record(2, 300), record(3, 200), record(4, 300)];
        sort_newest_first(&mut records);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn created_at_is_iso8601_millis_utc() {
        let stamp = created_at_now();
        assert_eq!(stamp.len(), "2024-01-31T12:00:00.000Z".len());
        assert!(stamp.ends_with('Z'));
        assert_eq!(&stamp[10..11], "T");
    }

    #[test]
    fn json_shape_uses_snake_case_and_nulls() {
        let rec = NewScan::new("abc", 7).into_record(3, "2024-01-31T12:00:00.000Z".into());
        let json = serde_json::to_value(&rec).expect("serialize");
        assert_eq!(json["qr_data"], "abc");
        assert!(json["latitude"].is_null());
        assert_eq!(json["created_at"], "2024-01-31T12:00:00.000Z");
    }
}
