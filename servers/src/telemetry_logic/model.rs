use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored sensor or actuator reading. `id` and `timestamp` are always
/// present; everything else is whatever the producer supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Inbound record fields for a create, from either entry point. Every field
/// is optional; a missing timestamp is assigned at persistence time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecord {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Partial fields for an update-by-id. Fields left out of the payload keep
/// their stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPatch {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.name.is_none()
            && self.value.is_none()
            && self.unit.is_none()
            && self.timestamp.is_none()
    }
}

/// Exact-match query filter. Omitted fields are unconstrained; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub kind: Option<String>,
    pub name: Option<String>,
}

/// Inbound WebSocket frame: `{"event": "newReading", "data": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Outbound WebSocket frame carrying a stored or updated record.
#[derive(Debug, Serialize)]
pub struct ServerEnvelope<'a> {
    pub event: &'static str,
    pub data: &'a SensorRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_accepts_partial_payload() {
        let payload: NewRecord = serde_json::from_value(json!({"value": 21.5})).unwrap();
        assert!(payload.kind.is_none());
        assert!(payload.name.is_none());
        assert_eq!(payload.value, Some(json!(21.5)));
        assert!(payload.timestamp.is_none());
    }

    #[test]
    fn test_new_record_value_takes_any_shape() {
        let structured: NewRecord = serde_json::from_value(json!({
            "kind": "gps",
            "value": {"lat": 40.4, "lon": -3.7, "fix": true}
        }))
        .unwrap();
        assert_eq!(structured.value, Some(json!({"lat": 40.4, "lon": -3.7, "fix": true})));

        let boolean: NewRecord = serde_json::from_value(json!({"value": false})).unwrap();
        assert_eq!(boolean.value, Some(json!(false)));
    }

    #[test]
    fn test_new_record_ignores_unknown_top_level_fields() {
        let payload: NewRecord =
            serde_json::from_value(json!({"name": "s1", "firmware": "2.1.0"})).unwrap();
        assert_eq!(payload.name.as_deref(), Some("s1"));
    }

    #[test]
    fn test_record_patch_absent_fields_stay_none() {
        let patch: RecordPatch = serde_json::from_value(json!({"value": 22.0})).unwrap();
        assert!(!patch.is_empty());
        assert_eq!(patch.value, Some(json!(22.0)));
        assert!(patch.kind.is_none());
        assert!(patch.unit.is_none());

        let empty: RecordPatch = serde_json::from_value(json!({})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_sensor_record_omits_absent_fields_on_the_wire() {
        let record = SensorRecord {
            id: "abc".to_string(),
            kind: Some("temp".to_string()),
            name: None,
            value: Some(json!(21.5)),
            unit: None,
            timestamp: Utc::now(),
        };
        let wire = serde_json::to_value(&record).unwrap();
        assert_eq!(wire["id"], json!("abc"));
        assert_eq!(wire["kind"], json!("temp"));
        assert!(wire.get("name").is_none());
        assert!(wire.get("unit").is_none());
        assert!(wire.get("timestamp").is_some());
    }

    #[test]
    fn test_client_envelope_data_defaults_to_null() {
        let envelope: ClientEnvelope =
            serde_json::from_value(json!({"event": "newReading"})).unwrap();
        assert_eq!(envelope.event, "newReading");
        assert!(envelope.data.is_null());
    }
}
