//! Prediction response normalization
//!
//! The risk model service answers in several shapes:
//! - a flat record: `{"risk_score": 0.8, "risk_bucket": "high", ...}`
//! - a record nested under `prediction`: `{"prediction": {...}}`
//! - a failure envelope: `{"ok": false, "message": "..."}` (or `error`)
//!
//! Each response is first classified into a [`WireShape`], then reduced to a
//! single [`PredictionRecord`] or a typed error. A partially filled record is
//! never produced.

use crate::error::EngineError;
use crate::types::{PredictionRecord, RiskBucket};
use serde_json::{Map, Value};
use tracing::debug;

/// Confidence reported when the service omits it
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// How many `prediction` wrappers are unwrapped before giving up
const MAX_NESTING: usize = 4;

/// Recognised response shapes
#[derive(Debug, PartialEq)]
pub enum WireShape<'a> {
    Failure { message: String },
    Nested(&'a Value),
    Flat(&'a Map<String, Value>),
}

impl<'a> WireShape<'a> {
    pub fn classify(value: &'a Value) -> Result<Self, EngineError> {
        let Some(map) = value.as_object() else {
            return Err(EngineError::Validation(
                "prediction response is not a JSON object".to_string(),
            ));
        };

        if map.get("ok") == Some(&Value::Bool(false)) {
            return Ok(WireShape::Failure {
                message: failure_message(map),
            });
        }

        match map.get("prediction") {
            Some(inner) if inner.is_object() => Ok(WireShape::Nested(inner)),
            _ => Ok(WireShape::Flat(map)),
        }
    }
}

/// Converts model service responses into canonical prediction records
pub struct PredictionNormalizer;

impl PredictionNormalizer {
    /// Normalize a raw JSON response body
    pub fn normalize_str(raw: &str) -> Result<PredictionRecord, EngineError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::normalize(&value)
    }

    /// Normalize a parsed response.
    ///
    /// `Service` when the envelope says `ok: false`, `Validation` when no
    /// numeric `risk_score` exists after unwrapping.
    pub fn normalize(value: &Value) -> Result<PredictionRecord, EngineError> {
        let mut current = value;
        for _ in 0..=MAX_NESTING {
            match WireShape::classify(current)? {
                WireShape::Failure { message } => return Err(EngineError::Service(message)),
                WireShape::Nested(inner) => current = inner,
                WireShape::Flat(map) => return from_flat(map),
            }
        }
        Err(EngineError::Validation(format!(
            "prediction nested deeper than {} levels",
            MAX_NESTING
        )))
    }
}

fn from_flat(map: &Map<String, Value>) -> Result<PredictionRecord, EngineError> {
    let raw_score = map
        .get("risk_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            EngineError::Validation("no numeric risk_score in prediction response".to_string())
        })?;
    let risk_score = raw_score.clamp(0.0, 1.0);
    if risk_score != raw_score {
        debug!(raw_score, "risk_score outside [0, 1], clamped");
    }

    let label = bucket_label(map);
    let risk_bucket = RiskBucket::parse_label(&label).unwrap_or_else(|| {
        debug!(label = %label, "unrecognised risk bucket, using medium");
        RiskBucket::Medium
    });

    let confidence = map
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let model_version = map.get("model_version").and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(PredictionRecord {
        risk_score,
        confidence,
        risk_bucket,
        model_version,
        risk_code: map.get("risk_code").and_then(code_of),
    })
}

/// Bucket label: explicit field, else derived from `risk_code`, else medium
fn bucket_label(map: &Map<String, Value>) -> String {
    let explicit = ["risk_bucket", "bucket"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find(|v| !v.is_null());

    if let Some(value) = explicit {
        return match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }

    if let Some(code) = map.get("risk_code").filter(|v| !v.is_null()) {
        return code_of(code)
            .and_then(|c| RiskBucket::from_code(i64::from(c)))
            .map(|b| b.as_str().to_string())
            .unwrap_or_else(|| code.to_string());
    }

    RiskBucket::Medium.as_str().to_string()
}

fn code_of(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|c| u8::try_from(c).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn failure_message(map: &Map<String, Value>) -> String {
    ["message", "error", "detail"]
        .iter()
        .filter_map(|key| map.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Null => None,
            Value::String(_) => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| "prediction service reported a failure".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_failure_envelope_raises_service_error() {
        let err = PredictionNormalizer::normalize(&json!({"ok": false, "message": "offline"}))
            .unwrap_err();
        match err {
            EngineError::Service(message) => assert_eq!(message, "offline"),
            other => panic!("expected service error, got {:?}", other),
        }

        let err = PredictionNormalizer::normalize(&json!({"ok": false, "error": "model not loaded"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Service error: model not loaded");
    }

    #[test]
    fn test_nested_prediction_is_unwrapped() {
        let record = PredictionNormalizer::normalize(
            &json!({"prediction": {"risk_score": 0.8, "risk_bucket": "HIGH"}}),
        )
        .unwrap();

        assert_eq!(
            record,
            PredictionRecord {
                risk_score: 0.8,
                confidence: 0.5,
                risk_bucket: RiskBucket::High,
                model_version: None,
                risk_code: None,
            }
        );
    }

    #[test]
    fn test_flat_record_keeps_optional_fields() {
        let record = PredictionNormalizer::normalize_str(
            r#"{
                "risk_score": 0.42,
                "risk_bucket": "low",
                "risk_code": 0,
                "confidence": 0.16,
                "model_version": "v2.3.1",
                "runtime_sec": 0.01
            }"#,
        )
        .unwrap();

        assert_eq!(record.risk_bucket, RiskBucket::Low);
        assert_eq!(record.risk_code, Some(0));
        assert_eq!(record.model_version.as_deref(), Some("v2.3.1"));
        assert!((record.confidence - 0.16).abs() < 1e-9);
    }

    #[test]
    fn test_missing_score_is_validation_error() {
        for response in [
            json!({"risk_bucket": "high"}),
            json!({"prediction": {"risk_score": "0.9"}}),
            json!({"ok": true}),
            json!([0.9]),
        ] {
            assert!(
                matches!(
                    PredictionNormalizer::normalize(&response),
                    Err(EngineError::Validation(_))
                ),
                "{} should fail validation",
                response
            );
        }
    }

    #[test]
    fn test_bucket_falls_back_to_code_then_medium() {
        let from_code =
            PredictionNormalizer::normalize(&json!({"risk_score": 0.9, "risk_code": 2})).unwrap();
        assert_eq!(from_code.risk_bucket, RiskBucket::High);

        let string_code =
            PredictionNormalizer::normalize(&json!({"risk_score": 0.1, "risk_code": "0"})).unwrap();
        assert_eq!(string_code.risk_bucket, RiskBucket::Low);

        let absent = PredictionNormalizer::normalize(&json!({"risk_score": 0.9})).unwrap();
        assert_eq!(absent.risk_bucket, RiskBucket::Medium);

        let bad_code =
            PredictionNormalizer::normalize(&json!({"risk_score": 0.9, "risk_code": 7})).unwrap();
        assert_eq!(bad_code.risk_bucket, RiskBucket::Medium);
    }

    #[test]
    fn test_unrecognised_bucket_becomes_medium() {
        let record = PredictionNormalizer::normalize(
            &json!({"risk_score": 0.95, "risk_bucket": "Severe", "risk_code": 2}),
        )
        .unwrap();
        assert_eq!(record.risk_bucket, RiskBucket::Medium);
    }

    #[test]
    fn test_confidence_defaults_when_not_numeric() {
        let record = PredictionNormalizer::normalize(
            &json!({"risk_score": 0.3, "confidence": "high"}),
        )
        .unwrap();
        assert_eq!(record.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let record = PredictionNormalizer::normalize(
            &json!({"risk_score": 1.7, "confidence": -0.2, "risk_bucket": "high"}),
        )
        .unwrap();
        assert_eq!(record.risk_score, 1.0);
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn test_failure_inside_nesting_is_still_a_failure() {
        let err = PredictionNormalizer::normalize(
            &json!({"prediction": {"ok": false, "message": "model warming up"}}),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Service(m) if m == "model warming up"));
    }

    #[test]
    fn test_classify_shapes() {
        let flat = json!({"risk_score": 0.1});
        let nested = json!({"prediction": {"risk_score": 0.1}});
        let failed = json!({"ok": false});

        assert!(matches!(WireShape::classify(&flat).unwrap(), WireShape::Flat(_)));
        assert!(matches!(WireShape::classify(&nested).unwrap(), WireShape::Nested(_)));
        assert_eq!(
            WireShape::classify(&failed).unwrap(),
            WireShape::Failure {
                message: "prediction service reported a failure".to_string()
            }
        );
    }
}
