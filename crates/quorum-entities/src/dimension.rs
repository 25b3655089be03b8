//! Service response parsing and per-dimension value normalisation.

use quorum_core::ExtractionResult;
use serde::Deserialize;
use serde_json::Value;

use crate::ExtractError;
use crate::batch::RawSpan;

/// Extractor id stamped on every entity coming from the service.
pub(crate) const SYSTEM_EXTRACTOR: &str = "system";

#[derive(Debug, Deserialize)]
struct ServiceEntity {
    dim: String,
    start: usize,
    end: usize,
    #[serde(default)]
    body: String,
    #[serde(default)]
    value: Value,
}

/// Parse a service response into spans over the joined request text.
///
/// The response must be a JSON array; any other shape is rejected.
pub(crate) fn parse_response(body: &str) -> Result<Vec<RawSpan>, ExtractError> {
    let json: Value = serde_json::from_str(body)?;
    if !json.is_array() {
        return Err(ExtractError::UnexpectedShape(shape_name(&json)));
    }
    let entities: Vec<ServiceEntity> = serde_json::from_value(json)?;

    Ok(entities
        .into_iter()
        .map(|e| {
            let (value, unit) = normalize(&e.dim, &e.value);
            RawSpan {
                start: e.start,
                end: e.end,
                entity: ExtractionResult {
                    entity_type: e.dim,
                    value,
                    unit,
                    start: e.start,
                    end: e.end,
                    confidence: 1.0,
                    source_text: e.body,
                    extractor_id: SYSTEM_EXTRACTOR.to_string(),
                },
            }
        })
        .collect())
}

/// Reduce a raw dimension value to a `(value, unit)` pair.
pub(crate) fn normalize(dim: &str, raw: &Value) -> (Value, Option<String>) {
    match dim {
        "duration" => {
            let normalized = &raw["normalized"];
            (normalized["value"].clone(), string_field(normalized, "unit"))
        }
        "time" if raw["type"] == "interval" => {
            let value = serde_json::json!({
                "from": raw["from"]["value"].clone(),
                "to": raw["to"]["value"].clone(),
            });
            (value, Some("interval".to_string()))
        }
        "time" => (raw["value"].clone(), string_field(raw, "grain")),
        "quantity" => (
            raw["value"].clone(),
            string_field(raw, "product").or_else(|| string_field(raw, "unit")),
        ),
        _ => (raw["value"].clone(), string_field(raw, "unit")),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duration_uses_normalized_value() {
        let raw = json!({
            "value": 2, "unit": "hour",
            "normalized": { "value": 7200, "unit": "second" }
        });
        assert_eq!(
            normalize("duration", &raw),
            (json!(7200), Some("second".to_string()))
        );
    }

    #[test]
    fn time_uses_grain_as_unit() {
        let raw = json!({ "type": "value", "value": "2026-10-19T00:00:00.000Z", "grain": "day" });
        assert_eq!(
            normalize("time", &raw),
            (json!("2026-10-19T00:00:00.000Z"), Some("day".to_string()))
        );
    }

    #[test]
    fn time_interval_keeps_bounds() {
        let raw = json!({
            "type": "interval",
            "from": { "value": "2026-10-19T09:00:00.000Z", "grain": "hour" },
            "to": { "value": "2026-10-19T12:00:00.000Z", "grain": "hour" }
        });
        let (value, unit) = normalize("time", &raw);
        assert_eq!(value["from"], "2026-10-19T09:00:00.000Z");
        assert_eq!(value["to"], "2026-10-19T12:00:00.000Z");
        assert_eq!(unit.as_deref(), Some("interval"));
    }

    #[test]
    fn default_uses_raw_unit() {
        let raw = json!({ "value": 20, "unit": "celsius" });
        assert_eq!(
            normalize("temperature", &raw),
            (json!(20), Some("celsius".to_string()))
        );
        assert_eq!(normalize("number", &json!({ "value": 3 })), (json!(3), None));
    }

    #[test]
    fn parses_array_response() {
        let body = r#"[
            { "dim": "number", "start": 3, "end": 4, "body": "3",
              "value": { "type": "value", "value": 3 } }
        ]"#;
        let spans = parse_response(body).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].entity.entity_type, "number");
        assert_eq!(spans[0].entity.value, json!(3));
        assert_eq!(spans[0].entity.extractor_id, "system");
        assert_eq!(spans[0].entity.confidence, 1.0);
    }

    #[test]
    fn rejects_non_array_response() {
        let err = parse_response(r#"{ "error": "oops" }"#).unwrap_err();
        assert!(matches!(err, ExtractError::UnexpectedShape("an object")));

        assert!(matches!(
            parse_response("not json"),
            Err(ExtractError::Json(_))
        ));
    }
}
