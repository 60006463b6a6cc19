//! Structured ingestion pipeline.
//!
//! Turns raw model text into a typed record. Stages run in order and each
//! one is a public pure function:
//!
//! 1. [`strip_code_fences`]
//! 2. direct parse
//! 3. [`repair_json`] then parse again
//! 4. [`unecho_schema`] replaces echoed schema descriptions with defaults
//! 5. [`coerce_types`] bends values toward their declared kinds
//! 6. [`backfill_records`] fills missing or null fields inside record lists
//! 7. typed deserialization
//!
//! Retrying the generation at a lower temperature is not done here; the
//! caller sees [`IngestError::ParseFailed`] and decides.

use crate::schema::{FieldKind, FieldSpec, Schema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Longest excerpt of bad output kept in an error.
const EXCERPT_LEN: usize = 200;

const TRUTHY: &[&str] = &["true", "yes", "y", "1", "on", "да"];

#[derive(Debug, Error)]
pub enum IngestError {
    /// The text could not be turned into JSON even after repair.
    #[error("{schema}: unparseable model output ({source}): {excerpt}")]
    ParseFailed {
        schema: &'static str,
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },
    /// The JSON does not fit the schema even after coercion.
    #[error("{schema}: model output does not match schema: {reason}")]
    ValidationFailed { schema: &'static str, reason: String },
}

impl IngestError {
    pub fn schema(&self) -> &'static str {
        match self {
            IngestError::ParseFailed { schema, .. } | IngestError::ValidationFailed { schema, .. } => {
                schema
            }
        }
    }

    pub fn is_parse_failure(&self) -> bool {
        matches!(self, IngestError::ParseFailed { .. })
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_LEN).collect()
}

/// Run the whole pipeline for schema `S`.
pub fn ingest<S: Schema + DeserializeOwned>(raw: &str) -> Result<S, IngestError> {
    let value = parse_value(raw, S::schema_name())?;
    validate::<S>(value)
}

/// Stages 1–3: get a JSON value out of the text.
pub fn parse_value(raw: &str, schema: &'static str) -> Result<Value, IngestError> {
    let text = strip_code_fences(raw);

    let first_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };
    tracing::debug!(schema, error = %first_error, "Direct parse failed, repairing");

    let repaired = repair_json(text);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            tracing::info!(schema, "Parsed model output after repair");
            Ok(value)
        }
        Err(source) => Err(IngestError::ParseFailed {
            schema,
            excerpt: excerpt(text),
            source,
        }),
    }
}

/// Stages 4–7: shape a parsed value into `S`.
pub fn validate<S: Schema + DeserializeOwned>(value: Value) -> Result<S, IngestError> {
    let schema = S::schema_name();
    let fields = S::fields();

    let value = match value {
        // A lone object wrapped in an array.
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => items.remove(0),
        other => other,
    };
    if !value.is_object() {
        return Err(IngestError::ValidationFailed {
            schema,
            reason: format!("expected a JSON object, got {}", kind_of(&value)),
        });
    }

    let value = unecho_schema(value, &fields);
    let value = coerce_types(value, &fields);
    let value = backfill_records(value, &fields);

    serde_json::from_value(value).map_err(|e| IngestError::ValidationFailed {
        schema,
        reason: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ============================================================================
// Stage 1: fences
// ============================================================================

/// Remove a surrounding Markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the rest of the opening line (the language tag).
    let body = match after_open.find('\n') {
        Some(newline) => &after_open[newline + 1..],
        None => after_open,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

// ============================================================================
// Stage 3: repair
// ============================================================================

/// Best-effort repair of almost-JSON.
///
/// Outside strings: prose around the root object is dropped and trailing
/// commas before `}` or `]` are removed. Inside strings: raw
/// newlines and tabs are escaped and other control characters dropped. A
/// truncated payload gets its open string and brackets closed.
pub fn repair_json(text: &str) -> String {
    let text = match text.find('{') {
        Some(start) if !text.trim_start().starts_with('[') => &text[start..],
        _ => text,
    };

    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut open: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => {}
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' | '[' => {
                open.push(c);
                out.push(c);
            }
            '}' | ']' => {
                open.pop();
                out.push(c);
                if open.is_empty() {
                    // Root closed; anything after it is commentary.
                    break;
                }
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    if !open.is_empty() {
        tracing::debug!(unclosed = open.len(), "Closing truncated JSON");
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(',') {
            out.pop();
        }
        if out.ends_with(':') {
            out.push_str(" null");
        }
        for bracket in open.iter().rev() {
            out.push(if *bracket == '{' { '}' } else { ']' });
        }
    }

    out
}

// ============================================================================
// Stage 4: schema echo
// ============================================================================

fn looks_like_field_schema(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.get("type").is_some_and(Value::is_string))
}

/// Undo a model echoing the schema back instead of filling it in.
///
/// A top-level `{"properties": {...}}` wrapper is unwrapped, and any declared
/// field holding a `{"type": ...}` description is replaced by that
/// description's `default`, or the declared default.
pub fn unecho_schema(value: Value, fields: &[FieldSpec]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    let wrapped = fields.iter().all(|f| f.name != "properties")
        && map.get("properties").is_some_and(Value::is_object);
    if wrapped {
        tracing::warn!("Model echoed a schema wrapper, unwrapping properties");
        if let Some(Value::Object(inner)) = map.remove("properties") {
            map = inner;
        }
    }

    for spec in fields {
        let Some(field) = map.get_mut(spec.name) else {
            continue;
        };
        if !looks_like_field_schema(field) {
            continue;
        }
        tracing::warn!(field = spec.name, "Schema echo detected, using default");
        let replacement = field
            .get("default")
            .cloned()
            .unwrap_or_else(|| spec.default_or_zero());
        *field = replacement;
    }

    Value::Object(map)
}

// ============================================================================
// Stage 5: coercion
// ============================================================================

/// Coerce every declared top-level field toward its kind. `null` becomes the
/// kind's zero value unless the field is nullable.
pub fn coerce_types(value: Value, fields: &[FieldSpec]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    for spec in fields {
        if let Some(field) = map.get_mut(spec.name) {
            if field.is_null() {
                if !spec.nullable {
                    *field = spec.kind.zero_value();
                }
                continue;
            }
            let taken = field.take();
            *field = coerce_value(taken, spec);
        }
    }
    Value::Object(map)
}

/// Coerce the non-null fields of a nested record; nulls are left for
/// [`backfill_records`].
fn coerce_record(mut record: Map<String, Value>, fields: &[FieldSpec]) -> Map<String, Value> {
    for spec in fields {
        if let Some(field) = record.get_mut(spec.name) {
            if !field.is_null() {
                let taken = field.take();
                *field = coerce_value(taken, spec);
            }
        }
    }
    record
}

fn coerce_value(value: Value, spec: &FieldSpec) -> Value {
    match spec.kind {
        FieldKind::String => coerce_string(value),
        FieldKind::Integer => Value::from(to_integer(&value)),
        FieldKind::Float => Value::from(to_float(&value)),
        FieldKind::Boolean => Value::Bool(to_bool(&value)),
        FieldKind::StringList => Value::Array(to_string_list(value)),
        FieldKind::RecordList(sub) => Value::Array(to_record_list(value, &sub())),
    }
}

fn coerce_string(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        // Strings pass; objects and arrays are left to fail validation.
        other => other,
    }
}

/// Integers are clamped to `i32`, the width every integer field declares.
fn to_integer(value: &Value) -> i64 {
    let wide = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .unwrap_or(0)
        }
        Value::Bool(b) => *b as i64,
        _ => 0,
    };
    wide.clamp(i32::MIN as i64, i32::MAX as i64)
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => TRUTHY.contains(&s.trim().to_lowercase().as_str()),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a list that arrived as a string: JSON first (also with single
/// quotes), then a comma split.
fn parse_list_string(text: &str) -> Option<Vec<Value>> {
    let text = text.trim();
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return Some(items);
    }
    if text.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text.replace('\'', "\"")) {
            return Some(items);
        }
    }
    None
}

fn to_string_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(scalar_to_string)
            .map(Value::String)
            .collect(),
        Value::String(s) => {
            if let Some(items) = parse_list_string(&s) {
                return to_string_list(Value::Array(items));
            }
            s.trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'').trim())
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect()
        }
        other => scalar_to_string(other)
            .map(|s| vec![Value::String(s)])
            .unwrap_or_default(),
    }
}

fn to_record_list(value: Value, fields: &[FieldSpec]) -> Vec<Value> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        Value::String(s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Array(items)) => items,
            Ok(obj @ Value::Object(_)) => vec![obj],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(Value::Object(coerce_record(record, fields))),
            other => {
                tracing::debug!(element = %other, "Dropping non-object list element");
                None
            }
        })
        .collect()
}

// ============================================================================
// Stage 6: nested back-fill
// ============================================================================

/// Fill every record inside a record-list field so each declared sub-field
/// is present and non-null (nullable sub-fields may stay null).
pub fn backfill_records(value: Value, fields: &[FieldSpec]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    for spec in fields {
        let FieldKind::RecordList(sub) = spec.kind else {
            continue;
        };
        if let Some(Value::Array(items)) = map.get_mut(spec.name) {
            let sub_fields = sub();
            for item in items.iter_mut() {
                if let Value::Object(record) = item {
                    backfill_record(record, &sub_fields);
                }
            }
        }
    }
    Value::Object(map)
}

fn backfill_record(record: &mut Map<String, Value>, fields: &[FieldSpec]) {
    for spec in fields {
        let slot = record.entry(spec.name).or_insert(Value::Null);
        if slot.is_null() {
            *slot = spec.default_or_zero();
        }
        if let FieldKind::RecordList(sub) = spec.kind {
            if let Value::Array(items) = slot {
                let sub_fields = sub();
                for item in items.iter_mut() {
                    if let Value::Object(inner) = item {
                        backfill_record(inner, &sub_fields);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{CharacterProposal, MechanicsDecision, MissionProposal, NpcAction};
    use crate::schema::Schema as _;
    use serde_json::json;

    fn decision_fields() -> Vec<FieldSpec> {
        MechanicsDecision::fields()
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_repair_escapes_newline_in_string() {
        let raw = "{\"narration_context\": \"line one\nline two\"}";
        assert!(serde_json::from_str::<Value>(raw).is_err());
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["narration_context"], "line one\nline two");
    }

    #[test]
    fn test_repair_tabs_and_control_chars() {
        let raw = "{\"a\": \"x\ty\u{0001}z\"}";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["a"], "x\tyz");
    }

    #[test]
    fn test_repair_trailing_commas() {
        let raw = "{\"a\": [1, 2, ], \"b\": 3, }";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value, json!({"a": [1, 2], "b": 3}));
    }

    #[test]
    fn test_repair_keeps_commas_inside_strings() {
        let raw = "{\"a\": \"one, }\", }";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["a"], "one, }");
    }

    #[test]
    fn test_repair_truncated_payload() {
        let raw = "{\"narration_context\": \"The goblin\", \"xp_gained\": 10";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["xp_gained"], 10);

        let cut_in_string = "{\"skill_checks\": [{\"skill\": \"Stea";
        let value: Value = serde_json::from_str(&repair_json(cut_in_string)).unwrap();
        assert_eq!(value["skill_checks"][0]["skill"], "Stea");

        let cut_after_key = "{\"a\": 1, \"b\":";
        let value: Value = serde_json::from_str(&repair_json(cut_after_key)).unwrap();
        assert_eq!(value["b"], Value::Null);
    }

    #[test]
    fn test_repair_drops_leading_prose() {
        let raw = "Here you go: {\"a\": 1}";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["a"], 1);

        let raw = "{\"a\": [1, 2,],}\n```\nHope that helps!";
        let value: Value = serde_json::from_str(&repair_json(raw)).unwrap();
        assert_eq!(value["a"], json!([1, 2]));
    }

    #[test]
    fn test_coerce_string_lists() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({"available_actions": "['Stealth', 'Perception']"}),
            &fields,
        );
        assert_eq!(value["available_actions"], json!(["Stealth", "Perception"]));

        let value = coerce_types(json!({"available_actions": "Stealth, Perception"}), &fields);
        assert_eq!(value["available_actions"], json!(["Stealth", "Perception"]));

        let value = coerce_types(json!({"available_actions": "[\"Run\"]"}), &fields);
        assert_eq!(value["available_actions"], json!(["Run"]));
    }

    #[test]
    fn test_coerce_nulls_to_zero() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({
                "skill_checks": null,
                "narration_context": null,
                "xp_gained": null,
                "is_combat_start": null
            }),
            &fields,
        );
        assert_eq!(value["skill_checks"], json!([]));
        assert_eq!(value["narration_context"], "");
        assert_eq!(value["xp_gained"], 0);
        assert_eq!(value["is_combat_start"], false);
    }

    #[test]
    fn test_coerce_numbers() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({"xp_gained": 15.0, "gold_change": "15", "attack_target_ac": "tough"}),
            &fields,
        );
        assert_eq!(value["xp_gained"], 15);
        assert_eq!(value["gold_change"], 15);
        assert_eq!(value["attack_target_ac"], 0);

        let value = coerce_types(json!({"gold_change": "-7.9"}), &fields);
        assert_eq!(value["gold_change"], -7);
    }

    #[test]
    fn test_coerce_clamps_to_i32() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({"xp_gained": 99999999999i64, "gold_change": "-1e12", "attack_target_ac": 1e300}),
            &fields,
        );
        assert_eq!(value["xp_gained"], i32::MAX);
        assert_eq!(value["gold_change"], i32::MIN);
        assert_eq!(value["attack_target_ac"], i32::MAX);

        let value = coerce_types(json!({"skill_checks": [{"skill": "Stealth", "dc": 5000000000u64}]}), &fields);
        assert_eq!(value["skill_checks"][0]["dc"], i32::MAX);
    }

    #[test]
    fn test_ingest_oversized_integer_is_repaired() {
        let decision: MechanicsDecision =
            ingest(r#"{"narration_context": "ok", "xp_gained": 99999999999}"#).unwrap();
        assert_eq!(decision.narration_context, "ok");
        assert_eq!(decision.xp_gained, i32::MAX);
    }

    #[test]
    fn test_coerce_booleans_and_strings() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({
                "is_combat_start": "Yes",
                "is_combat_end": "nope",
                "attack_advantage": 1,
                "location_change": 42,
                "quest_update": true
            }),
            &fields,
        );
        assert_eq!(value["is_combat_start"], true);
        assert_eq!(value["is_combat_end"], false);
        assert_eq!(value["attack_advantage"], true);
        assert_eq!(value["location_change"], "42");
        assert_eq!(value["quest_update"], "true");
    }

    #[test]
    fn test_coerce_record_lists() {
        let fields = decision_fields();
        let value = coerce_types(
            json!({
                "skill_checks": {"skill": "Stealth", "dc": "12"},
                "npc_actions": ["a goblin", {"name": "Orc", "damage_dice": "1d12"}]
            }),
            &fields,
        );
        assert_eq!(value["skill_checks"], json!([{"skill": "Stealth", "dc": 12}]));
        assert_eq!(value["npc_actions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_backfill_nested_records() {
        let fields = decision_fields();
        let value = backfill_records(
            json!({
                "skill_checks": [{"skill": "Athletics", "dc": null}],
                "npc_actions": [{"name": "Wolf"}],
                "inventory_changes": [{"name": "Rope"}]
            }),
            &fields,
        );
        assert_eq!(
            value["skill_checks"][0],
            json!({"skill": "Athletics", "dc": 10, "advantage": false, "disadvantage": false})
        );
        assert_eq!(value["npc_actions"][0]["damage_dice"], "");
        assert_eq!(value["npc_actions"][0]["attack_bonus"], Value::Null);
        assert_eq!(value["inventory_changes"][0]["quantity"], 1);
        assert_eq!(value["inventory_changes"][0]["action"], "add");
    }

    #[test]
    fn test_unecho_schema() {
        let fields = decision_fields();
        let echoed = json!({
            "narration_context": {"type": "string", "description": "what happens"},
            "xp_gained": {"type": "integer", "default": 25},
            "available_actions": {"type": "array", "items": {"type": "string"}},
            "gold_change": 3
        });
        let value = unecho_schema(echoed, &fields);
        assert_eq!(value["narration_context"], "");
        assert_eq!(value["xp_gained"], 25);
        assert_eq!(value["available_actions"], json!(["Look around", "Talk", "Attack", "Use item"]));
        assert_eq!(value["gold_change"], 3);
    }

    #[test]
    fn test_unecho_properties_wrapper() {
        let fields = decision_fields();
        let echoed = json!({
            "title": "MechanicsDecision",
            "type": "object",
            "properties": {"xp_gained": {"type": "integer"}}
        });
        let decision: MechanicsDecision = validate(unecho_schema(echoed, &fields)).unwrap();
        assert_eq!(decision, MechanicsDecision::default());
    }

    #[test]
    fn test_ingest_well_formed_equals_defaults_plus_fields() {
        let raw = r#"{"narration_context": "You sneak past.", "xp_gained": 20,
            "skill_checks": [{"skill": "Stealth", "dc": 14}]}"#;
        let decision: MechanicsDecision = ingest(raw).unwrap();

        let mut expected = MechanicsDecision {
            narration_context: "You sneak past.".to_string(),
            xp_gained: 20,
            ..Default::default()
        };
        expected.skill_checks.push(crate::decision::SkillCheckRequest {
            skill: "Stealth".to_string(),
            dc: 14,
            ..Default::default()
        });
        assert_eq!(decision, expected);
    }

    #[test]
    fn test_ingest_fenced_and_broken() {
        let raw = "```json\n{\"narration_context\": \"Rain falls.\nThunder.\", \"gold_change\": \"5\",}\n```";
        let decision: MechanicsDecision = ingest(raw).unwrap();
        assert_eq!(decision.narration_context, "Rain falls.\nThunder.");
        assert_eq!(decision.gold_change, 5);
    }

    #[test]
    fn test_ingest_parse_failure_names_schema() {
        let err = ingest::<MechanicsDecision>("I cannot do that, Dave.").unwrap_err();
        assert!(err.is_parse_failure());
        assert_eq!(err.schema(), "MechanicsDecision");
        assert!(err.to_string().starts_with("MechanicsDecision"));
    }

    #[test]
    fn test_ingest_validation_failure() {
        let err = ingest::<MechanicsDecision>("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, IngestError::ValidationFailed { schema: "MechanicsDecision", .. }));

        let err = ingest::<MechanicsDecision>(r#"{"narration_context": {"text": "hi"}}"#).unwrap_err();
        assert!(matches!(err, IngestError::ValidationFailed { .. }));
    }

    #[test]
    fn test_ingest_single_element_array() {
        let decision: MechanicsDecision = ingest(r#"[{"xp_gained": 3}]"#).unwrap();
        assert_eq!(decision.xp_gained, 3);
    }

    #[test]
    fn test_ingest_nullable_attack_bonus() {
        let raw = r#"{"npc_actions": [{"name": "Bandit", "damage_dice": "1d6", "attack_bonus": "4"},
                                     {"name": "Rat", "damage_dice": "1d2", "attack_bonus": null}]}"#;
        let decision: MechanicsDecision = ingest(raw).unwrap();
        assert_eq!(
            decision.npc_actions,
            vec![
                NpcAction {
                    name: "Bandit".to_string(),
                    damage_dice: "1d6".to_string(),
                    attack_bonus: Some(4),
                    ..Default::default()
                },
                NpcAction {
                    name: "Rat".to_string(),
                    damage_dice: "1d2".to_string(),
                    ..Default::default()
                },
            ]
        );
    }

    #[test]
    fn test_ingest_other_schemas() {
        let proposal: CharacterProposal = ingest(
            r#"{"name": "Mira", "char_class": "Wizard", "intelligence": "17",
                "proficient_skills": "Arcana, History", "starting_inventory": [{"name": "Staff"}]}"#,
        )
        .unwrap();
        assert_eq!(proposal.intelligence, 17);
        assert_eq!(proposal.strength, 10);
        assert_eq!(proposal.proficient_skills, vec!["Arcana", "History"]);
        assert_eq!(proposal.starting_inventory[0].quantity, 1);

        let mission: MissionProposal = ingest(r#"{"quest_title": "The Drowned Bell"}"#).unwrap();
        assert_eq!(mission.quest_title, "The Drowned Bell");
        assert!(mission.opening_scene.is_empty());
    }
}
