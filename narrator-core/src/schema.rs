//! Declarative field contracts for structured model output.
//!
//! A [`Schema`] lists every field a structured response must carry: its
//! wire name, kind, default and a natural-language hint. The prompt builder
//! renders it for the model and the ingestion pipeline uses it to repair
//! what comes back. Implementations are normally derived:
//!
//! ```ignore
//! #[derive(Schema, Serialize, Deserialize, Default)]
//! struct SkillCheckRequest {
//!     /// Skill name, e.g. "Stealth"
//!     skill: String,
//!     /// Difficulty class
//!     dc: i32,
//! }
//! ```

use serde_json::{Map, Value};
use std::fmt;

/// The declared type of one field.
#[derive(Clone, Copy)]
pub enum FieldKind {
    String,
    /// An `i32`; coercion clamps anything wider into range.
    Integer,
    Float,
    Boolean,
    StringList,
    /// A list of records, described by the element schema's fields.
    RecordList(fn() -> Vec<FieldSpec>),
}

impl FieldKind {
    /// JSON type name shown to the model.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList => "array of strings",
            FieldKind::RecordList(_) => "array of objects",
        }
    }

    /// The value `null` is replaced with.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldKind::String => Value::String(String::new()),
            FieldKind::Integer => Value::from(0),
            FieldKind::Float => Value::from(0.0),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::StringList | FieldKind::RecordList(_) => Value::Array(Vec::new()),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::StringList | FieldKind::RecordList(_))
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::RecordList(fields) => f
                .debug_tuple("RecordList")
                .field(&fields().iter().map(|s| s.name).collect::<Vec<_>>())
                .finish(),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: Value,
    pub hint: &'static str,
    pub nullable: bool,
}

impl FieldSpec {
    /// The default, or the kind's zero value when there is none.
    pub fn default_or_zero(&self) -> Value {
        if self.default.is_null() && !self.nullable {
            self.kind.zero_value()
        } else {
            self.default.clone()
        }
    }
}

/// A record type the model can be asked to produce.
pub trait Schema {
    fn schema_name() -> &'static str;
    fn fields() -> Vec<FieldSpec>;
}

fn describe(spec: &FieldSpec) -> String {
    let mut out = spec.kind.type_name().to_string();
    if let FieldKind::RecordList(sub) = spec.kind {
        let names: Vec<String> = sub()
            .iter()
            .map(|s| format!("{}: {}", s.name, s.kind.type_name()))
            .collect();
        out.push_str(&format!(" {{{}}}", names.join(", ")));
    }
    let shows_default = match &spec.default {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        _ => true,
    };
    if shows_default {
        out.push_str(&format!(" (default: {})", spec.default));
    }
    if spec.nullable {
        out.push_str(", may be null");
    }
    if !spec.hint.is_empty() {
        out.push_str(". ");
        out.push_str(spec.hint);
    }
    out
}

/// Field-by-field description of `S`, as a JSON object in declaration order.
pub fn schema_hint<S: Schema>() -> String {
    let lines: Vec<String> = S::fields()
        .iter()
        .map(|spec| {
            format!(
                "  {}: {}",
                Value::String(spec.name.to_string()),
                Value::String(describe(spec))
            )
        })
        .collect();
    format!("{{\n{}\n}}", lines.join(",\n"))
}

/// A JSON object holding every field's default.
pub fn example<S: Schema>() -> Value {
    let map: Map<String, Value> = S::fields()
        .into_iter()
        .map(|spec| (spec.name.to_string(), spec.default_or_zero()))
        .collect();
    Value::Object(map)
}

/// Append the JSON-only instruction block for `S` to a prompt.
pub fn structured_prompt<S: Schema>(prompt: &str) -> String {
    format!(
        "{prompt}\n\nRESPOND WITH ONLY VALID JSON matching this structure:\n{}\nOutput ONLY the JSON object.",
        schema_hint::<S>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize, Schema)]
    struct Loot {
        /// What it is called
        name: String,
        quantity: i32,
    }

    #[derive(Debug, Serialize, Deserialize, Schema)]
    #[schema(name = "Treasure")]
    struct Chest {
        /// Who left it here
        owner: String,
        #[serde(rename = "gp")]
        gold: i32,
        weight: f32,
        locked: bool,
        tags: Vec<String>,
        contents: Vec<Loot>,
        trap: Option<String>,
    }

    impl Default for Chest {
        fn default() -> Self {
            Self {
                owner: String::new(),
                gold: 25,
                weight: 0.0,
                locked: true,
                tags: Vec::new(),
                contents: Vec::new(),
                trap: None,
            }
        }
    }

    #[test]
    fn test_derived_fields() {
        assert_eq!(Chest::schema_name(), "Treasure");
        let fields = Chest::fields();
        let names: Vec<_> = fields.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            ["owner", "gp", "weight", "locked", "tags", "contents", "trap"]
        );
        assert_eq!(fields[0].hint, "Who left it here");
        assert_eq!(fields[1].default, Value::from(25));
        assert_eq!(fields[3].default, Value::Bool(true));
        assert!(matches!(fields[5].kind, FieldKind::RecordList(_)));
        assert!(fields[6].nullable);
        assert!(matches!(fields[6].kind, FieldKind::String));
    }

    #[test]
    fn test_record_list_fields() {
        let fields = Chest::fields();
        let FieldKind::RecordList(sub) = fields[5].kind else {
            panic!("contents should be a record list");
        };
        let sub = sub();
        assert_eq!(sub[0].name, "name");
        assert_eq!(sub[1].kind.type_name(), "integer");
    }

    #[test]
    fn test_example_uses_defaults() {
        let ex = example::<Chest>();
        assert_eq!(ex["gp"], 25);
        assert_eq!(ex["locked"], true);
        assert_eq!(ex["tags"], Value::Array(vec![]));
        assert_eq!(ex["trap"], Value::Null);
        assert_eq!(Loot::schema_name(), "Loot");
    }

    #[test]
    fn test_schema_hint_shape() {
        let hint = schema_hint::<Chest>();
        let parsed: Value = serde_json::from_str(&hint).unwrap();
        assert_eq!(parsed["gp"], "integer (default: 25)");
        assert_eq!(parsed["owner"], "string. Who left it here");
        assert!(parsed["contents"]
            .as_str()
            .unwrap()
            .starts_with("array of objects {name: string, quantity: integer}"));
        assert!(hint.find("owner").unwrap() < hint.find("trap").unwrap());
    }

    #[test]
    fn test_structured_prompt() {
        let prompt = structured_prompt::<Loot>("Describe the loot.");
        assert!(prompt.starts_with("Describe the loot.\n\nRESPOND WITH ONLY VALID JSON"));
        assert!(prompt.ends_with("Output ONLY the JSON object."));
    }
}
