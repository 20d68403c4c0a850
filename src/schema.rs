//! Declarative field schemas
//!
//! A [`Schema`] describes the expected fields of a configuration object or a
//! handler's input: their type, constraints, defaults and descriptions. The same
//! validate/default rules apply to both. Constraint checks run through
//! `jsonschema` against each field's rendered JSON Schema.

use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::error::{FieldViolation, Result, SchemaViolation};

/// Semantic type of a field, with its constraints
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String {
        min_length: Option<usize>,
        max_length: Option<usize>,
    },
    Number {
        minimum: Option<f64>,
        maximum: Option<f64>,
        integer: bool,
    },
    Boolean,
    Enum(Vec<&'static str>),
}

/// A single named field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub description: &'static str,
}

impl FieldSpec {
    fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: true,
            default: None,
            description: "",
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(
            name,
            FieldType::String {
                min_length: None,
                max_length: None,
            },
        )
    }

    pub fn number(name: &'static str) -> Self {
        Self::new(
            name,
            FieldType::Number {
                minimum: None,
                maximum: None,
                integer: false,
            },
        )
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(
            name,
            FieldType::Number {
                minimum: None,
                maximum: None,
                integer: true,
            },
        )
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn enumeration(name: &'static str, values: &[&'static str]) -> Self {
        Self::new(name, FieldType::Enum(values.to_vec()))
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Mark the field optional: absent input is not an error
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the field is absent after merging
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn min(mut self, value: f64) -> Self {
        if let FieldType::Number { minimum, .. } = &mut self.field_type {
            *minimum = Some(value);
        }
        self
    }

    pub fn max(mut self, value: f64) -> Self {
        if let FieldType::Number { maximum, .. } = &mut self.field_type {
            *maximum = Some(value);
        }
        self
    }

    pub fn min_length(mut self, value: usize) -> Self {
        if let FieldType::String { min_length, .. } = &mut self.field_type {
            *min_length = Some(value);
        }
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        if let FieldType::String { max_length, .. } = &mut self.field_type {
            *max_length = Some(value);
        }
        self
    }

    /// JSON Schema for this field's value alone
    pub fn json_schema(&self) -> Value {
        let mut prop = Map::new();
        match &self.field_type {
            FieldType::String {
                min_length,
                max_length,
            } => {
                prop.insert("type".into(), json!("string"));
                if let Some(min) = min_length {
                    prop.insert("minLength".into(), json!(min));
                }
                if let Some(max) = max_length {
                    prop.insert("maxLength".into(), json!(max));
                }
            }
            FieldType::Number {
                minimum,
                maximum,
                integer,
            } => {
                let ty = if *integer { "integer" } else { "number" };
                prop.insert("type".into(), json!(ty));
                if let Some(min) = minimum {
                    prop.insert("minimum".into(), json!(min));
                }
                if let Some(max) = maximum {
                    prop.insert("maximum".into(), json!(max));
                }
            }
            FieldType::Boolean => {
                prop.insert("type".into(), json!("boolean"));
            }
            FieldType::Enum(values) => {
                prop.insert("type".into(), json!("string"));
                prop.insert("enum".into(), json!(values));
            }
        }
        if !self.description.is_empty() {
            prop.insert("description".into(), json!(self.description));
        }
        if let Some(default) = &self.default {
            prop.insert("default".into(), default.clone());
        }
        Value::Object(prop)
    }

    /// Convert a raw string (environment or CLI) into the field's type.
    ///
    /// Strings that do not parse are kept as strings so validation rejects them.
    pub fn coerce(&self, raw: &str) -> Value {
        match &self.field_type {
            FieldType::Number { .. } => {
                if let Ok(i) = raw.trim().parse::<i64>() {
                    json!(i)
                } else if let Ok(f) = raw.trim().parse::<f64>() {
                    json!(f)
                } else {
                    Value::String(raw.to_string())
                }
            }
            FieldType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            _ => Value::String(raw.to_string()),
        }
    }

    /// Integral floats become integers for integer fields
    fn normalize(&self, value: &Value) -> Value {
        match (&self.field_type, value.as_f64()) {
            (FieldType::Number { integer: true, .. }, Some(n))
                if !(value.is_i64() || value.is_u64()) =>
            {
                json!(n as i64)
            }
            _ => value.clone(),
        }
    }
}

/// Compiled per-field validators, built on first use
#[derive(Default)]
struct CompiledFields(OnceCell<Vec<Validator>>);

impl fmt::Debug for CompiledFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFields")
            .field("compiled", &self.0.get().is_some())
            .finish()
    }
}

/// An ordered set of fields
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    compiled: Arc<CompiledFields>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self.compiled = Arc::default();
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate an input object, applying defaults.
    ///
    /// Unknown fields are dropped and a `null` input is treated as an empty
    /// object. Present values are checked against each field's JSON Schema.
    /// All violations are collected before failing, in field order.
    pub fn validate(&self, input: &Value) -> std::result::Result<Params, SchemaViolation> {
        let empty = Map::new();
        let object = match input {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(SchemaViolation::single("(input)", "must be an object")),
        };

        let validators = self.validators()?;
        let mut output = Map::new();
        let mut violations = Vec::new();

        for (field, validator) in self.fields.iter().zip(validators) {
            match object.get(field.name) {
                Some(value) if !value.is_null() => {
                    match validator.iter_errors(value).next() {
                        Some(error) => violations.push(FieldViolation {
                            field: field.name.to_string(),
                            message: error.to_string(),
                        }),
                        None => {
                            output.insert(field.name.to_string(), field.normalize(value));
                        }
                    }
                }
                _ => {
                    if let Some(default) = &field.default {
                        output.insert(field.name.to_string(), default.clone());
                    } else if field.required {
                        violations.push(FieldViolation {
                            field: field.name.to_string(),
                            message: "is required".to_string(),
                        });
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(Params(output))
        } else {
            Err(SchemaViolation { violations })
        }
    }

    fn validators(&self) -> std::result::Result<&[Validator], SchemaViolation> {
        self.compiled
            .0
            .get_or_try_init(|| {
                self.fields
                    .iter()
                    .map(|field| {
                        jsonschema::options()
                            .with_draft(Draft::Draft202012)
                            .build(&field.json_schema())
                            .map_err(|err| {
                                SchemaViolation::single(field.name, format!("invalid schema: {err}"))
                            })
                    })
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// Render as a JSON Schema object for tool listings and metadata
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.to_string(), field.json_schema());
            if field.required && field.default.is_none() {
                required.push(field.name);
            }
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }
}

/// Validated input handed to a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Decode into a handler's typed argument struct
    pub fn parse<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn news_schema() -> Schema {
        Schema::new()
            .field(FieldSpec::string("query").optional())
            .field(FieldSpec::enumeration("category", &["business", "science"]).optional())
            .field(
                FieldSpec::integer("pageSize")
                    .optional()
                    .default_value(json!(10))
                    .min(1.0)
                    .max(100.0),
            )
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct NewsArgs {
        query: Option<String>,
        page_size: u64,
    }

    #[test]
    fn test_defaults_applied() {
        let params = news_schema().validate(&json!({})).unwrap();
        assert_eq!(params.get("pageSize"), Some(&json!(10)));
        assert!(params.get("query").is_none());
    }

    #[test]
    fn test_null_input_is_empty_object() {
        let params = news_schema().validate(&Value::Null).unwrap();
        assert_eq!(params.get("pageSize"), Some(&json!(10)));
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let params = news_schema()
            .validate(&json!({"query": "rust", "bogus": 1}))
            .unwrap();
        assert_eq!(params.get("query"), Some(&json!("rust")));
        assert!(params.get("bogus").is_none());
    }

    #[test]
    fn test_parse_typed_args() {
        let args: NewsArgs = news_schema()
            .validate(&json!({"query": "rust"}))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(args.query.as_deref(), Some("rust"));
        assert_eq!(args.page_size, 10);
    }

    #[test]
    fn test_range_violation() {
        let err = news_schema().validate(&json!({"pageSize": 0})).unwrap_err();
        assert_eq!(err.fields(), vec!["pageSize"]);
        assert!(err.to_string().contains("minimum"));
    }

    #[test]
    fn test_collects_all_violations() {
        let err = news_schema()
            .validate(&json!({"query": 5, "category": "weather", "pageSize": 101}))
            .unwrap_err();
        assert_eq!(err.fields(), vec!["query", "category", "pageSize"]);
    }

    #[test]
    fn test_integer_normalization() {
        let args: NewsArgs = news_schema()
            .validate(&json!({"pageSize": 5.0}))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(args.page_size, 5);

        let err = news_schema().validate(&json!({"pageSize": 5.5})).unwrap_err();
        assert_eq!(err.fields(), vec!["pageSize"]);
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_required_field_missing() {
        let schema = Schema::new().field(FieldSpec::string("text").min_length(10));
        let err = schema.validate(&json!({})).unwrap_err();
        assert!(err.to_string().contains("text is required"));

        let err = schema.validate(&json!({"text": "short"})).unwrap_err();
        assert_eq!(err.fields(), vec!["text"]);
    }

    #[test]
    fn test_validators_rebuilt_after_field_added() {
        let schema = Schema::new().field(FieldSpec::string("text"));
        assert!(schema.validate(&json!({"text": "hi"})).is_ok());

        let schema = schema.field(FieldSpec::boolean("loud"));
        let err = schema.validate(&json!({"text": "hi", "loud": "yes"})).unwrap_err();
        assert_eq!(err.fields(), vec!["loud"]);
    }

    #[test]
    fn test_non_object_input() {
        let err = news_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err.fields(), vec!["(input)"]);
    }

    #[test]
    fn test_coerce() {
        let schema = news_schema();
        let page = schema.get("pageSize").unwrap();
        assert_eq!(page.coerce("25"), json!(25));
        assert_eq!(page.coerce("abc"), json!("abc"));

        let flag = FieldSpec::boolean("formal");
        assert_eq!(flag.coerce("TRUE"), json!(true));
        assert_eq!(flag.coerce("yes"), json!("yes"));
    }

    #[test]
    fn test_json_schema_output() {
        let schema = Schema::new()
            .field(FieldSpec::string("text").min_length(10).describe("Text"))
            .field(
                FieldSpec::enumeration("style", &["brief", "detailed"])
                    .optional()
                    .default_value(json!("brief")),
            );
        let json = schema.to_json_schema();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["text"]["minLength"], 10);
        assert_eq!(json["properties"]["style"]["enum"][1], "detailed");
        assert_eq!(json["required"], json!(["text"]));
    }
}
