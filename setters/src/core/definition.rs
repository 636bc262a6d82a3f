//! Setter definitions and value validation.
//!
//! A definition's `type`, `enum` and `pattern` are evaluated as a JSON schema
//! fragment against the typed form of the value, so `"5"` for an integer setter
//! is checked as the number `5`.

use std::fmt;

use jsonschema::validator_for;
use serde_json::{Map, Number, Value, json};

use crate::error::{Result, SetterError};

/// Declared type of a setter (the OpenAPI `type` keyword).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl SetterType {
    pub fn as_str(self) -> &'static str {
        match self {
            SetterType::String => "string",
            SetterType::Integer => "integer",
            SetterType::Number => "number",
            SetterType::Boolean => "boolean",
            SetterType::Array => "array",
        }
    }

    /// Parse a type name as written in a schema file or on the command line.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" => Some(SetterType::String),
            "integer" | "int" => Some(SetterType::Integer),
            "number" => Some(SetterType::Number),
            "boolean" | "bool" => Some(SetterType::Boolean),
            "array" => Some(SetterType::Array),
            _ => None,
        }
    }

    /// Scalar types are written bare in documents; strings may need quoting.
    pub fn is_bare_scalar(self) -> bool {
        matches!(
            self,
            SetterType::Integer | SetterType::Number | SetterType::Boolean
        )
    }
}

impl fmt::Display for SetterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current value of a setter: a single scalar or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetterValue {
    Scalar(String),
    List(Vec<String>),
}

impl SetterValue {
    /// Combine a scalar and a list into one value.
    ///
    /// A non-empty scalar together with a non-empty list is a `Conflict`.
    pub fn from_parts(
        name: &str,
        value: Option<String>,
        list_values: Option<Vec<String>>,
    ) -> Result<Self> {
        match (value, list_values) {
            (Some(value), Some(list)) if !value.is_empty() && !list.is_empty() => {
                Err(SetterError::Conflict {
                    name: name.to_string(),
                })
            }
            (_, Some(list)) if !list.is_empty() => Ok(SetterValue::List(list)),
            (Some(value), _) => Ok(SetterValue::Scalar(value)),
            (None, Some(list)) => Ok(SetterValue::List(list)),
            (None, None) => Ok(SetterValue::Scalar(String::new())),
        }
    }
}

impl fmt::Display for SetterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetterValue::Scalar(value) => f.write_str(value),
            SetterValue::List(values) => write!(f, "[{}]", values.join(", ")),
        }
    }
}

/// Optional `enum` / `pattern` constraints on a setter value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    pub allowed: Vec<String>,
    pub pattern: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty() && self.pattern.is_none()
    }
}

/// Schema keys a definition carries that this crate does not interpret.
///
/// They are written back unchanged when the definition is re-rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreservedKeys {
    pub definition: serde_yaml::Mapping,
    pub cli: serde_yaml::Mapping,
    pub setter: serde_yaml::Mapping,
}

/// A named, typed parameter stored in a package's schema file.
#[derive(Debug, Clone, PartialEq)]
pub struct SetterDefinition {
    pub name: String,
    pub value: SetterValue,
    pub setter_type: Option<SetterType>,
    pub description: String,
    pub constraints: Option<Constraints>,
    pub set_by: String,
    pub preserved: PreservedKeys,
}

impl SetterDefinition {
    pub fn new(name: impl Into<String>, value: SetterValue) -> Self {
        Self {
            name: name.into(),
            value,
            setter_type: None,
            description: String::new(),
            constraints: None,
            set_by: String::new(),
            preserved: PreservedKeys::default(),
        }
    }

    /// Replace the value and, when given, the description and `setBy`.
    ///
    /// Type, constraints and preserved keys stay as they were.
    pub fn updated(
        &self,
        value: SetterValue,
        description: Option<&str>,
        set_by: Option<&str>,
    ) -> Self {
        let mut next = self.clone();
        next.value = value;
        if let Some(description) = description {
            next.description = description.to_string();
        }
        if let Some(set_by) = set_by {
            next.set_by = set_by.to_string();
        }
        next
    }

    /// Check the value (or every list value) against type and constraints.
    pub fn validate(&self) -> Result<()> {
        match (&self.value, self.setter_type) {
            (SetterValue::Scalar(value), Some(SetterType::Array)) => Err(self.invalid(
                value,
                "setter is of type array and expects list values".to_string(),
            )),
            (SetterValue::List(values), Some(ty)) if ty != SetterType::Array => Err(self.invalid(
                &values.join(","),
                format!("setter is of type {ty} and expects a single value"),
            )),
            (SetterValue::Scalar(value), ty) => self.validate_item(value, ty),
            (SetterValue::List(values), _) => values
                .iter()
                .try_for_each(|value| self.validate_item(value, None)),
        }
    }

    fn validate_item(&self, value: &str, item_type: Option<SetterType>) -> Result<()> {
        let typed = typed_json(value, item_type)
            .ok_or_else(|| self.invalid(value, format!("not a valid {}", type_label(item_type))))?;

        let mut schema = Map::new();
        if let Some(ty) = item_type {
            schema.insert("type".to_string(), json!(ty.as_str()));
        }
        if let Some(constraints) = &self.constraints
            && !constraints.allowed.is_empty()
        {
            let allowed = constraints
                .allowed
                .iter()
                .map(|entry| typed_json(entry, item_type).unwrap_or_else(|| json!(entry)))
                .collect();
            schema.insert("enum".to_string(), Value::Array(allowed));
        }
        self.check_schema(value, &Value::Object(schema), &typed)?;

        if let Some(pattern) = self.constraints.as_ref().and_then(|c| c.pattern.as_ref()) {
            let schema = json!({ "type": "string", "pattern": pattern });
            self.check_schema(value, &schema, &json!(value))?;
        }
        Ok(())
    }

    fn check_schema(&self, value: &str, schema: &Value, instance: &Value) -> Result<()> {
        let compiled = validator_for(schema)
            .map_err(|err| self.invalid(value, format!("invalid constraint: {err}")))?;
        let messages: Vec<String> = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            return Ok(());
        }
        Err(self.invalid(value, messages.join("; ")))
    }

    fn invalid(&self, value: &str, reason: String) -> SetterError {
        SetterError::Validation {
            name: self.name.clone(),
            value: value.to_string(),
            reason,
        }
    }
}

fn type_label(ty: Option<SetterType>) -> &'static str {
    ty.map(SetterType::as_str).unwrap_or("string")
}

/// Convert a raw setter value into the JSON value its type implies.
fn typed_json(raw: &str, ty: Option<SetterType>) -> Option<Value> {
    match ty {
        Some(SetterType::Integer) => raw.trim().parse::<i64>().ok().map(Value::from),
        Some(SetterType::Number) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        Some(SetterType::Boolean) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Some(SetterType::String) | Some(SetterType::Array) | None => {
            Some(Value::String(raw.to_string()))
        }
    }
}
