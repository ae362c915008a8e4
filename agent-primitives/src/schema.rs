//! Parameter specifications and argument coercion.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result, SchemaError, SchemaResult};
use crate::validate_name;

/// Closed set of value kinds a parameter may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Finite 64-bit float.
    Float,
    /// `true` / `false`.
    Boolean,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamType {
    /// Returns the canonical tag for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "float" | "number" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "array" | "list" => Ok(Self::Array),
            "object" | "dict" => Ok(Self::Object),
            _ => Err(Error::UnknownParamType { tag: tag.to_owned() }),
        }
    }
}

/// Declares a single named parameter of a tool or capability.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterSpec {
    name: String,
    param_type: ParamType,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
}

impl ParameterSpec {
    /// Creates an optional parameter with no default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if the name is empty or contains
    /// whitespace.
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Result<Self> {
        let name = name.into();
        validate_name("parameter", &name)?;
        Ok(Self {
            name,
            param_type,
            required: false,
            default: None,
            description: String::new(),
        })
    }

    /// Marks the parameter as required or optional.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the default value, coercing it to the declared type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDefault`] when the value cannot be coerced.
    pub fn with_default(mut self, default: Value) -> Result<Self> {
        if default.is_null() {
            self.default = None;
            return Ok(self);
        }
        let coerced = coerce(&self.name, self.param_type, &default).map_err(|source| {
            Error::InvalidDefault {
                parameter: self.name.clone(),
                source,
            }
        })?;
        self.default = Some(coerced);
        Ok(self)
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    /// Returns `true` when callers must supply the parameter.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the coerced default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Validates one argument against its spec.
///
/// `Null` is treated the same as an absent value. Returns `Ok(None)` when the
/// parameter is optional, absent, and has no default, meaning the argument
/// is omitted from the call.
///
/// # Errors
///
/// Returns [`SchemaError::MissingRequiredParameter`] or
/// [`SchemaError::TypeMismatch`].
pub fn validate_and_coerce(spec: &ParameterSpec, raw: Option<&Value>) -> SchemaResult<Option<Value>> {
    match raw.filter(|value| !value.is_null()) {
        None if spec.required => Err(SchemaError::MissingRequiredParameter {
            parameter: spec.name.clone(),
        }),
        None => Ok(spec.default.clone()),
        Some(value) => coerce(&spec.name, spec.param_type, value).map(Some),
    }
}

fn coerce(parameter: &str, expected: ParamType, value: &Value) -> SchemaResult<Value> {
    let coerced = match expected {
        ParamType::String => coerce_string(value),
        ParamType::Integer => coerce_integer(value),
        ParamType::Float => coerce_float(value),
        ParamType::Boolean => coerce_boolean(value),
        ParamType::Array => value.is_array().then(|| value.clone()),
        ParamType::Object => value.is_object().then(|| value.clone()),
    };

    coerced.ok_or_else(|| SchemaError::TypeMismatch {
        parameter: parameter.to_owned(),
        expected,
        actual: describe(value),
    })
}

fn coerce_string(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) => Some(value.clone()),
        Value::Number(number) => Some(Value::String(number.to_string())),
        Value::Bool(flag) => Some(Value::String(flag.to_string())),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(Value::from(int));
            }
            let float = number.as_f64()?;
            let in_range = float >= i64::MIN as f64 && float <= i64::MAX as f64;
            (float.fract() == 0.0 && in_range).then(|| Value::from(float as i64))
        }
        Value::String(text) => text.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    let float = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Number::from_f64(float).map(Value::Number)
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    let kind = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    match value {
        Value::String(text) => format!("{kind} {text:?}"),
        Value::Number(number) => format!("{kind} {number}"),
        _ => kind.to_owned(),
    }
}

/// Coerced arguments in declared parameter order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolArguments {
    entries: Vec<(String, Value)>,
}

impl ToolArguments {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an argument. Later values for the same name replace earlier ones.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Returns the value supplied for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    /// Returns a string argument.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns an integer argument.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Returns a float argument.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Returns a boolean argument.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Iterates arguments in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the argument names in declared order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no arguments are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts the arguments into a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.entries.iter().cloned().collect();
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, param_type: ParamType) -> ParameterSpec {
        ParameterSpec::new(name, param_type).expect("spec")
    }

    #[test]
    fn parses_type_aliases() {
        assert_eq!("int".parse::<ParamType>().unwrap(), ParamType::Integer);
        assert_eq!("Boolean".parse::<ParamType>().unwrap(), ParamType::Boolean);
        assert_eq!("str".parse::<ParamType>().unwrap(), ParamType::String);
        let err = "datetime".parse::<ParamType>().expect_err("unknown tag");
        assert!(matches!(err, Error::UnknownParamType { tag } if tag == "datetime"));
    }

    #[test]
    fn missing_required_fails() {
        let topic = spec("topic", ParamType::String).required(true);
        let err = validate_and_coerce(&topic, None).expect_err("required");
        assert_eq!(
            err,
            SchemaError::MissingRequiredParameter {
                parameter: "topic".into()
            }
        );

        let err = validate_and_coerce(&topic, Some(&Value::Null)).expect_err("null is absent");
        assert!(matches!(err, SchemaError::MissingRequiredParameter { .. }));
    }

    #[test]
    fn absent_optional_uses_default_or_omits() {
        let max = spec("max_results", ParamType::Integer)
            .with_default(json!(5))
            .unwrap();
        assert_eq!(validate_and_coerce(&max, None).unwrap(), Some(json!(5)));

        let note = spec("note", ParamType::String);
        assert_eq!(validate_and_coerce(&note, None).unwrap(), None);
    }

    #[test]
    fn coerces_friendly_values() {
        let int = spec("n", ParamType::Integer);
        assert_eq!(validate_and_coerce(&int, Some(&json!("42"))).unwrap(), Some(json!(42)));
        assert_eq!(validate_and_coerce(&int, Some(&json!(7.0))).unwrap(), Some(json!(7)));

        let flag = spec("flag", ParamType::Boolean);
        assert_eq!(validate_and_coerce(&flag, Some(&json!("yes"))).unwrap(), Some(json!(true)));
        assert_eq!(validate_and_coerce(&flag, Some(&json!(0))).unwrap(), Some(json!(false)));

        let text = spec("text", ParamType::String);
        assert_eq!(validate_and_coerce(&text, Some(&json!(3))).unwrap(), Some(json!("3")));

        let ratio = spec("ratio", ParamType::Float);
        assert_eq!(validate_and_coerce(&ratio, Some(&json!("0.5"))).unwrap(), Some(json!(0.5)));
    }

    #[test]
    fn rejects_uncoercible_values() {
        let int = spec("max_results", ParamType::Integer);
        let err = validate_and_coerce(&int, Some(&json!("five"))).expect_err("mismatch");
        assert!(matches!(
            err,
            SchemaError::TypeMismatch { ref parameter, expected: ParamType::Integer, .. }
                if parameter == "max_results"
        ));

        let int_frac = validate_and_coerce(&int, Some(&json!(2.5)));
        assert!(int_frac.is_err());

        let text = spec("code", ParamType::String);
        assert!(validate_and_coerce(&text, Some(&json!(["a"]))).is_err());

        let flag = spec("flag", ParamType::Boolean);
        assert!(validate_and_coerce(&flag, Some(&json!("maybe"))).is_err());
    }

    #[test]
    fn invalid_default_is_rejected() {
        let err = spec("timeout", ParamType::Integer)
            .with_default(json!("soon"))
            .expect_err("bad default");
        assert!(matches!(err, Error::InvalidDefault { parameter, .. } if parameter == "timeout"));
    }

    #[test]
    fn arguments_preserve_order() {
        let mut args = ToolArguments::new();
        args.push("topic", json!("rust"));
        args.push("max_results", json!(5));
        args.push("topic", json!("ownership"));

        assert_eq!(args.names(), ["topic", "max_results"]);
        assert_eq!(args.get_str("topic"), Some("ownership"));
        assert_eq!(args.get_i64("max_results"), Some(5));
        assert_eq!(args.to_json(), json!({"topic": "ownership", "max_results": 5}));
    }
}
