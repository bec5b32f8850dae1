//! Typed invocation parameters.
//!
//! A [`Parameter`] describes one named argument of a discovered endpoint. The
//! set of parameter kinds is closed; each kind has a matching [`ParamValue`]
//! variant so that defaults, user input and request payloads are all handled
//! through the same tagged value instead of untyped JSON.
//!
//! Parameter lists travel inside endpoint metadata as a JSON array. The kind
//! is written as its integer code and a duration as a nanosecond count, which
//! keeps the format readable by services that produce the list themselves.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::warn;

/// The closed set of value kinds a parameter can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    Duration,
}

impl ParamKind {
    /// Every kind in code order.
    pub const ALL: [ParamKind; 5] = [
        ParamKind::String,
        ParamKind::Integer,
        ParamKind::Float,
        ParamKind::Boolean,
        ParamKind::Duration,
    ];

    /// Integer code used in the serialized parameter list.
    pub fn code(self) -> i64 {
        match self {
            ParamKind::String => 0,
            ParamKind::Integer => 1,
            ParamKind::Float => 2,
            ParamKind::Boolean => 3,
            ParamKind::Duration => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Resolve a kind from its textual name. Both the short and the long
    /// spelling are accepted (`int`/`integer`, `bool`/`boolean`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" => Some(ParamKind::String),
            "int" | "integer" => Some(ParamKind::Integer),
            "float" => Some(ParamKind::Float),
            "bool" | "boolean" => Some(ParamKind::Boolean),
            "duration" => Some(ParamKind::Duration),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "int",
            ParamKind::Float => "float",
            ParamKind::Boolean => "bool",
            ParamKind::Duration => "duration",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while constructing or decoding parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter '{parameter}' declares unknown kind '{kind}'")]
    UnknownKind { parameter: String, kind: String },

    #[error("default value for parameter '{parameter}' is not a valid {kind}")]
    InvalidDefault { parameter: String, kind: ParamKind },

    #[error("invalid {kind} value '{value}': {reason}")]
    InvalidValue { kind: ParamKind, value: String, reason: String },
}

/// A single typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Duration(Duration),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::String(_) => ParamKind::String,
            ParamValue::Integer(_) => ParamKind::Integer,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::Boolean(_) => ParamKind::Boolean,
            ParamValue::Duration(_) => ParamKind::Duration,
        }
    }

    /// The zero value of a kind: empty string, 0, 0.0, false, zero duration.
    pub fn zero(kind: ParamKind) -> Self {
        match kind {
            ParamKind::String => ParamValue::String(String::new()),
            ParamKind::Integer => ParamValue::Integer(0),
            ParamKind::Float => ParamValue::Float(0.0),
            ParamKind::Boolean => ParamValue::Boolean(false),
            ParamKind::Duration => ParamValue::Duration(Duration::ZERO),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == ParamValue::zero(self.kind())
    }

    /// Whether a required parameter holding this value counts as not supplied.
    ///
    /// `false` is a legitimate boolean, so booleans are never missing.
    pub fn is_missing(&self) -> bool {
        !matches!(self, ParamValue::Boolean(_)) && self.is_zero()
    }

    /// Whether the value survives the JSON encoding unchanged.
    fn is_representable(&self) -> bool {
        match self {
            ParamValue::Float(value) => value.is_finite(),
            ParamValue::Duration(value) => u64::try_from(value.as_nanos()).is_ok(),
            _ => true,
        }
    }

    /// JSON form used in request payloads and serialized defaults.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::String(value) => Value::String(value.clone()),
            ParamValue::Integer(value) => Value::Number((*value).into()),
            ParamValue::Float(value) => Number::from_f64(*value).map(Value::Number).unwrap_or(Value::Null),
            ParamValue::Boolean(value) => Value::Bool(*value),
            ParamValue::Duration(value) => {
                Value::Number(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX).into())
            }
        }
    }

    /// Interpret a JSON value as the given kind.
    pub fn from_json(kind: ParamKind, value: &Value) -> Option<Self> {
        match kind {
            ParamKind::String => value.as_str().map(|s| ParamValue::String(s.to_string())),
            ParamKind::Integer => value.as_i64().map(ParamValue::Integer),
            ParamKind::Float => value.as_f64().map(ParamValue::Float),
            ParamKind::Boolean => value.as_bool().map(ParamValue::Boolean),
            ParamKind::Duration => value.as_u64().map(|nanos| ParamValue::Duration(Duration::from_nanos(nanos))),
        }
    }

    /// Parse user input as the given kind.
    ///
    /// Booleans accept `1/t/true` and `0/f/false` in any case, durations use
    /// the human readable form (`90s`, `1m 30s`, `250ms`).
    pub fn parse(kind: ParamKind, raw: &str) -> Result<Self, ParameterError> {
        let invalid = |reason: String| ParameterError::InvalidValue {
            kind,
            value: raw.to_string(),
            reason,
        };
        match kind {
            ParamKind::String => Ok(ParamValue::String(raw.to_string())),
            ParamKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(ParamValue::Integer)
                .map_err(|err| invalid(err.to_string())),
            ParamKind::Float => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(ParamValue::Float(value)),
                Ok(_) => Err(invalid("expected a finite number".to_string())),
                Err(err) => Err(invalid(err.to_string())),
            },
            ParamKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(ParamValue::Boolean(true)),
                "0" | "f" | "false" => Ok(ParamValue::Boolean(false)),
                _ => Err(invalid("expected true or false".to_string())),
            },
            ParamKind::Duration => humantime::parse_duration(raw.trim())
                .map(ParamValue::Duration)
                .map_err(|err| invalid(err.to_string())),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(value) => f.write_str(value),
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::Boolean(value) => write!(f, "{value}"),
            ParamValue::Duration(value) => write!(f, "{}", humantime::format_duration(*value)),
        }
    }
}

/// Construction options for [`Parameter::new`]. Options may be given in any
/// order and combination.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamOption {
    Required,
    Summary(String),
    Default(ParamValue),
}

impl ParamOption {
    pub fn required() -> Self {
        ParamOption::Required
    }

    pub fn summary(text: impl Into<String>) -> Self {
        ParamOption::Summary(text.into())
    }

    pub fn default_value(value: ParamValue) -> Self {
        ParamOption::Default(value)
    }
}

/// One named invocation argument of an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: ParamKind,
    summary: Option<String>,
    required: bool,
    default: Option<ParamValue>,
}

impl Parameter {
    /// Build a parameter, applying `options` in order.
    ///
    /// Fails when a default value does not match `kind`.
    pub fn new(
        name: impl Into<String>,
        kind: ParamKind,
        options: impl IntoIterator<Item = ParamOption>,
    ) -> Result<Self, ParameterError> {
        let mut parameter = Parameter {
            name: name.into(),
            kind,
            summary: None,
            required: false,
            default: None,
        };
        for option in options {
            match option {
                ParamOption::Required => parameter.required = true,
                ParamOption::Summary(text) => parameter.summary = Some(text),
                ParamOption::Default(value) => {
                    if value.kind() != kind || !value.is_representable() {
                        return Err(ParameterError::InvalidDefault {
                            parameter: parameter.name,
                            kind,
                        });
                    }
                    parameter.default = Some(value);
                }
            }
        }
        Ok(parameter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&ParamValue> {
        self.default.as_ref()
    }

    /// The value used when the user supplies nothing: the default, or the
    /// zero value of the kind.
    pub fn initial_value(&self) -> ParamValue {
        self.default.clone().unwrap_or_else(|| ParamValue::zero(self.kind))
    }

    fn to_wire(&self) -> Value {
        let mut object = Map::new();
        object.insert("name".into(), Value::String(self.name.clone()));
        object.insert("kind".into(), Value::Number(self.kind.code().into()));
        if let Some(summary) = &self.summary {
            object.insert("summary".into(), Value::String(summary.clone()));
        }
        object.insert("required".into(), Value::Bool(self.required));
        if let Some(default) = &self.default {
            object.insert("default".into(), default.to_json());
        }
        Value::Object(object)
    }
}

/// Serialized shape of one parameter.
#[derive(Debug, Serialize, Deserialize)]
struct WireParameter {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Kind")]
    kind: WireKind,
    #[serde(default, alias = "Summary")]
    summary: Option<String>,
    #[serde(default, alias = "Required")]
    required: bool,
    #[serde(default, alias = "Default")]
    default: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireKind {
    Code(i64),
    Name(String),
}

impl WireKind {
    fn resolve(&self) -> Option<ParamKind> {
        match self {
            WireKind::Code(code) => ParamKind::from_code(*code),
            WireKind::Name(name) => ParamKind::from_name(name),
        }
    }
}

impl fmt::Display for WireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireKind::Code(code) => write!(f, "{code}"),
            WireKind::Name(name) => f.write_str(name),
        }
    }
}

/// Serialize a parameter list to its JSON text form.
pub fn encode_parameters(parameters: &[Parameter]) -> String {
    Value::Array(parameters.iter().map(Parameter::to_wire).collect()).to_string()
}

/// Decode a serialized parameter list.
///
/// Absent or malformed input (bad JSON, a default that does not match its
/// kind) yields an empty list and a warning. The only error surfaced is a
/// parameter whose kind is not one of the known kinds.
pub fn decode_parameters(raw: Option<&str>) -> Result<Vec<Parameter>, ParameterError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let wire: Vec<WireParameter> = match serde_json::from_str(raw) {
        Ok(wire) => wire,
        Err(err) => {
            warn!("ignoring malformed parameter list: {err}");
            return Ok(Vec::new());
        }
    };

    let mut parameters = Vec::with_capacity(wire.len());
    for entry in wire {
        let Some(kind) = entry.kind.resolve() else {
            return Err(ParameterError::UnknownKind {
                parameter: entry.name,
                kind: entry.kind.to_string(),
            });
        };
        let mut options = Vec::new();
        if entry.required {
            options.push(ParamOption::Required);
        }
        if let Some(summary) = entry.summary {
            options.push(ParamOption::Summary(summary));
        }
        if let Some(default) = entry.default.as_ref() {
            let Some(value) = ParamValue::from_json(kind, default) else {
                warn!(parameter = %entry.name, %kind, "ignoring parameter list with mistyped default");
                return Ok(Vec::new());
            };
            options.push(ParamOption::Default(value));
        }
        match Parameter::new(entry.name, kind, options) {
            Ok(parameter) => parameters.push(parameter),
            Err(err) => {
                warn!("ignoring malformed parameter list: {err}");
                return Ok(Vec::new());
            }
        }
    }
    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Parameter> {
        vec![
            Parameter::new(
                "name",
                ParamKind::String,
                [ParamOption::required(), ParamOption::summary("who to greet")],
            )
            .unwrap(),
            Parameter::new("count", ParamKind::Integer, [ParamOption::default_value(ParamValue::Integer(3))]).unwrap(),
            Parameter::new("ratio", ParamKind::Float, [ParamOption::default_value(ParamValue::Float(0.25))]).unwrap(),
            Parameter::new("loud", ParamKind::Boolean, [ParamOption::default_value(ParamValue::Boolean(true))]).unwrap(),
            Parameter::new(
                "wait",
                ParamKind::Duration,
                [
                    ParamOption::default_value(ParamValue::Duration(Duration::from_millis(1500))),
                    ParamOption::required(),
                ],
            )
            .unwrap(),
        ]
    }

    #[test]
    fn encode_then_decode_preserves_every_field() {
        let parameters = sample();
        let encoded = encode_parameters(&parameters);
        let decoded = decode_parameters(Some(&encoded)).expect("decode");
        assert_eq!(decoded, parameters);
    }

    #[test]
    fn kind_is_written_as_integer_code() {
        let encoded = encode_parameters(&sample()[..1]);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["kind"], Value::from(0));
        assert_eq!(value[0]["required"], Value::Bool(true));
    }

    #[test]
    fn duration_default_is_nanoseconds() {
        let encoded = encode_parameters(&sample()[4..]);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["default"], Value::from(1_500_000_000u64));
    }

    #[test]
    fn decode_accepts_kind_names_and_capitalized_fields() {
        let raw = r#"[{"Name":"id","Kind":"int","Required":true},{"name":"verbose","kind":"boolean"}]"#;
        let decoded = decode_parameters(Some(raw)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].kind(), ParamKind::Integer);
        assert!(decoded[0].is_required());
        assert_eq!(decoded[1].kind(), ParamKind::Boolean);
        assert!(decoded[1].default_value().is_none());
    }

    #[test]
    fn decode_absent_or_malformed_is_empty() {
        assert!(decode_parameters(None).unwrap().is_empty());
        assert!(decode_parameters(Some("{not json")).unwrap().is_empty());
        assert!(decode_parameters(Some(r#"{"name":"x"}"#)).unwrap().is_empty());
        assert!(
            decode_parameters(Some(r#"[{"name":"n","kind":1,"default":"three"}]"#))
                .unwrap()
                .is_empty(),
            "mistyped default drops the list"
        );
    }

    #[test]
    fn decode_unknown_kind_is_an_error() {
        let err = decode_parameters(Some(r#"[{"name":"when","kind":9}]"#)).unwrap_err();
        assert_eq!(
            err,
            ParameterError::UnknownKind {
                parameter: "when".into(),
                kind: "9".into()
            }
        );
        let err = decode_parameters(Some(r#"[{"name":"when","kind":"date"}]"#)).unwrap_err();
        assert!(err.to_string().contains("unknown kind 'date'"), "{err}");
    }

    #[test]
    fn default_must_match_kind() {
        let err = Parameter::new("n", ParamKind::Integer, [ParamOption::default_value(ParamValue::Boolean(true))])
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidDefault { .. }));
        let err = Parameter::new("r", ParamKind::Float, [ParamOption::default_value(ParamValue::Float(f64::NAN))])
            .unwrap_err();
        assert!(matches!(err, ParameterError::InvalidDefault { .. }));
    }

    #[test]
    fn missing_values_follow_kind_zero() {
        assert!(ParamValue::String(String::new()).is_missing());
        assert!(ParamValue::Integer(0).is_missing());
        assert!(ParamValue::Float(0.0).is_missing());
        assert!(ParamValue::Duration(Duration::ZERO).is_missing());
        assert!(!ParamValue::Boolean(false).is_missing());
        assert!(!ParamValue::Integer(-1).is_missing());
    }

    #[test]
    fn parse_user_input() {
        assert_eq!(ParamValue::parse(ParamKind::Integer, " 42").unwrap(), ParamValue::Integer(42));
        assert_eq!(ParamValue::parse(ParamKind::Boolean, "T").unwrap(), ParamValue::Boolean(true));
        assert_eq!(
            ParamValue::parse(ParamKind::Duration, "1m 30s").unwrap(),
            ParamValue::Duration(Duration::from_secs(90))
        );
        assert!(ParamValue::parse(ParamKind::Float, "fast").is_err());
        for non_finite in ["nan", "inf", "-infinity"] {
            assert!(ParamValue::parse(ParamKind::Float, non_finite).is_err(), "{non_finite}");
        }
        assert!(ParamValue::parse(ParamKind::Boolean, "maybe").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for value in [
            ParamValue::Float(2.5),
            ParamValue::Duration(Duration::from_millis(1500)),
            ParamValue::Boolean(false),
        ] {
            let parsed = ParamValue::parse(value.kind(), &value.to_string()).unwrap();
            assert_eq!(parsed, value);
        }
    }
}
