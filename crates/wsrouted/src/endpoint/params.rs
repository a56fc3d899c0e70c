//! Declared endpoint parameters and the bound argument list.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use super::{ConversionError, EndpointError};

/// Declared type of an endpoint parameter.
///
/// Value kinds (`Bool`, `Integer`, `Unsigned`, `Float`) fall back to a zero
/// value when no usable argument was sent; the remaining kinds fall back to
/// `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// `true`/`false`, also from the strings `"true"` and `"false"`.
    Bool,
    /// Signed 64-bit integer, also from numeric strings.
    Integer,
    /// Unsigned 64-bit integer, also from numeric strings.
    Unsigned,
    /// 64-bit float, also from numeric strings.
    Float,
    /// String; scalars are rendered as text.
    Text,
    Array,
    Object,
    /// Any JSON value, passed through unchanged.
    Any,
    /// The whole request body as an object.
    Payload,
}

impl ParamKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Unsigned => "unsigned integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any value",
            Self::Payload => "payload",
        }
    }

    /// Whether the kind has a non-null zero value.
    #[must_use]
    pub const fn is_value_kind(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Integer | Self::Unsigned | Self::Float
        )
    }

    #[must_use]
    pub fn zero_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Integer | Self::Unsigned => Value::from(0),
            Self::Float => Value::from(0.0),
            Self::Text | Self::Array | Self::Object | Self::Any | Self::Payload => Value::Null,
        }
    }

    /// Converts a raw body value to this kind.
    ///
    /// Conversion is lenient: numeric and boolean text is parsed, and scalars
    /// are rendered when text is expected. `null` stays `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the value has no sensible reading as
    /// this kind.
    pub fn convert(self, raw: &Value) -> Result<Value, ConversionError> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        match (self, raw) {
            (Self::Any | Self::Payload, _)
            | (Self::Bool, Value::Bool(_))
            | (Self::Text, Value::String(_))
            | (Self::Array, Value::Array(_))
            | (Self::Object, Value::Object(_)) => Ok(raw.clone()),
            (Self::Bool, Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(self.literal(text)),
            },
            (Self::Integer, Value::Number(number)) => number
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| self.literal(&number.to_string())),
            (Self::Integer, Value::String(text)) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| self.literal(text)),
            (Self::Unsigned, Value::Number(number)) => number
                .as_u64()
                .map(Value::from)
                .ok_or_else(|| self.literal(&number.to_string())),
            (Self::Unsigned, Value::String(text)) => text
                .trim()
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| self.literal(text)),
            (Self::Float, Value::Number(_)) => Ok(raw.clone()),
            (Self::Float, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.literal(text)),
            (Self::Text, Value::Number(number)) => Ok(Value::String(number.to_string())),
            (Self::Text, Value::Bool(flag)) => Ok(Value::String(flag.to_string())),
            (_, other) => Err(ConversionError::Mismatch {
                expected: self,
                found: json_type(other),
            }),
        }
    }

    fn literal(self, literal: &str) -> ConversionError {
        ConversionError::Literal {
            expected: self,
            literal: literal.to_owned(),
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter: its name, kind and optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    default: Option<Value>,
}

impl ParamSpec {
    /// Parameter `name` of the given kind, without a default.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// Value used when the argument is missing or unusable.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The declared default, or the kind's zero value.
    #[must_use]
    pub fn fallback(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.kind.zero_value())
    }
}

/// Arguments bound for one invocation, in declaration order.
///
/// Parameters that were absent or failed conversion hold their
/// [`ParamSpec::fallback`]; `null` appears only for kinds without a zero value
/// or when the caller sent `null`.
#[derive(Debug, Clone)]
pub struct Arguments {
    params: Arc<[ParamSpec]>,
    values: Vec<Value>,
}

impl Arguments {
    pub(crate) fn new(params: Arc<[ParamSpec]>, values: Vec<Value>) -> Self {
        Self { params, values }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The bound value at declaration position `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// The bound value for a declared parameter.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .position(|param| param.name() == name)
            .and_then(|index| self.values.get(index))
    }

    /// Deserialises a parameter, treating `null` as absent.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidArgument`] when the value does not fit
    /// `T`.
    pub fn typed<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, EndpointError> {
        match self.value(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|error| EndpointError::invalid_argument(name, error.to_string())),
        }
    }

    /// Like [`Arguments::typed`] but absence is an error.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::MissingArgument`] for absent values and
    /// [`EndpointError::InvalidArgument`] for values that do not fit `T`.
    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T, EndpointError> {
        self.typed(name)?
            .ok_or_else(|| EndpointError::missing_argument(name))
    }
}
