//! Conversion between script values and native operation arguments.
//!
//! Scripts hand over positional JSON values. Each operation declares its
//! parameters; `to_native` checks the values against them in declaration
//! order and produces a name → value map the handler deserializes from.
//! Results travel the other way through `check_return`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::OpError;

/// Largest integer a script number can carry without losing precision.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

// ─── Insert positions ───────────────────────────────────────────────────

/// Where `playlist.insert*` puts new tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// Before the track at this index.
    At(usize),
    Prepend,
    Insert,
    Last,
    First,
    Shuffled,
    Replace,
    LastShuffled,
}

impl InsertPosition {
    /// Sentinel names and codes in the order scripts see them.
    pub const SENTINELS: [(&'static str, &'static str, i64); 7] = [
        ("PLAYLIST_PREPEND", "prepend", -1),
        ("PLAYLIST_INSERT", "insert", -2),
        ("PLAYLIST_INSERT_LAST", "last", -3),
        ("PLAYLIST_INSERT_FIRST", "first", -4),
        ("PLAYLIST_INSERT_SHUFFLED", "shuffled", -5),
        ("PLAYLIST_REPLACE", "replace", -6),
        ("PLAYLIST_INSERT_LAST_SHUFFLED", "lastShuffled", -7),
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Self::Prepend),
            -2 => Some(Self::Insert),
            -3 => Some(Self::Last),
            -4 => Some(Self::First),
            -5 => Some(Self::Shuffled),
            -6 => Some(Self::Replace),
            -7 => Some(Self::LastShuffled),
            n if n >= 0 => Some(Self::At(n as usize)),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::SENTINELS
            .iter()
            .find(|(_, short, _)| *short == name)
            .and_then(|(_, _, code)| Self::from_code(*code))
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::At(i) => *i as i64,
            Self::Prepend => -1,
            Self::Insert => -2,
            Self::Last => -3,
            Self::First => -4,
            Self::Shuffled => -5,
            Self::Replace => -6,
            Self::LastShuffled => -7,
        }
    }
}

impl<'de> serde::Deserialize<'de> for InsertPosition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid insert position {code}")))
    }
}

// ─── Parameter schema ───────────────────────────────────────────────────

/// Declared type of one operation parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgType {
    Bool,
    Int { min: i64, max: i64 },
    Str { non_empty: bool },
    /// A string without NUL bytes.
    Path,
    List(Box<ArgType>),
    /// A playlist index or insert sentinel, given as a code or a name.
    InsertPosition,
    Object,
    Any,
}

impl ArgType {
    pub fn int() -> Self {
        ArgType::Int {
            min: -MAX_SAFE_INTEGER,
            max: MAX_SAFE_INTEGER,
        }
    }

    pub fn int_range(min: i64, max: i64) -> Self {
        ArgType::Int { min, max }
    }

    pub fn non_negative() -> Self {
        ArgType::int_range(0, MAX_SAFE_INTEGER)
    }

    pub fn string() -> Self {
        ArgType::Str { non_empty: false }
    }

    pub fn non_empty_string() -> Self {
        ArgType::Str { non_empty: true }
    }

    pub fn list(inner: ArgType) -> Self {
        ArgType::List(Box::new(inner))
    }

    /// Check `value` and return its normalized form (integral floats become
    /// integers, insert sentinel names become codes).
    pub fn check(&self, parameter: &str, value: &Value) -> Result<Value, OpError> {
        match self {
            ArgType::Bool => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(mismatch(parameter, "a boolean", other)),
            },
            ArgType::Int { min, max } => {
                let n = as_integer(value).ok_or_else(|| mismatch(parameter, "an integer", value))?;
                if n < *min || n > *max {
                    return Err(OpError::argument(
                        parameter,
                        format!("{n} is outside {min}..={max}"),
                    ));
                }
                Ok(Value::Number(Number::from(n)))
            }
            ArgType::Str { non_empty } => match value {
                Value::String(s) if *non_empty && s.is_empty() => {
                    Err(OpError::argument(parameter, "must not be empty"))
                }
                Value::String(_) => Ok(value.clone()),
                other => Err(mismatch(parameter, "a string", other)),
            },
            ArgType::Path => match value {
                Value::String(s) if s.contains('\0') => {
                    Err(OpError::argument(parameter, "path contains a NUL byte"))
                }
                Value::String(_) => Ok(value.clone()),
                other => Err(mismatch(parameter, "a path string", other)),
            },
            ArgType::List(inner) => match value {
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        out.push(inner.check(&format!("{parameter}[{i}]"), item)?);
                    }
                    Ok(Value::Array(out))
                }
                other => Err(mismatch(parameter, "a list", other)),
            },
            ArgType::InsertPosition => {
                let position = match value {
                    Value::String(name) => InsertPosition::from_name(name),
                    other => as_integer(other).and_then(InsertPosition::from_code),
                };
                position
                    .map(|p| Value::Number(Number::from(p.code())))
                    .ok_or_else(|| mismatch(parameter, "an index or insert position", value))
            }
            ArgType::Object => match value {
                Value::Object(_) => Ok(value.clone()),
                other => Err(mismatch(parameter, "an object", other)),
            },
            ArgType::Any => Ok(value.clone()),
        }
    }

    /// TypeScript spelling of this type.
    pub fn ts(&self) -> String {
        match self {
            ArgType::Bool => "boolean".into(),
            ArgType::Int { .. } => "number".into(),
            ArgType::Str { .. } | ArgType::Path => "string".into(),
            ArgType::List(inner) => format!("{}[]", inner.ts()),
            ArgType::InsertPosition => "number | InsertPositionName".into(),
            ArgType::Object => "Record<string, unknown>".into(),
            ArgType::Any => "unknown".into(),
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "a non-integral number",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(parameter: &str, expected: &str, got: &Value) -> OpError {
    OpError::argument(parameter, format!("expected {expected}, got {}", type_name(got)))
}

/// Whether a parameter must be supplied.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    /// Absent values reach the handler as `null`.
    Optional,
    Default(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ArgType,
    pub presence: Presence,
}

impl Param {
    pub fn required(name: &str, ty: ArgType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            presence: Presence::Required,
        }
    }

    pub fn optional(name: &str, ty: ArgType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            presence: Presence::Optional,
        }
    }

    pub fn with_default(name: &str, ty: ArgType, default: impl Into<Value>) -> Self {
        Self {
            name: name.to_string(),
            ty,
            presence: Presence::Default(default.into()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.presence == Presence::Required
    }
}

// ─── Return schema ──────────────────────────────────────────────────────

/// Declared result type of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Returns {
    Void,
    Bool,
    Int,
    Str,
    /// A JSON object of the named record type.
    Record(&'static str),
    Nullable(Box<Returns>),
    List(Box<Returns>),
}

impl Returns {
    pub fn nullable(inner: Returns) -> Self {
        Returns::Nullable(Box::new(inner))
    }

    pub fn list(inner: Returns) -> Self {
        Returns::List(Box::new(inner))
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Returns::Void => value.is_null(),
            Returns::Bool => value.is_boolean(),
            Returns::Int => value.is_i64() || value.is_u64(),
            Returns::Str => value.is_string(),
            Returns::Record(_) => value.is_object(),
            Returns::Nullable(inner) => value.is_null() || inner.matches(value),
            Returns::List(inner) => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| inner.matches(v))),
        }
    }

    pub fn ts(&self) -> String {
        match self {
            Returns::Void => "void".into(),
            Returns::Bool => "boolean".into(),
            Returns::Int => "number".into(),
            Returns::Str => "string".into(),
            Returns::Record(name) => (*name).to_string(),
            Returns::Nullable(inner) => format!("{} | null", inner.ts()),
            Returns::List(inner) => match inner.as_ref() {
                Returns::Nullable(_) => format!("({})[]", inner.ts()),
                _ => format!("{}[]", inner.ts()),
            },
        }
    }

    /// Record type names used anywhere in this type.
    pub fn records(&self, out: &mut Vec<&'static str>) {
        match self {
            Returns::Record(name) => {
                if !out.contains(name) {
                    out.push(*name);
                }
            }
            Returns::Nullable(inner) | Returns::List(inner) => inner.records(out),
            _ => {}
        }
    }
}

// ─── Args ───────────────────────────────────────────────────────────────

/// Validated arguments of one call, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize the handler's typed argument struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, OpError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| OpError::argument("arguments", e.to_string()))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Check positional script values against `params`.
///
/// The first violation fails the whole call. `null` and missing trailing
/// values are both "undefined".
pub fn to_native(params: &[Param], raw: &[Value]) -> Result<Args, OpError> {
    if raw.len() > params.len() {
        return Err(OpError::argument(
            "arguments",
            format!("expected at most {} arguments, got {}", params.len(), raw.len()),
        ));
    }

    let mut args = Map::new();
    for (i, param) in params.iter().enumerate() {
        let value = match raw.get(i) {
            Some(v) if !v.is_null() => param.ty.check(&param.name, v)?,
            _ => match &param.presence {
                Presence::Required => {
                    return Err(OpError::argument(&param.name, "missing required argument"))
                }
                Presence::Optional => Value::Null,
                Presence::Default(default) => default.clone(),
            },
        };
        args.insert(param.name.clone(), value);
    }
    Ok(Args(args))
}

/// Serialize a handler result into a script value.
pub fn to_script<T: Serialize>(value: &T) -> Result<Value, OpError> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!("failed to serialize operation result: {e}");
        OpError::Internal("result could not be serialized".into())
    })
}

/// Check a handler's result against its declared return type.
pub fn check_return(returns: &Returns, value: Value) -> Result<Value, String> {
    if returns.matches(&value) {
        Ok(value)
    } else {
        Err(format!(
            "expected {}, got {}",
            returns.ts(),
            type_name(&value)
        ))
    }
}
