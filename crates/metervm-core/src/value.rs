//! Values exchanged with the interpreter.
//!
//! [`Value`] carries run outputs and entrypoint arguments. Arguments supplied
//! by a caller are checked against the entrypoint's declared [`ValueType`]s
//! with [`try_convert`] before the interpreter is invoked.

use std::fmt;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};
use thiserror::Error;

/// A value produced by, or passed into, a run.
#[derive(Debug, Clone, PartialEq, Default, Archive, Serialize, Deserialize)]
pub enum Value {
    /// No value (an entrypoint that returns nothing).
    #[default]
    Unit,
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
}

/// Type tag for [`Value`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Unit,
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
}

/// Conversion families used for argument marshalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Unit,
    Boolean,
    Integer,
    Float,
    Text,
}

/// Why an argument could not be converted to a declared parameter type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The argument belongs to a family the parameter does not accept.
    #[error("expected {expected}, found {found}")]
    Mismatch { found: ValueType, expected: ValueType },

    /// The argument is an integer that does not fit the parameter type.
    #[error("{value} does not fit in {expected}")]
    OutOfRange { value: i128, expected: ValueType },

    /// The argument is a finite float that overflows the parameter type.
    #[error("{value} does not fit in {expected}")]
    FloatOutOfRange { value: f64, expected: ValueType },
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Bool(_) => ValueType::Bool,
            Value::Int8(_) => ValueType::Int8,
            Value::UInt8(_) => ValueType::UInt8,
            Value::Int16(_) => ValueType::Int16,
            Value::UInt16(_) => ValueType::UInt16,
            Value::Int32(_) => ValueType::Int32,
            Value::UInt32(_) => ValueType::UInt32,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Float32(_) => ValueType::Float32,
            Value::Float64(_) => ValueType::Float64,
            Value::String(_) => ValueType::String,
        }
    }

    /// Whether this is [`Value::Unit`].
    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    /// Widen any integer variant. Returns `None` for every other variant.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::UInt8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::Int64(v) => Some(v.into()),
            Value::UInt64(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Widen any floating-point variant.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v.into()),
            Value::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Parse a command-line literal.
    ///
    /// `true`/`false` become booleans, integers become `Int64`, anything with
    /// a decimal point or exponent that parses as a float becomes `Float64`,
    /// and everything else is kept as a string.
    pub fn parse_literal(text: &str) -> Value {
        match text {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(v) = text.parse::<i64>() {
            return Value::Int64(v);
        }
        if text.contains(['.', 'e', 'E'])
            && let Ok(v) = text.parse::<f64>()
        {
            return Value::Float64(v);
        }
        Value::String(text.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl ValueType {
    /// The conversion family this type belongs to.
    pub fn family(self) -> TypeFamily {
        match self {
            ValueType::Unit => TypeFamily::Unit,
            ValueType::Bool => TypeFamily::Boolean,
            ValueType::Int8
            | ValueType::UInt8
            | ValueType::Int16
            | ValueType::UInt16
            | ValueType::Int32
            | ValueType::UInt32
            | ValueType::Int64
            | ValueType::UInt64 => TypeFamily::Integer,
            ValueType::Float32 | ValueType::Float64 => TypeFamily::Float,
            ValueType::String => TypeFamily::Text,
        }
    }

    /// Short source-level name, e.g. `i32`.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Unit => "unit",
            ValueType::Bool => "bool",
            ValueType::Int8 => "i8",
            ValueType::UInt8 => "u8",
            ValueType::Int16 => "i16",
            ValueType::UInt16 => "u16",
            ValueType::Int32 => "i32",
            ValueType::UInt32 => "u32",
            ValueType::Int64 => "i64",
            ValueType::UInt64 => "u64",
            ValueType::Float32 => "f32",
            ValueType::Float64 => "f64",
            ValueType::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s {
            "unit" => ValueType::Unit,
            "bool" => ValueType::Bool,
            "i8" => ValueType::Int8,
            "u8" => ValueType::UInt8,
            "i16" => ValueType::Int16,
            "u16" => ValueType::UInt16,
            "i32" => ValueType::Int32,
            "u32" => ValueType::UInt32,
            "i64" => ValueType::Int64,
            "u64" => ValueType::UInt64,
            "f32" => ValueType::Float32,
            "f64" => ValueType::Float64,
            "string" => ValueType::String,
            other => return Err(format!("unknown type `{}`", other)),
        };
        Ok(ty)
    }
}

/// Convert `source` to the declared `target` type.
///
/// - Integer targets accept any integer that fits, range-checked.
/// - Boolean targets accept booleans, and integers (non-zero is `true`).
/// - Floating-point targets accept only floating-point values. A finite
///   value too large for `f32` is out of range; infinities and NaN pass.
/// - String and unit targets accept only the same variant.
pub fn try_convert(source: &Value, target: ValueType) -> Result<Value, ConversionError> {
    let mismatch = || ConversionError::Mismatch {
        found: source.value_type(),
        expected: target,
    };

    match target.family() {
        TypeFamily::Boolean => match source {
            Value::Bool(v) => Ok(Value::Bool(*v)),
            other => other
                .as_integer()
                .map(|v| Value::Bool(v != 0))
                .ok_or_else(mismatch),
        },
        TypeFamily::Integer => {
            let wide = source.as_integer().ok_or_else(mismatch)?;
            narrow_integer(wide, target)
        }
        TypeFamily::Float => {
            let wide = source.as_float().ok_or_else(mismatch)?;
            match target {
                ValueType::Float32 => {
                    let narrow = wide as f32;
                    if wide.is_finite() && !narrow.is_finite() {
                        return Err(ConversionError::FloatOutOfRange {
                            value: wide,
                            expected: target,
                        });
                    }
                    Ok(Value::Float32(narrow))
                }
                _ => Ok(Value::Float64(wide)),
            }
        }
        TypeFamily::Text => match source {
            Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(mismatch()),
        },
        TypeFamily::Unit => match source {
            Value::Unit => Ok(Value::Unit),
            _ => Err(mismatch()),
        },
    }
}

fn narrow_integer(value: i128, target: ValueType) -> Result<Value, ConversionError> {
    let out_of_range = |_| ConversionError::OutOfRange {
        value,
        expected: target,
    };

    match target {
        ValueType::Int8 => i8::try_from(value).map(Value::Int8).map_err(out_of_range),
        ValueType::UInt8 => u8::try_from(value).map(Value::UInt8).map_err(out_of_range),
        ValueType::Int16 => i16::try_from(value).map(Value::Int16).map_err(out_of_range),
        ValueType::UInt16 => u16::try_from(value).map(Value::UInt16).map_err(out_of_range),
        ValueType::Int32 => i32::try_from(value).map(Value::Int32).map_err(out_of_range),
        ValueType::UInt32 => u32::try_from(value).map(Value::UInt32).map_err(out_of_range),
        ValueType::Int64 => i64::try_from(value).map(Value::Int64).map_err(out_of_range),
        ValueType::UInt64 => u64::try_from(value).map(Value::UInt64).map_err(out_of_range),
        _ => unreachable!("narrow_integer called with non-integer type {}", target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_to_narrower_integer() {
        assert_eq!(
            try_convert(&Value::Int64(42), ValueType::UInt8),
            Ok(Value::UInt8(42))
        );
        assert_eq!(
            try_convert(&Value::UInt64(7), ValueType::Int16),
            Ok(Value::Int16(7))
        );
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = try_convert(&Value::Int64(300), ValueType::UInt8).unwrap_err();
        assert_eq!(
            err,
            ConversionError::OutOfRange {
                value: 300,
                expected: ValueType::UInt8
            }
        );

        assert!(try_convert(&Value::Int64(-1), ValueType::UInt64).is_err());
    }

    #[test]
    fn test_bool_accepts_integers() {
        assert_eq!(
            try_convert(&Value::Int32(0), ValueType::Bool),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            try_convert(&Value::Int64(-5), ValueType::Bool),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            try_convert(&Value::Bool(true), ValueType::Bool),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn test_float_rejects_integers() {
        let err = try_convert(&Value::Int64(1), ValueType::Float64).unwrap_err();
        assert!(matches!(err, ConversionError::Mismatch { .. }));

        assert_eq!(
            try_convert(&Value::Float64(1.5), ValueType::Float32),
            Ok(Value::Float32(1.5))
        );
    }

    #[test]
    fn test_integer_rejects_floats_and_strings() {
        assert!(try_convert(&Value::Float64(1.0), ValueType::Int32).is_err());
        assert!(try_convert(&Value::String("1".into()), ValueType::Int32).is_err());
        assert!(try_convert(&Value::Bool(true), ValueType::Int32).is_err());
    }

    #[test]
    fn test_float_narrowing_is_range_checked() {
        assert_eq!(
            try_convert(&Value::Float64(1.5), ValueType::Float32),
            Ok(Value::Float32(1.5))
        );
        assert_eq!(
            try_convert(&Value::Float64(1e300), ValueType::Float32),
            Err(ConversionError::FloatOutOfRange {
                value: 1e300,
                expected: ValueType::Float32,
            })
        );
        assert!(
            try_convert(&Value::Float64(-1e300), ValueType::Float32)
                .unwrap_err()
                .to_string()
                .ends_with("does not fit in f32")
        );
        assert_eq!(
            try_convert(&Value::Float64(f64::INFINITY), ValueType::Float32),
            Ok(Value::Float32(f32::INFINITY))
        );
        assert_eq!(
            try_convert(&Value::Float64(1e300), ValueType::Float64),
            Ok(Value::Float64(1e300))
        );
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal("12"), Value::Int64(12));
        assert_eq!(Value::parse_literal("-3"), Value::Int64(-3));
        assert_eq!(Value::parse_literal("2.5"), Value::Float64(2.5));
        assert_eq!(Value::parse_literal("true"), Value::Bool(true));
        assert_eq!(
            Value::parse_literal("hello"),
            Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_value_type_names_roundtrip() {
        for ty in [
            ValueType::Bool,
            ValueType::Int8,
            ValueType::UInt64,
            ValueType::Float32,
            ValueType::String,
        ] {
            assert_eq!(ty.as_str().parse::<ValueType>(), Ok(ty));
        }
        assert!("int".parse::<ValueType>().is_err());
    }
}
