use std::fmt;
use std::sync::Arc;

/// Logical column type. The set of encodings is closed; every consumer matches exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Utf8,
    /// Dictionary encoded column with `u32` indices into a key column of the given type.
    Dictionary(Box<DataType>),
    Struct(Vec<Field>),
    List(Box<DataType>),
}

impl DataType {
    pub fn is_fixed_width(&self) -> bool {
        self.fixed_width_bytes().is_some()
    }

    /// Size of one value for fixed-width types.
    pub fn fixed_width_bytes(&self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::Int8 | DataType::UInt8 => Some(1),
            DataType::Int16 | DataType::UInt16 => Some(2),
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => Some(8),
            DataType::Utf8 | DataType::Dictionary(_) | DataType::Struct(_) | DataType::List(_) => {
                None
            }
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, DataType::Struct(_) | DataType::List(_))
    }

    /// Whether this type, or any type nested in it, is a list.
    pub fn contains_list(&self) -> bool {
        match self {
            DataType::List(_) => true,
            DataType::Struct(fields) => fields.iter().any(|f| f.data_type.contains_list()),
            DataType::Dictionary(value) => value.contains_list(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A single cell read back out of a column.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(Arc<str>),
    Struct(Vec<Value>),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Struct(fields) | Value::List(fields) => {
                let open = if matches!(self, Value::Struct(_)) { '{' } else { '[' };
                let close = if open == '{' { '}' } else { ']' };
                write!(f, "{open}")?;
                for (idx, v) in fields.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}
