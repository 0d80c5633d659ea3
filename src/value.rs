use crate::LibsqlError;

/// SQL scalar exchanged with the server.
///
/// Strings always map to [`Value::Text`]; a blob must be requested explicitly
/// with [`Value::blob`] or a byte-slice conversion.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn null() -> Self {
        Self::Null
    }

    pub fn integer(value: i64) -> Self {
        Self::Integer(value)
    }

    pub fn float(value: f64) -> Self {
        Self::Float(value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn blob(value: impl Into<Vec<u8>>) -> Self {
        Self::Blob(value.into())
    }

    /// Wire type tag of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Classifies a dynamically typed JSON scalar.
    ///
    /// Integral numbers become `Integer` (out of `i64` range is an error, never
    /// a lossy `Float`), other numbers `Float`, strings
    /// `Text`, booleans `Integer` 0/1 and `null` stays `Null`. Arrays and
    /// objects have no wire type and fail with `InvalidTypeArgument`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, LibsqlError> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(flag) => Ok(Self::Integer(i64::from(*flag))),
            serde_json::Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Self::Integer(int))
                } else if number.is_u64() {
                    Err(LibsqlError::InvalidTypeArgument(format!(
                        "integer {number} does not fit a signed 64-bit integer"
                    )))
                } else if let Some(float) = number.as_f64() {
                    Ok(Self::Float(float))
                } else {
                    Err(LibsqlError::InvalidTypeArgument(format!(
                        "number {number} does not fit a 64-bit integer or float"
                    )))
                }
            }
            serde_json::Value::String(text) => Ok(Self::Text(text.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(LibsqlError::InvalidTypeArgument(format!(
                    "invalid argument {value}: the type of each argument must be one of null, integer, float, text or blob"
                )))
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = LibsqlError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_json(&value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(value.into())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
