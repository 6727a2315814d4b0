//! Dynamic value types for attribute reads and writes
//!
//! Values are the host-neutral representation of attribute data. Numeric
//! coercions are symmetric so that writing back what was read is a no-op.

use serde::{Deserialize, Serialize};

/// A dynamic value that can represent any attribute data
///
/// JSON is untagged, so reading it back picks the first variant that fits.
/// Bytes come back as the base64 `String` and a 16-number `Array` comes back
/// as a `Matrix`. Use JSON for display and dumps, not for exact storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null/None value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (i64 for wide compatibility)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// 4x4 matrix (row-major)
    Matrix([f64; 16]),
    /// Array of values; compound attributes read as one entry per child
    Array(Vec<Value>),
    /// Raw bytes (base64 encoded in JSON)
    #[serde(with = "base64_serde")]
    Bytes(Vec<u8>),
}

/// Absolute tolerance used by [`Value::approx_eq`]
pub const EPSILON: f64 = 1e-6;

impl Value {
    /// Create a null value
    pub fn null() -> Self {
        Self::Null
    }

    /// Check if value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Raw data that cannot pass through a modifier
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    /// Identity matrix
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Self::Matrix(m)
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Float(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(f.round() as i64),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Try to get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as vec3
    pub fn as_vec3(&self) -> Option<[f64; 3]> {
        match self {
            Self::Array(arr) if arr.len() == 3 => Some([
                arr[0].as_float()?,
                arr[1].as_float()?,
                arr[2].as_float()?,
            ]),
            _ => None,
        }
    }

    /// Try to get as matrix
    pub fn as_matrix(&self) -> Option<[f64; 16]> {
        match self {
            Self::Matrix(m) => Some(*m),
            Self::Array(arr) if arr.len() == 16 => {
                let mut m = [0.0; 16];
                for (slot, v) in m.iter_mut().zip(arr) {
                    *slot = v.as_float()?;
                }
                Some(m)
            }
            _ => None,
        }
    }

    /// Short type label for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Matrix(_) => "matrix",
            Self::Array(_) => "array",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Apply `f` to every numeric leaf, leaving everything else as is
    pub fn map_numeric(&self, f: &impl Fn(f64) -> f64) -> Self {
        match self {
            Self::Float(v) => Self::Float(f(*v)),
            Self::Int(v) => Self::Float(f(*v as f64)),
            Self::Array(items) => Self::Array(items.iter().map(|v| v.map_numeric(f)).collect()),
            other => other.clone(),
        }
    }

    /// Equality with floating-point tolerance, numeric kinds compare across
    pub fn approx_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y))
            }
            (Self::Matrix(a), Self::Matrix(b)) => {
                a.iter().zip(b).all(|(x, y)| (x - y).abs() <= EPSILON)
            }
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                match (self.as_float(), other.as_float()) {
                    (Some(x), Some(y)) => (x - y).abs() <= EPSILON * x.abs().max(y.abs()).max(1.0),
                    _ => false,
                }
            }
            _ => self == other,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Array(v.iter().map(|x| Self::Float(*x)).collect())
    }
}

impl From<[f64; 16]> for Value {
    fn from(v: [f64; 16]) -> Self {
        Self::Matrix(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::Array(iter.into_iter().map(Into::into).collect())
    }
}

/// Helper module for base64 serialization of bytes
mod base64_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}
