//! Declarative attribute specifications
//!
//! Used when adding dynamic attributes to a node. Specs are plain data so
//! that a removed attribute can be handed back and re-added on undo.

use crate::unit::UnitKind;
use crate::value::Value;

/// Storage type of an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    Bool,
    Long,
    Double,
    String,
    /// Integer index into a list of field names
    Enum(Vec<String>),
    /// Connection-only attribute with no value
    Message,
    Matrix,
    Distance,
    Angle,
    Time,
    /// Opaque blob data such as geometry
    Data,
    Compound(Vec<AttributeSpec>),
}

impl AttributeType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Long => "long",
            Self::Double => "double",
            Self::String => "string",
            Self::Enum(_) => "enum",
            Self::Message => "message",
            Self::Matrix => "matrix",
            Self::Distance => "doubleLinear",
            Self::Angle => "doubleAngle",
            Self::Time => "time",
            Self::Data => "typed",
            Self::Compound(_) => "compound",
        }
    }

    pub fn unit_kind(&self) -> Option<UnitKind> {
        match self {
            Self::Distance => Some(UnitKind::Distance),
            Self::Angle => Some(UnitKind::Angle),
            Self::Time => Some(UnitKind::Time),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Long | Self::Double | Self::Enum(_) | Self::Distance | Self::Angle | Self::Time
        )
    }
}

/// Specification of a single attribute, possibly compound
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    pub name: String,
    pub short_name: Option<String>,
    pub ty: AttributeType,
    pub default: Option<Value>,
    pub array: bool,
    pub keyable: bool,
}

impl AttributeSpec {
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            ty,
            default: None,
            array: false,
            keyable: false,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Bool)
    }

    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Long)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Double)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::String)
    }

    pub fn enumeration<S: Into<String>>(name: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        Self::new(name, AttributeType::Enum(fields.into_iter().map(Into::into).collect()))
    }

    pub fn message(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Message)
    }

    pub fn matrix(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Matrix)
    }

    pub fn distance(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Distance)
    }

    pub fn angle(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Angle)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Time)
    }

    pub fn data(name: impl Into<String>) -> Self {
        Self::new(name, AttributeType::Data)
    }

    pub fn compound(name: impl Into<String>, children: Vec<AttributeSpec>) -> Self {
        Self::new(name, AttributeType::Compound(children))
    }

    /// Compound of three children suffixed X, Y and Z
    fn triple(name: impl Into<String>, child: fn(String) -> AttributeSpec) -> Self {
        let name = name.into();
        let children = ["X", "Y", "Z"]
            .iter()
            .map(|axis| child(format!("{}{}", name, axis)))
            .collect();
        Self::compound(name, children)
    }

    pub fn double3(name: impl Into<String>) -> Self {
        Self::triple(name, Self::double)
    }

    pub fn distance3(name: impl Into<String>) -> Self {
        Self::triple(name, Self::distance)
    }

    pub fn angle3(name: impl Into<String>) -> Self {
        Self::triple(name, Self::angle)
    }

    pub fn with_short_name(mut self, short: impl Into<String>) -> Self {
        self.short_name = Some(short.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn keyable(mut self, keyable: bool) -> Self {
        self.keyable = keyable;
        self
    }

    pub fn children(&self) -> &[AttributeSpec] {
        match &self.ty {
            AttributeType::Compound(children) => children,
            _ => &[],
        }
    }

    pub fn unit_kind(&self) -> Option<UnitKind> {
        self.ty.unit_kind()
    }

    /// Value of a freshly created, never written attribute
    pub fn default_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match &self.ty {
            AttributeType::Bool => Value::Bool(false),
            AttributeType::Long | AttributeType::Enum(_) => Value::Int(0),
            AttributeType::Double
            | AttributeType::Distance
            | AttributeType::Angle
            | AttributeType::Time => Value::Float(0.0),
            AttributeType::String => Value::String(String::new()),
            AttributeType::Matrix => Value::identity(),
            AttributeType::Message | AttributeType::Data => Value::Null,
            AttributeType::Compound(children) => {
                Value::Array(children.iter().map(|c| c.default_value()).collect())
            }
        }
    }

    /// Convert `value` to this attribute's storage type
    ///
    /// Returns `None` when the value cannot be stored here.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match &self.ty {
            AttributeType::Bool => value.as_bool().map(Value::Bool),
            AttributeType::Long => value.as_int().map(Value::Int),
            AttributeType::Enum(fields) => match value {
                Value::String(s) => fields
                    .iter()
                    .position(|f| f == s)
                    .map(|i| Value::Int(i as i64)),
                other => other.as_int().map(Value::Int),
            },
            AttributeType::Double
            | AttributeType::Distance
            | AttributeType::Angle
            | AttributeType::Time => value.as_float().map(Value::Float),
            AttributeType::String => value.as_str().map(|s| Value::String(s.to_string())),
            AttributeType::Matrix => value.as_matrix().map(Value::Matrix),
            AttributeType::Message => None,
            AttributeType::Data => match value {
                Value::Bytes(_) | Value::Null => Some(value.clone()),
                _ => None,
            },
            AttributeType::Compound(children) => {
                let items = value.as_array()?;
                if items.len() != children.len() {
                    return None;
                }
                children
                    .iter()
                    .zip(items)
                    .map(|(c, v)| c.coerce(v))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array)
            }
        }
    }
}
