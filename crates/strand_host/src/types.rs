//! Node type registry
//!
//! Ships a small set of builtin types covering each [`NodeKind`]. Embedders
//! may register more through [`MemoryHost::register_type`](crate::MemoryHost::register_type).

use std::collections::HashMap;

use strand_core::{AttributeSpec, NodeKind};

/// Definition of a creatable node type
#[derive(Debug, Clone)]
pub struct NodeType {
    pub name: String,
    pub kind: NodeKind,
    /// Writable attributes
    pub attributes: Vec<AttributeSpec>,
    /// Attributes computed by the host on read
    pub outputs: Vec<AttributeSpec>,
}

impl NodeType {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: common_attributes(),
            outputs: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    pub fn with_output(mut self, spec: AttributeSpec) -> Self {
        self.outputs.push(spec);
        self
    }
}

fn common_attributes() -> Vec<AttributeSpec> {
    vec![
        AttributeSpec::message("message").with_short_name("msg"),
        AttributeSpec::bool("caching").with_short_name("cch"),
    ]
}

/// Keyable XYZ compound with short child names
fn axes(name: &str, short: &str, child: fn(String) -> AttributeSpec, default: f64) -> AttributeSpec {
    let children = [("X", "x"), ("Y", "y"), ("Z", "z")]
        .iter()
        .map(|(long_axis, short_axis)| {
            child(format!("{}{}", name, long_axis))
                .with_short_name(format!("{}{}", short, short_axis))
                .with_default(default)
                .keyable(true)
        })
        .collect();
    AttributeSpec::compound(name, children)
        .with_short_name(short)
        .keyable(true)
}

fn transform(name: &str) -> NodeType {
    NodeType::new(name, NodeKind::Dag)
        .with_attribute(axes("translate", "t", AttributeSpec::distance, 0.0))
        .with_attribute(axes("rotate", "r", AttributeSpec::angle, 0.0))
        .with_attribute(axes("scale", "s", AttributeSpec::double, 1.0))
        .with_attribute(
            AttributeSpec::bool("visibility")
                .with_short_name("v")
                .with_default(true)
                .keyable(true),
        )
}

fn binary_math(name: &str) -> NodeType {
    NodeType::new(name, NodeKind::Plain)
        .with_attribute(AttributeSpec::double("input1").with_short_name("i1").keyable(true))
        .with_attribute(AttributeSpec::double("input2").with_short_name("i2").keyable(true))
        .with_output(AttributeSpec::double("output").with_short_name("o"))
}

fn anim_curve(name: &str, output: fn(String) -> AttributeSpec) -> NodeType {
    NodeType::new(name, NodeKind::AnimCurve)
        .with_output(output("output".to_string()).with_short_name("o"))
}

pub struct TypeRegistry {
    types: HashMap<String, NodeType>,
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry preloaded with the builtin types
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(transform("transform"));
        registry.register(
            transform("joint").with_attribute(
                AttributeSpec::double("radius")
                    .with_short_name("radi")
                    .with_default(1.0),
            ),
        );
        registry.register(
            NodeType::new("mesh", NodeKind::Dag)
                .with_attribute(AttributeSpec::data("inMesh").with_short_name("i"))
                .with_attribute(AttributeSpec::data("outMesh").with_short_name("o")),
        );
        registry.register(NodeType::new("network", NodeKind::Plain));
        registry.register(binary_math("multDoubleLinear"));
        registry.register(binary_math("addDoubleLinear"));
        registry.register(NodeType::new("objectSet", NodeKind::Set));
        registry.register(anim_curve("animCurveTL", AttributeSpec::distance));
        registry.register(anim_curve("animCurveTA", AttributeSpec::angle));
        registry.register(anim_curve("animCurveTU", AttributeSpec::double));
        registry.register(anim_curve("animCurveTT", AttributeSpec::time));
        registry
    }

    /// Register a type, replacing any previous one of the same name
    pub fn register(&mut self, ty: NodeType) {
        self.types.insert(ty.name.clone(), ty);
    }

    pub fn get(&self, name: &str) -> Option<&NodeType> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
