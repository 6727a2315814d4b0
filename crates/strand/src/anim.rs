//! Animation curve nodes

use std::ops::Deref;

use strand_core::{Interpolation, Key};

use crate::error::{Error, Result};
use crate::modifier::single;
use crate::node::Node;
use crate::plug::Plug;

/// A node mapping time to a value through keys
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AnimCurve(Node);

impl Deref for AnimCurve {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl From<AnimCurve> for Node {
    fn from(curve: AnimCurve) -> Node {
        curve.0
    }
}

impl AnimCurve {
    pub(crate) fn from_node(node: Node) -> Self {
        Self(node)
    }

    pub fn as_node(&self) -> &Node {
        &self.0
    }

    /// The evaluated output, in native units
    pub fn output(&self) -> Result<Plug> {
        self.attribute("output")
    }

    /// Set one key, replacing a key at the same time
    pub fn key(&self, time: f64, value: f64, interpolation: Interpolation) -> Result<()> {
        single(&self.session(), |m| m.set_key(self, time, value, interpolation))
    }

    /// Set one key per time as one undoable step
    pub fn keys(&self, times: &[f64], values: &[f64], interpolation: Interpolation) -> Result<()> {
        if times.len() != values.len() {
            return Err(Error::Type {
                path: self.inner().last_path(),
                reason: format!("{} times but {} values", times.len(), values.len()),
            });
        }
        self.session().transaction(|m| {
            for (time, value) in times.iter().zip(values) {
                m.set_key(self, *time, *value, interpolation)?;
            }
            Ok(())
        })
    }

    /// Keys in ascending time
    pub fn get_keys(&self) -> Result<Vec<Key>> {
        self.ensure_alive()?;
        Ok(self.shared().host.keys(self.handle())?)
    }

    /// Curve value at `time`
    pub fn evaluate(&self, time: f64) -> Result<f64> {
        let output = self.output()?;
        let value = output.read_at(time)?;
        value.as_float().ok_or_else(|| Error::Type {
            path: output.to_string(),
            reason: format!("{} is not numeric", value.type_name()),
        })
    }
}
