//! # strand - Scene Graph Access Layer
//!
//! Identity-preserving, cached and transactional access to a live scene
//! graph behind the [`strand_core::Host`] boundary:
//!
//! - One wrapper per live node, found again by handle or hash
//! - Attribute lookups cached per node until its attribute layout changes
//! - Destruction tracking that turns wrappers dead instead of dangling
//! - Batched mutations that roll back on failure and undo as one step
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strand::prelude::*;
//! use strand_host::MemoryHost;
//!
//! let session = Session::new(Arc::new(MemoryHost::new()))?;
//! let node = session.create_node("transform", Some("root"))?;
//! node.attribute_as("translateX", Unit::Meters)?.write(1.5)?;
//!
//! session.transaction(|m| {
//!     let child = m.create_node("transform", None)?;
//!     m.connect(&node.attribute("tx")?, &child.attribute("ty")?, false)
//! })?;
//! ```

pub mod anim;
pub mod context;
pub mod dag;
mod destruction;
pub mod error;
mod forwarding;
mod identity;
pub mod modifier;
pub mod node;
mod path_cache;
pub mod plug;
pub mod session;
pub mod set;
pub mod stats;
pub mod undo;

pub use anim::AnimCurve;
pub use context::TimeContext;
pub use dag::{DagNode, DagNodes};
pub use error::{Error, ModifierError, Result};
pub use modifier::{Modifier, ModifierOptions, ModifierState};
pub use node::{Node, Nodes};
pub use plug::{Plug, Plugs, Read};
pub use session::{Session, MIN_HOST_VERSION};
pub use set::ObjectSet;
pub use stats::StatsSnapshot;
pub use undo::UndoBridge;

pub use strand_core::{
    AttributeSpec, AttributeType, Config, Interpolation, Key, NodeHandle, NodeKind, Unit,
    UnitKind, Value,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::anim::AnimCurve;
    pub use crate::dag::DagNode;
    pub use crate::error::{Error, Result};
    pub use crate::modifier::{Modifier, ModifierOptions};
    pub use crate::node::Node;
    pub use crate::plug::{Plug, Read};
    pub use crate::session::Session;
    pub use crate::set::ObjectSet;
    pub use strand_core::prelude::*;
    pub use strand_core::{Interpolation, Key};
}
