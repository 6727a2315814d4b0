//! # strand_core - Host Boundary Primitives
//!
//! Everything the access layer needs to talk to a live scene-graph host,
//! and nothing more:
//! - **Handles**: opaque node and plug references plus subscription ids
//! - **Values**: a dynamic value type for attribute reads and writes
//! - **Units**: distance/angle/time conversion to and from native units
//! - **Attributes**: declarative attribute specs for dynamic attributes
//! - **Host**: the trait a scene engine implements to be wrapped
//! - **Config**: environment/TOML driven operating modes
//!
//! ## Philosophy
//! The host owns all scene state. This crate only describes the seam.

pub mod handle;
pub mod value;
pub mod unit;
pub mod attribute;
pub mod error;
pub mod host;
pub mod config;

pub use handle::{NodeHandle, AttributeId, PlugHandle, SubscriptionId};
pub use value::Value;
pub use unit::{Unit, UnitKind};
pub use attribute::{AttributeSpec, AttributeType};
pub use error::{HostError, HostResult};
pub use host::{
    DestroyCallback, Host, Interpolation, Key, NodeKind, NodeSnapshot, PlugInfo,
    SnapshotConnection, UndoFn,
};
pub use config::{Config, ConfigError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handle::{NodeHandle, PlugHandle};
    pub use crate::value::Value;
    pub use crate::unit::{Unit, UnitKind};
    pub use crate::attribute::{AttributeSpec, AttributeType};
    pub use crate::error::{HostError, HostResult};
    pub use crate::host::{Host, Interpolation, NodeKind};
    pub use crate::config::Config;
}
