//! Attribute access
//!
//! A [`Plug`] addresses one attribute, array element or compound child of a
//! node. Reads evaluate through the host; unit-typed attributes convert
//! between the caller's unit and the host's native one.

use std::collections::HashSet;
use std::fmt;

use strand_core::{Host, Interpolation, PlugHandle, PlugInfo, Unit, UnitKind, Value};

use crate::anim::AnimCurve;
use crate::error::{Error, Result};
use crate::modifier::single;
use crate::node::Node;
use crate::session::Session;

/// Options for [`Plug::read_with`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Read {
    /// Unit to return values in; the plug's own unit when `None`
    pub unit: Option<Unit>,
    /// Evaluation time; the host's current time when `None`
    pub time: Option<f64>,
    /// Return the value of the last non-cached read instead of evaluating
    pub cached: bool,
}

impl Read {
    /// Stale read of the last value retrieved without this flag
    pub fn cached() -> Self {
        Self {
            cached: true,
            ..Self::default()
        }
    }

    pub fn at(time: f64) -> Self {
        Self {
            time: Some(time),
            ..Self::default()
        }
    }

    pub fn in_unit(unit: Unit) -> Self {
        Self {
            unit: Some(unit),
            ..Self::default()
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }
}

fn is_numeric_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "bool" | "long" | "double" | "enum" | "doubleLinear" | "doubleAngle" | "time"
    )
}

/// Animation curve type driving an attribute of the given unit
fn curve_type(kind: Option<UnitKind>) -> &'static str {
    match kind {
        Some(UnitKind::Distance) => "animCurveTL",
        Some(UnitKind::Angle) => "animCurveTA",
        Some(UnitKind::Time) => "animCurveTT",
        None => "animCurveTU",
    }
}

#[derive(Clone)]
pub struct Plug {
    node: Node,
    handle: PlugHandle,
    unit: Option<Unit>,
}

impl Plug {
    pub(crate) fn new(node: Node, handle: PlugHandle, unit: Option<Unit>) -> Self {
        Self { node, handle, unit }
    }

    /// Wrap a host plug handle, wrapping its node on the way
    pub(crate) fn from_handle(session: &Session, handle: PlugHandle) -> Result<Self> {
        let node = session.wrap(handle.node())?;
        Ok(Self::new(node, handle, None))
    }

    /// This plug, reading and writing in `unit`
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn handle(&self) -> &PlugHandle {
        &self.handle
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    fn host(&self) -> &dyn Host {
        &*self.node.shared().host
    }

    fn info(&self) -> Result<PlugInfo> {
        self.node.ensure_alive()?;
        Ok(self.host().plug_info(&self.handle)?)
    }

    /// `node.attr` for diagnostics, usable even after the node died
    fn describe(&self) -> String {
        let attr = self
            .host()
            .plug_info(&self.handle)
            .map(|i| i.path)
            .unwrap_or_else(|_| format!("{:?}", self.handle.attribute()));
        format!("{}.{}", self.node.inner().last_path(), attr)
    }

    fn type_error(&self, reason: impl Into<String>) -> Error {
        Error::Type {
            path: self.describe(),
            reason: reason.into(),
        }
    }

    // ========================================================================
    // Description
    // ========================================================================

    /// Full path, e.g. `|root|arm.translateX`
    pub fn path(&self) -> Result<String> {
        let info = self.info()?;
        Ok(format!("{}.{}", self.node.path()?, info.path))
    }

    /// Long attribute path, or the short name
    pub fn name(&self, long: bool) -> Result<String> {
        let info = self.info()?;
        Ok(if long { info.path } else { info.name })
    }

    pub fn type_name(&self) -> Result<String> {
        Ok(self.info()?.type_name)
    }

    pub fn writable(&self) -> Result<bool> {
        let info = self.info()?;
        Ok(info.writable && !info.locked)
    }

    pub fn is_array(&self) -> Result<bool> {
        Ok(self.info()?.is_array)
    }

    pub fn is_compound(&self) -> Result<bool> {
        Ok(self.info()?.is_compound)
    }

    /// Physical dimension of this plug's values
    ///
    /// A compound has one when all of its children share it.
    pub fn unit_kind(&self) -> Result<Option<UnitKind>> {
        let info = self.info()?;
        if info.unit.is_some() || !info.is_compound || info.is_array {
            return Ok(info.unit);
        }

        let mut kind = None;
        for index in 0..info.child_count {
            let child = self.host().plug_child(&self.handle, index)?;
            match (kind, self.host().plug_info(&child)?.unit) {
                (_, None) => return Ok(None),
                (None, found) => kind = found,
                (Some(a), Some(b)) if a != b => return Ok(None),
                _ => {}
            }
        }
        Ok(kind)
    }

    fn check_unit(&self, unit: Unit) -> Result<()> {
        match self.unit_kind()? {
            Some(kind) if kind == unit.kind() => Ok(()),
            Some(kind) => Err(self.type_error(format!(
                "{} is not a {:?} unit",
                unit, kind
            ))),
            None => Err(self.type_error(format!("attribute has no unit, cannot read in {}", unit))),
        }
    }

    // ========================================================================
    // Reading
    // ========================================================================

    pub fn read(&self) -> Result<Value> {
        self.read_with(Read::default())
    }

    pub fn read_as(&self, unit: Unit) -> Result<Value> {
        self.read_with(Read::in_unit(unit))
    }

    /// Evaluate at `time` without changing the host's current time
    pub fn read_at(&self, time: f64) -> Result<Value> {
        self.read_with(Read::at(time))
    }

    /// Value of the last non-cached read, evaluating only if there was none
    pub fn read_cached(&self) -> Result<Value> {
        self.read_with(Read::cached())
    }

    pub fn read_with(&self, options: Read) -> Result<Value> {
        self.node.ensure_alive()?;
        let unit = options.unit.or(self.unit);
        let key = (self.handle.clone(), unit);

        if options.cached {
            let cached = self.node.inner().state.lock().values.get(&key).cloned();
            if let Some(value) = cached {
                return Ok(value);
            }
        }

        let _timing = self.node.shared().timing("read");
        let raw = self.host().read_plug(&self.handle, options.time).map_err(|e| {
            log::error!("Failed to read {}: {}", self.describe(), e);
            Error::from(e)
        })?;

        let value = match unit {
            Some(unit) => {
                self.check_unit(unit)?;
                raw.map_numeric(&|v| unit.from_native(v))
            }
            None => raw,
        };

        self.node
            .inner()
            .state
            .lock()
            .values
            .insert(key, value.clone());
        Ok(value)
    }

    /// Read as a float
    pub fn as_double(&self) -> Result<f64> {
        let value = self.read()?;
        value
            .as_float()
            .ok_or_else(|| self.type_error(format!("{} is not numeric", value.type_name())))
    }

    pub fn default_value(&self) -> Result<Value> {
        self.node.ensure_alive()?;
        let value = self.host().default_value(&self.handle)?;
        match self.unit {
            Some(unit) => {
                self.check_unit(unit)?;
                Ok(value.map_numeric(&|v| unit.from_native(v)))
            }
            None => Ok(value),
        }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    pub fn write(&self, value: impl Into<Value>) -> Result<()> {
        self.write_with(value, None)
    }

    pub fn write_as(&self, value: impl Into<Value>, unit: Unit) -> Result<()> {
        self.write_with(value, Some(unit))
    }

    /// Convert a value in this plug's unit to the host's native unit
    pub(crate) fn to_native(&self, value: Value) -> Result<Value> {
        match self.unit {
            Some(unit) => {
                self.check_unit(unit)?;
                Ok(value.map_numeric(&|v| unit.to_native(v)))
            }
            None => Ok(value),
        }
    }

    fn write_with(&self, value: impl Into<Value>, unit: Option<Unit>) -> Result<()> {
        self.node.ensure_alive()?;
        let _timing = self.node.shared().timing("write");

        let mut value = value.into();
        if let Some(unit) = unit.or(self.unit) {
            self.check_unit(unit)?;
            value = value.map_numeric(&|v| unit.to_native(v));
        }

        self.host().write_plug(&self.handle, &value).map_err(|e| {
            log::error!("Failed to write {}: {}", self.describe(), e);
            Error::from(e)
        })
    }

    /// Animate this plug from `(time, value)` pairs
    ///
    /// Reuses the curve already driving the plug, or creates and connects
    /// one matching the plug's unit. Keys are inserted in ascending time;
    /// for duplicate times the last pair given wins. Runs as one undoable
    /// batch and returns the curve.
    pub fn write_keys(
        &self,
        keys: impl IntoIterator<Item = (f64, f64)>,
        interpolation: Interpolation,
    ) -> Result<AnimCurve> {
        let info = self.info()?;
        if info.is_array || info.is_compound || !is_numeric_type(&info.type_name) {
            return Err(self.type_error(format!("cannot animate a {} attribute", info.type_name)));
        }
        let kind = self.unit_kind()?;
        if let Some(unit) = self.unit {
            self.check_unit(unit)?;
        }

        let mut keys: Vec<(f64, f64)> = keys.into_iter().collect();
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(unit) = self.unit {
            for (_, value) in keys.iter_mut() {
                *value = unit.to_native(*value);
            }
        }

        let existing = self
            .source()?
            .and_then(|source| source.node().as_anim_curve());

        self.node.session().transaction(|m| {
            let curve = match existing {
                Some(curve) => curve,
                None => {
                    let created = m.create_node(curve_type(kind), None)?;
                    let curve = created.as_anim_curve().ok_or_else(|| {
                        self.type_error(format!("{} is not an animation curve", curve_type(kind)))
                    })?;
                    m.connect(&curve.output()?, self, false)?;
                    curve
                }
            };
            for (time, value) in keys {
                m.set_key(&curve, time, value, interpolation)?;
            }
            Ok(curve)
        })
    }

    /// Restore the attribute default as one undoable step
    pub fn reset(&self) -> Result<()> {
        single(&self.node.session(), |m| m.reset_attr(self))
    }

    pub fn lock(&self) -> Result<()> {
        self.set_locked(true)
    }

    pub fn unlock(&self) -> Result<()> {
        self.set_locked(false)
    }

    fn set_locked(&self, locked: bool) -> Result<()> {
        self.node.ensure_alive()?;
        Ok(self.host().set_plug_locked(&self.handle, locked)?)
    }

    pub fn locked(&self) -> Result<bool> {
        Ok(self.info()?.locked)
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Connect this plug into `destination`
    ///
    /// Fails with [`Error::Connection`] when `destination` already has an
    /// incoming connection, unless `force` replaces it.
    pub fn connect(&self, destination: &Plug, force: bool) -> Result<()> {
        single(&self.node.session(), |m| m.connect(self, destination, force))
    }

    /// Break connections, returning how many were broken
    ///
    /// `source` covers incoming connections and `destination` outgoing
    /// ones. With `other`, only connections between the two plugs count,
    /// and finding none is an error.
    pub fn disconnect(&self, other: Option<&Plug>, source: bool, destination: bool) -> Result<usize> {
        single(&self.node.session(), |m| {
            m.disconnect(self, other, source, destination)
        })
    }

    pub fn connections(&self, source: bool, destination: bool) -> Result<Plugs> {
        self.node.ensure_alive()?;
        let handles = self.host().connected_to(&self.handle, source, destination)?;
        Ok(Plugs::new(self.node.session(), handles))
    }

    pub fn connection(&self, source: bool, destination: bool) -> Result<Option<Plug>> {
        Ok(self.connections(source, destination)?.next())
    }

    /// The plug feeding this one
    pub fn source(&self) -> Result<Option<Plug>> {
        self.connection(true, false)
    }

    pub fn connected(&self) -> Result<bool> {
        self.node.ensure_alive()?;
        Ok(!self.host().connected_to(&self.handle, true, true)?.is_empty())
    }

    // ========================================================================
    // Arrays and compounds
    // ========================================================================

    fn existing_indices(&self) -> Result<Vec<u32>> {
        self.node.ensure_alive()?;
        Ok(self.host().existing_indices(&self.handle)?)
    }

    /// First logical index at or after `start` holding neither a value nor
    /// a connection
    ///
    /// Linear in the number of existing elements.
    pub fn next_available_index(&self, start: u32) -> Result<u32> {
        let existing: HashSet<u32> = self.existing_indices()?.into_iter().collect();
        let mut index = start;
        while existing.contains(&index) {
            index = self.index_after(index)?;
        }
        Ok(index)
    }

    fn index_after(&self, index: u32) -> Result<u32> {
        index
            .checked_add(1)
            .ok_or_else(|| self.type_error(format!("index after {} out of range", index)))
    }

    /// Element `index` of an array; negative indices count back from the
    /// last existing element
    pub fn element(&self, index: i64) -> Result<Plug> {
        let info = self.info()?;
        if !info.is_array {
            return Err(self.type_error(format!("{} is not an array", info.path)));
        }

        let logical = if index >= 0 {
            u32::try_from(index).map_err(|_| self.type_error(format!("index {} out of range", index)))?
        } else {
            let existing = self.existing_indices()?;
            let position = existing.len() as i64 + index;
            usize::try_from(position)
                .ok()
                .and_then(|p| existing.get(p).copied())
                .ok_or_else(|| Error::NotFound {
                    path: format!("{}[{}]", self.describe(), index),
                })?
        };

        Ok(Self::new(self.node.clone(), self.handle.element(logical), self.unit))
    }

    /// Child `index` of a compound
    pub fn child(&self, index: usize) -> Result<Plug> {
        self.node.ensure_alive()?;
        let handle = self.host().plug_child(&self.handle, index)?;
        Ok(Self::new(self.node.clone(), handle, self.unit))
    }

    /// Child of a compound by long or short name
    pub fn child_named(&self, name: &str) -> Result<Plug> {
        let info = self.info()?;
        if !info.is_compound {
            return Err(self.type_error(format!("{} is not a compound", info.path)));
        }
        let plug = self.node.attribute(&format!("{}.{}", info.path, name))?;
        Ok(match self.unit {
            Some(unit) => plug.with_unit(unit),
            None => plug,
        })
    }

    /// Existing elements of an array, or the children of a compound
    pub fn elements(&self) -> Result<Vec<Plug>> {
        let info = self.info()?;
        if info.is_array {
            return Ok(self
                .existing_indices()?
                .into_iter()
                .map(|i| Self::new(self.node.clone(), self.handle.element(i), self.unit))
                .collect());
        }
        if info.is_compound {
            return (0..info.child_count).map(|i| self.child(i)).collect();
        }
        Err(self.type_error(format!("{} is neither an array nor a compound", info.path)))
    }

    pub fn count(&self) -> Result<usize> {
        let info = self.info()?;
        if info.is_array {
            Ok(self.existing_indices()?.len())
        } else if info.is_compound {
            Ok(info.child_count)
        } else {
            Err(self.type_error(format!("{} is neither an array nor a compound", info.path)))
        }
    }

    /// Write `value` one past the last existing element
    pub fn append(&self, value: impl Into<Value>) -> Result<Plug> {
        let index = match self.existing_indices()?.last() {
            Some(&last) => self.index_after(last)?,
            None => 0,
        };
        let element = self.element(i64::from(index))?;
        element.write(value)?;
        Ok(element)
    }

    /// Write `value` into the first free element
    pub fn append_autofill(&self, value: impl Into<Value>) -> Result<Plug> {
        let index = self.next_available_index(0)?;
        let element = self.element(i64::from(index))?;
        element.write(value)?;
        Ok(element)
    }

    pub fn extend<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        for value in values {
            self.append(value)?;
        }
        Ok(())
    }
}

impl PartialEq for Plug {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl fmt::Debug for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plug")
            .field("path", &self.describe())
            .field("unit", &self.unit)
            .finish()
    }
}

impl fmt::Display for Plug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Lazy sequence of plugs captured when created
pub struct Plugs {
    session: Session,
    handles: std::vec::IntoIter<PlugHandle>,
}

impl Plugs {
    pub(crate) fn new(session: Session, handles: Vec<PlugHandle>) -> Self {
        Self {
            session,
            handles: handles.into_iter(),
        }
    }
}

impl Iterator for Plugs {
    type Item = Plug;

    fn next(&mut self) -> Option<Plug> {
        for handle in self.handles.by_ref() {
            match Plug::from_handle(&self.session, handle) {
                Ok(plug) => return Some(plug),
                Err(e) => log::debug!("Skipping plug: {}", e),
            }
        }
        None
    }
}
