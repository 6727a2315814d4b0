//! Opaque handles into host-owned scene state
//!
//! Handles use generational indices so a host can detect use of a
//! reference that outlived the entity it pointed to. The generation is
//! part of equality; the host-provided hash code is not required to be.

use core::fmt;
use core::hash::{Hash, Hasher};

/// A reference to a scene node owned by the host
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeHandle {
    /// Lower 32 bits: index, Upper 32 bits: generation
    bits: u64,
}

impl NodeHandle {
    /// Create a new handle from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
        }
    }

    /// Create a null/invalid handle
    #[inline]
    pub const fn null() -> Self {
        Self { bits: u64::MAX }
    }

    /// Check if this handle is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.bits == u64::MAX
    }

    /// Get the index portion
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Get the generation portion
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Get the raw bits
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }
}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NodeHandle(null)")
        } else {
            write!(f, "NodeHandle({}v{})", self.index(), self.generation())
        }
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::null()
    }
}

/// A slot in a node's attribute table
///
/// The generation is bumped whenever the slot is reused, so a handle
/// resolved before an attribute was removed never aliases its successor.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeId {
    index: u32,
    generation: u32,
}

impl AttributeId {
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attr({}v{})", self.index, self.generation)
    }
}

/// A resolved attribute on a node, optionally narrowed to array elements
///
/// `elements` holds one logical index per array attribute on the path
/// from the root attribute down to `attribute`. A plug whose own
/// attribute is an array but carries one index fewer refers to the whole
/// array rather than an element of it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PlugHandle {
    node: NodeHandle,
    attribute: AttributeId,
    elements: Vec<u32>,
}

impl PlugHandle {
    pub fn new(node: NodeHandle, attribute: AttributeId) -> Self {
        Self {
            node,
            attribute,
            elements: Vec::new(),
        }
    }

    pub fn with_elements(node: NodeHandle, attribute: AttributeId, elements: Vec<u32>) -> Self {
        Self {
            node,
            attribute,
            elements,
        }
    }

    /// The node this plug lives on
    #[inline]
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    /// The attribute slot this plug addresses
    #[inline]
    pub fn attribute(&self) -> AttributeId {
        self.attribute
    }

    /// Logical element indices along the attribute path
    #[inline]
    pub fn elements(&self) -> &[u32] {
        &self.elements
    }

    /// Narrow this plug to element `index` of its array
    pub fn element(&self, index: u32) -> Self {
        let mut elements = self.elements.clone();
        elements.push(index);
        Self {
            node: self.node,
            attribute: self.attribute,
            elements,
        }
    }
}

impl fmt::Debug for PlugHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plug({:?}, {:?}, {:?})", self.node, self.attribute, self.elements)
    }
}

/// Identifies one destruction subscription installed on the host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);
