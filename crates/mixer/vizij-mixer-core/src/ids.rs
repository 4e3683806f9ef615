//! Source identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeHandle;

/// Identity of a source inside a layer.
///
/// Dynamic sources take their id from the node they wrap: the node's
/// generation is packed into the high 32 bits, so an id stays unique even
/// after the graph reuses the node's arena slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl SourceId {
    #[inline]
    pub const fn from_node(node: NodeHandle) -> Self {
        Self(((node.generation as u64) << 32) | node.index as u64)
    }
}

impl From<NodeHandle> for SourceId {
    fn from(node: NodeHandle) -> Self {
        Self::from_node(node)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}:{}", self.0 >> 32, self.0 & 0xffff_ffff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_slot_yields_distinct_id() {
        let first = SourceId::from(NodeHandle::new(3, 0));
        let reused = SourceId::from(NodeHandle::new(3, 1));
        assert_ne!(first, reused);
        assert_eq!(first, SourceId::from_node(NodeHandle::new(3, 0)));
        assert_eq!(reused.to_string(), "src#1:3");
    }
}
