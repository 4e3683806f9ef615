//! Boundary with the host pose graph.
//!
//! The mixer never evaluates poses itself. It routes every structural change
//! (connect, disconnect, destroy) and every weight write through a
//! [`PoseGraph`] implementation owned by the caller's host runtime. The
//! reference implementation lives in [`crate::blend_graph`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Generation-tagged handle to a node in a pose graph.
///
/// `index` addresses an arena slot; `generation` is bumped each time the slot
/// is freed so that a handle kept past `destroy_node` never aliases a newer node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub index: u32,
    pub generation: u32,
}

impl NodeHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Errors surfaced by a pose graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node {0:?} is not alive in this graph")]
    InvalidNode(NodeHandle),
    #[error("port {port} is out of range for node {node:?} ({count} ports)")]
    PortOutOfRange {
        node: NodeHandle,
        port: usize,
        count: usize,
    },
    #[error("connecting {source_node:?} into {target:?} would create a cycle")]
    Cycle {
        source_node: NodeHandle,
        target: NodeHandle,
    },
    #[error("node {node:?} does not support `{operation}`")]
    Unsupported {
        node: NodeHandle,
        operation: &'static str,
    },
}

/// Per-channel influence of a layer. Channels beyond the mask length get zero influence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneMask {
    pub weights: Vec<f32>,
}

impl BoneMask {
    /// Mask where every channel has full influence.
    pub fn full(channels: usize) -> Self {
        Self {
            weights: vec![1.0; channels],
        }
    }

    /// Mask enabling only the listed channels.
    pub fn from_channels(channels: usize, enabled: &[usize]) -> Self {
        let mut weights = vec![0.0; channels];
        for &c in enabled {
            if let Some(w) = weights.get_mut(c) {
                *w = 1.0;
            }
        }
        Self { weights }
    }

    #[inline]
    pub fn weight(&self, channel: usize) -> f32 {
        self.weights.get(channel).copied().unwrap_or(0.0)
    }
}

/// Operations the mixer needs from a host pose graph.
///
/// Port `0` is the single output port of every node. Handles passed in must
/// come from the same graph instance.
pub trait PoseGraph {
    /// Create a weighted-sum composition node with `input_count` input ports.
    fn create_mixer(&mut self, input_count: usize) -> NodeHandle;

    /// Create a layered composition node (mask / additive capable).
    fn create_layer_mixer(&mut self, input_count: usize) -> NodeHandle;

    /// Make `node` the root that `evaluate` samples.
    fn set_output(&mut self, node: NodeHandle) -> Result<(), GraphError>;

    fn connect(
        &mut self,
        source: NodeHandle,
        source_port: usize,
        target: NodeHandle,
        target_port: usize,
    ) -> Result<(), GraphError>;

    fn disconnect(&mut self, target: NodeHandle, input_port: usize) -> Result<(), GraphError>;

    fn input_count(&self, node: NodeHandle) -> Result<usize, GraphError>;

    fn set_input_count(&mut self, node: NodeHandle, count: usize) -> Result<(), GraphError>;

    fn set_input_weight(
        &mut self,
        node: NodeHandle,
        input_port: usize,
        weight: f32,
    ) -> Result<(), GraphError>;

    fn destroy_node(&mut self, node: NodeHandle) -> Result<(), GraphError>;

    /// Advance node time cursors by `dt` and compose the output pose.
    fn evaluate(&mut self, dt: f32) -> Result<(), GraphError>;

    fn set_time(&mut self, node: NodeHandle, time: f32) -> Result<(), GraphError>;

    fn duration(&self, node: NodeHandle) -> Result<f32, GraphError>;

    fn set_speed(&mut self, node: NodeHandle, speed: f32) -> Result<(), GraphError>;

    fn set_layer_mask(
        &mut self,
        node: NodeHandle,
        layer: usize,
        mask: BoneMask,
    ) -> Result<(), GraphError>;

    fn set_layer_additive(
        &mut self,
        node: NodeHandle,
        layer: usize,
        additive: bool,
    ) -> Result<(), GraphError>;
}
