//! Vizij Mixer Core (engine-agnostic)
//!
//! Layered playable mixing and weight scheduling. A [`Mixer`] owns a host
//! [`PoseGraph`] and, every tick, decides which animation sources are active
//! in each layer, how their blend weights evolve, when transient sources are
//! reclaimed and how much each layer contributes to the final pose.
//!
//! The crate defines the pose-graph boundary, a reference in-memory graph
//! ([`BlendGraph`]), per-layer tracks, the layer stack and the two-phase tick
//! protocol (`advance` then `reconcile`).

pub mod blend_graph;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod ids;
pub mod layer_stack;
pub mod model;
pub mod scheduler;
pub mod slot_track;
pub mod transition;

// Re-exports for consumers (adapters)
pub use blend_graph::{BlendGraph, Clip, Pose};
pub use config::{EvaluationRate, MixerConfig};
pub use error::{MixerError, ShutdownError};
pub use events::{EventLog, MixerEvent, RejectReason};
pub use graph::{BoneMask, GraphError, NodeHandle, PoseGraph};
pub use ids::SourceId;
pub use layer_stack::{Layer, LayerStack};
pub use model::{OutputModel, SourceDescriptor, SourceKind};
pub use scheduler::{EvaluationClock, Mixer};
pub use slot_track::{PlayStatus, SlotTrack};
pub use transition::TransitionSetting;
