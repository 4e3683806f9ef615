//! Mixer: per-tick scheduling over a [`LayerStack`] and the pose graph it drives.
//!
//! Hosts call the two phases once per simulation step, in this order:
//! - [`Mixer::advance`]: source fades → layer smoothing → (throttled) graph evaluation
//! - [`Mixer::reconcile`]: reclaim faded dynamic sources → retarget layer weights
//!
//! Reclamation runs only after the tick's evaluation has consumed the weights,
//! so a node is never destroyed while its output is still part of the frame.

use crate::config::{EvaluationRate, MixerConfig};
use crate::error::{MixerError, ShutdownError};
use crate::events::{EventLog, MixerEvent};
use crate::graph::{BoneMask, NodeHandle, PoseGraph};
use crate::ids::SourceId;
use crate::layer_stack::{Layer, LayerStack};
use crate::model::OutputModel;
use crate::slot_track::{PlayStatus, SlotTrack};
use crate::transition::TransitionSetting;

/// Decides which ticks trigger a graph evaluation and with what delta.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EvaluationClock {
    interval: Option<f32>,
    accumulated: f32,
}

impl EvaluationClock {
    pub fn new(rate: EvaluationRate) -> Self {
        Self {
            interval: rate.interval(),
            accumulated: 0.0,
        }
    }

    /// Feed one tick; returns the delta to evaluate with, if this tick evaluates.
    pub fn tick(&mut self, dt: f32) -> Option<f32> {
        let Some(interval) = self.interval else {
            return Some(dt);
        };
        self.accumulated += dt;
        if self.accumulated > interval {
            let elapsed = self.accumulated;
            self.accumulated = 0.0;
            Some(elapsed)
        } else {
            None
        }
    }
}

/// Layered mixer bound to the pose graph it owns.
#[derive(Debug)]
pub struct Mixer<G: PoseGraph> {
    graph: G,
    stack: LayerStack,
    cfg: MixerConfig,
    clock: EvaluationClock,
    events: EventLog,
}

#[inline]
fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt
    } else {
        0.0
    }
}

impl<G: PoseGraph> Mixer<G> {
    /// Build the layer stack inside `graph`; layer 0 exists afterwards.
    ///
    /// `cfg` is sanitized first; see [`MixerConfig::sanitized`].
    pub fn new(mut graph: G, cfg: MixerConfig) -> Result<Self, MixerError> {
        let cfg = cfg.sanitized();
        let mut events = EventLog::with_capacity(cfg.max_pending_events);
        let stack = LayerStack::new(&mut graph, &cfg, &mut events)?;
        Ok(Self {
            graph,
            stack,
            clock: EvaluationClock::new(cfg.evaluation_rate),
            cfg,
            events,
        })
    }

    pub fn config(&self) -> &MixerConfig {
        &self.cfg
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Direct graph access for node creation and host-side queries.
    ///
    /// Nodes registered with the mixer must only be torn down by the mixer.
    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn root_node(&self) -> NodeHandle {
        self.stack.root()
    }

    pub fn layer_count(&self) -> usize {
        self.stack.len()
    }

    pub fn layer(&self, index: usize) -> Option<&SlotTrack> {
        self.stack.layer(index).map(Layer::track)
    }

    /// Smoothed contribution weight of a layer.
    pub fn layer_weight(&self, index: usize) -> Option<f32> {
        self.stack.layer(index).map(Layer::smoothed_weight)
    }

    pub fn layer_target_weight(&self, index: usize) -> Option<f32> {
        self.stack.layer(index).map(Layer::target_weight)
    }

    pub fn set_evaluation_rate(&mut self, rate: EvaluationRate) {
        self.cfg.evaluation_rate = rate;
        self.clock = EvaluationClock::new(rate);
    }

    pub fn add_layer(&mut self) -> Result<usize, MixerError> {
        self.stack.add_layer(&mut self.graph, &mut self.events)
    }

    pub fn set_layer_mask(&mut self, layer: usize, mask: BoneMask) -> Result<(), MixerError> {
        self.stack.set_layer_mask(&mut self.graph, layer, mask)
    }

    pub fn set_layer_additive(&mut self, layer: usize, additive: bool) -> Result<(), MixerError> {
        self.stack.set_layer_additive(&mut self.graph, layer, additive)
    }

    pub fn add_static(
        &mut self,
        id: SourceId,
        node: NodeHandle,
        model: OutputModel,
        layer: usize,
    ) -> Result<PlayStatus, MixerError> {
        self.stack
            .add_static(&mut self.graph, layer, id, node, model, &mut self.events)
    }

    pub fn play_dynamic(
        &mut self,
        node: NodeHandle,
        model: OutputModel,
        layer: usize,
    ) -> Result<PlayStatus, MixerError> {
        self.stack
            .play_dynamic(&mut self.graph, layer, node, model, &mut self.events)
    }

    pub fn play(&mut self, id: SourceId, force: bool, layer: usize) -> Result<PlayStatus, MixerError> {
        self.stack
            .play(&mut self.graph, layer, id, force, &mut self.events)
    }

    pub fn is_current(&self, id: SourceId, layer: usize) -> bool {
        self.stack.is_current(layer, id)
    }

    pub fn current(&self, layer: usize) -> Option<SourceId> {
        self.layer(layer).and_then(SlotTrack::current)
    }

    pub fn update_model(
        &mut self,
        id: SourceId,
        model: OutputModel,
        layer: usize,
    ) -> Result<(), MixerError> {
        self.stack
            .update_model(&mut self.graph, layer, id, model, &mut self.events)
    }

    /// Register a static clip source, applying the setting's playback speed first.
    pub fn add_clip_static(
        &mut self,
        id: SourceId,
        node: NodeHandle,
        setting: &TransitionSetting,
        layer: usize,
    ) -> Result<PlayStatus, MixerError> {
        self.apply_clip_speed(node, setting)?;
        self.add_static(id, node, setting.to_model(), layer)
    }

    /// Play a dynamic clip source, applying the setting's playback speed first.
    pub fn play_clip_dynamic(
        &mut self,
        node: NodeHandle,
        setting: &TransitionSetting,
        layer: usize,
    ) -> Result<PlayStatus, MixerError> {
        self.apply_clip_speed(node, setting)?;
        self.play_dynamic(node, setting.to_model(), layer)
    }

    fn apply_clip_speed(
        &mut self,
        node: NodeHandle,
        setting: &TransitionSetting,
    ) -> Result<(), MixerError> {
        let length = self.graph.duration(node)?;
        self.graph.set_speed(node, setting.playback_speed(length))?;
        Ok(())
    }

    /// First tick phase: fades, layer weights, then graph evaluation when the clock allows.
    pub fn advance(&mut self, dt: f32) -> Result<(), MixerError> {
        let dt = sanitize_dt(dt);
        self.stack.evaluate(&mut self.graph, dt)?;
        if let Some(elapsed) = self.clock.tick(dt) {
            self.graph.evaluate(elapsed)?;
            self.events.push(MixerEvent::GraphEvaluated { dt: elapsed });
        }
        Ok(())
    }

    /// Second tick phase: reclamation and layer retargeting.
    pub fn reconcile(&mut self) -> Result<(), MixerError> {
        self.stack.post_update(&mut self.graph, &mut self.events)
    }

    /// `advance` followed by `reconcile`.
    pub fn tick(&mut self, dt: f32) -> Result<(), MixerError> {
        self.advance(dt)?;
        self.reconcile()
    }

    pub fn events(&self) -> &[MixerEvent] {
        self.events.events()
    }

    pub fn dropped_events(&self) -> usize {
        self.events.dropped()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = MixerEvent> + '_ {
        self.events.drain()
    }

    /// Destroy every node the mixer created or adopted and return the graph.
    ///
    /// The graph comes back on failure too, inside [`ShutdownError`].
    pub fn shutdown(mut self) -> Result<G, ShutdownError<G>> {
        match self.stack.shutdown(&mut self.graph) {
            Ok(()) => Ok(self.graph),
            Err(error) => Err(ShutdownError {
                graph: self.graph,
                error,
            }),
        }
    }
}
