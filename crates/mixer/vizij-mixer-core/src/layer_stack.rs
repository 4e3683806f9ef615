//! LayerStack: ordered layers composed by one layered composition node.
//!
//! Layer `i` feeds input port `i` of the root node. Each layer carries its own
//! contribution weight, filtered toward 1 while the layer has something to
//! play and toward 0 once its track reports completion.

use log::debug;

use crate::config::{smoothing_alpha, MixerConfig};
use crate::error::{keep_first, MixerError};
use crate::events::{EventLog, MixerEvent};
use crate::graph::{BoneMask, NodeHandle, PoseGraph};
use crate::ids::SourceId;
use crate::model::OutputModel;
use crate::slot_track::{PlayStatus, SlotTrack};

/// One layer: a track plus its contribution to the final blend.
#[derive(Debug)]
pub struct Layer {
    track: SlotTrack,
    target_weight: f32,
    smoothed_weight: f32,
}

impl Layer {
    pub fn track(&self) -> &SlotTrack {
        &self.track
    }

    pub fn target_weight(&self) -> f32 {
        self.target_weight
    }

    /// Weight currently written to the root node for this layer.
    pub fn smoothed_weight(&self) -> f32 {
        self.smoothed_weight
    }
}

#[derive(Debug)]
pub struct LayerStack {
    root: NodeHandle,
    layers: Vec<Layer>,
    cfg: MixerConfig,
}

impl LayerStack {
    /// Create the root layered node, make it the graph output and add layer 0.
    pub fn new<G: PoseGraph + ?Sized>(
        graph: &mut G,
        cfg: &MixerConfig,
        events: &mut EventLog,
    ) -> Result<Self, MixerError> {
        let root = graph.create_layer_mixer(0);
        graph.set_output(root)?;
        let mut stack = Self {
            root,
            layers: Vec::new(),
            cfg: cfg.sanitized(),
        };
        stack.add_layer(graph, events)?;
        Ok(stack)
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Append a layer with full contribution weight and return its index.
    pub fn add_layer<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        events: &mut EventLog,
    ) -> Result<usize, MixerError> {
        let max = self.cfg.max_layers;
        if self.layers.len() >= max {
            return Err(MixerError::LayerLimit { max });
        }
        let index = self.layers.len();
        let track = SlotTrack::new(graph, index, &self.cfg);
        graph.set_input_count(self.root, index + 1)?;
        graph.connect(track.mixer_node(), 0, self.root, index)?;
        graph.set_input_weight(self.root, index, 1.0)?;
        self.layers.push(Layer {
            track,
            target_weight: 1.0,
            smoothed_weight: 1.0,
        });
        debug!("added layer {index}");
        events.push(MixerEvent::LayerAdded { layer: index });
        Ok(index)
    }

    /// Grow the stack until `layer` exists.
    fn ensure_layer<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        events: &mut EventLog,
    ) -> Result<&mut Layer, MixerError> {
        while self.layers.len() <= layer {
            self.add_layer(graph, events)?;
        }
        Ok(&mut self.layers[layer])
    }

    fn check_layer(&self, layer: usize) -> Result<(), MixerError> {
        if layer < self.layers.len() {
            Ok(())
        } else {
            Err(MixerError::LayerOutOfRange {
                layer,
                count: self.layers.len(),
            })
        }
    }

    pub fn set_layer_mask<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        mask: BoneMask,
    ) -> Result<(), MixerError> {
        self.check_layer(layer)?;
        graph.set_layer_mask(self.root, layer, mask)?;
        Ok(())
    }

    pub fn set_layer_additive<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        additive: bool,
    ) -> Result<(), MixerError> {
        self.check_layer(layer)?;
        graph.set_layer_additive(self.root, layer, additive)?;
        Ok(())
    }

    pub fn add_static<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        id: SourceId,
        node: NodeHandle,
        model: OutputModel,
        events: &mut EventLog,
    ) -> Result<PlayStatus, MixerError> {
        let entry = self.ensure_layer(graph, layer, events)?;
        entry.track.add_static(graph, id, node, model, events)
    }

    pub fn play_dynamic<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        node: NodeHandle,
        model: OutputModel,
        events: &mut EventLog,
    ) -> Result<PlayStatus, MixerError> {
        let entry = self.ensure_layer(graph, layer, events)?;
        entry.track.play_dynamic(graph, node, model, events)
    }

    pub fn play<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        id: SourceId,
        force: bool,
        events: &mut EventLog,
    ) -> Result<PlayStatus, MixerError> {
        let entry = self.ensure_layer(graph, layer, events)?;
        let status = entry.track.play(graph, id, force)?;
        if let Some(reason) = status.reject_reason() {
            events.push(MixerEvent::PlayRejected { layer, reason });
        }
        Ok(status)
    }

    pub fn update_model<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        layer: usize,
        id: SourceId,
        model: OutputModel,
        events: &mut EventLog,
    ) -> Result<(), MixerError> {
        self.ensure_layer(graph, layer, events)?
            .track
            .update_model(id, model)
    }

    pub fn is_current(&self, layer: usize, id: SourceId) -> bool {
        self.layers
            .get(layer)
            .is_some_and(|l| l.track.is_current(id))
    }

    /// Per-tick weight pass: source fades, then each layer's contribution.
    pub fn evaluate<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        dt: f32,
    ) -> Result<(), MixerError> {
        let alpha = smoothing_alpha(self.cfg.layer_smoothing_rate, dt);
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.track.on_evaluate(graph, dt)?;
            layer.smoothed_weight += (layer.target_weight - layer.smoothed_weight) * alpha;
            graph.set_input_weight(self.root, index, layer.smoothed_weight)?;
        }
        Ok(())
    }

    /// Post-tick pass: reclaim finished sources and retarget layer weights.
    pub fn post_update<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        events: &mut EventLog,
    ) -> Result<(), MixerError> {
        for layer in self.layers.iter_mut() {
            layer.track.on_post_update(graph, events)?;
            layer.target_weight = if layer.track.is_completed(graph)? {
                0.0
            } else {
                1.0
            };
        }
        Ok(())
    }

    /// Tear down every node the stack created, root last. Best effort: the
    /// first failure is reported once everything else has been released.
    pub(crate) fn shutdown<G: PoseGraph + ?Sized>(self, graph: &mut G) -> Result<(), MixerError> {
        let mut first = None;
        for (index, layer) in self.layers.into_iter().enumerate() {
            keep_first(&mut first, graph.disconnect(self.root, index));
            keep_first(&mut first, layer.track.shutdown(graph));
        }
        keep_first(&mut first, graph.destroy_node(self.root));
        first.map_or(Ok(()), Err)
    }
}
