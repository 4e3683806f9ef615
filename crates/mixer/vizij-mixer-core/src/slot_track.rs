//! SlotTrack: the set of concurrently blended sources in one layer.
//!
//! A track owns one composition (mixer) node in the pose graph and assigns
//! each source one of its input ports. It schedules the linear fade of every
//! source toward or away from the single "current" source, filters those
//! weights before writing them to the graph, and reclaims dynamic sources
//! once a crossfade has finished.

use std::collections::VecDeque;

use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::config::{smoothing_alpha, MixerConfig};
use crate::error::{keep_first, MixerError};
use crate::events::{EventLog, MixerEvent, RejectReason};
use crate::graph::{NodeHandle, PoseGraph};
use crate::ids::SourceId;
use crate::model::{OutputModel, SourceDescriptor, SourceKind};

/// Outcome of a play or registration request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlayStatus {
    /// The source is now current.
    Started,
    /// The current source's exit-time hold is still active and the request was not forced.
    GatedByExitTime,
    /// Every input port of the layer's composition node is occupied.
    CapacityExceeded,
    /// A source with the same id already lives in this layer.
    AlreadyRegistered,
}

impl PlayStatus {
    #[inline]
    pub fn is_started(self) -> bool {
        self == PlayStatus::Started
    }

    pub(crate) fn reject_reason(self) -> Option<RejectReason> {
        match self {
            PlayStatus::Started => None,
            PlayStatus::GatedByExitTime => Some(RejectReason::GatedByExitTime),
            PlayStatus::CapacityExceeded => Some(RejectReason::CapacityExceeded),
            PlayStatus::AlreadyRegistered => Some(RejectReason::AlreadyRegistered),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Thresholds {
    smoothing_rate: f32,
    reclaim_weight: f32,
    saturation: f32,
}

#[derive(Debug)]
pub struct SlotTrack {
    layer: usize,
    mixer: NodeHandle,
    capacity: usize,
    /// Insertion-ordered; iteration order is composition order.
    sources: IndexMap<SourceId, SourceDescriptor>,
    recycled_ports: VecDeque<usize>,
    next_port: usize,
    current: Option<SourceId>,
    remaining_exit_time: f32,
    time_since_play: f32,
    has_static: bool,
    thresholds: Thresholds,
}

impl SlotTrack {
    /// Create a track backed by a fresh composition node with
    /// `cfg.layer_input_capacity` input ports.
    pub fn new<G: PoseGraph + ?Sized>(graph: &mut G, layer: usize, cfg: &MixerConfig) -> Self {
        let capacity = cfg
            .layer_input_capacity
            .min(MixerConfig::MAX_LAYER_INPUT_CAPACITY);
        let mixer = graph.create_mixer(capacity);
        Self {
            layer,
            mixer,
            capacity,
            sources: IndexMap::new(),
            recycled_ports: VecDeque::new(),
            next_port: 0,
            current: None,
            remaining_exit_time: 0.0,
            time_since_play: 0.0,
            has_static: false,
            thresholds: Thresholds {
                smoothing_rate: cfg.source_smoothing_rate,
                reclaim_weight: cfg.reclaim_weight_threshold,
                saturation: cfg.saturation_threshold,
            },
        }
    }

    /// The composition node this track writes its weights into.
    pub fn mixer_node(&self) -> NodeHandle {
        self.mixer
    }

    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Requested port count; the host node may expose fewer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn current(&self) -> Option<SourceId> {
        self.current
    }

    #[inline]
    pub fn is_current(&self, id: SourceId) -> bool {
        self.current == Some(id)
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceDescriptor> {
        self.sources.get(&id)
    }

    pub fn contains(&self, id: SourceId) -> bool {
        self.sources.contains_key(&id)
    }

    /// Live sources in composition order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> + '_ {
        self.sources.values()
    }

    pub fn remaining_exit_time(&self) -> f32 {
        self.remaining_exit_time
    }

    /// Seconds accumulated since the last successful play.
    pub fn time_since_play(&self) -> f32 {
        self.time_since_play
    }

    /// Ports freed by reclamation and waiting for reuse, oldest first.
    pub fn recycled_ports(&self) -> impl Iterator<Item = usize> + '_ {
        self.recycled_ports.iter().copied()
    }

    /// Ports actually available on the composition node, which a host may
    /// have created smaller than requested.
    fn port_limit<G: PoseGraph + ?Sized>(&self, graph: &G) -> Result<usize, MixerError> {
        Ok(graph.input_count(self.mixer)?.min(self.capacity))
    }

    fn allocate_port<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &G,
    ) -> Result<Option<usize>, MixerError> {
        if let Some(port) = self.recycled_ports.pop_front() {
            return Ok(Some(port));
        }
        if self.next_port < self.port_limit(graph)? {
            let port = self.next_port;
            self.next_port += 1;
            Ok(Some(port))
        } else {
            Ok(None)
        }
    }

    fn has_free_port<G: PoseGraph + ?Sized>(&self, graph: &G) -> Result<bool, MixerError> {
        Ok(!self.recycled_ports.is_empty() || self.next_port < self.port_limit(graph)?)
    }

    fn register<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        id: SourceId,
        node: NodeHandle,
        kind: SourceKind,
        model: OutputModel,
    ) -> Result<Option<usize>, MixerError> {
        if !self.has_free_port(&*graph)? {
            warn!(
                "layer {}: no free input port for {id} (capacity {})",
                self.layer, self.capacity
            );
            return Ok(None);
        }
        // Connect before claiming the port so a graph error leaves the pool intact.
        let port = self
            .recycled_ports
            .front()
            .copied()
            .unwrap_or(self.next_port);
        graph.connect(node, 0, self.mixer, port)?;
        graph.set_input_weight(self.mixer, port, 0.0)?;
        let claimed = self.allocate_port(&*graph)?;
        debug_assert_eq!(claimed, Some(port));
        self.sources
            .insert(id, SourceDescriptor::new(id, node, kind, model, port));
        Ok(Some(port))
    }

    /// Register a long-lived source and make it current.
    ///
    /// A duplicate id is left as it is and reported as
    /// [`PlayStatus::AlreadyRegistered`].
    pub fn add_static<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        id: SourceId,
        node: NodeHandle,
        model: OutputModel,
        events: &mut EventLog,
    ) -> Result<PlayStatus, MixerError> {
        if self.sources.contains_key(&id) {
            warn!("layer {}: static source {id} already registered", self.layer);
            return Ok(self.reject(PlayStatus::AlreadyRegistered, events));
        }
        let Some(port) = self.register(graph, id, node, SourceKind::Static, model)? else {
            return Ok(self.reject(PlayStatus::CapacityExceeded, events));
        };
        self.has_static = true;
        debug!("layer {}: static source {id} on port {port}", self.layer);
        events.push(MixerEvent::SourceStarted {
            layer: self.layer,
            id,
            kind: SourceKind::Static,
            port,
        });
        self.play(graph, id, true)
    }

    /// Register a transient source for `node`, make it current and rewind it.
    ///
    /// Only admitted once the current source's exit-time hold has run out. On
    /// rejection the node is left untouched and stays owned by the caller.
    pub fn play_dynamic<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        node: NodeHandle,
        model: OutputModel,
        events: &mut EventLog,
    ) -> Result<PlayStatus, MixerError> {
        if self.remaining_exit_time > 0.0 {
            trace!(
                "layer {}: dynamic request gated ({:.3}s exit time left)",
                self.layer,
                self.remaining_exit_time
            );
            return Ok(self.reject(PlayStatus::GatedByExitTime, events));
        }
        let id = SourceId::from(node);
        if self.sources.contains_key(&id) {
            warn!("layer {}: dynamic source {id} already registered", self.layer);
            return Ok(self.reject(PlayStatus::AlreadyRegistered, events));
        }
        if !self.has_free_port(&*graph)? {
            warn!(
                "layer {}: dropping dynamic request for {id}, all {} ports in use",
                self.layer, self.capacity
            );
            return Ok(self.reject(PlayStatus::CapacityExceeded, events));
        }
        let Some(port) = self.register(graph, id, node, SourceKind::Dynamic, model)? else {
            return Ok(self.reject(PlayStatus::CapacityExceeded, events));
        };
        self.time_since_play = 0.0;
        debug!("layer {}: dynamic source {id} on port {port}", self.layer);
        events.push(MixerEvent::SourceStarted {
            layer: self.layer,
            id,
            kind: SourceKind::Dynamic,
            port,
        });
        self.play(graph, id, true)
    }

    /// Make `id` current.
    ///
    /// Ignored while the exit-time hold is active unless `force` is set.
    pub fn play<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        id: SourceId,
        force: bool,
    ) -> Result<PlayStatus, MixerError> {
        let layer = self.layer;
        let source = self
            .sources
            .get(&id)
            .ok_or(MixerError::UnknownSource { id, layer })?;
        if !force && self.remaining_exit_time > 0.0 {
            trace!("layer {layer}: play {id} gated");
            return Ok(PlayStatus::GatedByExitTime);
        }
        if source.restarts_on_play() {
            graph.set_time(source.node, source.start_offset)?;
        }
        self.remaining_exit_time = source.exit_time;
        self.time_since_play = 0.0;
        self.current = Some(id);
        Ok(PlayStatus::Started)
    }

    /// Live-patch a source's model; identity, port and weights are kept.
    pub fn update_model(&mut self, id: SourceId, model: OutputModel) -> Result<(), MixerError> {
        let layer = self.layer;
        self.sources
            .get_mut(&id)
            .ok_or(MixerError::UnknownSource { id, layer })?
            .apply_model(model);
        Ok(())
    }

    /// Whether the current source has played out.
    ///
    /// Empty tracks are complete. Any static source keeps the track active
    /// forever, even when a dynamic source is current and has finished.
    pub fn is_completed<G: PoseGraph + ?Sized>(&self, graph: &G) -> Result<bool, MixerError> {
        if self.sources.is_empty() {
            return Ok(true);
        }
        if self.has_static {
            return Ok(false);
        }
        let Some(current) = self.current.and_then(|id| self.sources.get(&id)) else {
            return Ok(true);
        };
        Ok(self.time_since_play >= graph.duration(current.node)?)
    }

    /// Advance fades by `dt` and write filtered weights into the composition node.
    pub fn on_evaluate<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        dt: f32,
    ) -> Result<(), MixerError> {
        let Some(current) = self.current.and_then(|id| self.sources.get(&id)) else {
            return Ok(());
        };
        let current_id = current.id;
        let exit_time = current.exit_time;
        let delta = if current.fade_duration == 0.0 {
            1.0
        } else {
            dt / current.fade_duration
        };

        self.time_since_play += dt;
        self.remaining_exit_time = (self.remaining_exit_time - dt).clamp(0.0, exit_time);

        let alpha = smoothing_alpha(self.thresholds.smoothing_rate, dt);
        for source in self.sources.values_mut() {
            let step = if source.id == current_id { delta } else { -delta };
            source.weight = (source.weight + step).clamp(0.0, source.target_weight);
            source.smoothed_weight += (source.weight - source.smoothed_weight) * alpha;
            graph.set_input_weight(self.mixer, source.port, source.smoothed_weight)?;
        }
        Ok(())
    }

    /// Reclaim dynamic sources whose fade-out finished under a saturated current source.
    pub fn on_post_update<G: PoseGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        events: &mut EventLog,
    ) -> Result<(), MixerError> {
        let Some(current) = self.current.and_then(|id| self.sources.get(&id)) else {
            return Ok(());
        };
        if current.smoothed_weight <= self.thresholds.saturation {
            return Ok(());
        }
        let current_id = current.id;
        for index in (0..self.sources.len()).rev() {
            let Some((_, source)) = self.sources.get_index(index) else {
                continue;
            };
            if source.id == current_id
                || source.kind != SourceKind::Dynamic
                || source.weight >= self.thresholds.reclaim_weight
            {
                continue;
            }
            let (id, port, node) = (source.id, source.port, source.node);
            graph.disconnect(self.mixer, port)?;
            graph.destroy_node(node)?;
            self.sources.shift_remove_index(index);
            self.recycled_ports.push_back(port);
            debug!("layer {}: reclaimed {id} from port {port}", self.layer);
            events.push(MixerEvent::SourceReclaimed {
                layer: self.layer,
                id,
                port,
            });
        }
        Ok(())
    }

    /// Disconnect and destroy every source node and the composition node.
    ///
    /// Keeps going past failures and reports the first one.
    pub(crate) fn shutdown<G: PoseGraph + ?Sized>(mut self, graph: &mut G) -> Result<(), MixerError> {
        let mut first = None;
        for (_, source) in self.sources.drain(..) {
            keep_first(&mut first, graph.disconnect(self.mixer, source.port));
            keep_first(&mut first, graph.destroy_node(source.node));
        }
        keep_first(&mut first, graph.destroy_node(self.mixer));
        first.map_or(Ok(()), Err)
    }

    fn reject(&self, status: PlayStatus, events: &mut EventLog) -> PlayStatus {
        if let Some(reason) = status.reject_reason() {
            events.push(MixerEvent::PlayRejected {
                layer: self.layer,
                reason,
            });
        }
        status
    }
}
