//! Reference in-memory pose graph.
//!
//! `BlendGraph` is a small arena of clip, mixer and layer-mixer nodes. Poses
//! are flat channel vectors (one float per animated channel). It is used by
//! the test suite, the benchmarks and the Bevy adapter; hosts with their own
//! animation runtime implement [`PoseGraph`] directly instead.

use serde::{Deserialize, Serialize};

use crate::graph::{BoneMask, GraphError, NodeHandle, PoseGraph};

/// Flat pose: one value per animated channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub channels: Vec<f32>,
}

impl Pose {
    pub fn new(channels: Vec<f32>) -> Self {
        Self { channels }
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            channels: vec![0.0; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[inline]
    pub fn get(&self, channel: usize) -> f32 {
        self.channels.get(channel).copied().unwrap_or(0.0)
    }
}

/// Clip sampled linearly from `start` to `end` over `duration` seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub start: Pose,
    pub end: Pose,
    pub duration: f32,
    #[serde(default)]
    pub looping: bool,
}

impl Clip {
    /// Clip that holds a single pose for `duration` seconds.
    pub fn constant(pose: Pose, duration: f32) -> Self {
        Self {
            end: pose.clone(),
            start: pose,
            duration,
            looping: false,
        }
    }

    pub fn linear(start: Pose, end: Pose, duration: f32) -> Self {
        Self {
            start,
            end,
            duration,
            looping: false,
        }
    }

    pub fn looped(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Sample at `time` seconds into a vector of `channels` values.
    pub fn sample(&self, time: f32, channels: usize) -> Vec<f32> {
        let u = if self.duration <= 0.0 {
            0.0
        } else if self.looping {
            time.rem_euclid(self.duration) / self.duration
        } else {
            (time / self.duration).clamp(0.0, 1.0)
        };
        (0..channels)
            .map(|c| {
                let a = self.start.get(c);
                let b = self.end.get(c);
                a + (b - a) * u
            })
            .collect()
    }
}

#[derive(Clone, Debug, Default)]
struct LayerSettings {
    mask: Option<BoneMask>,
    additive: bool,
}

#[derive(Debug)]
enum NodeKind {
    Clip(Clip),
    Mixer,
    LayerMixer { layers: Vec<LayerSettings> },
}

#[derive(Clone, Copy, Debug, Default)]
struct Input {
    source: Option<NodeHandle>,
    weight: f32,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    time: f32,
    speed: f32,
    inputs: Vec<Input>,
}

impl Node {
    fn new(kind: NodeKind, input_count: usize) -> Self {
        Self {
            kind,
            time: 0.0,
            speed: 1.0,
            inputs: vec![Input::default(); input_count],
        }
    }

    fn input_mut(&mut self, handle: NodeHandle, port: usize) -> Result<&mut Input, GraphError> {
        let count = self.inputs.len();
        self.inputs.get_mut(port).ok_or(GraphError::PortOutOfRange {
            node: handle,
            port,
            count,
        })
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed pose graph with weighted and layered composition.
#[derive(Debug)]
pub struct BlendGraph {
    channels: usize,
    slots: Vec<Slot>,
    free: Vec<u32>,
    output: Option<NodeHandle>,
    pose: Pose,
    evaluations: u64,
    last_dt: f32,
}

impl BlendGraph {
    /// Create an empty graph whose poses have `channels` values.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            slots: Vec::new(),
            free: Vec::new(),
            output: None,
            pose: Pose::zeros(channels),
            evaluations: 0,
            last_dt: 0.0,
        }
    }

    /// Add a clip node with no inputs.
    pub fn create_clip(&mut self, clip: Clip) -> NodeHandle {
        self.insert(Node::new(NodeKind::Clip(clip), 0))
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_alive(&self, handle: NodeHandle) -> bool {
        self.node(handle).is_ok()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn input_weight(&self, node: NodeHandle, port: usize) -> Option<f32> {
        self.node(node).ok()?.inputs.get(port).map(|i| i.weight)
    }

    pub fn input_source(&self, node: NodeHandle, port: usize) -> Option<NodeHandle> {
        self.node(node).ok()?.inputs.get(port)?.source
    }

    pub fn time(&self, node: NodeHandle) -> Option<f32> {
        self.node(node).ok().map(|n| n.time)
    }

    pub fn speed(&self, node: NodeHandle) -> Option<f32> {
        self.node(node).ok().map(|n| n.speed)
    }

    pub fn output(&self) -> Option<NodeHandle> {
        self.output
    }

    /// Pose produced by the last `evaluate` call.
    pub fn output_pose(&self) -> &Pose {
        &self.pose
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    pub fn last_evaluation_dt(&self) -> f32 {
        self.last_dt
    }

    fn insert(&mut self, node: Node) -> NodeHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeHandle::new(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeHandle::new(index, 0)
        }
    }

    fn node(&self, handle: NodeHandle) -> Result<&Node, GraphError> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_ref())
            .ok_or(GraphError::InvalidNode(handle))
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, GraphError> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or(GraphError::InvalidNode(handle))
    }

    /// True when `needle` feeds (directly or transitively) into `node`.
    fn depends_on(&self, node: NodeHandle, needle: NodeHandle) -> bool {
        let mut stack = vec![node];
        while let Some(h) = stack.pop() {
            if h == needle {
                return true;
            }
            if let Ok(n) = self.node(h) {
                stack.extend(n.inputs.iter().filter_map(|i| i.source));
            }
        }
        false
    }

    fn sample(&self, handle: NodeHandle) -> Result<Vec<f32>, GraphError> {
        let node = self.node(handle)?;
        let mut out = vec![0.0f32; self.channels];
        match &node.kind {
            NodeKind::Clip(clip) => return Ok(clip.sample(node.time, self.channels)),
            NodeKind::Mixer => {
                for input in &node.inputs {
                    let Some(src) = input.source else { continue };
                    if input.weight == 0.0 {
                        continue;
                    }
                    let pose = self.sample(src)?;
                    for (o, v) in out.iter_mut().zip(pose.iter()) {
                        *o += input.weight * v;
                    }
                }
            }
            NodeKind::LayerMixer { layers } => {
                for (i, input) in node.inputs.iter().enumerate() {
                    let Some(src) = input.source else { continue };
                    if input.weight == 0.0 {
                        continue;
                    }
                    let settings = layers.get(i);
                    let additive = settings.is_some_and(|s| s.additive);
                    let mask = settings.and_then(|s| s.mask.as_ref());
                    let pose = self.sample(src)?;
                    for (c, (o, v)) in out.iter_mut().zip(pose.iter()).enumerate() {
                        let k = input.weight * mask.map_or(1.0, |m| m.weight(c));
                        if additive {
                            *o += k * v;
                        } else {
                            *o += (v - *o) * k;
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn node_duration(&self, handle: NodeHandle) -> Result<f32, GraphError> {
        let node = self.node(handle)?;
        match &node.kind {
            NodeKind::Clip(clip) => Ok(clip.duration),
            _ => {
                let mut longest = 0.0f32;
                for src in node.inputs.iter().filter_map(|i| i.source) {
                    longest = longest.max(self.node_duration(src)?);
                }
                Ok(longest)
            }
        }
    }

    fn layer_settings_mut(
        &mut self,
        handle: NodeHandle,
        layer: usize,
        operation: &'static str,
    ) -> Result<&mut LayerSettings, GraphError> {
        let node = self.node_mut(handle)?;
        match &mut node.kind {
            NodeKind::LayerMixer { layers } => {
                let count = layers.len();
                layers.get_mut(layer).ok_or(GraphError::PortOutOfRange {
                    node: handle,
                    port: layer,
                    count,
                })
            }
            _ => Err(GraphError::Unsupported {
                node: handle,
                operation,
            }),
        }
    }
}

impl PoseGraph for BlendGraph {
    fn create_mixer(&mut self, input_count: usize) -> NodeHandle {
        self.insert(Node::new(NodeKind::Mixer, input_count))
    }

    fn create_layer_mixer(&mut self, input_count: usize) -> NodeHandle {
        let layers = vec![LayerSettings::default(); input_count];
        self.insert(Node::new(NodeKind::LayerMixer { layers }, input_count))
    }

    fn set_output(&mut self, node: NodeHandle) -> Result<(), GraphError> {
        self.node(node)?;
        self.output = Some(node);
        Ok(())
    }

    fn connect(
        &mut self,
        source: NodeHandle,
        source_port: usize,
        target: NodeHandle,
        target_port: usize,
    ) -> Result<(), GraphError> {
        self.node(source)?;
        if source_port != 0 {
            return Err(GraphError::PortOutOfRange {
                node: source,
                port: source_port,
                count: 1,
            });
        }
        if self.depends_on(source, target) {
            return Err(GraphError::Cycle {
                source_node: source,
                target,
            });
        }
        let input = self.node_mut(target)?.input_mut(target, target_port)?;
        input.source = Some(source);
        Ok(())
    }

    fn disconnect(&mut self, target: NodeHandle, input_port: usize) -> Result<(), GraphError> {
        let input = self.node_mut(target)?.input_mut(target, input_port)?;
        input.source = None;
        Ok(())
    }

    fn input_count(&self, node: NodeHandle) -> Result<usize, GraphError> {
        Ok(self.node(node)?.inputs.len())
    }

    fn set_input_count(&mut self, node: NodeHandle, count: usize) -> Result<(), GraphError> {
        let n = self.node_mut(node)?;
        n.inputs.resize(count, Input::default());
        if let NodeKind::LayerMixer { layers } = &mut n.kind {
            layers.resize(count, LayerSettings::default());
        }
        Ok(())
    }

    fn set_input_weight(
        &mut self,
        node: NodeHandle,
        input_port: usize,
        weight: f32,
    ) -> Result<(), GraphError> {
        self.node_mut(node)?.input_mut(node, input_port)?.weight = weight;
        Ok(())
    }

    fn destroy_node(&mut self, node: NodeHandle) -> Result<(), GraphError> {
        self.node(node)?;
        let slot = &mut self.slots[node.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node.index);
        for n in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            for input in n.inputs.iter_mut().filter(|i| i.source == Some(node)) {
                input.source = None;
            }
        }
        if self.output == Some(node) {
            self.output = None;
        }
        Ok(())
    }

    fn evaluate(&mut self, dt: f32) -> Result<(), GraphError> {
        for n in self.slots.iter_mut().filter_map(|s| s.node.as_mut()) {
            n.time += dt * n.speed;
        }
        self.evaluations += 1;
        self.last_dt = dt;
        self.pose.channels = match self.output {
            Some(root) => self.sample(root)?,
            None => vec![0.0; self.channels],
        };
        Ok(())
    }

    fn set_time(&mut self, node: NodeHandle, time: f32) -> Result<(), GraphError> {
        self.node_mut(node)?.time = time;
        Ok(())
    }

    fn duration(&self, node: NodeHandle) -> Result<f32, GraphError> {
        self.node_duration(node)
    }

    fn set_speed(&mut self, node: NodeHandle, speed: f32) -> Result<(), GraphError> {
        self.node_mut(node)?.speed = speed;
        Ok(())
    }

    fn set_layer_mask(
        &mut self,
        node: NodeHandle,
        layer: usize,
        mask: BoneMask,
    ) -> Result<(), GraphError> {
        self.layer_settings_mut(node, layer, "set_layer_mask")?.mask = Some(mask);
        Ok(())
    }

    fn set_layer_additive(
        &mut self,
        node: NodeHandle,
        layer: usize,
        additive: bool,
    ) -> Result<(), GraphError> {
        self.layer_settings_mut(node, layer, "set_layer_additive")?
            .additive = additive;
        Ok(())
    }
}
