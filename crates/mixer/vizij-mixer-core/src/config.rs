//! Core configuration for vizij-mixer-core.

use serde::{Deserialize, Serialize};

/// How often the pose graph is evaluated relative to the host tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationRate {
    /// Evaluate once per `advance` with that tick's delta time.
    #[default]
    EveryTick,
    /// Accumulate tick time and evaluate once more than `1 / fps` seconds have passed.
    Fixed { fps: u32 },
}

impl EvaluationRate {
    /// Fixed rate with `fps` clamped up to at least 1.
    pub fn fixed(fps: u32) -> Self {
        EvaluationRate::Fixed { fps: fps.max(1) }
    }

    /// Seconds between evaluations, `None` for every tick.
    pub fn interval(&self) -> Option<f32> {
        match *self {
            EvaluationRate::EveryTick => None,
            EvaluationRate::Fixed { fps } => Some(1.0 / fps.max(1) as f32),
        }
    }
}

/// Mixer sizing, filter rates and lifecycle thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Input ports on each layer's composition node.
    pub layer_input_capacity: usize,
    /// Upper bound for lazily created layers.
    pub max_layers: usize,
    pub evaluation_rate: EvaluationRate,
    /// Per-source exponential filter rate (1/s).
    pub source_smoothing_rate: f32,
    /// Per-layer exponential filter rate (1/s).
    pub layer_smoothing_rate: f32,
    /// Dynamic sources below this weight may be reclaimed.
    pub reclaim_weight_threshold: f32,
    /// Reclamation waits until the current source's smoothed weight exceeds this.
    pub saturation_threshold: f32,
    /// Events retained until drained; overflow is counted and dropped.
    pub max_pending_events: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            layer_input_capacity: 10,
            max_layers: 16,
            evaluation_rate: EvaluationRate::EveryTick,
            source_smoothing_rate: 25.0,
            layer_smoothing_rate: 12.0,
            reclaim_weight_threshold: 0.001,
            saturation_threshold: 0.99,
            max_pending_events: 256,
        }
    }
}

impl MixerConfig {
    pub const MAX_LAYER_INPUT_CAPACITY: usize = 1024;
    pub const MAX_LAYERS: usize = 256;
    pub const MAX_PENDING_EVENTS: usize = 65_536;

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Copy with sizes capped to the `MAX_*` bounds and invalid rates or
    /// thresholds replaced by their defaults.
    pub fn sanitized(&self) -> Self {
        fn rate(v: f32, fallback: f32) -> f32 {
            if v.is_finite() && v >= 0.0 {
                v
            } else {
                fallback
            }
        }
        fn unit(v: f32, fallback: f32) -> f32 {
            if v.is_finite() {
                v.clamp(0.0, 1.0)
            } else {
                fallback
            }
        }
        let defaults = Self::default();
        Self {
            layer_input_capacity: self
                .layer_input_capacity
                .min(Self::MAX_LAYER_INPUT_CAPACITY),
            max_layers: self.max_layers.clamp(1, Self::MAX_LAYERS),
            evaluation_rate: match self.evaluation_rate {
                EvaluationRate::Fixed { fps } => EvaluationRate::fixed(fps),
                every => every,
            },
            source_smoothing_rate: rate(self.source_smoothing_rate, defaults.source_smoothing_rate),
            layer_smoothing_rate: rate(self.layer_smoothing_rate, defaults.layer_smoothing_rate),
            reclaim_weight_threshold: unit(
                self.reclaim_weight_threshold,
                defaults.reclaim_weight_threshold,
            ),
            saturation_threshold: unit(self.saturation_threshold, defaults.saturation_threshold),
            max_pending_events: self.max_pending_events.min(Self::MAX_PENDING_EVENTS),
        }
    }
}

/// Fraction of the remaining gap an exponential filter closes in `dt` seconds.
#[inline]
pub(crate) fn smoothing_alpha(rate: f32, dt: f32) -> f32 {
    1.0 - (-rate * dt).exp()
}
