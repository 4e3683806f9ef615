//! Per-source playback model and runtime descriptor.

use serde::{Deserialize, Serialize};

use crate::graph::NodeHandle;
use crate::ids::SourceId;

/// Caller-facing configuration of a source's blend behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputModel {
    /// Ceiling the source's weight fades toward; may be below 1 for partial contribution.
    pub target_weight: f32,
    /// Seconds to fade linearly from 0 to full weight. Zero switches instantly.
    pub fade_in_seconds: f32,
    /// Seconds this source holds "current" against non-forced play requests.
    pub exit_time_seconds: f32,
    /// Static sources only: rewind to time zero when played again.
    /// Dynamic sources always restart.
    pub restart_on_play: bool,
    /// Time the node is rewound to whenever a play restarts it.
    pub start_offset_seconds: f32,
}

impl Default for OutputModel {
    fn default() -> Self {
        Self {
            target_weight: 1.0,
            fade_in_seconds: 0.2,
            exit_time_seconds: 0.0,
            restart_on_play: false,
            start_offset_seconds: 0.0,
        }
    }
}

impl OutputModel {
    /// Copy with negative or non-finite values replaced by zero.
    pub fn sanitized(self) -> Self {
        fn non_negative(v: f32) -> f32 {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                0.0
            }
        }
        Self {
            target_weight: non_negative(self.target_weight),
            fade_in_seconds: non_negative(self.fade_in_seconds),
            exit_time_seconds: non_negative(self.exit_time_seconds),
            restart_on_play: self.restart_on_play,
            start_offset_seconds: non_negative(self.start_offset_seconds),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Long-lived, registered once and never reclaimed automatically.
    Static,
    /// Transient, created per play request and reclaimed once faded out.
    Dynamic,
}

/// Runtime state of one source in a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceDescriptor {
    pub id: SourceId,
    pub node: NodeHandle,
    pub kind: SourceKind,
    pub restart_on_play: bool,
    /// Linear fade schedule; drives lifecycle decisions.
    pub weight: f32,
    /// Filtered weight written to the composition node.
    pub smoothed_weight: f32,
    pub target_weight: f32,
    pub fade_duration: f32,
    pub exit_time: f32,
    pub start_offset: f32,
    pub port: usize,
}

impl SourceDescriptor {
    pub(crate) fn new(
        id: SourceId,
        node: NodeHandle,
        kind: SourceKind,
        model: OutputModel,
        port: usize,
    ) -> Self {
        let mut desc = Self {
            id,
            node,
            kind,
            restart_on_play: false,
            weight: 0.0,
            smoothed_weight: 0.0,
            target_weight: 0.0,
            fade_duration: 0.0,
            exit_time: 0.0,
            start_offset: 0.0,
            port,
        };
        desc.apply_model(model);
        desc
    }

    /// Patch the configurable fields; identity, port and weights are untouched.
    pub(crate) fn apply_model(&mut self, model: OutputModel) {
        let model = model.sanitized();
        self.target_weight = model.target_weight;
        self.fade_duration = model.fade_in_seconds;
        self.exit_time = model.exit_time_seconds;
        self.restart_on_play = model.restart_on_play;
        self.start_offset = model.start_offset_seconds;
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.kind == SourceKind::Static
    }

    /// Whether `play` rewinds the node's time cursor.
    #[inline]
    pub fn restarts_on_play(&self) -> bool {
        self.kind == SourceKind::Dynamic || self.restart_on_play
    }

    /// The model this descriptor was configured from.
    pub fn model(&self) -> OutputModel {
        OutputModel {
            target_weight: self.target_weight,
            fade_in_seconds: self.fade_duration,
            exit_time_seconds: self.exit_time,
            restart_on_play: self.restart_on_play,
            start_offset_seconds: self.start_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_defaults_fill_missing_json_fields() {
        let m: OutputModel = serde_json::from_str(r#"{ "target_weight": 0.5 }"#).unwrap();
        assert_eq!(m.target_weight, 0.5);
        assert_eq!(m.fade_in_seconds, 0.2);
        assert_eq!(m.exit_time_seconds, 0.0);
        assert!(!m.restart_on_play);
    }

    #[test]
    fn sanitize_clamps_negative_and_nan() {
        let m = OutputModel {
            target_weight: f32::NAN,
            fade_in_seconds: -1.0,
            exit_time_seconds: f32::INFINITY,
            restart_on_play: true,
            start_offset_seconds: -0.5,
        }
        .sanitized();
        assert_eq!(m.target_weight, 0.0);
        assert_eq!(m.fade_in_seconds, 0.0);
        assert_eq!(m.exit_time_seconds, 0.0);
        assert!(m.restart_on_play);
        assert_eq!(m.start_offset_seconds, 0.0);
    }

    #[test]
    fn dynamic_sources_always_restart() {
        let node = NodeHandle::new(0, 0);
        let model = OutputModel::default();
        let d = SourceDescriptor::new(node.into(), node, SourceKind::Dynamic, model, 0);
        let s = SourceDescriptor::new(node.into(), node, SourceKind::Static, model, 0);
        assert!(d.restarts_on_play());
        assert!(!s.restarts_on_play());
        assert_eq!(s.model(), model);
    }
}
