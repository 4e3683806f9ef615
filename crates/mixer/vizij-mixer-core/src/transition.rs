//! Authoring-side transition settings for clip sources.

use serde::{Deserialize, Serialize};

use crate::model::OutputModel;

/// Transition record attached to a clip when it is handed to the mixer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionSetting {
    pub clip_speed: f32,
    /// Play at `clip_speed`; when false, stretch the clip to last `clip_duration` seconds.
    pub use_clip_duration: bool,
    pub clip_duration: f32,
    pub output_target_weight: f32,
    pub fade_in_time: f32,
    pub exit_time: f32,
    pub restart_when_play: bool,
    /// Seconds into the clip that playback starts from.
    pub fixed_time_offset: f32,
}

impl Default for TransitionSetting {
    fn default() -> Self {
        let model = OutputModel::default();
        Self {
            clip_speed: 1.0,
            use_clip_duration: true,
            clip_duration: 1.0,
            output_target_weight: model.target_weight,
            fade_in_time: model.fade_in_seconds,
            exit_time: model.exit_time_seconds,
            restart_when_play: model.restart_on_play,
            fixed_time_offset: model.start_offset_seconds,
        }
    }
}

impl TransitionSetting {
    pub fn to_model(&self) -> OutputModel {
        OutputModel {
            target_weight: self.output_target_weight,
            fade_in_seconds: self.fade_in_time,
            exit_time_seconds: self.exit_time,
            restart_on_play: self.restart_when_play,
            start_offset_seconds: self.fixed_time_offset,
        }
    }

    /// Playback speed for a clip of `clip_length` seconds.
    pub fn playback_speed(&self, clip_length: f32) -> f32 {
        if self.use_clip_duration || self.clip_duration <= 0.0 || clip_length <= 0.0 {
            self.clip_speed
        } else {
            self.clip_speed * clip_length / self.clip_duration
        }
    }
}
