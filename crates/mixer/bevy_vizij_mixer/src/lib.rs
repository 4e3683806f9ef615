use bevy::prelude::*;
use vizij_mixer_core::{BlendGraph, Mixer, MixerConfig, Pose};

pub mod resources;
pub mod systems;

pub use resources::{FinalPose, MixerEventFired, VizijMixer};
pub use systems::{advance_mixer_system, reconcile_mixer_system};

/// Ordering handle for systems that submit play requests or read the final pose.
///
/// Requests belong before `Advance`; pose consumers after it.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum MixerSet {
    /// `Update`: fades, layer weights, graph evaluation.
    Advance,
    /// `PostUpdate`: reclamation and layer retargeting.
    Reconcile,
}

/// Owns one layered mixer over a [`BlendGraph`] with `bone_count` channels.
pub struct VizijMixerPlugin {
    pub config: MixerConfig,
    pub bone_count: usize,
}

impl Default for VizijMixerPlugin {
    fn default() -> Self {
        Self {
            config: MixerConfig::default(),
            bone_count: 1,
        }
    }
}

impl Plugin for VizijMixerPlugin {
    fn build(&self, app: &mut App) {
        let mixer = match Mixer::new(BlendGraph::new(self.bone_count), self.config.clone()) {
            Ok(mixer) => mixer,
            Err(err) => {
                error!("vizij mixer: failed to build layer stack: {err}");
                return;
            }
        };
        app.insert_resource(VizijMixer(mixer))
            .insert_resource(FinalPose(Pose::zeros(self.bone_count)))
            .add_event::<MixerEventFired>()
            .add_systems(Update, advance_mixer_system.in_set(MixerSet::Advance))
            .add_systems(PostUpdate, reconcile_mixer_system.in_set(MixerSet::Reconcile));
    }
}
