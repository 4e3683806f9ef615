use bevy::prelude::*;
use vizij_mixer_core::{BlendGraph, Mixer, MixerEvent, Pose};

#[derive(Resource)]
pub struct VizijMixer(pub Mixer<BlendGraph>);

/// Pose produced by the most recent graph evaluation.
#[derive(Resource, Default, Clone, Debug)]
pub struct FinalPose(pub Pose);

/// Mixer notifications, forwarded once per frame after reconcile.
#[derive(Event, Clone, Debug)]
pub struct MixerEventFired(pub MixerEvent);
