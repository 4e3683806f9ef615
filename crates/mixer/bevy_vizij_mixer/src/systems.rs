use bevy::prelude::*;

use crate::resources::{FinalPose, MixerEventFired, VizijMixer};

/// Frame delta in, weights and graph evaluation out; the evaluated pose is
/// copied into [`FinalPose`].
pub fn advance_mixer_system(
    time: Res<Time>,
    mut mixer: ResMut<VizijMixer>,
    mut pose: ResMut<FinalPose>,
) {
    if let Err(err) = mixer.0.advance(time.delta_seconds()) {
        error!("vizij mixer: advance failed: {err}");
        return;
    }
    pose.0.clone_from(mixer.0.graph().output_pose());
}

pub fn reconcile_mixer_system(
    mut mixer: ResMut<VizijMixer>,
    mut fired: EventWriter<MixerEventFired>,
) {
    let mixer = &mut mixer.0;
    if let Err(err) = mixer.reconcile() {
        error!("vizij mixer: reconcile failed: {err}");
    }
    let dropped = mixer.dropped_events();
    if dropped > 0 {
        warn!("vizij mixer: {dropped} events dropped since last frame");
    }
    fired.send_batch(mixer.drain_events().map(MixerEventFired));
}
