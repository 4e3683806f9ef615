use vizij_mixer_core::{
    BlendGraph, Clip, EvaluationRate, GraphError, Mixer, MixerConfig, MixerError, MixerEvent,
    NodeHandle, OutputModel, PlayStatus, PoseGraph, Pose, RejectReason, SourceId,
    TransitionSetting,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn mixer_with(cfg: MixerConfig) -> Mixer<BlendGraph> {
    Mixer::new(BlendGraph::new(1), cfg).unwrap()
}

fn clip(m: &mut Mixer<BlendGraph>, value: f32, duration: f32) -> NodeHandle {
    m.graph_mut()
        .create_clip(Clip::constant(Pose::new(vec![value]), duration))
}

fn weight(m: &Mixer<BlendGraph>, id: SourceId, layer: usize) -> f32 {
    m.layer(layer).unwrap().source(id).unwrap().weight
}

/// it should evaluate the graph after this tick's weights were written
#[test]
fn graph_sees_weights_from_same_tick() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    m.add_static(a.into(), a, OutputModel::default(), 0).unwrap();
    m.tick(0.1).unwrap();
    let expected = 0.5 * (1.0 - (-2.5f32).exp());
    approx(m.graph().output_pose().get(0), expected, 1e-5);
}

/// it should evaluate once per advance when running every tick
#[test]
fn every_tick_evaluates_each_advance() {
    let mut m = mixer_with(MixerConfig::default());
    for _ in 0..5 {
        m.tick(0.04).unwrap();
    }
    assert_eq!(m.graph().evaluation_count(), 5);
    approx(m.graph().last_evaluation_dt(), 0.04, 1e-6);
}

/// it should throttle evaluation to the fixed rate and pass the accumulated delta
#[test]
fn fixed_rate_throttles_evaluation() {
    let cfg = MixerConfig {
        evaluation_rate: EvaluationRate::fixed(10),
        ..Default::default()
    };
    let mut m = mixer_with(cfg);
    let a = clip(&mut m, 1.0, 5.0);
    let id = SourceId::from(a);
    m.add_static(id, a, OutputModel::default(), 0).unwrap();
    for _ in 0..5 {
        m.tick(0.04).unwrap();
    }
    assert_eq!(m.graph().evaluation_count(), 1);
    approx(m.graph().last_evaluation_dt(), 0.12, 1e-5);
    // weights keep moving every tick regardless of the evaluation rate
    approx(weight(&m, id, 0), 1.0, 1e-5);
    let evaluated: Vec<f32> = m
        .events()
        .iter()
        .filter_map(|e| match e {
            MixerEvent::GraphEvaluated { dt } => Some(*dt),
            _ => None,
        })
        .collect();
    assert_eq!(evaluated.len(), 1);
}

/// it should switch evaluation rate at runtime
#[test]
fn evaluation_rate_can_change() {
    let mut m = mixer_with(MixerConfig {
        evaluation_rate: EvaluationRate::fixed(1),
        ..Default::default()
    });
    m.tick(0.1).unwrap();
    assert_eq!(m.graph().evaluation_count(), 0);
    m.set_evaluation_rate(EvaluationRate::EveryTick);
    m.tick(0.1).unwrap();
    assert_eq!(m.graph().evaluation_count(), 1);
    assert_eq!(m.config().evaluation_rate, EvaluationRate::EveryTick);
}

/// it should only reclaim during reconcile
#[test]
fn reclamation_waits_for_reconcile() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    let a_id = SourceId::from(a);
    m.play_dynamic(a, OutputModel::default(), 0).unwrap();
    for _ in 0..3 {
        m.tick(0.1).unwrap();
    }
    let b = clip(&mut m, 2.0, 5.0);
    m.play_dynamic(b, OutputModel::default(), 0).unwrap();
    for _ in 0..5 {
        m.advance(0.1).unwrap();
    }
    assert!(m.layer(0).unwrap().contains(a_id));
    assert_eq!(weight(&m, a_id, 0), 0.0);

    m.reconcile().unwrap();
    assert!(!m.layer(0).unwrap().contains(a_id));
    assert!(!m.graph().is_alive(a));
    assert!(m
        .events()
        .iter()
        .any(|e| matches!(e, MixerEvent::SourceReclaimed { id, .. } if *id == a_id)));
}

/// it should treat non-finite and negative deltas as zero
#[test]
fn bad_deltas_are_ignored() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    let id = SourceId::from(a);
    m.add_static(id, a, OutputModel::default(), 0).unwrap();
    m.tick(f32::NAN).unwrap();
    m.tick(-1.0).unwrap();
    m.tick(f32::INFINITY).unwrap();
    assert_eq!(weight(&m, id, 0), 0.0);
    assert_eq!(m.layer(0).unwrap().time_since_play(), 0.0);
    assert_eq!(m.graph().time(a), Some(0.0));
    assert_eq!(m.layer_weight(0), Some(1.0));
}

/// it should record rejected play requests
#[test]
fn gated_play_is_recorded() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    let held = OutputModel {
        exit_time_seconds: 1.0,
        ..Default::default()
    };
    m.add_static(a.into(), a, held, 0).unwrap();
    let b = clip(&mut m, 2.0, 5.0);
    assert_eq!(
        m.play_dynamic(b, OutputModel::default(), 0).unwrap(),
        PlayStatus::GatedByExitTime
    );
    assert_eq!(m.current(0), Some(SourceId::from(a)));
    assert!(m.events().iter().any(|e| matches!(
        e,
        MixerEvent::PlayRejected {
            layer: 0,
            reason: RejectReason::GatedByExitTime
        }
    )));
}

/// it should hand out pending events once and count the overflow
#[test]
fn events_drain_and_overflow() {
    let mut m = mixer_with(MixerConfig {
        max_pending_events: 2,
        ..Default::default()
    });
    let a = clip(&mut m, 1.0, 5.0);
    m.add_static(a.into(), a, OutputModel::default(), 0).unwrap();
    m.advance(0.1).unwrap();
    assert_eq!(m.events().len(), 2);
    assert_eq!(m.dropped_events(), 1);

    let drained: Vec<MixerEvent> = m.drain_events().collect();
    assert!(matches!(drained[0], MixerEvent::LayerAdded { layer: 0 }));
    assert!(matches!(drained[1], MixerEvent::SourceStarted { .. }));
    assert!(m.events().is_empty());
    assert_eq!(m.dropped_events(), 0);
}

/// it should apply transition settings to clip playback speed
#[test]
fn clip_settings_set_speed() {
    let mut m = mixer_with(MixerConfig::default());
    let stretched = clip(&mut m, 1.0, 1.0);
    let setting = TransitionSetting {
        use_clip_duration: false,
        clip_duration: 2.0,
        fade_in_time: 0.1,
        ..Default::default()
    };
    m.play_clip_dynamic(stretched, &setting, 0).unwrap();
    assert_eq!(m.graph().speed(stretched), Some(0.5));
    assert_eq!(
        m.layer(0)
            .unwrap()
            .source(stretched.into())
            .unwrap()
            .fade_duration,
        0.1
    );

    let fast = clip(&mut m, 2.0, 1.0);
    let setting = TransitionSetting {
        clip_speed: 1.5,
        ..Default::default()
    };
    m.add_clip_static(fast.into(), fast, &setting, 1).unwrap();
    assert_eq!(m.graph().speed(fast), Some(1.5));
}

/// it should destroy every node it created or adopted on shutdown
#[test]
fn shutdown_releases_all_nodes() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    m.add_static(a.into(), a, OutputModel::default(), 0).unwrap();
    let b = clip(&mut m, 2.0, 5.0);
    m.play_dynamic(b, OutputModel::default(), 1).unwrap();
    m.tick(0.1).unwrap();
    // root + two layer mixers + two sources
    assert_eq!(m.graph().node_count(), 5);

    let graph = m.shutdown().unwrap();
    assert_eq!(graph.node_count(), 0);
    assert!(!graph.is_alive(a));
    assert_eq!(graph.output(), None);
}

/// it should build from a config whose sizes are far past the supported bounds
#[test]
fn oversized_config_is_capped() {
    let cfg = MixerConfig::from_json_str(
        r#"{
            "max_layers": 18446744073709551615,
            "max_pending_events": 18446744073709551615,
            "layer_input_capacity": 18446744073709551615
        }"#,
    )
    .unwrap();
    let mut m = Mixer::new(BlendGraph::new(1), cfg).unwrap();
    assert_eq!(m.config().max_layers, MixerConfig::MAX_LAYERS);
    assert_eq!(m.config().max_pending_events, MixerConfig::MAX_PENDING_EVENTS);
    assert_eq!(
        m.layer(0).unwrap().capacity(),
        MixerConfig::MAX_LAYER_INPUT_CAPACITY
    );
    let node = clip(&mut m, 1.0, 1.0);
    assert_eq!(
        m.play_dynamic(node, OutputModel::default(), MixerConfig::MAX_LAYERS),
        Err(MixerError::LayerLimit {
            max: MixerConfig::MAX_LAYERS
        })
    );
    assert_eq!(m.layer_count(), MixerConfig::MAX_LAYERS);
}

/// it should start clips from the transition's fixed time offset
#[test]
fn clip_settings_apply_time_offset() {
    let mut m = mixer_with(MixerConfig::default());
    let node = clip(&mut m, 1.0, 2.0);
    let setting = TransitionSetting {
        fixed_time_offset: 0.5,
        ..Default::default()
    };
    m.play_clip_dynamic(node, &setting, 0).unwrap();
    assert_eq!(m.graph().time(node), Some(0.5));
    m.tick(0.25).unwrap();
    approx(m.graph().time(node).unwrap(), 0.75, 1e-6);
}

/// it should finish teardown and hand the graph back when a node was destroyed behind its back
#[test]
fn failed_shutdown_returns_graph() {
    let mut m = mixer_with(MixerConfig::default());
    let a = clip(&mut m, 1.0, 5.0);
    m.add_static(a.into(), a, OutputModel::default(), 0).unwrap();
    let b = clip(&mut m, 2.0, 5.0);
    m.play_dynamic(b, OutputModel::default(), 1).unwrap();
    m.graph_mut().destroy_node(a).unwrap();

    let err = m.shutdown().unwrap_err();
    assert_eq!(err.error, MixerError::Graph(GraphError::InvalidNode(a)));
    assert_eq!(err.graph.node_count(), 0);
    assert!(!err.graph.is_alive(b));
}
