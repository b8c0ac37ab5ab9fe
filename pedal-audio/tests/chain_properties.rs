//! End-to-end properties of the effect chain

use pedal_audio::dsp::rms;
use pedal_audio::{
    AudioGraphContext, Edge, EffectChain, EffectKind, EffectNode, NodeId, Port, SignalSource,
    SmoothingTimes, ToneSource, Voicings,
};

const SR: u32 = 48000;
const BLOCK: usize = 128;

fn ctx() -> AudioGraphContext {
    AudioGraphContext::new(SR, BLOCK)
}

fn node(id: u32, kind: EffectKind, ctx: &AudioGraphContext) -> EffectNode {
    EffectNode::new(NodeId(id), kind, &Voicings::default(), SmoothingTimes::default(), ctx)
        .unwrap()
}

fn render(chain: &mut EffectChain, frames: usize, ctx: &mut AudioGraphContext) -> Vec<f32> {
    let mut out = vec![0.0; frames];
    for block in out.chunks_mut(BLOCK) {
        chain.process(ctx, block);
        ctx.advance(block.len());
    }
    out
}

fn tone(frames: usize, source: &mut ToneSource, ctx: &AudioGraphContext) -> Vec<f32> {
    let mut out = vec![0.0; frames];
    source.fill(&mut out, ctx);
    out
}

#[test]
fn empty_chain_passes_source_through() {
    let mut ctx = ctx();
    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::new(330.0, 0.5)));
    let out = render(&mut chain, 4096, &mut ctx);
    let expected = tone(4096, &mut ToneSource::new(330.0, 0.5), &ctx);
    assert_eq!(out, expected);
}

#[test]
fn mix_zero_is_dry_and_mix_one_is_processed() {
    let mut ctx = ctx();
    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::new(220.0, 0.5)));
    chain.add_effect(node(1, EffectKind::Fuzz, &ctx)).unwrap();
    chain.set_mix(NodeId(1), 0.0, &ctx).unwrap();

    let mut reference = ToneSource::new(220.0, 0.5);
    let out = render(&mut chain, SR as usize, &mut ctx);
    let dry = tone(SR as usize, &mut reference, &ctx);
    for (o, d) in out[36000..].iter().zip(&dry[36000..]) {
        assert!((o - d).abs() < 1e-3, "{} vs {}", o, d);
    }

    chain.set_mix(NodeId(1), 1.0, &ctx).unwrap();
    let out = render(&mut chain, SR as usize, &mut ctx);
    let dry = tone(SR as usize, &mut reference, &ctx);
    let diff: f32 = out[36000..]
        .iter()
        .zip(&dry[36000..])
        .map(|(o, d)| (o - d).abs())
        .sum();
    assert!(diff > 10.0, "fuzz at full mix looks dry: {}", diff);
}

#[test]
fn saturation_rms_is_linear_at_zero_drive_and_bounded_at_full() {
    let mut ctx = ctx();
    let input_rms = 0.5 / 2.0_f32.sqrt();

    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::new(220.0, 0.5)));
    chain.add_effect(node(1, EffectKind::Overdrive, &ctx)).unwrap();
    chain.update_parameter(NodeId(1), "drive", 0.0, &ctx).unwrap();
    let out = render(&mut chain, SR as usize, &mut ctx);
    let ratio = rms(&out[24000..]) / input_rms;
    assert!((ratio - 1.0).abs() < 0.15, "drive 0 ratio {}", ratio);

    chain.update_parameter(NodeId(1), "drive", 100.0, &ctx).unwrap();
    let out = render(&mut chain, SR as usize, &mut ctx);
    let driven = rms(&out[24000..]);
    assert!(driven < 1.0, "drive 100 rms {}", driven);
    assert!(out.iter().all(|s| s.is_finite() && s.abs() < 2.0));
}

#[test]
fn move_effect_scenario_has_three_edges() {
    let mut ctx = ctx();
    let (a, b) = (NodeId(1), NodeId(2));
    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::default()));
    chain.add_effect(node(1, EffectKind::Chorus, &ctx)).unwrap();
    chain.add_effect(node(2, EffectKind::Delay, &ctx)).unwrap();
    chain.set_mix(a, 1.0, &ctx).unwrap();
    chain.set_mix(b, 1.0, &ctx).unwrap();

    let index = chain.index_of(b).unwrap();
    chain.move_effect(index, 0).unwrap();

    assert_eq!(chain.order().collect::<Vec<_>>(), vec![b, a]);
    assert_eq!(
        chain.edges(),
        &[
            Edge::new(Port::Source, Port::NodeInput(b)),
            Edge::new(Port::NodeOutput(b), Port::NodeInput(a)),
            Edge::new(Port::NodeOutput(a), Port::Sink),
        ]
    );
    let out = render(&mut chain, 9600, &mut ctx);
    assert!(out.iter().all(|s| s.is_finite()));
}

#[test]
fn repeated_rebuild_keeps_output_amplitude() {
    let build = |ctx: &AudioGraphContext| {
        let mut chain = EffectChain::new(ctx);
        chain.set_source(Box::new(ToneSource::new(196.0, 0.4)));
        chain.add_effect(node(1, EffectKind::Overdrive, ctx)).unwrap();
        chain.add_effect(node(2, EffectKind::Chorus, ctx)).unwrap();
        chain.add_effect(node(3, EffectKind::Reverb, ctx)).unwrap();
        chain
    };
    let mut ctx_a = ctx();
    let mut ctx_b = ctx();
    let mut once = build(&ctx_a);
    let mut twice = build(&ctx_b);
    twice.rebuild_topology();
    twice.rebuild_topology();
    assert_eq!(once.edges(), twice.edges());

    let a = render(&mut once, 24000, &mut ctx_a);
    let b = render(&mut twice, 24000, &mut ctx_b);
    assert_eq!(rms(&a), rms(&b));
}

#[test]
fn add_then_remove_restores_direct_path() {
    let mut ctx = ctx();
    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::new(440.0, 0.3)));
    let before = chain.edges().to_vec();

    chain.add_effect(node(9, EffectKind::AnalogDelay, &ctx)).unwrap();
    render(&mut chain, 4800, &mut ctx);
    let removed = chain.remove_effect(NodeId(9)).unwrap();
    assert!(removed.is_torn_down());
    assert_eq!(chain.edges(), before.as_slice());

    // Source keeps its phase: compare against a reference advanced by the same amount
    let mut reference = ToneSource::new(440.0, 0.3);
    tone(4800, &mut reference, &ctx);
    let out = render(&mut chain, 4800, &mut ctx);
    assert_eq!(out, tone(4800, &mut reference, &ctx));
}

#[test]
fn bypassed_node_settles_to_pass_through() {
    let mut ctx = ctx();
    let mut chain = EffectChain::new(&ctx);
    chain.set_source(Box::new(ToneSource::new(110.0, 0.5)));
    chain.add_effect(node(1, EffectKind::Tremolo, &ctx)).unwrap();
    assert!(chain.toggle_bypass(NodeId(1), &ctx).unwrap());

    let mut reference = ToneSource::new(110.0, 0.5);
    render(&mut chain, SR as usize, &mut ctx);
    tone(SR as usize, &mut reference, &ctx);
    let out = render(&mut chain, 4096, &mut ctx);
    assert_eq!(out, tone(4096, &mut reference, &ctx));
}

#[test]
fn longer_reverb_decay_rings_longer() {
    let tail = |decay: f32| {
        let ctx = ctx();
        let mut reverb = node(1, EffectKind::Reverb, &ctx);
        reverb.set_mix(1.0, &ctx);
        reverb.update_parameter("decay", decay, &ctx);
        reverb.update_parameter("predelay", 0.0, &ctx);

        let mut input: Vec<f32> = (0..4800).map(|i| 0.5 * (i as f32 * 0.37).sin()).collect();
        input.resize(SR as usize * 2, 0.0);
        let mut out = vec![0.0; input.len()];
        for (i, o) in input.chunks(BLOCK).zip(out.chunks_mut(BLOCK)) {
            reverb.process(i, o, &ctx);
        }
        rms(&out[SR as usize..])
    };
    let short = tail(20.0);
    let long = tail(90.0);
    assert!(long > short * 2.0, "short {} long {}", short, long);
}
