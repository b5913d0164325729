use std::sync::Arc;

use segue::{
    BackendKind, Clip, Compositor, CompositorOptions, EffectId, Resolution, SyntheticSource,
    Timeline, TransitionAnchor,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];

fn cpu(w: u32, h: u32) -> Compositor {
    Compositor::new(CompositorOptions {
        backend: BackendKind::Cpu,
        resolution: Resolution {
            width: w,
            height: h,
        },
    })
    .unwrap()
}

fn red_blue(effect: EffectId, anchor: TransitionAnchor) -> Timeline {
    let mut tl = Timeline::new();
    for color in [RED, BLUE] {
        let src = SyntheticSource::new(2.0, 4, 4, color);
        tl.add_clip(Clip::new("c", Arc::new(src)).unwrap());
    }
    tl.set_transition(effect, 1.0, anchor).unwrap();
    tl
}

#[test]
fn fade_midpoint_blends_both_clips() {
    let tl = red_blue(EffectId::Fade, TransitionAnchor::Between(0));
    let mut c = cpu(8, 8);
    c.render_state(&tl.resolve(2.0), tl.clips());
    let frame = c.last_frame().unwrap();
    assert_eq!((frame.width, frame.height), (8, 8));
    assert_eq!(frame.pixel(3, 5), [128, 0, 128, 255]);
}

#[test]
fn plain_clip_is_scaled_to_output() {
    let tl = red_blue(EffectId::Fade, TransitionAnchor::Between(0));
    let mut c = cpu(16, 10);
    c.render_state(&tl.resolve(0.25), tl.clips());
    let frame = c.last_frame().unwrap();
    assert_eq!(frame.pixel(0, 0), RED);
    assert_eq!(frame.pixel(15, 9), RED);
}

#[test]
fn wipe_splits_the_frame() {
    let tl = red_blue(EffectId::WipeLeft, TransitionAnchor::Between(0));
    let mut c = cpu(10, 2);
    c.render_state(&tl.resolve(2.0), tl.clips());
    let frame = c.last_frame().unwrap().clone();
    let left = frame.pixel(0, 0);
    let right = frame.pixel(9, 0);
    assert_ne!(left, right);
    assert!([RED, BLUE].contains(&left));
    assert!([RED, BLUE].contains(&right));
}

#[test]
fn start_transition_fades_in_from_transparent() {
    let tl = red_blue(EffectId::Fade, TransitionAnchor::Start);
    let mut c = cpu(4, 4);
    c.render_state(&tl.resolve(0.25), tl.clips());
    let alpha = c.last_frame().unwrap().pixel(1, 1)[3];
    assert!(alpha > 0 && alpha < 255, "alpha {alpha}");
}

#[test]
fn every_effect_composites_at_midpoint() {
    let mut c = cpu(12, 8);
    let a = SyntheticSource::new(1.0, 6, 4, RED);
    let b = SyntheticSource::new(1.0, 6, 4, BLUE);
    for (i, effect) in EffectId::ALL.into_iter().enumerate() {
        c.render(Some(&a), Some(&b), 0.5, effect);
        assert_eq!(c.draw_count(), i as u64 + 1, "{effect}");
        let frame = c.last_frame().unwrap();
        assert_eq!(frame.data.len(), 12 * 8 * 4, "{effect}");
    }
}

#[test]
fn endpoints_show_one_source() {
    let mut c = cpu(6, 6);
    let a = SyntheticSource::new(1.0, 6, 6, RED);
    let b = SyntheticSource::new(1.0, 6, 6, BLUE);
    for effect in [EffectId::Fade, EffectId::WipeRight, EffectId::Dissolve] {
        c.render(Some(&a), Some(&b), 0.0, effect);
        assert_eq!(c.last_frame().unwrap().pixel(2, 2), RED, "{effect} at 0");
        c.render(Some(&a), Some(&b), 1.0, effect);
        assert_eq!(c.last_frame().unwrap().pixel(2, 2), BLUE, "{effect} at 1");
    }
}
