//! Per-pixel Rust evaluation of the transition programs.
//!
//! Every kernel mirrors its WGSL counterpart in [`crate::effects::shaders`]: same constants,
//! same sampling coordinates. Textures are sampled bilinearly with clamp-to-edge addressing,
//! the way the GPU sampler is configured.

use rayon::prelude::*;

use crate::{
    effects::catalog::EffectId,
    foundation::{
        core::{FrameRGBA, Resolution},
        math::{
            PI, Rgba, TAU, TRANSPARENT, V2, add4, fract, glsl_mod, hash12, mix, mix4, scale4,
            smoothstep, step, unit_to_u8,
        },
    },
};

/// Read-only view of one texture slot. An empty slot samples as transparent black.
#[derive(Clone, Copy, Debug, Default)]
pub struct Texture<'a> {
    frame: Option<&'a FrameRGBA>,
}

impl<'a> Texture<'a> {
    pub fn new(frame: Option<&'a FrameRGBA>) -> Self {
        Self { frame }
    }

    pub fn sample(&self, uv: V2) -> Rgba {
        let Some(f) = self.frame else {
            return TRANSPARENT;
        };
        let w = f.width as i64;
        let h = f.height as i64;
        let x = uv.x * f.width as f32 - 0.5;
        let y = uv.y * f.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let texel = |xi: i64, yi: i64| -> Rgba {
            let xi = xi.clamp(0, w - 1) as usize;
            let yi = yi.clamp(0, h - 1) as usize;
            let i = (yi * f.width as usize + xi) * 4;
            [
                f.data[i] as f32 / 255.0,
                f.data[i + 1] as f32 / 255.0,
                f.data[i + 2] as f32 / 255.0,
                f.data[i + 3] as f32 / 255.0,
            ]
        };

        let top = mix4(texel(x0, y0), texel(x0 + 1, y0), fx);
        let bottom = mix4(texel(x0, y0 + 1), texel(x0 + 1, y0 + 1), fx);
        mix4(top, bottom, fy)
    }

    fn sample_or_clear(&self, uv: V2) -> Rgba {
        if uv.in_unit_square() {
            self.sample(uv)
        } else {
            TRANSPARENT
        }
    }
}

/// Inputs shared by every kernel invocation of one frame.
#[derive(Clone, Copy, Debug)]
pub struct EffectCtx<'a> {
    pub a: Texture<'a>,
    pub b: Texture<'a>,
    pub progress: f32,
    pub resolution: V2,
}

pub type Kernel = fn(&EffectCtx<'_>, V2) -> Rgba;

pub fn kernel_for(effect: EffectId) -> Kernel {
    match effect {
        EffectId::Fade => fade,
        EffectId::Dissolve => dissolve,
        EffectId::WipeLeft => |c, uv| wipe(c, uv, uv.x < c.progress),
        EffectId::WipeRight => |c, uv| wipe(c, uv, uv.x > 1.0 - c.progress),
        EffectId::WipeUp => |c, uv| wipe(c, uv, uv.y < c.progress),
        EffectId::WipeDown => |c, uv| wipe(c, uv, uv.y > 1.0 - c.progress),
        EffectId::CircleWipe => circle_wipe,
        EffectId::DiamondWipe => diamond_wipe,
        EffectId::SlideLeft => |c, uv| slide(c, uv, V2::new(1.0 - c.progress, 0.0)),
        EffectId::SlideRight => |c, uv| slide(c, uv, V2::new(c.progress - 1.0, 0.0)),
        EffectId::SlideUp => |c, uv| slide(c, uv, V2::new(0.0, 1.0 - c.progress)),
        EffectId::SlideDown => |c, uv| slide(c, uv, V2::new(0.0, c.progress - 1.0)),
        EffectId::ZoomIn => zoom_in,
        EffectId::ZoomOut => zoom_out,
        EffectId::ScaleRotate => scale_rotate,
        EffectId::Pixelate => pixelate,
        EffectId::BlurTransition => blur_transition,
        EffectId::Glitch => glitch,
        EffectId::Ripple => ripple,
        EffectId::Swirl => swirl,
        EffectId::Kaleidoscope => kaleidoscope,
        EffectId::Dreamy => dreamy,
        EffectId::PageCurl => page_curl,
        EffectId::DirectionalWarp => directional_warp,
        EffectId::Mosaic => mosaic,
        EffectId::RadialBlur => radial_blur,
        EffectId::Crosshatch => crosshatch,
    }
}

const CENTER: V2 = V2::splat(0.5);

fn fade(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    mix4(c.a.sample(uv), c.b.sample(uv), c.progress)
}

fn dissolve(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let noise = hash12(uv);
    let threshold = c.progress * 1.2 - 0.1;
    let alpha = smoothstep(threshold, threshold + 0.1, noise);
    mix4(c.b.sample(uv), c.a.sample(uv), alpha)
}

fn wipe(c: &EffectCtx<'_>, uv: V2, show_b: bool) -> Rgba {
    if show_b { c.b.sample(uv) } else { c.a.sample(uv) }
}

fn circle_wipe(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let dist = uv.distance(CENTER);
    let radius = c.progress * 0.707;
    let edge = 0.02;
    let alpha = smoothstep(radius - edge, radius + edge, dist);
    mix4(c.b.sample(uv), c.a.sample(uv), alpha)
}

fn diamond_wipe(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let d = uv - CENTER;
    let dist = d.x.abs() + d.y.abs();
    let edge = 0.02;
    let alpha = smoothstep(c.progress - edge, c.progress + edge, dist);
    mix4(c.b.sample(uv), c.a.sample(uv), alpha)
}

fn slide(c: &EffectCtx<'_>, uv: V2, offset: V2) -> Rgba {
    let shifted = uv + offset;
    if shifted.in_unit_square() {
        c.b.sample(shifted)
    } else {
        c.a.sample(uv)
    }
}

fn zoomed(uv: V2, scale: f32) -> V2 {
    CENTER + (uv - CENTER) / scale.max(0.001)
}

fn zoom_in(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let c2 = c.b.sample_or_clear(zoomed(uv, c.progress));
    mix4(c.a.sample(uv), c2, c.progress)
}

fn zoom_out(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let c1 = c.a.sample_or_clear(zoomed(uv, 1.0 - c.progress));
    mix4(c1, c.b.sample(uv), c.progress)
}

fn scale_rotate(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let angle = c.progress * PI / 2.0;
    let scale = 1.0 - c.progress * 0.5;
    let pos = uv - CENTER;
    let (s, co) = angle.sin_cos();
    let rotated = V2::new(pos.x * co - pos.y * s, pos.x * s + pos.y * co) / scale + CENTER;
    mix4(
        c.a.sample_or_clear(rotated),
        c.b.sample(uv),
        c.progress,
    )
}

fn pixelate(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let size = mix(1.0, 50.0, (c.progress * PI).sin());
    let px = (uv.mul_v(c.resolution) / size).floor() * size;
    let coord = px.div_v(c.resolution);
    mix4(c.a.sample(coord), c.b.sample(coord), c.progress)
}

const BLUR_WEIGHTS: [f32; 9] = [0.05, 0.09, 0.12, 0.15, 0.16, 0.15, 0.12, 0.09, 0.05];

fn blur9(t: &Texture<'_>, uv: V2, amount: f32, res: V2) -> Rgba {
    let blur_size = amount / res.x;
    let mut sum = TRANSPARENT;
    for (i, w) in BLUR_WEIGHTS.iter().enumerate() {
        let offset = V2::new((i as f32 - 4.0) * blur_size, 0.0);
        sum = add4(sum, scale4(t.sample(uv + offset), *w));
    }
    sum
}

fn blur_transition(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let amount = (c.progress * PI).sin() * 20.0;
    mix4(
        blur9(&c.a, uv, amount, c.resolution),
        blur9(&c.b, uv, amount, c.resolution),
        c.progress,
    )
}

fn glitch(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let amount = (c.progress * PI).sin() * 0.5;
    let offset = V2::new((hash12(V2::new(uv.y, c.progress)) - 0.5) * amount, 0.0);
    let mut c1 = c.a.sample(uv + offset);
    let mut c2 = c.b.sample(uv - offset);
    c1[0] = c.a.sample(uv + offset * 2.0)[0];
    c2[2] = c.b.sample(uv - offset * 2.0)[2];
    mix4(c1, c2, c.progress)
}

fn ripple(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let dist = uv.distance(CENTER);
    let amount = ((dist - c.progress) * 30.0).sin() * 0.02;
    let coord = uv + (uv - CENTER).normalize() * amount;
    mix4(c.a.sample(coord), c.b.sample(coord), c.progress)
}

fn swirl(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let pos = uv - CENTER;
    let dist = pos.length();
    let angle = pos.y.atan2(pos.x);
    let a1 = angle + c.progress * TAU * (1.0 - dist);
    let a2 = angle + (1.0 - c.progress) * TAU * (1.0 - dist);
    let c1 = c.a.sample(CENTER + V2::new(a1.cos(), a1.sin()) * dist);
    let c2 = c.b.sample(CENTER + V2::new(a2.cos(), a2.sin()) * dist);
    mix4(c1, c2, c.progress)
}

fn kaleidoscope(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let pos = uv - CENTER;
    let base_angle = pos.y.atan2(pos.x);
    let radius = pos.length();
    let segment = TAU / 6.0;
    let mut angle = glsl_mod(base_angle, segment);
    if glsl_mod(((base_angle + PI) / segment).floor(), 2.0) < 1.0 {
        angle = segment - angle;
    }
    let coord = CENTER + V2::new(angle.cos(), angle.sin()) * radius;
    mix4(
        c.a.sample(coord),
        c.b.sample(coord),
        smoothstep(0.0, 1.0, c.progress),
    )
}

fn dream_blur(t: &Texture<'_>, uv: V2, res: V2) -> Rgba {
    let blur_size = 2.0 / res.x;
    let mut sum = TRANSPARENT;
    for x in -3..=3 {
        for y in -3..=3 {
            sum = add4(sum, t.sample(uv + V2::new(x as f32, y as f32) * blur_size));
        }
    }
    scale4(sum, 1.0 / 49.0)
}

fn dreamy(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let factor = (c.progress * PI).sin();
    let c1 = mix4(c.a.sample(uv), dream_blur(&c.a, uv, c.resolution), factor);
    let c2 = mix4(c.b.sample(uv), dream_blur(&c.b, uv, c.resolution), factor);
    let mut out = mix4(c1, c2, c.progress);
    out[0] += 0.1 * factor;
    out[1] += 0.05 * factor;
    out[2] += 0.15 * factor;
    out
}

fn page_curl(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let curl_amount = 1.0 - c.progress * 1.2;
    let curl = smoothstep(curl_amount - 0.3, curl_amount + 0.1, uv.x);
    let shadow = smoothstep(curl_amount, curl_amount + 0.2, uv.x)
        * (1.0 - smoothstep(curl_amount + 0.2, curl_amount + 0.4, uv.x));
    let mut c1 = c.a.sample(uv);
    let dim = 1.0 - shadow * 0.6;
    c1[0] *= dim;
    c1[1] *= dim;
    c1[2] *= dim;
    mix4(c1, c.b.sample(uv), curl)
}

fn directional_warp(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let warp = (c.progress * PI).sin() * 0.1;
    let shift = V2::new(warp * (uv.y * 10.0).sin(), 0.0);
    mix4(c.a.sample(uv + shift), c.b.sample(uv - shift), c.progress)
}

fn mosaic(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let cells = mix(1.0, 30.0, (c.progress * PI).sin());
    let cell_size = V2::splat(1.0 / cells);
    let cell = uv.div_v(cell_size).floor();
    let center = (cell + V2::splat(0.5)).mul_v(cell_size);
    if hash12(cell) < c.progress {
        c.b.sample(center)
    } else {
        c.a.sample(center)
    }
}

fn radial_blur_sample(t: &Texture<'_>, uv: V2, amount: f32) -> Rgba {
    let dir = uv - CENTER;
    let mut sum = TRANSPARENT;
    for i in 0..10 {
        let scale = 1.0 - amount * (i as f32 / 10.0) * 0.5;
        sum = add4(sum, t.sample(CENTER + dir * scale));
    }
    scale4(sum, 0.1)
}

fn radial_blur(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let amount = (c.progress * PI).sin() * 2.0;
    mix4(
        radial_blur_sample(&c.a, uv, amount),
        radial_blur_sample(&c.b, uv, amount),
        c.progress,
    )
}

fn hatch(coord: V2, angle: f32, spacing: f32) -> f32 {
    let (s, co) = angle.sin_cos();
    let rotated_x = coord.x * co - coord.y * s;
    step(0.5, fract(rotated_x * spacing))
}

fn crosshatch(c: &EffectCtx<'_>, uv: V2) -> Rgba {
    let density = mix(5.0, 50.0, c.progress);
    let pattern = hatch(uv.mul_v(c.resolution) / 100.0, 0.785, density);
    mix4(c.a.sample(uv), c.b.sample(uv), pattern * c.progress)
}

/// Evaluate `kernel` for every output pixel into `out` (rgba8, rows top to bottom).
pub fn composite_into(
    out: &mut [u8],
    size: Resolution,
    kernel: Kernel,
    a: Option<&FrameRGBA>,
    b: Option<&FrameRGBA>,
    progress: f32,
) {
    let ctx = EffectCtx {
        a: Texture::new(a),
        b: Texture::new(b),
        progress: progress.clamp(0.0, 1.0),
        resolution: V2::new(size.width as f32, size.height as f32),
    };
    let row_bytes = size.width as usize * 4;
    let (w, h) = (size.width as f32, size.height as f32);
    out.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let v = (y as f32 + 0.5) / h;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let uv = V2::new((x as f32 + 0.5) / w, v);
                let c = kernel(&ctx, uv);
                px[0] = unit_to_u8(c[0]);
                px[1] = unit_to_u8(c[1]);
                px[2] = unit_to_u8(c[2]);
                px[3] = unit_to_u8(c[3]);
            }
        });
}

/// Convenience wrapper producing a fresh frame.
pub fn composite(
    effect: EffectId,
    a: Option<&FrameRGBA>,
    b: Option<&FrameRGBA>,
    progress: f32,
    size: Resolution,
) -> FrameRGBA {
    let mut data = vec![0u8; size.byte_len()];
    composite_into(&mut data, size, kernel_for(effect), a, b, progress);
    FrameRGBA {
        width: size.width,
        height: size.height,
        data,
        premultiplied: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn size(w: u32, h: u32) -> Resolution {
        Resolution {
            width: w,
            height: h,
        }
    }

    #[test]
    fn solid_texture_samples_exactly() {
        let f = FrameRGBA::solid(3, 3, RED);
        let t = Texture::new(Some(&f));
        assert_eq!(t.sample(V2::new(0.0, 0.0)), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.sample(V2::new(2.0, -1.0)), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_slot_is_transparent() {
        assert_eq!(Texture::new(None).sample(V2::splat(0.5)), TRANSPARENT);
    }

    #[test]
    fn fade_endpoints_return_sources() {
        let a = FrameRGBA::solid(4, 4, RED);
        let b = FrameRGBA::solid(4, 4, BLUE);
        let at0 = composite(EffectId::Fade, Some(&a), Some(&b), 0.0, size(4, 4));
        let at1 = composite(EffectId::Fade, Some(&a), Some(&b), 1.0, size(4, 4));
        assert_eq!(at0.data, a.data);
        assert_eq!(at1.data, b.data);
    }

    #[test]
    fn fade_midpoint_blends() {
        let a = FrameRGBA::solid(2, 2, RED);
        let b = FrameRGBA::solid(2, 2, BLUE);
        let mid = composite(EffectId::Fade, Some(&a), Some(&b), 0.5, size(2, 2));
        assert_eq!(mid.pixel(0, 0), [128, 0, 128, 255]);
    }

    #[test]
    fn wipe_left_splits_at_progress_column() {
        let a = FrameRGBA::solid(10, 2, RED);
        let b = FrameRGBA::solid(10, 2, BLUE);
        let f = composite(EffectId::WipeLeft, Some(&a), Some(&b), 0.5, size(10, 2));
        for x in 0..5 {
            assert_eq!(f.pixel(x, 0), BLUE);
        }
        for x in 5..10 {
            assert_eq!(f.pixel(x, 1), RED);
        }
    }

    #[test]
    fn wipe_down_reveals_from_bottom() {
        let a = FrameRGBA::solid(2, 10, RED);
        let b = FrameRGBA::solid(2, 10, BLUE);
        let f = composite(EffectId::WipeDown, Some(&a), Some(&b), 0.3, size(2, 10));
        assert_eq!(f.pixel(0, 9), BLUE);
        assert_eq!(f.pixel(0, 0), RED);
    }

    #[test]
    fn slide_left_at_zero_shows_only_a() {
        let a = FrameRGBA::solid(8, 8, RED);
        let b = FrameRGBA::solid(8, 8, BLUE);
        let f = composite(EffectId::SlideLeft, Some(&a), Some(&b), 0.0, size(8, 8));
        assert_eq!(f.pixel(0, 0), RED);
        assert_eq!(f.pixel(6, 4), RED);
    }

    #[test]
    fn dissolve_and_mosaic_are_deterministic() {
        let a = FrameRGBA::solid(16, 16, RED);
        let b = FrameRGBA::solid(16, 16, BLUE);
        for e in [EffectId::Dissolve, EffectId::Mosaic, EffectId::Glitch] {
            let x = composite(e, Some(&a), Some(&b), 0.4, size(16, 16));
            let y = composite(e, Some(&a), Some(&b), 0.4, size(16, 16));
            assert_eq!(x, y, "{e}");
        }
    }

    #[test]
    fn start_transition_fades_in_from_transparent() {
        let b = FrameRGBA::solid(2, 2, BLUE);
        let f = composite(EffectId::Fade, None, Some(&b), 0.25, size(2, 2));
        assert_eq!(f.pixel(0, 0), [0, 0, 64, 64]);
    }

    #[test]
    fn every_effect_renders_full_frame() {
        let a = FrameRGBA::solid(6, 4, RED);
        let b = FrameRGBA::solid(6, 4, BLUE);
        for e in EffectId::ALL {
            let f = composite(e, Some(&a), Some(&b), 0.5, size(6, 4));
            assert_eq!(f.data.len(), 6 * 4 * 4, "{e}");
        }
    }

    #[test]
    fn sources_of_other_sizes_are_stretched() {
        let a = FrameRGBA::solid(3, 7, RED);
        let f = composite(EffectId::Fade, Some(&a), None, 0.0, size(8, 8));
        assert!(f.data.chunks_exact(4).all(|p| p == RED));
    }
}
