//! WGSL programs for every transition effect.
//!
//! Each effect contributes a fragment body (and optionally helper functions); the shared
//! prelude supplies the vertex stage, the four bindings and the sampling helpers. Every
//! program therefore sees the same contract: `texture_a`, `texture_b`, a sampler, and a
//! uniform block carrying `progress` and `resolution`.

use crate::effects::catalog::EffectId;

/// Entry point names used when building pipelines.
pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Byte size of the uniform block: `progress`, padding, `resolution`.
pub const UNIFORM_SIZE: u64 = 16;

const PRELUDE: &str = r#"
struct Uniforms {
    progress: f32,
    _pad: f32,
    resolution: vec2<f32>,
}

@group(0) @binding(0) var texture_a: texture_2d<f32>;
@group(0) @binding(1) var texture_b: texture_2d<f32>;
@group(0) @binding(2) var frame_sampler: sampler;
@group(0) @binding(3) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOut {
    var v_out: VertexOut;
    v_out.position = vec4<f32>(position, 0.0, 1.0);
    v_out.uv = uv;
    return v_out;
}

const PI: f32 = 3.14159;
const TAU: f32 = 6.28318;

fn hash12(co: vec2<f32>) -> f32 {
    return fract(sin(dot(co, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

fn glsl_mod(x: f32, y: f32) -> f32 {
    return x - y * floor(x / y);
}

fn in_bounds(uv: vec2<f32>) -> bool {
    return all(uv >= vec2<f32>(0.0)) && all(uv <= vec2<f32>(1.0));
}

fn sample_a(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(texture_a, frame_sampler, uv, 0.0);
}

fn sample_b(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(texture_b, frame_sampler, uv, 0.0);
}

fn sample_or_clear(t: texture_2d<f32>, uv: vec2<f32>) -> vec4<f32> {
    let c = textureSampleLevel(t, frame_sampler, uv, 0.0);
    return select(vec4<f32>(0.0), c, in_bounds(uv));
}
"#;

struct EffectProgram {
    helpers: &'static str,
    body: &'static str,
}

const fn body(body: &'static str) -> EffectProgram {
    EffectProgram { helpers: "", body }
}

const fn with_helpers(helpers: &'static str, body: &'static str) -> EffectProgram {
    EffectProgram { helpers, body }
}

fn program(effect: EffectId) -> EffectProgram {
    match effect {
        EffectId::Fade => body("return mix(sample_a(uv), sample_b(uv), p);"),
        EffectId::Dissolve => body(
            r#"
    let c1 = sample_a(uv);
    let c2 = sample_b(uv);
    let noise = hash12(uv);
    let threshold = p * 1.2 - 0.1;
    let alpha = smoothstep(threshold, threshold + 0.1, noise);
    return mix(c2, c1, alpha);"#,
        ),
        EffectId::WipeLeft => body("return select(sample_a(uv), sample_b(uv), uv.x < p);"),
        EffectId::WipeRight => body("return select(sample_a(uv), sample_b(uv), uv.x > 1.0 - p);"),
        EffectId::WipeUp => body("return select(sample_a(uv), sample_b(uv), uv.y < p);"),
        EffectId::WipeDown => body("return select(sample_a(uv), sample_b(uv), uv.y > 1.0 - p);"),
        EffectId::CircleWipe => body(
            r#"
    let dist = distance(uv, vec2<f32>(0.5));
    let radius = p * 0.707;
    let edge = 0.02;
    let alpha = smoothstep(radius - edge, radius + edge, dist);
    return mix(sample_b(uv), sample_a(uv), alpha);"#,
        ),
        EffectId::DiamondWipe => body(
            r#"
    let center = uv - vec2<f32>(0.5);
    let dist = abs(center.x) + abs(center.y);
    let edge = 0.02;
    let alpha = smoothstep(p - edge, p + edge, dist);
    return mix(sample_b(uv), sample_a(uv), alpha);"#,
        ),
        EffectId::SlideLeft => body(SLIDE_LEFT),
        EffectId::SlideRight => body(SLIDE_RIGHT),
        EffectId::SlideUp => body(SLIDE_UP),
        EffectId::SlideDown => body(SLIDE_DOWN),
        EffectId::ZoomIn => body(
            r#"
    let c1 = sample_a(uv);
    let scale = p;
    let scaled = vec2<f32>(0.5) + (uv - vec2<f32>(0.5)) / max(scale, 0.001);
    let c2 = sample_or_clear(texture_b, scaled);
    return mix(c1, c2, p);"#,
        ),
        EffectId::ZoomOut => body(
            r#"
    let c2 = sample_b(uv);
    let scale = 1.0 - p;
    let scaled = vec2<f32>(0.5) + (uv - vec2<f32>(0.5)) / max(scale, 0.001);
    let c1 = sample_or_clear(texture_a, scaled);
    return mix(c1, c2, p);"#,
        ),
        EffectId::ScaleRotate => body(
            r#"
    let c2 = sample_b(uv);
    let angle = p * PI / 2.0;
    let scale = 1.0 - p * 0.5;
    let pos = uv - vec2<f32>(0.5);
    let s = sin(angle);
    let c = cos(angle);
    let rotated = vec2<f32>(pos.x * c - pos.y * s, pos.x * s + pos.y * c) / scale + vec2<f32>(0.5);
    let c1 = sample_or_clear(texture_a, rotated);
    return mix(c1, c2, p);"#,
        ),
        EffectId::Pixelate => body(
            r#"
    let pixel_size = mix(1.0, 50.0, sin(p * PI));
    let pixelated = floor(uv * res / pixel_size) * pixel_size / res;
    return mix(sample_a(pixelated), sample_b(pixelated), p);"#,
        ),
        EffectId::BlurTransition => with_helpers(
            r#"
fn blur9(t: texture_2d<f32>, uv: vec2<f32>, amount: f32) -> vec4<f32> {
    var weights = array<f32, 9>(0.05, 0.09, 0.12, 0.15, 0.16, 0.15, 0.12, 0.09, 0.05);
    let blur_size = amount / u.resolution.x;
    var sum = vec4<f32>(0.0);
    for (var i = 0; i < 9; i++) {
        let offset = vec2<f32>(f32(i - 4) * blur_size, 0.0);
        sum += textureSampleLevel(t, frame_sampler, uv + offset, 0.0) * weights[i];
    }
    return sum;
}
"#,
            r#"
    let amount = sin(p * PI) * 20.0;
    return mix(blur9(texture_a, uv, amount), blur9(texture_b, uv, amount), p);"#,
        ),
        EffectId::Glitch => body(
            r#"
    let amount = sin(p * PI) * 0.5;
    let offset = vec2<f32>((hash12(vec2<f32>(uv.y, p)) - 0.5) * amount, 0.0);
    var c1 = sample_a(uv + offset);
    var c2 = sample_b(uv - offset);
    c1.r = sample_a(uv + offset * 2.0).r;
    c2.b = sample_b(uv - offset * 2.0).b;
    return mix(c1, c2, p);"#,
        ),
        EffectId::Ripple => body(
            r#"
    let center = vec2<f32>(0.5);
    let dist = distance(uv, center);
    let ripple = sin((dist - p) * 30.0) * 0.02;
    let coord = uv + normalize(uv - center) * ripple;
    return mix(sample_a(coord), sample_b(coord), p);"#,
        ),
        EffectId::Swirl => body(
            r#"
    let center = vec2<f32>(0.5);
    let pos = uv - center;
    let dist = length(pos);
    let angle = atan2(pos.y, pos.x);
    let angle1 = angle + p * TAU * (1.0 - dist);
    let angle2 = angle + (1.0 - p) * TAU * (1.0 - dist);
    let c1 = sample_a(center + dist * vec2<f32>(cos(angle1), sin(angle1)));
    let c2 = sample_b(center + dist * vec2<f32>(cos(angle2), sin(angle2)));
    return mix(c1, c2, p);"#,
        ),
        EffectId::Kaleidoscope => body(
            r#"
    let center = vec2<f32>(0.5);
    let pos = uv - center;
    let base_angle = atan2(pos.y, pos.x);
    let radius = length(pos);
    let segment = TAU / 6.0;
    var angle = glsl_mod(base_angle, segment);
    if (glsl_mod(floor((base_angle + PI) / segment), 2.0) < 1.0) {
        angle = segment - angle;
    }
    let coord = center + radius * vec2<f32>(cos(angle), sin(angle));
    return mix(sample_a(coord), sample_b(coord), smoothstep(0.0, 1.0, p));"#,
        ),
        EffectId::Dreamy => with_helpers(
            r#"
fn dream_blur(t: texture_2d<f32>, uv: vec2<f32>) -> vec4<f32> {
    let blur_size = 2.0 / u.resolution.x;
    var sum = vec4<f32>(0.0);
    for (var x = -3.0; x <= 3.0; x += 1.0) {
        for (var y = -3.0; y <= 3.0; y += 1.0) {
            sum += textureSampleLevel(t, frame_sampler, uv + vec2<f32>(x, y) * blur_size, 0.0);
        }
    }
    return sum / 49.0;
}
"#,
            r#"
    let factor = sin(p * PI);
    let c1 = mix(sample_a(uv), dream_blur(texture_a, uv), factor);
    let c2 = mix(sample_b(uv), dream_blur(texture_b, uv), factor);
    let blended = mix(c1, c2, p);
    return vec4<f32>(blended.rgb + vec3<f32>(0.1, 0.05, 0.15) * factor, blended.a);"#,
        ),
        EffectId::PageCurl => body(
            r#"
    let curl_amount = 1.0 - p * 1.2;
    let curl = smoothstep(curl_amount - 0.3, curl_amount + 0.1, uv.x);
    let shadow = smoothstep(curl_amount, curl_amount + 0.2, uv.x)
        * (1.0 - smoothstep(curl_amount + 0.2, curl_amount + 0.4, uv.x));
    let a = sample_a(uv);
    let c1 = vec4<f32>(a.rgb * (1.0 - shadow * 0.6), a.a);
    return mix(c1, sample_b(uv), curl);"#,
        ),
        EffectId::DirectionalWarp => body(
            r#"
    let warp = sin(p * PI) * 0.1;
    let shift = vec2<f32>(warp * sin(uv.y * 10.0), 0.0);
    return mix(sample_a(uv + shift), sample_b(uv - shift), p);"#,
        ),
        EffectId::Mosaic => body(
            r#"
    let cells = mix(1.0, 30.0, sin(p * PI));
    let cell_size = vec2<f32>(1.0 / cells);
    let cell = floor(uv / cell_size);
    let cell_center = (cell + vec2<f32>(0.5)) * cell_size;
    let random = hash12(cell);
    return select(sample_a(cell_center), sample_b(cell_center), random < p);"#,
        ),
        EffectId::RadialBlur => with_helpers(
            r#"
fn radial_blur(t: texture_2d<f32>, uv: vec2<f32>, amount: f32) -> vec4<f32> {
    let center = vec2<f32>(0.5);
    let dir = uv - center;
    var sum = vec4<f32>(0.0);
    for (var i = 0.0; i < 10.0; i += 1.0) {
        let scale = 1.0 - amount * (i / 10.0) * 0.5;
        sum += textureSampleLevel(t, frame_sampler, center + dir * scale, 0.0);
    }
    return sum / 10.0;
}
"#,
            r#"
    let amount = sin(p * PI) * 2.0;
    return mix(radial_blur(texture_a, uv, amount), radial_blur(texture_b, uv, amount), p);"#,
        ),
        EffectId::Crosshatch => with_helpers(
            r#"
fn hatch(coord: vec2<f32>, angle: f32, spacing: f32) -> f32 {
    let s = sin(angle);
    let c = cos(angle);
    let rotated = vec2<f32>(coord.x * c - coord.y * s, coord.x * s + coord.y * c);
    return step(0.5, fract(rotated.x * spacing));
}
"#,
            r#"
    let density = mix(5.0, 50.0, p);
    let pattern = hatch(uv * res / 100.0, 0.785, density);
    return mix(sample_a(uv), sample_b(uv), pattern * p);"#,
        ),
    }
}

macro_rules! slide_body {
    ($offset:literal) => {
        concat!(
            "\n    let shifted = uv + ",
            $offset,
            ";\n    return select(sample_b(shifted), sample_a(uv), !in_bounds(shifted));"
        )
    };
}

const SLIDE_LEFT: &str = slide_body!("vec2<f32>(1.0 - p, 0.0)");
const SLIDE_RIGHT: &str = slide_body!("vec2<f32>(p - 1.0, 0.0)");
const SLIDE_UP: &str = slide_body!("vec2<f32>(0.0, 1.0 - p)");
const SLIDE_DOWN: &str = slide_body!("vec2<f32>(0.0, p - 1.0)");

/// Complete WGSL module for `effect`.
pub fn shader_source(effect: EffectId) -> String {
    let EffectProgram { helpers, body } = program(effect);
    let mut src = String::with_capacity(PRELUDE.len() + helpers.len() + body.len() + 256);
    src.push_str("// effect: ");
    src.push_str(effect.id());
    src.push('\n');
    src.push_str(PRELUDE);
    src.push_str(helpers);
    src.push_str(
        "\n@fragment\nfn fs_main(frag: VertexOut) -> @location(0) vec4<f32> {\n    let uv = frag.uv;\n    let p = u.progress;\n    let res = u.resolution;\n",
    );
    src.push_str(body);
    src.push_str("\n}\n");
    src
}

/// Like [`shader_source`] but keyed by id; unknown ids get the fade program.
pub fn shader_source_for_id(id: &str) -> String {
    shader_source(EffectId::from_id_or_fade(id))
}
