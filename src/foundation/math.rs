//! Scalar and vector helpers with shading-language semantics.
//!
//! The CPU compositor evaluates effects with these so that its output tracks the WGSL
//! programs closely (same `fract`, `smoothstep`, floored `mod`, and hash).

use std::ops::{Add, Div, Mul, Neg, Sub};

pub const PI: f32 = 3.14159;
pub const TAU: f32 = 6.28318;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct V2 {
    pub x: f32,
    pub y: f32,
}

impl V2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub const fn splat(v: f32) -> Self {
        Self { x: v, y: v }
    }

    pub fn dot(self, o: Self) -> f32 {
        self.x * o.x + self.y * o.y
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, o: Self) -> f32 {
        (self - o).length()
    }

    /// Zero-length input yields the zero vector instead of NaN.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > 0.0 { self / len } else { Self::default() }
    }

    pub fn floor(self) -> Self {
        Self::new(self.x.floor(), self.y.floor())
    }

    pub fn mul_v(self, o: Self) -> Self {
        Self::new(self.x * o.x, self.y * o.y)
    }

    pub fn div_v(self, o: Self) -> Self {
        Self::new(self.x / o.x, self.y / o.y)
    }

    pub fn in_unit_square(self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

impl Add for V2 {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for V2 {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f32> for V2 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

impl Div<f32> for V2 {
    type Output = Self;
    fn div(self, s: f32) -> Self {
        Self::new(self.x / s, self.y / s)
    }
}

impl Neg for V2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Straight RGBA color with channels in `[0, 1]`.
pub type Rgba = [f32; 4];

pub const TRANSPARENT: Rgba = [0.0; 4];

pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// Floored modulo, matching GLSL `mod`.
pub fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

pub fn mix4(a: Rgba, b: Rgba, t: f32) -> Rgba {
    [
        mix(a[0], b[0], t),
        mix(a[1], b[1], t),
        mix(a[2], b[2], t),
        mix(a[3], b[3], t),
    ]
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn step(edge: f32, x: f32) -> f32 {
    if x < edge { 0.0 } else { 1.0 }
}

/// Screen-space hash shared by dissolve, glitch and mosaic.
pub fn hash12(co: V2) -> f32 {
    fract(co.dot(V2::new(12.9898, 78.233)).sin() * 43758.5453)
}

pub fn scale4(c: Rgba, s: f32) -> Rgba {
    [c[0] * s, c[1] * s, c[2] * s, c[3] * s]
}

pub fn add4(a: Rgba, b: Rgba) -> Rgba {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]]
}

pub fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_mod_is_floored() {
        assert!((glsl_mod(-1.0, 3.0) - 2.0).abs() < 1e-6);
        assert!((glsl_mod(4.0, 3.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smoothstep_endpoints() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hash_is_in_unit_range_and_stable() {
        let a = hash12(V2::new(0.25, 0.75));
        let b = hash12(V2::new(0.25, 0.75));
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn normalize_zero_is_zero() {
        assert_eq!(V2::default().normalize(), V2::default());
    }
}
