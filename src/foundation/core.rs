use crate::foundation::error::{SegueError, SegueResult};

/// Offset kept between a clip's local time and its duration so the terminal frame is
/// always a decodable position.
pub const CLIP_END_EPSILON: f64 = 0.01;

/// Tolerance used by the playback driver to decide that the timeline has finished.
pub const PLAYBACK_END_EPSILON: f64 = 0.015;

/// Output pixel dimensions of the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> SegueResult<Self> {
        if width == 0 || height == 0 {
            return Err(SegueError::validation(format!(
                "resolution must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Round both dimensions down to even values (yuv420p encoders require it).
    pub fn even(self) -> Self {
        Self {
            width: (self.width & !1).max(2),
            height: (self.height & !1).max(2),
        }
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_len(self) -> usize {
        self.pixel_count() * 4
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGBA8 frame, rows top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn new(width: u32, height: u32, data: Vec<u8>, premultiplied: bool) -> SegueResult<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(SegueError::validation(format!(
                "frame buffer of {} bytes does not match {width}x{height} rgba8",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            premultiplied,
        })
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
            premultiplied: rgba[3] == 255,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Coerce a time value into `[0, max]`, mapping NaN to zero.
pub fn clamp_time(t: f64, max: f64) -> f64 {
    if t.is_nan() { 0.0 } else { t.clamp(0.0, max.max(0.0)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rejects_zero() {
        assert!(Resolution::new(0, 10).is_err());
        assert!(Resolution::new(10, 0).is_err());
        assert!(Resolution::new(1, 1).is_ok());
    }

    #[test]
    fn even_rounds_down_with_floor_of_two() {
        let r = Resolution {
            width: 641,
            height: 1,
        };
        assert_eq!(
            r.even(),
            Resolution {
                width: 640,
                height: 2
            }
        );
    }

    #[test]
    fn frame_new_checks_length() {
        assert!(FrameRGBA::new(2, 2, vec![0; 15], false).is_err());
        let f = FrameRGBA::new(2, 2, vec![7; 16], false).unwrap();
        assert_eq!(f.pixel(1, 1), [7, 7, 7, 7]);
    }

    #[test]
    fn clamp_time_handles_nan_and_range() {
        assert_eq!(clamp_time(f64::NAN, 5.0), 0.0);
        assert_eq!(clamp_time(-1.0, 5.0), 0.0);
        assert_eq!(clamp_time(9.0, 5.0), 5.0);
        assert_eq!(clamp_time(2.5, 5.0), 2.5);
    }
}
