use std::{fmt, str::FromStr};

use crate::foundation::error::SegueError;

/// Closed set of transition effects.
///
/// Serialized as the kebab-case ids used in project files (`"wipe-left"`, `"page-curl"`).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum EffectId {
    Fade,
    Dissolve,
    WipeLeft,
    WipeRight,
    WipeUp,
    WipeDown,
    CircleWipe,
    DiamondWipe,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    ZoomIn,
    ZoomOut,
    ScaleRotate,
    Pixelate,
    BlurTransition,
    Glitch,
    Ripple,
    Swirl,
    Kaleidoscope,
    Dreamy,
    PageCurl,
    DirectionalWarp,
    Mosaic,
    RadialBlur,
    Crosshatch,
}

/// Grouping used when listing effects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectCategory {
    Basic,
    Wipe,
    Slide,
    ZoomScale,
    Shader,
}

impl EffectCategory {
    pub fn label(self) -> &'static str {
        match self {
            EffectCategory::Basic => "Basic",
            EffectCategory::Wipe => "Wipe",
            EffectCategory::Slide => "Slide",
            EffectCategory::ZoomScale => "Zoom & Scale",
            EffectCategory::Shader => "Shader",
        }
    }
}

/// Neutral timeline color for "no transition".
pub const NO_TRANSITION_COLOR: &str = "#64748b";

impl EffectId {
    pub const ALL: [EffectId; 27] = [
        EffectId::Fade,
        EffectId::Dissolve,
        EffectId::WipeLeft,
        EffectId::WipeRight,
        EffectId::WipeUp,
        EffectId::WipeDown,
        EffectId::CircleWipe,
        EffectId::DiamondWipe,
        EffectId::SlideLeft,
        EffectId::SlideRight,
        EffectId::SlideUp,
        EffectId::SlideDown,
        EffectId::ZoomIn,
        EffectId::ZoomOut,
        EffectId::ScaleRotate,
        EffectId::Pixelate,
        EffectId::BlurTransition,
        EffectId::Glitch,
        EffectId::Ripple,
        EffectId::Swirl,
        EffectId::Kaleidoscope,
        EffectId::Dreamy,
        EffectId::PageCurl,
        EffectId::DirectionalWarp,
        EffectId::Mosaic,
        EffectId::RadialBlur,
        EffectId::Crosshatch,
    ];

    pub fn id(self) -> &'static str {
        match self {
            EffectId::Fade => "fade",
            EffectId::Dissolve => "dissolve",
            EffectId::WipeLeft => "wipe-left",
            EffectId::WipeRight => "wipe-right",
            EffectId::WipeUp => "wipe-up",
            EffectId::WipeDown => "wipe-down",
            EffectId::CircleWipe => "circle-wipe",
            EffectId::DiamondWipe => "diamond-wipe",
            EffectId::SlideLeft => "slide-left",
            EffectId::SlideRight => "slide-right",
            EffectId::SlideUp => "slide-up",
            EffectId::SlideDown => "slide-down",
            EffectId::ZoomIn => "zoom-in",
            EffectId::ZoomOut => "zoom-out",
            EffectId::ScaleRotate => "scale-rotate",
            EffectId::Pixelate => "pixelate",
            EffectId::BlurTransition => "blur-transition",
            EffectId::Glitch => "glitch",
            EffectId::Ripple => "ripple",
            EffectId::Swirl => "swirl",
            EffectId::Kaleidoscope => "kaleidoscope",
            EffectId::Dreamy => "dreamy",
            EffectId::PageCurl => "page-curl",
            EffectId::DirectionalWarp => "directional-warp",
            EffectId::Mosaic => "mosaic",
            EffectId::RadialBlur => "radial-blur",
            EffectId::Crosshatch => "crosshatch",
        }
    }

    /// Parse an id, falling back to [`EffectId::Fade`] for anything unknown.
    pub fn from_id_or_fade(id: &str) -> Self {
        id.parse().unwrap_or(EffectId::Fade)
    }

    pub fn label(self) -> &'static str {
        match self {
            EffectId::Fade => "Fade",
            EffectId::Dissolve => "Cross Dissolve",
            EffectId::WipeLeft => "Wipe Left",
            EffectId::WipeRight => "Wipe Right",
            EffectId::WipeUp => "Wipe Up",
            EffectId::WipeDown => "Wipe Down",
            EffectId::CircleWipe => "Circle Wipe",
            EffectId::DiamondWipe => "Diamond Wipe",
            EffectId::SlideLeft => "Slide Left",
            EffectId::SlideRight => "Slide Right",
            EffectId::SlideUp => "Slide Up",
            EffectId::SlideDown => "Slide Down",
            EffectId::ZoomIn => "Zoom In",
            EffectId::ZoomOut => "Zoom Out",
            EffectId::ScaleRotate => "Scale & Rotate",
            EffectId::Pixelate => "Pixelate",
            EffectId::BlurTransition => "Blur Transition",
            EffectId::Glitch => "Glitch",
            EffectId::Ripple => "Ripple",
            EffectId::Swirl => "Swirl",
            EffectId::Kaleidoscope => "Kaleidoscope",
            EffectId::Dreamy => "Dreamy Blur",
            EffectId::PageCurl => "Page Curl",
            EffectId::DirectionalWarp => "Directional Warp",
            EffectId::Mosaic => "Mosaic",
            EffectId::RadialBlur => "Radial Blur",
            EffectId::Crosshatch => "Crosshatch Fade",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EffectId::Fade => "Simple opacity crossfade",
            EffectId::Dissolve => "Random dissolve with noise",
            EffectId::WipeLeft => "Hard edge sweeping in from the left",
            EffectId::WipeRight => "Hard edge sweeping in from the right",
            EffectId::WipeUp => "Hard edge sweeping in from the top",
            EffectId::WipeDown => "Hard edge sweeping in from the bottom",
            EffectId::CircleWipe => "Growing circle revealing the next clip",
            EffectId::DiamondWipe => "Growing diamond revealing the next clip",
            EffectId::SlideLeft => "Next clip slides in from the right",
            EffectId::SlideRight => "Next clip slides in from the left",
            EffectId::SlideUp => "Next clip slides in from below",
            EffectId::SlideDown => "Next clip slides in from above",
            EffectId::ZoomIn => "Next clip grows from the center",
            EffectId::ZoomOut => "Current clip shrinks into the center",
            EffectId::ScaleRotate => "Current clip spins away while shrinking",
            EffectId::Pixelate => "Pixelate out and back in",
            EffectId::BlurTransition => "Smooth blur crossfade",
            EffectId::Glitch => "Digital glitch effect with RGB split",
            EffectId::Ripple => "Water ripple distortion",
            EffectId::Swirl => "Spiral swirl effect",
            EffectId::Kaleidoscope => "Kaleidoscope mirror effect",
            EffectId::Dreamy => "Soft dreamy blur with glow",
            EffectId::PageCurl => "Page turning effect with shadow",
            EffectId::DirectionalWarp => "Wavy directional distortion",
            EffectId::Mosaic => "Animated mosaic tiles",
            EffectId::RadialBlur => "Radial zoom blur",
            EffectId::Crosshatch => "Crosshatch pattern fade",
        }
    }

    pub fn category(self) -> EffectCategory {
        use EffectId::*;
        match self {
            Fade | Dissolve => EffectCategory::Basic,
            WipeLeft | WipeRight | WipeUp | WipeDown | CircleWipe | DiamondWipe => {
                EffectCategory::Wipe
            }
            SlideLeft | SlideRight | SlideUp | SlideDown => EffectCategory::Slide,
            ZoomIn | ZoomOut | ScaleRotate => EffectCategory::ZoomScale,
            _ => EffectCategory::Shader,
        }
    }

    /// Timeline marker color (`#rrggbb`).
    pub fn color(self) -> &'static str {
        match self {
            EffectId::Fade => "#6366f1",
            EffectId::Dissolve => "#8b5cf6",
            EffectId::WipeLeft => "#ec4899",
            EffectId::WipeRight => "#f43f5e",
            EffectId::WipeUp => "#ef4444",
            EffectId::WipeDown => "#f97316",
            EffectId::CircleWipe => "#f59e0b",
            EffectId::DiamondWipe => "#eab308",
            EffectId::SlideLeft => "#84cc16",
            EffectId::SlideRight => "#22c55e",
            EffectId::SlideUp => "#10b981",
            EffectId::SlideDown => "#14b8a6",
            EffectId::ZoomIn => "#06b6d4",
            EffectId::ZoomOut => "#0ea5e9",
            EffectId::ScaleRotate => "#3b82f6",
            EffectId::Pixelate => "#6366f1",
            EffectId::BlurTransition => "#8b5cf6",
            EffectId::Glitch => "#a855f7",
            EffectId::Ripple => "#d946ef",
            EffectId::Swirl => "#e879f9",
            EffectId::Kaleidoscope => "#f0abfc",
            EffectId::Dreamy => "#c084fc",
            EffectId::PageCurl => "#a78bfa",
            EffectId::DirectionalWarp => "#818cf8",
            EffectId::Mosaic => "#6366f1",
            EffectId::RadialBlur => "#4f46e5",
            EffectId::Crosshatch => "#4338ca",
        }
    }

    /// Effects whose look implies both clips in motion for the whole window.
    ///
    /// Playback still keeps one live side per half (A before the boundary, B after), so
    /// during these effects one side shows a held frame.
    pub fn animates_both_sources(self) -> bool {
        matches!(
            self,
            EffectId::Swirl
                | EffectId::Ripple
                | EffectId::Kaleidoscope
                | EffectId::Dreamy
                | EffectId::DirectionalWarp
                | EffectId::RadialBlur
                | EffectId::Glitch
        )
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EffectId {
    type Err = SegueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        EffectId::ALL
            .into_iter()
            .find(|e| e.id() == s)
            .ok_or_else(|| SegueError::validation(format!("unknown effect id '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_and_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for e in EffectId::ALL {
            assert!(seen.insert(e.id()));
            assert_eq!(e.id().parse::<EffectId>().unwrap(), e);
        }
        assert_eq!(seen.len(), 27);
    }

    #[test]
    fn unknown_ids_fall_back_to_fade() {
        assert_eq!(EffectId::from_id_or_fade("star-wipe"), EffectId::Fade);
        assert_eq!(EffectId::from_id_or_fade(""), EffectId::Fade);
        assert_eq!(EffectId::from_id_or_fade("glitch"), EffectId::Glitch);
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&EffectId::BlurTransition).unwrap();
        assert_eq!(json, "\"blur-transition\"");
        let back: EffectId = serde_json::from_str("\"page-curl\"").unwrap();
        assert_eq!(back, EffectId::PageCurl);
    }

    #[test]
    fn colors_are_hex() {
        for e in EffectId::ALL {
            let c = e.color();
            assert_eq!(c.len(), 7);
            assert!(c.starts_with('#'));
            assert!(u32::from_str_radix(&c[1..], 16).is_ok());
        }
    }
}
