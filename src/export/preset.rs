use std::{collections::HashSet, fmt, process::Command, str::FromStr};

use tracing::{debug, info};

use crate::foundation::error::{SegueError, SegueResult};

/// Output quality: frame rate and target video bitrate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    High,
    Medium,
    Low,
}

impl QualityPreset {
    pub fn fps(self) -> u32 {
        match self {
            QualityPreset::High => 30,
            QualityPreset::Medium => 24,
            QualityPreset::Low => 20,
        }
    }

    /// Target bitrate in bits per second.
    pub fn bitrate(self) -> u32 {
        match self {
            QualityPreset::High => 5_000_000,
            QualityPreset::Medium => 2_500_000,
            QualityPreset::Low => 1_000_000,
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityPreset::High => "high",
            QualityPreset::Medium => "medium",
            QualityPreset::Low => "low",
        })
    }
}

impl FromStr for QualityPreset {
    type Err = SegueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(QualityPreset::High),
            "medium" => Ok(QualityPreset::Medium),
            "low" => Ok(QualityPreset::Low),
            other => Err(SegueError::validation(format!(
                "unknown quality '{other}' (expected high, medium or low)"
            ))),
        }
    }
}

/// An encoder and the container it is written into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecChoice {
    pub encoder: &'static str,
    pub extension: &'static str,
    pub mime: &'static str,
}

/// Encoders in order of preference.
pub const CODEC_PREFERENCE: [CodecChoice; 3] = [
    CodecChoice {
        encoder: "libvpx-vp9",
        extension: "webm",
        mime: "video/webm;codecs=vp9",
    },
    CodecChoice {
        encoder: "libvpx",
        extension: "webm",
        mime: "video/webm;codecs=vp8",
    },
    CodecChoice {
        encoder: "libx264",
        extension: "mp4",
        mime: "video/mp4",
    },
];

impl CodecChoice {
    /// ffmpeg output arguments for this codec at `bitrate` bits per second.
    pub fn output_args(&self, bitrate: u32) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-c:v".into(),
            self.encoder.into(),
            "-b:v".into(),
            bitrate.to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ];
        match self.extension {
            "mp4" => args.extend(["-movflags".into(), "+faststart".into()]),
            _ => args.extend(["-deadline".into(), "realtime".into()]),
        }
        args
    }
}

impl fmt::Display for CodecChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.encoder, self.mime)
    }
}

/// First codec in [`CODEC_PREFERENCE`] that `is_supported` accepts.
pub fn negotiate_codec(is_supported: impl Fn(&str) -> bool) -> SegueResult<CodecChoice> {
    for choice in CODEC_PREFERENCE {
        if is_supported(choice.encoder) {
            info!(codec = %choice, "export codec negotiated");
            return Ok(choice);
        }
        debug!(encoder = choice.encoder, "encoder unavailable");
    }
    Err(SegueError::export(
        "no supported video encoder found (tried libvpx-vp9, libvpx, libx264)",
    ))
}

/// Encoder names listed by `ffmpeg -encoders`.
pub fn ffmpeg_encoders() -> SegueResult<HashSet<String>> {
    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| SegueError::export(format!("failed to run ffmpeg -encoders: {e}")))?;
    if !out.status.success() {
        return Err(SegueError::export(format!(
            "ffmpeg -encoders exited with status {}",
            out.status
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&out.stdout)))
}

/// Parse the table printed by `ffmpeg -encoders`: a legend, a `------` separator, then one
/// `<flags> <name> <description>` row per encoder.
fn parse_encoder_list(text: &str) -> HashSet<String> {
    text.lines()
        .skip_while(|l| !l.trim_start().starts_with("---"))
        .skip(1)
        .filter_map(|l| {
            let mut parts = l.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}

/// Final artifact name, `segue-YYYYmmdd-HHMMSS.<ext>`.
pub fn artifact_file_name(stamp: chrono::NaiveDateTime, extension: &str) -> String {
    format!("segue-{}.{extension}", stamp.format("%Y%m%d-%H%M%S"))
}
