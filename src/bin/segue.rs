use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use segue::{
    BackendKind, EffectId, ExportOptions, ExportPipeline, ExportScope, IngestOptions,
    PlaybackDriver, ProjectFile, QualityPreset, Resolution, SyntheticSource, Timeline,
    TransitionAnchor,
    timeline::Clip,
};

#[derive(Parser, Debug)]
#[command(name = "segue", version, about = "Video clip timelines with shader transitions")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available transition effects.
    Effects {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the WGSL program for an effect (unknown ids print `fade`).
    Shader { effect: String },
    /// Print the resolved playback state at one or more times as JSON lines.
    Resolve(ResolveArgs),
    /// Composite a single frame to PNG.
    Frame(FrameArgs),
    /// Export the timeline in real time through ffmpeg.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct TimelineArgs {
    /// JSON project file.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Synthetic clip durations in seconds, e.g. `5,3`.
    #[arg(long, value_delimiter = ',', conflicts_with = "project")]
    durations: Vec<f64>,

    /// Size of synthetic clips, `WxH`.
    #[arg(long, default_value = "320x180", value_parser = parse_size)]
    size: Resolution,

    /// Extra transition as `<anchor>:<effect>:<seconds>`, e.g. `between:0:fade:2`.
    #[arg(long = "transition", value_parser = parse_transition)]
    transitions: Vec<TransitionArg>,
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    #[command(flatten)]
    timeline: TimelineArgs,

    /// Global times to resolve.
    #[arg(long = "at", required = true, value_delimiter = ',')]
    at: Vec<f64>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    timeline: TimelineArgs,

    /// Global time of the frame.
    #[arg(long = "at")]
    at: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Compositor backend: auto, cpu or gpu.
    #[arg(long, default_value_t = BackendKind::Cpu)]
    backend: BackendKind,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    #[command(flatten)]
    timeline: TimelineArgs,

    /// Directory receiving `segue-<timestamp>.<ext>`.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// high, medium or low.
    #[arg(long, default_value_t = QualityPreset::High)]
    quality: QualityPreset,

    /// Compositor backend: auto, cpu or gpu.
    #[arg(long, default_value_t = BackendKind::Auto)]
    backend: BackendKind,

    /// Export only the transition at this anchor (plus a short pad).
    #[arg(long)]
    transition_only: Option<TransitionAnchor>,
}

#[derive(Clone, Copy, Debug)]
struct TransitionArg {
    anchor: TransitionAnchor,
    effect: EffectId,
    duration: f64,
}

fn parse_size(s: &str) -> Result<Resolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let h = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    Resolution::new(w, h).map_err(|e| e.to_string())
}

/// Split from the right so the anchor itself may contain `:`.
fn parse_transition(s: &str) -> Result<TransitionArg, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(duration), Some(effect), Some(anchor)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected <anchor>:<effect>:<seconds>, got '{s}'"));
    };
    Ok(TransitionArg {
        anchor: anchor.parse().map_err(|e: segue::SegueError| e.to_string())?,
        effect: effect.parse().map_err(|e: segue::SegueError| e.to_string())?,
        duration: duration
            .parse()
            .map_err(|_| format!("bad duration in '{s}'"))?,
    })
}

const PALETTE: [[u8; 4]; 4] = [
    [220, 60, 60, 255],
    [60, 120, 220, 255],
    [60, 180, 100, 255],
    [230, 180, 40, 255],
];

fn build_timeline(args: &TimelineArgs) -> anyhow::Result<Timeline> {
    let mut timeline = match &args.project {
        Some(path) => {
            let project = ProjectFile::load(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let (timeline, failures) = project.build_timeline(base, &IngestOptions::default())?;
            for f in &failures {
                eprintln!("warning: {f}");
            }
            timeline
        }
        None => {
            let mut timeline = Timeline::new();
            for (i, d) in args.durations.iter().enumerate() {
                let color = PALETTE[i % PALETTE.len()];
                let src = SyntheticSource::new(*d, args.size.width, args.size.height, color)
                    .named(format!("synthetic {}", i + 1));
                let clip = Clip::new(format!("clip {}", i + 1), std::sync::Arc::new(src))
                    .with_context(|| format!("synthetic clip {}", i + 1))?;
                timeline.add_clip(clip);
            }
            timeline
        }
    };
    for t in &args.transitions {
        timeline
            .set_transition(t.effect, t.duration, t.anchor)
            .with_context(|| format!("transition at {}", t.anchor))?;
    }
    if timeline.is_empty() {
        anyhow::bail!("timeline has no clips (use --project or --durations)");
    }
    Ok(timeline)
}

fn main() -> anyhow::Result<()> {
    segue::logging::init_default_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Effects { json } => cmd_effects(json),
        Command::Shader { effect } => {
            print!("{}", segue::shader_source_for_id(&effect));
            Ok(())
        }
        Command::Resolve(args) => cmd_resolve(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn cmd_effects(json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<_> = EffectId::ALL
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id(),
                    "label": e.label(),
                    "category": e.category().label(),
                    "description": e.description(),
                    "color": e.color(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for e in EffectId::ALL {
        println!(
            "{:<18} {:<14} {}",
            e.id(),
            e.category().label(),
            e.description()
        );
    }
    Ok(())
}

fn cmd_resolve(args: ResolveArgs) -> anyhow::Result<()> {
    let timeline = build_timeline(&args.timeline)?;
    for t in args.at {
        let state = timeline.resolve(t);
        let line = serde_json::json!({ "time": t, "state": state });
        println!("{}", serde_json::to_string(&line)?);
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let timeline = build_timeline(&args.timeline)?;
    let mut driver =
        PlaybackDriver::for_timeline(&timeline, args.backend, segue::system_clock())?;
    driver.seek(&timeline, args.at);
    let frame = driver
        .compositor_mut()
        .last_frame()
        .cloned()
        .context("compositor produced no frame")?;
    driver.stop();

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let timeline = build_timeline(&args.timeline)?;
    let opts = ExportOptions {
        quality: args.quality,
        scope: match args.transition_only {
            Some(anchor) => ExportScope::TransitionOnly { anchor },
            None => ExportScope::Full,
        },
        backend: args.backend,
        resolution: None,
    };

    let pipeline = ExportPipeline::for_timeline(&timeline);
    let mut last_pct = -1i64;
    let artifact = pipeline.export_to_file(&timeline, &opts, &args.out_dir, &mut |p: f64| {
        let pct = p.floor() as i64;
        if pct != last_pct {
            last_pct = pct;
            eprint!("\rexporting {pct:>3}%");
        }
    })?;
    eprintln!();
    eprintln!(
        "wrote {} ({} frames, {} repeated, {})",
        artifact.path.display(),
        artifact.report.frames,
        artifact.report.repeated,
        artifact.codec
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_specs_split_from_the_right() {
        let t = parse_transition("between:2:wipe-left:1.5").unwrap();
        assert_eq!(t.anchor, TransitionAnchor::Between(2));
        assert_eq!(t.effect, EffectId::WipeLeft);
        assert_eq!(t.duration, 1.5);
        assert_eq!(parse_transition("end:fade:1").unwrap().anchor, TransitionAnchor::End);
        assert!(parse_transition("fade:1").is_err());
        assert!(parse_transition("between:0:sparkle:1").is_err());
    }

    #[test]
    fn sizes_parse_as_wxh() {
        assert_eq!(parse_size("64x48").unwrap(), Resolution {
            width: 64,
            height: 48
        });
        assert!(parse_size("64").is_err());
        assert!(parse_size("0x10").is_err());
    }
}
