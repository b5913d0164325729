//! JSON project files read by the CLI.
//!
//! ```json
//! {
//!   "clips": [
//!     { "path": "intro.mp4" },
//!     { "synthetic": { "duration": 3.0, "width": 640, "height": 360, "color": [0, 80, 200, 255] } }
//!   ],
//!   "transitions": [
//!     { "effect": "fade", "duration": 1.0, "anchor": { "between": 0 } }
//!   ]
//! }
//! ```
//!
//! Project files are input only; nothing is ever written back.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{info, warn};

use crate::{
    foundation::error::{SegueError, SegueResult},
    media::{
        ingest::{IngestOptions, add_clip, ingest_source},
        synthetic::SyntheticSource,
    },
    timeline::{Clip, Timeline, Transition},
};

/// A solid-color stand-in clip, useful without real media.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyntheticClip {
    pub duration: f64,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_color")]
    pub color: [u8; 4],
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    180
}

fn default_color() -> [u8; 4] {
    [40, 40, 48, 255]
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ProjectClip {
    File {
        path: PathBuf,
        #[serde(default)]
        name: Option<String>,
    },
    Synthetic {
        synthetic: SyntheticClip,
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectFile {
    pub clips: Vec<ProjectClip>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl ProjectFile {
    pub fn from_json(json: &str) -> SegueResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> SegueResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read project '{}'", path.display()))?;
        Self::from_json(&text)
    }

    /// Ingest every clip and apply the transitions.
    ///
    /// Relative paths resolve against `base_dir`. Clips that fail to ingest are skipped and
    /// returned; transitions whose anchor no longer exists are an error.
    pub fn build_timeline(
        &self,
        base_dir: &Path,
        opts: &IngestOptions,
    ) -> SegueResult<(Timeline, Vec<SegueError>)> {
        let mut timeline = Timeline::new();
        let results = self.clips.iter().enumerate().map(|(i, clip)| match clip {
            ProjectClip::File { path, name } => {
                let full = if path.is_absolute() {
                    path.clone()
                } else {
                    base_dir.join(path)
                };
                add_clip(&full, opts).and_then(|c| match name {
                    Some(n) => Clip::new(n.clone(), c.source().clone()),
                    None => Ok(c),
                })
            }
            ProjectClip::Synthetic { synthetic, name } => {
                let src = SyntheticSource::with_clock(
                    synthetic.duration,
                    synthetic.width,
                    synthetic.height,
                    synthetic.color,
                    opts.clock.clone(),
                );
                let name = name.clone().unwrap_or_else(|| format!("clip {}", i + 1));
                ingest_source(name, Arc::new(src), opts.base_timeout)
            }
        });
        let failures = timeline.add_clips(results.collect::<Vec<_>>());
        if !failures.is_empty() {
            warn!(failed = failures.len(), "some project clips were skipped");
        }

        for t in &self.transitions {
            timeline.set_transition(t.effect, t.duration, t.anchor)?;
        }
        info!(
            clips = timeline.clips().len(),
            transitions = timeline.transitions().len(),
            total = timeline.total_duration(),
            "project loaded"
        );
        Ok((timeline, failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{effects::EffectId, timeline::TransitionAnchor};

    const PROJECT: &str = r#"{
        "clips": [
            { "synthetic": { "duration": 5.0, "width": 8, "height": 6 }, "name": "A" },
            { "synthetic": { "duration": 3.0, "color": [255, 0, 0, 255] } }
        ],
        "transitions": [
            { "effect": "page-curl", "duration": 2.0, "anchor": { "between": 0 } },
            { "effect": "fade", "duration": 0.5, "anchor": "start" }
        ]
    }"#;

    #[test]
    fn parses_clip_variants_and_transitions() {
        let p = ProjectFile::from_json(PROJECT).unwrap();
        assert_eq!(p.clips.len(), 2);
        assert!(matches!(
            &p.clips[1],
            ProjectClip::Synthetic { synthetic, name: None } if synthetic.width == 320
        ));
        assert_eq!(p.transitions[0].effect, EffectId::PageCurl);
        assert_eq!(p.transitions[0].anchor, TransitionAnchor::Between(0));
        assert_eq!(p.transitions[1].anchor, TransitionAnchor::Start);

        let file: ProjectFile =
            ProjectFile::from_json(r#"{"clips":[{"path":"a.mp4"}]}"#).unwrap();
        assert!(matches!(&file.clips[0], ProjectClip::File { name: None, .. }));
    }

    #[test]
    fn builds_a_timeline_from_synthetic_clips() {
        let p = ProjectFile::from_json(PROJECT).unwrap();
        let (tl, failures) = p
            .build_timeline(Path::new("."), &IngestOptions::default())
            .unwrap();
        assert!(failures.is_empty());
        assert_eq!(tl.total_duration(), 8.0);
        assert_eq!(tl.clips()[0].name(), "A");
        assert_eq!(tl.clips()[1].name(), "clip 2");
        assert_eq!(tl.transitions().len(), 2);
    }

    #[test]
    fn missing_files_are_reported_not_fatal() {
        let p = ProjectFile::from_json(
            r#"{"clips":[{"path":"definitely/not/here.mp4"},{"synthetic":{"duration":1.0}}]}"#,
        )
        .unwrap();
        let (tl, failures) = p
            .build_timeline(Path::new("."), &IngestOptions::default())
            .unwrap();
        assert_eq!(tl.clips().len(), 1);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], SegueError::Ingest { .. }));
    }

    #[test]
    fn malformed_json_is_a_serde_error() {
        assert!(matches!(
            ProjectFile::from_json("{"),
            Err(SegueError::Serde(_))
        ));
    }
}
