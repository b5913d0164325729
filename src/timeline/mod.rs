pub mod model;
pub mod resolve;

use tracing::{debug, info, warn};

use crate::{
    effects::EffectId,
    foundation::{
        core::Resolution,
        error::{SegueError, SegueResult},
    },
    playback::ownership::SourcePool,
};

pub use model::{
    Clip, ClipId, ClipRef, LiveSide, PlaybackState, Transition, TransitionAnchor, TransitionState,
};
pub use resolve::{boundaries, effective_duration, resolve, total_duration, transition_window};

/// Ordered clips plus the transitions decorating them.
///
/// The timeline also owns the [`SourcePool`] for its clips so that playback and export
/// contend for the same sources through one ownership guard.
#[derive(Debug, Default)]
pub struct Timeline {
    clips: Vec<Clip>,
    transitions: Vec<Transition>,
    pool: SourcePool,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn pool(&self) -> &SourcePool {
        &self.pool
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id() == id)
    }

    pub fn index_of(&self, id: ClipId) -> Option<usize> {
        self.clips.iter().position(|c| c.id() == id)
    }

    pub fn total_duration(&self) -> f64 {
        total_duration(&self.clips)
    }

    /// Render size for playback and export: the first clip's dimensions, rounded down to even.
    pub fn output_resolution(&self) -> SegueResult<Resolution> {
        self.clips
            .first()
            .map(|c| c.resolution().even())
            .ok_or_else(|| SegueError::validation("timeline has no clips"))
    }

    pub fn resolve(&self, t: f64) -> PlaybackState {
        resolve(&self.clips, &self.transitions, t)
    }

    pub fn transition(&self, anchor: TransitionAnchor) -> Option<&Transition> {
        resolve::find_transition(&self.transitions, anchor)
    }

    pub fn add_clip(&mut self, clip: Clip) {
        info!(clip = %clip.id(), name = clip.name(), duration = clip.duration(), "clip added");
        self.clips.push(clip);
        self.pool.sync_with(&self.clips);
    }

    /// Append every successfully ingested clip; failures are returned, not fatal.
    pub fn add_clips(
        &mut self,
        results: impl IntoIterator<Item = SegueResult<Clip>>,
    ) -> Vec<SegueError> {
        let mut failures = Vec::new();
        for r in results {
            match r {
                Ok(clip) => self.add_clip(clip),
                Err(e) => {
                    warn!(error = %e, "clip skipped");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Remove a clip, release its source and drop the transitions that referenced it.
    ///
    /// Removing clip `k` deletes `Between(k - 1)` and `Between(k)`; later `Between`
    /// anchors shift down by one so they stay attached to the same clip pairs.
    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let k = self.index_of(id)?;
        let clip = self.clips.remove(k);

        self.transitions.retain_mut(|t| match t.anchor {
            TransitionAnchor::Between(j) if j + 1 == k || j == k => false,
            TransitionAnchor::Between(j) if j > k => {
                t.anchor = TransitionAnchor::Between(j - 1);
                true
            }
            _ => true,
        });
        if self.clips.is_empty() {
            self.transitions.clear();
        }

        self.pool.sync_with(&self.clips);
        clip.source().pause();
        clip.source().release();
        info!(clip = %id, "clip removed");
        Some(clip)
    }

    /// Reorder clips. `Between` transitions stay attached to boundary positions.
    pub fn move_clip(&mut self, from: usize, to: usize) -> SegueResult<()> {
        let n = self.clips.len();
        if from >= n || to >= n {
            return Err(SegueError::validation(format!(
                "move_clip indices {from} -> {to} out of range for {n} clips"
            )));
        }
        let clip = self.clips.remove(from);
        self.clips.insert(to, clip);
        self.pool.sync_with(&self.clips);
        debug!(from, to, "clip moved");
        Ok(())
    }

    /// Create or replace the transition at `anchor`.
    pub fn set_transition(
        &mut self,
        effect: EffectId,
        duration: f64,
        anchor: TransitionAnchor,
    ) -> SegueResult<()> {
        let transition = Transition::new(effect, duration, anchor)?;
        let n = self.clips.len();
        let valid = match anchor {
            TransitionAnchor::Start | TransitionAnchor::End => n > 0,
            TransitionAnchor::Between(i) => i + 1 < n,
        };
        if !valid {
            return Err(SegueError::validation(format!(
                "anchor {anchor} does not exist on a timeline of {n} clips"
            )));
        }
        self.transitions.retain(|t| t.anchor != anchor);
        self.transitions.push(transition);
        debug!(%anchor, %effect, duration, "transition set");
        Ok(())
    }

    pub fn remove_transition(&mut self, anchor: TransitionAnchor) -> Option<Transition> {
        let idx = self.transitions.iter().position(|t| t.anchor == anchor)?;
        Some(self.transitions.remove(idx))
    }

    /// Replace every `Between` transition with one per adjacent clip pair.
    ///
    /// Returns the number of pairs decorated.
    pub fn apply_to_all_pairs(&mut self, effect: EffectId, duration: f64) -> SegueResult<usize> {
        let pairs = self.clips.len().saturating_sub(1);
        let mut fresh = Vec::with_capacity(pairs);
        for i in 0..pairs {
            fresh.push(Transition::new(
                effect,
                duration,
                TransitionAnchor::Between(i),
            )?);
        }
        self.transitions
            .retain(|t| !matches!(t.anchor, TransitionAnchor::Between(_)));
        self.transitions.extend(fresh);
        debug!(%effect, duration, pairs, "transition applied to all pairs");
        Ok(pairs)
    }

    pub fn clear_transitions(&mut self) {
        self.transitions.clear();
    }
}
