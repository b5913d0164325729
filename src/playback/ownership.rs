//! Exclusive ownership of a timeline's media sources.
//!
//! Live playback and export both drive the same sources. Whoever wants to move a transport
//! must hold the pool's [`PoolLease`]; a second owner is refused instead of silently fighting
//! over seeks and playback rates.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, info};

use crate::{
    foundation::error::{SegueError, SegueResult},
    media::source::{MediaSource, SourceId},
    timeline::{Clip, ClipId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    Playback,
    Export,
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Playback => f.write_str("playback"),
            Owner::Export => f.write_str("export"),
        }
    }
}

/// One clip's source plus the timing the last sync pass asked of it.
#[derive(Clone, Debug)]
pub struct SourceSlot {
    pub clip_id: ClipId,
    pub source: Arc<dyn MediaSource>,
    pub desired_local_time: f64,
    pub is_live: bool,
}

/// Point-in-time view of a slot, for logging and tests.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotSnapshot {
    pub clip_id: ClipId,
    pub source_id: SourceId,
    pub desired_local_time: f64,
    pub is_live: bool,
    pub paused: bool,
    pub current_time: f64,
}

#[derive(Debug, Default)]
struct PoolInner {
    slots: Vec<SourceSlot>,
    owner: Option<Owner>,
}

/// Shared handle to the sources of one set of clips. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct SourcePool {
    inner: Arc<Mutex<PoolInner>>,
}

impl SourcePool {
    pub fn from_clips(clips: &[Clip]) -> Self {
        let pool = Self::default();
        pool.sync_with(clips);
        pool
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the slot list in clip order, keeping the sync state of clips already present.
    pub fn sync_with(&self, clips: &[Clip]) {
        let mut inner = self.lock();
        let mut old = std::mem::take(&mut inner.slots);
        inner.slots = clips
            .iter()
            .map(|clip| match old.iter().position(|s| s.clip_id == clip.id()) {
                Some(pos) => {
                    let mut slot = old.swap_remove(pos);
                    slot.source = clip.source().clone();
                    slot
                }
                None => SourceSlot {
                    clip_id: clip.id(),
                    source: clip.source().clone(),
                    desired_local_time: 0.0,
                    is_live: false,
                },
            })
            .collect();
        if !old.is_empty() {
            debug!(dropped = old.len(), "source slots dropped");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    pub fn owner(&self) -> Option<Owner> {
        self.lock().owner
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.lock()
            .slots
            .iter()
            .map(|s| SlotSnapshot {
                clip_id: s.clip_id,
                source_id: s.source.id(),
                desired_local_time: s.desired_local_time,
                is_live: s.is_live,
                paused: s.source.is_paused(),
                current_time: s.source.current_time(),
            })
            .collect()
    }

    /// Claim exclusive control of the sources.
    pub fn acquire(&self, owner: Owner) -> SegueResult<PoolLease> {
        let mut inner = self.lock();
        if let Some(current) = inner.owner {
            return Err(SegueError::ownership(format!(
                "sources are held by {current}; {owner} must wait for it to stop"
            )));
        }
        inner.owner = Some(owner);
        info!(%owner, slots = inner.slots.len(), "source pool acquired");
        Ok(PoolLease {
            pool: self.clone(),
            owner,
        })
    }

    pub fn same_pool(&self, other: &SourcePool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Proof of ownership. Dropping it pauses every source and frees the pool.
#[derive(Debug)]
pub struct PoolLease {
    pool: SourcePool,
    owner: Owner,
}

impl PoolLease {
    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn pool(&self) -> &SourcePool {
        &self.pool
    }

    pub fn source(&self, clip_id: ClipId) -> Option<Arc<dyn MediaSource>> {
        self.pool
            .lock()
            .slots
            .iter()
            .find(|s| s.clip_id == clip_id)
            .map(|s| s.source.clone())
    }

    /// Cloned slot list; sources can be driven without holding the pool lock.
    pub fn slots(&self) -> Vec<SourceSlot> {
        self.pool.lock().slots.clone()
    }

    pub(crate) fn record(&self, clip_id: ClipId, desired_local_time: f64, is_live: bool) {
        if let Some(slot) = self
            .pool
            .lock()
            .slots
            .iter_mut()
            .find(|s| s.clip_id == clip_id)
        {
            slot.desired_local_time = desired_local_time;
            slot.is_live = is_live;
        }
    }

    pub fn pause_all(&self) {
        for slot in self.slots() {
            slot.source.pause();
        }
        for slot in self.pool.lock().slots.iter_mut() {
            slot.is_live = false;
        }
    }

    /// Release every source. Used for pools built from disposable clones.
    pub fn release_all(&self) {
        for slot in self.slots() {
            slot.source.pause();
            slot.source.release();
        }
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pause_all();
        let mut inner = self.pool.lock();
        if inner.owner == Some(self.owner) {
            inner.owner = None;
        }
        debug!(owner = %self.owner, "source pool released");
    }
}
