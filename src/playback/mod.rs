pub mod driver;
pub mod ownership;
pub mod sync;

pub use driver::{DriverState, PlaybackDriver, TickOutcome};
pub use ownership::{Owner, PoolLease, SlotSnapshot, SourcePool, SourceSlot};
pub use sync::{SlotRole, SyncPlan, SyncReport, SyncTuning, apply_plan, corrected_rate, plan_for_state};
