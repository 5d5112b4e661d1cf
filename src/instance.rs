//! Per (metric, instance) scratch state carried across fetches within a context.

use std::sync::Arc;

use crate::record::{InstanceId, Pmid, Value};

/// Key identifying one (metric, instance) slot in an [`crate::interp::ArchiveContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey {
    pub pmid: Pmid,
    pub inst: InstanceId,
}

/// What kind of bound is currently known on one side (`prior` or `next`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundState {
    Undefined,
    Mark,
    Value,
}

/// A stored bound: its time, state, and (if `Value`) the payload.
#[derive(Debug, Clone)]
pub struct Bound {
    pub t: f64,
    pub state: BoundState,
    pub value: Option<Value>,
    /// Region between `t_req` and this bound has been fully scanned; don't rescan.
    pub scanned: bool,
}

impl Bound {
    pub fn unset() -> Self {
        Bound { t: -1.0, state: BoundState::Undefined, value: None, scanned: false }
    }

    pub fn is_set(&self) -> bool {
        self.t >= 0.0
    }
}

/// Scratch state for one (metric, instance) pair, persisted for the lifetime
/// of its owning `ArchiveContext`.
#[derive(Debug, Clone)]
pub struct InstanceState {
    pub prior: Bound,
    pub next: Bound,
    /// Earliest/latest times this instance has ever been observed at.
    pub t_first: f64,
    pub t_last: f64,
    /// Caliper-derived lifetime bounds; -1.0 means "unknown", never prunes.
    pub t_birth: f64,
    pub t_death: f64,
    /// Transient: this instance is actively being searched for in the current pass.
    pub search: bool,
    /// Did a Mark invalidate this instance's counter value during the fetch
    /// currently in progress? Cleared at the start of every fetch.
    pub mark_seen_this_fetch: bool,
    /// Did the *previous* fetch return a real value for this instance? A
    /// mark seen since then invalidates a counter's rate across the gap.
    pub had_value_last_fetch: bool,
}

impl Default for InstanceState {
    fn default() -> Self {
        InstanceState {
            prior: Bound::unset(),
            next: Bound::unset(),
            t_first: -1.0,
            t_last: -1.0,
            t_birth: -1.0,
            t_death: -1.0,
            search: false,
            mark_seen_this_fetch: false,
            had_value_last_fetch: false,
        }
    }
}

impl InstanceState {
    /// True if `t_req` falls inside the currently-bounded interval, meaning
    /// no re-scan from scratch is needed before fine-grained bound checks.
    pub fn bounds_contain(&self, t_req: f64) -> bool {
        let lower_ok = !self.prior.is_set() || self.prior.t <= t_req;
        let upper_ok = !self.next.is_set() || self.next.t >= t_req;
        lower_ok && upper_ok
    }

    /// Drop both bounds back to `Undefined`, releasing any pinned buffers and
    /// clearing the scanned flags. Used on out-of-range requests and `reset_interp`.
    pub fn reset_bounds(&mut self) {
        self.prior = Bound::unset();
        self.next = Bound::unset();
    }

    pub fn within_lifetime(&self, t_req: f64) -> bool {
        if self.t_birth >= 0.0 && t_req < self.t_birth {
            return false;
        }
        if self.t_death >= 0.0 && t_req > self.t_death {
            return false;
        }
        true
    }
}

/// Strong reference to a pinned variable-length value, shared between the
/// archive reader/cache and whichever `InstanceState` bound currently holds it.
pub type PinnedBuffer = Arc<[u8]>;
