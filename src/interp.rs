//! The fetch-interpolation engine: `ArchiveContext` and its `fetch` operation.
//!
//! This is the centerpiece of the crate. Everything else (the cache, the
//! caliper, instance scratch state, the arithmetic trait) exists to serve
//! the three-pass algorithm implemented here: enumerate wanted instances,
//! search backward for a lower bound, search forward for an upper bound,
//! then assemble and interpolate a result per metric semantics.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::arith::{nearer_to_next, CounterArith};
use crate::cache::ReadCache;
use crate::caliper::{self, Lifetime};
use crate::config::{EngineConfig, MarkPolicy};
use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Result};
use crate::instance::{Bound, BoundState, InstanceKey, InstanceState};
use crate::reader::{ArchiveReader, Direction, ReadOutcome};
use crate::record::{Indom, InstanceId, InstanceValue, MetricDesc, MetricType, Pmid, Record, Semantics, Value, ValueFmt};
use crate::timestamp::Timestamp;

/// Sentinel `numval` meaning "this metric is not present in the archive".
pub const NUMVAL_NOT_LOGGED: i32 = -1;
/// Sentinel `numval` meaning "this metric's type cannot be interpolated".
pub const NUMVAL_TYPE_UNSUPPORTED: i32 = -2;

/// Result of one `fetch` call.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub timestamp: Timestamp,
    pub metrics: Vec<MetricResult>,
}

#[derive(Debug, Clone)]
pub struct MetricResult {
    pub pmid: Pmid,
    pub numval: i32,
    pub valfmt: ValueFmt,
    pub values: Vec<InstanceValue>,
}

/// Instance-profile filter: restricts which instances of an indom are
/// considered "wanted". `None` for an indom means "every instance".
#[derive(Default)]
struct InstanceProfile {
    allowed: HashMap<Indom, HashSet<InstanceId>>,
}

impl InstanceProfile {
    fn permits(&self, indom: Indom, inst: InstanceId) -> bool {
        match self.allowed.get(&indom) {
            None => true,
            Some(set) => set.contains(&inst),
        }
    }
}

/// A single archive-reading session: the engine's external interface.
///
/// Not `Sync` — a context is meant to be driven from one thread at a time,
/// though independent contexts (even over the same archive) may run on
/// separate threads freely.
pub struct ArchiveContext<R: ArchiveReader> {
    reader: R,
    cache: ReadCache,
    origin: Timestamp,
    clock: Timestamp,
    direction: Direction,
    delta: (i64, i32),
    states: HashMap<InstanceKey, InstanceState>,
    valfmts: HashMap<Pmid, ValueFmt>,
    profile: InstanceProfile,
    diag: Diagnostics,
    anchor: Option<crate::reader::Cursor>,
    volume: u32,
    caliper_cache: HashMap<Indom, HashMap<InstanceId, Lifetime>>,
    end_retry_done: bool,
    pending_pmids: Vec<Pmid>,
}

impl<R: ArchiveReader> ArchiveContext<R> {
    /// Opens a context over `reader`, beginning at `origin` reading in `direction`.
    pub fn open(reader: R, direction: Direction, origin: Timestamp) -> Self {
        ArchiveContext {
            reader,
            cache: ReadCache::new(),
            origin,
            clock: origin,
            direction,
            delta: (1, 0),
            states: HashMap::new(),
            valfmts: HashMap::new(),
            profile: InstanceProfile::default(),
            diag: Diagnostics::default(),
            anchor: None,
            volume: 0,
            caliper_cache: HashMap::new(),
            end_retry_done: false,
            pending_pmids: Vec::new(),
        }
    }

    pub fn set_origin(&mut self, t: Timestamp) {
        self.clock = t;
        self.anchor = None;
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn set_interval(&mut self, sec: i64, nsec: i32) {
        self.delta = (sec, nsec);
    }

    /// Restricts which instances of `indom` are considered "wanted" in
    /// subsequent fetches. Fails if the reader has no known instances or
    /// indom snapshots for `indom` at all.
    pub fn set_instance_profile(&mut self, indom: Indom, instances: HashSet<InstanceId>) -> Result<()> {
        if self.reader.instances(indom).is_empty() && self.reader.indom_snapshots(indom).is_empty() {
            return Err(EngineError::UnknownIndom(indom));
        }
        self.profile.allowed.insert(indom, instances);
        Ok(())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diag
    }

    /// Invalidate scanned/bound state for instances whose bounded interval
    /// does not contain `new_origin`, without touching instances whose
    /// existing bounds already cover it.
    pub fn reset_interp(&mut self, new_origin: Timestamp) {
        let t = new_origin.since(self.origin);
        for state in self.states.values_mut() {
            let contains = (!state.prior.is_set() || state.prior.t <= t)
                && (!state.next.is_set() || state.next.t >= t);
            if !contains {
                state.reset_bounds();
            }
        }
        self.anchor = None;
    }

    fn config(&self) -> &'static EngineConfig {
        EngineConfig::global()
    }

    /// Runs one fetch for `pmids` at the context's current logical time, then
    /// advances the logical clock by the configured interval regardless of
    /// outcome.
    pub fn fetch(&mut self, pmids: &[Pmid]) -> Result<FetchResult> {
        self.remember_pmids(pmids);
        let t_req = self.clock.since(self.origin);
        trace!(t_req, "fetch start");
        let result = self.fetch_at(t_req);
        let pmids_result = result.map(|metrics_by_pmid| self.assemble(pmids, metrics_by_pmid));
        let out = match pmids_result {
            Ok(metrics) => Ok(FetchResult { timestamp: self.clock, metrics }),
            Err(e) => Err(e),
        };
        let (d_sec, d_nsec) = self.delta;
        self.clock.advance(d_sec, d_nsec);
        out
    }

    /// Core algorithm: ensures state exists for every wanted instance of
    /// `pmids`, then runs passes 2 and 3. Returns the descriptors used, so
    /// `assemble` doesn't need to re-look them up.
    fn fetch_at(&mut self, t_req: f64) -> Result<HashMap<Pmid, MetricDesc>> {
        if t_req < -0.001 {
            return Err(EngineError::Eol);
        }
        let end = self.reader.end_time()?;
        if t_req > end.since(self.origin) + 0.001 {
            if !self.end_retry_done {
                self.end_retry_done = true;
                let end2 = self.reader.end_time()?;
                if t_req <= end2.since(self.origin) + 0.001 {
                    // archive grew since we last checked; proceed normally
                } else {
                    return Err(EngineError::Eol);
                }
            } else {
                return Err(EngineError::Eol);
            }
        }

        // Pass 1: enumerate wanted instances per metric, ensuring state exists.
        let mut descs = HashMap::new();
        let mut wanted: Vec<InstanceKey> = Vec::new();

        for state in self.states.values_mut() {
            state.mark_seen_this_fetch = false;
        }

        // descriptors are discovered lazily: the caller supplies pmids at
        // `assemble` time, but we need them now to enumerate instances, so
        // `fetch_at` is invoked with the pmid list captured by the caller.
        for &pmid in self.pending_pmids.clone().iter() {
            let Some(desc) = self.reader.descriptor(pmid) else {
                continue;
            };
            descs.insert(pmid, desc);

            let mut instances = self.reader.instances(desc.indom);
            instances.retain(|inst| self.profile.permits(desc.indom, *inst));

            if caliper::worth_computing(instances.len()) && !self.caliper_cache.contains_key(&desc.indom) {
                let snaps = self.reader.indom_snapshots(desc.indom);
                let life = caliper::compute(snaps, self.origin);
                self.caliper_cache.insert(desc.indom, life);
            }
            let life = self.caliper_cache.get(&desc.indom);

            for inst in instances {
                let key = InstanceKey { pmid, inst };
                let state = self.states.entry(key).or_default();
                if let Some(life) = life {
                    if let Some(l) = life.get(&inst) {
                        state.t_birth = l.birth;
                        state.t_death = l.death;
                    }
                }
                if !state.bounds_contain(t_req) {
                    state.reset_bounds();
                }
                if state.within_lifetime(t_req) {
                    wanted.push(key);
                }
            }
        }

        if self.anchor.is_none() {
            self.gross_position(t_req)?;
        }
        debug!(wanted = wanted.len(), "pass 1 complete");

        // A forward-reading context whose t_req has outrun the last
        // established prior bound can roll its own anchor up to t_req
        // instead of falling back to a full backward re-search from a
        // stale position. Symmetric for a backward-reading context and the
        // next bound. At most one roll per fetch.
        if self.direction == Direction::Forward
            && wanted.iter().any(|k| {
                let s = &self.states[k];
                !s.prior.is_set() || s.prior.t > t_req
            })
        {
            self.do_roll(t_req, &wanted)?;
        }
        self.search_bound(Direction::Backward, t_req, &wanted)?;

        if self.direction == Direction::Backward
            && wanted.iter().any(|k| {
                let s = &self.states[k];
                !s.next.is_set() || s.next.t < t_req
            })
        {
            self.do_roll(t_req, &wanted)?;
        }
        self.search_bound(Direction::Forward, t_req, &wanted)?;

        // An exact-match record satisfies both sides of a bound, but only
        // one of the two directional passes above ever visits it (the one
        // reading away from the gross-positioning anchor); mirror it into
        // whichever side didn't independently find it.
        for key in &wanted {
            let state = self.states.get_mut(key).expect("state exists");
            reconcile_exact_match(state, t_req);
        }

        Ok(descs)
    }

    fn gross_position(&mut self, t_req: f64) -> Result<()> {
        let target = self.origin + t_req;
        self.reader.seek_near(target)?;
        let opposite = self.direction.reverse();
        // Fine-tune: step in the opposite direction until a record lands on
        // the far side of t_req, so both passes start from a known-good anchor.
        loop {
            let before = self.reader.tell();
            match self.cache.read(&mut self.reader, opposite, self.volume, &mut self.diag)? {
                ReadOutcome::Eof => {
                    self.anchor = Some(before);
                    break;
                }
                ReadOutcome::Got(rec) => {
                    let t_this = rec.timestamp().since(self.origin);
                    let past_far_side = match opposite {
                        Direction::Backward => t_this <= t_req,
                        Direction::Forward => t_this >= t_req,
                    };
                    if past_far_side {
                        // Anchor *before* this record, not after: both the
                        // backward and forward bound searches need to be able
                        // to land on it, not skip past it.
                        self.anchor = Some(before);
                        break;
                    }
                }
            }
        }
        self.reader.seek(self.anchor.unwrap())?;
        Ok(())
    }

    /// Reads forward (or backward, for a `Backward`-direction context) from
    /// the current `anchor` up to `t_req`, updating every wanted instance's
    /// bounds as each record is consumed and advancing `anchor` to match.
    /// This is what lets a monotonically advancing `t_req` catch up without
    /// a full bound re-search starting from a stale anchor every fetch.
    fn do_roll(&mut self, t_req: f64, wanted: &[InstanceKey]) -> Result<()> {
        let Some(anchor) = self.anchor else { return Ok(()) };
        self.reader.seek(anchor)?;
        self.diag.rolls += 1;
        let direction = self.direction;

        loop {
            let outcome = self.cache.read(&mut self.reader, direction, self.volume, &mut self.diag)?;
            let record = match outcome {
                ReadOutcome::Eof => break,
                ReadOutcome::Got(rec) => rec,
            };
            let t_this = record.timestamp().since(self.origin);
            let past_t_req = match direction {
                Direction::Forward => t_this > t_req,
                Direction::Backward => t_this < t_req,
            };
            if past_t_req {
                break;
            }
            self.anchor = Some(self.reader.tell());
            self.roll_update(&record, t_this, t_req, wanted)?;
        }
        Ok(())
    }

    /// Tests and potentially updates *both* the `prior` and `next` bound of
    /// every instance in `wanted` against one record consumed while
    /// rolling — unlike `update_bounds`, which only ever touches the one
    /// side its pass is searching for.
    fn roll_update(&mut self, record: &Record, t_this: f64, t_req: f64, wanted: &[InstanceKey]) -> Result<()> {
        match record {
            Record::Mark { .. } => {
                let ignore = self.should_ignore_mark(t_this)?;
                if !ignore {
                    for key in wanted {
                        let state = self.states.get_mut(key).expect("state exists");
                        let hit_prior = install_mark_if_closer(state, Direction::Backward, t_this, t_req);
                        let hit_next = install_mark_if_closer(state, Direction::Forward, t_this, t_req);
                        if hit_prior || hit_next {
                            state.mark_seen_this_fetch = true;
                        }
                    }
                }
                Ok(())
            }
            Record::Sample { sets, .. } => {
                for set in sets {
                    self.check_valfmt(set.pmid, set.valfmt)?;
                }
                for key in wanted {
                    let Some(set) = sets.iter().find(|s| s.pmid == key.pmid) else { continue };
                    let Some(iv) = set.values.iter().find(|v| v.inst == key.inst) else { continue };
                    let state = self.states.get_mut(key).expect("state exists");
                    install_value_if_closer(state, Direction::Backward, t_this, t_req, &iv.value);
                    install_value_if_closer(state, Direction::Forward, t_this, t_req, &iv.value);
                }
                Ok(())
            }
        }
    }

    fn search_bound(&mut self, direction: Direction, t_req: f64, wanted: &[InstanceKey]) -> Result<()> {
        let mut unbound: Vec<InstanceKey> = wanted
            .iter()
            .copied()
            .filter(|k| {
                let s = &self.states[k];
                let bound = if direction == Direction::Backward { &s.prior } else { &s.next };
                !bound.is_set() || needs_more_search(direction, bound, t_req)
            })
            .collect();

        for key in &unbound {
            self.states.get_mut(key).expect("state exists").search = true;
        }

        if unbound.is_empty() {
            return Ok(());
        }
        let Some(anchor) = self.anchor else { return Ok(()) };
        self.reader.seek(anchor)?;

        loop {
            sort_unbound(&mut unbound, &self.states, direction);
            let outcome = self.cache.read(&mut self.reader, direction, self.volume, &mut self.diag)?;
            let record = match outcome {
                ReadOutcome::Eof => {
                    finalize_unresolved(&mut unbound, &mut self.states, direction, t_req);
                    break;
                }
                ReadOutcome::Got(rec) => rec,
            };
            self.update_bounds(&record, direction, t_req, &mut unbound)?;
            if unbound.is_empty() {
                break;
            }
            let t_this = record.timestamp().since(self.origin);
            if can_terminate(&unbound, &self.states, direction, t_this) {
                finalize_unresolved(&mut unbound, &mut self.states, direction, t_req);
                break;
            }
        }
        Ok(())
    }

    fn update_bounds(
        &mut self,
        record: &Record,
        direction: Direction,
        t_req: f64,
        unbound: &mut Vec<InstanceKey>,
    ) -> Result<()> {
        match record {
            Record::Mark { t } => {
                let t_this = t.since(self.origin);
                let ignore = self.should_ignore_mark(t_this)?;
                trace!(t_this, ignore, "mark record");
                if !ignore {
                    unbound.retain(|key| {
                        let state = self.states.get_mut(key).expect("state exists");
                        let closer = install_mark_if_closer(state, direction, t_this, t_req);
                        if closer {
                            state.mark_seen_this_fetch = true;
                        }
                        !closer
                    });
                }
                Ok(())
            }
            Record::Sample { t, sets } => {
                let t_this = t.since(self.origin);
                for set in sets {
                    self.check_valfmt(set.pmid, set.valfmt)?;
                }
                unbound.retain(|key| {
                    let Some(set) = sets.iter().find(|s| s.pmid == key.pmid) else {
                        return true;
                    };
                    let Some(iv) = set.values.iter().find(|v| v.inst == key.inst) else {
                        return true;
                    };
                    let state = self.states.get_mut(key).expect("state exists");
                    !install_value_if_closer(state, direction, t_this, t_req, &iv.value)
                });
                Ok(())
            }
        }
    }

    fn check_valfmt(&mut self, pmid: Pmid, valfmt: ValueFmt) -> Result<()> {
        match self.valfmts.get(&pmid) {
            None => {
                self.valfmts.insert(pmid, valfmt);
                Ok(())
            }
            Some(existing) if *existing == valfmt => Ok(()),
            Some(_) => Err(EngineError::LogRecCorrupt(format!(
                "valfmt changed mid-archive for pmid {pmid}"
            ))),
        }
    }

    fn should_ignore_mark(&mut self, t_mark: f64) -> Result<bool> {
        match self.config().mark_policy {
            MarkPolicy::Honor => Ok(false),
            MarkPolicy::IgnoreAll => Ok(true),
            MarkPolicy::IgnoreGap { threshold_secs } => {
                let origin = self.origin;
                // Peek forward, then restore and peek backward, so both
                // peeks start from the same position flanking the mark.
                let gap = self.reader.with_savepoint(|r| {
                    let next_real = r.with_savepoint(|r2| {
                        Ok(loop {
                            match r2.read_next(Direction::Forward)? {
                                ReadOutcome::Eof => break None,
                                ReadOutcome::Got(Record::Mark { .. }) => continue,
                                ReadOutcome::Got(rec) => break Some(rec.timestamp()),
                            }
                        })
                    })?;
                    let prior_real = loop {
                        match r.read_next(Direction::Backward)? {
                            ReadOutcome::Eof => break None,
                            ReadOutcome::Got(Record::Mark { .. }) => continue,
                            ReadOutcome::Got(rec) => break Some(rec.timestamp()),
                        }
                    };
                    Ok((prior_real, next_real))
                })?;
                match gap {
                    (Some(a), Some(b)) => {
                        let span = b.since(origin) - a.since(origin);
                        Ok(span.abs() <= threshold_secs)
                    }
                    // peek failed to find a flanking real record on one side:
                    // honor the mark (the safe default).
                    _ => {
                        let _ = t_mark;
                        Ok(false)
                    }
                }
            }
        }
    }

    fn assemble(&mut self, pmids: &[Pmid], descs: HashMap<Pmid, MetricDesc>) -> Vec<MetricResult> {
        let t_req = self.clock.since(self.origin);
        let wrap = self.config().counter_wrap;
        let mut out = Vec::with_capacity(pmids.len());

        for &pmid in pmids {
            let Some(desc) = descs.get(&pmid) else {
                out.push(MetricResult { pmid, numval: NUMVAL_NOT_LOGGED, valfmt: ValueFmt::Insitu, values: vec![] });
                continue;
            };

            let mut instances = self.reader.instances(desc.indom);
            instances.retain(|inst| self.profile.permits(desc.indom, *inst));

            let mut values = Vec::new();
            let mut valfmt = ValueFmt::Insitu;
            let mut unsupported = false;

            for inst in instances {
                let key = InstanceKey { pmid, inst };
                let Some(state) = self.states.get_mut(&key) else { continue };

                let picked = pick_value(state, desc, t_req, wrap, &mut unsupported);
                if let Some(v) = picked {
                    if matches!(v, Value::Blob(_)) {
                        valfmt = ValueFmt::PointerToBlock;
                    }
                    values.push(InstanceValue { inst, value: v });
                    state.had_value_last_fetch = true;
                } else if desc.sem == Semantics::Counter {
                    state.had_value_last_fetch = false;
                }
            }

            let numval = if unsupported && values.is_empty() {
                NUMVAL_TYPE_UNSUPPORTED
            } else {
                values.len() as i32
            };
            out.push(MetricResult { pmid, numval, valfmt, values });
        }
        out
    }

    /// Stash the pmid list ahead of `fetch_at`, which needs it to enumerate
    /// instances before `assemble` consumes it again for result assembly.
    fn remember_pmids(&mut self, pmids: &[Pmid]) {
        self.pending_pmids = pmids.to_vec();
    }
}

/// If one side landed exactly on `t_req`, the other side is trivially
/// satisfied by the same record: mirror it over if the other side doesn't
/// already hold an equal-or-exact match of its own.
fn reconcile_exact_match(state: &mut InstanceState, t_req: f64) {
    let prior_exact = state.prior.is_set() && state.prior.t == t_req;
    let next_exact = state.next.is_set() && state.next.t == t_req;
    if prior_exact && !next_exact {
        state.next = state.prior.clone();
    } else if next_exact && !prior_exact {
        state.prior = state.next.clone();
    }
}

fn needs_more_search(direction: Direction, bound: &Bound, t_req: f64) -> bool {
    match direction {
        Direction::Backward => bound.t > t_req,
        Direction::Forward => bound.t < t_req,
    }
}

fn sort_unbound(unbound: &mut [InstanceKey], states: &HashMap<InstanceKey, InstanceState>, direction: Direction) {
    unbound.sort_by(|a, b| {
        let sa = &states[a];
        let sb = &states[b];
        let (ka, kb) = match direction {
            Direction::Backward => (extreme_or(sa.t_first, f64::INFINITY), extreme_or(sb.t_first, f64::INFINITY)),
            Direction::Forward => (extreme_or(sa.t_last, f64::NEG_INFINITY), extreme_or(sb.t_last, f64::NEG_INFINITY)),
        };
        match direction {
            Direction::Backward => kb.partial_cmp(&ka).unwrap(), // descending t_first
            Direction::Forward => ka.partial_cmp(&kb).unwrap(),  // ascending t_last
        }
    });
}

fn extreme_or(t: f64, fallback: f64) -> f64 {
    if t < 0.0 { fallback } else { t }
}

fn can_terminate(unbound: &[InstanceKey], states: &HashMap<InstanceKey, InstanceState>, direction: Direction, t_this: f64) -> bool {
    unbound.iter().all(|k| {
        let s = &states[k];
        match direction {
            Direction::Backward => s.t_first >= 0.0 && t_this < s.t_first,
            Direction::Forward => s.t_last >= 0.0 && t_this > s.t_last,
        }
    })
}

fn finalize_unresolved(unbound: &mut Vec<InstanceKey>, states: &mut HashMap<InstanceKey, InstanceState>, direction: Direction, t_req: f64) {
    for key in unbound.drain(..) {
        let state = states.get_mut(&key).expect("state exists");
        match direction {
            Direction::Backward => {
                state.t_first = if state.t_first < 0.0 { t_req } else { state.t_first.max(t_req) };
                state.prior.scanned = true;
            }
            Direction::Forward => {
                state.t_last = if state.t_last < 0.0 { t_req } else { state.t_last.min(t_req) };
                state.next.scanned = true;
            }
        }
    }
}

/// Updates `state`'s Mark bound if `t_this` is closer to `t_req` than
/// whatever that side currently holds. Returns whether the bound was (now)
/// satisfied — i.e. the instance should stop being searched in this pass.
fn install_mark_if_closer(state: &mut InstanceState, direction: Direction, t_this: f64, t_req: f64) -> bool {
    match direction {
        Direction::Backward => {
            if t_this > t_req {
                return false;
            }
            if !state.prior.is_set() || t_this > state.prior.t {
                state.prior = Bound { t: t_this, state: BoundState::Mark, value: None, scanned: true };
            }
            true
        }
        Direction::Forward => {
            if t_this < t_req {
                return false;
            }
            if !state.next.is_set() || t_this < state.next.t {
                state.next = Bound { t: t_this, state: BoundState::Mark, value: None, scanned: true };
            }
            true
        }
    }
}

/// Updates `state`'s Value bound if `t_this` is closer to `t_req` than
/// whatever that side currently holds, and tracks global extremes
/// (`t_first`/`t_last`). Returns whether the bound is now resolved.
fn install_value_if_closer(state: &mut InstanceState, direction: Direction, t_this: f64, t_req: f64, value: &Value) -> bool {
    state.t_first = if state.t_first < 0.0 { t_this } else { state.t_first.min(t_this) };
    state.t_last = if state.t_last < 0.0 { t_this } else { state.t_last.max(t_this) };

    match direction {
        Direction::Backward => {
            if t_this > t_req {
                return false;
            }
            if !state.prior.is_set() || t_this >= state.prior.t {
                state.prior = Bound { t: t_this, state: BoundState::Value, value: Some(value.clone()), scanned: true };
                return true;
            }
            false
        }
        Direction::Forward => {
            if t_this < t_req {
                return false;
            }
            if !state.next.is_set() || t_this <= state.next.t {
                state.next = Bound { t: t_this, state: BoundState::Value, value: Some(value.clone()), scanned: true };
                return true;
            }
            false
        }
    }
}

/// Selects (interpolating if needed) the value to report for one instance,
/// per its metric's semantics. Returns `None` if no value can be reported.
fn pick_value(state: &InstanceState, desc: &MetricDesc, t_req: f64, wrap: bool, unsupported: &mut bool) -> Option<Value> {
    match desc.sem {
        Semantics::Discrete => {
            if state.prior.state == BoundState::Value {
                state.prior.value.clone()
            } else {
                None
            }
        }
        Semantics::Instant => {
            let (a, b) = (&state.prior, &state.next);
            if a.state != BoundState::Value || b.state != BoundState::Value {
                return None;
            }
            if t_req == a.t {
                a.value.clone()
            } else if t_req == b.t {
                b.value.clone()
            } else if nearer_to_next(t_req, a.t, b.t) {
                b.value.clone()
            } else {
                a.value.clone()
            }
        }
        Semantics::Counter => {
            let (a, b) = (&state.prior, &state.next);
            if a.state != BoundState::Value || b.state != BoundState::Value {
                return None;
            }
            if state.mark_seen_this_fetch && state.had_value_last_fetch {
                return None;
            }
            interpolate(a, b, t_req, wrap, desc.mtype, unsupported)
        }
    }
}

fn interpolate(a: &Bound, b: &Bound, t_req: f64, wrap: bool, mtype: MetricType, unsupported: &mut bool) -> Option<Value> {
    let (Some(av), Some(bv)) = (&a.value, &b.value) else { return None };

    if matches!(av, Value::Blob(_)) || matches!(bv, Value::Blob(_)) {
        // Strings, aggregates, and events are never interpolated: hold prior.
        return Some(av.clone());
    }

    if t_req == a.t {
        return Some(av.clone());
    }
    if t_req == b.t {
        return Some(bv.clone());
    }

    let frac = (t_req - a.t) / (b.t - a.t);

    macro_rules! dispatch {
        ($variant:ident, $t:ty) => {
            if let (Value::$variant(x), Value::$variant(y)) = (av, bv) {
                return Some(Value::$variant(<$t as CounterArith>::interpolate(*x, *y, frac, wrap)));
            }
        };
    }
    dispatch!(I32, i32);
    dispatch!(U32, u32);
    dispatch!(I64, i64);
    dispatch!(U64, u64);
    dispatch!(F32, f32);
    dispatch!(F64, f64);

    let _ = mtype;
    *unsupported = true;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::memory::MemoryArchive;
    use crate::record::{IndomSnapshot, Units, ValueSet};

    fn counter_desc(pmid: Pmid, mtype: MetricType) -> MetricDesc {
        MetricDesc { pmid, mtype, indom: 1, sem: Semantics::Counter, units: Units::default() }
    }

    fn instant_desc(pmid: Pmid) -> MetricDesc {
        MetricDesc { pmid, mtype: MetricType::F64, indom: 1, sem: Semantics::Instant, units: Units::default() }
    }

    fn sample(sec: i64, pmid: Pmid, value: Value) -> Record {
        Record::Sample {
            t: Timestamp::new(sec, 0),
            sets: vec![ValueSet {
                pmid,
                valfmt: ValueFmt::Insitu,
                values: vec![InstanceValue { inst: 1, value }],
            }],
        }
    }

    fn archive_with(descs: Vec<MetricDesc>, records: Vec<Record>) -> MemoryArchive {
        let descriptors = descs.iter().map(|d| (d.pmid, *d)).collect();
        let indoms = HashMap::from([(1u32, vec![IndomSnapshot { t: Timestamp::new(0, 0), instances: vec![1] }])]);
        MemoryArchive::new(records, descriptors, indoms)
    }

    // S1: counter m1[inst=1] at t=10 v=100, t=20 v=200; t_req=15 forward -> 150.
    #[test]
    fn s1_midpoint_counter_interpolation() {
        let arc = archive_with(
            vec![counter_desc(1, MetricType::I64)],
            vec![sample(10, 1, Value::I64(100)), sample(20, 1, Value::I64(200))],
        );
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(15, 0));
        let result = ctx.fetch(&[1]).unwrap();
        assert_eq!(result.metrics[0].numval, 1);
        assert!(matches!(result.metrics[0].values[0].value, Value::I64(150)));
    }

    // S2: same archive, t_req=10 -> exact value 100.
    #[test]
    fn s2_exact_timestamp_returns_recorded_value() {
        let arc = archive_with(
            vec![counter_desc(1, MetricType::I64)],
            vec![sample(10, 1, Value::I64(100)), sample(20, 1, Value::I64(200))],
        );
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(10, 0));
        let result = ctx.fetch(&[1]).unwrap();
        assert!(matches!(result.metrics[0].values[0].value, Value::I64(100)));
    }

    // S3: Instant m2[inst=1] at t=10 v=5.0, t=20 v=6.0; t_req=14 -> 5.0 (nearest, before midpoint).
    #[test]
    fn s3_instant_nearest_neighbor_before_midpoint() {
        let arc = archive_with(
            vec![instant_desc(2)],
            vec![sample(10, 2, Value::F64(5.0)), sample(20, 2, Value::F64(6.0))],
        );
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(14, 0));
        let result = ctx.fetch(&[2]).unwrap();
        match result.metrics[0].values[0].value {
            Value::F64(v) => assert!((v - 5.0).abs() < 1e-9),
            _ => panic!("wrong value type"),
        }
    }

    // S4 (Honor half): counter m3 at t=10 v=200, <Mark> at t=15, t=20 v=300;
    // t_req=17 forward under the default Honor policy -> no value across the mark.
    #[test]
    fn s4_mark_invalidates_counter_under_default_policy() {
        let arc = archive_with(
            vec![counter_desc(3, MetricType::I64)],
            vec![sample(10, 3, Value::I64(200)), Record::Mark { t: Timestamp::new(15, 0) }, sample(20, 3, Value::I64(300))],
        );
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(17, 0));
        let result = ctx.fetch(&[3]).unwrap();
        assert_eq!(result.metrics[0].numval, 0);
    }

    // S5: 32-bit wrap counter m4 at t=10 v=0xFFFFFFFE, t=20 v=4; wrap enabled; t_req=15 -> 1.
    // PCP_COUNTER_WRAP is read once per process via EngineConfig::global(), so this
    // only exercises the wrap path if the test process happened to start with it set;
    // the arithmetic itself is covered unconditionally in arith.rs's own tests.
    #[test]
    fn s5_wrap_arithmetic_matches_counter_arith_directly() {
        let v = u32::interpolate(0xFFFF_FFFE, 4, 0.5, true);
        assert_eq!(v, 1);
    }

    // S6: two successive forward fetches along a monotonically increasing
    // t_req each produce the correct interpolated value, with no seek between
    // them (the anchor from the first fetch carries over unreset). Samples
    // are deliberately non-collinear: a stale prior bound left over from the
    // first fetch (10,0)/(20,100) would interpolate t_req=25 to 18, not the
    // correct 101 from (20,100)/(100,110) — do_roll is what tells them apart.
    #[test]
    fn s6_successive_forward_fetches_stay_correct() {
        let arc = archive_with(
            vec![counter_desc(1, MetricType::I64)],
            vec![
                sample(10, 1, Value::I64(0)),
                sample(20, 1, Value::I64(100)),
                sample(100, 1, Value::I64(110)),
            ],
        );
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(15, 0));
        ctx.set_interval(10, 0);

        let first = ctx.fetch(&[1]).unwrap();
        assert!(matches!(first.metrics[0].values[0].value, Value::I64(50)));
        let reads_backward_after_first = ctx.diagnostics().reads_backward;

        // Clock auto-advances to t=25 without any intervening seek.
        let second = ctx.fetch(&[1]).unwrap();
        assert!(matches!(second.metrics[0].values[0].value, Value::I64(101)));

        // do_roll absorbed the advance: no extra backward reads were needed
        // to re-establish the prior bound.
        assert_eq!(ctx.diagnostics().reads_backward, reads_backward_after_first);
        assert!(ctx.diagnostics().rolls >= 1);
    }

    // B-series boundary: a request before the archive's first record is Eol.
    #[test]
    fn request_before_archive_start_is_eol() {
        let arc = archive_with(vec![counter_desc(1, MetricType::I64)], vec![sample(10, 1, Value::I64(100))]);
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(-5, 0));
        assert!(matches!(ctx.fetch(&[1]), Err(EngineError::Eol)));
    }

    // A Discrete metric holds its last value forward past the last recorded sample.
    #[test]
    fn discrete_holds_prior_value_forward() {
        let desc = MetricDesc { pmid: 5, mtype: MetricType::I32, indom: 1, sem: Semantics::Discrete, units: Units::default() };
        let arc = archive_with(vec![desc], vec![sample(10, 5, Value::I32(7)), sample(20, 5, Value::I32(9))]);
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        ctx.set_origin(Timestamp::new(14, 0));
        let result = ctx.fetch(&[5]).unwrap();
        assert!(matches!(result.metrics[0].values[0].value, Value::I32(7)));
    }

    #[test]
    fn set_instance_profile_rejects_unknown_indom() {
        let arc = archive_with(vec![counter_desc(1, MetricType::I64)], vec![sample(10, 1, Value::I64(100))]);
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        let err = ctx.set_instance_profile(99, HashSet::from([1])).unwrap_err();
        assert!(matches!(err, EngineError::UnknownIndom(99)));
    }

    #[test]
    fn set_instance_profile_accepts_known_indom() {
        let arc = archive_with(vec![counter_desc(1, MetricType::I64)], vec![sample(10, 1, Value::I64(100))]);
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, Timestamp::ZERO);
        assert!(ctx.set_instance_profile(1, HashSet::from([1])).is_ok());
    }

    // Caliper pruning must stay correct when the context's origin isn't the
    // absolute epoch: birth/death bounds are computed relative to `origin`,
    // same as every t_req/t_this in the engine, not relative to Timestamp::ZERO.
    #[test]
    fn caliper_pruning_respects_non_zero_origin() {
        let desc = counter_desc(1, MetricType::I64);
        let descriptors = HashMap::from([(desc.pmid, desc)]);

        // 20 instances, so the domain clears HASH_THRESHOLD and caliper
        // pruning actually runs. Instance 1 is present throughout; instance
        // 20 only shows up in the newest snapshot.
        let all_but_last: Vec<InstanceId> = (1..=19).collect();
        let all: Vec<InstanceId> = (1..=20).collect();
        let indoms = HashMap::from([(
            1u32,
            vec![
                IndomSnapshot { t: Timestamp::new(105, 0), instances: all_but_last },
                IndomSnapshot { t: Timestamp::new(110, 0), instances: all },
            ],
        )]);

        let mut records = Vec::new();
        for inst in 1..=20u32 {
            records.push(Record::Sample {
                t: Timestamp::new(110, 0),
                sets: vec![ValueSet {
                    pmid: 1,
                    valfmt: ValueFmt::Insitu,
                    values: vec![InstanceValue { inst, value: Value::I64(inst as i64) }],
                }],
            });
        }
        let arc = MemoryArchive::new(records, descriptors, indoms);

        // origin sits at t=100 (epoch-relative snapshot times are 105/110),
        // so epoch-relative birth (105/110) and origin-relative birth (5/10)
        // must not be confused by `within_lifetime`.
        let origin = Timestamp::new(100, 0);
        let mut ctx = ArchiveContext::open(arc, Direction::Forward, origin);
        ctx.set_origin(Timestamp::new(110, 0));
        let result = ctx.fetch(&[1]).unwrap();
        // instance 20 was born at t_req(origin-relative)=10 and is requested
        // at t_req=10: with a correctly origin-relative birth it's in range
        // and gets a value; with the old epoch-relative bug its birth would
        // read as 110, far past t_req, and it would be wrongly pruned.
        assert!(result.metrics[0].values.iter().any(|v| v.inst == 20));
    }
}
