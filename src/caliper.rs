//! Time caliper: precomputed per-instance birth/death bounds for large
//! instance domains, used to prune bound search.
//!
//! Only worth computing once an instance domain has enough distinct
//! instances that most lookups would otherwise waste time walking past
//! instances that were never alive at `t_req`.

use std::collections::HashMap;

use crate::record::{IndomSnapshot, InstanceId};
use crate::timestamp::Timestamp;

/// Below this many distinct instances, per-instance lifetime pruning isn't
/// worth precomputing; `InstanceState::t_birth`/`t_death` are simply left
/// unknown (-1) and every lookup proceeds unpruned.
pub const HASH_THRESHOLD: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct Lifetime {
    pub birth: f64,
    pub death: f64,
}

/// Computes, for every instance that ever appears in `snapshots`, the
/// `(birth, death)` window over which it was a live member of the domain.
///
/// Snapshots are walked newest-to-oldest. The first time (walking backward)
/// an instance is seen, its birth is that snapshot's time and its death is
/// the time of the snapshot immediately newer (or unknown, if it's present
/// in the newest snapshot). Any earlier re-observation pushes birth back
/// further.
///
/// `origin` must be the same reference point `ArchiveContext` measures
/// `t_req`/`t_this` from, so the resulting birth/death bounds stay directly
/// comparable to them in `InstanceState::within_lifetime`.
pub fn compute(snapshots: &[IndomSnapshot], origin: Timestamp) -> HashMap<InstanceId, Lifetime> {
    let mut out: HashMap<InstanceId, Lifetime> = HashMap::new();
    let mut ordered: Vec<&IndomSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| b.t.cmp(&a.t)); // newest first

    for (idx, snap) in ordered.iter().enumerate() {
        let t = snap.t.since(origin);
        for inst in &snap.instances {
            match out.get_mut(inst) {
                None => {
                    let death = if idx == 0 { -1.0 } else { ordered[idx - 1].t.since(origin) };
                    out.insert(*inst, Lifetime { birth: t, death });
                }
                Some(life) => {
                    life.birth = t;
                }
            }
        }
    }
    out
}

/// Whether a domain with `instance_count` distinct instances warrants
/// caliper precomputation at all.
pub fn worth_computing(instance_count: usize) -> bool {
    instance_count >= HASH_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::Timestamp;

    fn snap(sec: i64, instances: &[InstanceId]) -> IndomSnapshot {
        IndomSnapshot { t: Timestamp::new(sec, 0), instances: instances.to_vec() }
    }

    #[test]
    fn newest_snapshot_instance_has_unknown_death() {
        let snaps = vec![snap(10, &[1, 2]), snap(20, &[1, 2, 3])];
        let life = compute(&snaps, Timestamp::ZERO);
        assert_eq!(life[&3].death, -1.0);
        assert_eq!(life[&3].birth, 20.0);
    }

    #[test]
    fn instance_missing_from_newest_gets_bounded_death() {
        let snaps = vec![snap(10, &[1, 2]), snap(20, &[1])];
        let life = compute(&snaps, Timestamp::ZERO);
        // instance 2 last appears at t=10, disappears by t=20
        assert_eq!(life[&2].birth, 10.0);
        assert_eq!(life[&2].death, 20.0);
    }

    #[test]
    fn reappearance_pushes_birth_earlier() {
        // instance 1 is present at t=30 (newest) and t=10, absent at t=20.
        // Walking backward we first see it at the newest snapshot (death
        // unknown, it's still alive), then the earlier sighting at t=10
        // only pulls its birth back further.
        let snaps = vec![snap(10, &[1]), snap(20, &[]), snap(30, &[1])];
        let life = compute(&snaps, Timestamp::ZERO);
        assert_eq!(life[&1].birth, 10.0);
        assert_eq!(life[&1].death, -1.0);
    }

    #[test]
    fn lifetimes_are_relative_to_a_non_zero_origin() {
        // Same shape as `instance_missing_from_newest_gets_bounded_death`,
        // but the owning context's origin sits at t=5: every birth/death
        // value must shift by that offset, not be reported epoch-relative.
        let origin = Timestamp::new(5, 0);
        let snaps = vec![snap(10, &[1, 2]), snap(20, &[1])];
        let life = compute(&snaps, origin);
        assert_eq!(life[&2].birth, 5.0);
        assert_eq!(life[&2].death, 15.0);
    }

    #[test]
    fn threshold_matches_design_constant() {
        assert!(!worth_computing(15));
        assert!(worth_computing(16));
    }
}
