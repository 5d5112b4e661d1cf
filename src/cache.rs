//! A small fixed-size read cache sitting in front of an [`ArchiveReader`].
//!
//! Bound search repeatedly reverses direction over a short span of records;
//! this cache avoids re-issuing the underlying read in that case. Capacity
//! is four slots, matching the archive's own historical cache size.
//!
//! Eviction is a plain rotating insertion cursor, *not* true LRU: a `used`
//! counter is tracked per slot for diagnostics, but it never influences
//! which slot gets recycled next. That mirrors the original implementation's
//! actual (if slightly surprising) behavior rather than substituting true
//! LRU, which the archive never historically used and which would subtly
//! change cache-miss counts under pathological scan patterns. See DESIGN.md.

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::reader::{ArchiveReader, Cursor, Direction, ReadOutcome};
use crate::record::Record;

const SLOTS: usize = 4;

#[derive(Clone)]
struct Slot {
    volume: u32,
    outcome: CachedOutcome,
    used: u32,
}

/// A cached record spans two positions: `head_pos` (where a forward read
/// starts) and `tail_pos` (where a backward read starts). Either direction
/// can hit the same slot at its respective position, regardless of which
/// direction originally populated it. An EOF slot has no span — it only
/// answers a query in the same direction at the same position it was seen.
#[derive(Clone)]
enum CachedOutcome {
    Record { record: Record, head_pos: u64, tail_pos: u64 },
    Eof { direction: Direction, pos: u64 },
}

pub struct ReadCache {
    slots: [Option<Slot>; SLOTS],
    next_evict: usize,
}

impl ReadCache {
    pub fn new() -> Self {
        ReadCache { slots: [None, None, None, None], next_evict: 0 }
    }

    /// Read the next record in `direction`, consulting the cache first.
    ///
    /// `volume` is the reader's current volume, used as part of the cache
    /// key so a volume change never serves a stale hit.
    pub fn read<R: ArchiveReader>(
        &mut self,
        reader: &mut R,
        direction: Direction,
        volume: u32,
        diag: &mut Diagnostics,
    ) -> Result<ReadOutcome> {
        let pos = reader.tell().offset;

        if let Some(hit) = self.find_mut(volume, pos, direction) {
            hit.used += 1;
            diag.record_cache(true);
            let outcome = match &hit.outcome {
                CachedOutcome::Record { record, head_pos, tail_pos } => {
                    let dest = match direction {
                        Direction::Forward => *tail_pos,
                        Direction::Backward => *head_pos,
                    };
                    reader.seek(Cursor { volume, offset: dest })?;
                    ReadOutcome::Got(record.clone())
                }
                CachedOutcome::Eof { .. } => ReadOutcome::Eof,
            };
            return Ok(outcome);
        }

        diag.record_cache(false);
        diag.record_read(match direction {
            Direction::Forward => crate::diagnostics::ReadMode::Forward,
            Direction::Backward => crate::diagnostics::ReadMode::Backward,
        });

        match reader.read_next(direction) {
            Ok(ReadOutcome::Got(rec)) => {
                let after = reader.tell().offset;
                let (head_pos, tail_pos) = match direction {
                    Direction::Forward => (pos, after),
                    Direction::Backward => (after, pos),
                };
                self.insert(Slot {
                    volume,
                    outcome: CachedOutcome::Record { record: rec.clone(), head_pos, tail_pos },
                    used: 1,
                });
                Ok(ReadOutcome::Got(rec))
            }
            Ok(ReadOutcome::Eof) => {
                self.insert(Slot { volume, outcome: CachedOutcome::Eof { direction, pos }, used: 1 });
                Ok(ReadOutcome::Eof)
            }
            Err(e) => {
                // Don't cache the record, but do occupy the slot so a
                // repeated query against the same position doesn't reissue
                // a failing read; the error itself still propagates.
                self.evict_next();
                Err(e)
            }
        }
    }

    /// Forget any cached entry touching `volume`/`pos` — used when a virtual
    /// mark or volume switch makes a slot's contents no longer valid to
    /// cache going forward.
    pub fn invalidate(&mut self, volume: u32, pos: u64) {
        for slot in self.slots.iter_mut() {
            let hit = matches!(slot, Some(s) if s.volume == volume && match &s.outcome {
                CachedOutcome::Record { head_pos, tail_pos, .. } => *head_pos == pos || *tail_pos == pos,
                CachedOutcome::Eof { pos: p, .. } => *p == pos,
            });
            if hit {
                *slot = None;
            }
        }
    }

    fn find_mut(&mut self, volume: u32, pos: u64, direction: Direction) -> Option<&mut Slot> {
        self.slots.iter_mut().flatten().find(|s| {
            if s.volume != volume {
                return false;
            }
            match &s.outcome {
                CachedOutcome::Record { head_pos, tail_pos, .. } => match direction {
                    Direction::Forward => *head_pos == pos,
                    Direction::Backward => *tail_pos == pos,
                },
                CachedOutcome::Eof { direction: d, pos: p } => *d == direction && *p == pos,
            }
        })
    }

    fn insert(&mut self, slot: Slot) {
        self.slots[self.next_evict] = Some(slot);
        self.next_evict = (self.next_evict + 1) % SLOTS;
    }

    fn evict_next(&mut self) {
        self.slots[self.next_evict] = None;
        self.next_evict = (self.next_evict + 1) % SLOTS;
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::memory::MemoryArchive;
    use crate::record::{InstanceValue, Value, ValueFmt, ValueSet};
    use crate::timestamp::Timestamp;
    use std::collections::HashMap;

    fn sample(sec: i64, v: i64) -> Record {
        Record::Sample {
            t: Timestamp::new(sec, 0),
            sets: vec![ValueSet {
                pmid: 1,
                valfmt: ValueFmt::Insitu,
                values: vec![InstanceValue { inst: 0, value: Value::I64(v) }],
            }],
        }
    }

    #[test]
    fn repeated_read_at_same_position_hits_cache() {
        let mut arc = MemoryArchive::new(
            vec![sample(10, 100), sample(20, 200)],
            HashMap::new(),
            HashMap::new(),
        );
        let mut cache = ReadCache::new();
        let mut diag = Diagnostics::default();

        cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();
        let after_first = arc.tell();
        arc.seek(Cursor { volume: 0, offset: 0 }).unwrap();
        cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();

        assert_eq!(diag.cache_hits, 1);
        assert_eq!(diag.cache_misses, 1);
        assert_eq!(arc.tell(), after_first);
    }

    #[test]
    fn rotation_evicts_regardless_of_use_count() {
        // Read 0,1,2,3,4 forward with reversal in between to bump `used` on
        // slot 0, then confirm slot 0 still gets recycled on schedule.
        let mut arc = MemoryArchive::new(
            (0..6).map(|i| sample(i * 10, i)).collect(),
            HashMap::new(),
            HashMap::new(),
        );
        let mut cache = ReadCache::new();
        let mut diag = Diagnostics::default();

        for _ in 0..4 {
            cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();
        }
        // re-hit slot 0's key repeatedly to inflate its `used` counter
        arc.seek(Cursor { volume: 0, offset: 0 }).unwrap();
        for _ in 0..5 {
            cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();
            arc.seek(Cursor { volume: 0, offset: 0 }).unwrap();
        }
        // a fresh read now should still rotate into slot 0's original index
        // rather than preferentially keeping the heavily-reused slot.
        arc.seek(Cursor { volume: 0, offset: 4 }).unwrap();
        cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();
        assert_eq!(cache.next_evict, 1); // slot 0 was recycled despite heavy reuse
    }

    #[test]
    fn direction_reversal_hits_the_same_slot() {
        // A forward read populates one slot; a backward read landing on the
        // complementary position must hit it rather than re-reading.
        let mut arc = MemoryArchive::new(
            vec![sample(10, 100), sample(20, 200)],
            HashMap::new(),
            HashMap::new(),
        );
        let mut cache = ReadCache::new();
        let mut diag = Diagnostics::default();

        cache.read(&mut arc, Direction::Forward, 0, &mut diag).unwrap();
        assert_eq!(arc.tell().offset, 1);

        // Reader sits at offset 1, exactly the tail_pos of the slot just
        // populated; a Backward query here should hit, not miss.
        cache.read(&mut arc, Direction::Backward, 0, &mut diag).unwrap();

        assert_eq!(diag.cache_hits, 1);
        assert_eq!(diag.cache_misses, 1);
        assert_eq!(arc.tell().offset, 0);
    }
}
