//! An in-memory `ArchiveReader`, built from a `Vec<Record>` plus metadata.
//!
//! This is the engine's primary test fixture and the backend the demo CLI
//! falls back to when no archive directory is given. It has no notion of
//! volumes: `change_volume` is a no-op and `Cursor::volume` is always 0.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::record::{Indom, IndomSnapshot, InstanceId, MetricDesc, Pmid, Record};
use crate::timestamp::Timestamp;

use super::{ArchiveReader, Cursor, Direction, ReadOutcome};

pub struct MemoryArchive {
    records: Vec<Record>,
    descriptors: HashMap<Pmid, MetricDesc>,
    indoms: HashMap<Indom, Vec<IndomSnapshot>>,
    /// Index into `records` of "the next record a Forward read would return".
    pos: usize,
}

impl MemoryArchive {
    pub fn new(
        mut records: Vec<Record>,
        descriptors: HashMap<Pmid, MetricDesc>,
        indoms: HashMap<Indom, Vec<IndomSnapshot>>,
    ) -> Self {
        records.sort_by_key(|r| r.timestamp());
        MemoryArchive { records, descriptors, indoms, pos: 0 }
    }
}

impl ArchiveReader for MemoryArchive {
    fn read_next(&mut self, direction: Direction) -> Result<ReadOutcome> {
        match direction {
            Direction::Forward => {
                if self.pos >= self.records.len() {
                    return Ok(ReadOutcome::Eof);
                }
                let rec = self.records[self.pos].clone();
                self.pos += 1;
                Ok(ReadOutcome::Got(rec))
            }
            Direction::Backward => {
                if self.pos == 0 {
                    return Ok(ReadOutcome::Eof);
                }
                self.pos -= 1;
                Ok(ReadOutcome::Got(self.records[self.pos].clone()))
            }
        }
    }

    fn tell(&self) -> Cursor {
        Cursor { volume: 0, offset: self.pos as u64 }
    }

    fn seek(&mut self, cursor: Cursor) -> Result<()> {
        if cursor.offset as usize > self.records.len() {
            return Err(EngineError::Io("seek past end of in-memory archive".into()));
        }
        self.pos = cursor.offset as usize;
        Ok(())
    }

    fn change_volume(&mut self, _volume: u32) -> Result<()> {
        Ok(())
    }

    fn start_time(&self) -> Timestamp {
        self.records.first().map(|r| r.timestamp()).unwrap_or(Timestamp::ZERO)
    }

    fn end_time(&mut self) -> Result<Timestamp> {
        self.records.last().map(|r| r.timestamp()).ok_or(EngineError::Eol)
    }

    fn seek_near(&mut self, t: Timestamp) -> Result<()> {
        // binary search for the first record at or after `t`
        let idx = self.records.partition_point(|r| r.timestamp() < t);
        self.pos = idx.min(self.records.len());
        Ok(())
    }

    fn descriptor(&self, pmid: Pmid) -> Option<MetricDesc> {
        self.descriptors.get(&pmid).copied()
    }

    fn instances(&self, indom: Indom) -> Vec<InstanceId> {
        let mut seen = Vec::new();
        if let Some(snaps) = self.indoms.get(&indom) {
            for snap in snaps {
                for inst in &snap.instances {
                    if !seen.contains(inst) {
                        seen.push(*inst);
                    }
                }
            }
        }
        seen
    }

    fn indom_snapshots(&self, indom: Indom) -> &[IndomSnapshot] {
        self.indoms.get(&indom).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InstanceValue, Value, ValueFmt, ValueSet};

    fn sample(sec: i64, pmid: Pmid, inst: InstanceId, v: i64) -> Record {
        Record::Sample {
            t: Timestamp::new(sec, 0),
            sets: vec![ValueSet {
                pmid,
                valfmt: ValueFmt::Insitu,
                values: vec![InstanceValue { inst, value: Value::I64(v) }],
            }],
        }
    }

    #[test]
    fn forward_then_backward_is_symmetric() {
        let mut arc = MemoryArchive::new(
            vec![sample(10, 1, 0, 100), sample(20, 1, 0, 200)],
            HashMap::new(),
            HashMap::new(),
        );
        assert!(matches!(arc.read_next(Direction::Forward).unwrap(), ReadOutcome::Got(_)));
        assert!(matches!(arc.read_next(Direction::Forward).unwrap(), ReadOutcome::Got(_)));
        assert!(matches!(arc.read_next(Direction::Forward).unwrap(), ReadOutcome::Eof));
        assert!(matches!(arc.read_next(Direction::Backward).unwrap(), ReadOutcome::Got(_)));
    }

    #[test]
    fn seek_near_lands_before_requested_time() {
        let mut arc = MemoryArchive::new(
            vec![sample(10, 1, 0, 100), sample(20, 1, 0, 200), sample(30, 1, 0, 300)],
            HashMap::new(),
            HashMap::new(),
        );
        arc.seek_near(Timestamp::new(20, 0)).unwrap();
        assert_eq!(arc.tell().offset, 1);
    }

    #[test]
    fn savepoint_restores_position_on_error() {
        let mut arc = MemoryArchive::new(vec![sample(10, 1, 0, 100)], HashMap::new(), HashMap::new());
        let before = arc.tell();
        let res: Result<()> = arc.with_savepoint(|r| {
            r.read_next(Direction::Forward)?;
            Err(EngineError::Eol)
        });
        assert!(res.is_err());
        assert_eq!(arc.tell(), before);
    }
}
