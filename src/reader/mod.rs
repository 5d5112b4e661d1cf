//! The archive-reader abstraction the interpolation engine is built against.
//!
//! The engine never parses an on-disk format itself; it drives whatever
//! implements [`ArchiveReader`]. Two implementations ship here: [`memory`]
//! (in-memory, used by tests and as a demo fixture) and [`file`] (a small
//! zstd/bincode framed format with a temporal index for gross positioning).

pub mod file;
pub mod memory;

use crate::error::Result;
use crate::record::{Indom, InstanceId, MetricDesc, Pmid, Record};
use crate::timestamp::Timestamp;

/// Direction to read the next record in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// Outcome of a single `read_next` call.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Got(Record),
    /// Hit the start (reading backward) or end (reading forward) of the
    /// archive chain.
    Eof,
}

/// An opaque archive position. Implementations decide what it means; the
/// engine only ever stores and restores values it previously obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub volume: u32,
    pub offset: u64,
}

/// The engine's external collaborator: something that can hand back archive
/// records, report metric/instance metadata, and be positioned.
pub trait ArchiveReader {
    /// Read the next record in `direction` from the current position,
    /// advancing the position past it.
    fn read_next(&mut self, direction: Direction) -> Result<ReadOutcome>;

    fn tell(&self) -> Cursor;
    fn seek(&mut self, cursor: Cursor) -> Result<()>;

    /// Switch to a specific volume of a multi-volume archive. A no-op for
    /// single-volume/in-memory archives.
    fn change_volume(&mut self, volume: u32) -> Result<()>;

    fn start_time(&self) -> Timestamp;
    fn end_time(&mut self) -> Result<Timestamp>;

    /// Gross-position the reader near `t`, using whatever temporal index is
    /// available. Must leave the reader such that a `read_next` in either
    /// direction makes progress toward `t`; fine positioning is the engine's
    /// job, not the reader's.
    fn seek_near(&mut self, t: Timestamp) -> Result<()>;

    fn descriptor(&self, pmid: Pmid) -> Option<MetricDesc>;
    fn instances(&self, indom: Indom) -> Vec<InstanceId>;
    fn indom_snapshots(&self, indom: Indom) -> &[crate::record::IndomSnapshot];

    /// Run `f` with the reader positioned as it is now, restoring the
    /// original position on every exit path (including early return via `?`
    /// inside `f`, and panics). Used to evaluate gap-bounded mark handling
    /// without permanently disturbing the scan position.
    fn with_savepoint<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T>
    where
        Self: Sized,
    {
        let saved = self.tell();
        struct Restore<'a, R: ArchiveReader> {
            reader: &'a mut R,
            saved: Cursor,
        }
        impl<'a, R: ArchiveReader> Drop for Restore<'a, R> {
            fn drop(&mut self) {
                let _ = self.reader.seek(self.saved);
            }
        }
        let mut guard = Restore { reader: self, saved };
        f(&mut *guard.reader)
    }
}
