//! A small on-disk archive format: a header, a temporal index, and a
//! sequence of independently zstd-compressed, bincode-encoded `Record`
//! frames. Modeled on this codebase's chunked-storage format, generalized
//! from per-snapshot frames to per-record frames.
//!
//! The index exists only for gross positioning (`seek_near`); the engine
//! never trusts it for bound correctness and always fine-scans from there.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher as Crc32;

use crate::error::{EngineError, Result};
use crate::record::{Indom, IndomSnapshot, InstanceId, MetricDesc, Pmid, Record};
use crate::timestamp::Timestamp;

use super::{ArchiveReader, Cursor, Direction, ReadOutcome};

const MAGIC: &[u8; 4] = b"PCPI";
const VERSION: u16 = 1;

/// One entry in the on-disk temporal index: a record's timestamp and its
/// byte range within the data file.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    t: Timestamp,
    offset: u64,
    compressed_len: u64,
}

/// Writes a single-volume `FileArchive` to `path`. Not part of the engine's
/// read path; exists so tests and the demo CLI can build fixtures without
/// depending on a real PCP logger.
pub fn write_archive(path: &Path, records: &[Record]) -> Result<()> {
    let mut data = Vec::new();
    let mut index = Vec::with_capacity(records.len());

    for rec in records {
        let encoded = bincode::serialize(rec)
            .map_err(|e| EngineError::Io(format!("encode record: {e}")))?;
        let compressed = zstd::encode_all(&encoded[..], 0)
            .map_err(|e| EngineError::Io(format!("compress record: {e}")))?;
        index.push(IndexEntry {
            t: rec.timestamp(),
            offset: data.len() as u64,
            compressed_len: compressed.len() as u64,
        });
        data.extend_from_slice(&compressed);
    }

    let tmp_path = path.with_extension("tmp");
    let mut f = File::create(&tmp_path)?;

    f.write_all(MAGIC)?;
    f.write_all(&VERSION.to_le_bytes())?;
    f.write_all(&(records.len() as u64).to_le_bytes())?;

    for e in &index {
        f.write_all(&e.t.sec.to_le_bytes())?;
        f.write_all(&e.t.nsec.to_le_bytes())?;
        f.write_all(&e.offset.to_le_bytes())?;
        f.write_all(&e.compressed_len.to_le_bytes())?;
    }

    let mut crc = Crc32::new();
    crc.update(&data);
    f.write_all(&crc.finalize().to_le_bytes())?;
    f.write_all(&data)?;
    f.sync_all()?;
    drop(f);
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Reads a previously-written [`write_archive`] file into memory, decoding
/// every frame up front. Single-volume only; `change_volume` is a no-op.
pub struct FileArchive {
    path: PathBuf,
    index: Vec<IndexEntry>,
    data_offset: u64,
    pos: usize,
    descriptors: HashMap<Pmid, MetricDesc>,
    indoms: HashMap<Indom, Vec<IndomSnapshot>>,
}

impl FileArchive {
    pub fn open(
        path: &Path,
        descriptors: HashMap<Pmid, MetricDesc>,
        indoms: HashMap<Indom, Vec<IndomSnapshot>>,
    ) -> Result<Self> {
        let mut f = File::open(path)?;
        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(EngineError::LogRecCorrupt("bad archive magic".into()));
        }
        let mut u16buf = [0u8; 2];
        f.read_exact(&mut u16buf)?;
        let version = u16::from_le_bytes(u16buf);
        if version != VERSION {
            return Err(EngineError::LogRecCorrupt(format!("unsupported archive version {version}")));
        }
        let mut u64buf = [0u8; 8];
        f.read_exact(&mut u64buf)?;
        let count = u64::from_le_bytes(u64buf) as usize;

        let mut index = Vec::with_capacity(count);
        for _ in 0..count {
            let mut sec_buf = [0u8; 8];
            let mut nsec_buf = [0u8; 4];
            let mut off_buf = [0u8; 8];
            let mut len_buf = [0u8; 8];
            f.read_exact(&mut sec_buf)?;
            f.read_exact(&mut nsec_buf)?;
            f.read_exact(&mut off_buf)?;
            f.read_exact(&mut len_buf)?;
            index.push(IndexEntry {
                t: Timestamp::new(i64::from_le_bytes(sec_buf), i32::from_le_bytes(nsec_buf)),
                offset: u64::from_le_bytes(off_buf),
                compressed_len: u64::from_le_bytes(len_buf),
            });
        }

        let mut crc_buf = [0u8; 4];
        f.read_exact(&mut crc_buf)?;
        let expected_crc = u32::from_le_bytes(crc_buf);
        let data_offset = f.stream_position()?;

        let mut data = Vec::new();
        f.read_to_end(&mut data)?;
        let mut crc = Crc32::new();
        crc.update(&data);
        if crc.finalize() != expected_crc {
            return Err(EngineError::LogRecCorrupt("data checksum mismatch".into()));
        }

        Ok(FileArchive {
            path: path.to_path_buf(),
            index,
            data_offset,
            pos: 0,
            descriptors,
            indoms,
        })
    }

    fn read_frame(&self, entry: &IndexEntry) -> Result<Record> {
        let mut f = File::open(&self.path)?;
        f.seek(SeekFrom::Start(self.data_offset + entry.offset))?;
        let mut buf = vec![0u8; entry.compressed_len as usize];
        f.read_exact(&mut buf)?;
        let decoded = zstd::decode_all(&buf[..])
            .map_err(|e| EngineError::LogRecCorrupt(format!("decompress record: {e}")))?;
        bincode::deserialize(&decoded)
            .map_err(|e| EngineError::LogRecCorrupt(format!("decode record: {e}")))
    }
}

impl ArchiveReader for FileArchive {
    fn read_next(&mut self, direction: Direction) -> Result<ReadOutcome> {
        match direction {
            Direction::Forward => {
                if self.pos >= self.index.len() {
                    return Ok(ReadOutcome::Eof);
                }
                let rec = self.read_frame(&self.index[self.pos])?;
                self.pos += 1;
                Ok(ReadOutcome::Got(rec))
            }
            Direction::Backward => {
                if self.pos == 0 {
                    return Ok(ReadOutcome::Eof);
                }
                self.pos -= 1;
                Ok(ReadOutcome::Got(self.read_frame(&self.index[self.pos])?))
            }
        }
    }

    fn tell(&self) -> Cursor {
        Cursor { volume: 0, offset: self.pos as u64 }
    }

    fn seek(&mut self, cursor: Cursor) -> Result<()> {
        if cursor.offset as usize > self.index.len() {
            return Err(EngineError::Io("seek past end of archive".into()));
        }
        self.pos = cursor.offset as usize;
        Ok(())
    }

    fn change_volume(&mut self, _volume: u32) -> Result<()> {
        Ok(())
    }

    fn start_time(&self) -> Timestamp {
        self.index.first().map(|e| e.t).unwrap_or(Timestamp::ZERO)
    }

    fn end_time(&mut self) -> Result<Timestamp> {
        self.index.last().map(|e| e.t).ok_or(EngineError::Eol)
    }

    fn seek_near(&mut self, t: Timestamp) -> Result<()> {
        let idx = self.index.partition_point(|e| e.t < t);
        self.pos = idx.min(self.index.len());
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
    use tempfile::tempdir;

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
    fn round_trips_records_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pcpi");
        let records = vec![sample(10, 100), sample(20, 200), Record::Mark { t: Timestamp::new(15, 0) }];
        write_archive(&path, &records).unwrap();

        let mut arc = FileArchive::open(&path, HashMap::new(), HashMap::new()).unwrap();
        assert_eq!(arc.start_time(), Timestamp::new(10, 0));
        assert_eq!(arc.end_time().unwrap(), Timestamp::new(20, 0));

        let mut read = Vec::new();
        loop {
            match arc.read_next(Direction::Forward).unwrap() {
                ReadOutcome::Got(r) => read.push(r.timestamp()),
                ReadOutcome::Eof => break,
            }
        }
        assert_eq!(read.len(), 3);
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.pcpi");
        std::fs::write(&path, b"not an archive").unwrap();
        assert!(FileArchive::open(&path, HashMap::new(), HashMap::new()).is_err());
    }

    #[test]
    fn seek_near_positions_before_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seek.pcpi");
        write_archive(&path, &[sample(10, 1), sample(20, 2), sample(30, 3)]).unwrap();
        let mut arc = FileArchive::open(&path, HashMap::new(), HashMap::new()).unwrap();
        arc.seek_near(Timestamp::new(25, 0)).unwrap();
        assert_eq!(arc.tell().offset, 2);
    }
}
