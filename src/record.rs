//! The archive data model: records, value encodings, and metric descriptors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

pub type Pmid = u32;
pub type InstanceId = i32;
pub type Indom = u32;

/// How a metric's per-instance values are encoded in a `ValueSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueFmt {
    /// Value fits inline as a 32-bit word (bit-reinterpreted per `MetricType`).
    Insitu,
    /// Value is a variable-length block, shared via a pinned buffer.
    PointerToBlock,
}

/// Scalar/compound type of a metric's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Aggregate,
    Event,
}

/// Semantics governing how a metric's values are combined/interpolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Semantics {
    /// Monotonically increasing (modulo wrap); rate-like.
    Counter,
    /// A point-in-time gauge; nearest-neighbor only.
    Instant,
    /// A point-in-time category/label; nearest-neighbor, held indefinitely forward.
    Discrete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub dimension: i8,
    pub scale: i8,
}

impl Default for Units {
    fn default() -> Self {
        Units { dimension: 0, scale: 0 }
    }
}

/// Static description of a metric, as found in an archive's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDesc {
    pub pmid: Pmid,
    pub mtype: MetricType,
    pub indom: Indom,
    pub sem: Semantics,
    pub units: Units,
}

/// One metric's recorded value for one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Blob(Arc<[u8]>),
}

/// A single `(instance, value)` pair within a value set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceValue {
    pub inst: InstanceId,
    pub value: Value,
}

/// All values recorded for one metric at one record's timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSet {
    pub pmid: Pmid,
    pub valfmt: ValueFmt,
    pub values: Vec<InstanceValue>,
}

/// One archive record: either a batch of samples or a discontinuity marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Record {
    Sample { t: Timestamp, sets: Vec<ValueSet> },
    Mark { t: Timestamp },
}

impl Record {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Record::Sample { t, .. } => *t,
            Record::Mark { t } => *t,
        }
    }
}

/// A snapshot of which instances existed in an instance domain at a point in time.
///
/// Used by the time caliper to derive per-instance birth/death bounds.
#[derive(Debug, Clone)]
pub struct IndomSnapshot {
    pub t: Timestamp,
    pub instances: Vec<InstanceId>,
}
