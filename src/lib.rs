//! pcp-interp - archive interpolation engine for Performance Co-Pilot logs.
//!
//! This library provides the core interpolation machinery shared between:
//! - `pmfetch` - a CLI that replays an archive and prints interpolated values
//!   at arbitrary requested timestamps
//! - any future collector or viewer built on top of the same [`ArchiveReader`]
//!   abstraction.
//!
//! The entry point is [`interp::ArchiveContext`]: it owns an [`ArchiveReader`],
//! walks it under [`fetch`](interp::ArchiveContext::fetch), and produces
//! exact-or-interpolated values per instance for every requested metric.

pub mod arith;
pub mod cache;
pub mod caliper;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod instance;
pub mod interp;
pub mod reader;
pub mod record;
pub mod timestamp;
pub mod util;

pub use error::{EngineError, Result};
pub use interp::{ArchiveContext, FetchResult, MetricResult};
pub use reader::{ArchiveReader, Direction};
pub use timestamp::Timestamp;
