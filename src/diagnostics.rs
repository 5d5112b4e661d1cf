//! Per-context counters for tests and operational visibility.
//!
//! These never influence engine behavior; they exist so property P4
//! ("no re-scanning of already-scanned regions") and cache-hit-rate
//! expectations are assertable from tests.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Forward,
    Backward,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Diagnostics {
    pub reads_forward: u64,
    pub reads_backward: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rolls: u64,
}

impl Diagnostics {
    pub fn record_read(&mut self, mode: ReadMode) {
        match mode {
            ReadMode::Forward => self.reads_forward += 1,
            ReadMode::Backward => self.reads_backward += 1,
        }
    }

    pub fn record_cache(&mut self, hit: bool) {
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }
}
