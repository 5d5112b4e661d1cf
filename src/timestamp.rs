//! Archive timestamps and the seconds-since-origin domain used by the engine.

use std::ops::{Add, Sub};

/// A point in time as recorded in an archive: seconds plus nanoseconds.
///
/// `nsec` is always normalized into `[0, 1_000_000_000)`; negative `sec`
/// values are legal (e.g. relative to an origin) but `nsec` never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, nsec: 0 };

    pub fn new(sec: i64, nsec: i32) -> Self {
        let mut t = Timestamp { sec, nsec: 0 };
        t.add_nsec(nsec as i64);
        t
    }

    /// Seconds elapsed since `origin`, as an f64 usable by the interpolation math.
    pub fn since(&self, origin: Timestamp) -> f64 {
        (self.sec - origin.sec) as f64 + (self.nsec - origin.nsec) as f64 / 1e9
    }

    /// Advance `self` by `delta_sec` seconds and `delta_nsec` nanoseconds,
    /// normalizing `nsec` into `[0, 1e9)` via carry/borrow into `sec`.
    pub fn advance(&mut self, delta_sec: i64, delta_nsec: i32) {
        self.sec = self.sec.wrapping_add(delta_sec);
        self.add_nsec(delta_nsec as i64);
    }

    fn add_nsec(&mut self, delta: i64) {
        let mut total = self.nsec as i64 + delta;
        // carry/borrow so 0 <= nsec < 1e9
        while total >= 1_000_000_000 {
            total -= 1_000_000_000;
            self.sec += 1;
        }
        while total < 0 {
            total += 1_000_000_000;
            self.sec -= 1;
        }
        self.nsec = total as i32;
    }
}

impl Add<f64> for Timestamp {
    type Output = Timestamp;
    fn add(self, secs: f64) -> Timestamp {
        let whole = secs.floor() as i64;
        let frac_nsec = ((secs - secs.floor()) * 1e9).round() as i32;
        let mut t = self;
        t.advance(whole, frac_nsec);
        t
    }
}

impl Sub for Timestamp {
    type Output = f64;
    fn sub(self, rhs: Timestamp) -> f64 {
        self.since(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_overflowing_nsec() {
        let t = Timestamp::new(10, 1_500_000_000);
        assert_eq!(t.sec, 11);
        assert_eq!(t.nsec, 500_000_000);
    }

    #[test]
    fn normalizes_negative_nsec() {
        let t = Timestamp::new(10, -500_000_000);
        assert_eq!(t.sec, 9);
        assert_eq!(t.nsec, 500_000_000);
    }

    #[test]
    fn since_computes_fractional_seconds() {
        let origin = Timestamp::new(100, 0);
        let t = Timestamp::new(110, 500_000_000);
        assert!((t.since(origin) - 10.5).abs() < 1e-9);
    }

    #[test]
    fn advance_carries_across_second_boundary() {
        let mut t = Timestamp::new(0, 900_000_000);
        t.advance(0, 200_000_000);
        assert_eq!(t.sec, 1);
        assert_eq!(t.nsec, 100_000_000);
    }
}
