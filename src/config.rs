//! Process-wide engine configuration.
//!
//! The original implementation reads a handful of environment variables into
//! file-scope statics the first time they're needed ("one-trip" initialization).
//! We make that explicit: [`EngineConfig::global`] reads the environment exactly
//! once per process via [`std::sync::OnceLock`] and is read-only thereafter.

use std::sync::OnceLock;

/// How `<mark>` (discontinuity) records are treated during bound search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkPolicy {
    /// Always honor marks (the default: a mark always breaks continuity).
    Honor,
    /// Ignore every mark encountered.
    IgnoreAll,
    /// Ignore a mark only if the real records flanking it are within
    /// `threshold_secs` of each other.
    IgnoreGap { threshold_secs: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Whether 32-/64-bit counters should be treated as wrapping on decrease.
    pub counter_wrap: bool,
    pub mark_policy: MarkPolicy,
}

impl EngineConfig {
    fn from_env() -> Self {
        let counter_wrap = std::env::var_os("PCP_COUNTER_WRAP").is_some();
        let mark_policy = match std::env::var("PCP_IGNORE_MARK_RECORDS") {
            Err(_) => MarkPolicy::Honor,
            Ok(v) if v.is_empty() => MarkPolicy::IgnoreAll,
            Ok(v) => match parse_interval_secs(&v) {
                Some(secs) => MarkPolicy::IgnoreGap { threshold_secs: secs },
                // An unparseable threshold is not a silent misconfiguration we
                // can safely ignore: fall back to the always-safe behavior.
                None => MarkPolicy::Honor,
            },
        };
        EngineConfig { counter_wrap, mark_policy }
    }

    /// The process-wide configuration, computed from the environment on first use.
    pub fn global() -> &'static EngineConfig {
        static CONFIG: OnceLock<EngineConfig> = OnceLock::new();
        CONFIG.get_or_init(EngineConfig::from_env)
    }
}

/// Parses `"30"` (seconds), `"30sec"`, `"30s"`, `"2min"` style interval strings.
fn parse_interval_secs(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (num, unit) = if split == 0 {
        // no numeric prefix found at all
        return s.parse::<f64>().ok();
    } else {
        s.split_at(split)
    };
    let num: f64 = num.parse().ok()?;
    let unit = unit.trim();
    let mult = match unit {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hour" | "hours" => 3600.0,
        _ => return None,
    };
    Some(num * mult)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_interval_secs("30"), Some(30.0));
    }

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(parse_interval_secs("11s"), Some(11.0));
        assert_eq!(parse_interval_secs("2min"), Some(120.0));
        assert_eq!(parse_interval_secs("1hour"), Some(3600.0));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_interval_secs("banana"), None);
        assert_eq!(parse_interval_secs(""), None);
    }
}
