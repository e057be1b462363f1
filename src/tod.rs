//! Time-of-day activity windows
//!
//! Windows are UTC `HH:MM-HH:MM` intervals over the minute-of-day axis,
//! non-overlapping and sorted, each with start strictly before end. The
//! timer evaluates once a minute and reports transitions; entering a window
//! can also carry the host-shutdown minute when poweroff is configured.

use crate::config::TodConfig;
use crate::error::{AeolusError, Result};
use chrono::{NaiveTime, Timelike};
use std::fmt;

/// Minimum coverage the interval set must provide, in minutes
pub const MIN_COVERAGE_MINUTES: u32 = 15;

/// Minutes before a window's end when the host shutdown is scheduled
pub const SHUTDOWN_LEAD_MINUTES: u32 = 2;

/// One `[start, end)` activity interval in minutes of the UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn contains(&self, minute: u32) -> bool {
        minute >= self.start && minute < self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end - self.start
    }

    /// Minute the host shutdown should run at for this window
    pub fn shutdown_minute(&self) -> u32 {
        self.end.saturating_sub(SHUTDOWN_LEAD_MINUTES).max(self.start)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

fn parse_hhmm(s: &str) -> Result<u32> {
    let (h, m) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| AeolusError::validation("tod.intervals", "expected HH:MM"))?;
    let h: u32 = h
        .parse()
        .map_err(|_| AeolusError::validation("tod.intervals", "bad hour"))?;
    let m: u32 = m
        .parse()
        .map_err(|_| AeolusError::validation("tod.intervals", "bad minute"))?;
    if h > 24 || m > 59 || (h == 24 && m != 0) {
        return Err(AeolusError::validation("tod.intervals", "time out of range"));
    }
    Ok(h * 60 + m)
}

/// Sorted, validated set of activity intervals
#[derive(Debug, Clone)]
pub struct Intervals {
    windows: Vec<Interval>,
}

impl Intervals {
    /// Parse a `HH:MM-HH:MM,HH:MM-HH:MM,...` specification.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut windows = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (lo, hi) = part.split_once('-').ok_or_else(|| {
                AeolusError::validation(
                    "tod.intervals".to_string(),
                    format!("expected HH:MM-HH:MM, got '{}'", part),
                )
            })?;
            windows.push(Interval {
                start: parse_hhmm(lo)?,
                end: parse_hhmm(hi)?,
            });
        }
        if windows.is_empty() {
            return Err(AeolusError::validation(
                "tod.intervals",
                "at least one interval is required",
            ));
        }
        windows.sort_by_key(|w| w.start);
        let set = Self { windows };
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<()> {
        for w in &self.windows {
            if w.start >= w.end {
                return Err(AeolusError::validation(
                    "tod.intervals".to_string(),
                    format!("reversed or empty interval {}", w),
                ));
            }
        }
        for pair in self.windows.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(AeolusError::validation(
                    "tod.intervals".to_string(),
                    format!("interval {} overlaps {}", pair[0], pair[1]),
                ));
            }
        }
        let coverage: u32 = self.windows.iter().map(Interval::duration_minutes).sum();
        if coverage < MIN_COVERAGE_MINUTES {
            return Err(AeolusError::validation(
                "tod.intervals".to_string(),
                format!(
                    "intervals cover {} minutes, need at least {}",
                    coverage, MIN_COVERAGE_MINUTES
                ),
            ));
        }
        Ok(())
    }

    /// Index of the interval containing this minute of day, if any.
    pub fn find(&self, minute: u32) -> Option<usize> {
        self.windows.iter().position(|w| w.contains(minute))
    }

    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.windows.get(index)
    }

    /// Next interval after the given one, wrapping around the day.
    pub fn next_after(&self, index: usize) -> &Interval {
        &self.windows[(index + 1) % self.windows.len()]
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.windows.iter()
    }
}

impl fmt::Display for Intervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.windows.iter().map(|w| w.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A window boundary crossing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodTransition {
    /// Inactive to active; `shutdown_minute` set when poweroff is configured
    Entered {
        index: usize,
        shutdown_minute: Option<u32>,
    },
    /// Active to inactive; shutdown aims at the next window's end
    Left {
        index: usize,
        shutdown_minute: Option<u32>,
    },
}

/// Tracks inside/outside state across periodic evaluations.
pub struct TodTimer {
    intervals: Intervals,
    poweroff: bool,
    active: Option<usize>,
}

impl TodTimer {
    pub fn new(cfg: &TodConfig) -> Result<Self> {
        Ok(Self {
            intervals: Intervals::parse(&cfg.intervals)?,
            poweroff: cfg.poweroff,
            active: None,
        })
    }

    pub fn intervals(&self) -> &Intervals {
        &self.intervals
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Evaluate at the given UTC time; at most one transition per call.
    ///
    /// At any instant exactly one of inside/outside holds, so the state can
    /// only flip at interval boundaries.
    pub fn evaluate(&mut self, now: NaiveTime) -> Option<TodTransition> {
        let minute = now.hour() * 60 + now.minute();
        let inside = self.intervals.find(minute);

        let transition = match (self.active, inside) {
            (None, Some(i)) => Some(TodTransition::Entered {
                index: i,
                shutdown_minute: self
                    .poweroff
                    .then(|| self.intervals.get(i).map(Interval::shutdown_minute))
                    .flatten(),
            }),
            (Some(i), None) => Some(TodTransition::Left {
                index: i,
                shutdown_minute: self
                    .poweroff
                    .then(|| self.intervals.next_after(i).shutdown_minute()),
            }),
            (Some(prev), Some(i)) if prev != i => Some(TodTransition::Entered {
                index: i,
                shutdown_minute: self
                    .poweroff
                    .then(|| self.intervals.get(i).map(Interval::shutdown_minute))
                    .flatten(),
            }),
            _ => None,
        };
        self.active = inside;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn cfg(intervals: &str, poweroff: bool) -> TodConfig {
        TodConfig {
            intervals: intervals.to_string(),
            poweroff,
        }
    }

    #[test]
    fn test_parse_sorts_and_validates() {
        let iv = Intervals::parse("20:00-20:15,12:00-12:15").unwrap();
        assert_eq!(iv.to_string(), "12:00-12:15,20:00-20:15");
        assert_eq!(iv.find(12 * 60 + 5), Some(0));
        assert_eq!(iv.find(12 * 60 + 15), None);
        assert_eq!(iv.find(20 * 60), Some(1));
    }

    #[test]
    fn test_reject_reversed() {
        assert!(Intervals::parse("12:15-12:00").is_err());
    }

    #[test]
    fn test_reject_overlap() {
        assert!(Intervals::parse("12:00-12:30,12:20-12:45").is_err());
    }

    #[test]
    fn test_reject_thin_coverage() {
        assert!(Intervals::parse("12:00-12:05").is_err());
        assert!(Intervals::parse("12:00-12:05,13:00-13:05,14:00-14:05").is_ok());
    }

    #[test]
    fn test_window_transitions() {
        let mut timer = TodTimer::new(&cfg("12:00-12:15,20:00-20:15", false)).unwrap();

        assert_eq!(timer.evaluate(t(11, 59, 59)), None);
        assert!(!timer.is_active());

        let tr = timer.evaluate(t(12, 0, 1)).unwrap();
        assert_eq!(
            tr,
            TodTransition::Entered {
                index: 0,
                shutdown_minute: None
            }
        );
        assert!(timer.is_active());

        // Steady state inside
        assert_eq!(timer.evaluate(t(12, 10, 0)), None);

        let tr = timer.evaluate(t(12, 15, 0)).unwrap();
        assert_eq!(
            tr,
            TodTransition::Left {
                index: 0,
                shutdown_minute: None
            }
        );
        assert!(!timer.is_active());
    }

    #[test]
    fn test_shutdown_scheduling() {
        let mut timer = TodTimer::new(&cfg("12:00-12:15,20:00-20:15", true)).unwrap();
        let tr = timer.evaluate(t(12, 0, 1)).unwrap();
        // 12:15 minus the lead is 12:13
        assert_eq!(
            tr,
            TodTransition::Entered {
                index: 0,
                shutdown_minute: Some(12 * 60 + 13)
            }
        );
        let tr = timer.evaluate(t(12, 15, 30)).unwrap();
        // Aim at the next window's end
        assert_eq!(
            tr,
            TodTransition::Left {
                index: 0,
                shutdown_minute: Some(20 * 60 + 13)
            }
        );
    }

    #[test]
    fn test_state_flips_only_at_boundaries() {
        let iv = Intervals::parse("00:00-00:20,23:40-24:00").unwrap();
        let mut flips = 0;
        let mut prev = iv.find(0).is_some();
        for minute in 1..(24 * 60) {
            let cur = iv.find(minute).is_some();
            if cur != prev {
                flips += 1;
            }
            prev = cur;
        }
        assert_eq!(flips, 2);
        assert!(iv.find(0).is_some());
        assert!(iv.find(23 * 60 + 59).is_some());
        assert!(iv.find(12 * 60).is_none());
    }
}
