//! Periodic duty scheduler
//!
//! One-second tick resolution over monotonic time. Each duty keeps its own
//! period; `due` returns what should run this tick. Duties whose previous
//! command is still in flight are the caller's to skip, so a slow device
//! never piles up duplicate work.

use crate::config::Config;
use tokio::time::{Duration, Instant};

/// Scheduler tick resolution
pub const TICK: Duration = Duration::from_secs(1);

/// Periodic duties the gateway runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Duty {
    /// Snapshot instruments and publish the current state
    Upload,
    /// Keep the device watchdog from releasing the relays
    WatchdogPing,
    /// Compare device and host clocks
    RtcCheck,
    /// Evaluate the time-of-day windows
    TodEvaluate,
    /// Re-attempt failed parameter reconciliation
    DailySync,
    /// Render the local HTML snapshot page
    HtmlRender,
}

struct Periodic {
    every: Duration,
    next: Instant,
}

impl Periodic {
    fn new(every: Duration, first: Instant) -> Self {
        Self { every, next: first }
    }

    fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        // Re-anchor on now so a stalled loop does not burst-fire
        self.next = now + self.every;
        true
    }
}

/// Duty timing state
pub struct Scheduler {
    upload: Periodic,
    watchdog: Periodic,
    rtc: Periodic,
    tod: Periodic,
    daily_sync: Periodic,
    html: Option<Periodic>,
}

impl Scheduler {
    pub fn new(config: &Config, now: Instant) -> Self {
        let upload_every = Duration::from_secs(config.gateway.upload_period.max(1));
        let watchdog_every = Duration::from_secs((config.gateway.keepalive / 2).max(1));
        let rtc_every = Duration::from_secs(config.rtc.period_hours.max(1) * 3600);
        let tod_every = Duration::from_secs(60);
        let day = Duration::from_secs(24 * 3600);

        Self {
            upload: Periodic::new(upload_every, now + upload_every),
            watchdog: Periodic::new(watchdog_every, now + watchdog_every),
            rtc: Periodic::new(rtc_every, now + TICK),
            // Establish window state on the first tick
            tod: Periodic::new(tod_every, now + TICK),
            daily_sync: Periodic::new(day, now + day),
            html: (!config.html.file.is_empty()).then(|| {
                let every = Duration::from_secs(config.html.period.max(1));
                Periodic::new(every, now + every)
            }),
        }
    }

    /// Duties due at this tick, in a fixed priority order.
    pub fn due(&mut self, now: Instant) -> Vec<Duty> {
        let mut duties = Vec::new();
        if self.tod.due(now) {
            duties.push(Duty::TodEvaluate);
        }
        if self.watchdog.due(now) {
            duties.push(Duty::WatchdogPing);
        }
        if self.upload.due(now) {
            duties.push(Duty::Upload);
        }
        if self.rtc.due(now) {
            duties.push(Duty::RtcCheck);
        }
        if self.daily_sync.due(now) {
            duties.push(Duty::DailySync);
        }
        if let Some(html) = self.html.as_mut() {
            if html.due(now) {
                duties.push(Duty::HtmlRender);
            }
        }
        duties
    }
}
