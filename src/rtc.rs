//! Device clock reconciliation
//!
//! The controller keeps its own real time clock. Periodically the gateway
//! compares it against the host clock and corrects the slave side. Which
//! side is authoritative depends on whether the host can be trusted: a
//! battery-backed host clock or Internet reachability makes the host the
//! master; with neither, the device clock wins and the host is set from it.

use crate::config::ProbeConfig;
use crate::logging::get_logger;
use chrono::NaiveDateTime;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

/// Which side of the link holds the authoritative clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMaster {
    Host,
    Device,
}

/// Decide the master for this check.
pub fn select_master(host_rtc: bool, internet_reachable: bool) -> ClockMaster {
    if host_rtc || internet_reachable {
        ClockMaster::Host
    } else {
        ClockMaster::Device
    }
}

/// Absolute difference between the two clocks, in whole seconds.
pub fn drift_seconds(device: NaiveDateTime, host: NaiveDateTime) -> i64 {
    (device - host).num_seconds().abs()
}

/// Probe the configured endpoints; reachable when any TCP connect succeeds.
pub async fn internet_reachable(cfg: &ProbeConfig) -> bool {
    let logger = get_logger("rtc");
    let per_attempt = Duration::from_secs(cfg.timeout_seconds.max(1));
    for site in &cfg.sites {
        match timeout(per_attempt, TcpStream::connect(site.as_str())).await {
            Ok(Ok(_)) => {
                logger.debug(&format!("internet probe ok via {}", site));
                return true;
            }
            Ok(Err(e)) => logger.debug(&format!("probe {} failed: {}", site, e)),
            Err(_) => logger.debug(&format!("probe {} timed out", site)),
        }
    }
    false
}

/// Set the host clock from the device clock.
///
/// Needs privileges; the outcome is logged and nothing else depends on it.
pub fn set_host_clock(device_time: NaiveDateTime) {
    let logger = get_logger("rtc");
    let stamp = device_time.format("%Y-%m-%d %H:%M:%S").to_string();
    match Command::new("sudo")
        .args(["date", "-u", "-s", &stamp])
        .spawn()
    {
        Ok(_) => logger.warn(&format!("setting host clock from device: {}", stamp)),
        Err(e) => logger.error(&format!("could not set host clock: {}", e)),
    }
}
