//! Clock master selection and the drift arithmetic feeding it.

use aeolus::protocol::commands::{parse_device_time, rtc_set};
use aeolus::rtc::{drift_seconds, select_master, ClockMaster};
use chrono::{Duration, NaiveDate};

#[test]
fn host_wins_with_hardware_clock_or_internet() {
    assert_eq!(select_master(true, false), ClockMaster::Host);
    assert_eq!(select_master(false, true), ClockMaster::Host);
    assert_eq!(select_master(true, true), ClockMaster::Host);
}

#[test]
fn device_wins_when_host_cannot_be_trusted() {
    assert_eq!(select_master(false, false), ClockMaster::Device);
}

#[test]
fn device_ten_seconds_ahead_is_out_of_tolerance() {
    let host = NaiveDate::from_ymd_opt(2024, 3, 8)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let device = host + Duration::seconds(10);
    assert!(drift_seconds(device, host) > 5);

    // The correction command carries the host time in the device format
    let set = rtc_set(host);
    assert_eq!(set.request, "(Y080324100000)");
    assert!(set.responses[0].is_match("(10:00:00 08/03/2024)"));
}

#[test]
fn device_time_line_parses_back() {
    let t = parse_device_time("(10:00:10 08/03/2024)").unwrap();
    let host = NaiveDate::from_ymd_opt(2024, 3, 8)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    assert_eq!(drift_seconds(t, host), 10);
}
