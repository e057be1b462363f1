//! Historic bulk dumps: page matching through the engine and payload
//! assembly with flash-page timestamping.

mod common;

use aeolus::engine::{CommandEngine, CommandTag, EngineEvent};
use aeolus::protocol::commands;
use aeolus::publish::{averages_payload, minmax_payload, page_for};
use aeolus::serial::WriteQueue;
use chrono::{TimeZone, Utc};

#[tokio::test(start_paused = true)]
async fn minmax_dump_collects_all_pages() {
    let mut engine = CommandEngine::new(1);
    let mut queue = WriteQueue::new();
    let _handle = engine.submit(commands::minmax_dump(), CommandTag::HistoricMinmax, &mut queue);

    let mut done_raw = None;
    for hour in 0..24u16 {
        let maxima = common::status_line(12.9, 'M', hour);
        let minima = common::status_line(12.1, 'm', hour);
        let stamp = format!("({:02}:59:59 08/03/2024)", hour % 24);

        let (c, _) = engine.on_frame(&maxima, &mut queue);
        assert!(c, "maxima page {} must match", hour);
        let (c, _) = engine.on_frame(&minima, &mut queue);
        assert!(c, "minima page {} must match", hour);
        let (c, events) = engine.on_frame(stamp.as_bytes(), &mut queue);
        assert!(c, "timestamp {} must match", hour);

        for event in events {
            if let EngineEvent::Done { raw, .. } = event {
                done_raw = Some(raw);
            }
        }
    }

    let raw = done_raw.expect("dump must complete after 24 triples");
    assert_eq!(raw.len(), 72);

    let payload = minmax_payload(&raw);
    let entries = payload.as_array().unwrap();
    assert_eq!(entries.len(), 24);
    assert_eq!(entries[0]["tstamp"], "00:59:59 08/03/2024");
    assert!((entries[0]["max"]["voltage"].as_f64().unwrap() - 12.9).abs() < 0.05);
    assert!((entries[0]["min"]["voltage"].as_f64().unwrap() - 12.1).abs() < 0.05);
}

#[tokio::test(start_paused = true)]
async fn averages_dump_is_not_interrupted_by_live_bulletins() {
    let mut engine = CommandEngine::new(1);
    let mut queue = WriteQueue::new();
    let mut handle = engine.submit(
        commands::averages_dump(),
        CommandTag::HistoricAverages,
        &mut queue,
    );

    for page in 0..288u16 {
        if page % 50 == 0 {
            // Live bulletins interleave and must fall through
            let live = common::current_bulletin(12.6);
            let (consumed, _) = engine.on_frame(&live, &mut queue);
            assert!(!consumed);
        }
        let frame = common::status_line(12.4, 't', page);
        let (consumed, _) = engine.on_frame(&frame, &mut queue);
        assert!(consumed, "historic page {} must match", page);
    }

    let responses = handle.rx.try_recv().unwrap().unwrap();
    assert_eq!(responses.len(), 288);
}

#[test]
fn averages_pages_are_timestamped_against_the_dump_instant() {
    let now = Utc.with_ymd_and_hms(2024, 3, 8, 12, 2, 0).unwrap();
    assert_eq!(page_for(now.time()), 144);

    let raw: Vec<Vec<u8>> = vec![
        common::status_line(12.4, 't', 150), // written after the dump page
        common::status_line(12.4, 't', 10),
    ];
    let payload = averages_payload(&raw, now);
    let entries = payload.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // Page beyond the current one carries today's date
    assert!(entries[0]["tstamp"]
        .as_str()
        .unwrap()
        .starts_with("2024-03-08T12:35"));
    // Earlier pages belong to the previous day
    assert!(entries[1]["tstamp"]
        .as_str()
        .unwrap()
        .starts_with("2024-03-07T00:55"));
}
