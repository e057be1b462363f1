//! Parameter reconciliation: read, compare, correct, verify.

use aeolus::engine::{CommandEngine, CommandTag};
use aeolus::protocol::commands;
use aeolus::serial::WriteQueue;
use aeolus::sync::{SyncEngine, SyncReport};

struct Rig {
    engine: CommandEngine,
    queue: WriteQueue,
    sync: SyncEngine,
}

impl Rig {
    fn new(sync: SyncEngine) -> Self {
        Self {
            engine: CommandEngine::new(4),
            queue: WriteQueue::new(),
            sync,
        }
    }

    /// Feed one frame and run any resulting engine events through the
    /// reconciliation state machine.
    fn feed(&mut self, frame: &[u8]) -> Vec<SyncReport> {
        let (_, events) = self.engine.on_frame(frame, &mut self.queue);
        let mut reports = Vec::new();
        for event in events {
            if let Some(report) = self
                .sync
                .on_event(&event, &mut self.engine, &mut self.queue)
            {
                reports.push(report);
            }
        }
        reports
    }

    fn queued_requests(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            // Drain ignoring the pace; only the order matters here
            let now = tokio::time::Instant::now();
            match self.queue.pop_ready(now) {
                Some(line) => out.push(String::from_utf8_lossy(&line).into_owned()),
                None => break,
            }
        }
        out
    }
}

#[tokio::test(start_paused = true)]
async fn mismatch_is_corrected_and_verified() {
    let mut rig = Rig::new(SyncEngine::new(vec![commands::barometer_height(700)]));
    rig.sync.start(&mut rig.engine, &mut rig.queue);

    // Read phase goes out
    assert_eq!(rig.queued_requests(), vec!["(m)".to_string()]);

    // Device reports a stale height, so the set goes out
    let reports = rig.feed(b"(M00650)");
    assert!(reports.is_empty());
    tokio::time::advance(aeolus::serial::WRITE_PACE).await;
    assert_eq!(rig.queued_requests(), vec!["(M00700)".to_string()]);

    // Set acknowledged, verification read goes out
    let reports = rig.feed(b"(M00700)");
    assert!(reports.is_empty());
    tokio::time::advance(aeolus::serial::WRITE_PACE).await;
    assert_eq!(rig.queued_requests(), vec!["(m)".to_string()]);

    // Verification confirms the configured value
    let reports = rig.feed(b"(M00700)");
    assert_eq!(
        reports,
        vec![SyncReport::Corrected {
            name: "barometer height",
            from: 650.0,
            to: 700.0,
        }]
    );
    assert!(rig.sync.is_done());
    assert_eq!(rig.sync.failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn matching_value_needs_no_write() {
    let mut rig = Rig::new(SyncEngine::new(vec![commands::barometer_height(700)]));
    rig.sync.start(&mut rig.engine, &mut rig.queue);
    let _ = rig.queued_requests();

    let reports = rig.feed(b"(M00700)");
    assert_eq!(
        reports,
        vec![SyncReport::InSync {
            name: "barometer height"
        }]
    );
    assert!(rig.sync.is_done());
    // No set command was queued
    tokio::time::advance(aeolus::serial::WRITE_PACE).await;
    assert!(rig.queued_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unanswered_parameter_degrades_and_retries_later() {
    let mut rig = Rig::new(SyncEngine::new(vec![commands::barometer_height(700)]));
    rig.sync.start(&mut rig.engine, &mut rig.queue);

    // Exhaust the retry budget without ever answering
    for _ in 0..3 {
        let Some(deadline) = rig.engine.next_deadline() else {
            break;
        };
        tokio::time::advance(deadline - tokio::time::Instant::now()).await;
        let events = rig
            .engine
            .on_timeout(tokio::time::Instant::now(), &mut rig.queue);
        for event in events {
            let _ = rig
                .sync
                .on_event(&event, &mut rig.engine, &mut rig.queue);
        }
    }

    assert!(rig.sync.is_done());
    assert_eq!(rig.sync.failures(), 1);

    // The daily pass re-attempts only what failed
    rig.sync.restart_failed(&mut rig.engine, &mut rig.queue);
    assert!(!rig.sync.is_done());
    assert!(rig.engine.has_tag(CommandTag::SyncGet(0)));
}

#[tokio::test(start_paused = true)]
async fn multi_response_parameter_extracts_the_right_line() {
    let mut rig = Rig::new(SyncEngine::new(vec![
        commands::aux_switch_on_time("19:00").unwrap()
    ]));
    rig.sync.start(&mut rig.engine, &mut rig.queue);
    assert_eq!(rig.queued_requests(), vec!["(s)".to_string()]);

    // The status reply carries mode, on hour and off hour; only the second
    // line holds this parameter
    let _ = rig.feed(b"(S009)");
    let _ = rig.feed(b"(Son1900)");
    let reports = rig.feed(b"(Sof2200)");
    assert_eq!(
        reports,
        vec![SyncReport::InSync {
            name: "aux relay switch-on time"
        }]
    );
}
