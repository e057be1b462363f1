//! Timeout and retry behavior: a command whose responses are lost twice
//! succeeds on the second retry, and one that is never answered fails after
//! exactly its retry budget.

use aeolus::engine::{CommandEngine, CommandTag};
use aeolus::protocol::commands;
use aeolus::serial::WriteQueue;
use tokio::time::{advance, Duration, Instant};

/// Let time run until the engine's next deadline fires.
async fn run_to_deadline(engine: &mut CommandEngine, queue: &mut WriteQueue) {
    let deadline = engine.next_deadline().expect("a deadline must be armed");
    advance(deadline - Instant::now()).await;
    let _ = engine.on_timeout(Instant::now(), queue);
}

#[tokio::test(start_paused = true)]
async fn retry_twice_then_succeed() {
    let mut engine = CommandEngine::new(4);
    let mut queue = WriteQueue::new();

    let started = Instant::now();
    let mut handle = engine.submit(commands::roof_force_open(), CommandTag::Internal, &mut queue);
    assert_eq!(queue.pending(), 1);

    // First two attempts go unanswered
    run_to_deadline(&mut engine, &mut queue).await;
    assert_eq!(queue.pending(), 2);
    run_to_deadline(&mut engine, &mut queue).await;
    assert_eq!(queue.pending(), 3);

    // The device answers the third transmission
    let (c1, _) = engine.on_frame(b"(X007)", &mut queue);
    let (c2, _) = engine.on_frame(b"(16:08:11 Abrir Obs. FORZADO)", &mut queue);
    assert!(c1 && c2);

    let responses = handle.rx.try_recv().unwrap().unwrap();
    assert_eq!(responses[0], "(X007)");

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(8) && elapsed <= Duration::from_secs(12),
        "elapsed {:?} outside the retry envelope",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn failure_transmits_exactly_retry_budget() {
    let mut engine = CommandEngine::new(4);
    let mut queue = WriteQueue::new();

    let mut handle = engine.submit(commands::roof_force_close(), CommandTag::Internal, &mut queue);

    for _ in 0..3 {
        if engine.next_deadline().is_none() {
            break;
        }
        run_to_deadline(&mut engine, &mut queue).await;
    }

    // Initial attempt plus two retries were queued for transmission
    assert_eq!(queue.pending(), 3);
    assert!(engine.next_deadline().is_none());
    assert!(handle.rx.try_recv().unwrap().is_err());
}
