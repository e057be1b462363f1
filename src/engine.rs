//! Command engine
//!
//! Owns the list of in-flight commands. Every inbound frame is offered to
//! each in-flight command in submission order; the current expected pattern
//! either consumes it or the frame falls through to the status decoder.
//! Timeouts retransmit the request a bounded number of times before the
//! command fails.

use crate::error::{AeolusError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::CommandSpec;
use crate::serial::WriteQueue;
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub type CommandId = u64;

/// Who asked for a command and why; completions are dispatched on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTag {
    /// Watchdog keep-alive duty
    WatchdogPing,
    /// Clock reconciliation, read phase
    RtcGet,
    /// Clock reconciliation, write phase
    RtcSet,
    /// Parameter reconciliation phases, by parameter index
    SyncGet(usize),
    SyncSet(usize),
    SyncVerify(usize),
    /// Activity-window relay drive
    AuxWindowOn,
    AuxWindowOff,
    /// Historic pulls
    HistoricMinmax,
    HistoricAverages,
    /// Companion-tool request, answered back to its origin
    External(SocketAddr),
    /// Anything else fired internally
    Internal,
}

/// Progress notifications produced while matching frames and timers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// One response line matched; more are expected or this was the last
    Partial {
        id: CommandId,
        tag: CommandTag,
        line: String,
    },
    /// All response patterns matched, in order
    Done {
        id: CommandId,
        tag: CommandTag,
        responses: Vec<String>,
        /// Response frames as received; historic pages are not valid UTF-8
        raw: Vec<Vec<u8>>,
        attempts: u32,
    },
    /// Retries exhausted
    Failed {
        id: CommandId,
        tag: CommandTag,
        name: &'static str,
        attempts: u32,
    },
}

/// Caller's handle on a submitted command.
pub struct CommandHandle {
    pub id: CommandId,
    pub rx: oneshot::Receiver<Result<Vec<String>>>,
}

struct Inflight {
    id: CommandId,
    tag: CommandTag,
    spec: CommandSpec,
    index: usize,
    responses: Vec<String>,
    raw: Vec<Vec<u8>>,
    attempts: u32,
    deadline: Instant,
    done_tx: Option<oneshot::Sender<Result<Vec<String>>>>,
}

/// The engine proper. Single owner of the in-flight list.
pub struct CommandEngine {
    max_inflight: usize,
    inflight: Vec<Inflight>,
    waiting: VecDeque<Inflight>,
    next_id: CommandId,
    logger: StructuredLogger,
}

impl CommandEngine {
    pub fn new(max_inflight: usize) -> Self {
        Self {
            max_inflight: max_inflight.max(1),
            inflight: Vec::new(),
            waiting: VecDeque::new(),
            next_id: 1,
            logger: get_logger("engine"),
        }
    }

    /// Submit a command: queue its request and arm its timeout.
    ///
    /// The handle resolves with the ordered responses on completion, or a
    /// timeout error once retries are exhausted.
    pub fn submit(
        &mut self,
        spec: CommandSpec,
        tag: CommandTag,
        queue: &mut WriteQueue,
    ) -> CommandHandle {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id;
        self.next_id += 1;
        let cmd = Inflight {
            id,
            tag,
            spec,
            index: 0,
            responses: Vec::new(),
            raw: Vec::new(),
            attempts: 0,
            deadline: Instant::now(),
            done_tx: Some(tx),
        };
        if self.inflight.len() < self.max_inflight {
            self.activate(cmd, queue);
        } else {
            self.waiting.push_back(cmd);
        }
        CommandHandle { id, rx }
    }

    fn activate(&mut self, mut cmd: Inflight, queue: &mut WriteQueue) {
        cmd.attempts += 1;
        cmd.deadline = Instant::now() + queue.queue_delay() + cmd.spec.timeout;
        self.logger.info(&format!(
            "executing {} (attempt {}/{})",
            cmd.spec.name,
            cmd.attempts,
            cmd.spec.retries + 1
        ));
        queue.enqueue(cmd.spec.request.clone().into_bytes());
        self.inflight.push(cmd);
    }

    /// Offer a frame to the in-flight commands.
    ///
    /// Returns whether the frame was consumed, plus any progress events.
    /// First-submitted command wins a tie; an unconsumed frame belongs to
    /// the status decoder.
    pub fn on_frame(&mut self, frame: &[u8], queue: &mut WriteQueue) -> (bool, Vec<EngineEvent>) {
        let line = String::from_utf8_lossy(frame).into_owned();
        let mut events = Vec::new();
        for i in 0..self.inflight.len() {
            let cmd = &mut self.inflight[i];
            if !cmd.spec.responses[cmd.index].is_match(&line) {
                continue;
            }
            cmd.responses.push(line.clone());
            cmd.raw.push(frame.to_vec());
            cmd.index += 1;
            events.push(EngineEvent::Partial {
                id: cmd.id,
                tag: cmd.tag,
                line,
            });
            if cmd.index == cmd.spec.responses.len() {
                let mut done = self.inflight.remove(i);
                self.logger.info(&format!(
                    "completed {} (attempt {}/{})",
                    done.spec.name,
                    done.attempts,
                    done.spec.retries + 1
                ));
                if let Some(tx) = done.done_tx.take() {
                    let _ = tx.send(Ok(done.responses.clone()));
                }
                events.push(EngineEvent::Done {
                    id: done.id,
                    tag: done.tag,
                    responses: done.responses,
                    raw: done.raw,
                    attempts: done.attempts,
                });
                self.promote(queue);
            }
            return (true, events);
        }
        (false, events)
    }

    /// Earliest pending deadline, if any command is in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inflight.iter().map(|c| c.deadline).min()
    }

    /// Fire expired deadlines: retransmit or fail.
    pub fn on_timeout(&mut self, now: Instant, queue: &mut WriteQueue) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let mut i = 0;
        while i < self.inflight.len() {
            if self.inflight[i].deadline > now {
                i += 1;
                continue;
            }
            let cmd = &mut self.inflight[i];
            if cmd.attempts < cmd.spec.retries + 1 {
                cmd.index = 0;
                cmd.responses.clear();
                cmd.raw.clear();
                cmd.attempts += 1;
                cmd.deadline = now + queue.queue_delay() + cmd.spec.timeout;
                self.logger.debug(&format!(
                    "timeout waiting for {}, retrying (attempt {}/{})",
                    cmd.spec.name,
                    cmd.attempts,
                    cmd.spec.retries + 1
                ));
                queue.enqueue(cmd.spec.request.clone().into_bytes());
                i += 1;
            } else {
                let mut failed = self.inflight.remove(i);
                self.logger.error(&format!(
                    "device not responding to {} after {} attempts",
                    failed.spec.name, failed.attempts
                ));
                if let Some(tx) = failed.done_tx.take() {
                    let _ = tx.send(Err(AeolusError::timeout(format!(
                        "no response to {}",
                        failed.spec.name
                    ))));
                }
                events.push(EngineEvent::Failed {
                    id: failed.id,
                    tag: failed.tag,
                    name: failed.spec.name,
                    attempts: failed.attempts,
                });
            }
        }
        self.promote(queue);
        events
    }

    fn promote(&mut self, queue: &mut WriteQueue) {
        while self.inflight.len() < self.max_inflight {
            let Some(next) = self.waiting.pop_front() else {
                break;
            };
            self.activate(next, queue);
        }
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Whether a command with this tag is in flight or queued.
    pub fn has_tag(&self, tag: CommandTag) -> bool {
        self.inflight.iter().any(|c| c.tag == tag)
            || self.waiting.iter().any(|c| c.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands;

    #[tokio::test(start_paused = true)]
    async fn test_single_response_roundtrip() {
        let mut engine = CommandEngine::new(4);
        let mut queue = WriteQueue::new();
        let mut handle =
            engine.submit(commands::watchdog_ping(), CommandTag::WatchdogPing, &mut queue);
        assert_eq!(queue.pending(), 1);

        let (consumed, events) = engine.on_frame(b"(r)", &mut queue);
        assert!(consumed);
        assert!(matches!(events.last(), Some(EngineEvent::Done { .. })));
        let responses = handle.rx.try_recv().unwrap().unwrap();
        assert_eq!(responses, vec!["(r)".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_frames_fall_through() {
        let mut engine = CommandEngine::new(4);
        let mut queue = WriteQueue::new();
        let _handle = engine.submit(commands::aux_status(), CommandTag::Internal, &mut queue);

        // A status bulletin does not match the aux status matcher
        let bulletin = vec![b'x'; 10];
        let (consumed, _) = engine.on_frame(&bulletin, &mut queue);
        assert!(!consumed);

        // The three responses must arrive in declared order
        let (c1, _) = engine.on_frame(b"(S009)", &mut queue);
        let (c2, _) = engine.on_frame(b"(Son1900)", &mut queue);
        let (c3, _) = engine.on_frame(b"(Sof2200)", &mut queue);
        assert!(c1 && c2 && c3);
        assert_eq!(engine.inflight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_inflight_queues_excess() {
        let mut engine = CommandEngine::new(1);
        let mut queue = WriteQueue::new();
        let _a = engine.submit(commands::watchdog_ping(), CommandTag::WatchdogPing, &mut queue);
        let _b = engine.submit(commands::aux_status(), CommandTag::Internal, &mut queue);
        // Only the first request went out
        assert_eq!(queue.pending(), 1);
        assert_eq!(engine.inflight_count(), 1);
        assert!(engine.has_tag(CommandTag::Internal));

        let _ = engine.on_frame(b"(r)", &mut queue);
        // Completion promotes the queued command
        assert_eq!(engine.inflight_count(), 1);
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_after_exact_attempts() {
        let mut engine = CommandEngine::new(4);
        let mut queue = WriteQueue::new();
        let mut handle =
            engine.submit(commands::roof_force_open(), CommandTag::Internal, &mut queue);

        let mut transmissions = queue.pending();
        for _ in 0..10 {
            let Some(deadline) = engine.next_deadline() else {
                break;
            };
            tokio::time::advance(deadline - Instant::now()).await;
            let _ = engine.on_timeout(Instant::now(), &mut queue);
            transmissions = queue.pending();
        }
        // Initial attempt plus two retries
        assert_eq!(transmissions, 3);
        assert!(engine.next_deadline().is_none());
        assert!(handle.rx.try_recv().unwrap().is_err());
    }
}
