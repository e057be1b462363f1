//! Device parameter synchronization
//!
//! At startup every configured parameter is read back from the device and,
//! when it differs, written and verified, keeping EEPROM writes to the
//! minimum. All traffic goes through the command engine so it interleaves
//! correctly with the unsolicited status stream. Failures degrade rather
//! than abort; they are retried on the next daily pass.

use crate::engine::{CommandEngine, CommandTag, EngineEvent};
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::Parameter;
use crate::serial::WriteQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamState {
    Idle,
    Getting,
    Setting,
    Verifying,
    Done,
    Failed,
}

struct ParamSync {
    param: Parameter,
    state: ParamState,
    // Device-side value observed during the read phase
    seen: Option<i64>,
}

/// What happened to one parameter during reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum SyncReport {
    /// Device already holds the configured value
    InSync { name: &'static str },
    /// Device differed; the configured value was written and verified
    Corrected {
        name: &'static str,
        from: f64,
        to: f64,
    },
    /// The set command went through but verification still differs
    Mismatch { name: &'static str },
    /// The device never answered
    Unreachable { name: &'static str },
}

/// Reconciliation driver over the engine.
pub struct SyncEngine {
    params: Vec<ParamSync>,
    logger: StructuredLogger,
}

impl SyncEngine {
    pub fn new(params: Vec<Parameter>) -> Self {
        Self {
            params: params
                .into_iter()
                .map(|param| ParamSync {
                    param,
                    state: ParamState::Idle,
                    seen: None,
                })
                .collect(),
            logger: get_logger("sync"),
        }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Whether every parameter has reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.params
            .iter()
            .all(|p| matches!(p.state, ParamState::Done | ParamState::Failed))
    }

    pub fn failures(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.state == ParamState::Failed)
            .count()
    }

    /// Submit the read phase for every idle parameter.
    pub fn start(&mut self, engine: &mut CommandEngine, queue: &mut WriteQueue) {
        for i in 0..self.params.len() {
            if self.params[i].state == ParamState::Idle {
                self.params[i].state = ParamState::Getting;
                let spec = self.params[i].param.get_spec();
                engine.submit(spec, CommandTag::SyncGet(i), queue);
            }
        }
    }

    /// Re-attempt previously failed parameters.
    pub fn restart_failed(&mut self, engine: &mut CommandEngine, queue: &mut WriteQueue) {
        for p in &mut self.params {
            if p.state == ParamState::Failed {
                p.state = ParamState::Idle;
            }
        }
        self.start(engine, queue);
    }

    /// Advance the state machine on an engine event carrying a sync tag.
    pub fn on_event(
        &mut self,
        event: &EngineEvent,
        engine: &mut CommandEngine,
        queue: &mut WriteQueue,
    ) -> Option<SyncReport> {
        match event {
            EngineEvent::Done { tag, responses, .. } => match *tag {
                CommandTag::SyncGet(i) => self.on_get(i, responses, engine, queue),
                CommandTag::SyncSet(i) => {
                    self.params[i].state = ParamState::Verifying;
                    let spec = self.params[i].param.get_spec();
                    engine.submit(spec, CommandTag::SyncVerify(i), queue);
                    None
                }
                CommandTag::SyncVerify(i) => self.on_verify(i, responses),
                _ => None,
            },
            EngineEvent::Failed { tag, .. } => match *tag {
                CommandTag::SyncGet(i) | CommandTag::SyncSet(i) | CommandTag::SyncVerify(i) => {
                    self.params[i].state = ParamState::Failed;
                    let name = self.params[i].param.name;
                    self.logger
                        .warn(&format!("device not answering {} sync request", name));
                    Some(SyncReport::Unreachable { name })
                }
                _ => None,
            },
            EngineEvent::Partial { .. } => None,
        }
    }

    fn on_get(
        &mut self,
        i: usize,
        responses: &[String],
        engine: &mut CommandEngine,
        queue: &mut WriteQueue,
    ) -> Option<SyncReport> {
        let p = &mut self.params[i];
        match p.param.extract(responses) {
            Some(value) if value == p.param.target => {
                p.state = ParamState::Done;
                self.logger
                    .debug(&format!("no need to sync {}", p.param.name));
                Some(SyncReport::InSync { name: p.param.name })
            }
            Some(value) => {
                self.logger.info(&format!(
                    "{} differs: device {} vs configured {}, setting",
                    p.param.name,
                    p.param.physical(value),
                    p.param.physical_target()
                ));
                p.seen = Some(value);
                p.state = ParamState::Setting;
                let spec = p.param.set_spec();
                engine.submit(spec, CommandTag::SyncSet(i), queue);
                None
            }
            None => {
                p.state = ParamState::Failed;
                self.logger.warn(&format!(
                    "{} response did not carry a value",
                    p.param.name
                ));
                Some(SyncReport::Unreachable { name: p.param.name })
            }
        }
    }

    fn on_verify(&mut self, i: usize, responses: &[String]) -> Option<SyncReport> {
        let p = &mut self.params[i];
        match p.param.extract(responses) {
            Some(value) if value == p.param.target => {
                p.state = ParamState::Done;
                Some(SyncReport::Corrected {
                    name: p.param.name,
                    from: p.seen.map(|v| p.param.physical(v)).unwrap_or_default(),
                    to: p.param.physical_target(),
                })
            }
            _ => {
                p.state = ParamState::Failed;
                self.logger.warn(&format!(
                    "{} is still not synchronized after set",
                    p.param.name
                ));
                Some(SyncReport::Mismatch { name: p.param.name })
            }
        }
    }
}
