//! External notification scripts
//!
//! Alarm conditions launch user-provided executables in the background. Each
//! binding carries a launch mode: Never disables it, Once fires a single
//! time per process lifetime, Many fires again only after the previous child
//! has exited. Exit status is logged and nothing else.

use crate::config::{ScriptEntry, ScriptsConfig};
use crate::error::{AeolusError, Result};
use crate::logging::{get_logger, StructuredLogger};
use std::path::PathBuf;
use tokio::process::{Child, Command};

/// Launch policy for one script binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    Never,
    Once,
    Many,
}

impl ScriptMode {
    pub fn from_config(mode: Option<&str>) -> Result<Self> {
        match mode {
            Some("Never") => Ok(ScriptMode::Never),
            Some("Once") => Ok(ScriptMode::Once),
            Some("Many") => Ok(ScriptMode::Many),
            Some(other) => Err(AeolusError::validation(
                "scripts.mode".to_string(),
                format!("unknown mode '{}'", other),
            )),
            None => Err(AeolusError::validation(
                "scripts.mode",
                "a script binding requires an explicit mode",
            )),
        }
    }
}

/// One executable with its launch bookkeeping
pub struct Script {
    path: PathBuf,
    name: String,
    mode: ScriptMode,
    executed: bool,
    child: Option<Child>,
    logger: StructuredLogger,
}

impl Script {
    /// Build from a config entry; an empty path disables the binding.
    pub fn from_entry(entry: &ScriptEntry) -> Result<Option<Self>> {
        if entry.path.is_empty() {
            return Ok(None);
        }
        let mode = ScriptMode::from_config(entry.mode.as_deref())?;
        let path = PathBuf::from(&entry.path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.path.clone());
        Ok(Some(Self {
            path,
            name,
            mode,
            executed: false,
            child: None,
            logger: get_logger("scripts"),
        }))
    }

    pub fn mode(&self) -> ScriptMode {
        self.mode
    }

    /// Launch according to the mode. Returns whether a child was spawned.
    pub fn run(&mut self, args: &[String]) -> bool {
        match self.mode {
            ScriptMode::Never => false,
            ScriptMode::Once => {
                if self.executed {
                    return false;
                }
                if self.spawn(args) {
                    self.executed = true;
                    true
                } else {
                    false
                }
            }
            ScriptMode::Many => {
                if self.child_alive() {
                    self.logger.warn(&format!(
                        "script {} has not finished, not launching it again",
                        self.name
                    ));
                    return false;
                }
                self.spawn(args)
            }
        }
    }

    fn child_alive(&mut self) -> bool {
        match self.child.as_mut() {
            None => false,
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    self.logger
                        .info(&format!("script {} exited with {}", self.name, status));
                    self.child = None;
                    false
                }
                Err(e) => {
                    self.logger
                        .error(&format!("script {} wait failed: {}", self.name, e));
                    self.child = None;
                    false
                }
            },
        }
    }

    fn spawn(&mut self, args: &[String]) -> bool {
        match Command::new(&self.path).args(args).spawn() {
            Ok(child) => {
                self.logger
                    .warn(&format!("executed script {} {}", self.name, args.join(" ")));
                self.child = Some(child);
                true
            }
            Err(e) => {
                self.logger
                    .error(&format!("could not launch {}: {}", self.name, e));
                false
            }
        }
    }

    /// Collect and log a finished child, if any.
    pub fn reap(&mut self) {
        let _ = self.child_alive();
    }
}

/// Routes alarm events to their configured scripts.
pub struct Notifier {
    roof_relay: Option<Script>,
    aux_relay: Option<Script>,
    low_voltage: Option<Script>,
}

impl Notifier {
    pub fn from_config(cfg: &ScriptsConfig) -> Result<Self> {
        Ok(Self {
            roof_relay: Script::from_entry(&cfg.roof_relay)?,
            aux_relay: Script::from_entry(&cfg.aux_relay)?,
            low_voltage: Script::from_entry(&cfg.low_voltage)?,
        })
    }

    /// Low supply voltage: `-v <avg> -t <threshold> -s <samples>`
    pub fn on_low_voltage(&mut self, average: f64, threshold: f64, samples: usize) -> bool {
        let Some(script) = self.low_voltage.as_mut() else {
            return false;
        };
        let args = vec![
            "-v".to_string(),
            format!("{:.2}", average),
            "-t".to_string(),
            format!("{:.2}", threshold),
            "-s".to_string(),
            samples.to_string(),
        ];
        script.run(&args)
    }

    /// Roof relay transition: `--status ON|OFF --reason <code>`
    pub fn on_roof_relay(&mut self, open: bool, reason: char) -> bool {
        let Some(script) = self.roof_relay.as_mut() else {
            return false;
        };
        let args = relay_args(open, reason);
        script.run(&args)
    }

    /// Aux relay transition: `--status ON|OFF --reason <code>`
    pub fn on_aux_relay(&mut self, open: bool, reason: char) -> bool {
        let Some(script) = self.aux_relay.as_mut() else {
            return false;
        };
        let args = relay_args(open, reason);
        script.run(&args)
    }

    /// Collect any finished children so exit codes get logged.
    pub fn reap(&mut self) {
        for script in [
            self.roof_relay.as_mut(),
            self.aux_relay.as_mut(),
            self.low_voltage.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            script.reap();
        }
    }
}

fn relay_args(open: bool, reason: char) -> Vec<String> {
    vec![
        "--status".to_string(),
        if open { "ON" } else { "OFF" }.to_string(),
        "--reason".to_string(),
        reason.to_string(),
    ]
}

/// Program a host shutdown at the given `HH:MM` UTC wall time.
///
/// The child is detached; its outcome is only logged.
pub fn spawn_host_shutdown(hhmm: &str) {
    let logger = get_logger("scripts");
    match Command::new("sudo").args(["shutdown", "-h", hhmm]).spawn() {
        Ok(_) => logger.warn(&format!("programmed host shutdown at {}", hhmm)),
        Err(e) => logger.error(&format!("could not program shutdown: {}", e)),
    }
}
