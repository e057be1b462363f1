//! # Aeolus - Weather-Station Serial Gateway
//!
//! A long-running gateway between a serial-attached weather-station
//! controller and external observers. The controller emits a fixed-format
//! status bulletin roughly once per second and accepts short parenthesized
//! commands; Aeolus speaks that protocol, keeps a model of the station's
//! virtual instruments, reconciles their device-side parameters with the
//! configuration, and publishes live and historic measurements over MQTT.
//!
//! ## Features
//!
//! - **Full-duplex protocol engine**: unsolicited status stream multiplexed
//!   against request/response commands with retry and timeout
//! - **Instrument model**: ten virtual instruments plus the roof and aux
//!   relays, with per-period averaging and publish policies
//! - **Parameter sync**: startup reconciliation of calibration constants and
//!   thresholds stored in the device EEPROM
//! - **Scheduler**: watchdog keep-alive, clock reconciliation, time-of-day
//!   activity windows, historic pulls
//! - **Alarm scripts**: low supply voltage and relay transitions launch
//!   user-provided executables
//! - **Companion CLI**: transparent UDP access to the device protocol
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of
//! concerns:
//!
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing
//! - `protocol`: framing, bulletin decoding and the command vocabulary
//! - `serial`: byte transport with paced writes
//! - `engine`: in-flight command matching, timeout and retry
//! - `instruments`: the virtual instrument bank and alarms
//! - `sync`: device parameter reconciliation
//! - `scheduler`: periodic duty timing
//! - `tod`: time-of-day activity windows
//! - `rtc`: clock master selection and drift correction
//! - `scripts`: alarm script launching
//! - `publish`: MQTT and HTML sinks
//! - `udp`: companion CLI channel
//! - `gateway`: the event loop tying it all together

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod instruments;
pub mod logging;
pub mod protocol;
pub mod publish;
pub mod rtc;
pub mod scheduler;
pub mod scripts;
pub mod serial;
pub mod sync;
pub mod tod;
pub mod udp;

// Re-export commonly used types
pub use config::Config;
pub use error::{AeolusError, Result};
pub use gateway::Gateway;
