//! Virtual instruments
//!
//! Each instrument bundles the current values it reads from the status
//! vector, running accumulators for the upload-period averages, its device
//! parameters and a publish policy. The roof and aux relays ride along with
//! transition detection; the voltmeter additionally keeps a short sliding
//! average that raises the low-voltage alarm.

use crate::config::{AuxRelayConfig, InstrumentsConfig, PublishConfig};
use crate::error::Result;
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::bulletin::{magnitude, Reading};
use crate::protocol::commands::{self, AuxRelayMode, Parameter};
use serde::Serialize;
use std::collections::VecDeque;

/// Where and what an instrument publishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishPolicy {
    pub mqtt: bool,
    pub html: bool,
    pub current: bool,
    pub average: bool,
}

impl PublishPolicy {
    pub fn from_config(cfg: &PublishConfig) -> Self {
        Self {
            mqtt: cfg.sinks.iter().any(|s| s == "mqtt"),
            html: cfg.sinks.iter().any(|s| s == "html"),
            current: cfg.what.iter().any(|s| s == "current"),
            average: cfg.what.iter().any(|s| s == "average"),
        }
    }
}

/// Sum/count pair for one upload period
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    sum: f64,
    count: u32,
}

impl Accumulator {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Average over the period, or missing when nothing accumulated
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    /// Take the average and reset in one step
    pub fn drain(&mut self) -> Option<f64> {
        let avg = self.average();
        self.sum = 0.0;
        self.count = 0;
        avg
    }
}

/// One measured channel with its accumulator
#[derive(Debug, Clone, Default)]
struct Channel {
    current: Option<f64>,
    accum: Accumulator,
}

impl Channel {
    fn update(&mut self, value: Option<f64>) {
        self.current = value;
        if let Some(v) = value {
            self.accum.add(v);
        }
    }

    fn snapshot(&mut self, name: &'static str, unit: &'static str) -> ChannelSnapshot {
        ChannelSnapshot {
            name,
            unit,
            current: self.current,
            average: self.accum.drain(),
        }
    }
}

/// One channel of a snapshot payload
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub name: &'static str,
    pub unit: &'static str,
    pub current: Option<f64>,
    pub average: Option<f64>,
}

/// One instrument's contribution to a snapshot payload
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSnapshot {
    pub instrument: &'static str,
    #[serde(skip)]
    pub policy: PublishPolicy,
    pub channels: Vec<ChannelSnapshot>,
}

/// Alarm conditions surfaced to the script launcher and event topic
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmEvent {
    /// Sliding-average supply voltage under the configured floor
    LowVoltage {
        average: f64,
        threshold: f64,
        samples: usize,
    },
    /// Roof relay changed state; reason is the bulletin state character
    RoofRelaySwitch { open: bool, reason: char },
    /// Aux relay changed state; reason is the bulletin state character
    AuxRelaySwitch { open: bool, reason: char },
}

/// Human-readable explanations for aux relay state characters
pub fn aux_relay_reason(c: char) -> &'static str {
    match c {
        'A' => "automatic switch off (heaters off)",
        'a' => "manual or timed mode switch off",
        '!' => "automatic switch off by humidity sensor read error",
        'E' => "automatic switch on (heaters on)",
        'e' => "manual or timed switch on",
        _ => "unknown",
    }
}

// ---------------------------------------------------------------------------
// Concrete instruments
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Voltmeter {
    policy: PublishPolicy,
    voltage: Channel,
    window: VecDeque<f64>,
    window_len: usize,
    low_threshold: f64,
}

impl Voltmeter {
    fn update(&mut self, v: &Reading) -> Option<AlarmEvent> {
        self.voltage.update(v.voltage);
        let sample = v.voltage?;
        if self.window.len() == self.window_len {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        if self.window.len() < self.window_len {
            return None;
        }
        let average = self.window.iter().sum::<f64>() / self.window.len() as f64;
        if average < self.low_threshold {
            return Some(AlarmEvent::LowVoltage {
                average,
                threshold: self.low_threshold,
                samples: self.window.len(),
            });
        }
        None
    }

    /// Accumulated sample count in the current upload period
    pub fn accumulated(&self) -> u32 {
        self.voltage.accum.count()
    }
}

#[derive(Debug, Default)]
struct Barometer {
    policy: PublishPolicy,
    absolute: Channel,
    calibrated: Channel,
}

#[derive(Debug, Default)]
struct RainDetector {
    policy: PublishPolicy,
    probability: Channel,
}

#[derive(Debug, Default)]
struct CloudSensor {
    policy: PublishPolicy,
    level: Channel,
}

#[derive(Debug, Default)]
struct Pyranometer {
    policy: PublishPolicy,
    irradiation: Channel,
}

#[derive(Debug, Default)]
struct Photometer {
    policy: PublishPolicy,
    frequency: Channel,
    visual_magnitude: Channel,
}

#[derive(Debug, Default)]
struct Thermometer {
    policy: PublishPolicy,
    temperature: Channel,
    humidity: Channel,
    dew_point: Channel,
}

#[derive(Debug, Default)]
struct Anemometer {
    policy: PublishPolicy,
    speed: Channel,
    average10: Channel,
    direction: Channel,
}

#[derive(Debug, Default)]
struct Pluviometer {
    policy: PublishPolicy,
    level: Channel,
    // Device-side counter with an opaque epoch; published as-is
    accumulated: Option<u32>,
}

#[derive(Debug, Default)]
struct Thermopile {
    policy: PublishPolicy,
    infrared: Channel,
    ambient: Channel,
}

// ---------------------------------------------------------------------------
// Relays
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RoofRelay {
    policy: PublishPolicy,
    open: Channel,
    last_open: Option<bool>,
}

impl RoofRelay {
    fn update(&mut self, v: &Reading) -> Option<AlarmEvent> {
        let open = v.roof_relay != 'C';
        self.open.update(Some(if open { 1.0 } else { 0.0 }));
        let transition = match self.last_open {
            Some(prev) => prev != open,
            None => false,
        };
        self.last_open = Some(open);
        if transition {
            Some(AlarmEvent::RoofRelaySwitch {
                open,
                reason: v.roof_relay,
            })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct AuxRelay {
    policy: PublishPolicy,
    pub mode: AuxRelayMode,
    open: Channel,
    last_open: Option<bool>,
}

impl AuxRelay {
    fn update(&mut self, v: &Reading) -> Option<AlarmEvent> {
        let open = v.aux_relay == 'E' || v.aux_relay == 'e';
        self.open.update(Some(if open { 1.0 } else { 0.0 }));
        let transition = match self.last_open {
            Some(prev) => prev != open,
            None => false,
        };
        self.last_open = Some(open);
        if transition {
            Some(AlarmEvent::AuxRelaySwitch {
                open,
                reason: v.aux_relay,
            })
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// The bank
// ---------------------------------------------------------------------------

/// All instruments plus the relays, updated from every decoded bulletin and
/// snapshotted at each upload-period boundary.
pub struct InstrumentBank {
    pub voltmeter: Voltmeter,
    barometer: Barometer,
    rain: RainDetector,
    cloud: CloudSensor,
    pyranometer: Pyranometer,
    photometer: Photometer,
    thermometer: Thermometer,
    anemometer: Anemometer,
    pluviometer: Pluviometer,
    thermopile: Thermopile,
    pub roof_relay: RoofRelay,
    pub aux_relay: AuxRelay,
    parameters: Vec<(Parameter, bool)>,
    logger: StructuredLogger,
}

impl InstrumentBank {
    pub fn from_config(cfg: &InstrumentsConfig, aux: &AuxRelayConfig) -> Result<Self> {
        let aux_mode = AuxRelayMode::from_config(&aux.mode)?;

        let mut parameters: Vec<(Parameter, bool)> = vec![
            (
                commands::voltmeter_threshold(cfg.voltmeter.threshold),
                cfg.voltmeter.sync,
            ),
            (
                commands::voltmeter_offset(cfg.voltmeter.offset),
                cfg.voltmeter.sync,
            ),
            (
                commands::anemometer_threshold(cfg.anemometer.threshold),
                cfg.anemometer.sync,
            ),
            (
                commands::anemometer_average_threshold(cfg.anemometer.ave_threshold),
                cfg.anemometer.sync,
            ),
            (
                commands::anemometer_calibration(cfg.anemometer.calibration),
                cfg.anemometer.sync,
            ),
            (
                commands::anemometer_model(&cfg.anemometer.model)?,
                cfg.anemometer.sync,
            ),
            (
                commands::barometer_height(cfg.barometer.height),
                cfg.barometer.sync,
            ),
            (
                commands::barometer_offset(cfg.barometer.offset),
                cfg.barometer.sync,
            ),
            (
                commands::cloud_threshold(cfg.cloud_sensor.threshold),
                cfg.cloud_sensor.sync,
            ),
            (
                commands::cloud_gain(cfg.cloud_sensor.gain),
                cfg.cloud_sensor.sync,
            ),
            (
                commands::photometer_threshold(cfg.photometer.threshold),
                cfg.photometer.sync,
            ),
            (
                commands::photometer_offset(cfg.photometer.offset),
                cfg.photometer.sync,
            ),
            (
                commands::pluviometer_calibration(cfg.pluviometer.calibration),
                cfg.pluviometer.sync,
            ),
            (
                commands::pyranometer_gain(cfg.pyranometer.gain),
                cfg.pyranometer.sync,
            ),
            (
                commands::pyranometer_offset(cfg.pyranometer.offset),
                cfg.pyranometer.sync,
            ),
            (
                commands::rain_threshold(cfg.rain_sensor.threshold),
                cfg.rain_sensor.sync,
            ),
            (
                commands::thermometer_delta_threshold(
                    cfg.thermometer.delta_threshold.round() as i64,
                ),
                cfg.thermometer.sync,
            ),
            (
                commands::watchdog_period(cfg.watchdog.period),
                cfg.watchdog.sync,
            ),
            (commands::aux_relay_mode(aux_mode), aux.sync),
        ];
        parameters.push((commands::aux_switch_on_time(&aux.on)?, aux.sync));
        parameters.push((commands::aux_switch_off_time(&aux.off)?, aux.sync));

        Ok(Self {
            voltmeter: Voltmeter {
                policy: PublishPolicy::from_config(&cfg.voltmeter.publish),
                voltage: Channel::default(),
                window: VecDeque::new(),
                window_len: cfg.voltmeter.time.max(1) as usize,
                low_threshold: cfg.voltmeter.threshold + cfg.voltmeter.delta,
            },
            barometer: Barometer {
                policy: PublishPolicy::from_config(&cfg.barometer.publish),
                ..Default::default()
            },
            rain: RainDetector {
                policy: PublishPolicy::from_config(&cfg.rain_sensor.publish),
                ..Default::default()
            },
            cloud: CloudSensor {
                policy: PublishPolicy::from_config(&cfg.cloud_sensor.publish),
                ..Default::default()
            },
            pyranometer: Pyranometer {
                policy: PublishPolicy::from_config(&cfg.pyranometer.publish),
                ..Default::default()
            },
            photometer: Photometer {
                policy: PublishPolicy::from_config(&cfg.photometer.publish),
                ..Default::default()
            },
            thermometer: Thermometer {
                policy: PublishPolicy::from_config(&cfg.thermometer.publish),
                ..Default::default()
            },
            anemometer: Anemometer {
                policy: PublishPolicy::from_config(&cfg.anemometer.publish),
                ..Default::default()
            },
            pluviometer: Pluviometer {
                policy: PublishPolicy::from_config(&cfg.pluviometer.publish),
                ..Default::default()
            },
            thermopile: Thermopile {
                policy: PublishPolicy::from_config(&cfg.thermopile.publish),
                ..Default::default()
            },
            roof_relay: RoofRelay {
                policy: PublishPolicy::from_config(&cfg.roof_relay.publish),
                open: Channel::default(),
                last_open: None,
            },
            aux_relay: AuxRelay {
                policy: PublishPolicy::from_config(&aux.publish),
                mode: aux_mode,
                open: Channel::default(),
                last_open: None,
            },
            parameters,
            logger: get_logger("instruments"),
        })
    }

    /// Feed one decoded reading vector to every instrument.
    pub fn update(&mut self, v: &Reading) -> Vec<AlarmEvent> {
        let mut events = Vec::new();

        if let Some(e) = self.voltmeter.update(v) {
            events.push(e);
        }
        self.barometer.absolute.update(v.abs_pressure);
        self.barometer.calibrated.update(v.cal_pressure);
        self.rain.probability.update(v.rain_probability);
        self.cloud.level.update(v.cloud_level);
        self.pyranometer.irradiation.update(v.pyranometer);
        self.photometer.frequency.update(v.photometer_frequency);
        if let Some(freq) = v.photometer_frequency {
            self.photometer
                .visual_magnitude
                .update(Some(magnitude(freq)));
        }
        self.thermometer.temperature.update(v.ambient_temperature);
        self.thermometer.humidity.update(v.humidity);
        self.thermometer.dew_point.update(v.dew_point);
        self.anemometer.speed.update(v.wind_speed);
        self.anemometer
            .average10
            .update(v.wind_speed_average.map(f64::from));
        self.anemometer
            .direction
            .update(v.wind_direction.map(f64::from));
        self.pluviometer.level.update(v.pluviometer_level);
        if v.pluviometer_accumulated.is_some() {
            self.pluviometer.accumulated = v.pluviometer_accumulated;
        }

        if let Some(e) = self.roof_relay.update(v) {
            self.logger.warn(&format!("roof relay switch: {:?}", e));
            events.push(e);
        }
        if let Some(e) = self.aux_relay.update(v) {
            self.logger.warn(&format!("aux relay switch: {:?}", e));
            events.push(e);
        }

        events
    }

    /// Feed an unsolicited thermopile line (infrared or ambient value).
    pub fn update_thermopile(&mut self, infrared: bool, value: f64) {
        if infrared {
            self.thermopile.infrared.update(Some(value));
        } else {
            self.thermopile.ambient.update(Some(value));
        }
    }

    /// Feed a photometer visual-magnitude reading from its own message.
    pub fn update_visual_magnitude(&mut self, mag: f64) {
        self.photometer.visual_magnitude.update(Some(mag));
    }

    /// Emit (current, average) for every instrument and reset accumulators.
    pub fn snapshot(&mut self) -> Vec<InstrumentSnapshot> {
        let mut out = Vec::with_capacity(12);

        out.push(InstrumentSnapshot {
            instrument: "voltmeter",
            policy: self.voltmeter.policy,
            channels: vec![self.voltmeter.voltage.snapshot("voltage", "V")],
        });
        out.push(InstrumentSnapshot {
            instrument: "barometer",
            policy: self.barometer.policy,
            channels: vec![
                self.barometer.absolute.snapshot("abs_pressure", "HPa"),
                self.barometer.calibrated.snapshot("cal_pressure", "HPa"),
            ],
        });
        out.push(InstrumentSnapshot {
            instrument: "rain",
            policy: self.rain.policy,
            channels: vec![self.rain.probability.snapshot("rain", "%")],
        });
        out.push(InstrumentSnapshot {
            instrument: "cloud",
            policy: self.cloud.policy,
            channels: vec![self.cloud.level.snapshot("cloud", "%")],
        });
        out.push(InstrumentSnapshot {
            instrument: "pyranometer",
            policy: self.pyranometer.policy,
            channels: vec![self.pyranometer.irradiation.snapshot("irradiation", "%")],
        });
        out.push(InstrumentSnapshot {
            instrument: "photometer",
            policy: self.photometer.policy,
            channels: vec![
                self.photometer.frequency.snapshot("frequency", "Hz"),
                self.photometer
                    .visual_magnitude
                    .snapshot("magnitude", "Mv/arcsec^2"),
            ],
        });
        out.push(InstrumentSnapshot {
            instrument: "thermometer",
            policy: self.thermometer.policy,
            channels: vec![
                self.thermometer.temperature.snapshot("temperature", "deg C"),
                self.thermometer.humidity.snapshot("humidity", "%"),
                self.thermometer.dew_point.snapshot("dew_point", "deg C"),
            ],
        });
        out.push(InstrumentSnapshot {
            instrument: "anemometer",
            policy: self.anemometer.policy,
            channels: vec![
                self.anemometer.speed.snapshot("wind_speed", "Km/h"),
                self.anemometer.average10.snapshot("wind_speed_10m", "Km/h"),
                self.anemometer.direction.snapshot("wind_direction", "deg"),
            ],
        });
        let mut pluvio_channels = vec![self.pluviometer.level.snapshot("level", "mm")];
        pluvio_channels.push(ChannelSnapshot {
            name: "accumulated",
            unit: "mm",
            current: self.pluviometer.accumulated.map(f64::from),
            average: None,
        });
        out.push(InstrumentSnapshot {
            instrument: "pluviometer",
            policy: self.pluviometer.policy,
            channels: pluvio_channels,
        });
        out.push(InstrumentSnapshot {
            instrument: "thermopile",
            policy: self.thermopile.policy,
            channels: vec![
                self.thermopile.infrared.snapshot("infrared", "deg C"),
                self.thermopile.ambient.snapshot("ambient", "deg C"),
            ],
        });
        out.push(InstrumentSnapshot {
            instrument: "roof_relay",
            policy: self.roof_relay.policy,
            channels: vec![self.roof_relay.open.snapshot("open", "")],
        });
        out.push(InstrumentSnapshot {
            instrument: "aux_relay",
            policy: self.aux_relay.policy,
            channels: vec![self.aux_relay.open.snapshot("open", "")],
        });

        out
    }

    /// Device parameters with their per-instrument sync enables.
    pub fn parameters(&self) -> &[(Parameter, bool)] {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuxRelayConfig, InstrumentsConfig};

    fn reading(volts: f64, roof: char, aux: char) -> Reading {
        Reading {
            roof_relay: roof,
            aux_relay: aux,
            voltage: Some(volts),
            rain_probability: Some(3.5),
            cloud_level: Some(42.0),
            abs_pressure: Some(935.5),
            cal_pressure: Some(921.2),
            pluviometer_level: Some(0.0),
            pluviometer_accumulated: Some(124),
            pyranometer: Some(6.0),
            photometer_frequency: Some(4000.0),
            ambient_temperature: Some(18.2),
            humidity: Some(55.0),
            dew_point: Some(9.7),
            wind_speed: Some(6.5),
            wind_speed_average: Some(12),
            wind_direction: Some(270),
        }
    }

    fn bank() -> InstrumentBank {
        InstrumentBank::from_config(&InstrumentsConfig::default(), &AuxRelayConfig::default())
            .unwrap()
    }

    #[test]
    fn test_accumulators_count_every_reading() {
        let mut bank = bank();
        for _ in 0..20 {
            bank.update(&reading(12.5, 'C', 'e'));
        }
        assert_eq!(bank.voltmeter.accumulated(), 20);
        let snaps = bank.snapshot();
        let volt = snaps.iter().find(|s| s.instrument == "voltmeter").unwrap();
        assert_eq!(volt.channels[0].average, Some(12.5));
        // Snapshot resets the period
        assert_eq!(bank.voltmeter.accumulated(), 0);
    }

    #[test]
    fn test_low_voltage_needs_full_window() {
        let mut bank = bank();
        // Default window is 30 samples at threshold 11.8 + 0.2
        let mut alarms = Vec::new();
        for _ in 0..30 {
            alarms.extend(bank.update(&reading(11.8, 'C', 'e')));
        }
        let low: Vec<_> = alarms
            .iter()
            .filter(|e| matches!(e, AlarmEvent::LowVoltage { .. }))
            .collect();
        assert_eq!(low.len(), 1);
        match low[0] {
            AlarmEvent::LowVoltage {
                average,
                threshold,
                samples,
            } => {
                assert!((average - 11.8).abs() < 1e-6);
                assert!((threshold - 12.0).abs() < 1e-6);
                assert_eq!(*samples, 30);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_healthy_voltage_never_alarms() {
        let mut bank = bank();
        for _ in 0..100 {
            let events = bank.update(&reading(12.8, 'C', 'e'));
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_roof_relay_transition() {
        let mut bank = bank();
        assert!(bank.update(&reading(12.8, 'C', 'e')).is_empty());
        let events = bank.update(&reading(12.8, 'A', 'e'));
        assert_eq!(
            events,
            vec![AlarmEvent::RoofRelaySwitch {
                open: true,
                reason: 'A'
            }]
        );
        // Steady state produces nothing further
        assert!(bank.update(&reading(12.8, 'A', 'e')).is_empty());
        let events = bank.update(&reading(12.8, 'C', 'e'));
        assert_eq!(
            events,
            vec![AlarmEvent::RoofRelaySwitch {
                open: false,
                reason: 'C'
            }]
        );
    }

    #[test]
    fn test_aux_relay_transition() {
        let mut bank = bank();
        bank.update(&reading(12.8, 'C', 'a'));
        let events = bank.update(&reading(12.8, 'C', 'e'));
        assert_eq!(
            events,
            vec![AlarmEvent::AuxRelaySwitch {
                open: true,
                reason: 'e'
            }]
        );
    }

    #[test]
    fn test_missing_fields_skip_accumulation() {
        let mut bank = bank();
        let mut v = reading(12.8, 'C', 'e');
        v.humidity = None;
        bank.update(&v);
        let snaps = bank.snapshot();
        let thermo = snaps.iter().find(|s| s.instrument == "thermometer").unwrap();
        let hum = thermo.channels.iter().find(|c| c.name == "humidity").unwrap();
        assert_eq!(hum.current, None);
        assert_eq!(hum.average, None);
    }

    #[test]
    fn test_parameter_inventory_complete() {
        let bank = bank();
        assert_eq!(bank.parameters().len(), 21);
    }
}
