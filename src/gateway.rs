//! Gateway orchestrator
//!
//! Builds every component from the configuration and runs the single-thread
//! event loop: serial frames in, paced writes out, engine deadlines, the
//! one-second duty tick, companion datagrams and shutdown. Frames go first
//! to the in-flight commands; what no command claims is a status bulletin or
//! one of the few known unsolicited lines.

use crate::config::Config;
use crate::engine::{CommandEngine, CommandTag, EngineEvent};
use crate::error::{AeolusError, Result};
use crate::instruments::{aux_relay_reason, AlarmEvent, InstrumentBank, InstrumentSnapshot};
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::bulletin;
use crate::protocol::commands::{self, AuxRelayMode};
use crate::protocol::framer::DESYNC_LIMIT;
use crate::publish::{averages_payload, minmax_payload, HtmlPage, MqttPublisher};
use crate::rtc::{self, ClockMaster};
use crate::scheduler::{Duty, Scheduler, TICK};
use crate::scripts::{self, Notifier};
use crate::serial::{self, FrameReader, WriteQueue};
use crate::sync::{SyncEngine, SyncReport};
use crate::tod::{TodTimer, TodTransition};
use crate::udp::UdpChannel;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::{Duration, Instant};
use tokio_serial::SerialStream;

/// Photometer visual-magnitude read begins; serial output is held off
static PHOT_BEGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\d{2}:\d{2}:\d{2} wait\)").expect("phot begin pattern"));

/// Photometer visual-magnitude result; output resumes
static PHOT_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\d{2}:\d{2}:\d{2} mv:(\d{2}\.\d{2})\)").expect("phot end pattern"));

/// Thermopile I2C line: `(>100 +21.5)` infrared, `(>101 ...)` ambient
static THERMOPILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(>10([01]) ([+-]\d+\.\d+)\)").expect("thermopile pattern"));

enum Step {
    Frame(Vec<u8>),
    Write,
    Deadline,
    Tick,
    Datagram(Result<(String, SocketAddr)>),
    Shutdown,
}

/// The assembled daemon.
pub struct Gateway {
    config: Config,
    reader: FrameReader<ReadHalf<SerialStream>>,
    writer: WriteHalf<SerialStream>,
    queue: WriteQueue,
    engine: CommandEngine,
    instruments: InstrumentBank,
    sync: SyncEngine,
    scheduler: Scheduler,
    tod: TodTimer,
    notifier: Notifier,
    mqtt: MqttPublisher,
    html: Option<HtmlPage>,
    udp: UdpChannel,
    logger: StructuredLogger,
    last_snapshots: Vec<InstrumentSnapshot>,
    desync_count: u32,
    rtc_master: ClockMaster,
}

impl Gateway {
    /// Build every component; failures here map to the startup exit codes.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (reader, writer) = serial::open_split(&config.serial)?;
        let udp = UdpChannel::bind(&config.udp).await?;
        let mqtt = MqttPublisher::start(&config.mqtt);
        let instruments = InstrumentBank::from_config(&config.instruments, &config.aux_relay)?;
        let sync_params = instruments
            .parameters()
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(p, _)| p.clone())
            .collect();
        let sync = SyncEngine::new(sync_params);
        let tod = TodTimer::new(&config.tod)?;
        let notifier = Notifier::from_config(&config.scripts)?;
        let html = HtmlPage::from_config(&config.html);
        let scheduler = Scheduler::new(&config, Instant::now());
        let engine = CommandEngine::new(config.engine.max_inflight);

        let logger = get_logger("gateway");
        logger.info(&format!(
            "serial {} @ {} bps, channel {}",
            config.serial.port, config.serial.baud, config.mqtt.channel
        ));

        Ok(Self {
            config,
            reader,
            writer,
            queue: WriteQueue::new(),
            engine,
            instruments,
            sync,
            scheduler,
            tod,
            notifier,
            mqtt,
            html,
            udp,
            logger,
            last_snapshots: Vec::new(),
            desync_count: 0,
            rtc_master: ClockMaster::Host,
        })
    }

    /// Run until shutdown is requested or the serial link dies.
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("starting gateway main loop");

        self.mqtt.publish_register(self.instruments.parameters());
        if self.config.gateway.sync {
            self.sync.start(&mut self.engine, &mut self.queue);
        }

        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let step = {
                let now = Instant::now();
                let far = now + Duration::from_secs(3600);
                let write_at = self.queue.next_ready_at(now);
                let deadline = self.engine.next_deadline();
                let reader = &mut self.reader;
                let udp = &self.udp;

                tokio::select! {
                    frame = reader.next_frame() => Step::Frame(frame?),
                    _ = tokio::time::sleep_until(write_at.unwrap_or(far)),
                        if write_at.is_some() => Step::Write,
                    _ = tokio::time::sleep_until(deadline.unwrap_or(far)),
                        if deadline.is_some() => Step::Deadline,
                    _ = tick.tick() => Step::Tick,
                    datagram = udp.recv() => Step::Datagram(datagram),
                    _ = tokio::signal::ctrl_c() => Step::Shutdown,
                }
            };

            match step {
                Step::Frame(frame) => self.handle_frame(&frame).await,
                Step::Write => self.flush_write().await?,
                Step::Deadline => {
                    let events = self.engine.on_timeout(Instant::now(), &mut self.queue);
                    self.dispatch_engine_events(events).await;
                }
                Step::Tick => self.handle_tick().await,
                Step::Datagram(Ok((message, origin))) => self.handle_datagram(message, origin),
                Step::Datagram(Err(e)) => {
                    self.logger.error(&format!("datagram receive failed: {}", e));
                }
                Step::Shutdown => break,
            }
        }

        self.logger.info("shutdown signal received, stopping");
        Ok(())
    }

    async fn flush_write(&mut self) -> Result<()> {
        if let Some(line) = self.queue.pop_ready(Instant::now()) {
            self.logger
                .trace(&format!("Tx {}", String::from_utf8_lossy(&line)));
            self.writer
                .write_all(&line)
                .await
                .map_err(|e| AeolusError::serial(format!("serial write failed: {}", e)))?;
        }
        Ok(())
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        let (consumed, events) = self.engine.on_frame(frame, &mut self.queue);
        if consumed {
            if self.udp.multicast_enabled() {
                self.udp.replicate(frame).await;
            }
            self.dispatch_engine_events(events).await;
            return;
        }

        if bulletin::is_current_bulletin(frame) {
            match bulletin::decode_bulletin(frame) {
                Some((reading, _, _)) => {
                    self.desync_count = 0;
                    let alarms = self.instruments.update(&reading);
                    self.handle_alarms(alarms);
                    if self.udp.multicast_enabled() {
                        self.udp.replicate(frame).await;
                    }
                }
                None => self.note_desync(),
            }
            return;
        }

        let line = String::from_utf8_lossy(frame).into_owned();
        if PHOT_BEGIN.is_match(&line) {
            // The device cannot take input while integrating the reading
            self.queue.hold(true);
            return;
        }
        if let Some(caps) = PHOT_END.captures(&line) {
            self.queue.hold(false);
            if let Ok(mag) = caps[1].parse::<f64>() {
                self.instruments.update_visual_magnitude(mag);
            }
            return;
        }
        if let Some(caps) = THERMOPILE.captures(&line) {
            if let Ok(value) = caps[2].parse::<f64>() {
                self.instruments.update_thermopile(&caps[1] == "0", value);
            }
            return;
        }

        if frame.len() == bulletin::STATUS_LEN {
            // Status-sized but unrecognizable: the stream may be shifted
            self.note_desync();
            return;
        }
        self.logger.debug(&format!("unexpected message {}", line));
    }

    fn note_desync(&mut self) {
        self.desync_count += 1;
        if self.desync_count >= DESYNC_LIMIT {
            self.logger.error(&format!(
                "{} consecutive undecodable bulletins, realigning stream",
                self.desync_count
            ));
            self.mqtt
                .publish_event("ERROR", "protocol desync, stream realigned");
            self.reader.reset();
            self.desync_count = 0;
        }
    }

    fn handle_alarms(&mut self, alarms: Vec<AlarmEvent>) {
        for alarm in alarms {
            match alarm {
                AlarmEvent::LowVoltage {
                    average,
                    threshold,
                    samples,
                } => {
                    if self.notifier.on_low_voltage(average, threshold, samples) {
                        self.mqtt.publish_event(
                            "WARNING",
                            &format!(
                                "low voltage: average {:.2} V under {:.2} V over {} samples",
                                average, threshold, samples
                            ),
                        );
                    }
                }
                AlarmEvent::RoofRelaySwitch { open, reason } => {
                    self.notifier.on_roof_relay(open, reason);
                    self.mqtt.publish_event(
                        "WARNING",
                        &format!(
                            "roof relay {} (reason '{}')",
                            if open { "open" } else { "closed" },
                            reason
                        ),
                    );
                }
                AlarmEvent::AuxRelaySwitch { open, reason } => {
                    self.notifier.on_aux_relay(open, reason);
                    self.mqtt.publish_event(
                        "INFO",
                        &format!(
                            "aux relay {}: {}",
                            if open { "on" } else { "off" },
                            aux_relay_reason(reason)
                        ),
                    );
                }
            }
        }
    }

    async fn dispatch_engine_events(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            // Parameter reconciliation rides on its own tags
            if let Some(report) =
                self.sync
                    .on_event(&event, &mut self.engine, &mut self.queue)
            {
                self.handle_sync_report(report);
                continue;
            }

            match event {
                EngineEvent::Partial { tag, ref line, .. } => {
                    if let CommandTag::External(origin) = tag {
                        self.udp.send_to(line, origin).await;
                    }
                }
                EngineEvent::Done {
                    tag,
                    ref responses,
                    ref raw,
                    ..
                } => match tag {
                    CommandTag::WatchdogPing => {
                        self.logger.debug("watchdog keep-alive acknowledged");
                    }
                    CommandTag::RtcGet => self.on_rtc_read(responses),
                    CommandTag::RtcSet => self.on_rtc_written(responses),
                    CommandTag::HistoricMinmax => {
                        self.mqtt.publish_minmax(minmax_payload(raw));
                        self.logger.info("published daily min/max dump");
                    }
                    CommandTag::HistoricAverages => {
                        self.mqtt
                            .publish_averages(averages_payload(raw, Utc::now()));
                        self.logger.info("published 5-minute averages dump");
                    }
                    CommandTag::AuxWindowOn => self.logger.info("aux relay asserted on"),
                    CommandTag::AuxWindowOff => self.logger.info("aux relay deasserted"),
                    _ => {}
                },
                EngineEvent::Failed { tag, name, .. } => match tag {
                    CommandTag::WatchdogPing => {
                        self.logger.warn("watchdog keep-alive went unanswered");
                    }
                    CommandTag::RtcGet | CommandTag::RtcSet => {
                        self.logger.warn("device clock unreachable, drift unknown");
                    }
                    CommandTag::HistoricMinmax | CommandTag::HistoricAverages => {
                        self.logger.warn(&format!("historic pull failed: {}", name));
                        self.mqtt
                            .publish_event("WARNING", &format!("historic pull failed: {}", name));
                    }
                    _ => {
                        self.logger.warn(&format!("command failed: {}", name));
                    }
                },
            }
        }
    }

    fn handle_sync_report(&mut self, report: SyncReport) {
        match report {
            SyncReport::InSync { .. } => {}
            SyncReport::Corrected { name, from, to } => {
                self.mqtt.publish_event(
                    "INFO",
                    &format!("parameter {} corrected from {} to {}", name, from, to),
                );
            }
            SyncReport::Mismatch { name } => {
                self.mqtt.publish_event(
                    "WARNING",
                    &format!("parameter {} still differs after set", name),
                );
            }
            SyncReport::Unreachable { name } => {
                self.mqtt.publish_event(
                    "WARNING",
                    &format!("parameter {} sync went unanswered", name),
                );
            }
        }
        if self.sync.is_done() && self.sync.failures() > 0 {
            self.logger.warn(&format!(
                "parameter sync finished with {} failures, continuing degraded",
                self.sync.failures()
            ));
        }
    }

    fn on_rtc_read(&mut self, responses: &[String]) {
        let Some(line) = responses.first() else {
            return;
        };
        let device = match commands::parse_device_time(line) {
            Ok(t) => t,
            Err(e) => {
                self.logger.warn(&format!("{}", e));
                return;
            }
        };
        let host = Utc::now().naive_utc();
        let drift = rtc::drift_seconds(device, host);
        let max_drift = self.config.rtc.max_drift as i64;

        if drift <= max_drift {
            self.logger
                .info(&format!("no need to sync clocks, drift {} s", drift));
            return;
        }
        match self.rtc_master {
            ClockMaster::Host => {
                self.logger.warn(&format!(
                    "device clock off by {} s, setting from host",
                    drift
                ));
                // Half a second forward to cover the paced transmit
                let target = Utc::now().naive_utc() + chrono::Duration::milliseconds(500);
                self.engine.submit(
                    commands::rtc_set(target),
                    CommandTag::RtcSet,
                    &mut self.queue,
                );
            }
            ClockMaster::Device => {
                self.logger.warn(&format!(
                    "host clock off by {} s and not authoritative, setting from device",
                    drift
                ));
                rtc::set_host_clock(device);
            }
        }
    }

    fn on_rtc_written(&mut self, responses: &[String]) {
        let Some(line) = responses.first() else {
            return;
        };
        match commands::parse_device_time(line) {
            Ok(device) => {
                let drift = rtc::drift_seconds(device, Utc::now().naive_utc());
                if drift <= self.config.rtc.max_drift as i64 {
                    self.logger.info("device clock synchronized");
                } else {
                    self.logger
                        .warn(&format!("device clock still off by {} s after set", drift));
                }
            }
            Err(e) => self.logger.warn(&format!("{}", e)),
        }
    }

    async fn handle_tick(&mut self) {
        self.notifier.reap();
        let duties = self.scheduler.due(Instant::now());
        for duty in duties {
            match duty {
                Duty::Upload => {
                    self.last_snapshots = self.instruments.snapshot();
                    self.mqtt.publish_state(&self.last_snapshots);
                }
                Duty::WatchdogPing => {
                    if self.engine.has_tag(CommandTag::WatchdogPing) {
                        self.logger.debug("previous keep-alive still pending, skipping");
                    } else {
                        self.engine.submit(
                            commands::watchdog_ping(),
                            CommandTag::WatchdogPing,
                            &mut self.queue,
                        );
                    }
                }
                Duty::RtcCheck => self.start_rtc_check().await,
                Duty::TodEvaluate => self.evaluate_tod(),
                Duty::DailySync => {
                    if self.config.gateway.sync {
                        self.sync.restart_failed(&mut self.engine, &mut self.queue);
                    }
                }
                Duty::HtmlRender => {
                    if let Some(page) = &self.html {
                        if let Err(e) = page.render(&self.last_snapshots) {
                            self.logger.error(&format!("page render failed: {}", e));
                        }
                    }
                }
            }
        }
    }

    async fn start_rtc_check(&mut self) {
        if self.engine.has_tag(CommandTag::RtcGet) || self.engine.has_tag(CommandTag::RtcSet) {
            self.logger.debug("previous clock check still pending, skipping");
            return;
        }
        let internet = if self.config.gateway.host_rtc {
            false
        } else {
            rtc::internet_reachable(&self.config.probe).await
        };
        self.rtc_master = rtc::select_master(self.config.gateway.host_rtc, internet);
        self.logger.debug(&format!(
            "clock check, master is {:?}",
            self.rtc_master
        ));
        self.engine
            .submit(commands::rtc_get(), CommandTag::RtcGet, &mut self.queue);
    }

    fn evaluate_tod(&mut self) {
        let Some(transition) = self.tod.evaluate(Utc::now().time()) else {
            return;
        };
        match transition {
            TodTransition::Entered {
                index,
                shutdown_minute,
            } => {
                self.logger.info(&format!(
                    "entered activity window {}",
                    self.tod
                        .intervals()
                        .get(index)
                        .map(|w| w.to_string())
                        .unwrap_or_default()
                ));
                self.mqtt.publish_event("INFO", "activity window entered");

                if self.instruments.aux_relay.mode == AuxRelayMode::Timed {
                    self.engine.submit(
                        commands::aux_force_open(),
                        CommandTag::AuxWindowOn,
                        &mut self.queue,
                    );
                }
                if !self.engine.has_tag(CommandTag::HistoricMinmax) {
                    self.engine.submit(
                        commands::minmax_dump(),
                        CommandTag::HistoricMinmax,
                        &mut self.queue,
                    );
                }
                if !self.engine.has_tag(CommandTag::HistoricAverages) {
                    self.engine.submit(
                        commands::averages_dump(),
                        CommandTag::HistoricAverages,
                        &mut self.queue,
                    );
                }
                if let Some(minute) = shutdown_minute {
                    scripts::spawn_host_shutdown(&commands::wire_to_hhmm(
                        (minute / 60 * 100 + minute % 60) as i64,
                    ));
                }
            }
            TodTransition::Left {
                index,
                shutdown_minute,
            } => {
                self.logger.info(&format!(
                    "left activity window {}",
                    self.tod
                        .intervals()
                        .get(index)
                        .map(|w| w.to_string())
                        .unwrap_or_default()
                ));
                self.mqtt.publish_event("INFO", "activity window left");

                if self.instruments.aux_relay.mode == AuxRelayMode::Timed {
                    self.engine.submit(
                        commands::aux_force_close(),
                        CommandTag::AuxWindowOff,
                        &mut self.queue,
                    );
                }
                if let Some(minute) = shutdown_minute {
                    scripts::spawn_host_shutdown(&commands::wire_to_hhmm(
                        (minute / 60 * 100 + minute % 60) as i64,
                    ));
                }
            }
        }
    }

    fn handle_datagram(&mut self, message: String, origin: SocketAddr) {
        if message.is_empty() {
            return;
        }
        match commands::match_external(&message) {
            Some(spec) => {
                self.logger
                    .info(&format!("external command {} from {}", spec.name, origin));
                self.engine
                    .submit(spec, CommandTag::External(origin), &mut self.queue);
            }
            None => {
                // Transparent pass-through for anything we do not track
                self.logger
                    .debug(&format!("forwarding raw payload from {}", origin));
                self.queue.enqueue(message.into_bytes());
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
