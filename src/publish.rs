//! Broker and HTML publishers
//!
//! Plain sinks for the reading snapshots and historic payloads. Every broker
//! payload is JSON carrying `rev`, `who` and a UTC `tstamp` besides its
//! domain fields. While the broker is unreachable publishes are dropped, not
//! queued.

use crate::config::{HtmlConfig, MqttConfig};
use crate::error::Result;
use crate::instruments::InstrumentSnapshot;
use crate::logging::{get_logger, StructuredLogger};
use crate::protocol::bulletin::{decode_bulletin, Reading};
use crate::protocol::Parameter;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Timelike, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Payload schema revision
pub const PROTOCOL_REVISION: u32 = 1;

/// Reconnect backoff while the broker is away
const RECONNECT_DELAY: Duration = Duration::from_secs(4);

/// Topic set for one station channel
#[derive(Debug, Clone)]
pub struct Topics {
    pub register: String,
    pub events: String,
    pub state: String,
    pub minmax: String,
    pub averages: String,
}

impl Topics {
    pub fn for_channel(channel: &str) -> Self {
        Self {
            register: "EMA/register".to_string(),
            events: format!("EMA/{}/events", channel),
            state: format!("EMA/{}/current/state", channel),
            minmax: format!("EMA/{}/historic/minmax", channel),
            averages: format!("EMA/{}/historic/average", channel),
        }
    }
}

/// MQTT sink. The connection is driven by a background task; the publisher
/// itself only hands payloads to the client and drops them while offline.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    topics: Topics,
    who: String,
    logger: StructuredLogger,
}

impl MqttPublisher {
    /// Connect to the broker and spawn the connection driver.
    pub fn start(cfg: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(cfg.id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(cfg.keepalive.max(5)));
        if !cfg.username.is_empty() {
            options.set_credentials(cfg.username.clone(), cfg.password.clone());
        }
        let (client, mut eventloop) = AsyncClient::new(options, 32);

        let connected = Arc::new(AtomicBool::new(false));
        let flag = connected.clone();
        let driver_logger = get_logger("mqtt");
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        driver_logger.info("connected to broker");
                        flag.store(true, Ordering::Relaxed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if flag.swap(false, Ordering::Relaxed) {
                            driver_logger.warn(&format!("broker connection lost: {}", e));
                        }
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            topics: Topics::for_channel(&cfg.channel),
            who: cfg.id.clone(),
            logger: get_logger("mqtt"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn envelope(&self, mut domain: Value) -> Value {
        if let Some(map) = domain.as_object_mut() {
            map.insert("rev".to_string(), json!(PROTOCOL_REVISION));
            map.insert("who".to_string(), json!(self.who));
            map.insert(
                "tstamp".to_string(),
                json!(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            );
        }
        domain
    }

    fn send(&self, topic: &str, qos: QoS, retain: bool, payload: Value) {
        if !self.is_connected() {
            self.logger
                .debug(&format!("broker offline, dropping publish to {}", topic));
            return;
        }
        let body = payload.to_string();
        if let Err(e) = self.client.try_publish(topic, qos, retain, body) {
            self.logger
                .warn(&format!("publish to {} failed: {}", topic, e));
        }
    }

    /// Full device parameter inventory, once at startup.
    pub fn publish_register(&self, parameters: &[(Parameter, bool)]) {
        let inventory: Vec<Value> = parameters
            .iter()
            .map(|(p, _)| {
                json!({
                    "name": p.name,
                    "value": p.physical_target(),
                    "unit": p.unit,
                })
            })
            .collect();
        let payload = self.envelope(json!({ "parameters": inventory }));
        self.send(&self.topics.register, QoS::ExactlyOnce, false, payload);
    }

    /// An operational event worth surfacing to observers.
    pub fn publish_event(&self, level: &str, message: &str) {
        let payload = self.envelope(json!({ "level": level, "message": message }));
        self.send(&self.topics.events, QoS::AtMostOnce, true, payload);
    }

    /// Per-upload-period state snapshot.
    pub fn publish_state(&self, snapshots: &[InstrumentSnapshot]) {
        let mut current = serde_json::Map::new();
        for snap in snapshots.iter().filter(|s| s.policy.mqtt) {
            let mut channels = serde_json::Map::new();
            for ch in &snap.channels {
                let mut fields = serde_json::Map::new();
                if snap.policy.current {
                    fields.insert("current".to_string(), json!(ch.current));
                }
                if snap.policy.average {
                    fields.insert("average".to_string(), json!(ch.average));
                }
                fields.insert("unit".to_string(), json!(ch.unit));
                channels.insert(ch.name.to_string(), Value::Object(fields));
            }
            current.insert(snap.instrument.to_string(), Value::Object(channels));
        }
        let payload = self.envelope(json!({ "current": Value::Object(current) }));
        self.send(&self.topics.state, QoS::AtMostOnce, false, payload);
    }

    /// Daily min/max tuples.
    pub fn publish_minmax(&self, minmax: Value) {
        let payload = self.envelope(json!({ "minmax": minmax }));
        self.send(&self.topics.minmax, QoS::ExactlyOnce, false, payload);
    }

    /// 5-minute average tuples.
    pub fn publish_averages(&self, averages: Value) {
        let payload = self.envelope(json!({ "averages": averages }));
        self.send(&self.topics.averages, QoS::ExactlyOnce, false, payload);
    }
}

// ---------------------------------------------------------------------------
// Historic payload builders
// ---------------------------------------------------------------------------

/// Turn a completed min/max dump (24 triples of maxima page, minima page,
/// device timestamp line) into the broker payload.
pub fn minmax_payload(raw: &[Vec<u8>]) -> Value {
    let mut entries = Vec::new();
    for chunk in raw.chunks(3) {
        if chunk.len() < 3 {
            break;
        }
        let maxima = decode_bulletin(&chunk[0]).map(|(r, _, _)| r);
        let minima = decode_bulletin(&chunk[1]).map(|(r, _, _)| r);
        let tstamp = String::from_utf8_lossy(&chunk[2])
            .trim()
            .trim_matches(|c| c == '(' || c == ')')
            .to_string();
        entries.push(json!({
            "tstamp": tstamp,
            "max": maxima,
            "min": minima,
        }));
    }
    json!(entries)
}

/// Flash page covering the given time of day (5-minute slots).
pub fn page_for(time: NaiveTime) -> u16 {
    ((time.hour() * 60 + time.minute()) / 5) as u16
}

/// End time of a flash page slot, plus a day carry for the last page.
fn page_end(page: u16) -> (NaiveTime, i64) {
    let minutes = page as u32 * 5 + 5;
    let hour = (minutes / 60) % 24;
    let carry = (minutes / 60 / 24) as i64;
    (
        NaiveTime::from_hms_opt(hour, minutes % 60, 0).unwrap_or(NaiveTime::MIN),
        carry,
    )
}

/// Timestamp one decoded averages page relative to the dump instant.
pub fn average_entry(reading: &Reading, page: u16, now: DateTime<Utc>) -> Value {
    let today = now.date_naive();
    let today_page = page_for(now.time());
    let (time, carry) = page_end(page);
    let date = if today_page < page {
        today
    } else {
        today - ChronoDuration::days(1) + ChronoDuration::days(carry)
    };
    json!({
        "tstamp": format!("{}T{}Z", date.format("%Y-%m-%d"), time.format("%H:%M:%S")),
        "values": reading,
    })
}

/// Turn a completed 5-minute averages dump into the broker payload.
pub fn averages_payload(raw: &[Vec<u8>], now: DateTime<Utc>) -> Value {
    let mut entries = Vec::new();
    for line in raw {
        if let Some((reading, _, page)) = decode_bulletin(line) {
            entries.push(average_entry(&reading, page, now));
        }
    }
    json!(entries)
}

// ---------------------------------------------------------------------------
// HTML sink
// ---------------------------------------------------------------------------

/// Renders the latest snapshot to a static page for the local web server.
pub struct HtmlPage {
    path: PathBuf,
    logger: StructuredLogger,
}

impl HtmlPage {
    pub fn from_config(cfg: &HtmlConfig) -> Option<Self> {
        if cfg.file.is_empty() {
            return None;
        }
        Some(Self {
            path: PathBuf::from(&cfg.file),
            logger: get_logger("html"),
        })
    }

    pub fn render(&self, snapshots: &[InstrumentSnapshot]) -> Result<()> {
        let mut body = String::new();
        body.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
        body.push_str("<title>Weather station</title></head><body>\n");
        body.push_str(&format!(
            "<p>Generated {}</p>\n<table border=\"1\">\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        body.push_str("<tr><th>Instrument</th><th>Channel</th><th>Current</th><th>Average</th><th>Unit</th></tr>\n");
        for snap in snapshots.iter().filter(|s| s.policy.html) {
            for ch in &snap.channels {
                let fmt = |v: Option<f64>| {
                    v.map(|x| format!("{:.1}", x))
                        .unwrap_or_else(|| "-".to_string())
                };
                body.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    snap.instrument,
                    ch.name,
                    if snap.policy.current { fmt(ch.current) } else { "-".to_string() },
                    if snap.policy.average { fmt(ch.average) } else { "-".to_string() },
                    ch.unit
                ));
            }
        }
        body.push_str("</table></body></html>\n");
        std::fs::write(&self.path, body)?;
        self.logger
            .debug(&format!("rendered {}", self.path.display()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        let t = Topics::for_channel("obs1");
        assert_eq!(t.register, "EMA/register");
        assert_eq!(t.events, "EMA/obs1/events");
        assert_eq!(t.state, "EMA/obs1/current/state");
        assert_eq!(t.minmax, "EMA/obs1/historic/minmax");
        assert_eq!(t.averages, "EMA/obs1/historic/average");
    }

    #[test]
    fn test_page_mapping() {
        assert_eq!(page_for(NaiveTime::from_hms_opt(0, 0, 0).unwrap()), 0);
        assert_eq!(page_for(NaiveTime::from_hms_opt(0, 5, 0).unwrap()), 1);
        assert_eq!(page_for(NaiveTime::from_hms_opt(23, 59, 0).unwrap()), 287);
        let (t, carry) = page_end(287);
        assert_eq!(t, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(carry, 1);
        let (t, carry) = page_end(0);
        assert_eq!(t, NaiveTime::from_hms_opt(0, 5, 0).unwrap());
        assert_eq!(carry, 0);
    }
}
