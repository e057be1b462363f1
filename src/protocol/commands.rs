//! Command vocabulary
//!
//! Requests are parenthesized ASCII tokens; each command declares the ordered
//! list of response patterns that complete it. Configurable device values are
//! described by `Parameter`, which pairs the get and set commands with the
//! scaling between the physical value and the wire integer.

use crate::error::{AeolusError, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use std::time::Duration;

/// Retransmissions after the initial attempt
pub const DEFAULT_RETRIES: u32 = 2;

/// Response deadline per attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);

/// Pages in the daily min/max dump
pub const MINMAX_PAGES: usize = 24;

/// Pages in the 5-minute averages dump
pub const AVERAGES_PAGES: usize = 288;

/// Device timestamp line, e.g. `(16:07:27 08/03/2024)`
pub const TIMESTAMP_PATTERN: &str = r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4}\)";

const DEVICE_TIME_FORMAT: &str = "(%H:%M:%S %d/%m/%Y)";

/// One request with its ordered expected responses
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub request: String,
    pub responses: Vec<Regex>,
    pub retries: u32,
    pub timeout: Duration,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("command response pattern"))
        .collect()
}

fn spec(name: &'static str, request: impl Into<String>, patterns: &[&str]) -> CommandSpec {
    CommandSpec {
        name,
        request: request.into(),
        responses: compile(patterns),
        retries: DEFAULT_RETRIES,
        timeout: DEFAULT_TIMEOUT,
    }
}

// ---------------------------------------------------------------------------
// Relay and watchdog actions
// ---------------------------------------------------------------------------

pub fn roof_force_open() -> CommandSpec {
    spec(
        "roof force open",
        "(X007)",
        &[r"^\(X007\)", r"^\(\d{2}:\d{2}:\d{2} Abrir Obs\. FORZADO\)"],
    )
}

pub fn roof_force_close() -> CommandSpec {
    spec(
        "roof force close",
        "(X000)",
        &[r"^\(X000\)", r"^\(\d{2}:\d{2}:\d{2} Cerrar Obs\.\)"],
    )
}

pub fn aux_force_open() -> CommandSpec {
    spec(
        "aux relay force open",
        "(S005)",
        &[r"^\(S005\)", r"^\(\d{2}:\d{2}:\d{2} Calentador on\.\)"],
    )
}

pub fn aux_force_close() -> CommandSpec {
    spec(
        "aux relay force close",
        "(S004)",
        &[r"^\(S004\)", r"^\(\d{2}:\d{2}:\d{2} Calentador off\.\)"],
    )
}

pub fn aux_timer_mode_on() -> CommandSpec {
    spec(
        "aux relay timer mode on",
        "(S009)",
        &[
            r"^\(S009\)",
            r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer ON\)",
        ],
    )
}

pub fn aux_timer_mode_off() -> CommandSpec {
    spec(
        "aux relay timer mode off",
        "(S008)",
        &[
            r"^\(S008\)",
            r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer OFF\)",
        ],
    )
}

pub fn aux_status() -> CommandSpec {
    spec(
        "aux relay status",
        "(s)",
        &[r"^\(S\d{3}\)", r"^\(Son\d{4}\)", r"^\(Sof\d{4}\)"],
    )
}

/// Keep-alive that re-arms the device watchdog; the device echoes it back.
pub fn watchdog_ping() -> CommandSpec {
    spec("watchdog keep-alive", "(r)", &[r"^\(r\)"])
}

// ---------------------------------------------------------------------------
// Real time clock
// ---------------------------------------------------------------------------

pub fn rtc_get() -> CommandSpec {
    spec("get device time", "(y)", &[TIMESTAMP_PATTERN])
}

pub fn rtc_set(when: NaiveDateTime) -> CommandSpec {
    CommandSpec {
        name: "set device time",
        request: when.format("(Y%d%m%y%H%M%S)").to_string(),
        responses: compile(&[TIMESTAMP_PATTERN]),
        retries: DEFAULT_RETRIES,
        timeout: DEFAULT_TIMEOUT,
    }
}

/// Parse a device timestamp response line.
pub fn parse_device_time(line: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(line.trim(), DEVICE_TIME_FORMAT)
        .map_err(|e| AeolusError::protocol(format!("bad device timestamp '{}': {}", line, e)))
}

// ---------------------------------------------------------------------------
// Historic bulk dumps
// ---------------------------------------------------------------------------

/// Daily min/max dump: 24 iterations of maxima page, minima page, timestamp.
pub fn minmax_dump() -> CommandSpec {
    let iteration = [
        r"^\(.{76}M\d{4}\)",
        r"^\(.{76}m\d{4}\)",
        TIMESTAMP_PATTERN,
    ];
    let patterns: Vec<&str> = iteration
        .iter()
        .cycle()
        .take(MINMAX_PAGES * iteration.len())
        .copied()
        .collect();
    CommandSpec {
        name: "daily min/max dump",
        request: "(@H0300)".to_string(),
        responses: compile(&patterns),
        retries: 0,
        timeout: Duration::from_secs(128),
    }
}

/// 5-minute averages dump: 288 historic pages.
pub fn averages_dump() -> CommandSpec {
    let patterns: Vec<&str> = std::iter::repeat(r"^\(.{76}t\d{4}\)")
        .take(AVERAGES_PAGES)
        .collect();
    CommandSpec {
        name: "5-minute averages dump",
        request: "(@t0000)".to_string(),
        responses: compile(&patterns),
        retries: 0,
        timeout: Duration::from_secs(256),
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// A configurable device value stored in its EEPROM.
///
/// The wire carries scaled integers; `target` is the configured value after
/// scaling. Some get commands return several lines; `value_index` selects
/// the one holding this parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub unit: &'static str,
    pub scale: f64,
    pub target: i64,
    pub value_index: usize,
    value_pattern: Regex,
    get: CommandSpec,
    set: CommandSpec,
}

impl Parameter {
    pub fn get_spec(&self) -> CommandSpec {
        self.get.clone()
    }

    pub fn set_spec(&self) -> CommandSpec {
        self.set.clone()
    }

    /// Extract the wire integer from a completed get (or set) response set.
    pub fn extract(&self, responses: &[String]) -> Option<i64> {
        let line = responses.get(self.value_index)?;
        let caps = self.value_pattern.captures(line)?;
        caps.get(1)?.as_str().parse::<i64>().ok()
    }

    /// Extract from a completed set response set (always the first line).
    pub fn extract_set(&self, responses: &[String]) -> Option<i64> {
        let line = responses.first()?;
        let caps = self.value_pattern.captures(line)?;
        caps.get(1)?.as_str().parse::<i64>().ok()
    }

    /// Physical value for a wire integer
    pub fn physical(&self, wire: i64) -> f64 {
        wire as f64 / self.scale
    }

    /// Physical value of the configured target
    pub fn physical_target(&self) -> f64 {
        self.physical(self.target)
    }
}

#[allow(clippy::too_many_arguments)]
fn param(
    name: &'static str,
    unit: &'static str,
    scale: f64,
    target: i64,
    get_request: &'static str,
    get_patterns: &[&str],
    value_index: usize,
    value_pattern: &str,
    set_request: String,
    set_patterns: &[&str],
) -> Parameter {
    Parameter {
        name,
        unit,
        scale,
        target,
        value_index,
        value_pattern: Regex::new(value_pattern).expect("parameter value pattern"),
        get: spec(name, get_request, get_patterns),
        set: CommandSpec {
            name,
            request: set_request,
            responses: compile(set_patterns),
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        },
    }
}

pub fn voltmeter_threshold(volts: f64) -> Parameter {
    let t = (volts * 10.0).round() as i64;
    param(
        "voltmeter threshold",
        "V",
        10.0,
        t,
        "(f)",
        &[r"^\(F\d{3}\)", r"^\(F[+-]\d{2}\)"],
        0,
        r"^\(F(\d{3})\)",
        format!("(F{:03})", t),
        &[r"^\(F\d{3}\)"],
    )
}

pub fn voltmeter_offset(volts: f64) -> Parameter {
    let t = (volts * 10.0).round() as i64;
    param(
        "voltmeter offset",
        "V",
        10.0,
        t,
        "(f)",
        &[r"^\(F\d{3}\)", r"^\(F[+-]\d{2}\)"],
        1,
        r"^\(F([+-]\d{2})\)",
        format!("(F{:+03})", t),
        &[r"^\(F[+-]\d{2}\)"],
    )
}

pub fn anemometer_threshold(kmh: i64) -> Parameter {
    param(
        "wind speed threshold",
        "Km/h",
        1.0,
        kmh,
        "(w)",
        &[r"^\(W\d{3}\)"],
        0,
        r"^\(W(\d{3})\)",
        format!("(W{:03})", kmh),
        &[r"^\(W\d{3}\)"],
    )
}

pub fn anemometer_average_threshold(kmh: i64) -> Parameter {
    param(
        "10min average wind speed threshold",
        "Km/h",
        1.0,
        kmh,
        "(o)",
        &[r"^\(O\d{3}\)"],
        0,
        r"^\(O(\d{3})\)",
        format!("(O{:03})", kmh),
        &[r"^\(O\d{3}\)"],
    )
}

pub fn anemometer_calibration(constant: i64) -> Parameter {
    param(
        "anemometer calibration constant",
        "",
        1.0,
        constant,
        "(a)",
        &[r"^\(A\d{3}\)"],
        0,
        r"^\(A(\d{3})\)",
        format!("(A{:03})", constant),
        &[r"^\(A\d{3}\)"],
    )
}

/// Rotor model: 1 for TX20, 0 for the simple rotor.
pub fn anemometer_model(model: &str) -> Result<Parameter> {
    let t = match model {
        "TX20" => 1,
        "Simple" => 0,
        other => {
            return Err(AeolusError::validation(
                "anemometer.model".to_string(),
                format!("unknown model '{}'", other),
            ))
        }
    };
    Ok(param(
        "anemometer model",
        "",
        1.0,
        t,
        "(z)",
        &[r"^\(Z\d{3}\)"],
        0,
        r"^\(Z(\d{3})\)",
        format!("(Z{:03})", t),
        &[r"^\(Z\d{3}\)"],
    ))
}

pub fn barometer_height(metres: i64) -> Parameter {
    param(
        "barometer height",
        "m",
        1.0,
        metres,
        "(m)",
        &[r"^\(M\d{5}\)"],
        0,
        r"^\(M(\d{5})\)",
        format!("(M{:05})", metres),
        &[r"^\(M\d{5}\)"],
    )
}

pub fn barometer_offset(mbar: i64) -> Parameter {
    param(
        "barometer offset",
        "mBar",
        1.0,
        mbar,
        "(b)",
        &[r"^\(B[+-]\d{2}\)"],
        0,
        r"^\(B([+-]\d{2})\)",
        format!("(B{:+03})", mbar),
        &[r"^\(B[+-]\d{2}\)"],
    )
}

pub fn cloud_threshold(percent: i64) -> Parameter {
    param(
        "cloud sensor threshold",
        "%",
        1.0,
        percent,
        "(n)",
        &[r"^\(N\d{3}\)"],
        0,
        r"^\(N(\d{3})\)",
        format!("(N{:03})", percent),
        &[r"^\(N\d{3}\)"],
    )
}

pub fn cloud_gain(gain: f64) -> Parameter {
    let t = (gain * 10.0).round() as i64;
    param(
        "cloud sensor gain",
        "",
        10.0,
        t,
        "(r)",
        &[r"^\(R\d{3}\)"],
        0,
        r"^\(R(\d{3})\)",
        format!("(R{:03})", t),
        &[r"^\(R\d{3}\)"],
    )
}

pub fn photometer_threshold(mag: f64) -> Parameter {
    let t = (mag * 10.0).round() as i64;
    param(
        "photometer threshold",
        "Mv/arcsec^2",
        10.0,
        t,
        "(i)",
        &[r"^\(I\d{3}\)", r"^\(I[+-]\d{2}\)", r"^\(I\d{5}\)"],
        0,
        r"^\(I(\d{3})\)",
        format!("(I{:03})", t),
        &[r"^\(I\d{3}\)"],
    )
}

pub fn photometer_offset(mag: f64) -> Parameter {
    let t = (mag * 10.0).round() as i64;
    param(
        "photometer offset",
        "Mv/arcsec^2",
        10.0,
        t,
        "(i)",
        &[r"^\(I\d{3}\)", r"^\(I[+-]\d{2}\)", r"^\(I\d{5}\)"],
        1,
        r"^\(I([+-]\d{2})\)",
        format!("(I{:+03})", t),
        &[r"^\(I[+-]\d{2}\)"],
    )
}

pub fn pluviometer_calibration(mm: i64) -> Parameter {
    param(
        "pluviometer calibration constant",
        "mm",
        1.0,
        mm,
        "(p)",
        &[r"^\(P\d{3}\)"],
        0,
        r"^\(P(\d{3})\)",
        format!("(P{:03})", mm),
        &[r"^\(P\d{3}\)"],
    )
}

pub fn pyranometer_gain(gain: f64) -> Parameter {
    let t = (gain * 10.0).round() as i64;
    param(
        "pyranometer gain",
        "",
        10.0,
        t,
        "(j)",
        &[r"^\(J\d{3}\)"],
        0,
        r"^\(J(\d{3})\)",
        format!("(J{:03})", t),
        &[r"^\(J\d{3}\)"],
    )
}

pub fn pyranometer_offset(offset: i64) -> Parameter {
    param(
        "pyranometer offset",
        "",
        1.0,
        offset,
        "(u)",
        &[r"^\(U\d{3}\)"],
        0,
        r"^\(U(\d{3})\)",
        format!("(U{:03})", offset),
        &[r"^\(U\d{3}\)"],
    )
}

pub fn rain_threshold(mm: i64) -> Parameter {
    param(
        "rain sensor threshold",
        "mm",
        1.0,
        mm,
        "(l)",
        &[r"^\(L\d{3}\)"],
        0,
        r"^\(L(\d{3})\)",
        format!("(L{:03})", mm),
        &[r"^\(L\d{3}\)"],
    )
}

pub fn thermometer_delta_threshold(degrees: i64) -> Parameter {
    param(
        "thermometer delta threshold",
        "deg C",
        1.0,
        degrees,
        "(c)",
        &[r"^\(C\d{3}\)"],
        0,
        r"^\(C(\d{3})\)",
        format!("(C{:03})", degrees),
        &[r"^\(C\d{3}\)"],
    )
}

pub fn watchdog_period(seconds: i64) -> Parameter {
    param(
        "watchdog period",
        "s",
        1.0,
        seconds,
        "(t)",
        &[r"^\(T\d{3}\)"],
        0,
        r"^\(T(\d{3})\)",
        format!("(T{:03})", seconds),
        &[r"^\(T\d{3}\)"],
    )
}

// ---------------------------------------------------------------------------
// Aux relay parameters
// ---------------------------------------------------------------------------

/// Auxiliary relay operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxRelayMode {
    /// The device governs the relay from its own thresholds
    Auto,
    /// Forced on
    Manual,
    /// Governed by the on/off timer hours
    Timed,
}

impl AuxRelayMode {
    pub fn from_config(mode: &str) -> Result<Self> {
        match mode {
            "Auto" => Ok(AuxRelayMode::Auto),
            "Manual" => Ok(AuxRelayMode::Manual),
            "Timed" => Ok(AuxRelayMode::Timed),
            other => Err(AeolusError::validation(
                "aux_relay.mode".to_string(),
                format!("unknown mode '{}'", other),
            )),
        }
    }

    /// Wire value used by the `(S%03d)` command
    pub fn wire_value(self) -> i64 {
        match self {
            AuxRelayMode::Auto => 0,
            AuxRelayMode::Manual => 5,
            AuxRelayMode::Timed => 9,
        }
    }
}

pub fn aux_relay_mode(mode: AuxRelayMode) -> Parameter {
    let t = mode.wire_value();
    // Mode changes to Timed or Manual earn an informational second line
    let set_patterns: &[&str] = match mode {
        AuxRelayMode::Timed => &[
            r"^\(S\d{3}\)",
            r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer ON\)",
        ],
        AuxRelayMode::Manual => &[r"^\(S\d{3}\)", r"^\(\d{2}:\d{2}:\d{2} Calentador on\.\)"],
        AuxRelayMode::Auto => &[r"^\(S\d{3}\)"],
    };
    param(
        "aux relay mode",
        "",
        1.0,
        t,
        "(s)",
        &[r"^\(S\d{3}\)", r"^\(Son\d{4}\)", r"^\(Sof\d{4}\)"],
        0,
        r"^\(S(\d{3})\)",
        format!("(S{:03})", t),
        set_patterns,
    )
}

/// Convert a `HH:MM` string into the wire `HHMM` integer.
pub fn hhmm_to_wire(hhmm: &str) -> Result<i64> {
    let (h, m) = hhmm
        .split_once(':')
        .ok_or_else(|| AeolusError::validation("time", "expected HH:MM"))?;
    let h: i64 = h
        .parse()
        .map_err(|_| AeolusError::validation("time", "bad hour"))?;
    let m: i64 = m
        .parse()
        .map_err(|_| AeolusError::validation("time", "bad minute"))?;
    if !(0..24).contains(&h) || !(0..60).contains(&m) {
        return Err(AeolusError::validation("time", "out of range"));
    }
    Ok(h * 100 + m)
}

/// Render a wire `HHMM` integer back into `HH:MM`.
pub fn wire_to_hhmm(wire: i64) -> String {
    format!("{:02}:{:02}", wire / 100, wire % 100)
}

pub fn aux_switch_on_time(hhmm: &str) -> Result<Parameter> {
    let t = hhmm_to_wire(hhmm)?;
    Ok(param(
        "aux relay switch-on time",
        "HH:MM",
        1.0,
        t,
        "(s)",
        &[r"^\(S\d{3}\)", r"^\(Son\d{4}\)", r"^\(Sof\d{4}\)"],
        1,
        r"^\(Son(\d{4})\)",
        format!("(Son{:04})", t),
        &[r"^\(Son\d{4}\)"],
    ))
}

pub fn aux_switch_off_time(hhmm: &str) -> Result<Parameter> {
    let t = hhmm_to_wire(hhmm)?;
    Ok(param(
        "aux relay switch-off time",
        "HH:MM",
        1.0,
        t,
        "(s)",
        &[r"^\(S\d{3}\)", r"^\(Son\d{4}\)", r"^\(Sof\d{4}\)"],
        2,
        r"^\(Sof(\d{4})\)",
        format!("(Sof{:04})", t),
        &[r"^\(Sof\d{4}\)"],
    ))
}

// ---------------------------------------------------------------------------
// Companion CLI request recognition
// ---------------------------------------------------------------------------

struct ExternalEntry {
    name: &'static str,
    request: &'static str,
    responses: &'static [&'static str],
}

/// Requests a companion tool may route through the gateway, with the
/// responses each one collects.
const EXTERNAL_TABLE: &[ExternalEntry] = &[
    ExternalEntry {
        name: "roof force open",
        request: r"^\(X007\)$",
        responses: &[r"^\(X007\)", r"^\(\d{2}:\d{2}:\d{2} Abrir Obs\. FORZADO\)"],
    },
    ExternalEntry {
        name: "roof force close",
        request: r"^\(X000\)$",
        responses: &[r"^\(X000\)", r"^\(\d{2}:\d{2}:\d{2} Cerrar Obs\.\)"],
    },
    ExternalEntry {
        name: "aux relay force open",
        request: r"^\(S005\)$",
        responses: &[r"^\(S005\)", r"^\(\d{2}:\d{2}:\d{2} Calentador on\.\)"],
    },
    ExternalEntry {
        name: "aux relay force close",
        request: r"^\(S004\)$",
        responses: &[r"^\(S004\)", r"^\(\d{2}:\d{2}:\d{2} Calentador off\.\)"],
    },
    ExternalEntry {
        name: "aux relay timer mode on",
        request: r"^\(S009\)$",
        responses: &[
            r"^\(S009\)",
            r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer ON\)",
        ],
    },
    ExternalEntry {
        name: "aux relay timer mode off",
        request: r"^\(S008\)$",
        responses: &[
            r"^\(S008\)",
            r"^\(\d{2}:\d{2}:\d{2} \d{2}/\d{2}/\d{4} Timer OFF\)",
        ],
    },
    ExternalEntry {
        name: "aux relay timer on hour set",
        request: r"^\(Son\d{4}\)$",
        responses: &[r"^\(Son\d{4}\)"],
    },
    ExternalEntry {
        name: "aux relay timer off hour set",
        request: r"^\(Sof\d{4}\)$",
        responses: &[r"^\(Sof\d{4}\)"],
    },
    ExternalEntry {
        name: "aux relay status",
        request: r"^\(s\)$",
        responses: &[r"^\(S\d{3}\)", r"^\(Son\d{4}\)", r"^\(Sof\d{4}\)"],
    },
];

/// Recognize a companion-tool request and build the command that tracks its
/// responses. Unrecognized payloads are not commands; callers forward them
/// to the device verbatim.
pub fn match_external(message: &str) -> Option<CommandSpec> {
    for entry in EXTERNAL_TABLE {
        let re = Regex::new(entry.request).expect("external request pattern");
        if re.is_match(message.trim()) {
            return Some(CommandSpec {
                name: entry.name,
                request: message.trim().to_string(),
                responses: compile(entry.responses),
                retries: DEFAULT_RETRIES,
                timeout: DEFAULT_TIMEOUT,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parameter_requests() {
        assert_eq!(barometer_height(700).get_spec().request, "(m)");
        assert_eq!(barometer_height(700).set_spec().request, "(M00700)");
        assert_eq!(barometer_offset(-19).set_spec().request, "(B-19)");
        assert_eq!(voltmeter_threshold(11.8).set_spec().request, "(F118)");
        assert_eq!(voltmeter_offset(-1.4).set_spec().request, "(F-14)");
        assert_eq!(aux_switch_on_time("19:00").unwrap().set_spec().request, "(Son1900)");
        assert_eq!(aux_switch_off_time("22:00").unwrap().set_spec().request, "(Sof2200)");
    }

    #[test]
    fn test_parameter_extract() {
        let p = barometer_height(700);
        assert_eq!(p.extract(&["(M00650)".to_string()]), Some(650));
        assert_eq!(p.extract(&["(garbage)".to_string()]), None);

        let p = voltmeter_offset(-1.4);
        let responses = vec!["(F118)".to_string(), "(F-14)".to_string()];
        assert_eq!(p.extract(&responses), Some(-14));
        assert_eq!(p.physical_target(), -1.4);
    }

    #[test]
    fn test_aux_mode_values() {
        assert_eq!(AuxRelayMode::from_config("Timed").unwrap().wire_value(), 9);
        assert_eq!(AuxRelayMode::from_config("Auto").unwrap().wire_value(), 0);
        assert_eq!(AuxRelayMode::from_config("Manual").unwrap().wire_value(), 5);
        assert!(AuxRelayMode::from_config("Sometimes").is_err());
        assert_eq!(aux_relay_mode(AuxRelayMode::Timed).set_spec().request, "(S009)");
    }

    #[test]
    fn test_device_time_roundtrip() {
        let t = parse_device_time("(16:07:27 08/03/2024)").unwrap();
        assert_eq!(
            t,
            NaiveDate::from_ymd_opt(2024, 3, 8)
                .unwrap()
                .and_hms_opt(16, 7, 27)
                .unwrap()
        );
        let set = rtc_set(t);
        assert_eq!(set.request, "(Y080324160727)");
    }

    #[test]
    fn test_bulk_dump_shapes() {
        let mm = minmax_dump();
        assert_eq!(mm.responses.len(), MINMAX_PAGES * 3);
        assert_eq!(mm.retries, 0);
        let av = averages_dump();
        assert_eq!(av.responses.len(), AVERAGES_PAGES);
    }

    #[test]
    fn test_match_external() {
        assert!(match_external("(X007)").is_some());
        assert!(match_external("(s)").is_some());
        assert!(match_external("(Son1930)").is_some());
        assert!(match_external("(y)").is_none());
        let cmd = match_external("(S009)").unwrap();
        assert_eq!(cmd.responses.len(), 2);
    }

    #[test]
    fn test_hhmm_wire() {
        assert_eq!(hhmm_to_wire("19:05").unwrap(), 1905);
        assert_eq!(wire_to_hhmm(1905), "19:05");
        assert!(hhmm_to_wire("25:00").is_err());
        assert!(hhmm_to_wire("1900").is_err());
    }
}
