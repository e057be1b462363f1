//! Status bulletin decoding
//!
//! The controller emits a fixed-width 83-character status line holding every
//! sensor reading plus the two relay state characters. Offsets are byte
//! positions inside the line; the supply voltage is a single raw byte scaled
//! by 0.1, which can make the line non-ASCII (13.0 V encodes as byte 130),
//! so all decoding works on bytes rather than strings.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::Serialize;

/// Status line length including the surrounding parentheses
pub const STATUS_LEN: usize = 83;

// Field offsets inside the status line. End bounds are one past the field,
// ready for direct slicing.
const ROOF_RELAY: usize = 1;
const AUX_RELAY: usize = 2;
const POWER_VOLT: usize = 3;
const RAIN: (usize, usize) = (5, 8);
const CLOUD: (usize, usize) = (9, 12);
const CAL_PRESSURE: (usize, usize) = (13, 18);
const ABS_PRESSURE: (usize, usize) = (19, 24);
const PLUVIO_LEVEL: (usize, usize) = (25, 29);
const PLUVIO_ACCUM: (usize, usize) = (30, 34);
const PYRANOMETER: (usize, usize) = (35, 38);
const PHOTOMETER: (usize, usize) = (39, 44);
const AMB_TEMP: (usize, usize) = (45, 49);
const HUMIDITY: (usize, usize) = (50, 53);
const DEW_POINT: (usize, usize) = (54, 58);
const WIND_AVERAGE: (usize, usize) = (64, 67);
const WIND_SPEED: (usize, usize) = (68, 72);
const WIND_DIRECTION: (usize, usize) = (73, 76);
const MSG_TYPE: usize = 77;
const FLASH_PAGE: (usize, usize) = (78, 82);

/// Any status-shaped line, regardless of its type character
static STATUS_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(.{76}[atmM0]\d{4}\)$").expect("status shape pattern"));

/// The unsolicited once-per-second bulletin carries type character `a`
static CURRENT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(.{76}a\d{4}\)$").expect("current shape pattern"));

/// Kind of a status-shaped line, from its type character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletinKind {
    /// Live values, emitted unsolicited about once per second
    Current,
    /// One page of the 5-minute averages dump
    Historic,
    /// Daily minima page
    Minima,
    /// Daily maxima page
    Maxima,
    /// Isolated historic page
    Isolated,
}

impl BulletinKind {
    fn from_type_char(c: u8) -> Option<Self> {
        match c {
            b'a' => Some(BulletinKind::Current),
            b't' => Some(BulletinKind::Historic),
            b'm' => Some(BulletinKind::Minima),
            b'M' => Some(BulletinKind::Maxima),
            b'0' => Some(BulletinKind::Isolated),
            _ => None,
        }
    }
}

/// The canonical 17-field reading vector decoded from one bulletin.
///
/// A field that fails range validation is `None` ("missing") without
/// rejecting the whole frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Roof relay state character ('C' is closed)
    pub roof_relay: char,
    /// Aux relay state character ('E'/'e' is open)
    pub aux_relay: char,
    /// Supply voltage, V
    pub voltage: Option<f64>,
    /// Rain probability, percent
    pub rain_probability: Option<f64>,
    /// Cloud level, percent
    pub cloud_level: Option<f64>,
    /// Absolute barometric pressure, HPa
    pub abs_pressure: Option<f64>,
    /// Calibrated barometric pressure, HPa
    pub cal_pressure: Option<f64>,
    /// Pluviometer level, mm
    pub pluviometer_level: Option<f64>,
    /// Accumulated pluviometer counter, mm, device-side epoch
    pub pluviometer_accumulated: Option<u32>,
    /// Pyranometer reading, percent
    pub pyranometer: Option<f64>,
    /// Photometer frequency, Hz
    pub photometer_frequency: Option<f64>,
    /// Ambient temperature, degrees C
    pub ambient_temperature: Option<f64>,
    /// Relative humidity, percent
    pub humidity: Option<f64>,
    /// Dew point, degrees C
    pub dew_point: Option<f64>,
    /// Instantaneous wind speed, km/h
    pub wind_speed: Option<f64>,
    /// 10-minute average wind speed, km/h
    pub wind_speed_average: Option<u32>,
    /// Wind orientation, degrees
    pub wind_direction: Option<u16>,
}

/// Whether a frame has the status-bulletin shape (any type character)
pub fn is_status_shaped(frame: &[u8]) -> bool {
    frame.len() == STATUS_LEN && STATUS_SHAPE.is_match(frame)
}

/// Whether a frame is the unsolicited live bulletin
pub fn is_current_bulletin(frame: &[u8]) -> bool {
    frame.len() == STATUS_LEN && CURRENT_SHAPE.is_match(frame)
}

/// Parse a fixed-width decimal field, tolerating an explicit sign.
fn field_i32(frame: &[u8], bounds: (usize, usize)) -> Option<i32> {
    let raw = frame.get(bounds.0..bounds.1)?;
    let s = std::str::from_utf8(raw).ok()?;
    s.trim().parse::<i32>().ok()
}

fn scaled(frame: &[u8], bounds: (usize, usize), scale: f64, range: (f64, f64)) -> Option<f64> {
    let value = field_i32(frame, bounds)? as f64 * scale;
    if value < range.0 || value > range.1 {
        return None;
    }
    Some(value)
}

/// Decode the photometer frequency field: an exponent digit followed by a
/// four-digit mantissa in millihertz.
pub fn decode_freq(enc: &[u8]) -> Option<f64> {
    if enc.len() != 5 {
        return None;
    }
    let s = std::str::from_utf8(enc).ok()?;
    let exp = s[0..1].parse::<i32>().ok()? - 3;
    let mant = s[1..5].parse::<i32>().ok()?;
    let hz = mant as f64 * 10f64.powi(exp);
    Some((hz * 1000.0).round() / 1000.0)
}

/// Encode a frequency in Hertz into the wire exponent-mantissa form.
pub fn encode_freq(hertz: f64) -> String {
    let mut milli = hertz * 1000.0;
    let mut exp = 0u32;
    while milli > 9999.0 {
        milli /= 10.0;
        exp += 1;
    }
    format!("{}{:04}", exp, milli.round() as u32)
}

const MAG_CLIP: f64 = 24.0;

/// Convert a photometer frequency into visual magnitudes per arcsec^2,
/// clipped at 24.0 when the reading degenerates.
pub fn magnitude(frequency: f64) -> f64 {
    let mv = frequency / 230.0 * 1.0e-6;
    let mag = if mv > 0.0 {
        let m = -1.0 * mv.log10() / 2.5f64.log10();
        if m < 0.0 {
            MAG_CLIP
        } else {
            m
        }
    } else {
        MAG_CLIP
    };
    (mag * 10.0).round() / 10.0
}

/// Decode a status-shaped line into the reading vector plus its kind and
/// flash page number.
pub fn decode_bulletin(frame: &[u8]) -> Option<(Reading, BulletinKind, u16)> {
    if frame.len() != STATUS_LEN {
        return None;
    }
    let kind = BulletinKind::from_type_char(frame[MSG_TYPE])?;
    let page = field_i32(frame, FLASH_PAGE)? as u16;

    let reading = Reading {
        roof_relay: frame[ROOF_RELAY] as char,
        aux_relay: frame[AUX_RELAY] as char,
        voltage: Some(frame[POWER_VOLT] as f64 * 0.1),
        rain_probability: scaled(frame, RAIN, 0.1, (0.0, 100.0)),
        cloud_level: scaled(frame, CLOUD, 0.1, (0.0, 100.0)),
        abs_pressure: scaled(frame, ABS_PRESSURE, 0.1, (0.0, 1100.0)),
        cal_pressure: scaled(frame, CAL_PRESSURE, 0.1, (0.0, 1100.0)),
        pluviometer_level: scaled(frame, PLUVIO_LEVEL, 0.1, (0.0, 999.0)),
        pluviometer_accumulated: field_i32(frame, PLUVIO_ACCUM).map(|v| v.max(0) as u32),
        pyranometer: scaled(frame, PYRANOMETER, 0.1, (0.0, 100.0)),
        photometer_frequency: frame
            .get(PHOTOMETER.0..PHOTOMETER.1)
            .and_then(decode_freq),
        ambient_temperature: scaled(frame, AMB_TEMP, 0.1, (-99.9, 99.9)),
        humidity: scaled(frame, HUMIDITY, 0.1, (0.0, 100.0)),
        dew_point: scaled(frame, DEW_POINT, 0.1, (-99.9, 99.9)),
        wind_speed: scaled(frame, WIND_SPEED, 0.1, (0.0, 999.0)),
        wind_speed_average: field_i32(frame, WIND_AVERAGE)
            .filter(|v| (0..=999).contains(v))
            .map(|v| v as u32),
        wind_direction: field_i32(frame, WIND_DIRECTION)
            .filter(|v| (0..360).contains(v))
            .map(|v| v as u16),
    };
    Some((reading, kind, page))
}
