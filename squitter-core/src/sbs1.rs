//! SBS1 (BaseStation port 30003) CSV lines.
//!
//! Every line has 22 comma-separated fields. Only `MSG` transmissions carry
//! aircraft data; which fields are filled depends on the transmission type:
//!
//! | type | meaning                 | fields used                           |
//! |------|-------------------------|---------------------------------------|
//! | 1    | ES identification       | callsign                              |
//! | 2    | ES surface position     | altitude, speed, track, lat/lon, gnd  |
//! | 3    | ES airborne position    | altitude, lat/lon, alert, emerg, gnd  |
//! | 4    | ES airborne velocity    | speed, track, vertical rate, gnd      |
//! | 5    | Surveillance altitude   | callsign, altitude, alert, gnd        |
//! | 6    | Surveillance identity   | callsign, altitude, squawk, flags     |
//! | 7    | Air to air              | altitude, gnd                         |
//! | 8    | All call reply          | gnd                                   |
//!
//! Flags use `-1` for true and `0` for false. The date/time fields are the
//! feeder's, not ours; the capture time comes from whoever read the line.

use serde::Serialize;

use crate::types::{icao_from_hex, serialize_icao, AdsbError, Icao, Result};

const FIELD_COUNT: usize = 22;

const MSG_TYPE: usize = 0;
const TRANSMISSION_TYPE: usize = 1;
const ICAO: usize = 4;
const CALLSIGN: usize = 10;
const ALTITUDE: usize = 11;
const GROUND_SPEED: usize = 12;
const TRACK: usize = 13;
const LAT: usize = 14;
const LON: usize = 15;
const VERTICAL_RATE: usize = 16;
const SQUAWK: usize = 17;
const ALERT: usize = 18;
const EMERGENCY: usize = 19;
const SPI: usize = 20;
const ON_GROUND: usize = 21;

/// One parsed SBS1 line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sbs1Frame {
    /// `MSG`, `SEL`, `ID`, `AIR`, `STA` or `CLK`.
    pub message_type: String,
    /// 1-8 for `MSG` lines.
    pub transmission: Option<u8>,
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    /// Unix seconds.
    pub received_at: f64,
    pub callsign: Option<String>,
    /// Feet.
    pub altitude: Option<i32>,
    /// Knots.
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// Feet per minute.
    pub vertical_rate: Option<i32>,
    pub squawk: Option<u16>,
    pub alert: Option<bool>,
    pub emergency: Option<bool>,
    pub spi: Option<bool>,
    pub on_ground: Option<bool>,
}

impl Sbs1Frame {
    /// Latitude and longitude, when the line carried both.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Parse one SBS1 line captured at `received_at`.
pub fn parse_sbs1(line: &str, received_at: f64) -> Result<Sbs1Frame> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != FIELD_COUNT {
        return Err(AdsbError::Sbs1(format!(
            "expected {FIELD_COUNT} fields, got {}",
            fields.len()
        )));
    }

    let icao = icao_from_hex(fields[ICAO])
        .ok_or_else(|| AdsbError::Sbs1(format!("bad ICAO {:?}", fields[ICAO])))?;

    let mut frame = Sbs1Frame {
        message_type: fields[MSG_TYPE].to_string(),
        icao,
        received_at,
        ..Default::default()
    };

    match fields[MSG_TYPE] {
        "SEL" | "ID" => frame.callsign = text(fields[CALLSIGN]),
        "AIR" | "STA" | "CLK" => {}
        "MSG" => {
            let transmission: u8 = fields[TRANSMISSION_TYPE].parse().map_err(|_| {
                AdsbError::Sbs1(format!(
                    "bad transmission type {:?}",
                    fields[TRANSMISSION_TYPE]
                ))
            })?;
            frame.transmission = Some(transmission);
            fill_transmission(&mut frame, transmission, &fields);
        }
        other => return Err(AdsbError::Sbs1(format!("unknown message type {other:?}"))),
    }

    Ok(frame)
}

fn fill_transmission(frame: &mut Sbs1Frame, transmission: u8, fields: &[&str]) {
    match transmission {
        1 => frame.callsign = text(fields[CALLSIGN]),
        2 => {
            frame.altitude = number(fields[ALTITUDE]);
            frame.ground_speed = number(fields[GROUND_SPEED]);
            frame.track = number(fields[TRACK]);
            frame.lat = number(fields[LAT]);
            frame.lon = number(fields[LON]);
        }
        3 => {
            frame.altitude = number(fields[ALTITUDE]);
            frame.lat = number(fields[LAT]);
            frame.lon = number(fields[LON]);
            frame.alert = flag(fields[ALERT]);
            frame.emergency = flag(fields[EMERGENCY]);
            frame.spi = flag(fields[SPI]);
        }
        4 => {
            frame.ground_speed = number(fields[GROUND_SPEED]);
            frame.track = number(fields[TRACK]);
            frame.vertical_rate = number(fields[VERTICAL_RATE]);
        }
        5 => {
            frame.callsign = text(fields[CALLSIGN]);
            frame.altitude = number(fields[ALTITUDE]);
            frame.alert = flag(fields[ALERT]);
            frame.spi = flag(fields[SPI]);
        }
        6 => {
            frame.callsign = text(fields[CALLSIGN]);
            frame.altitude = number(fields[ALTITUDE]);
            frame.squawk = number(fields[SQUAWK]);
            frame.alert = flag(fields[ALERT]);
            frame.emergency = flag(fields[EMERGENCY]);
            frame.spi = flag(fields[SPI]);
        }
        7 => frame.altitude = number(fields[ALTITUDE]),
        _ => {}
    }
    frame.on_ground = flag(fields[ON_GROUND]);
}

fn text(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

fn number<T: std::str::FromStr>(field: &str) -> Option<T> {
    field.parse().ok()
}

fn flag(field: &str) -> Option<bool> {
    match field {
        "-1" | "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}
