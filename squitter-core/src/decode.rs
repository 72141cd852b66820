//! Decode text lines into typed Mode S frames.
//!
//! Handles every Downlink Format the frame parser accepts:
//! - DF0/16:  air-air surveillance (vertical status, AC13 altitude)
//! - DF4/20:  altitude replies (flight status, AC13 altitude, Comm-B on DF20)
//! - DF5/21:  identity replies (flight status, squawk, Comm-B on DF21)
//! - DF11:    all-call reply (capability)
//! - DF17/18: extended squitter, see [`crate::adsb`]
//!
//! Every derived value is held as an `Option`. Accessors return
//! [`AdsbError::FieldNotValid`] when the frame did not carry the field, so a
//! missing value is never mistaken for zero.

use serde::Serialize;

use crate::adsb::{self, MessageKind};
use crate::altitude::{decode_ac13, decode_identity, field13, Altitude};
use crate::commb::{infer_bds, Bds};
use crate::frame::{parse_frame, RawFrame, TransportMode};
use crate::types::*;

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

/// Raw CPR-encoded position, still needing a pair to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CprFields {
    /// 17-bit encoded latitude.
    pub lat: u32,
    /// 17-bit encoded longitude.
    pub lon: u32,
    pub odd: bool,
    pub utc_sync: bool,
}

/// What a speed value measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedKind {
    Ground,
    Indicated,
    True,
}

/// Horizontal speed in knots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Speed {
    pub knots: f64,
    pub kind: SpeedKind,
}

/// Signed east/west and north/south velocity in knots (east and north positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VelocityComponents {
    pub east_west: i32,
    pub north_south: i32,
}

/// Emitter category from identification messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Category {
    /// Category set, `4 - TC` (A = 0 ... D = 3).
    pub set: u8,
    pub code: u8,
}

impl Category {
    pub fn description(&self) -> &'static str {
        AIRCRAFT_CATEGORY
            .get(self.set as usize)
            .and_then(|row| row.get(self.code as usize))
            .copied()
            .unwrap_or("Reserved")
    }
}

/// Source of the vertical rate in velocity messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalRateSource {
    Gnss,
    Barometric,
}

/// TC 31 operational status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperationalStatus {
    pub version: u8,
    pub nic_supplement_a: u8,
    pub nac_p: u8,
    pub gva: u8,
    pub sil: u8,
    pub nic_baro: u8,
    pub horizontal_reference: u8,
    pub capability_class: u16,
    pub operational_mode: u16,
    /// Surface subtype only: (length, width) in metres.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airframe_size: Option<(f64, f64)>,
}

impl OperationalStatus {
    pub fn version_text(&self) -> &'static str {
        ADSB_VERSION_TABLE[(self.version & 7) as usize]
    }
}

// ---------------------------------------------------------------------------
// DecodedFrame
// ---------------------------------------------------------------------------

/// Result of decoding one line.
#[derive(Debug, Clone)]
pub enum Decoded {
    /// All-zero heartbeat. Carries nothing.
    NoOp,
    Frame(Box<DecodedFrame>),
}

/// A fully decoded frame.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedFrame {
    pub(crate) df: u8,
    #[serde(serialize_with = "serialize_icao")]
    pub(crate) icao: Icao,
    pub(crate) mode: TransportMode,
    pub(crate) received_at: f64,
    pub(crate) raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) mlat_ticks: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) capability: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) control_field: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) flight_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) vertical_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cross_link: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) sensitivity_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reply_information: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) downlink_request: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) utility_message: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) on_ground: Option<bool>,
    pub(crate) alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) special: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) altitude_unit: Option<AltitudeUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) altitude: Option<Altitude>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) squawk: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) bds: Option<Bds>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) sub_type: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cpr: Option<CprFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) surveillance_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nic_supplement_b: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) speed: Option<Speed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) components: Option<VelocityComponents>,
    pub(crate) supersonic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) vertical_rate: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) vertical_rate_source: Option<VerticalRateSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) intent_change: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) ifr_capability: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nac_v: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) gnss_baro_delta: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) emergency: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) operational_status: Option<OperationalStatus>,
}

impl DecodedFrame {
    fn new(frame: RawFrame, received_at: f64) -> Self {
        DecodedFrame {
            df: frame.df,
            icao: frame.icao,
            mode: frame.mode,
            received_at,
            raw: frame.text,
            mlat_ticks: frame.mlat_ticks,
            capability: None,
            control_field: None,
            flight_status: None,
            vertical_status: None,
            cross_link: None,
            sensitivity_level: None,
            reply_information: None,
            downlink_request: None,
            utility_message: None,
            on_ground: None,
            alert: false,
            special: None,
            altitude_unit: None,
            altitude: None,
            squawk: None,
            bds: None,
            message_type: None,
            sub_type: None,
            callsign: None,
            category: None,
            cpr: None,
            surveillance_status: None,
            nic_supplement_b: None,
            speed: None,
            components: None,
            supersonic: false,
            heading: None,
            vertical_rate: None,
            vertical_rate_source: None,
            intent_change: None,
            ifr_capability: None,
            nac_v: None,
            gnss_baro_delta: None,
            emergency: None,
            operational_status: None,
        }
    }

    // -- Always present --

    pub fn df(&self) -> u8 {
        self.df
    }

    pub fn icao(&self) -> Icao {
        self.icao
    }

    /// `true` when the address came from a CRC-checked frame (DF11/17/18).
    /// Other DFs recover it from the parity overlay, so a bit error yields
    /// a different, equally plausible address.
    pub fn address_verified(&self) -> bool {
        matches!(self.df, 11 | 17 | 18)
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Capture time, Unix seconds.
    pub fn received_at(&self) -> f64 {
        self.received_at
    }

    /// The line this frame was decoded from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn alert(&self) -> bool {
        self.alert
    }

    pub fn supersonic(&self) -> bool {
        self.supersonic
    }

    pub fn df_name(&self) -> &'static str {
        df_info(self.df).map(|info| info.name).unwrap_or("Unknown")
    }

    /// ADS-B message family, DF17/18 only.
    pub fn message_kind(&self) -> Option<MessageKind> {
        self.message_type.map(adsb::message_kind)
    }

    // -- Fail-closed accessors --

    pub fn mlat_ticks(&self) -> Result<u64> {
        valid(self.mlat_ticks, "mlat_ticks")
    }

    pub fn capability(&self) -> Result<u8> {
        valid(self.capability, "capability")
    }

    pub fn control_field(&self) -> Result<u8> {
        valid(self.control_field, "control_field")
    }

    pub fn flight_status(&self) -> Result<u8> {
        valid(self.flight_status, "flight_status")
    }

    pub fn flight_status_text(&self) -> Result<&'static str> {
        self.flight_status()
            .map(|fs| FLIGHT_STATUS_TABLE[(fs & 7) as usize])
    }

    pub fn vertical_status(&self) -> Result<u8> {
        valid(self.vertical_status, "vertical_status")
    }

    pub fn cross_link(&self) -> Result<u8> {
        valid(self.cross_link, "cross_link")
    }

    pub fn sensitivity_level(&self) -> Result<u8> {
        valid(self.sensitivity_level, "sensitivity_level")
    }

    pub fn reply_information(&self) -> Result<u8> {
        valid(self.reply_information, "reply_information")
    }

    pub fn downlink_request(&self) -> Result<u8> {
        valid(self.downlink_request, "downlink_request")
    }

    pub fn utility_message(&self) -> Result<u8> {
        valid(self.utility_message, "utility_message")
    }

    pub fn on_ground(&self) -> Result<bool> {
        valid(self.on_ground, "on_ground")
    }

    /// Special position / flight status text (SPI).
    pub fn special(&self) -> Result<&'static str> {
        valid(self.special, "special")
    }

    pub fn altitude(&self) -> Result<Altitude> {
        valid(self.altitude, "altitude")
    }

    /// Unit of the altitude field. Present even when the value is not.
    pub fn altitude_unit(&self) -> Result<AltitudeUnit> {
        valid(self.altitude_unit, "altitude_unit")
    }

    pub fn squawk(&self) -> Result<u16> {
        valid(self.squawk, "squawk")
    }

    pub fn bds(&self) -> Result<&Bds> {
        valid(self.bds.as_ref(), "bds")
    }

    pub fn message_type(&self) -> Result<u8> {
        valid(self.message_type, "message_type")
    }

    pub fn sub_type(&self) -> Result<u8> {
        valid(self.sub_type, "sub_type")
    }

    /// Callsign from an identification message or BDS 2.0, padded to 8 chars.
    pub fn callsign(&self) -> Result<&str> {
        valid(self.callsign.as_deref(), "callsign")
    }

    pub fn category(&self) -> Result<Category> {
        valid(self.category, "category")
    }

    pub fn cpr(&self) -> Result<CprFields> {
        valid(self.cpr, "cpr")
    }

    pub fn surveillance_status(&self) -> Result<u8> {
        valid(self.surveillance_status, "surveillance_status")
    }

    pub fn nic_supplement_b(&self) -> Result<u8> {
        valid(self.nic_supplement_b, "nic_supplement_b")
    }

    pub fn speed(&self) -> Result<Speed> {
        valid(self.speed, "speed")
    }

    pub fn components(&self) -> Result<VelocityComponents> {
        valid(self.components, "velocity_components")
    }

    /// Track or heading in degrees, 0..360.
    pub fn heading(&self) -> Result<f64> {
        valid(self.heading, "heading")
    }

    /// Feet per minute, climbing positive.
    pub fn vertical_rate(&self) -> Result<i32> {
        valid(self.vertical_rate, "vertical_rate")
    }

    pub fn vertical_rate_source(&self) -> Result<VerticalRateSource> {
        valid(self.vertical_rate_source, "vertical_rate_source")
    }

    pub fn intent_change(&self) -> Result<bool> {
        valid(self.intent_change, "intent_change")
    }

    pub fn ifr_capability(&self) -> Result<bool> {
        valid(self.ifr_capability, "ifr_capability")
    }

    pub fn nac_v(&self) -> Result<u8> {
        valid(self.nac_v, "nac_v")
    }

    /// GNSS height minus barometric altitude, feet.
    pub fn gnss_baro_delta(&self) -> Result<i32> {
        valid(self.gnss_baro_delta, "gnss_baro_delta")
    }

    pub fn emergency(&self) -> Result<u8> {
        valid(self.emergency, "emergency")
    }

    pub fn emergency_text(&self) -> Result<&'static str> {
        self.emergency()
            .map(|code| EMERGENCY_TABLE[(code & 7) as usize])
    }

    pub fn operational_status(&self) -> Result<OperationalStatus> {
        valid(self.operational_status, "operational_status")
    }

    /// Horizontal containment radius in metres for airborne position frames.
    ///
    /// `nic_supplement_a` comes from an earlier operational status message.
    pub fn containment_radius(&self, nic_supplement_a: bool) -> Result<f64> {
        let tc = self.message_type()?;
        let nic_b = self.nic_supplement_b()?;
        valid(
            adsb::containment_radius(tc, nic_supplement_a, nic_b),
            "containment_radius",
        )
    }

    // -- Surveillance field decoders --

    fn decode_flight_status(&mut self, b0: u8) {
        let fs = b0 & 0x07;
        self.flight_status = Some(fs);
        match fs {
            0 | 2 => self.on_ground = Some(false),
            1 | 3 => self.on_ground = Some(true),
            4 | 5 => {
                self.on_ground = Some(false);
                self.special = Some(FLIGHT_STATUS_TABLE[fs as usize]);
            }
            _ => {}
        }
        self.alert = matches!(fs, 2..=4);
    }

    fn decode_vertical_status(&mut self, b0: u8) {
        let vs = (b0 & 0x04) >> 2;
        self.vertical_status = Some(vs);
        self.on_ground = Some(vs != 0);
    }

    pub(crate) fn decode_capability(&mut self, b0: u8) {
        let ca = b0 & 0x07;
        self.capability = Some(ca);
        match ca {
            4 => self.on_ground = Some(true),
            5 => self.on_ground = Some(false),
            _ => {}
        }
    }

    fn decode_ac13_field(&mut self, hi: u8, lo: u8) {
        let (unit, altitude) = decode_ac13(field13(hi, lo));
        self.altitude_unit = Some(unit);
        self.altitude = altitude;
    }

    pub(crate) fn decode_squawk_field(&mut self, hi: u8, lo: u8) {
        self.squawk = Some(decode_identity(field13(hi, lo)));
    }

    fn decode_comm_b(&mut self, mb: &[u8]) {
        let bds = infer_bds(mb);
        if let Bds::Identification { callsign } = &bds {
            self.callsign = Some(callsign.clone());
        }
        self.bds = Some(bds);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Decode one text line captured at `received_at` (Unix seconds).
pub fn decode(line: &str, received_at: f64) -> Result<Decoded> {
    let Some(raw) = parse_frame(line)? else {
        return Ok(Decoded::NoOp);
    };
    Ok(Decoded::Frame(Box::new(decode_frame(raw, received_at))))
}

/// Decode the fields of an already validated frame.
pub fn decode_frame(raw: RawFrame, received_at: f64) -> DecodedFrame {
    let m = raw.bytes.clone();
    let mut f = DecodedFrame::new(raw, received_at);

    match f.df {
        0 => {
            f.decode_vertical_status(m[0]);
            f.cross_link = Some((m[0] & 0x02) >> 1);
            f.sensitivity_level = Some((m[1] & 0xE0) >> 5);
            f.reply_information = Some(((m[1] & 0x07) << 1) | ((m[2] & 0x80) >> 7));
            f.decode_ac13_field(m[2], m[3]);
        }
        4 | 5 | 20 | 21 => {
            f.decode_flight_status(m[0]);
            f.downlink_request = Some((m[1] & 0xF8) >> 3);
            f.utility_message = Some(((m[1] & 0x07) << 3) | ((m[2] & 0xE0) >> 5));
            if matches!(f.df, 4 | 20) {
                f.decode_ac13_field(m[2], m[3]);
            } else {
                f.decode_squawk_field(m[2], m[3]);
            }
            if matches!(f.df, 20 | 21) {
                f.decode_comm_b(&m[4..11]);
            }
        }
        11 => f.decode_capability(m[0]),
        16 => {
            f.decode_vertical_status(m[0]);
            f.sensitivity_level = Some((m[1] & 0xE0) >> 5);
            f.reply_information = Some(((m[1] & 0x07) << 1) | ((m[2] & 0x80) >> 7));
            f.decode_ac13_field(m[2], m[3]);
        }
        17 => {
            f.decode_capability(m[0]);
            adsb::decode_extended_squitter(&mut f, &m[4..11]);
        }
        18 => {
            let cf = m[0] & 0x07;
            f.control_field = Some(cf);
            if cf == 0 {
                adsb::decode_extended_squitter(&mut f, &m[4..11]);
            }
        }
        _ => {}
    }

    f
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
