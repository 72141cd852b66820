//! Shared types, error enums, and lookup tables for squitter-core.

use std::fmt::Write;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by squitter-core.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("malformed frame: {0}")]
    Format(String),
    #[error("unsupported downlink format: {0}")]
    UnknownDf(u8),
    #[error("CRC mismatch on DF{df}: syndrome {syndrome:06X}")]
    Checksum { df: u8, syndrome: u32 },
    #[error("field not valid in this frame: {0}")]
    FieldNotValid(&'static str),
    #[error(transparent)]
    Cpr(#[from] CprError),
    #[error("invalid SBS1 line: {0}")]
    Sbs1(String),
    #[error("invalid Beast record: {0}")]
    Beast(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

/// Reasons a CPR pair could not be turned into a position.
///
/// All of these are recoverable: the aircraft keeps its last position and the
/// next complementary frame gets another chance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CprError {
    #[error("CPR decode needs both samples (even: {even}, odd: {odd})")]
    MissingSample { even: bool, odd: bool },
    #[error("CPR samples are {gap_secs:.1}s apart")]
    StaleFramePair { gap_secs: f64 },
    #[error("CPR samples straddle a longitude zone boundary (NL {even_nl} vs {odd_nl})")]
    InconsistentZone { even_nl: u8, odd_nl: u8 },
    #[error("surface CPR decode needs a non-zero reference position")]
    NoReference,
    #[error("raw CPR value {0} does not fit in 17 bits")]
    RawOutOfRange(u32),
    #[error("position out of range: {lat:.6}, {lon:.6}")]
    CoordinateRange { lat: f64, lon: f64 },
}

pub type Result<T> = std::result::Result<T, AdsbError>;

/// Unwrap a decoded field, failing closed when its validity flag is false.
pub(crate) fn valid<T>(field: Option<T>, name: &'static str) -> Result<T> {
    field.ok_or(AdsbError::FieldNotValid(name))
}

// ---------------------------------------------------------------------------
// Downlink Format metadata
// ---------------------------------------------------------------------------

/// Metadata for a Downlink Format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfInfo {
    pub name: &'static str,
    pub bits: usize,
}

/// Downlink Formats this decoder understands.
pub const DF_TABLE: &[(u8, DfInfo)] = &[
    (0, DfInfo { name: "Short air-air surveillance (ACAS)", bits: 56 }),
    (4, DfInfo { name: "Surveillance altitude reply", bits: 56 }),
    (5, DfInfo { name: "Surveillance identity reply", bits: 56 }),
    (11, DfInfo { name: "All-call reply", bits: 56 }),
    (16, DfInfo { name: "Long air-air surveillance (ACAS)", bits: 112 }),
    (17, DfInfo { name: "ADS-B extended squitter", bits: 112 }),
    (18, DfInfo { name: "TIS-B / ADS-R", bits: 112 }),
    (20, DfInfo { name: "Comm-B altitude reply", bits: 112 }),
    (21, DfInfo { name: "Comm-B identity reply", bits: 112 }),
    (24, DfInfo { name: "Comm-D extended length message", bits: 112 }),
];

/// Look up DF metadata. Returns `None` for unsupported DFs.
pub fn df_info(df: u8) -> Option<&'static DfInfo> {
    DF_TABLE
        .iter()
        .find(|(d, _)| *d == df)
        .map(|(_, info)| info)
}

// ---------------------------------------------------------------------------
// Text tables
// ---------------------------------------------------------------------------

/// Flight status (FS), DF4/5/20/21.
pub const FLIGHT_STATUS_TABLE: [&str; 8] = [
    "Normal, airborne",
    "Normal, on the ground",
    "Alert, airborne",
    "Alert, on the ground",
    "Alert, special position identification",
    "Normal, special position identification",
    "Not assigned",
    "Not assigned",
];

/// Emergency state, TC 28 subtype 1.
pub const EMERGENCY_TABLE: [&str; 8] = [
    "No emergency",
    "General emergency (squawk 7700)",
    "Lifeguard/medical",
    "Minimum fuel",
    "No communications (squawk 7600)",
    "Unlawful interference (squawk 7500)",
    "Downed aircraft",
    "Reserved",
];

/// Surveillance status, airborne position messages.
pub const SURVEILLANCE_STATUS_TABLE: [&str; 4] = [
    "No condition information",
    "Permanent alert (emergency condition)",
    "Temporary alert (identity change)",
    "SPI condition",
];

/// ADS-B version number, TC 31.
pub const ADSB_VERSION_TABLE: [&str; 8] = [
    "DO-260/ED-102 and DO-242",
    "DO-260A and DO-242A",
    "DO-260B/ED-102A and DO-242B",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

/// Emitter category by category set (`4 - TC`) and category code.
pub const AIRCRAFT_CATEGORY: [[&str; 8]; 4] = [
    [
        "No category information",
        "Light (< 15500 lbs)",
        "Small (15500 to 75000 lbs)",
        "Large (75000 to 300000 lbs)",
        "High vortex large",
        "Heavy (> 300000 lbs)",
        "High performance (> 5g and 400 kts)",
        "Rotorcraft",
    ],
    [
        "No category information",
        "Glider / sailplane",
        "Lighter-than-air",
        "Parachutist / skydiver",
        "Ultralight / hang-glider / paraglider",
        "Reserved",
        "Unmanned aerial vehicle",
        "Space / trans-atmospheric vehicle",
    ],
    [
        "No category information",
        "Surface vehicle, emergency",
        "Surface vehicle, service",
        "Point obstacle",
        "Cluster obstacle",
        "Line obstacle",
        "Reserved",
        "Reserved",
    ],
    ["Reserved"; 8],
];

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 24-bit ICAO aircraft address, most significant byte first.
pub type Icao = [u8; 3];

/// `4840D6` style uppercase hex.
pub fn icao_to_string(icao: &Icao) -> String {
    hex_encode(icao)
}

/// Parse exactly six hex digits.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    hex_decode(hex)?.try_into().ok()
}

/// Low 24 bits of `val` as an address.
pub fn icao_from_u32(val: u32) -> Icao {
    let [_, hi, mid, lo] = val.to_be_bytes();
    [hi, mid, lo]
}

/// Serialize an ICAO address as its hex string.
pub(crate) fn serialize_icao<S: serde::Serializer>(
    icao: &Icao,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&icao_to_string(icao))
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode hex (either case) into bytes. Odd lengths and non-hex fail.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}

/// Uppercase hex, two digits per byte.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().fold(String::with_capacity(data.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

// ---------------------------------------------------------------------------
// Callsign character set
// ---------------------------------------------------------------------------

/// AIS 6-bit character set used for callsigns. `#` marks unassigned codes.
pub const CALLSIGN_CHARSET: &[u8; 64] =
    b"#ABCDEFGHIJKLMNOPQRSTUVWXYZ##### ###############0123456789######";

/// Unpack eight 6-bit characters from 48 bits (6 bytes).
pub fn decode_callsign(bytes: &[u8]) -> String {
    let mut bits = 0u64;
    for &b in bytes.iter().take(6) {
        bits = (bits << 8) | b as u64;
    }
    (0..8)
        .map(|i| CALLSIGN_CHARSET[((bits >> (42 - i * 6)) & 0x3F) as usize] as char)
        .collect()
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current wall-clock time as Unix seconds.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Unit an altitude value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeUnit {
    Feet,
    Metres,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icao_roundtrip() {
        let icao = icao_from_hex("4840D6").unwrap();
        assert_eq!(icao, [0x48, 0x40, 0xD6]);
        assert_eq!(icao_to_string(&icao), "4840D6");
        assert!(icao_from_hex("4840D").is_none());
        assert!(icao_from_hex("+840D6").is_none(), "sign is not a hex digit");
        assert_eq!(icao_from_u32(0xAB4840D6), [0x48, 0x40, 0xD6]);
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode("4840d6"), Some(vec![0x48, 0x40, 0xD6]));
        assert_eq!(hex_decode("odd"), None); // odd length
        assert_eq!(hex_decode("ZZZZ"), None); // invalid chars
    }

    #[test]
    fn test_df_info() {
        assert_eq!(df_info(17).unwrap().name, "ADS-B extended squitter");
        assert_eq!(df_info(24).unwrap().bits, 112);
        assert!(df_info(19).is_none());
    }

    #[test]
    fn test_decode_callsign() {
        // ME bytes 1-6 of 8D4840D6202CC371C32CE0576098
        let cs = decode_callsign(&[0x2C, 0xC3, 0x71, 0xC3, 0x2C, 0xE0]);
        assert_eq!(cs, "KLM1023 ");
    }

    #[test]
    fn test_valid_fails_closed() {
        let err = valid::<i32>(None, "altitude").unwrap_err();
        assert!(matches!(err, AdsbError::FieldNotValid("altitude")));
        assert_eq!(valid(Some(5), "altitude").unwrap(), 5);
    }
}
