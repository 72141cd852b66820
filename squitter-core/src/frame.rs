//! Normalize raw text lines into Mode S frames.
//!
//! Responsibilities:
//! - Strip `*` (plain AVR) or `@` + 12 hex-digit MLAT tick prefixes and `;`
//! - Detect all-zero heartbeats (returned as `None`, not an error)
//! - Classify Downlink Format (DF), including the DF24 special case
//! - Check the DF-implied length against the payload
//! - Verify CRC for DF11/17/18, recover the address from the residual otherwise

use std::time::Duration;

use serde::Serialize;

use crate::crc;
use crate::types::{df_info, hex_decode, AdsbError, Icao, Result};

/// Each MLAT tick is 500 ns since receiver power on.
pub const MLAT_TICK_NANOS: u64 = 500;

const SHORT_FRAME_BYTES: usize = 7;
const LONG_FRAME_BYTES: usize = 14;
const MLAT_PREFIX_CHARS: usize = 12;
const MAX_NOOP_CHARS: usize = 16;

/// How the line was framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportMode {
    /// `*HEX;` or bare hex.
    Normal,
    /// `@TTTTTTTTTTTTHEX;` with a receiver tick count.
    Mlat,
}

// ---------------------------------------------------------------------------
// RawFrame
// ---------------------------------------------------------------------------

/// A Mode S frame that passed length, DF and CRC checks.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Line as received, whitespace and `;` trimmed.
    pub text: String,
    pub mode: TransportMode,
    /// MLAT tick count for `@` lines.
    pub mlat_ticks: Option<u64>,
    /// Message bytes (7 or 14).
    pub bytes: Vec<u8>,
    /// Downlink Format.
    pub df: u8,
    /// Address from bytes 1-3 or the CRC residual. Zero for DF18 non-ICAO.
    pub icao: Icao,
}

impl RawFrame {
    /// Human-readable Downlink Format name.
    pub fn df_name(&self) -> &'static str {
        df_info(self.df).map(|info| info.name).unwrap_or("Unknown")
    }

    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.bytes.len() == LONG_FRAME_BYTES
    }

    /// Message Extended field (bytes 4-10). Empty for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() {
            &self.bytes[4..11]
        } else {
            &[]
        }
    }

    /// ADS-B Type Code (first 5 bits of ME). None for non-ADS-B.
    pub fn type_code(&self) -> Option<u8> {
        if !matches!(self.df, 17 | 18) || !self.is_long() {
            return None;
        }
        Some(self.bytes[4] >> 3)
    }

    /// Time since receiver power on, from the MLAT tick count.
    pub fn mlat_elapsed(&self) -> Option<Duration> {
        self.mlat_ticks
            .map(|ticks| Duration::from_nanos(ticks.saturating_mul(MLAT_TICK_NANOS)))
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// True if `payload` is an all-zero heartbeat, optionally led by `*` or `@`.
pub fn is_noop(payload: &str) -> bool {
    let digits = payload
        .strip_prefix('*')
        .or_else(|| payload.strip_prefix('@'))
        .unwrap_or(payload);
    payload.len() <= MAX_NOOP_CHARS && !digits.is_empty() && digits.bytes().all(|b| b == b'0')
}

/// Downlink Format from the first byte. DF24 only needs the top two bits.
pub fn downlink_format(first: u8) -> u8 {
    if first & 0xC0 == 0xC0 {
        24
    } else {
        first >> 3
    }
}

/// Parse one text line into a frame.
///
/// `Ok(None)` is a heartbeat. Anything malformed is an error; nothing here
/// panics on arbitrary input.
pub fn parse_frame(line: &str) -> Result<Option<RawFrame>> {
    let text = line.trim_matches(|c: char| c.is_whitespace() || c == ';');
    if text.is_empty() {
        return Err(AdsbError::Format("empty frame".into()));
    }
    if text.len() < 2 * SHORT_FRAME_BYTES {
        return Err(AdsbError::Format(format!(
            "{text:?} is too short to be a Mode S frame"
        )));
    }

    let (mode, mlat_ticks, payload) = if let Some(rest) = text.strip_prefix('@') {
        let ticks = rest
            .get(..MLAT_PREFIX_CHARS)
            .and_then(|t| u64::from_str_radix(t, 16).ok())
            .ok_or_else(|| AdsbError::Format(format!("bad MLAT timestamp in {text:?}")))?;
        let payload = rest.get(MLAT_PREFIX_CHARS..).unwrap_or_default();
        (TransportMode::Mlat, Some(ticks), payload)
    } else {
        let payload = text.strip_prefix('*').unwrap_or(text);
        (TransportMode::Normal, None, payload)
    };

    if is_noop(payload) {
        return Ok(None);
    }

    let bytes = hex_decode(payload)
        .ok_or_else(|| AdsbError::Format(format!("{payload:?} is not hex")))?;
    if bytes.len() != SHORT_FRAME_BYTES && bytes.len() != LONG_FRAME_BYTES {
        return Err(AdsbError::Format(format!(
            "frame is {} bytes, expected {SHORT_FRAME_BYTES} or {LONG_FRAME_BYTES}",
            bytes.len()
        )));
    }

    let df = downlink_format(bytes[0]);
    let info = df_info(df).ok_or(AdsbError::UnknownDf(df))?;
    let expected = info.bits / 8;
    if bytes.len() != expected {
        return Err(AdsbError::Format(format!(
            "DF{df} needs {expected} bytes, got {}",
            bytes.len()
        )));
    }

    let remainder = crc::crc24(&bytes);
    let icao = match df {
        11 | 17 | 18 => {
            if remainder != 0 {
                return Err(AdsbError::Checksum {
                    df,
                    syndrome: remainder,
                });
            }
            // DF18 with CF != 0 carries a non-ICAO or anonymous address.
            if df == 18 && bytes[0] & 0x07 != 0 {
                [0, 0, 0]
            } else {
                [bytes[1], bytes[2], bytes[3]]
            }
        }
        _ => crc::residual_icao(&bytes),
    };

    Ok(Some(RawFrame {
        text: text.to_string(),
        mode,
        mlat_ticks,
        bytes,
        df,
        icao,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
