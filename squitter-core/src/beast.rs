//! Binary Beast (Mode-S Beast / Radarcape) record decoding.
//!
//! Record layout after unescaping:
//! - `0x1A` sync byte
//! - type: `0x31` Mode A/C, `0x32` Mode S short, `0x33` Mode S long,
//!   `0x34` receiver status
//! - 6-byte MLAT counter (big-endian, 500 ns ticks)
//! - 1-byte signal level
//! - payload (2, 7, 14 or 14 bytes by type)
//!
//! On the wire every `0x1A` inside a record is doubled. Mode S records are
//! converted to the `@` text form and decoded like any other line.

use std::fmt;

use tracing::debug;

use crate::types::{hex_encode, AdsbError, Result};

const ESCAPE: u8 = 0x1A;
const HEADER_BYTES: usize = 2;
const TIMESTAMP_BYTES: usize = 6;
const SIGNAL_BYTES: usize = 1;

/// Counter value some receivers put on synthetic MLAT results ("\xFF\0MLAT").
const MAGIC_MLAT_TIMESTAMP: [u8; TIMESTAMP_BYTES] = [0xFF, 0x00, 0x4D, 0x4C, 0x41, 0x54];

/// Beast record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeastKind {
    ModeAc,
    ModeSShort,
    ModeSLong,
    Status,
}

impl BeastKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x31 => Some(BeastKind::ModeAc),
            0x32 => Some(BeastKind::ModeSShort),
            0x33 => Some(BeastKind::ModeSLong),
            0x34 => Some(BeastKind::Status),
            _ => None,
        }
    }

    /// Payload length in bytes.
    pub fn payload_len(self) -> usize {
        match self {
            BeastKind::ModeAc => 2,
            BeastKind::ModeSShort => 7,
            BeastKind::ModeSLong | BeastKind::Status => 14,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BeastKind::ModeAc => "MODE_AC",
            BeastKind::ModeSShort => "MODE_S_SHORT",
            BeastKind::ModeSLong => "MODE_S_LONG",
            BeastKind::Status => "RADARCAPE_STATUS",
        }
    }
}

/// One unescaped Beast record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeastRecord {
    pub kind: BeastKind,
    /// 48-bit MLAT counter.
    pub mlat_ticks: u64,
    pub signal: u8,
    pub payload: Vec<u8>,
}

impl BeastRecord {
    /// True for results computed by an MLAT server rather than received.
    pub fn is_synthetic_mlat(&self) -> bool {
        self.mlat_ticks.to_be_bytes()[2..] == MAGIC_MLAT_TIMESTAMP
    }

    /// `@TTTTTTTTTTTTHEX;` for Mode S records, `None` otherwise.
    pub fn to_avr_line(&self) -> Option<String> {
        match self.kind {
            BeastKind::ModeSShort | BeastKind::ModeSLong => Some(format!(
                "@{:012X}{};",
                self.mlat_ticks,
                hex_encode(&self.payload)
            )),
            BeastKind::ModeAc | BeastKind::Status => None,
        }
    }
}

impl fmt::Display for BeastRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: {:<16} Time: {:012X} Signal {:03} Data: {}",
            self.kind.name(),
            self.mlat_ticks,
            self.signal,
            hex_encode(&self.payload)
        )
    }
}

/// Parse a single record that has already been unescaped.
pub fn parse_record(raw: &[u8]) -> Result<BeastRecord> {
    if raw.first() != Some(&ESCAPE) {
        return Err(AdsbError::Beast("record does not start with 0x1A".into()));
    }
    let kind = raw
        .get(1)
        .and_then(|&b| BeastKind::from_byte(b))
        .ok_or_else(|| AdsbError::Beast(format!("unknown record type {:02X?}", raw.get(1))))?;

    let body = &raw[HEADER_BYTES..];
    let expected = TIMESTAMP_BYTES + SIGNAL_BYTES + kind.payload_len();
    if body.len() != expected {
        return Err(AdsbError::Beast(format!(
            "{} record is {} bytes, expected {expected}",
            kind.name(),
            body.len()
        )));
    }

    let mlat_ticks = body[..TIMESTAMP_BYTES]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);

    Ok(BeastRecord {
        kind,
        mlat_ticks,
        signal: body[TIMESTAMP_BYTES],
        payload: body[TIMESTAMP_BYTES + SIGNAL_BYTES..].to_vec(),
    })
}

// ---------------------------------------------------------------------------
// Stream decoding
// ---------------------------------------------------------------------------

enum Scan {
    /// Unescaped record and the number of wire bytes it used.
    Complete(Vec<u8>, usize),
    /// Need more bytes.
    Incomplete,
    /// A new record began at this offset before this one finished.
    Truncated(usize),
}

/// Unescape the record starting at `buf[0]` (the sync byte).
fn scan_record(buf: &[u8], kind: BeastKind) -> Scan {
    let need = HEADER_BYTES + TIMESTAMP_BYTES + SIGNAL_BYTES + kind.payload_len();
    let mut out = Vec::with_capacity(need);
    out.extend_from_slice(&buf[..HEADER_BYTES]);

    let mut i = HEADER_BYTES;
    while out.len() < need {
        let Some(&b) = buf.get(i) else {
            return Scan::Incomplete;
        };
        if b == ESCAPE {
            match buf.get(i + 1) {
                None => return Scan::Incomplete,
                Some(&ESCAPE) => {
                    out.push(ESCAPE);
                    i += 2;
                }
                Some(_) => return Scan::Truncated(i),
            }
        } else {
            out.push(b);
            i += 1;
        }
    }
    Scan::Complete(out, i)
}

/// Incremental decoder for a Beast byte stream.
///
/// Bytes can arrive in arbitrary chunks; partial records are held until the
/// rest shows up.
#[derive(Debug, Default)]
pub struct BeastDecoder {
    buf: Vec<u8>,
}

impl BeastDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for the rest of a record.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append `data` and return every record that is now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<BeastRecord> {
        self.buf.extend_from_slice(data);

        let mut records = Vec::new();
        let mut pos = 0;
        while let Some(offset) = self.buf[pos..].iter().position(|&b| b == ESCAPE) {
            let start = pos + offset;
            let Some(&type_byte) = self.buf.get(start + 1) else {
                pos = start;
                break;
            };
            let Some(kind) = BeastKind::from_byte(type_byte) else {
                // Stray escaped byte or garbage; resync on the next 0x1A.
                pos = start + 1;
                continue;
            };

            match scan_record(&self.buf[start..], kind) {
                Scan::Complete(raw, used) => {
                    match parse_record(&raw) {
                        Ok(record) => records.push(record),
                        Err(e) => debug!(error = %e, "dropping Beast record"),
                    }
                    pos = start + used;
                }
                Scan::Incomplete => {
                    pos = start;
                    break;
                }
                Scan::Truncated(next) => {
                    debug!(kind = kind.name(), "truncated Beast record");
                    pos = start + next;
                }
            }
        }

        // Nothing before `pos` can start a record any more.
        let keep_from = if self.buf[pos..].contains(&ESCAPE) {
            pos
        } else {
            self.buf.len()
        };
        self.buf.drain(..keep_from);
        records
    }
}
