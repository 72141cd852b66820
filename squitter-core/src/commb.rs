//! Comm-B (DF20/21) register inference.
//!
//! The BDS number is not on the wire; the 56-bit MB field is matched against
//! the reserved-bit patterns of each register we know, in a fixed order.

use serde::Serialize;

use crate::types::decode_callsign;

/// Inferred Comm-B Data Selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "bds", rename_all = "snake_case")]
pub enum Bds {
    /// BDS 1.0, data link capability report.
    DataLinkCapability,
    /// BDS 1.7, common usage GICB capability report.
    GicbCapability,
    /// BDS 2.0, aircraft identification.
    Identification { callsign: String },
    /// BDS 3.0, ACAS active resolution advisory.
    AcasResolution,
    /// No known signature matched.
    Unknown,
}

impl Bds {
    /// Register number as printed in ICAO Doc 9871 (`"1.0"`, `"2.0"`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            Bds::DataLinkCapability => "1.0",
            Bds::GicbCapability => "1.7",
            Bds::Identification { .. } => "2.0",
            Bds::AcasResolution => "3.0",
            Bds::Unknown => "?",
        }
    }
}

/// Infer the register held in a 7-byte MB field.
pub fn infer_bds(mb: &[u8]) -> Bds {
    if mb.len() < 7 {
        return Bds::Unknown;
    }

    if mb[0] == 0x10 && mb[1] & 0x7C == 0 {
        return Bds::DataLinkCapability;
    }

    if mb[0] & 0x02 == 0x02 && mb[3] & 0x0F == 0 && mb[4..7].iter().all(|&b| b == 0) {
        return Bds::GicbCapability;
    }

    if mb[0] == 0x20 {
        let callsign = decode_callsign(&mb[1..7]);
        if !callsign.contains('#') {
            return Bds::Identification { callsign };
        }
    }

    // Threat type 3 is reserved; the RAC bits above 48 are never used.
    if mb[0] == 0x30 && mb[3] & 0x0C != 0x0C {
        let rac = ((((mb[1] as u16) << 8) | mb[2] as u16) >> 2) & 0x7F;
        if rac < 48 {
            return Bds::AcasResolution;
        }
    }

    Bds::Unknown
}
