//! Altitude and identity codes.
//!
//! Two altitude layouts appear on the downlink:
//! - AC13 (DF0/4/16/20): 13 bits with an M-bit (metres) and a Q-bit (25 ft)
//! - AC12 (DF17/18 airborne position): 12 bits, Q-bit only
//!
//! With Q clear both fall back to 100 ft Gillham (Mode C) encoding: the bits
//! are reordered into one packed gray code and converted to feet.

use serde::Serialize;

use crate::types::AltitudeUnit;

/// Which encoding produced an altitude value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AltitudeEncoding {
    /// Q-bit set: `n * 25 - 1000` ft.
    Linear25Ft,
    /// Q-bit clear: 100 ft Gillham gray code.
    Gillham,
    /// GNSS height (TC 20-22), converted from metres.
    Gnss,
    /// Already decoded upstream (SBS1 feeds).
    Reported,
}

/// A decoded altitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Altitude {
    pub value: i32,
    pub unit: AltitudeUnit,
    pub encoding: AltitudeEncoding,
}

impl Altitude {
    pub fn feet(value: i32, encoding: AltitudeEncoding) -> Self {
        Altitude {
            value,
            unit: AltitudeUnit::Feet,
            encoding,
        }
    }
}

const FEET_PER_METRE: f64 = 3.28084;

// ---------------------------------------------------------------------------
// Gillham (Mode C)
// ---------------------------------------------------------------------------

// Bit of the 13-bit field -> bit of the Gillham code, packed
// D2 D4 A1 A2 A4 B1 B2 B4 C1 C2 C4 from the top. M and Q/D1 are dropped.
const AC13_TO_GILLHAM: [(u32, u32); 11] = [
    (0x0004, 0x400), // D2
    (0x0001, 0x200), // D4
    (0x0800, 0x100), // A1
    (0x0200, 0x080), // A2
    (0x0080, 0x040), // A4
    (0x0020, 0x020), // B1
    (0x0008, 0x010), // B2
    (0x0002, 0x008), // B4
    (0x1000, 0x004), // C1
    (0x0400, 0x002), // C2
    (0x0100, 0x001), // C4
];

/// Reorder a 13-bit altitude field (C1 A1 C2 A2 C4 A4 M B1 Q B2 D2 B4 D4)
/// into a packed Gillham code.
pub fn gillham_code(field: u32) -> u32 {
    AC13_TO_GILLHAM
        .iter()
        .filter(|(src, _)| field & src != 0)
        .fold(0, |acc, (_, dst)| acc | dst)
}

/// Convert a packed Gillham code to feet.
///
/// Gray to binary on the 500 ft part, then the 100 ft part is folded so it
/// counts up and down on alternate 500 ft bands. Codes whose C bits are not
/// a legal 100 ft step (none set, C1+C4, all three) return `None`.
pub fn gillham_to_altitude(code: u32) -> Option<i32> {
    if matches!(code & 0x7, 0 | 5 | 7) {
        return None;
    }
    let gray = code as i32;
    let mut t = gray ^ (gray >> 8);
    t ^= t >> 4;
    t ^= t >> 2;
    t ^= t >> 1;
    t -= ((t >> 4) * 6) + (((t % 16) / 5) * 2);
    Some((t - 13) * 100)
}

// ---------------------------------------------------------------------------
// Altitude fields
// ---------------------------------------------------------------------------

/// Decode the 13-bit AC field (DF0/4/16/20).
///
/// Returns the unit the field is expressed in, plus the altitude when one can
/// be derived. Metric altitudes report `Metres` with no value.
pub fn decode_ac13(field: u32) -> (AltitudeUnit, Option<Altitude>) {
    if field & 0x0040 != 0 {
        return (AltitudeUnit::Metres, None);
    }

    if field & 0x0010 != 0 {
        let n = ((field & 0x1F80) >> 2) | ((field & 0x0020) >> 1) | (field & 0x000F);
        let alt = Altitude::feet(n as i32 * 25 - 1000, AltitudeEncoding::Linear25Ft);
        return (AltitudeUnit::Feet, Some(alt));
    }

    let alt = gillham_to_altitude(gillham_code(field))
        .map(|feet| Altitude::feet(feet, AltitudeEncoding::Gillham));
    (AltitudeUnit::Feet, alt)
}

/// Decode the 12-bit AC field of an airborne position message.
///
/// Zero means altitude information is unavailable.
pub fn decode_ac12(field: u32) -> Option<Altitude> {
    if field == 0 {
        return None;
    }

    if field & 0x0010 != 0 {
        let n = ((field & 0x0FE0) >> 1) | (field & 0x000F);
        return Some(Altitude::feet(n as i32 * 25 - 1000, AltitudeEncoding::Linear25Ft));
    }

    // Re-insert the M-bit position so the 13-bit reordering applies.
    let n = ((field & 0x0FC0) << 1) | (field & 0x003F);
    gillham_to_altitude(gillham_code(n))
        .map(|feet| Altitude::feet(feet, AltitudeEncoding::Gillham))
}

/// GNSS height (TC 20-22): the 12-bit field carries metres.
pub fn decode_gnss_height(field: u32) -> Option<Altitude> {
    if field == 0 {
        return None;
    }
    let feet = (field as f64 * FEET_PER_METRE) as i32;
    Some(Altitude::feet(feet, AltitudeEncoding::Gnss))
}

// ---------------------------------------------------------------------------
// Identity (squawk)
// ---------------------------------------------------------------------------

/// Decode a 13-bit identity field into the four octal digits of the squawk,
/// packed as a decimal number (`7700`, `1200`, ...).
///
/// Bits are labeled C1 A1 C2 A2 C4 A4 X B1 D1 B2 D2 B4 D4.
pub fn decode_identity(id13: u32) -> u16 {
    let bit = |n: u32| ((id13 >> n) & 1) as u16;

    let a = bit(7) * 4 + bit(9) * 2 + bit(11);
    let b = bit(1) * 4 + bit(3) * 2 + bit(5);
    let c = bit(8) * 4 + bit(10) * 2 + bit(12);
    let d = bit(0) * 4 + bit(2) * 2 + bit(4);

    a * 1000 + b * 100 + c * 10 + d
}

/// Pull the 13-bit field that straddles two bytes (`hi & 0x1F`, `lo`).
pub fn field13(hi: u8, lo: u8) -> u32 {
    ((hi as u32 & 0x1F) << 8) | lo as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gillham_table() {
        let table: &[(u32, i32)] = &[
            (2, -1000),
            (6, -900),
            (4, -800),
            (12, -700),
            (14, -600),
            (10, -500),
            (11, -400),
            (9, -300),
            (25, -200),
            (27, -100),
            (26, 0),
            (30, 100),
            (28, 200),
            (20, 300),
            (22, 400),
            (18, 500),
            (19, 600),
            (17, 700),
            (49, 800),
            (51, 900),
            (50, 1000),
            (54, 1100),
            (52, 1200),
            (900, 46300),
            (1780, 73200),
            (1027, 126600),
            (1025, 126700),
        ];
        for &(code, feet) in table {
            assert_eq!(gillham_to_altitude(code), Some(feet), "gillham({code})");
        }
    }

    #[test]
    fn test_gillham_code_reorders_bits() {
        assert_eq!(gillham_code(0x1000), 0x004, "C1");
        assert_eq!(gillham_code(0x0004), 0x400, "D2");
        assert_eq!(gillham_code(0x0001), 0x200, "D4");
        // M and Q/D1 do not map anywhere
        assert_eq!(gillham_code(0x0050), 0);
    }

    #[test]
    fn test_gillham_rejects_illegal_codes() {
        assert_eq!(gillham_to_altitude(0), None, "no C bits");
        assert_eq!(gillham_to_altitude(0x005), None, "C1 and C4");
        assert_eq!(gillham_to_altitude(0x107), None, "C1 C2 C4 is not a 100 ft step");
    }

    #[test]
    fn test_ac13_linear() {
        // DF0 00050319AB8C22
        let (unit, alt) = decode_ac13(field13(0x03, 0x19));
        assert_eq!(unit, AltitudeUnit::Feet);
        let alt = alt.unwrap();
        assert_eq!(alt.value, 4025);
        assert_eq!(alt.encoding, AltitudeEncoding::Linear25Ft);
    }

    #[test]
    fn test_ac13_metric_has_no_value() {
        let (unit, alt) = decode_ac13(0x0040 | 0x0010);
        assert_eq!(unit, AltitudeUnit::Metres);
        assert!(alt.is_none(), "metric altitude must not be reported as feet");
    }

    #[test]
    fn test_ac13_gillham() {
        // DF0 000005084A3646: C4 B2 with Q clear
        let (unit, alt) = decode_ac13(field13(0x05, 0x08));
        assert_eq!(unit, AltitudeUnit::Feet);
        assert_eq!(alt, Some(Altitude::feet(600, AltitudeEncoding::Gillham)));

        // Same code through the 12-bit layout
        assert_eq!(
            decode_ac12(0x288).map(|a| a.value),
            Some(600),
            "AC12 and AC13 share one Gillham path"
        );
        assert_eq!(decode_ac13(0x1800).1.map(|a| a.value), Some(30300), "C1 A1");
        assert_eq!(decode_ac13(0x0800).1, None, "no C bit is not an altitude");
    }

    #[test]
    fn test_ac12_linear_38000() {
        let alt = decode_ac12(0xC38).unwrap();
        assert_eq!(alt.value, 38000);
        assert_eq!(alt.encoding, AltitudeEncoding::Linear25Ft);
    }

    #[test]
    fn test_ac12_zero_is_unavailable() {
        assert!(decode_ac12(0).is_none());
    }

    #[test]
    fn test_ac12_gillham_range() {
        for code in 0..0x1000u32 {
            if code & 0x10 != 0 {
                continue;
            }
            if let Some(alt) = decode_ac12(code) {
                assert!(
                    (-1200..=126_700).contains(&alt.value),
                    "code 0x{code:03X} gave {} ft",
                    alt.value
                );
            }
        }
    }

    #[test]
    fn test_gnss_height_converted_to_feet() {
        let alt = decode_gnss_height(1000).unwrap();
        assert_eq!(alt.value, 3280);
        assert_eq!(alt.encoding, AltitudeEncoding::Gnss);
    }

    #[test]
    fn test_identity_emergency_codes() {
        assert_eq!(decode_identity(0b0_1_0_1_0_1_0_1_0_0_0_1_0), 7500);
        assert_eq!(decode_identity(0b0_1_0_1_0_1_0_0_0_1_0_1_0), 7600);
        assert_eq!(decode_identity(0b0_1_0_1_0_1_0_1_0_1_0_1_0), 7700);
    }

    #[test]
    fn test_identity_df5_vector() {
        // DF5 28001B1F2181F6
        assert_eq!(decode_identity(field13(0x1B, 0x1F)), 3657);
    }
}
