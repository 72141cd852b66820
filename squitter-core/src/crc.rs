//! CRC-24 parity for Mode S frames.
//!
//! ICAO standard polynomial: x^24 + x^23 + x^22 + ... + x^10 + x^3 + 1
//! Generator: 0xFFF409
//!
//! - DF11/17/18: last 24 bits are pure parity. Valid frames reduce to 0.
//! - DF0/4/5/16/20/21/24: last 24 bits are parity XOR'd with the address,
//!   so the residual *is* the address and cannot be checked on its own.

use crate::types::{icao_from_u32, Icao};

const GENERATOR: u32 = 0xFFF409;
const MASK: u32 = 0xFF_FFFF;
const TOP_BIT: u32 = 0x80_0000;
const PARITY_BYTES: usize = 3;

/// Remainder of each byte value pushed through the generator.
static TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut rem = (byte as u32) << 16;
        let mut i = 0;
        while i < 8 {
            rem = if rem & TOP_BIT != 0 {
                (rem << 1) ^ GENERATOR
            } else {
                rem << 1
            };
            i += 1;
        }
        table[byte] = rem & MASK;
        byte += 1;
    }
    table
};

/// Mode S CRC-24 syndrome.
///
/// Divides everything but the last three bytes, then XORs the result with
/// those three (the parity field). Inputs of three bytes or fewer come back
/// unchanged as a 24-bit value.
pub fn crc24(data: &[u8]) -> u32 {
    let (payload, parity) = data.split_at(data.len().saturating_sub(PARITY_BYTES));
    let remainder = payload.iter().fold(0u32, |rem, &b| {
        let index = ((rem >> 16) as u8 ^ b) as usize;
        ((rem << 8) ^ TABLE[index]) & MASK
    });
    remainder ^ be24(parity)
}

fn be24(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) & MASK
}

/// Recover the address overlaid on the parity field.
///
/// Only meaningful for DF0/4/5/16/20/21/24.
pub fn residual_icao(data: &[u8]) -> Icao {
    icao_from_u32(crc24(data))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    const VALID_FRAMES: &[&str] = &[
        "8D4840D6202CC371C32CE0576098",
        "8D40621D58C382D690C8AC2863A7",
        "8D485020994409940838175B284F",
        "8D76AA735893E7E3F1FC2A112A9D",
        "8C4841753AAB238733C8CD4020B1",
    ];

    #[test]
    fn test_table_entries() {
        assert_eq!(TABLE[0], 0);
        assert_eq!(TABLE[1], GENERATOR, "one byte of 0x01 leaves the generator itself");
    }

    #[test]
    fn test_short_input_passes_through() {
        assert_eq!(crc24(&[]), 0);
        assert_eq!(crc24(&[0x12, 0x34, 0x56]), 0x123456);
    }

    #[test]
    fn test_valid_df17_remainder_zero() {
        for hex in VALID_FRAMES {
            let data = hex_decode(hex).unwrap();
            assert_eq!(crc24(&data), 0, "CRC should be 0 for valid DF17: {hex}");
        }
    }

    #[test]
    fn test_any_single_bit_flip_detected() {
        let data = hex_decode(VALID_FRAMES[0]).unwrap();
        for bit in 0..data.len() * 8 {
            let mut flipped = data.clone();
            flipped[bit / 8] ^= 1 << (7 - (bit % 8));
            assert_ne!(crc24(&flipped), 0, "flipping bit {bit} should break the CRC");
        }
    }

    #[test]
    fn test_residual_icao_short_frames() {
        let df0 = hex_decode("00050319AB8C22").unwrap();
        assert_eq!(residual_icao(&df0), [0x7C, 0x7B, 0x5A]);

        let df4 = hex_decode("210000992F8C48").unwrap();
        assert_eq!(residual_icao(&df4), [0x7C, 0x75, 0x39]);
    }
}
