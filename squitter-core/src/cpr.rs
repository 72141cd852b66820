//! Compact Position Reporting (CPR) resolution.
//!
//! Each aircraft owns one [`CprResolver`] holding at most one pending even
//! and one pending odd sample. Once both are present, [`CprResolver::decode`]
//! resolves a position and consumes both samples, whether it succeeds or not.
//!
//! Two decode modes:
//! - Airborne (global): 360 degree zones, no reference needed.
//! - Surface: 90 degree zones, needs a reference position to pick the
//!   quadrant.
//!
//! Key constants:
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = span / 60, Dlat_odd = span / 59
//! - Samples more than 10 seconds apart are never paired.

use serde::Serialize;

use crate::types::CprError;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// 2^17, the CPR coordinate scale.
const CPR_SCALE: f64 = (1u32 << NB) as f64;

/// Largest raw CPR value.
pub const MAX_RAW: u32 = (1 << NB) - 1;

/// Maximum time between even/odd samples (seconds).
pub const MAX_PAIR_AGE: f64 = 10.0;

const AIRBORNE_SPAN: f64 = 360.0;
const SURFACE_SPAN: f64 = 90.0;

/// Latitude below which NL zones apply, from NL = 59 down to 2 (1090-WP-9-14).
const NL_TABLE: [f64; 58] = [
    10.470_471_30,
    14.828_174_37,
    18.186_263_57,
    21.029_394_93,
    23.545_044_87,
    25.829_247_07,
    27.938_987_10,
    29.911_356_86,
    31.772_097_08,
    33.539_934_36,
    35.228_995_98,
    36.850_251_08,
    38.412_418_92,
    39.922_566_84,
    41.386_518_32,
    42.809_140_12,
    44.194_549_51,
    45.546_267_23,
    46.867_332_52,
    48.160_391_28,
    49.427_764_39,
    50.671_501_66,
    51.893_424_69,
    53.095_161_53,
    54.278_174_72,
    55.443_784_44,
    56.593_187_56,
    57.727_473_54,
    58.847_637_76,
    59.954_592_77,
    61.049_177_74,
    62.132_166_59,
    63.204_274_79,
    64.266_165_23,
    65.318_453_10,
    66.361_710_08,
    67.396_467_74,
    68.423_220_22,
    69.442_426_31,
    70.454_510_75,
    71.459_864_73,
    72.458_845_45,
    73.451_774_42,
    74.438_934_16,
    75.420_562_57,
    76.396_843_91,
    77.367_894_61,
    78.333_740_83,
    79.294_282_25,
    80.249_232_13,
    81.198_013_49,
    82.139_569_81,
    83.071_994_45,
    83.991_735_63,
    84.891_661_91,
    85.755_416_21,
    86.535_369_98,
    87.0,
];

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 59 at the equator to 1 near the poles.
pub fn nl(lat: f64) -> u8 {
    let lat = lat.abs();
    NL_TABLE
        .iter()
        .position(|&bound| lat < bound)
        .map(|i| 59 - i as u8)
        .unwrap_or(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One raw CPR sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CprSample {
    pub lat: u32,
    pub lon: u32,
    /// Capture time, Unix seconds.
    pub t: f64,
}

impl CprSample {
    fn new(lat: u32, lon: u32, t: f64) -> Result<Self, CprError> {
        if lat > MAX_RAW {
            return Err(CprError::RawOutOfRange(lat));
        }
        if lon > MAX_RAW {
            return Err(CprError::RawOutOfRange(lon));
        }
        Ok(CprSample { lat, lon, t })
    }
}

/// A decoded position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPosition {
    pub lat: f64,
    pub lon: f64,
    pub on_ground: bool,
}

/// Pending odd/even samples for one aircraft.
#[derive(Debug, Clone, Default)]
pub struct CprResolver {
    even: Option<CprSample>,
    odd: Option<CprSample>,
}

impl CprResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an even sample, replacing any earlier one.
    pub fn set_even(&mut self, lat: u32, lon: u32, t: f64) -> Result<(), CprError> {
        self.even = Some(CprSample::new(lat, lon, t)?);
        Ok(())
    }

    /// Store an odd sample, replacing any earlier one.
    pub fn set_odd(&mut self, lat: u32, lon: u32, t: f64) -> Result<(), CprError> {
        self.odd = Some(CprSample::new(lat, lon, t)?);
        Ok(())
    }

    pub fn even(&self) -> Option<&CprSample> {
        self.even.as_ref()
    }

    pub fn odd(&self) -> Option<&CprSample> {
        self.odd.as_ref()
    }

    /// True once both samples are present.
    pub fn can_decode(&self) -> bool {
        self.even.is_some() && self.odd.is_some()
    }

    pub fn clear(&mut self) {
        self.even = None;
        self.odd = None;
    }

    /// Resolve the pending pair.
    ///
    /// With a sample missing nothing is consumed and `MissingSample` is
    /// returned. Otherwise both samples are cleared before the result is
    /// known, so a failed pair is never retried.
    ///
    /// `ref_lat`/`ref_lon` are only used (and required non-zero) for surface
    /// positions.
    pub fn decode(
        &mut self,
        on_ground: bool,
        ref_lat: f64,
        ref_lon: f64,
    ) -> Result<ResolvedPosition, CprError> {
        let (Some(even), Some(odd)) = (self.even, self.odd) else {
            return Err(CprError::MissingSample {
                even: self.even.is_some(),
                odd: self.odd.is_some(),
            });
        };
        self.clear();

        if on_ground {
            if ref_lat == 0.0 && ref_lon == 0.0 {
                return Err(CprError::NoReference);
            }
            decode_pair(&even, &odd, Some((ref_lat, ref_lon)))
        } else {
            decode_pair(&even, &odd, None)
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decode an even/odd pair. `reference` selects surface mode.
pub fn decode_pair(
    even: &CprSample,
    odd: &CprSample,
    reference: Option<(f64, f64)>,
) -> Result<ResolvedPosition, CprError> {
    let span = if reference.is_some() {
        SURFACE_SPAN
    } else {
        AIRBORNE_SPAN
    };

    let lat_even = even.lat as f64 / CPR_SCALE;
    let lat_odd = odd.lat as f64 / CPR_SCALE;
    let lon_even = even.lon as f64 / CPR_SCALE;
    let lon_odd = odd.lon as f64 / CPR_SCALE;

    // Latitude zone index
    let j = (59.0 * lat_even - 60.0 * lat_odd + 0.5).floor();

    let mut rlat0 = span / 60.0 * (modulo(j, 60.0) + lat_even);
    let mut rlat1 = span / 59.0 * (modulo(j, 59.0) + lat_odd);

    match reference {
        None => {
            // Southern hemisphere comes out as 270..360
            if rlat0 >= 270.0 {
                rlat0 -= 360.0;
            }
            if rlat1 >= 270.0 {
                rlat1 -= 360.0;
            }
        }
        Some((ref_lat, _)) => {
            rlat0 = nearest_surface_quadrant(rlat0, ref_lat);
            rlat1 = nearest_surface_quadrant(rlat1, ref_lat);
            if !(-90.0..=90.0).contains(&rlat0) || !(-90.0..=90.0).contains(&rlat1) {
                let lat = if (-90.0..=90.0).contains(&rlat0) { rlat1 } else { rlat0 };
                return Err(CprError::CoordinateRange { lat, lon: 0.0 });
            }
        }
    }

    let nl0 = nl(rlat0);
    let nl1 = nl(rlat1);
    if nl0 != nl1 {
        return Err(CprError::InconsistentZone {
            even_nl: nl0,
            odd_nl: nl1,
        });
    }

    let gap = (even.t - odd.t).abs();
    if gap > MAX_PAIR_AGE {
        return Err(CprError::StaleFramePair { gap_secs: gap });
    }

    // The later sample is the basis; a tie goes to even.
    let use_odd = odd.t > even.t;
    let zones = nl0 as f64;
    let n = (zones - if use_odd { 1.0 } else { 0.0 }).max(1.0);
    let m = (lon_even * (zones - 1.0) - lon_odd * zones + 0.5).floor();
    let (lat, basis_lon) = if use_odd {
        (rlat1, lon_odd)
    } else {
        (rlat0, lon_even)
    };
    let mut lon = span / n * (modulo(m, n) + basis_lon);

    match reference {
        Some((_, ref_lon)) => {
            // Move towards the reference in 90 degree steps, then wrap
            // into (-180, 180].
            lon += ((ref_lon - lon + 45.0) / 90.0).floor() * 90.0;
            lon -= ((lon - 180.0) / 360.0).ceil() * 360.0;
        }
        None => {
            if lon > 180.0 {
                lon -= 360.0;
            }
        }
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(CprError::CoordinateRange { lat, lon });
    }

    Ok(ResolvedPosition {
        lat,
        lon,
        on_ground: reference.is_some(),
    })
}

/// Pick the surface latitude solution closest to the reference latitude.
///
/// Only -90..0 and 0..90 are valid. -90, 0 and +90 all encode to zero.
fn nearest_surface_quadrant(rlat: f64, ref_lat: f64) -> f64 {
    if rlat == 0.0 {
        if ref_lat < -45.0 {
            -90.0
        } else if ref_lat > 45.0 {
            90.0
        } else {
            0.0
        }
    } else if rlat - ref_lat > 45.0 {
        rlat - 90.0
    } else {
        rlat
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, what: &str) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "{what}: expected {expected:.6}, got {actual:.6}"
        );
    }

    fn resolver(even: (u32, u32, f64), odd: (u32, u32, f64)) -> CprResolver {
        let mut cpr = CprResolver::new();
        cpr.set_even(even.0, even.1, even.2).unwrap();
        cpr.set_odd(odd.0, odd.1, odd.2).unwrap();
        cpr
    }

    #[test]
    fn test_nl_table() {
        assert_eq!(nl(0.0), 59);
        assert_eq!(nl(10.47), 59);
        assert_eq!(nl(10.48), 58);
        assert_eq!(nl(-52.0), 36);
        assert_eq!(nl(86.9), 2);
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-90.0), 1);
    }

    #[test]
    fn test_modulo_negative() {
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_airborne_odd_basis() {
        let mut cpr = resolver((83068, 15070, 0.0), (94790, 103912, 1.0));
        let pos = cpr.decode(false, 0.0, 0.0).unwrap();
        assert_close(pos.lat, -32.197483, "lat");
        assert_close(pos.lon, 116.028629, "lon");
        assert!(!pos.on_ground);
    }

    #[test]
    fn test_airborne_northern_pair() {
        let mut cpr = resolver((92095, 39846, 0.0), (88385, 125818, 1.0));
        let pos = cpr.decode(false, 0.0, 0.0).unwrap();
        assert_close(pos.lat, 10.216214, "lat");
        assert_close(pos.lon, 123.889129, "lon");
    }

    #[test]
    fn test_airborne_even_basis() {
        let mut cpr = resolver((93000, 51372, 1.0), (74158, 50194, 0.0));
        let pos = cpr.decode(false, 0.0, 0.0).unwrap();
        assert_close(pos.lat, 52.257202, "lat");
        assert_close(pos.lon, 3.919373, "lon");
    }

    #[test]
    fn test_surface_worked_example() {
        let mut cpr = resolver((115609, 116941, 1.0), (39199, 110269, 0.0));
        let pos = cpr.decode(true, 51.990, 4.375).unwrap();
        assert_close(pos.lat, 52.323040, "lat");
        assert_close(pos.lon, 4.730473, "lon");
        assert!(pos.on_ground);
    }

    #[test]
    fn test_surface_reference_quadrants() {
        // (ref_lat, ref_lon, even-basis lat, lon, odd-basis lat, lon)
        let table: &[(f64, f64, f64, f64, f64, f64)] = &[
            (52.0, -180.0, 52.209984, 0.176601 - 180.0, 52.209976, 0.176507 - 180.0),
            (52.0, -130.0, 52.209984, 0.176601 - 90.0, 52.209976, 0.176507 - 90.0),
            (52.0, 0.0, 52.209984, 0.176601, 52.209976, 0.176507),
            (52.0, 50.0, 52.209984, 0.176601 + 90.0, 52.209976, 0.176507 + 90.0),
            (52.0, 140.0, 52.209984, 0.176601 - 180.0, 52.209976, 0.176507 - 180.0),
            (7.0, 0.0, 52.209984 - 90.0, 0.135269, 52.209976 - 90.0, 0.134299),
            (-52.0, 0.0, 52.209984 - 90.0, 0.135269, 52.209976 - 90.0, 0.134299),
        ];
        for &(ref_lat, ref_lon, e_lat, e_lon, o_lat, o_lon) in table {
            let mut cpr = resolver((105730, 9259, 1.0), (29693, 8997, 0.0));
            let pos = cpr.decode(true, ref_lat, ref_lon).unwrap();
            assert!((pos.lat - e_lat).abs() < 1e-5, "even lat at ref {ref_lat},{ref_lon}: {}", pos.lat);
            assert!((pos.lon - e_lon).abs() < 1e-5, "even lon at ref {ref_lat},{ref_lon}: {}", pos.lon);

            let mut cpr = resolver((105730, 9259, 0.0), (29693, 8997, 1.0));
            let pos = cpr.decode(true, ref_lat, ref_lon).unwrap();
            assert!((pos.lat - o_lat).abs() < 1e-5, "odd lat at ref {ref_lat},{ref_lon}: {}", pos.lat);
            assert!((pos.lon - o_lon).abs() < 1e-5, "odd lon at ref {ref_lat},{ref_lon}: {}", pos.lon);
        }
    }

    #[test]
    fn test_surface_antimeridian_is_positive() {
        for ref_lon in [180.0, -180.0, 179.0] {
            let mut cpr = resolver((105730, 0, 1.0), (29693, 0, 0.0));
            let pos = cpr.decode(true, 52.0, ref_lon).unwrap();
            assert_eq!(pos.lon, 180.0, "ref lon {ref_lon}");
        }
    }

    #[test]
    fn test_stale_pair_rejected() {
        let mut cpr = resolver((83068, 15070, 0.0), (94790, 103912, 10.5));
        let err = cpr.decode(false, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, CprError::StaleFramePair { .. }), "got {err:?}");

        // Older odd sample is just as stale
        let mut cpr = resolver((83068, 15070, 20.0), (94790, 103912, 0.0));
        assert!(cpr.decode(false, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_decode_consumes_samples() {
        let mut cpr = resolver((83068, 15070, 0.0), (94790, 103912, 30.0));
        assert!(cpr.decode(false, 0.0, 0.0).is_err());
        assert!(!cpr.can_decode(), "failed decode must clear both samples");
        assert!(cpr.even().is_none() && cpr.odd().is_none());

        let mut cpr = resolver((83068, 15070, 0.0), (94790, 103912, 1.0));
        assert!(cpr.decode(false, 0.0, 0.0).is_ok());
        assert!(!cpr.can_decode(), "successful decode must clear both samples");
    }

    #[test]
    fn test_missing_sample() {
        let mut cpr = CprResolver::new();
        cpr.set_even(92095, 39846, 0.0).unwrap();
        let err = cpr.decode(false, 0.0, 0.0).unwrap_err();
        assert_eq!(err, CprError::MissingSample { even: true, odd: false });
        assert!(cpr.even().is_some(), "a lone sample waits for its partner");

        let mut cpr = CprResolver::new();
        cpr.set_odd(88385, 125818, 0.0).unwrap();
        assert!(matches!(
            cpr.decode(false, 0.0, 0.0),
            Err(CprError::MissingSample { even: false, odd: true })
        ));
    }

    #[test]
    fn test_surface_needs_reference() {
        let mut cpr = resolver((115609, 116941, 1.0), (39199, 110269, 0.0));
        assert_eq!(cpr.decode(true, 0.0, 0.0), Err(CprError::NoReference));
        assert!(!cpr.can_decode());
    }

    #[test]
    fn test_raw_out_of_range() {
        let mut cpr = CprResolver::new();
        assert_eq!(cpr.set_odd(888888, 1, 0.0), Err(CprError::RawOutOfRange(888888)));
        assert_eq!(cpr.set_even(1, MAX_RAW + 1, 0.0), Err(CprError::RawOutOfRange(MAX_RAW + 1)));
        assert!(cpr.set_even(MAX_RAW, MAX_RAW, 0.0).is_ok());
        assert!(cpr.odd().is_none());
    }
}
