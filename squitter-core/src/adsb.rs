//! ADS-B extended squitter (DF17/18) ME field decoding.
//!
//! Type Codes:
//! - TC 1-4:   identification and category
//! - TC 5-8:   surface position (movement, ground track, CPR)
//! - TC 9-18:  airborne position, barometric altitude
//! - TC 19:    airborne velocity (ground speed or airspeed)
//! - TC 20-22: airborne position, GNSS height
//! - TC 23:    test message (subtype 7 carries a squawk)
//! - TC 28:    aircraft status (subtype 1: emergency/priority)
//! - TC 31:    operational status
//!
//! `me` is always the 7-byte ME field (frame bytes 4-10).

use serde::Serialize;

use crate::altitude::{decode_ac12, decode_gnss_height};
use crate::decode::{
    Category, CprFields, DecodedFrame, OperationalStatus, Speed, SpeedKind, VelocityComponents,
    VerticalRateSource,
};
use crate::types::decode_callsign;

/// ADS-B message family by Type Code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    NoPosition,
    Identification,
    SurfacePosition,
    AirbornePosition,
    AirborneVelocity,
    TestMessage,
    SurfaceSystemStatus,
    Reserved,
    AircraftStatus,
    TargetState,
    OperationalStatus,
}

pub fn message_kind(tc: u8) -> MessageKind {
    match tc {
        0 => MessageKind::NoPosition,
        1..=4 => MessageKind::Identification,
        5..=8 => MessageKind::SurfacePosition,
        9..=18 | 20..=22 => MessageKind::AirbornePosition,
        19 => MessageKind::AirborneVelocity,
        23 => MessageKind::TestMessage,
        24 => MessageKind::SurfaceSystemStatus,
        28 => MessageKind::AircraftStatus,
        29 => MessageKind::TargetState,
        31 => MessageKind::OperationalStatus,
        _ => MessageKind::Reserved,
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Ground speed in knots from the 7-bit surface movement code.
///
/// Piecewise scale: finer steps at taxi speeds. 0 (no information) and the
/// reserved codes 125-127 return `None`.
pub fn surface_speed(movement: u8) -> Option<f64> {
    let v = movement as f64;
    match movement {
        1 => Some(0.0),
        2..=8 => Some((v - 1.0) * 0.125),
        9..=12 => Some((v - 9.0) * 0.25 + 1.0),
        13..=38 => Some((v - 13.0) * 0.5 + 2.0),
        39..=93 => Some(v - 39.0 + 15.0),
        94..=108 => Some((v - 94.0) * 2.0 + 70.0),
        109..=123 => Some((v - 109.0) * 5.0 + 100.0),
        124 => Some(175.0),
        _ => None,
    }
}

/// Horizontal containment radius limit (Rc) in metres.
///
/// Without NIC supplement A from an operational status message the caller
/// passes `false`, which gives the pessimistic radius.
pub fn containment_radius(tc: u8, nic_supplement_a: bool, nic_supplement_b: u8) -> Option<f64> {
    let rc = match tc {
        9 | 20 => 7.5,
        10 | 21 => 25.0,
        11 if nic_supplement_a => 75.0,
        11 => 185.2,
        12 => 370.4,
        13 if nic_supplement_b == 0 => 926.0,
        13 if nic_supplement_a => 1111.2,
        13 => 555.6,
        14 => 1852.0,
        15 => 3704.0,
        16 if nic_supplement_a => 7408.0,
        16 => 14816.0,
        17 => 37040.0,
        _ => return None,
    };
    Some(rc)
}

/// Airframe (length, width) in metres from the surface operational status code.
pub fn airframe_size(code: u8) -> Option<(f64, f64)> {
    let size = match code {
        1 => (15.0, 23.0),
        2 => (25.0, 28.5),
        3 => (25.0, 34.0),
        4 => (35.0, 33.0),
        5 => (35.0, 38.0),
        6 => (45.0, 39.5),
        7 => (45.0, 45.0),
        8 => (55.0, 45.0),
        9 => (55.0, 52.0),
        10 => (65.0, 59.5),
        11 => (65.0, 67.0),
        12 => (75.0, 72.5),
        13 => (75.0, 80.0),
        14 => (85.0, 80.0),
        15 => (85.0, 90.0),
        _ => return None,
    };
    Some(size)
}

// ---------------------------------------------------------------------------
// ME decoding
// ---------------------------------------------------------------------------

/// Decode the ME field into `f`, routed by Type Code.
pub(crate) fn decode_extended_squitter(f: &mut DecodedFrame, me: &[u8]) {
    let tc = me[0] >> 3;
    let st = me[0] & 0x07;
    f.message_type = Some(tc);
    f.sub_type = Some(st);

    match message_kind(tc) {
        MessageKind::Identification => decode_identification(f, me, tc, st),
        MessageKind::SurfacePosition => decode_surface_position(f, me),
        MessageKind::AirbornePosition => decode_airborne_position(f, me, tc),
        MessageKind::AirborneVelocity => decode_velocity(f, me, st),
        MessageKind::TestMessage if st == 7 => f.decode_squawk_field(me[1], me[2]),
        MessageKind::AircraftStatus if st == 1 => {
            let code = (me[1] & 0xE0) >> 5;
            f.emergency = Some(code);
            f.alert = code != 0;
            f.decode_squawk_field(me[1], me[2]);
        }
        MessageKind::OperationalStatus => decode_operational_status(f, me, st),
        _ => {}
    }
}

fn decode_identification(f: &mut DecodedFrame, me: &[u8], tc: u8, st: u8) {
    f.callsign = Some(decode_callsign(&me[1..7]));
    f.category = Some(Category {
        set: 4 - tc,
        code: st,
    });
}

fn decode_cpr(me: &[u8]) -> CprFields {
    let (m2, m3, m4, m5, m6) = (
        me[2] as u32,
        me[3] as u32,
        me[4] as u32,
        me[5] as u32,
        me[6] as u32,
    );
    CprFields {
        lat: ((m2 & 0x03) << 15) | (m3 << 7) | (m4 >> 1),
        lon: ((m4 & 0x01) << 16) | (m5 << 8) | m6,
        odd: m2 & 0x04 != 0,
        utc_sync: m2 & 0x08 != 0,
    }
}

fn decode_surface_position(f: &mut DecodedFrame, me: &[u8]) {
    f.on_ground = Some(true);
    f.cpr = Some(decode_cpr(me));

    let movement = ((me[0] << 4) | (me[1] >> 4)) & 0x7F;
    f.speed = surface_speed(movement).map(|knots| Speed {
        knots,
        kind: SpeedKind::Ground,
    });

    if me[1] & 0x08 != 0 {
        let track = ((me[1] << 4) | (me[2] >> 4)) & 0x7F;
        f.heading = Some(track as f64 * 360.0 / 128.0);
    }
}

fn decode_airborne_position(f: &mut DecodedFrame, me: &[u8], tc: u8) {
    f.on_ground = Some(false);
    f.surveillance_status = Some((me[0] & 0x06) >> 1);
    f.nic_supplement_b = Some(me[0] & 0x01);

    let field = ((me[1] as u32) << 4 | (me[2] as u32) >> 4) & 0x0FFF;
    f.altitude = if tc >= 20 {
        decode_gnss_height(field)
    } else {
        decode_ac12(field)
    };
    if let Some(alt) = f.altitude {
        f.altitude_unit = Some(alt.unit);
    }

    f.cpr = Some(decode_cpr(me));
}

fn decode_velocity(f: &mut DecodedFrame, me: &[u8], st: u8) {
    f.on_ground = Some(false);
    f.intent_change = Some(me[1] & 0x80 != 0);
    f.ifr_capability = Some(me[1] & 0x40 != 0);
    f.nac_v = Some((me[1] & 0x38) >> 3);

    f.vertical_rate_source = Some(if me[4] & 0x10 != 0 {
        VerticalRateSource::Barometric
    } else {
        VerticalRateSource::Gnss
    });
    let vr = ((me[4] as i32 & 0x07) << 6) | (me[5] as i32 >> 2);
    if vr != 0 {
        let rate = (vr - 1) * 64;
        f.vertical_rate = Some(if me[4] & 0x08 != 0 { -rate } else { rate });
    }

    let delta = (me[6] & 0x7F) as i32;
    if delta != 0 {
        let feet = (delta - 1) * 25;
        f.gnss_baro_delta = Some(if me[6] & 0x80 != 0 { -feet } else { feet });
    }

    let scale = if matches!(st, 2 | 4) { 4 } else { 1 };
    f.supersonic = scale == 4;

    match st {
        1 | 2 => {
            let ew = ((me[1] as i32 & 0x03) << 8) | me[2] as i32;
            let ns = ((me[3] as i32 & 0x7F) << 3) | (me[4] as i32 >> 5);
            if ew == 0 || ns == 0 {
                return;
            }
            let mut ew = (ew - 1) * scale;
            let mut ns = (ns - 1) * scale;
            if me[1] & 0x04 != 0 {
                ew = -ew;
            }
            if me[3] & 0x80 != 0 {
                ns = -ns;
            }

            let (x, y) = (ew as f64, ns as f64);
            f.components = Some(VelocityComponents {
                east_west: ew,
                north_south: ns,
            });
            f.speed = Some(Speed {
                knots: x.hypot(y),
                kind: SpeedKind::Ground,
            });
            f.heading = Some(x.atan2(y).to_degrees().rem_euclid(360.0));
        }
        3 | 4 => {
            if me[1] & 0x04 != 0 {
                let raw = ((me[1] as u32 & 0x03) << 8) | me[2] as u32;
                f.heading = Some(raw as f64 * 360.0 / 1024.0);
            }
            let airspeed = ((me[3] as i32 & 0x7F) << 3) | (me[4] as i32 >> 5);
            if airspeed != 0 {
                let kind = if me[3] & 0x80 != 0 {
                    SpeedKind::True
                } else {
                    SpeedKind::Indicated
                };
                f.speed = Some(Speed {
                    knots: ((airspeed - 1) * scale) as f64,
                    kind,
                });
            }
        }
        _ => {}
    }
}

fn decode_operational_status(f: &mut DecodedFrame, me: &[u8], st: u8) {
    let (capability_class, airframe) = match st {
        0 => {
            f.on_ground = Some(false);
            (((me[1] as u16) << 8) | me[2] as u16, None)
        }
        1 => {
            f.on_ground = Some(true);
            let cc = ((me[1] as u16) << 4) | ((me[2] as u16 & 0xF0) >> 4);
            (cc, airframe_size(me[2] & 0x0F))
        }
        _ => return,
    };

    f.operational_status = Some(OperationalStatus {
        version: (me[5] & 0xE0) >> 5,
        nic_supplement_a: (me[5] & 0x10) >> 4,
        nac_p: me[5] & 0x0F,
        gva: (me[6] & 0xC0) >> 6,
        sil: (me[6] & 0x30) >> 4,
        nic_baro: (me[6] & 0x08) >> 3,
        horizontal_reference: (me[6] & 0x04) >> 2,
        capability_class,
        operational_mode: ((me[3] as u16) << 8) | me[4] as u16,
        airframe_size: airframe,
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode, Decoded};
    use crate::types::hex_decode;

    fn frame(line: &str) -> DecodedFrame {
        match decode(line, 0.0).unwrap() {
            Decoded::Frame(f) => *f,
            Decoded::NoOp => panic!("heartbeat"),
        }
    }

    #[test]
    fn test_message_kind_ranges() {
        assert_eq!(message_kind(4), MessageKind::Identification);
        assert_eq!(message_kind(8), MessageKind::SurfacePosition);
        assert_eq!(message_kind(18), MessageKind::AirbornePosition);
        assert_eq!(message_kind(22), MessageKind::AirbornePosition);
        assert_eq!(message_kind(19), MessageKind::AirborneVelocity);
        assert_eq!(message_kind(25), MessageKind::Reserved);
    }

    #[test]
    fn test_surface_speed_table() {
        assert_eq!(surface_speed(0), None);
        assert_eq!(surface_speed(1), Some(0.0));
        assert_eq!(surface_speed(8), Some(0.875));
        assert_eq!(surface_speed(9), Some(1.0));
        assert_eq!(surface_speed(13), Some(2.0));
        assert_eq!(surface_speed(39), Some(15.0));
        assert_eq!(surface_speed(94), Some(70.0));
        assert_eq!(surface_speed(109), Some(100.0));
        assert_eq!(surface_speed(124), Some(175.0));
        assert_eq!(surface_speed(125), None);
    }

    #[test]
    fn test_containment_radius() {
        assert_eq!(containment_radius(9, false, 0), Some(7.5));
        assert_eq!(containment_radius(11, true, 0), Some(75.0));
        assert_eq!(containment_radius(11, false, 0), Some(185.2));
        assert_eq!(containment_radius(13, true, 0), Some(926.0));
        assert_eq!(containment_radius(13, true, 1), Some(1111.2));
        assert_eq!(containment_radius(13, false, 1), Some(555.6));
        assert_eq!(containment_radius(18, false, 0), None);
    }

    #[test]
    fn test_airborne_position_fields() {
        let f = frame("8D75804B580FF2CF7E9BA6F701D0");
        assert_eq!(f.message_type().unwrap(), 11);
        assert_eq!(f.altitude().unwrap().value, 2175);
        let cpr = f.cpr().unwrap();
        assert_eq!((cpr.lat, cpr.lon, cpr.odd), (92095, 39846, false));
        assert_eq!(f.containment_radius(false).unwrap(), 185.2);
        assert_eq!(f.surveillance_status().unwrap(), 0);

        let f = frame("8D75804B580FF6B283EB7A157117");
        let cpr = f.cpr().unwrap();
        assert_eq!((cpr.lat, cpr.lon, cpr.odd), (88385, 125818, true));
    }

    #[test]
    fn test_more_airborne_altitudes() {
        let cases = [
            ("*8d7c4516581f76e48d95e8ab20ca;", 5175, true),
            ("*8d7c4516581f6288f83ade534ae1;", 5150, false),
            ("*8d7c4a08581fa28e6038b87a2e88;", 5250, false),
            ("@000000EF31C08d8960c66055972f34137e0be0a2;", 16025, true),
            ("@000A237DD8708d7c6c9a583fa2c5422ad9e99abb;", 11650, false),
        ];
        for (line, alt, odd) in cases {
            let f = frame(line);
            assert_eq!(f.altitude().unwrap().value, alt, "altitude of {line}");
            assert_eq!(f.cpr().unwrap().odd, odd, "odd flag of {line}");
        }
    }

    #[test]
    fn test_surface_position() {
        let f = frame("8C4841753AAB238733C8CD4020B1");
        assert_eq!(f.message_kind(), Some(MessageKind::SurfacePosition));
        assert!(f.on_ground().unwrap());
        assert_eq!(f.speed().unwrap().knots, 18.0);
        assert_eq!(f.heading().unwrap(), 140.625);
        let cpr = f.cpr().unwrap();
        assert_eq!((cpr.lat, cpr.lon), (115609, 116941));
        assert!(f.altitude().is_err(), "surface frames carry no altitude");
    }

    #[test]
    fn test_identification_ezy() {
        let f = frame("8D406B902015A678D4D220AA4BDA");
        assert_eq!(f.callsign().unwrap(), "EZY85MH ");
    }

    #[test]
    fn test_emergency_status() {
        // TC 28 subtype 1, emergency code 1 (general), squawk 7700
        let mut bytes = hex_decode("8D4840D6202CC371C32CE0576098").unwrap();
        bytes[4] = (28 << 3) | 1;
        bytes[5] = (1 << 5) | 0x0A;
        bytes[6] = 0xAA;
        let mut f = frame("8D4840D6202CC371C32CE0576098");
        decode_extended_squitter(&mut f, &bytes[4..11]);
        assert_eq!(f.emergency().unwrap(), 1);
        assert_eq!(f.emergency_text().unwrap(), "General emergency (squawk 7700)");
        assert!(f.alert());
        assert_eq!(f.squawk().unwrap(), 7700);
    }

    #[test]
    fn test_operational_status_surface() {
        let me = [(31 << 3) | 1, 0x00, 0x0A, 0x00, 0x00, 0x5A, 0x28];
        let mut f = frame("8D4840D6202CC371C32CE0576098");
        decode_extended_squitter(&mut f, &me);
        let os = f.operational_status().unwrap();
        assert_eq!(os.version, 2);
        assert_eq!(os.nic_supplement_a, 1);
        assert_eq!(os.nac_p, 10);
        assert_eq!(os.sil, 2);
        assert_eq!(os.nic_baro, 1);
        assert_eq!(os.airframe_size, Some((65.0, 59.5)));
        assert_eq!(os.version_text(), "DO-260B/ED-102A and DO-242B");
        assert!(f.on_ground().unwrap());
    }

    #[test]
    fn test_airspeed_subtype() {
        // TC 19 subtype 3: heading 0x200 (180 deg), TAS, airspeed raw 401
        let airspeed: u16 = 401;
        let me = [
            (19 << 3) | 3,
            0x06,
            0x00,
            0x80 | (airspeed >> 3) as u8,
            ((airspeed & 7) << 5) as u8,
            0x00,
            0x00,
        ];
        let mut f = frame("8D4840D6202CC371C32CE0576098");
        decode_extended_squitter(&mut f, &me);
        assert_eq!(f.heading().unwrap(), 180.0);
        let speed = f.speed().unwrap();
        assert_eq!(speed.kind, SpeedKind::True);
        assert_eq!(speed.knots, 400.0);
        assert!(f.vertical_rate().is_err(), "raw 0 vertical rate is unavailable");
    }
}
