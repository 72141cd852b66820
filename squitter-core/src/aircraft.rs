//! Per-aircraft state.
//!
//! An [`Aircraft`] is only ever touched through the tracker's per-aircraft
//! lock, so nothing in here is synchronized. Setters return `true` when the
//! stored value actually changed; the tracker folds those into one
//! `Changed` event per frame.

use std::collections::VecDeque;

use serde::Serialize;

use crate::altitude::Altitude;
use crate::cpr::CprResolver;
use crate::decode::{Category, Speed};
use crate::types::{serialize_icao, CprError, Icao};

/// Mean Earth radius (metres) for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Speed of sound at sea level (m/s). No aircraft we track sustains more.
pub const MAX_PLAUSIBLE_SPEED_MPS: f64 = 343.0;

/// Cap on the plausible jump, whatever the elapsed time.
pub const MAX_PLAUSIBLE_JUMP_M: f64 = 50_000.0;

/// Latitude bound for accepted positions. Looser than +/-90 on purpose.
const LAT_LIMIT: f64 = 95.0;
const LON_LIMIT: f64 = 180.0;

/// Great-circle distance in metres (haversine).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (la1, la2) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = la2 - la1;
    let d_lon = (lon2 - lon1).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + la1.cos() * la2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

// ---------------------------------------------------------------------------
// Position history
// ---------------------------------------------------------------------------

/// One recorded position with the kinematics known at the time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    /// Unix seconds.
    pub timestamp: f64,
    pub altitude: Option<Altitude>,
    pub heading: Option<f64>,
    pub speed: Option<Speed>,
    pub on_ground: Option<bool>,
    /// Set when the next position was too far away to be the same track.
    pub track_finished: bool,
}

/// Distance and time between the last two positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Travelled {
    pub metres: f64,
    pub seconds: f64,
}

/// A jump no aircraft could have made. Not an error: the position was kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discontinuity {
    pub distance_m: f64,
    pub max_plausible_m: f64,
    pub elapsed_secs: f64,
}

// ---------------------------------------------------------------------------
// Aircraft
// ---------------------------------------------------------------------------

/// Mutable state for one tracked aircraft.
#[derive(Debug, Clone)]
pub struct Aircraft {
    icao: Icao,
    pub first_seen: f64,
    pub last_seen: f64,
    pub message_count: u64,

    // Identity
    pub callsign: Option<String>,
    pub category: Option<Category>,
    pub squawk: Option<u16>,
    pub flight_status: Option<&'static str>,

    // Kinematics
    pub altitude: Option<Altitude>,
    pub on_ground: Option<bool>,
    pub heading: Option<f64>,
    pub speed: Option<Speed>,
    pub vertical_rate: Option<i32>,

    // Status text
    pub alert: bool,
    pub special: Option<&'static str>,
    pub emergency: Option<&'static str>,
    pub surveillance: Option<&'static str>,

    /// Beast signal level of the latest frame.
    pub signal: Option<u8>,

    pub travelled: Option<Travelled>,
    history: VecDeque<PositionFix>,
    history_limit: Option<usize>,
    /// Set on the first implausible jump and never cleared, so it outlives
    /// the history entry that was marked.
    track_discontinuity: bool,
    pub(crate) cpr: CprResolver,
    /// Removed from the tracker's map. Writers holding an old handle must
    /// look the address up again.
    retired: bool,
}

impl Aircraft {
    /// `max_history <= 0` keeps every position.
    pub fn new(icao: Icao, timestamp: f64, max_history: i64) -> Self {
        Aircraft {
            icao,
            first_seen: timestamp,
            last_seen: timestamp,
            message_count: 0,
            callsign: None,
            category: None,
            squawk: None,
            flight_status: None,
            altitude: None,
            on_ground: None,
            heading: None,
            speed: None,
            vertical_rate: None,
            alert: false,
            special: None,
            emergency: None,
            surveillance: None,
            signal: None,
            travelled: None,
            history: VecDeque::new(),
            history_limit: usize::try_from(max_history).ok().filter(|&n| n > 0),
            track_discontinuity: false,
            cpr: CprResolver::new(),
            retired: false,
        }
    }

    pub fn icao(&self) -> Icao {
        self.icao
    }

    /// Latest accepted position.
    pub fn position(&self) -> Option<&PositionFix> {
        self.history.back()
    }

    /// Recorded positions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &PositionFix> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// True once any position of this aircraft ended a track.
    pub fn has_discontinuity(&self) -> bool {
        self.track_discontinuity
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Record that a frame arrived.
    pub fn mark_seen(&mut self, timestamp: f64) {
        if timestamp > self.last_seen {
            self.last_seen = timestamp;
        }
        self.message_count += 1;
    }

    // -- Setters, each returning whether the value changed --

    pub fn set_callsign(&mut self, callsign: &str) -> bool {
        let callsign = callsign.trim_end();
        if callsign.is_empty() || self.callsign.as_deref() == Some(callsign) {
            return false;
        }
        self.callsign = Some(callsign.to_string());
        true
    }

    pub fn set_category(&mut self, category: Category) -> bool {
        replace(&mut self.category, category)
    }

    pub fn set_squawk(&mut self, squawk: u16) -> bool {
        replace(&mut self.squawk, squawk)
    }

    pub fn set_flight_status(&mut self, status: &'static str) -> bool {
        replace(&mut self.flight_status, status)
    }

    pub fn set_altitude(&mut self, altitude: Altitude) -> bool {
        replace(&mut self.altitude, altitude)
    }

    pub fn set_on_ground(&mut self, on_ground: bool) -> bool {
        replace(&mut self.on_ground, on_ground)
    }

    pub fn set_heading(&mut self, heading: f64) -> bool {
        replace(&mut self.heading, heading)
    }

    pub fn set_speed(&mut self, speed: Speed) -> bool {
        replace(&mut self.speed, speed)
    }

    pub fn set_vertical_rate(&mut self, rate: i32) -> bool {
        replace(&mut self.vertical_rate, rate)
    }

    pub fn set_alert(&mut self, alert: bool) -> bool {
        std::mem::replace(&mut self.alert, alert) != alert
    }

    pub fn set_special(&mut self, special: &'static str) -> bool {
        replace(&mut self.special, special)
    }

    pub fn set_emergency(&mut self, emergency: &'static str) -> bool {
        replace(&mut self.emergency, emergency)
    }

    /// `None` clears the surveillance status.
    pub fn set_surveillance(&mut self, status: Option<&'static str>) -> bool {
        std::mem::replace(&mut self.surveillance, status) != status
    }

    /// Accept a resolved position.
    ///
    /// Out-of-range coordinates are rejected. A jump further than the
    /// aircraft could plausibly have flown since the previous fix marks that
    /// fix `track_finished`, and the new position is recorded anyway.
    pub fn add_position(
        &mut self,
        lat: f64,
        lon: f64,
        timestamp: f64,
    ) -> Result<Option<Discontinuity>, CprError> {
        if !(-LAT_LIMIT..=LAT_LIMIT).contains(&lat) || !(-LON_LIMIT..=LON_LIMIT).contains(&lon) {
            return Err(CprError::CoordinateRange { lat, lon });
        }

        let mut discontinuity = None;
        self.travelled = None;
        if let Some(prev) = self.history.back_mut().filter(|p| p.timestamp != 0.0) {
            let elapsed = (timestamp - prev.timestamp).max(1.0);
            let max_plausible = (elapsed * MAX_PLAUSIBLE_SPEED_MPS).min(MAX_PLAUSIBLE_JUMP_M);
            let distance = haversine_m(prev.lat, prev.lon, lat, lon);
            if distance > max_plausible {
                prev.track_finished = true;
                self.track_discontinuity = true;
                discontinuity = Some(Discontinuity {
                    distance_m: distance,
                    max_plausible_m: max_plausible,
                    elapsed_secs: elapsed,
                });
            }
            self.travelled = Some(Travelled {
                metres: distance,
                seconds: elapsed,
            });
        }

        if let Some(limit) = self.history_limit {
            while self.history.len() >= limit {
                self.history.pop_front();
            }
        }
        self.history.push_back(PositionFix {
            lat,
            lon,
            timestamp,
            altitude: self.altitude,
            heading: self.heading,
            speed: self.speed,
            on_ground: self.on_ground,
            track_finished: false,
        });

        Ok(discontinuity)
    }

    /// Serializable copy without the history.
    pub fn snapshot(&self) -> AircraftSnapshot {
        AircraftSnapshot {
            icao: self.icao,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            message_count: self.message_count,
            callsign: self.callsign.clone(),
            category: self.category.map(|c| c.description()),
            squawk: self.squawk.map(|s| format!("{s:04}")),
            flight_status: self.flight_status,
            altitude: self.altitude,
            on_ground: self.on_ground,
            heading: self.heading,
            speed: self.speed,
            vertical_rate: self.vertical_rate,
            alert: self.alert,
            special: self.special,
            emergency: self.emergency,
            surveillance: self.surveillance,
            signal: self.signal,
            position: self.position().cloned(),
            travelled: self.travelled,
            history_len: self.history.len(),
            track_discontinuity: self.has_discontinuity(),
        }
    }
}

/// Store `value` in `slot`, reporting whether it differed.
fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

/// Point-in-time view of an aircraft for events and display.
#[derive(Debug, Clone, Serialize)]
pub struct AircraftSnapshot {
    #[serde(serialize_with = "serialize_icao")]
    pub icao: Icao,
    pub first_seen: f64,
    pub last_seen: f64,
    pub message_count: u64,
    pub callsign: Option<String>,
    pub category: Option<&'static str>,
    pub squawk: Option<String>,
    pub flight_status: Option<&'static str>,
    pub altitude: Option<Altitude>,
    pub on_ground: Option<bool>,
    pub heading: Option<f64>,
    pub speed: Option<Speed>,
    pub vertical_rate: Option<i32>,
    pub alert: bool,
    pub special: Option<&'static str>,
    pub emergency: Option<&'static str>,
    pub surveillance: Option<&'static str>,
    pub signal: Option<u8>,
    pub position: Option<PositionFix>,
    pub travelled: Option<Travelled>,
    pub history_len: usize,
    pub track_discontinuity: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ICAO: Icao = [0x7C, 0x45, 0x16];

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude on the mean sphere
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.93).abs() < 0.1, "got {d}");
        assert_eq!(haversine_m(52.0, 4.0, 52.0, 4.0), 0.0);
    }

    #[test]
    fn test_bounded_history_keeps_latest() {
        let mut ac = Aircraft::new(ICAO, 1.0, 3);
        for i in 0..5 {
            let lat = -32.0 + i as f64 * 0.001;
            ac.add_position(lat, 115.9, 10.0 + i as f64).unwrap();
        }
        let lats: Vec<f64> = ac.history().map(|p| p.lat).collect();
        assert_eq!(ac.history_len(), 3, "history must hold exactly the limit");
        assert!((lats[0] - -31.998).abs() < 1e-9, "oldest kept is the third: {lats:?}");
        assert!((lats[2] - -31.996).abs() < 1e-9, "newest is last: {lats:?}");
        assert!(!ac.has_discontinuity());
    }

    #[test]
    fn test_unbounded_history() {
        let mut ac = Aircraft::new(ICAO, 1.0, 0);
        for i in 0..1500 {
            ac.add_position(10.0, 10.0, 1.0 + i as f64).unwrap();
        }
        assert_eq!(ac.history_len(), 1500, "non-positive limit keeps everything");
    }

    #[test]
    fn test_implausible_jump_marks_previous() {
        let mut ac = Aircraft::new(ICAO, 1.0, 1000);
        ac.add_position(52.0, 4.0, 100.0).unwrap();

        // 10 s later, ~111 km north: needs ~11 km/s
        let jump = ac.add_position(53.0, 4.0, 110.0).unwrap();
        let jump = jump.expect("jump should be flagged");
        assert!((jump.max_plausible_m - 3430.0).abs() < 1e-9);
        assert!(jump.distance_m > 100_000.0);

        let fixes: Vec<&PositionFix> = ac.history().collect();
        assert_eq!(fixes.len(), 2, "new position is still recorded");
        assert!(fixes[0].track_finished, "previous entry ends the track");
        assert!(!fixes[1].track_finished);
        assert!(ac.has_discontinuity());
    }

    #[test]
    fn test_discontinuity_outlives_history() {
        let mut ac = Aircraft::new(ICAO, 1.0, 2);
        ac.add_position(52.0, 4.0, 100.0).unwrap();
        assert!(ac.add_position(53.0, 4.0, 110.0).unwrap().is_some());

        // Two more fixes push the marked entry out of the history
        ac.add_position(53.001, 4.0, 111.0).unwrap();
        ac.add_position(53.002, 4.0, 112.0).unwrap();
        assert!(ac.history().all(|fix| !fix.track_finished));
        assert!(ac.has_discontinuity(), "flag survives eviction");
        assert!(ac.snapshot().track_discontinuity);
    }

    #[test]
    fn test_jump_cap_applies_to_long_gaps() {
        let mut ac = Aircraft::new(ICAO, 1.0, 1000);
        ac.add_position(52.0, 4.0, 100.0).unwrap();
        // An hour later allows 1234 km at Mach 1, but the cap is 50 km
        let jump = ac.add_position(53.0, 4.0, 3700.0).unwrap();
        assert_eq!(jump.map(|j| j.max_plausible_m), Some(MAX_PLAUSIBLE_JUMP_M));
    }

    #[test]
    fn test_plausible_move_and_travelled() {
        let mut ac = Aircraft::new(ICAO, 1.0, 1000);
        ac.add_position(52.0, 4.0, 100.0).unwrap();
        assert!(ac.travelled.is_none(), "nothing travelled before the second fix");

        // ~1.1 km in 10 s is fine
        assert!(ac.add_position(52.01, 4.0, 110.0).unwrap().is_none());
        let t = ac.travelled.expect("travelled after two fixes");
        assert!((t.metres - 1111.95).abs() < 0.1, "got {}", t.metres);
        assert_eq!(t.seconds, 10.0);
    }

    #[test]
    fn test_elapsed_floor_of_one_second() {
        let mut ac = Aircraft::new(ICAO, 1.0, 1000);
        ac.add_position(52.0, 4.0, 100.0).unwrap();
        // Same timestamp: treated as 1 s, so 343 m is the limit
        assert!(ac.add_position(52.002, 4.0, 100.0).unwrap().is_none());
        assert!(ac.add_position(52.006, 4.0, 100.0).unwrap().is_some());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut ac = Aircraft::new(ICAO, 1.0, 1000);
        assert!(ac.add_position(95.5, 0.0, 1.0).is_err());
        assert!(ac.add_position(0.0, -180.5, 1.0).is_err());
        assert_eq!(ac.history_len(), 0);
        assert!(ac.add_position(-94.0, 180.0, 1.0).is_ok(), "loose latitude bound");
    }

    #[test]
    fn test_setters_report_change() {
        let mut ac = Aircraft::new(ICAO, 1.0, 10);
        assert!(ac.set_squawk(7700));
        assert!(!ac.set_squawk(7700), "same value is not a change");
        assert!(ac.set_callsign("QFA123  "));
        assert_eq!(ac.callsign.as_deref(), Some("QFA123"));
        assert!(!ac.set_callsign("QFA123"));
        assert!(!ac.set_callsign("        "), "blank callsign ignored");
        assert!(!ac.set_alert(false));
        assert!(ac.set_alert(true));
        assert!(ac.set_surveillance(Some("Permanent alert")));
        assert!(ac.set_surveillance(None));
        assert!(!ac.set_surveillance(None));
    }

    #[test]
    fn test_snapshot_fields() {
        let mut ac = Aircraft::new(ICAO, 5.0, 10);
        ac.mark_seen(6.0);
        ac.set_squawk(507);
        ac.add_position(-32.0, 115.9, 6.0).unwrap();
        let snap = ac.snapshot();
        assert_eq!(snap.squawk.as_deref(), Some("0507"));
        assert_eq!(snap.message_count, 1);
        assert_eq!(snap.last_seen, 6.0);
        assert_eq!(snap.history_len, 1);
        assert_eq!(snap.position.map(|p| p.lat), Some(-32.0));
    }
}
