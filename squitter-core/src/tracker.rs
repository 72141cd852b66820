//! Concurrent aircraft tracker with CPR frame pairing.
//!
//! Pure logic, no I/O. Any number of threads may call [`Tracker::handle`]
//! at once. Every aircraft sits behind its own lock, so frames for one ICAO
//! are applied in the order they take that lock while different aircraft
//! update in parallel. The returned [`TrackEvent`]s are for the caller to
//! forward (printing, export, a message bus).
//!
//! Tracks per aircraft: identity, kinematics, status text, CPR samples,
//! position history, and staleness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::adsb::MessageKind;
use crate::aircraft::{Aircraft, AircraftSnapshot, PositionFix};
use crate::altitude::{Altitude, AltitudeEncoding};
use crate::commb::Bds;
use crate::config::TrackerConfig;
use crate::decode::{decode, Decoded, DecodedFrame, Speed, SpeedKind};
use crate::input::InputFrame;
use crate::sbs1::{parse_sbs1, Sbs1Frame};
use crate::types::*;

// ---------------------------------------------------------------------------
// Track events (output)
// ---------------------------------------------------------------------------

/// Events emitted by the tracker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEvent {
    /// First frame from this ICAO address.
    NewAircraft { aircraft: AircraftSnapshot },
    /// At least one tracked field changed value.
    Changed { aircraft: AircraftSnapshot },
    /// Removed after going silent. Carries the final state.
    Removed { aircraft: AircraftSnapshot },
    /// Periodic statistics, sent after every prune sweep.
    Info {
        frames_received: u64,
        aircraft_tracked: usize,
        uptime_secs: f64,
    },
}

impl TrackEvent {
    pub fn icao(&self) -> Option<Icao> {
        match self {
            TrackEvent::NewAircraft { aircraft }
            | TrackEvent::Changed { aircraft }
            | TrackEvent::Removed { aircraft } => Some(aircraft.icao),
            TrackEvent::Info { .. } => None,
        }
    }
}

/// A decoded input waiting to be applied.
#[derive(Debug, Clone)]
pub enum Update {
    ModeS {
        frame: Box<DecodedFrame>,
        signal: Option<u8>,
    },
    Sbs1(Sbs1Frame),
}

impl Update {
    pub fn icao(&self) -> Icao {
        match self {
            Update::ModeS { frame, .. } => frame.icao(),
            Update::Sbs1(frame) => frame.icao,
        }
    }

    pub fn received_at(&self) -> f64 {
        match self {
            Update::ModeS { frame, .. } => frame.received_at(),
            Update::Sbs1(frame) => frame.received_at,
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub frames_received: u64,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub positions_resolved: u64,
    pub aircraft: usize,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

type SharedAircraft = Arc<Mutex<Aircraft>>;

/// Whether a frame may start a new track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Create,
    KnownOnly,
}

impl Lookup {
    fn for_frame(frame: &DecodedFrame) -> Lookup {
        if frame.address_verified() {
            Lookup::Create
        } else {
            Lookup::KnownOnly
        }
    }
}

/// Lock one aircraft. A panic elsewhere leaves plain data behind, so a
/// poisoned lock is still usable.
fn lock(aircraft: &Mutex<Aircraft>) -> MutexGuard<'_, Aircraft> {
    aircraft.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Track many aircraft from decoded frames.
pub struct Tracker {
    aircraft: DashMap<Icao, SharedAircraft>,
    config: TrackerConfig,
    /// Receiver position, used to pick the quadrant for surface positions.
    reference: Option<(f64, f64)>,
    started: Instant,
    /// Largest `frame time - wall time` seen, as `f64` bits.
    clock_offset: AtomicU64,

    frames_received: AtomicU64,
    frames_decoded: AtomicU64,
    frames_dropped: AtomicU64,
    positions_resolved: AtomicU64,
}

impl Default for Tracker {
    fn default() -> Self {
        Tracker::new(TrackerConfig::default(), None)
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig, reference: Option<(f64, f64)>) -> Self {
        Tracker {
            aircraft: DashMap::new(),
            config,
            reference,
            started: Instant::now(),
            clock_offset: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
            frames_received: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            positions_resolved: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.aircraft.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aircraft.is_empty()
    }

    /// Look up an aircraft, creating it if this is its first frame.
    ///
    /// The second value is `true` for the caller that created it. Concurrent
    /// callers for one ICAO all get the same record.
    pub fn get_or_create(&self, icao: Icao, timestamp: f64) -> (SharedAircraft, bool) {
        match self.aircraft.entry(icao) {
            Entry::Occupied(e) => (Arc::clone(e.get()), false),
            Entry::Vacant(e) => {
                info!(icao = %icao_to_string(&icao), "new aircraft");
                let aircraft = Arc::new(Mutex::new(Aircraft::new(
                    icao,
                    timestamp,
                    self.config.max_history,
                )));
                e.insert(Arc::clone(&aircraft));
                (aircraft, true)
            }
        }
    }

    pub fn get(&self, icao: &Icao) -> Option<AircraftSnapshot> {
        let aircraft = self.aircraft.get(icao).map(|e| Arc::clone(e.value()))?;
        let snapshot = lock(&aircraft).snapshot();
        Some(snapshot)
    }

    /// Position history for one aircraft, oldest first.
    pub fn history(&self, icao: &Icao) -> Option<Vec<PositionFix>> {
        let aircraft = self.aircraft.get(icao).map(|e| Arc::clone(e.value()))?;
        let history = lock(&aircraft).history().cloned().collect();
        Some(history)
    }

    /// Clone out the map's handles so no shard lock is held while an
    /// aircraft lock is taken.
    fn entries(&self) -> Vec<(Icao, SharedAircraft)> {
        self.aircraft
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect()
    }

    /// All aircraft, most recently seen first.
    pub fn snapshots(&self) -> Vec<AircraftSnapshot> {
        let mut all: Vec<AircraftSnapshot> = self
            .entries()
            .iter()
            .map(|(_, aircraft)| lock(aircraft).snapshot())
            .collect();
        all.sort_by(|a, b| b.last_seen.total_cmp(&a.last_seen));
        all
    }

    /// Current time on the frames' timeline, Unix seconds.
    ///
    /// Live input reads as wall-clock time. A replayed capture runs on its
    /// own timestamps, advancing with wall-clock time between frames.
    pub fn clock(&self) -> f64 {
        let now = unix_now();
        let offset = f64::from_bits(self.clock_offset.load(Ordering::Relaxed));
        if offset.is_finite() {
            now + offset
        } else {
            now
        }
    }

    fn observe_time(&self, received_at: f64) {
        let offset = received_at - unix_now();
        if !offset.is_finite() {
            return;
        }
        let _ = self
            .clock_offset
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                (offset > f64::from_bits(bits)).then_some(offset.to_bits())
            });
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            positions_resolved: self.positions_resolved.load(Ordering::Relaxed),
            aircraft: self.aircraft.len(),
        }
    }

    // -- Input --

    /// Decode one input frame. Bad input is counted, logged and dropped.
    ///
    /// Touches no aircraft state, so any number of callers may decode at
    /// once.
    pub fn decode_input(&self, input: &InputFrame) -> Option<Update> {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        let decoded = match input {
            InputFrame::Avr { line, received_at } => {
                self.decode_mode_s(line, *received_at, None)
            }
            InputFrame::Beast {
                line,
                signal,
                received_at,
            } => self.decode_mode_s(line, *received_at, *signal),
            InputFrame::Sbs1 { line, received_at } => {
                parse_sbs1(line, *received_at).map(|frame| Some(Update::Sbs1(frame)))
            }
        };
        match decoded {
            Ok(update) => {
                if update.is_some() {
                    self.frames_decoded.fetch_add(1, Ordering::Relaxed);
                }
                update
            }
            Err(e) => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    line = input.line(),
                    format = input.format_name(),
                    error = %e,
                    "dropping frame"
                );
                None
            }
        }
    }

    fn decode_mode_s(
        &self,
        line: &str,
        received_at: f64,
        signal: Option<u8>,
    ) -> Result<Option<Update>> {
        match decode(line, received_at)? {
            Decoded::NoOp => {
                trace!("heartbeat");
                Ok(None)
            }
            Decoded::Frame(frame) => Ok(Some(Update::ModeS { frame, signal })),
        }
    }

    /// Decode and apply one input frame.
    pub fn handle(&self, input: &InputFrame) -> Vec<TrackEvent> {
        match self.decode_input(input) {
            Some(update) => self.apply_update(&update, || {}),
            None => Vec::new(),
        }
    }

    /// Apply a decoded input to its aircraft.
    ///
    /// `on_locked` runs once the aircraft's lock is held and before any
    /// field changes. Callers that need arrival order across threads release
    /// the next frame from there.
    pub fn apply_update(&self, update: &Update, on_locked: impl FnOnce()) -> Vec<TrackEvent> {
        match update {
            Update::ModeS { frame, signal } => {
                let lookup = Lookup::for_frame(frame);
                self.apply_with(frame.icao(), frame.received_at(), lookup, on_locked, |ac| {
                    if signal.is_some() {
                        ac.signal = *signal;
                    }
                    trace!(df = frame.df(), frame = frame.raw(), "applying frame");
                    self.apply_mode_s(ac, frame)
                })
            }
            Update::Sbs1(frame) => {
                self.apply_with(frame.icao, frame.received_at, Lookup::Create, on_locked, |ac| {
                    apply_sbs1_fields(ac, frame)
                })
            }
        }
    }

    /// Apply an already decoded Mode S frame.
    ///
    /// Replies whose address is recovered from parity only update aircraft
    /// already known from a CRC-checked frame.
    pub fn update(&self, frame: &DecodedFrame) -> Vec<TrackEvent> {
        let lookup = Lookup::for_frame(frame);
        self.apply_with(frame.icao(), frame.received_at(), lookup, || {}, |ac| {
            self.apply_mode_s(ac, frame)
        })
    }

    /// Apply an already parsed BaseStation line. Positions arrive resolved.
    pub fn apply_sbs1(&self, frame: &Sbs1Frame) -> Vec<TrackEvent> {
        self.apply_with(frame.icao, frame.received_at, Lookup::Create, || {}, |ac| {
            apply_sbs1_fields(ac, frame)
        })
    }

    fn apply_with(
        &self,
        icao: Icao,
        received_at: f64,
        lookup: Lookup,
        on_locked: impl FnOnce(),
        mutate: impl FnOnce(&mut Aircraft) -> bool,
    ) -> Vec<TrackEvent> {
        self.observe_time(received_at);
        if icao == [0, 0, 0] {
            trace!("no usable address");
            return Vec::new();
        }

        loop {
            let (shared, created) = match lookup {
                Lookup::Create => self.get_or_create(icao, received_at),
                Lookup::KnownOnly => match self.aircraft.get(&icao) {
                    Some(e) => (Arc::clone(e.value()), false),
                    None => {
                        trace!(icao = %icao_to_string(&icao), "reply from unknown address");
                        return Vec::new();
                    }
                },
            };
            let mut ac = lock(&shared);
            if ac.is_retired() {
                // Pruned between the lookup and the lock
                continue;
            }
            on_locked();
            ac.mark_seen(received_at);
            let changed = mutate(&mut *ac);
            return change_events(&ac, created, changed);
        }
    }

    /// Route by DF so each frame only touches the fields it carries.
    fn apply_mode_s(&self, ac: &mut Aircraft, f: &DecodedFrame) -> bool {
        let mut changed = false;
        match f.df() {
            0 | 16 => {
                if let Ok(alt) = f.altitude() {
                    changed |= ac.set_altitude(alt);
                }
                if let Ok(on_ground) = f.on_ground() {
                    changed |= ac.set_on_ground(on_ground);
                }
            }
            4 | 5 | 20 | 21 => {
                if let Ok(on_ground) = f.on_ground() {
                    changed |= ac.set_on_ground(on_ground);
                }
                changed |= ac.set_alert(f.alert());
                if let Ok(alt) = f.altitude() {
                    changed |= ac.set_altitude(alt);
                }
                if let Ok(status) = f.flight_status_text() {
                    changed |= ac.set_flight_status(status);
                }
                if let Ok(special) = f.special() {
                    changed |= ac.set_special(special);
                }
                if let Ok(squawk) = f.squawk() {
                    changed |= ac.set_squawk(squawk);
                }
                if let Ok(Bds::Identification { callsign }) = f.bds() {
                    changed |= ac.set_callsign(callsign);
                }
            }
            11 => {
                if let Ok(on_ground) = f.on_ground() {
                    changed |= ac.set_on_ground(on_ground);
                }
            }
            17 | 18 => changed |= self.apply_extended_squitter(ac, f),
            df => trace!(df, "nothing to track"),
        }
        changed
    }

    fn apply_extended_squitter(&self, ac: &mut Aircraft, f: &DecodedFrame) -> bool {
        let Some(kind) = f.message_kind() else {
            return false;
        };

        let mut changed = false;
        match kind {
            MessageKind::Identification => {
                if let Ok(callsign) = f.callsign() {
                    changed |= ac.set_callsign(callsign);
                }
                if let Ok(category) = f.category() {
                    changed |= ac.set_category(category);
                }
            }
            MessageKind::SurfacePosition => {
                changed |= apply_motion(ac, f);
                changed |= self.resolve_position(ac, f, true);
            }
            MessageKind::AirbornePosition => {
                if let Ok(on_ground) = f.on_ground() {
                    changed |= ac.set_on_ground(on_ground);
                }
                if let Ok(alt) = f.altitude() {
                    changed |= ac.set_altitude(alt);
                }
                let surveillance = f
                    .surveillance_status()
                    .ok()
                    .filter(|&ss| ss != 0)
                    .map(|ss| SURVEILLANCE_STATUS_TABLE[(ss & 3) as usize]);
                changed |= ac.set_surveillance(surveillance);
                changed |= self.resolve_position(ac, f, false);
            }
            MessageKind::AirborneVelocity => {
                changed |= apply_motion(ac, f);
                if let Ok(rate) = f.vertical_rate() {
                    changed |= ac.set_vertical_rate(rate);
                }
            }
            MessageKind::TestMessage => {
                if let Ok(squawk) = f.squawk() {
                    if squawk > 0 {
                        changed |= ac.set_squawk(squawk);
                    }
                }
            }
            MessageKind::AircraftStatus => {
                changed |= ac.set_alert(f.alert());
                if f.alert() {
                    if let Ok(text) = f.emergency_text() {
                        changed |= ac.set_emergency(text);
                    }
                }
                if let Ok(squawk) = f.squawk() {
                    changed |= ac.set_squawk(squawk);
                }
            }
            MessageKind::OperationalStatus => {
                if let Ok(on_ground) = f.on_ground() {
                    changed |= ac.set_on_ground(on_ground);
                }
            }
            other => trace!(kind = ?other, "ignoring extended squitter"),
        }
        changed
    }

    /// Feed the frame's CPR sample to the aircraft and try to resolve it.
    ///
    /// Returns `true` when a new position was recorded.
    fn resolve_position(&self, ac: &mut Aircraft, f: &DecodedFrame, on_ground: bool) -> bool {
        let Ok(cpr) = f.cpr() else {
            return false;
        };
        let icao = icao_to_string(&ac.icao());
        let t = f.received_at();

        let stored = if cpr.odd {
            ac.cpr.set_odd(cpr.lat, cpr.lon, t)
        } else {
            ac.cpr.set_even(cpr.lat, cpr.lon, t)
        };
        if let Err(e) = stored {
            debug!(icao = %icao, error = %e, "bad CPR sample");
            return false;
        }
        if !ac.cpr.can_decode() {
            return false;
        }

        let (ref_lat, ref_lon) = if on_ground {
            self.surface_reference(ac)
        } else {
            (0.0, 0.0)
        };
        let position = match ac.cpr.decode(on_ground, ref_lat, ref_lon) {
            Ok(p) => p,
            Err(e) => {
                debug!(icao = %icao, error = %e, "CPR decode failed");
                return false;
            }
        };

        match ac.add_position(position.lat, position.lon, t) {
            Ok(jump) => {
                self.positions_resolved.fetch_add(1, Ordering::Relaxed);
                if let Some(jump) = jump {
                    info!(
                        icao = %icao,
                        distance_m = jump.distance_m,
                        max_plausible_m = jump.max_plausible_m,
                        elapsed_secs = jump.elapsed_secs,
                        "track discontinuity"
                    );
                }
                true
            }
            Err(e) => {
                debug!(icao = %icao, error = %e, "position rejected");
                false
            }
        }
    }

    /// Receiver position if configured, else the aircraft's last fix.
    fn surface_reference(&self, ac: &Aircraft) -> (f64, f64) {
        self.reference
            .or_else(|| ac.position().map(|p| (p.lat, p.lon)))
            .unwrap_or((0.0, 0.0))
    }

    // -- Pruning --

    /// Remove aircraft silent for longer than the configured timeout at
    /// `now`, usually [`Tracker::clock`].
    ///
    /// Each removal emits `Removed` with the final state; an `Info` event
    /// closes the sweep. Each aircraft lock is held only to check its
    /// last-seen time and, if stale, unlink it from the map.
    ///
    /// The map's shard lock is never held while waiting on an aircraft lock.
    pub fn prune(&self, now: f64) -> Vec<TrackEvent> {
        let cutoff = now - self.config.timeout_secs as f64;

        let mut events = Vec::new();
        for (icao, aircraft) in self.entries() {
            let mut ac = lock(&aircraft);
            if ac.last_seen >= cutoff {
                continue;
            }
            // Only unlink the record we checked, not one created since.
            let unlinked = self
                .aircraft
                .remove_if(&icao, |_, current| Arc::ptr_eq(current, &aircraft))
                .is_some();
            if unlinked {
                ac.retire();
                debug!(icao = %icao_to_string(&icao), "pruned aircraft");
                events.push(TrackEvent::Removed {
                    aircraft: ac.snapshot(),
                });
            }
        }

        events.push(self.info());
        events
    }

    pub fn info(&self) -> TrackEvent {
        TrackEvent::Info {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            aircraft_tracked: self.aircraft.len(),
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

/// Fields a BaseStation line carries, already in engineering units.
fn apply_sbs1_fields(ac: &mut Aircraft, frame: &Sbs1Frame) -> bool {
    let mut changed = false;
    if let Some(callsign) = &frame.callsign {
        changed |= ac.set_callsign(callsign);
    }
    if let Some(alt) = frame.altitude {
        changed |= ac.set_altitude(Altitude::feet(alt, AltitudeEncoding::Reported));
    }
    if let Some(knots) = frame.ground_speed {
        changed |= ac.set_speed(Speed {
            knots,
            kind: SpeedKind::Ground,
        });
    }
    if let Some(track) = frame.track {
        changed |= ac.set_heading(track);
    }
    if let Some(rate) = frame.vertical_rate {
        changed |= ac.set_vertical_rate(rate);
    }
    if let Some(squawk) = frame.squawk {
        changed |= ac.set_squawk(squawk);
    }
    if let Some(alert) = frame.alert {
        changed |= ac.set_alert(alert);
    }
    if frame.emergency == Some(true) {
        changed |= ac.set_special("Emergency");
    }
    if let Some(on_ground) = frame.on_ground {
        changed |= ac.set_on_ground(on_ground);
    }
    if let Some((lat, lon)) = frame.position() {
        let icao = icao_to_string(&frame.icao);
        match ac.add_position(lat, lon, frame.received_at) {
            Ok(jump) => {
                changed = true;
                if jump.is_some() {
                    info!(icao = %icao, "track discontinuity");
                }
            }
            Err(e) => debug!(icao = %icao, error = %e, "position rejected"),
        }
    }
    changed
}

/// Heading, speed and ground flag shared by surface position and velocity.
fn apply_motion(ac: &mut Aircraft, f: &DecodedFrame) -> bool {
    let mut changed = false;
    if let Ok(heading) = f.heading() {
        changed |= ac.set_heading(heading);
    }
    if let Ok(speed) = f.speed() {
        changed |= ac.set_speed(speed);
    }
    if let Ok(on_ground) = f.on_ground() {
        changed |= ac.set_on_ground(on_ground);
    }
    changed
}

/// At most one event per frame.
fn change_events(ac: &Aircraft, created: bool, changed: bool) -> Vec<TrackEvent> {
    if created {
        vec![TrackEvent::NewAircraft {
            aircraft: ac.snapshot(),
        }]
    } else if changed {
        vec![TrackEvent::Changed {
            aircraft: ac.snapshot(),
        }]
    } else {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
