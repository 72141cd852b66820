//! squitter-core: Mode S / ADS-B decoding and aircraft tracking.
//!
//! Decoding and CPR resolution are pure functions. The [`Tracker`] is safe to
//! share across threads, and [`Pipeline`] runs it behind a tokio worker pool.
//! Transports (sockets, files, message buses) live outside this crate and
//! hand in [`InputFrame`]s.

pub mod adsb;
pub mod aircraft;
pub mod altitude;
pub mod beast;
pub mod commb;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod decode;
pub mod frame;
pub mod input;
pub mod pipeline;
pub mod sbs1;
pub mod tracker;
pub mod types;

// Re-export commonly used types at crate root
pub use aircraft::{Aircraft, AircraftSnapshot, PositionFix};
pub use beast::{BeastDecoder, BeastRecord};
pub use config::{Config, PipelineConfig, ReceiverConfig, TrackerConfig};
pub use cpr::{CprResolver, ResolvedPosition};
pub use decode::{decode, Decoded, DecodedFrame};
pub use input::InputFrame;
pub use pipeline::Pipeline;
pub use sbs1::{parse_sbs1, Sbs1Frame};
pub use tracker::{TrackEvent, Tracker, TrackerStats, Update};
pub use types::*;
