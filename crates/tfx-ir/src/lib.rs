//! Core data model for the tfxplay TFMX replayer.
//!
//! This crate defines the immutable, fixed-up representation of a loaded
//! module. The format loader produces it, and the playback engine consumes
//! it. All file-relative byte offsets have already been converted to
//! bounds-checked word indices by the time a `Module` exists.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod module;
mod notes;
mod ops;
mod time;

pub use module::{Module, Quirks, Subsong, MAX_MACROS, MAX_PATTERNS, MAX_SUBSONGS, MAX_VOICES};
pub use notes::{detuned_period, NOTE_PERIODS};
pub use ops::{op_bytes, op_u16, MacroOp, NoteCmd, PatternOp, TrackCmd, TRACK_CMD_MARK};
pub use time::{clocks_to_duration, tempo_to_clocks, SongPos, TimeEntry, CIA_BASE_CLOCK, DEFAULT_TICK_CLOCKS};
