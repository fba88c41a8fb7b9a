//! TFMX replay engine.
//!
//! [`Player`] drives everything: the eight-slot trackstep/pattern
//! sequencer feeds note events into per-voice macro interpreters, the
//! interpreters program virtual Paula voices, and the mixer resamples
//! those voices into interleaved-by-channel `i16` buffers. All state
//! is integer arithmetic on a borrowed [`tfx_ir::Module`]; nothing
//! here allocates per frame.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod mixer;
mod player;
mod sequencer;
mod timetable;
mod vm;
mod voice;

pub use mixer::{DmaMode, HwVoice, LoopPolicy};
pub use player::{Player, RenderResult};
pub use voice::VoiceState;
