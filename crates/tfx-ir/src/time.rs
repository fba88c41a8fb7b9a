//! Song positions and tick timing.

use core::time::Duration;

/// CIA E-clock ticks per second, the reference for tempo conversion.
/// `tempo >= 0x10` selects `CIA_BASE_CLOCK / tempo` E-clocks per timer tick.
pub const CIA_BASE_CLOCK: u32 = 0x001B_51F8;

/// Default E-clocks per tick (125 BPM, NTSC timing).
pub const DEFAULT_TICK_CLOCKS: u32 = 14318;

/// A trackstep position within a subsong.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SongPos(pub u16);

/// One row of the precomputed seek table: elapsed time at the start of a
/// trackstep position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeEntry {
    pub pos: SongPos,
    pub time: Duration,
}

/// E-clocks per tick for a BPM-style tempo value (`tempo >= 0x10`).
pub const fn tempo_to_clocks(tempo: u16) -> u32 {
    CIA_BASE_CLOCK / tempo as u32
}

/// Convert an accumulated E-clock count to wall-clock time.
pub fn clocks_to_duration(clocks: u64) -> Duration {
    Duration::from_micros(clocks * 1_000_000 / CIA_BASE_CLOCK as u64)
}
