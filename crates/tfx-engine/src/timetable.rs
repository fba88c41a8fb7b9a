//! Seek-table precomputation.
//!
//! Dry-runs the whole replay path (without mixing) once per player
//! construction, recording when each trackstep position is first
//! reached. The run is bounded, so a malformed module that never ends
//! still terminates with a truncated table.

use alloc::vec::Vec;

use tfx_ir::{clocks_to_duration, Module, SongPos, TimeEntry};

use crate::player::Player;

/// Upper bound on simulated ticks; several hours of song time.
const MAX_TICKS: u64 = 2_000_000;

pub(crate) struct Precomputed {
    pub entries: Vec<TimeEntry>,
    /// Raw E-clock counts per position, for exact seek bookkeeping.
    pub pos_clocks: Vec<(u16, u64)>,
    pub total_clocks: u64,
    /// Timeshare (7-voice) mode was seen somewhere in the song.
    pub seven_voice: bool,
}

pub(crate) fn precompute(module: &Module, subsong: u16, rate: u32) -> Precomputed {
    let mut p = Player::bare(module, subsong, rate);
    p.restart(None);

    let mut pos_clocks: Vec<(u16, u64)> = Vec::new();
    pos_clocks.push((p.tracker.curr_pos, 0));
    let mut seven_voice = p.multimode;

    let mut last_pos = p.tracker.curr_pos;
    let mut ticks = 0u64;
    while p.state.enabled && !p.state.ended {
        p.tick();
        ticks += 1;
        if p.multimode {
            seven_voice = true;
        }
        let pos = p.tracker.curr_pos;
        if pos != last_pos {
            last_pos = pos;
            if !pos_clocks.iter().any(|&(row, _)| row == pos) {
                pos_clocks.push((pos, p.elapsed_clocks));
            }
        }
        if ticks >= MAX_TICKS {
            log::warn!("subsong {subsong} never ended, truncating time table");
            break;
        }
    }

    // Songs that end by wrapping back to an already-seen position leave
    // the final pass unrecorded; close the table at the song end so the
    // last entry always lines up with the total duration.
    if pos_clocks
        .last()
        .is_some_and(|&(_, clocks)| clocks < p.elapsed_clocks)
    {
        pos_clocks.push((p.tracker.curr_pos, p.elapsed_clocks));
    }

    let entries = pos_clocks
        .iter()
        .map(|&(row, clocks)| TimeEntry {
            pos: SongPos(row),
            time: clocks_to_duration(clocks),
        })
        .collect();

    Precomputed {
        entries,
        pos_clocks,
        total_clocks: p.elapsed_clocks,
        seven_voice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tfx_ir::{Subsong, TRACK_CMD_MARK};

    /// Two pattern rows then a stop row. The pattern is a single end op,
    /// so each position lasts one sequencer tick.
    fn tiny_module() -> Module {
        let mut m = Module::default();
        m.subsongs = vec![Subsong { start: 0, end: 2, tempo: 0 }];
        m.trackstep_start = 0;
        m.trackstep_rows = 3;
        let mut control = vec![0u32; 16];
        // rows 0 and 1: pattern 0 on slot 0, the rest stopped (0xFF00)
        control[0] = 0x0000_FF00;
        control[1] = 0xFF00_FF00;
        control[2] = 0xFF00_FF00;
        control[3] = 0xFF00_FF00;
        control[4] = 0x0000_FF00;
        control[5] = 0xFF00_FF00;
        control[6] = 0xFF00_FF00;
        control[7] = 0xFF00_FF00;
        // row 2: stop command
        control[8] = u32::from(TRACK_CMD_MARK) << 16;
        // pattern 0 at word 12: wait one row, then end
        control[12] = 0xF301_0000;
        control[13] = 0xF000_0000;
        m.control = control;
        m.pattern_starts = vec![12];
        m
    }

    #[test]
    fn table_is_monotone_and_ends() {
        let m = tiny_module();
        let t = precompute(&m, 0, 44100);
        assert_eq!(t.entries.len(), 3);
        for pair in t.entries.windows(2) {
            assert!(pair[0].time < pair[1].time);
            assert!(pair[0].pos < pair[1].pos);
        }
        assert!(t.total_clocks > 0);
        assert!(!t.seven_voice);
    }

    #[test]
    fn wrap_ending_song_closes_the_table() {
        let mut m = tiny_module();
        // Drop the stop row; the song now ends by wrapping past row 1.
        m.subsongs = vec![Subsong { start: 0, end: 1, tempo: 0 }];
        let t = precompute(&m, 0, 44100);
        let last = t.entries.last().unwrap();
        assert_eq!(last.time, clocks_to_duration(t.total_clocks));
    }

    #[test]
    fn timeshare_is_detected() {
        let mut m = tiny_module();
        // Row 1 becomes a timeshare command.
        m.control[4] = (u32::from(TRACK_CMD_MARK) << 16) | 3;
        m.control[5] = 0;
        let t = precompute(&m, 0, 44100);
        assert!(t.seven_voice);
    }
}
