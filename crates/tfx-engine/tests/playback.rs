//! End-to-end playback tests against hand-built modules.

use tfx_engine::Player;
use tfx_ir::{Module, SongPos, Subsong, TRACK_CMD_MARK};

const RATE: u32 = 44100;

/// Assemble a module from trackstep rows, patterns and macros laid out
/// back to back in control memory.
fn build_module(
    rows: &[[u16; 8]],
    patterns: &[&[u32]],
    macros: &[&[u32]],
    samples: &[i8],
    tempo: u16,
) -> Module {
    let mut control: Vec<u32> = Vec::new();
    for row in rows {
        for pair in row.chunks(2) {
            control.push(u32::from(pair[0]) << 16 | u32::from(pair[1]));
        }
    }
    let mut pattern_starts = Vec::new();
    for p in patterns {
        pattern_starts.push(control.len() as u32);
        control.extend_from_slice(p);
    }
    let mut macro_starts = Vec::new();
    for m in macros {
        macro_starts.push(control.len() as u32);
        control.extend_from_slice(m);
    }
    let mut module = Module::default();
    module.subsongs = vec![Subsong {
        start: 0,
        end: (rows.len() - 1) as u16,
        tempo,
    }];
    module.trackstep_start = 0;
    module.trackstep_rows = rows.len();
    module.control = control;
    module.pattern_starts = pattern_starts;
    module.macro_starts = macro_starts;
    module.samples = samples.to_vec();
    module
}

const REST: u16 = 0xFF00;
const STOP_ROW: [u16; 8] = [TRACK_CMD_MARK, 0, 0, 0, 0, 0, 0, 0];

/// A macro that points the voice at the sample blob, sets a fixed
/// period and volume, starts DMA and idles.
fn beep_macro() -> Vec<u32> {
    vec![
        0x0200_0000, // begin 0
        0x0300_0010, // 0x10 words
        0x1700_06AE, // lowest note period
        0x0E00_0040, // full volume
        0x0100_0000, // dma on
        0x0400_00FF, // long wait
        0x0700_0000,
    ]
}

/// Note-on (macro 0, voice 0) with an inline wait, then pattern end.
fn note_pattern(wait: u8) -> Vec<u32> {
    vec![0x8000_0000 | u32::from(wait), 0xF000_0000]
}

fn render_frames(player: &mut Player, frames: usize) -> (Vec<Vec<i16>>, tfx_engine::RenderResult) {
    let chans = player.channel_count();
    let mut bufs = vec![vec![0i16; frames]; chans];
    let mut slices: Vec<&mut [i16]> = bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
    let result = player.render(&mut slices);
    (bufs, result)
}

#[test]
fn time_table_is_monotone() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(8)], &[&beep_macro()], &[0; 64], 0);
    let p = Player::new(&m, 0, RATE);
    let table = p.time_table();
    assert_eq!(table.len(), 4);
    assert_eq!(table[0].pos, SongPos(0));
    for pair in table.windows(2) {
        assert!(pair[0].time < pair[1].time);
        assert!(pair[0].pos < pair[1].pos);
    }
}

#[test]
fn seek_lands_on_the_requested_position() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(8)], &[&beep_macro()], &[0; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    let table = p.time_table().to_vec();
    // The last entry is the stop row; seeking there ends at once.
    for entry in &table[..table.len() - 1] {
        p.seek(entry.pos);
        assert_eq!(p.position(), entry.pos);
        assert_eq!(p.elapsed(), entry.time);
        assert!(!p.ended());
    }
    let last = table.last().unwrap();
    p.seek(last.pos);
    assert_eq!(p.position(), last.pos);
    assert!(p.ended());
}

#[test]
fn seek_clamps_to_the_subsong_range() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(4)], &[&beep_macro()], &[0; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    p.seek(SongPos(500));
    assert!(p.position().0 <= 1);
}

#[test]
fn stop_row_at_the_start_ends_immediately() {
    let rows = [STOP_ROW];
    let m = build_module(&rows, &[], &[], &[], 0);
    let mut p = Player::new(&m, 0, RATE);
    let (bufs, result) = render_frames(&mut p, 512);
    assert!(result.ended);
    assert!(bufs.iter().all(|b| b.iter().all(|&s| s == 0)));
}

#[test]
fn beep_produces_audio_on_voice_zero_only() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(0x40)], &[&beep_macro()], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    assert_eq!(p.channel_count(), 4);
    let (bufs, _) = render_frames(&mut p, 4096);
    assert!(bufs[0].iter().any(|&s| s != 0));
    for buf in &bufs[1..] {
        assert!(buf.iter().all(|&s| s == 0));
    }
}

#[test]
fn full_volume_sample_has_the_expected_level() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(0x40)], &[&beep_macro()], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    let (bufs, _) = render_frames(&mut p, 4096);
    // sample 100 at volume 0x40: (100 * 0x40) << 2
    let expected = (100 * 0x40) << 2;
    let first = bufs[0].iter().position(|&s| s != 0).expect("some audio");
    assert!(bufs[0][first..first + 64].iter().all(|&s| i32::from(s) == expected));
}

#[test]
fn dma_off_silences_a_playing_voice() {
    // Beep for two ticks, then switch DMA off and stop.
    let mac = vec![
        0x0200_0000,
        0x0300_0010,
        0x1700_06AE,
        0x0E00_0040,
        0x0100_0000,
        0x0400_0002, // wait 2 ticks
        0x1300_0000, // dma off
        0x0700_0000,
    ];
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(0x40)], &[&mac], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    let (bufs, _) = render_frames(&mut p, 8192);
    let first = bufs[0].iter().position(|&s| s != 0).expect("some audio");
    let last = bufs[0].iter().rposition(|&s| s != 0).unwrap();
    // Audio starts, then the tail of the buffer is silent again.
    assert!(last > first);
    assert!(last < 8191);
}

#[test]
fn infinite_pattern_loop_alone_reports_ended() {
    // One slot plays a note then loops forever; all others are stopped.
    let looping = vec![
        0x8000_0004, // note with wait 4
        0xF100_0000, // loop to step 0 forever
    ];
    let rows = [[0x0000, REST, REST, REST, REST, REST, REST, REST]; 1];
    let m = build_module(&rows, &[&looping], &[&beep_macro()], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    let mut ended = false;
    for _ in 0..20 {
        let (_, result) = render_frames(&mut p, 2048);
        if result.ended {
            ended = true;
            break;
        }
    }
    assert!(ended);
    // The loop keeps playing after the end is reported.
    let (bufs, result) = render_frames(&mut p, 2048);
    assert!(result.ended);
    assert!(bufs[0].iter().any(|&s| s != 0));
}

#[test]
fn active_slot_blocks_the_loop_consensus() {
    // Slot 0 loops forever, slot 1 is still waiting out a long pattern.
    let looping = vec![0x8000_0004, 0xF100_0000];
    let waiting = vec![0xF3FF_0000, 0xF000_0000]; // wait 255 rows, end
    let rows = [[0x0000, 0x0100, REST, REST, REST, REST, REST, REST]; 1];
    let m = build_module(
        &rows,
        &[&looping, &waiting],
        &[&beep_macro()],
        &[100; 64],
        0,
    );
    let mut p = Player::new(&m, 0, RATE);
    let (_, result) = render_frames(&mut p, 8192);
    assert!(!result.ended);
}

#[test]
fn pattern_end_flags_a_position_change() {
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(2)], &[&beep_macro()], &[0; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    let mut seen = false;
    for _ in 0..40 {
        let (_, result) = render_frames(&mut p, 1024);
        if result.position_changed {
            seen = true;
            break;
        }
        if result.ended {
            break;
        }
    }
    assert!(seen);
}

#[test]
fn timeshare_switches_to_seven_channels() {
    let timeshare_row: [u16; 8] = [TRACK_CMD_MARK, 3, 0, 0, 0, 0, 0, 0];
    let rows = [
        timeshare_row,
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(8)], &[&beep_macro()], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    assert_eq!(p.channel_count(), 7);
    let (bufs, _) = render_frames(&mut p, 2048);
    assert_eq!(bufs.len(), 7);
    assert!(bufs[0].iter().any(|&s| s != 0));
}

#[test]
fn master_fade_to_zero_silences_the_mix() {
    // Trackstep fade to zero volume with speed 1, then a long note.
    let fade_row: [u16; 8] = [TRACK_CMD_MARK, 4, 1, 0, 0, 0, 0, 0];
    let rows = [
        fade_row,
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let m = build_module(&rows, &[&note_pattern(0xFF)], &[&beep_macro()], &[100; 64], 0);
    let mut p = Player::new(&m, 0, RATE);
    // By the end of a long render the fade has reached zero.
    let mut tail_silent = false;
    for _ in 0..30 {
        let (bufs, result) = render_frames(&mut p, 4096);
        tail_silent = bufs[0][3500..].iter().all(|&s| s == 0);
        if result.ended {
            break;
        }
    }
    assert!(tail_silent);
}

#[test]
fn extreme_period_at_high_rate_renders_safely() {
    // Period 0xFFFF at 192 kHz pushes the delta computation well past
    // the 32-bit range of period * rate.
    let rows = [
        [0x0000, REST, REST, REST, REST, REST, REST, REST],
        STOP_ROW,
    ];
    let mac = vec![
        0x0200_0000,
        0x0300_0010,
        0x1700_FFFF, // largest encodable period
        0x0E00_0040,
        0x0100_0000,
        0x0400_00FF,
        0x0700_0000,
    ];
    let m = build_module(&rows, &[&note_pattern(8)], &[&mac], &[100; 64], 0);
    let mut p = Player::new(&m, 0, 192_000);
    let (bufs, _) = render_frames(&mut p, 4096);
    assert_eq!(bufs[0].len(), 4096);
}
