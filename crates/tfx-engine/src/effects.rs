//! Per-tick real-time effects: add-begin, vibrato, portamento, envelope
//! and the global master fade.

use crate::sequencer::PlayState;
use crate::voice::VoiceState;

/// Advance every armed effect on one voice by one tick, then step the
/// global fade. Runs after the macro interpreter, so period and volume
/// written here win for the current tick.
pub(crate) fn tick_effects(c: &mut VoiceState, state: &mut PlayState) {
    if c.efx_run < 0 {
        return;
    }
    // One silent tick between note-on and the first effect step.
    if c.efx_run == 0 {
        c.efx_run = 1;
        return;
    }

    if c.add_begin_time != 0 {
        c.addr = c.addr.wrapping_add_signed(c.add_begin);
        c.saved_addr = c.addr;
        c.add_begin_time -= 1;
        if c.add_begin_time == 0 {
            c.add_begin = -c.add_begin;
            c.add_begin_time = c.add_begin_reset;
        }
    }

    if c.vib_reset != 0 {
        c.vib_offset = c.vib_offset.wrapping_add(i16::from(c.vib_width));
        let period =
            (i32::from(c.dest_period) * (0x800 + i32::from(c.vib_offset))) >> 11;
        if c.porta_rate == 0 {
            c.period = period as u16;
        }
        c.vib_time = c.vib_time.wrapping_sub(1);
        if c.vib_time == 0 {
            c.vib_time = c.vib_reset;
            c.vib_width = -c.vib_width;
        }
    }

    if c.porta_rate != 0 {
        c.porta_time = c.porta_time.wrapping_sub(1);
        if c.porta_time == 0 {
            c.porta_time = c.porta_reset;
            step_portamento(c);
        }
        c.period = c.porta_period;
    }

    if c.env_reset != 0 {
        c.env_time = c.env_time.wrapping_sub(1);
        if c.env_time == 0 {
            c.env_time = c.env_reset;
            step_envelope(c);
        }
    }

    if state.fade_slope != 0 {
        state.fade_time = state.fade_time.wrapping_sub(1);
        if state.fade_time == 0 {
            state.fade_time = state.fade_reset;
            state.master_vol = state.master_vol.wrapping_add(state.fade_slope);
            if state.master_vol == state.fade_dest {
                state.fade_slope = 0;
            }
        }
    }
}

/// Geometric slide toward the destination period, snapping exactly on
/// arrival or overshoot so a slide never rings around the target.
fn step_portamento(c: &mut VoiceState) {
    let rate = i32::from(c.porta_rate);
    let dest = i32::from(c.dest_period);
    let cur = i32::from(c.porta_period);
    if cur == dest {
        c.porta_rate = 0;
        return;
    }
    if cur < dest {
        let next = (cur * (256 + rate)) >> 8;
        if next >= dest {
            c.porta_period = c.dest_period;
            c.porta_rate = 0;
        } else {
            c.porta_period = next as u16;
        }
    } else {
        let next = (cur * (256 - rate) - 128) >> 8;
        if next <= dest {
            c.porta_period = c.dest_period;
            c.porta_rate = 0;
        } else {
            c.porta_period = next as u16;
        }
    }
}

/// Linear ramp of the voice volume toward the envelope target.
fn step_envelope(c: &mut VoiceState) {
    let rate = i16::from(c.env_rate);
    let target = i16::from(c.env_target);
    let vol = i16::from(c.volume);
    if vol == target {
        c.env_reset = 0;
        return;
    }
    let next = if vol < target {
        (vol + rate).min(target)
    } else {
        (vol - rate).max(target)
    };
    c.volume = next as i8;
    if next == target {
        c.env_reset = 0;
    }
}

/// Start (or cut short) a master volume fade.
pub(crate) fn start_fade(state: &mut PlayState, speed: u8, target: u8) {
    let speed = speed as i8;
    let target = target as i8;
    state.fade_dest = target;
    state.fade_time = speed;
    state.fade_reset = speed;
    if speed == 0 || state.master_vol == speed {
        state.master_vol = target;
        state.fade_slope = 0;
        return;
    }
    state.fade_slope = if state.master_vol > target { -1 } else { 1 };
}
