//! The per-voice macro byte-code interpreter.
//!
//! A macro runs in a tight fetch/execute loop until an opcode yields
//! (wait, DMA wait, stop, or a pitch write in new-style macros). The
//! old macro dialect instead defers the yield by one instruction: the
//! `defer_yield` flag swallows exactly one yield and clears itself.

use tfx_ir::{detuned_period, MacroOp, Module};

use crate::mixer::{DmaMode, HwVoice, LoopPolicy};
use crate::voice::{dispatch_note, VoiceState};

/// Instructions one macro may execute in a single tick before it is
/// declared stuck and stopped. Real macros yield every few steps; only
/// a branch cycle with no yielding op gets anywhere near this.
const MAX_STEPS_PER_TICK: u32 = 2048;

/// Run one voice's macro program until it yields.
pub(crate) fn run_macro(
    module: &Module,
    multimode: bool,
    voices: &mut [VoiceState],
    hw: &mut [HwVoice],
    cues: &mut [u16; 4],
    idx: usize,
) {
    voices[idx].macro_wait = 0;
    let mut steps = 0u32;
    loop {
        let c = &mut voices[idx];
        steps += 1;
        if steps > MAX_STEPS_PER_TICK {
            log::warn!("macro {} stuck, stopping voice {idx}", c.macro_num);
            c.macro_run = false;
            return;
        }
        let index = c.macro_ptr as usize + usize::from(c.macro_step);
        c.macro_step = c.macro_step.wrapping_add(1);
        let Some(word) = module.word(index) else {
            log::warn!("macro {} ran past the control data", c.macro_num);
            c.macro_run = false;
            return;
        };
        match MacroOp::decode(word) {
            MacroOp::DmaOffReset {
                hold,
                gemx_mode,
                gemx_vol,
            } => {
                c.add_begin_time = 0;
                c.porta_rate = 0;
                c.vib_reset = 0;
                c.env_reset = 0;
                if module.quirks.gemx {
                    c.volume = if gemx_mode != 0 {
                        gemx_vol as i8
                    } else {
                        (i32::from(gemx_vol) + i32::from(c.velocity) * 3) as i8
                    };
                }
                if dma_off(c, &mut hw[idx], hold) {
                    return;
                }
            }
            MacroOp::DmaOff { hold } => {
                if dma_off(c, &mut hw[idx], hold) {
                    return;
                }
            }
            MacroOp::DmaOn { efx } => {
                c.efx_run = efx as i8;
                hw[idx].mode = DmaMode::Pending;
            }
            MacroOp::SetBegin { addr } => {
                c.add_begin_time = 0;
                c.addr = addr;
                c.saved_addr = addr;
            }
            MacroOp::SetBeginCurrent { addr } => {
                c.add_begin_time = 0;
                c.addr = addr;
            }
            MacroOp::AddBegin { ticks, delta } => {
                c.add_begin = i32::from(delta);
                c.add_begin_reset = ticks;
                c.add_begin_time = ticks;
                if !module.quirks.zero_finetune {
                    c.addr = c.addr.wrapping_add_signed(c.add_begin);
                    c.saved_addr = c.addr;
                }
            }
            MacroOp::SetLen { len } => {
                c.len = len;
                c.saved_len = len;
            }
            MacroOp::AddLen { delta } => {
                c.len = c.len.wrapping_add_signed(delta);
                c.saved_len = c.len;
            }
            MacroOp::Wait { really, ticks } => {
                if really {
                    let armed = c.really_wait;
                    c.really_wait = c.really_wait.wrapping_add(1);
                    if armed != 0 {
                        return;
                    }
                }
                c.macro_wait = ticks;
                if !clear_deferred(c) {
                    return;
                }
            }
            MacroOp::WaitDmaCycles { cycles } => {
                hw[idx].loop_policy = LoopPolicy::CountDma { voice: idx };
                c.wait_dma = cycles;
                c.macro_run = false;
                if !clear_deferred(c) {
                    return;
                }
            }
            MacroOp::WaitKeyUp { count } => {
                if !c.key_down {
                    c.loop_count = 0;
                }
                if c.loop_count == 0 {
                    c.loop_count = -1;
                } else {
                    if c.loop_count == -1 {
                        c.loop_count = i16::from(count).wrapping_sub(1);
                    } else {
                        c.loop_count -= 1;
                    }
                    // Re-execute this step on the next tick.
                    c.macro_step = c.macro_step.wrapping_sub(1);
                    return;
                }
            }
            MacroOp::Loop { count, step } => {
                take_loop(c, count, step);
            }
            MacroOp::LoopKeyUp { count, step } => {
                if c.key_down {
                    take_loop(c, count, step);
                }
            }
            MacroOp::Cont { mac, step } => {
                if !call_macro(module, c, mac, step) {
                    return;
                }
            }
            MacroOp::GoSub { mac, step } => {
                c.ret_ptr = c.macro_ptr;
                c.ret_step = c.macro_step;
                if !call_macro(module, c, mac, step) {
                    return;
                }
            }
            MacroOp::ReturnSub => {
                c.macro_ptr = c.ret_ptr;
                c.macro_step = c.ret_step;
            }
            MacroOp::Stop => {
                c.macro_run = false;
                return;
            }
            MacroOp::NoteSplit { note, step } => {
                if c.note > note {
                    c.macro_step = step;
                }
            }
            MacroOp::VolSplit { vol, step } => {
                if c.volume > vol as i8 {
                    c.macro_step = step;
                }
            }
            MacroOp::AddNote { add, detune } => {
                if !set_note_period(c, c.note.wrapping_add(add), detune) {
                    return;
                }
            }
            MacroOp::SetNote { note, detune } => {
                if !set_note_period(c, note, detune) {
                    return;
                }
            }
            MacroOp::AddPrevNote { add, detune } => {
                if !set_note_period(c, c.prev_note.wrapping_add(add), detune) {
                    return;
                }
            }
            MacroOp::SetPeriod { period } => {
                c.dest_period = period;
                if c.porta_rate == 0 {
                    c.period = period;
                }
            }
            MacroOp::Portamento { reset, rate } => {
                c.porta_reset = reset;
                c.porta_time = 1;
                if c.porta_rate == 0 {
                    c.porta_period = c.dest_period;
                }
                c.porta_rate = rate;
            }
            MacroOp::Vibrato { speed, width } => {
                c.vib_reset = speed;
                c.vib_time = speed >> 1;
                c.vib_width = width;
                if c.porta_rate == 0 {
                    c.period = c.dest_period;
                    c.vib_offset = 0;
                }
            }
            MacroOp::Envelope { rate, ticks, target } => {
                c.env_rate = rate;
                c.env_reset = ticks;
                c.env_time = ticks;
                c.env_target = target;
            }
            MacroOp::AddVolume { mode, vol } => {
                if mode != 0xFE {
                    let v = i32::from(c.velocity) * 3 + i32::from(vol);
                    c.volume = v.min(0x40) as i8;
                }
            }
            MacroOp::SetVolume { mode, vol } => {
                if mode != 0xFE {
                    c.volume = vol as i8;
                }
            }
            MacroOp::ResetEffects => {
                c.add_begin_time = 0;
                c.porta_rate = 0;
                c.vib_reset = 0;
                c.env_reset = 0;
            }
            MacroOp::SampleLoop { offset } => {
                c.saved_addr = c.saved_addr.wrapping_add(u32::from(offset & 0xFFFE));
                c.saved_len = c.saved_len.saturating_sub(offset >> 1);
                c.len = c.saved_len;
                c.addr = c.saved_addr;
            }
            MacroOp::OneShot => {
                c.add_begin_time = 0;
                c.addr = 0;
                c.saved_addr = 0;
                c.len = 1;
                c.saved_len = 1;
            }
            MacroOp::Cue { index, value } => {
                cues[usize::from(index)] = value;
            }
            MacroOp::PlayMacro { mac, chan, detune } => {
                let word = u32::from(c.note) << 24
                    | u32::from(mac) << 16
                    | u32::from(chan | (c.velocity << 4)) << 8
                    | u32::from(detune);
                dispatch_note(module, multimode, voices, word);
            }
            MacroOp::Unknown(op) => {
                log::warn!("ignoring unknown macro opcode {op:#04x}");
            }
        }
    }
}

/// Stop DMA on a voice. Returns true when the caller must yield
/// (`hold` asked for the voice to run on in old-style mode).
fn dma_off(c: &mut VoiceState, h: &mut HwVoice, hold: u8) -> bool {
    h.loop_policy = LoopPolicy::Continue;
    if hold == 0 {
        h.mode = DmaMode::Off;
        if !c.defer_yield {
            h.live_len = 0;
        }
        false
    } else {
        c.defer_yield = true;
        true
    }
}

/// Consume a deferred yield if one is armed. Returns true when the
/// interpreter should keep running.
fn clear_deferred(c: &mut VoiceState) -> bool {
    if c.defer_yield {
        c.defer_yield = false;
        true
    } else {
        false
    }
}

/// Shared bounded-loop logic for `Loop` and `LoopKeyUp`.
fn take_loop(c: &mut VoiceState, count: u8, step: u16) {
    let left = c.loop_count;
    c.loop_count = left.wrapping_sub(1);
    if left == 0 {
        c.loop_count = -1;
        return;
    }
    if c.loop_count < 0 {
        c.loop_count = i16::from(count).wrapping_sub(1);
    }
    c.macro_step = step;
}

/// Redirect the interpreter into another macro. Returns false when the
/// macro does not exist and the voice was stopped.
fn call_macro(module: &Module, c: &mut VoiceState, mac: u8, step: u16) -> bool {
    match module.macro_start(mac) {
        Some(start) => {
            c.macro_num = u16::from(mac);
            c.macro_ptr = start;
            c.macro_step = step;
            c.loop_count = -1;
            true
        }
        None => {
            log::warn!("macro {mac} out of range");
            c.macro_run = false;
            false
        }
    }
}

/// Write a note-table period with finetune and detune applied. Returns
/// true when a deferred yield was consumed (old-style macros keep going).
fn set_note_period(c: &mut VoiceState, note: u8, detune: u8) -> bool {
    let period = detuned_period(note, c.finetune, detune);
    c.dest_period = period;
    if c.porta_rate == 0 {
        c.period = period;
    }
    clear_deferred(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use tfx_ir::Module;

    /// Build a module whose macro 0 is `words`, starting at word 8.
    fn module_with_macro(words: &[u32]) -> Module {
        let mut m = Module::default();
        m.macro_starts = vec![8];
        let mut control = vec![0u32; 8];
        control.extend_from_slice(words);
        m.control = control;
        m
    }

    struct Rig {
        module: Module,
        voices: Vec<VoiceState>,
        hw: Vec<HwVoice>,
        cues: [u16; 4],
    }

    impl Rig {
        fn new(words: &[u32]) -> Self {
            let mut voices = vec![VoiceState::default(); 8];
            voices[0].macro_run = true;
            voices[0].macro_ptr = 8;
            Rig {
                module: module_with_macro(words),
                voices,
                hw: vec![HwVoice::default(); 8],
                cues: [0; 4],
            }
        }

        fn run(&mut self) {
            run_macro(
                &self.module,
                false,
                &mut self.voices,
                &mut self.hw,
                &mut self.cues,
                0,
            );
        }
    }

    #[test]
    fn sample_setup_then_dma_on_goes_pending() {
        let mut rig = Rig::new(&[
            0x0200_0040, // begin 0x40
            0x0300_0010, // length 0x10 words
            0x0100_0000, // dma on
            0x0400_0001, // wait 1
        ]);
        rig.run();
        let c = &rig.voices[0];
        assert_eq!(c.saved_addr, 0x40);
        assert_eq!(c.saved_len, 0x10);
        assert_eq!(rig.hw[0].mode, DmaMode::Pending);
        assert_eq!(c.macro_wait, 1);
    }

    #[test]
    fn stop_kills_the_interpreter() {
        let mut rig = Rig::new(&[0x0700_0000]);
        rig.run();
        assert!(!rig.voices[0].macro_run);
    }

    #[test]
    fn branch_cycle_without_a_yield_is_stopped() {
        // Jump to our own first instruction forever.
        let mut rig = Rig::new(&[0x0600_0000]);
        rig.run();
        assert!(!rig.voices[0].macro_run);
    }

    #[test]
    fn running_past_the_data_stops() {
        let mut rig = Rig::new(&[0x0200_0040]);
        rig.run();
        assert!(!rig.voices[0].macro_run);
    }

    #[test]
    fn set_note_writes_period_and_yields() {
        // note 0x10 + wait, should never reach the volume op.
        let mut rig = Rig::new(&[0x0910_0000, 0x0E00_0030]);
        rig.run();
        let c = &rig.voices[0];
        assert_eq!(c.dest_period, tfx_ir::NOTE_PERIODS[0x10]);
        assert_eq!(c.period, c.dest_period);
        assert_eq!(c.volume, 0);
    }

    #[test]
    fn finite_loop_runs_count_plus_one_times() {
        // volume add 1 then loop back twice, then stop.
        let mut rig = Rig::new(&[
            0x0D00_0001, // add volume (velocity 0): vol = 1
            0x0502_0000, // loop to step 0, count 2
            0x0700_0000,
        ]);
        rig.voices[0].velocity = 0;
        rig.run();
        // Loop body executed 3 times but volume is absolute each pass.
        assert!(!rig.voices[0].macro_run);
        assert_eq!(rig.voices[0].volume, 1);
        assert_eq!(rig.voices[0].loop_count, -1);
    }

    #[test]
    fn dma_wait_suspends_until_mixer_wakes() {
        let mut rig = Rig::new(&[0x1A00_0002, 0x0E00_0020]);
        rig.run();
        assert!(!rig.voices[0].macro_run);
        assert_eq!(rig.voices[0].wait_dma, 2);
        assert_eq!(rig.hw[0].loop_policy, LoopPolicy::CountDma { voice: 0 });
        // Mixer wake-up resumes after the wait op.
        rig.voices[0].macro_run = true;
        rig.run();
        assert_eq!(rig.voices[0].volume, 0x20);
    }

    #[test]
    fn really_wait_swallows_the_first_wait_after_note_on() {
        let mut rig = Rig::new(&[0x0401_0005]);
        rig.voices[0].really_wait = 1;
        rig.run();
        // Yielded without arming the wait counter.
        assert_eq!(rig.voices[0].macro_wait, 0);
        assert!(rig.voices[0].macro_run);
    }

    #[test]
    fn gosub_and_return() {
        let mut m = Module::default();
        m.macro_starts = vec![8, 12];
        m.control = vec![0u32; 14];
        m.control[8] = 0x1501_0000; // gosub macro 1, step 0
        m.control[9] = 0x0E00_0011;
        m.control[10] = 0x0700_0000;
        m.control[12] = 0x0E00_0022;
        m.control[13] = 0x1600_0000;
        let mut rig = Rig::new(&[]);
        rig.module = m;
        rig.run();
        // Sub ran first (vol 0x22), then the return path set 0x11.
        assert_eq!(rig.voices[0].volume, 0x11);
        assert!(!rig.voices[0].macro_run);
    }

    #[test]
    fn cue_register_is_visible() {
        let mut rig = Rig::new(&[0x2001_BEEF, 0x0700_0000]);
        rig.run();
        assert_eq!(rig.cues[1], 0xBEEF);
    }

    #[test]
    fn unknown_opcode_is_skipped() {
        let mut rig = Rig::new(&[0x7700_0000, 0x0E00_0015, 0x0700_0000]);
        rig.run();
        assert_eq!(rig.voices[0].volume, 0x15);
    }

    #[test]
    fn old_style_pitch_write_defers_the_yield() {
        let mut rig = Rig::new(&[0x0910_0000, 0x0E00_0033, 0x0700_0000]);
        rig.voices[0].defer_yield = true;
        rig.run();
        // The pitch write fell through once; the volume op still ran.
        assert_eq!(rig.voices[0].volume, 0x33);
        assert!(!rig.voices[0].defer_yield);
    }

    #[test]
    fn gemx_volume_on_reset_op() {
        let mut rig = Rig::new(&[0x0000_0105, 0x0700_0000]);
        rig.module.quirks.gemx = true;
        rig.voices[0].velocity = 2;
        rig.run();
        // mode byte non-zero: absolute volume.
        assert_eq!(rig.voices[0].volume, 5);
    }

    #[test]
    fn note_split_branches_above_threshold() {
        let mut rig = Rig::new(&[
            0x1C10_0002, // if note > 0x10 jump to step 2
            0x0E00_0001,
            0x0E00_0002,
            0x0700_0000,
        ]);
        rig.voices[0].note = 0x20;
        rig.run();
        assert_eq!(rig.voices[0].volume, 2);
    }

    #[test]
    fn legacy_volume_cap() {
        let mut rig = Rig::new(&[0x0D00_0040, 0x0700_0000]);
        rig.voices[0].velocity = 0xF;
        rig.run();
        assert_eq!(rig.voices[0].volume, 0x40);
    }

    #[test]
    fn play_macro_triggers_another_voice() {
        // macro 0: play macro 1 on channel 1, then stop.
        let mut m = Module::default();
        m.macro_starts = vec![8, 10];
        m.control = vec![0u32; 12];
        m.control[8] = 0x2101_0100;
        m.control[9] = 0x0700_0000;
        let mut rig = Rig::new(&[]);
        rig.module = m;
        rig.voices[0].note = 0x18;
        rig.run();
        let other = &rig.voices[1];
        assert!(other.macro_run);
        assert_eq!(other.macro_num, 1);
        assert_eq!(other.note, 0x18);
    }

    #[test]
    fn sample_loop_narrows_the_window() {
        let mut rig = Rig::new(&[
            0x0200_0100,
            0x0300_0020,
            0x1800_0010, // skip 0x10 bytes
            0x0700_0000,
        ]);
        rig.run();
        let c = &rig.voices[0];
        assert_eq!(c.saved_addr, 0x110);
        assert_eq!(c.saved_len, 0x18);
    }
}
