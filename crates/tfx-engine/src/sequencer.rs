//! Trackstep and pattern sequencing for all eight slots.
//!
//! The sequencer runs once per prescaled tick. Each slot walks its
//! pattern, emitting note words to the voice dispatcher, until it hits
//! a wait or the pattern ends; pattern ends advance the shared
//! trackstep position, which reloads every slot.

use tfx_ir::{
    op_bytes, Module, PatternOp, TrackCmd, CIA_BASE_CLOCK, MAX_VOICES, TRACK_CMD_MARK,
};

use crate::effects::start_fade;
use crate::mixer::HwVoice;
use crate::voice::{dispatch_note, voice_off, VoiceState};

/// Pattern numbers at or above this leave a slot inactive.
const PATTERN_INACTIVE: u8 = 0x90;
/// Pattern number that switches a voice off, once.
const PATTERN_VOICE_OFF: u8 = 0xFE;
/// Pattern number of a stopped slot.
const PATTERN_STOPPED: u8 = 0xFF;
/// Disarmed value of a slot's loop counter.
const LOOP_DISARMED: u16 = 0xFFFF;

/// Steps one slot may execute in a single tick before it is declared
/// stuck and stopped. Real patterns yield every few steps; only a
/// degenerate jump-to-self with no wait gets anywhere near this.
const MAX_STEPS_PER_TICK: u32 = 2048;

/// Global playback flags and the master volume / fade machine.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlayState {
    /// Ticks advance song state only while set.
    pub enabled: bool,
    /// Sticky end-of-song flag.
    pub ended: bool,
    /// Trackstep position changed during the last run of ticks.
    pub position_changed: bool,
    /// Prescale countdown for the sequencer.
    pub speed_cnt: u16,
    pub master_vol: i8,
    pub fade_dest: i8,
    pub fade_time: i8,
    pub fade_reset: i8,
    pub fade_slope: i8,
}

impl Default for PlayState {
    fn default() -> Self {
        PlayState {
            enabled: false,
            ended: false,
            position_changed: false,
            speed_cnt: 0,
            master_vol: 0x40,
            fade_dest: 0,
            fade_time: 0,
            fade_reset: 0,
            fade_slope: 0,
        }
    }
}

/// One track slot: a cursor into a pattern.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TrackSlot {
    /// Pattern number from the trackstep entry's high byte.
    pub pattern: u8,
    /// Word index of the pattern's first step; 0 while unarmed.
    pub start: u32,
    pub step: u16,
    /// Sequencer ticks left before the next pattern step.
    pub wait: u8,
    /// Loop counter, `LOOP_DISARMED` when idle.
    pub loop_count: u16,
    pub transpose: i8,
    /// Slot was caught in an infinite pattern loop.
    pub looped: bool,
    pub ret_start: u32,
    pub ret_step: u16,
}

impl Default for TrackSlot {
    fn default() -> Self {
        TrackSlot {
            pattern: PATTERN_STOPPED,
            start: 0,
            step: 0,
            wait: 0,
            loop_count: LOOP_DISARMED,
            transpose: 0,
            looped: false,
            ret_start: 0,
            ret_step: 0,
        }
    }
}

impl TrackSlot {
    /// A slot that will never emit another note on its own.
    fn idle(&self) -> bool {
        self.pattern >= 0x80 || self.start == 0
    }
}

/// Trackstep cursor plus the eight slots.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Tracker {
    pub first_pos: u16,
    pub last_pos: u16,
    pub curr_pos: u16,
    /// Sequencer runs every `prescale + 1` ticks.
    pub prescale: u16,
    /// Trackstep loop counter, `-1` when disarmed.
    pub track_loop: i16,
    pub slots: [TrackSlot; MAX_VOICES],
}

/// Borrowed view of everything a sequencer tick may touch.
pub(crate) struct SeqCtx<'a> {
    pub module: &'a Module,
    pub tracker: &'a mut Tracker,
    pub state: &'a mut PlayState,
    pub voices: &'a mut [VoiceState],
    pub hw: &'a mut [HwVoice],
    pub cues: &'a mut [u16; 4],
    pub e_clocks: &'a mut u32,
    pub multimode: &'a mut bool,
    /// Extra full-song repeats left; `-1` once the song has been through.
    pub loops: &'a mut i32,
}

impl SeqCtx<'_> {
    /// One prescaled sequencer tick.
    pub(crate) fn tick(&mut self) {
        if self.state.speed_cnt != 0 {
            self.state.speed_cnt -= 1;
            return;
        }
        self.state.speed_cnt = if self.module.quirks.fixed_prescale {
            5
        } else {
            self.tracker.prescale
        };
        let mut i = 0;
        while i < MAX_VOICES {
            if !self.state.enabled {
                return;
            }
            if self.step_slot(i) {
                // Trackstep advanced and reloaded every slot.
                i = 0;
            } else {
                i += 1;
            }
        }
    }

    /// Interpret trackstep rows at the current position until a pattern
    /// row arms the slots (or the song ends).
    pub(crate) fn advance_trackstep(&mut self) {
        loop {
            if self.tracker.curr_pos == self.tracker.first_pos {
                if *self.loops < 0 {
                    self.stop_song();
                    return;
                }
                *self.loops -= 1;
            }
            let Some(row) = self.module.track_row(self.tracker.curr_pos) else {
                log::warn!(
                    "trackstep position {} out of range, stopping",
                    self.tracker.curr_pos
                );
                self.stop_song();
                return;
            };
            if row[0] != TRACK_CMD_MARK {
                self.arm_slots(&row);
                return;
            }
            match TrackCmd::decode(&row) {
                TrackCmd::Stop => {
                    self.stop_song();
                    return;
                }
                TrackCmd::Loop { pos, count } => {
                    if count == LOOP_DISARMED {
                        // The module loops forever; report the end once a
                        // full pass is through, but keep playing.
                        if *self.loops < 0 {
                            self.state.ended = true;
                        } else {
                            *self.loops -= 1;
                        }
                        self.tracker.curr_pos = pos;
                    } else {
                        let left = self.tracker.track_loop;
                        self.tracker.track_loop = left.wrapping_sub(1);
                        if left == 0 {
                            self.tracker.track_loop = -1;
                            self.tracker.curr_pos += 1;
                        } else {
                            if self.tracker.track_loop < 0 {
                                self.tracker.track_loop = count as i16;
                            }
                            self.tracker.curr_pos = pos;
                        }
                    }
                }
                TrackCmd::Speed { prescale, tempo } => {
                    self.tracker.prescale = prescale;
                    self.state.speed_cnt = prescale;
                    let bpm = tempo & 0x1FF;
                    if tempo & 0xF200 == 0 && bpm > 0x0F {
                        *self.e_clocks = CIA_BASE_CLOCK / u32::from(bpm);
                    }
                    self.tracker.curr_pos += 1;
                }
                TrackCmd::Timeshare { value } => {
                    if value & 0x8000 == 0 {
                        let x = ((value & 0xFF) as i8).max(-0x20);
                        *self.e_clocks =
                            (14318 * (i32::from(x) + 100) / 100) as u32;
                        *self.multimode = true;
                    }
                    self.tracker.curr_pos += 1;
                }
                TrackCmd::Fade { speed, target } => {
                    start_fade(self.state, speed, target);
                    self.tracker.curr_pos += 1;
                }
                TrackCmd::Unknown(cmd) => {
                    log::warn!("ignoring trackstep command {cmd:#06x}");
                    self.tracker.curr_pos += 1;
                }
            }
        }
    }

    fn stop_song(&mut self) {
        self.state.enabled = false;
        self.state.ended = true;
    }

    fn arm_slots(&mut self, row: &[u16; 8]) {
        for (i, entry) in row.iter().enumerate() {
            let slot = &mut self.tracker.slots[i];
            slot.pattern = (entry >> 8) as u8;
            slot.transpose = (*entry & 0xFF) as u8 as i8;
            if slot.pattern < 0x80 {
                slot.step = 0;
                slot.wait = 0;
                slot.loop_count = LOOP_DISARMED;
                slot.looped = false;
                slot.start = self.module.pattern_start(slot.pattern).unwrap_or(0);
            }
        }
    }

    /// Advance one slot. Returns true when the trackstep position moved
    /// and the caller must rescan every slot.
    fn step_slot(&mut self, i: usize) -> bool {
        {
            let slot = &mut self.tracker.slots[i];
            if slot.pattern == PATTERN_VOICE_OFF {
                slot.pattern = PATTERN_STOPPED;
                let voice = (slot.transpose & 0x0F) as usize % MAX_VOICES;
                voice_off(self.voices, self.hw, voice);
                return false;
            }
            if slot.start == 0 || slot.pattern >= PATTERN_INACTIVE {
                return false;
            }
            if slot.wait != 0 {
                slot.wait -= 1;
                return false;
            }
        }
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps > MAX_STEPS_PER_TICK {
                log::warn!("pattern {} stuck, stopping slot {i}", self.tracker.slots[i].pattern);
                self.tracker.slots[i].pattern = PATTERN_STOPPED;
                return false;
            }
            let slot = &mut self.tracker.slots[i];
            let index = slot.start as usize + usize::from(slot.step);
            slot.step = slot.step.wrapping_add(1);
            let Some(word) = self.module.word(index) else {
                slot.pattern = PATTERN_STOPPED;
                return false;
            };
            let head = op_bytes(word)[0];
            if head < 0xF0 {
                if self.play_note(i, word) {
                    return false;
                }
                continue;
            }
            match PatternOp::decode(word).unwrap_or(PatternOp::Nop) {
                PatternOp::End => {
                    slot.pattern = PATTERN_STOPPED;
                    if self.tracker.curr_pos == self.tracker.last_pos {
                        self.tracker.curr_pos = self.tracker.first_pos;
                    } else {
                        self.tracker.curr_pos += 1;
                    }
                    self.state.position_changed = true;
                    self.advance_trackstep();
                    return true;
                }
                PatternOp::Loop { count, step } => {
                    if slot.loop_count == 0 {
                        slot.loop_count = LOOP_DISARMED;
                        continue;
                    }
                    if slot.loop_count == LOOP_DISARMED {
                        slot.loop_count = u16::from(count);
                        if count == 0 {
                            slot.looped = true;
                            if self.every_slot_idle_or_looped() {
                                self.state.ended = true;
                            }
                        }
                    }
                    let slot = &mut self.tracker.slots[i];
                    slot.loop_count = slot.loop_count.wrapping_sub(1);
                    slot.step = step;
                }
                PatternOp::Cont { pattern, step } => {
                    slot.pattern = pattern;
                    slot.step = step;
                    slot.start = self.module.pattern_start(pattern).unwrap_or(0);
                    if slot.start == 0 {
                        return false;
                    }
                }
                PatternOp::Wait { rows } => {
                    slot.wait = rows;
                    return false;
                }
                PatternOp::Stop => {
                    slot.pattern = PATTERN_STOPPED;
                    return false;
                }
                PatternOp::VoiceCmd => {
                    dispatch_note(self.module, *self.multimode, self.voices, word);
                }
                PatternOp::GoSub { pattern, step } => {
                    slot.ret_start = slot.start;
                    slot.ret_step = slot.step;
                    slot.step = step;
                    slot.start = self.module.pattern_start(pattern).unwrap_or(0);
                    if slot.start == 0 {
                        return false;
                    }
                }
                PatternOp::ReturnSub => {
                    slot.start = slot.ret_start;
                    slot.step = slot.ret_step;
                }
                PatternOp::Fade { speed, target } => {
                    start_fade(self.state, speed, target);
                }
                PatternOp::PlayPattern {
                    pattern,
                    slot: target,
                    transpose,
                } => {
                    let other = &mut self.tracker.slots[usize::from(target)];
                    other.pattern = pattern;
                    other.transpose = transpose;
                    other.step = 0;
                    other.wait = 0;
                    other.loop_count = LOOP_DISARMED;
                    other.looped = false;
                    other.start = self.module.pattern_start(pattern).unwrap_or(0);
                }
                PatternOp::Cue { index, value } => {
                    self.cues[usize::from(index)] = value;
                }
                PatternOp::StopCustom => {
                    slot.pattern = PATTERN_STOPPED;
                    return false;
                }
                PatternOp::Nop => {}
            }
        }
    }

    /// Handle a note event step. Returns true when the slot must yield
    /// (note carried an inline wait).
    fn play_note(&mut self, i: usize, word: u32) -> bool {
        let slot = &mut self.tracker.slots[i];
        let [head, _, _, b3] = op_bytes(word);
        let mut wait = false;
        let mut out = word;
        if head & 0xC0 == 0x80 {
            slot.wait = b3;
            wait = true;
            out &= 0xFFFF_FF00;
        }
        let note = head.wrapping_add(slot.transpose as u8) & 0x3F;
        let note = if head & 0xC0 == 0xC0 { note | 0xC0 } else { note };
        out = (out & 0x00FF_FFFF) | (u32::from(note) << 24);
        dispatch_note(self.module, *self.multimode, self.voices, out);
        wait
    }

    fn every_slot_idle_or_looped(&self) -> bool {
        self.tracker.slots.iter().all(|s| s.looped || s.idle())
    }
}
