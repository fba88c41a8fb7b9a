//! The playback facade: owns all replay state for one subsong and
//! renders planar 16-bit channel buffers.

use alloc::vec::Vec;
use core::time::Duration;

use tfx_ir::{
    clocks_to_duration, tempo_to_clocks, Module, SongPos, TimeEntry, CIA_BASE_CLOCK,
    DEFAULT_TICK_CLOCKS, MAX_VOICES,
};

use crate::effects::tick_effects;
use crate::mixer::{mix_voice, DmaMode, HwVoice};
use crate::sequencer::{PlayState, SeqCtx, Tracker};
use crate::timetable;
use crate::vm::run_macro;
use crate::voice::VoiceState;

/// Per-call status returned by [`Player::render`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderResult {
    /// The trackstep position moved during this call.
    pub position_changed: bool,
    /// The song has reached its end. Looping modules keep playing with
    /// this flag set; stopped modules render silence.
    pub ended: bool,
}

/// Voices mixed into output channels, in channel order.
const AUDIBLE_FOUR: [usize; 4] = [0, 1, 2, 3];
/// Seven-voice mode leaves voice 3 running as a timer but unmixed.
const AUDIBLE_SEVEN: [usize; 7] = [0, 1, 2, 4, 5, 6, 7];

/// A replayer for one subsong of a [`Module`].
///
/// Construction precomputes the position/time table by dry-running the
/// sequencer, so [`Player::length`] and [`Player::seek`] are cheap
/// afterwards.
pub struct Player<'m> {
    module: &'m Module,
    subsong: u16,
    rate: u32,

    pub(crate) voices: [VoiceState; MAX_VOICES],
    pub(crate) hw: [HwVoice; MAX_VOICES],
    pub(crate) tracker: Tracker,
    pub(crate) state: PlayState,
    cues: [u16; 4],
    pub(crate) multimode: bool,
    pub(crate) e_clocks: u32,
    loops: i32,

    pub(crate) elapsed_clocks: u64,
    tick_rem: u64,
    frames_until_tick: u64,

    seven_voice: bool,
    time_table: Vec<TimeEntry>,
    pos_clocks: Vec<(u16, u64)>,
    total_clocks: u64,
    accum: Vec<i32>,
}

impl<'m> Player<'m> {
    /// Set up a player for `subsong`, rendering at `rate` Hz.
    ///
    /// Out-of-range subsong numbers clamp to the last valid one.
    pub fn new(module: &'m Module, subsong: u16, rate: u32) -> Self {
        let subsong = subsong.min(module.subsong_count().saturating_sub(1));
        let precomputed = timetable::precompute(module, subsong, rate);
        let mut p = Player::bare(module, subsong, rate);
        p.seven_voice = precomputed.seven_voice;
        p.time_table = precomputed.entries;
        p.pos_clocks = precomputed.pos_clocks;
        p.total_clocks = precomputed.total_clocks;
        p.restart(None);
        p
    }

    /// A player without the precomputed tables; used for the dry run.
    pub(crate) fn bare(module: &'m Module, subsong: u16, rate: u32) -> Self {
        Player {
            module,
            subsong,
            rate,
            voices: core::array::from_fn(|_| VoiceState::default()),
            hw: [HwVoice::default(); MAX_VOICES],
            tracker: Tracker::default(),
            state: PlayState::default(),
            cues: [0; 4],
            multimode: false,
            e_clocks: DEFAULT_TICK_CLOCKS,
            loops: 0,
            elapsed_clocks: 0,
            tick_rem: 0,
            frames_until_tick: 0,
            seven_voice: false,
            time_table: Vec::new(),
            pos_clocks: Vec::new(),
            total_clocks: 0,
            accum: Vec::new(),
        }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn subsong(&self) -> u16 {
        self.subsong
    }

    pub fn sample_rate(&self) -> u32 {
        self.rate
    }

    /// Output channels: four, or seven once timeshare mode was seen.
    pub fn channel_count(&self) -> usize {
        if self.seven_voice {
            7
        } else {
            4
        }
    }

    /// Current trackstep position.
    pub fn position(&self) -> SongPos {
        SongPos(self.tracker.curr_pos)
    }

    /// Sticky end-of-song flag.
    pub fn ended(&self) -> bool {
        self.state.ended
    }

    /// Elapsed song time.
    pub fn elapsed(&self) -> Duration {
        clocks_to_duration(self.elapsed_clocks)
    }

    /// Total duration of one pass through the subsong.
    pub fn length(&self) -> Duration {
        clocks_to_duration(self.total_clocks)
    }

    /// Position/time rows precomputed at construction, in play order
    /// with strictly increasing times.
    pub fn time_table(&self) -> &[TimeEntry] {
        &self.time_table
    }

    /// One of the four cue registers written by `Cue` ops.
    pub fn cue(&self, index: usize) -> u16 {
        self.cues[index & 3]
    }

    /// Jump to a trackstep position. The engine restarts all voices at
    /// the target row, so the jump is click-free but not sample-exact.
    pub fn seek(&mut self, pos: SongPos) {
        self.restart(Some(pos.0));
    }

    /// Render planar channel buffers. Every slice in `out` is filled to
    /// the length of the shortest one; extra slices are left alone.
    pub fn render(&mut self, out: &mut [&mut [i16]]) -> RenderResult {
        self.state.position_changed = false;
        let chans = self.channel_count().min(out.len());
        let frames = out
            .iter()
            .take(chans)
            .map(|c| c.len())
            .min()
            .unwrap_or(0);
        self.accum.clear();
        self.accum.resize(chans * frames, 0);

        let audible: &[usize] = if self.seven_voice {
            &AUDIBLE_SEVEN
        } else {
            &AUDIBLE_FOUR
        };

        let mut done = 0;
        while done < frames {
            if self.frames_until_tick == 0 {
                self.tick();
                self.frames_until_tick = self.frames_per_tick();
            }
            let n = (frames - done).min(self.frames_until_tick as usize);
            if self.state.enabled {
                for (ch, &v) in audible.iter().take(chans).enumerate() {
                    let base = ch * frames + done;
                    mix_voice(
                        &mut self.hw,
                        &mut self.voices,
                        self.module,
                        v,
                        &mut self.accum[base..base + n],
                    );
                }
            }
            self.frames_until_tick -= n as u64;
            done += n;
        }

        for (ch, buf) in out.iter_mut().take(chans).enumerate() {
            for (i, slot) in buf[..frames].iter_mut().enumerate() {
                *slot = self.accum[ch * frames + i]
                    .clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            }
        }

        RenderResult {
            position_changed: self.state.position_changed,
            ended: self.state.ended,
        }
    }

    /// Reset all replay state and start at `pos` (or the subsong start).
    pub(crate) fn restart(&mut self, pos: Option<u16>) {
        for c in &mut self.voices {
            c.reset();
        }
        for h in &mut self.hw {
            h.reset();
        }
        self.tracker = Tracker::default();
        self.state = PlayState::default();
        self.cues = [0; 4];
        self.multimode = false;
        self.loops = 0;
        self.tick_rem = 0;
        self.frames_until_tick = 0;
        self.elapsed_clocks = 0;

        let ss = self
            .module
            .subsong(self.subsong)
            .copied()
            .unwrap_or_default();
        self.tracker.first_pos = ss.start;
        self.tracker.last_pos = ss.end;
        self.tracker.curr_pos = ss.start;
        self.tracker.track_loop = -1;
        self.e_clocks = DEFAULT_TICK_CLOCKS;
        if ss.tempo >= 0x10 {
            self.e_clocks = tempo_to_clocks(ss.tempo);
            self.tracker.prescale = 0;
        } else {
            self.tracker.prescale = ss.tempo;
        }

        if let Some(p) = pos {
            let p = p.clamp(ss.start, ss.end);
            if p != ss.start {
                self.tracker.curr_pos = p;
                // The song already went through its start row once.
                self.loops = -1;
            }
            self.elapsed_clocks = self
                .pos_clocks
                .iter()
                .find(|&&(row, _)| row == p)
                .map_or(0, |&(_, clocks)| clocks);
        }

        self.state.enabled = true;
        self.seq_ctx().advance_trackstep();
        self.state.speed_cnt = 0;
    }

    /// One timer tick: macros and effects first, then the sequencer,
    /// matching the interrupt order of the original driver.
    pub(crate) fn tick(&mut self) {
        if !self.state.enabled {
            return;
        }
        self.elapsed_clocks += u64::from(self.e_clocks);
        self.tick_voice(0);
        self.tick_voice(1);
        self.tick_voice(2);
        if self.multimode {
            self.tick_voice(4);
            self.tick_voice(5);
            self.tick_voice(6);
            self.tick_voice(7);
        }
        // Voice 3 always ticks so the fade clock keeps its speed.
        self.tick_voice(3);
        self.seq_ctx().tick();
    }

    fn tick_voice(&mut self, idx: usize) {
        {
            let c = &mut self.voices[idx];
            if c.sfx_lock_time >= 0 {
                c.sfx_lock_time -= 1;
            } else {
                c.sfx_flag = 0;
                c.sfx_priority = 0;
            }
            let run = c.macro_run;
            let ready = c.macro_wait == 0;
            c.macro_wait = c.macro_wait.wrapping_sub(1);
            if !(run && ready) {
                self.finish_voice_tick(idx);
                return;
            }
        }
        run_macro(
            self.module,
            self.multimode,
            &mut self.voices,
            &mut self.hw,
            &mut self.cues,
            idx,
        );
        self.finish_voice_tick(idx);
    }

    /// Effects, then commit the voice's window, period and volume to the
    /// hardware side.
    fn finish_voice_tick(&mut self, idx: usize) {
        tick_effects(&mut self.voices[idx], &mut self.state);
        let c = &self.voices[idx];
        let h = &mut self.hw[idx];
        h.delta = if c.period != 0 {
            // u64: period * rate overflows u32 at high sample rates.
            let denom = (u64::from(c.period) * u64::from(self.rate)) >> 5;
            if denom == 0 {
                0
            } else {
                ((3_579_545u64 << 9) / denom) as u32
            }
        } else {
            0
        };
        h.sample_start = c.saved_addr as usize;
        h.sample_len = if c.saved_len != 0 {
            u32::from(c.saved_len) << 1
        } else {
            0
        };
        if h.mode == DmaMode::On {
            h.live_start = h.sample_start;
            h.live_len = h.sample_len;
        }
        h.volume = ((i32::from(c.volume) * i32::from(self.state.master_vol)) >> 6)
            .clamp(0, 0x40) as u8;
    }

    fn seq_ctx(&mut self) -> SeqCtx<'_> {
        SeqCtx {
            module: self.module,
            tracker: &mut self.tracker,
            state: &mut self.state,
            voices: &mut self.voices,
            hw: &mut self.hw,
            cues: &mut self.cues,
            e_clocks: &mut self.e_clocks,
            multimode: &mut self.multimode,
            loops: &mut self.loops,
        }
    }

    /// Frames until the next tick at the current tick length, carrying
    /// the fractional remainder so long renders stay phase-exact.
    fn frames_per_tick(&mut self) -> u64 {
        let num = u64::from(self.e_clocks) * u64::from(self.rate) + self.tick_rem;
        self.tick_rem = num % u64::from(CIA_BASE_CLOCK);
        (num / u64::from(CIA_BASE_CLOCK)).max(1)
    }
}
