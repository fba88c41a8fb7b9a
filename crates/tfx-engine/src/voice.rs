//! Per-voice interpreter state and note event dispatch.

use tfx_ir::{Module, NoteCmd, NOTE_PERIODS};

use crate::mixer::{DmaMode, HwVoice, LoopPolicy};

/// State of one macro interpreter, bound 1:1 to a hardware voice.
///
/// Everything the macro byte-code and the per-tick effects touch lives
/// here; the committed sample window and playback position live in the
/// paired [`HwVoice`].
#[derive(Debug, Clone)]
pub struct VoiceState {
    /// Macro program counter: word index of the macro base plus step.
    pub macro_ptr: u32,
    pub macro_step: u16,
    /// Ticks left before the interpreter resumes.
    pub macro_wait: u16,
    pub macro_num: u16,
    /// Interpreter is live. Cleared by stop opcodes and DMA waits.
    pub macro_run: bool,
    /// Old-style macros take effect one fetch later; when set, the next
    /// yielding opcode falls through once instead of suspending.
    pub defer_yield: bool,
    /// Double-wait arming for the "really wait" form of the wait opcode.
    pub really_wait: u8,
    /// Loop counter, `-1` when disarmed.
    pub loop_count: i16,
    pub ret_ptr: u32,
    pub ret_step: u16,

    pub note: u8,
    pub prev_note: u8,
    pub velocity: u8,
    pub finetune: u8,
    /// True from note-on until a key-up event arrives.
    pub key_down: bool,

    /// Pending sample window, committed to hardware at the end of each
    /// tick and latched by the mixer on the next DMA start.
    pub addr: u32,
    pub saved_addr: u32,
    /// Sample length in 16-bit words.
    pub len: u16,
    pub saved_len: u16,
    /// DMA wrap countdown armed by the wait-on-DMA opcode.
    pub wait_dma: u16,

    pub volume: i8,
    pub env_rate: u8,
    pub env_reset: u8,
    pub env_time: u8,
    pub env_target: i8,

    pub period: u16,
    pub dest_period: u16,
    pub porta_period: u16,
    pub porta_rate: i16,
    pub porta_reset: u8,
    pub porta_time: u8,

    pub vib_offset: i16,
    pub vib_width: i8,
    pub vib_reset: u8,
    pub vib_time: u8,

    pub add_begin: i32,
    pub add_begin_time: u8,
    pub add_begin_reset: u8,

    /// Non-zero while an external effect holds this voice locked.
    pub sfx_flag: u8,
    pub sfx_priority: u8,
    pub sfx_lock_time: i16,

    /// Effect-path selector latched by the DMA-on opcode.
    pub efx_run: i8,
}

impl Default for VoiceState {
    fn default() -> Self {
        VoiceState {
            macro_ptr: 0,
            macro_step: 0,
            macro_wait: 0,
            macro_num: 0,
            macro_run: false,
            defer_yield: false,
            really_wait: 0,
            loop_count: -1,
            ret_ptr: 0,
            ret_step: 0,
            note: 0,
            prev_note: 0,
            velocity: 0,
            finetune: 0,
            key_down: false,
            addr: 0,
            saved_addr: 0,
            len: 2,
            saved_len: 2,
            wait_dma: 0,
            volume: 0,
            env_rate: 0,
            env_reset: 0,
            env_time: 0,
            env_target: 0,
            period: 0,
            dest_period: 0,
            porta_period: 0,
            porta_rate: 0,
            porta_reset: 0,
            porta_time: 0,
            vib_offset: 0,
            vib_width: 0,
            vib_reset: 0,
            vib_time: 0,
            add_begin: 0,
            add_begin_time: 0,
            add_begin_reset: 0,
            sfx_flag: 0,
            sfx_priority: 0,
            sfx_lock_time: -1,
            efx_run: 0,
        }
    }
}

impl VoiceState {
    pub(crate) fn reset(&mut self) {
        *self = VoiceState::default();
    }
}

/// Silence a voice immediately: kill the interpreter, drop DMA and zero
/// the committed sample window.
pub(crate) fn voice_off(voices: &mut [VoiceState], hw: &mut [HwVoice], idx: usize) {
    let c = &mut voices[idx];
    c.add_begin_time = 0;
    c.add_begin_reset = 0;
    c.macro_run = false;
    c.defer_yield = false;
    c.saved_addr = 0;
    c.saved_len = 1;
    c.len = 1;
    c.addr = 0;
    c.volume = 0;
    c.porta_rate = 0;
    c.vib_reset = 0;
    c.env_reset = 0;
    let h = &mut hw[idx];
    h.mode = DmaMode::Off;
    h.volume = 0;
    h.sample_start = 0;
    h.sample_len = 0;
    h.loop_policy = LoopPolicy::Continue;
}

/// Route one note event word to its voice.
///
/// Locked voices (`sfx_flag != 0`) swallow everything except the lock
/// command itself. `multimode` widens the channel mask from four voices
/// to eight.
pub(crate) fn dispatch_note(
    module: &Module,
    multimode: bool,
    voices: &mut [VoiceState],
    word: u32,
) {
    let mask = if multimode { 7 } else { 3 };
    match NoteCmd::decode(word) {
        NoteCmd::Lock { chan, flag, time } => {
            let c = &mut voices[usize::from(chan & mask)];
            c.sfx_flag = flag;
            c.sfx_lock_time = i16::from(time);
        }
        NoteCmd::Play {
            note,
            mac,
            chan,
            velocity,
            detune,
        } => {
            let c = &mut voices[usize::from(chan & mask)];
            if c.sfx_flag != 0 {
                return;
            }
            c.finetune = if module.quirks.zero_finetune { 0 } else { detune };
            c.velocity = velocity;
            c.prev_note = c.note;
            c.note = note;
            c.really_wait = 1;
            c.defer_yield = false;
            c.macro_num = u16::from(mac);
            c.macro_step = 0;
            c.macro_wait = 0;
            c.efx_run = 0;
            c.key_down = true;
            c.loop_count = -1;
            match module.macro_start(mac) {
                Some(start) => {
                    c.macro_ptr = start;
                    c.macro_run = true;
                }
                None => c.macro_run = false,
            }
        }
        NoteCmd::Porta { note, chan, reset, rate } => {
            let c = &mut voices[usize::from(chan & mask)];
            if c.sfx_flag != 0 {
                return;
            }
            c.porta_reset = reset;
            c.porta_time = 1;
            if c.porta_rate == 0 {
                c.porta_period = c.dest_period;
            }
            c.porta_rate = i16::from(rate);
            c.note = note & 0x3f;
            c.dest_period = NOTE_PERIODS[usize::from(note & 0x3f)];
        }
        NoteCmd::KeyUp { chan } => {
            let c = &mut voices[usize::from(chan & mask)];
            if c.sfx_flag != 0 {
                return;
            }
            c.key_down = false;
        }
        NoteCmd::Vibrato { chan, speed, width } => {
            let c = &mut voices[usize::from(chan & mask)];
            if c.sfx_flag != 0 {
                return;
            }
            c.vib_reset = speed;
            c.vib_time = speed;
            c.vib_width = width;
            c.vib_offset = 0;
        }
        NoteCmd::Envelope {
            chan,
            rate,
            ticks,
            target,
        } => {
            let c = &mut voices[usize::from(chan & mask)];
            if c.sfx_flag != 0 {
                return;
            }
            c.env_rate = rate;
            c.env_reset = ticks;
            c.env_time = ticks;
            c.env_target = target;
        }
        NoteCmd::Ignore => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::HwVoice;
    use tfx_ir::Module;

    fn module_with_macro() -> Module {
        let mut m = Module::default();
        m.macro_starts = vec![8];
        m.control = vec![0; 16];
        m
    }

    #[test]
    fn play_note_arms_macro() {
        let m = module_with_macro();
        let mut voices = vec![VoiceState::default(); 8];
        // note 0x20, macro 0, channel 1, velocity 5, detune 3
        dispatch_note(&m, false, &mut voices, 0x2000_5103);
        let c = &voices[1];
        assert!(c.macro_run);
        assert_eq!(c.macro_ptr, 8);
        assert_eq!(c.note, 0x20);
        assert_eq!(c.velocity, 5);
        assert_eq!(c.finetune, 3);
        assert!(c.key_down);
    }

    #[test]
    fn channel_mask_narrows_without_multimode() {
        let m = module_with_macro();
        let mut voices = vec![VoiceState::default(); 8];
        // channel 5 folds onto voice 1 in four-voice mode.
        dispatch_note(&m, false, &mut voices, 0x2000_0500);
        assert!(voices[1].macro_run);
        assert!(!voices[5].macro_run);
    }

    #[test]
    fn locked_voice_ignores_notes() {
        let m = module_with_macro();
        let mut voices = vec![VoiceState::default(); 8];
        voices[2].sfx_flag = 1;
        dispatch_note(&m, false, &mut voices, 0x1800_0200);
        assert!(!voices[2].macro_run);
        // Key-up is swallowed too.
        voices[2].key_down = true;
        dispatch_note(&m, false, &mut voices, 0xf500_0200);
        assert!(voices[2].key_down);
    }

    #[test]
    fn voice_off_silences_hardware() {
        let mut voices = vec![VoiceState::default(); 8];
        let mut hw = vec![HwVoice::default(); 8];
        voices[0].macro_run = true;
        hw[0].mode = DmaMode::On;
        hw[0].volume = 0x40;
        voice_off(&mut voices, &mut hw, 0);
        assert!(!voices[0].macro_run);
        assert_eq!(hw[0].mode, DmaMode::Off);
        assert_eq!(hw[0].volume, 0);
    }
}
