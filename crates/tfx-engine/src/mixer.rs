//! Virtual Paula voices and the fixed-point resampling mixer.
//!
//! Playback position is kept in 14-bit fixed point relative to the live
//! sample window. DMA starts are latched: the macro interpreter only
//! flags a pending start, and the window it committed is picked up here
//! before the first frame of the next slice, mirroring the one-tick
//! start latency of the real hardware.

use tfx_ir::Module;

use crate::voice::VoiceState;

/// Fractional bits of [`HwVoice::pos`].
const POS_FRAC_BITS: u32 = 14;

/// DMA state of a voice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DmaMode {
    /// Silent; the voice contributes nothing.
    #[default]
    Off,
    /// Start requested; the committed window is latched on the next slice.
    Pending,
    /// Playing the live window.
    On,
}

/// What to do when the playback position wraps past the live window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Reload the committed window and keep going (or stop on zero length).
    #[default]
    Continue,
    /// Like `Continue`, but count wraps down and wake the suspended macro
    /// interpreter of the watched voice when the count runs out.
    CountDma { voice: usize },
}

/// One virtual hardware voice.
#[derive(Clone, Copy, Debug, Default)]
pub struct HwVoice {
    /// Committed sample window, refreshed from the interpreter each tick.
    pub sample_start: usize,
    /// Committed window length in bytes.
    pub sample_len: u32,
    /// Live window currently feeding the resampler.
    pub live_start: usize,
    /// Live window length in bytes.
    pub live_len: u32,
    /// Playback position in 14-bit fixed point, relative to `live_start`.
    pub pos: u32,
    /// Per-frame position increment in the same fixed point.
    pub delta: u32,
    /// Final voice volume, 0..=0x40.
    pub volume: u8,
    pub mode: DmaMode,
    pub loop_policy: LoopPolicy,
}

impl HwVoice {
    pub(crate) fn reset(&mut self) {
        *self = HwVoice {
            sample_len: 2,
            live_len: 2,
            ..HwVoice::default()
        };
    }

    fn latch(&mut self) {
        self.live_start = self.sample_start;
        self.live_len = self.sample_len;
        self.pos = 0;
        self.mode = DmaMode::On;
    }
}

/// Resample one voice into `out`, accumulating at full i32 headroom.
///
/// Sample reads outside the blob produce silence; a zero-length live
/// window stops the voice instead of looping forever.
pub(crate) fn mix_voice(
    hw: &mut [HwVoice],
    voices: &mut [VoiceState],
    module: &Module,
    idx: usize,
    out: &mut [i32],
) {
    let h = &mut hw[idx];
    match h.mode {
        DmaMode::Off => return,
        DmaMode::Pending => h.latch(),
        DmaMode::On => {}
    }
    if h.live_len == 0 || h.delta == 0 {
        return;
    }
    let vol = i32::from(h.volume);
    for slot in out.iter_mut() {
        while h.pos >> POS_FRAC_BITS >= h.live_len {
            h.pos -= h.live_len << POS_FRAC_BITS;
            if let LoopPolicy::CountDma { voice } = h.loop_policy {
                let c = &mut voices[voice];
                let left = c.wait_dma;
                c.wait_dma = c.wait_dma.wrapping_sub(1);
                if left == 0 {
                    h.loop_policy = LoopPolicy::Continue;
                    c.macro_run = true;
                }
            }
            h.live_start = h.sample_start;
            h.live_len = h.sample_len;
            if h.live_len == 0 {
                h.mode = DmaMode::Off;
                return;
            }
        }
        let byte = h.live_start + (h.pos >> POS_FRAC_BITS) as usize;
        *slot += (i32::from(module.sample(byte)) * vol) << 2;
        h.pos = h.pos.wrapping_add(h.delta);
    }
}
