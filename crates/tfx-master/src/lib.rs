//! Headless controller for the TFMX replayer.
//!
//! Provides a unified API for loading modules, offline rendering and
//! WAV export that both tools and tests can share.

mod wav;

use std::time::Duration;

use tfx_engine::Player;

// Re-export common types so callers don't need tfx-ir/tfx-formats directly.
pub use tfx_formats::LoadError;
pub use tfx_ir::{Module, SongPos, TimeEntry};

pub use wav::{frames_to_wav, write_wav};

/// One interleaved stereo output frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    pub const fn silence() -> Self {
        Frame { left: 0, right: 0 }
    }
}

/// Frames rendered per engine call during offline rendering.
const RENDER_CHUNK: usize = 2048;

/// Amiga-style hard panning: hardware channels 0 and 3 are left, 1 and
/// 2 right. Seven-voice mode shares the four hardware channels, so the
/// extra voices inherit the pan of the channel they ride on.
const PAN_LEFT_FOUR: [bool; 4] = [true, false, false, true];
const PAN_LEFT_SEVEN: [bool; 7] = [true, false, false, true, false, false, true];

/// Headless replayer controller — owns a module and renders subsongs.
#[derive(Default)]
pub struct Controller {
    module: Option<Module>,
}

impl Controller {
    pub fn new() -> Self {
        Controller::default()
    }

    /// Load a module from a single-file container or a raw control
    /// buffer plus optional sample blob.
    pub fn load(&mut self, data: &[u8], samples: Option<&[u8]>) -> Result<(), LoadError> {
        self.module = Some(tfx_formats::load_tfmx(data, samples)?);
        Ok(())
    }

    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    pub fn subsong_count(&self) -> u16 {
        self.module.as_ref().map_or(0, Module::subsong_count)
    }

    /// Duration of one pass through a subsong.
    pub fn duration(&self, subsong: u16, sample_rate: u32) -> Option<Duration> {
        let module = self.module.as_ref()?;
        Some(Player::new(module, subsong, sample_rate).length())
    }

    /// Output channel count of a subsong: 4, or 7 when the song uses
    /// timeshare mode.
    pub fn channel_count(&self, subsong: u16, sample_rate: u32) -> Option<usize> {
        let module = self.module.as_ref()?;
        Some(Player::new(module, subsong, sample_rate).channel_count())
    }

    /// The precomputed position/time table of a subsong.
    pub fn time_table(&self, subsong: u16, sample_rate: u32) -> Option<Vec<TimeEntry>> {
        let module = self.module.as_ref()?;
        Some(Player::new(module, subsong, sample_rate).time_table().to_vec())
    }

    /// Render a subsong to stereo frames, stopping at the song end or
    /// at `max_frames`, whichever comes first.
    pub fn render_frames(&self, subsong: u16, sample_rate: u32, max_frames: usize) -> Vec<Frame> {
        let Some(module) = self.module.as_ref() else {
            return Vec::new();
        };
        let mut player = Player::new(module, subsong, sample_rate);
        let chans = player.channel_count();
        let pan_left: &[bool] = if chans == 7 {
            &PAN_LEFT_SEVEN
        } else {
            &PAN_LEFT_FOUR
        };

        let mut frames = Vec::with_capacity(max_frames.min(sample_rate as usize * 60));
        let mut planar = vec![vec![0i16; RENDER_CHUNK]; chans];
        while frames.len() < max_frames {
            let want = RENDER_CHUNK.min(max_frames - frames.len());
            let mut slices: Vec<&mut [i16]> = planar
                .iter_mut()
                .map(|ch| &mut ch[..want])
                .collect();
            let result = player.render(&mut slices);
            for i in 0..want {
                let mut left = 0i32;
                let mut right = 0i32;
                for (ch, buf) in planar.iter().enumerate() {
                    if pan_left[ch] {
                        left += i32::from(buf[i]);
                    } else {
                        right += i32::from(buf[i]);
                    }
                }
                frames.push(Frame {
                    left: left.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
                    right: right.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
                });
            }
            if result.ended {
                break;
            }
        }
        frames
    }

    /// Render a subsong and encode it as a 16-bit stereo WAV.
    pub fn render_to_wav(&self, subsong: u16, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(subsong, sample_rate, max_frames);
        frames_to_wav(&frames, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_controller_renders_nothing() {
        let c = Controller::new();
        assert_eq!(c.subsong_count(), 0);
        assert!(c.render_frames(0, 44100, 1024).is_empty());
    }

    #[test]
    fn wav_header_shape() {
        let frames = [Frame::silence(); 4];
        let bytes = frames_to_wav(&frames, 44100);
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte header plus 4 bytes per stereo frame.
        assert_eq!(bytes.len(), 44 + 4 * 4);
    }
}
