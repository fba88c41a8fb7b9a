//! Fixed-up module representation.

use alloc::vec::Vec;
use arrayvec::ArrayString;

/// Number of track slots / hardware voices.
pub const MAX_VOICES: usize = 8;
/// Number of subsong descriptor slots in a module header.
pub const MAX_SUBSONGS: usize = 32;
/// Maximum entries in the pattern start table.
pub const MAX_PATTERNS: usize = 128;
/// Maximum entries in the macro start table.
pub const MAX_MACROS: usize = 128;

/// One subsong descriptor: a trackstep position range plus initial tempo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Subsong {
    /// First trackstep position.
    pub start: u16,
    /// Last trackstep position (inclusive).
    pub end: u16,
    /// Initial tempo; >= 0x10 means BPM-style CIA tempo, below that a
    /// trackstep prescale value.
    pub tempo: u16,
}

/// Behavioral exceptions for specific known modules, resolved at load time
/// from the content checksum. Silent switches, never errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// Ignore the per-note finetune byte and the immediate add-begin step.
    pub zero_finetune: bool,
    /// Force the trackstep prescaler to 5 regardless of speed commands.
    pub fixed_prescale: bool,
    /// GEM-X variant: the dma-off/reset op carries a velocity-scaled volume.
    pub gemx: bool,
}

/// An immutable, fixed-up TFMX module.
///
/// `control` holds the big-endian-decoded mdat words. Macro and pattern
/// start tables have been converted from byte offsets to indices into
/// `control`; inconsistent tail entries were truncated at load time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    /// Six 40-character comment lines from the header.
    pub comment: [ArrayString<40>; 6],
    /// The 32 subsong descriptors (unused tail entries are zeroed).
    pub subsongs: Vec<Subsong>,
    /// Control data (macros + patterns + tracksteps) as 32-bit words.
    pub control: Vec<u32>,
    /// Raw signed 8-bit sample blob.
    pub samples: Vec<i8>,
    /// Word index of the first trackstep row.
    pub trackstep_start: usize,
    /// Number of trackstep rows (4 words each).
    pub trackstep_rows: usize,
    /// Word index of each pattern's first step.
    pub pattern_starts: Vec<u32>,
    /// Word index of each macro's first instruction.
    pub macro_starts: Vec<u32>,
    /// Wrapping byte-sum checksum of the control data.
    pub checksum: u32,
    /// Module-specific behavior switches.
    pub quirks: Quirks,
}

impl Module {
    /// Number of usable subsongs (leading descriptors with a sane range).
    pub fn subsong_count(&self) -> u16 {
        let n = self
            .subsongs
            .iter()
            .take_while(|s| s.end >= s.start && !(s.start == 0 && s.end == 0))
            .count();
        n.max(1) as u16
    }

    /// Subsong descriptor, if in range.
    pub fn subsong(&self, index: u16) -> Option<&Subsong> {
        self.subsongs.get(index as usize)
    }

    /// Bounds-checked control word fetch.
    #[inline]
    pub fn word(&self, index: usize) -> Option<u32> {
        self.control.get(index).copied()
    }

    /// One trackstep row: eight big-endian u16 entries packed in 4 words.
    pub fn track_row(&self, row: u16) -> Option<[u16; 8]> {
        if (row as usize) >= self.trackstep_rows {
            return None;
        }
        let base = self.trackstep_start + row as usize * 4;
        let words = self.control.get(base..base + 4)?;
        let mut out = [0u16; 8];
        for (i, w) in words.iter().enumerate() {
            out[i * 2] = (w >> 16) as u16;
            out[i * 2 + 1] = *w as u16;
        }
        Some(out)
    }

    /// Sample byte at `index`, or silence when out of range.
    #[inline]
    pub fn sample(&self, index: usize) -> i8 {
        self.samples.get(index).copied().unwrap_or(0)
    }

    /// Word index of a macro's first instruction, if the macro exists.
    pub fn macro_start(&self, index: u8) -> Option<u32> {
        self.macro_starts.get(index as usize).copied()
    }

    /// Word index of a pattern's first step, if the pattern exists.
    pub fn pattern_start(&self, index: u8) -> Option<u32> {
        self.pattern_starts.get(index as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn empty_module() -> Module {
        Module {
            comment: Default::default(),
            subsongs: vec![Subsong::default(); MAX_SUBSONGS],
            control: vec![0; 16],
            samples: vec![1, 2, 3],
            trackstep_start: 0,
            trackstep_rows: 2,
            pattern_starts: Vec::new(),
            macro_starts: Vec::new(),
            checksum: 0,
            quirks: Quirks::default(),
        }
    }

    #[test]
    fn subsong_count_is_at_least_one() {
        let m = empty_module();
        assert_eq!(m.subsong_count(), 1);
    }

    #[test]
    fn subsong_count_stops_at_first_empty_descriptor() {
        let mut m = empty_module();
        m.subsongs[0] = Subsong { start: 0, end: 4, tempo: 6 };
        m.subsongs[1] = Subsong { start: 5, end: 9, tempo: 6 };
        assert_eq!(m.subsong_count(), 2);
    }

    #[test]
    fn sample_out_of_range_is_silence() {
        let m = empty_module();
        assert_eq!(m.sample(2), 3);
        assert_eq!(m.sample(100), 0);
    }

    #[test]
    fn track_row_unpacks_word_pairs() {
        let mut m = empty_module();
        m.control[0] = 0x0102_0304;
        m.control[1] = 0x0506_0708;
        let row = m.track_row(0).unwrap();
        assert_eq!(row[0], 0x0102);
        assert_eq!(row[1], 0x0304);
        assert_eq!(row[2], 0x0506);
        assert_eq!(row[3], 0x0708);
    }

    #[test]
    fn track_row_out_of_range_is_none() {
        let m = empty_module();
        assert!(m.track_row(2).is_none());
    }
}
