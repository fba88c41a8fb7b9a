//! The hardware period table.

/// Period values for the 64 note numbers a pattern can encode. Higher
/// period means lower pitch; the top rows repeat the highest octave the
/// way the original driver's table did.
pub static NOTE_PERIODS: [u16; 64] = [
    0x6AE, 0x64E, 0x5F4, 0x59E, 0x54D, 0x501, 0x4B9, 0x475, 0x435, 0x3F9, 0x3C0, 0x38C, 0x358,
    0x32A, 0x2FC, 0x2D0, 0x2A8, 0x282, 0x25E, 0x23B, 0x21B, 0x1FD, 0x1E0, 0x1C6, 0x1AC, 0x194,
    0x17D, 0x168, 0x154, 0x140, 0x12F, 0x11E, 0x10E, 0x0FE, 0x0F0, 0x0E3, 0x0D6, 0x0CA, 0x0BF,
    0x0B4, 0x0AA, 0x0A0, 0x097, 0x08F, 0x087, 0x07F, 0x078, 0x071, 0x0D6, 0x0CA, 0x0BF, 0x0B4,
    0x0AA, 0x0A0, 0x097, 0x08F, 0x087, 0x07F, 0x078, 0x071, 0x0D6, 0x0CA, 0x0BF, 0x0B4,
];

/// Table period for `note`, scaled by the voice finetune and the
/// instruction's detune byte: `period * (0x100 + finetune + detune) / 0x100`.
pub fn detuned_period(note: u8, finetune: u8, detune: u8) -> u16 {
    let base = u32::from(NOTE_PERIODS[(note & 0x3F) as usize]);
    ((base * (0x100 + u32::from(finetune) + u32::from(detune))) >> 8) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detune_returns_table_period() {
        assert_eq!(detuned_period(0, 0, 0), 0x6AE);
        assert_eq!(detuned_period(12, 0, 0), 0x358);
    }

    #[test]
    fn note_index_wraps_at_64() {
        assert_eq!(detuned_period(64, 0, 0), detuned_period(0, 0, 0));
    }

    #[test]
    fn detune_raises_period() {
        // +0x100 detune doubles the period.
        assert_eq!(detuned_period(0, 0, 0) * 2, detuned_period(0, 0xFF, 1));
    }
}
