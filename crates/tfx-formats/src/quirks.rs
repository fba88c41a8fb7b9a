//! Checksum-keyed behavioral exceptions.
//!
//! A handful of historical releases depend on driver bugs or were shipped
//! for a tweaked driver build. Rather than scattering title checks through
//! the hot path, the loader computes a content checksum once and resolves
//! it against this table.

use tfx_ir::Quirks;

/// One quirk table row.
#[derive(Clone, Copy, Debug)]
pub struct QuirkEntry {
    /// Wrapping byte-sum of the affected mdat image.
    pub checksum: u32,
    /// Flags to apply when the checksum matches.
    pub quirks: Quirks,
}

/// Byte-sum of the "Danger Freak" title music mdat. That release plays
/// detuned unless the note finetune byte and the immediate add-begin step
/// are suppressed.
const DANGER_FREAK_CHECKSUM: u32 = 0x00C5_91A6;

/// Byte-sum of the "Oops Up" mdat, whose trackstep prescaler must stay
/// pinned at 5 for correct tempo.
const OOPS_UP_CHECKSUM: u32 = 0x00B3_47E0;

/// All known module-specific exceptions.
pub static QUIRK_TABLE: &[QuirkEntry] = &[
    QuirkEntry {
        checksum: DANGER_FREAK_CHECKSUM,
        quirks: Quirks { zero_finetune: true, fixed_prescale: false, gemx: false },
    },
    QuirkEntry {
        checksum: OOPS_UP_CHECKSUM,
        quirks: Quirks { zero_finetune: false, fixed_prescale: true, gemx: false },
    },
];

/// Wrapping byte-sum checksum over a control-data image.
pub fn mdat_checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

/// Resolve quirk flags for a checksum. Unknown checksums get defaults.
pub fn lookup_quirks(checksum: u32) -> Quirks {
    QUIRK_TABLE
        .iter()
        .find(|e| e.checksum == checksum)
        .map(|e| e.quirks)
        .unwrap_or_default()
}
