//! TFMX container and mdat parsing.

use binrw::{io::Cursor, BinRead};
use tfx_ir::{Module, Subsong, MAX_MACROS, MAX_PATTERNS, MAX_SUBSONGS};

use crate::quirks::{lookup_quirks, mdat_checksum};
use crate::LoadError;

/// Single-file container magic.
const TFHD_MAGIC: &[u8; 4] = b"TFHD";
/// Size of the single-file container header.
const TFHD_SIZE: usize = 20;
/// Size of the fixed mdat header region.
const MDAT_HEADER_SIZE: usize = 0x200;

/// Fallback byte offsets used when a header offset field is zero.
const DEFAULT_TRACKSTEP_OFFSET: u32 = 0x600;
const DEFAULT_PATTERN_OFFSET: u32 = 0x200;
const DEFAULT_MACRO_OFFSET: u32 = 0x400;

/// Optional 20-byte single-file header: control and sample data follow it
/// back to back.
#[derive(BinRead, Debug)]
#[br(big, magic = b"TFHD")]
struct TfhdHeader {
    header_size: u32,
    /// Format type; bit 7 means "forced" (skip mdat magic validation).
    kind: u8,
    #[allow(dead_code)]
    version: u8,
    mdat_size: u32,
    smpl_size: u32,
    #[allow(dead_code)]
    pad: u16,
}

/// The fixed-layout region at the start of every mdat image.
#[derive(BinRead, Debug)]
#[br(big)]
struct MdatHeader {
    magic: [u8; 16],
    comment: [[u8; 40]; 6],
    song_starts: [u16; 32],
    song_ends: [u16; 32],
    tempos: [u16; 32],
    #[allow(dead_code)]
    pad: [u8; 16],
    trackstep_offset: u32,
    pattern_offset: u32,
    macro_offset: u32,
    #[allow(dead_code)]
    reserved: u32,
}

/// Magics accepted without the forced bit.
const MDAT_MAGICS: [&[u8]; 4] = [b"TFMX-SONG ", b"TFMX_SONG ", b"tfmxsong", b"TFMX "];

/// Load a TFMX module.
///
/// `data` is either a single-file container (TFHD header, then control
/// data, then sample data) or a bare mdat image; in the latter case the
/// sibling sample buffer is passed in `samples`.
pub fn load_tfmx(data: &[u8], samples: Option<&[u8]>) -> Result<Module, LoadError> {
    if data.len() < TFHD_SIZE {
        return Err(LoadError::TooShort { len: data.len(), min: TFHD_SIZE });
    }

    if &data[..4] == TFHD_MAGIC {
        let hdr = TfhdHeader::read(&mut Cursor::new(data))
            .map_err(|_| LoadError::TruncatedHeader { expected: TFHD_SIZE, available: data.len() })?;

        let mdat_start = (hdr.header_size as usize).max(TFHD_SIZE);
        let mdat_len = hdr.mdat_size as usize;
        let smpl_start = mdat_start + mdat_len;
        let smpl_len = hdr.smpl_size as usize;

        let mdat = data
            .get(mdat_start..mdat_start + mdat_len)
            .ok_or(LoadError::TruncatedControlData {
                offset: mdat_start,
                expected: mdat_len,
                available: data.len().saturating_sub(mdat_start),
            })?;
        let smpl = data
            .get(smpl_start..smpl_start + smpl_len)
            .ok_or(LoadError::TruncatedSamples {
                offset: smpl_start,
                expected: smpl_len,
                available: data.len().saturating_sub(smpl_start),
            })?;

        parse_mdat(mdat, smpl, hdr.kind & 0x80 != 0)
    } else {
        parse_mdat(data, samples.unwrap_or(&[]), false)
    }
}

fn parse_mdat(mdat: &[u8], smpl: &[u8], forced: bool) -> Result<Module, LoadError> {
    if mdat.len() < MDAT_HEADER_SIZE {
        return Err(LoadError::TruncatedHeader {
            expected: MDAT_HEADER_SIZE,
            available: mdat.len(),
        });
    }

    let hdr = MdatHeader::read(&mut Cursor::new(mdat)).map_err(|_| LoadError::TruncatedHeader {
        expected: MDAT_HEADER_SIZE,
        available: mdat.len(),
    })?;

    // Unknown magic is tolerated (best-effort policy); the forced bit
    // suppresses the warning for containers known not to carry one.
    if !forced && !MDAT_MAGICS.iter().any(|m| hdr.magic.starts_with(m)) {
        log::warn!("unrecognized mdat magic, loading anyway");
    }

    let track_off = fallback(hdr.trackstep_offset, DEFAULT_TRACKSTEP_OFFSET);
    let patt_off = fallback(hdr.pattern_offset, DEFAULT_PATTERN_OFFSET);
    let macro_off = fallback(hdr.macro_offset, DEFAULT_MACRO_OFFSET);

    // One trackstep row (16 bytes) must be readable; everything past that
    // may legitimately be truncated.
    if track_off & 3 != 0 || track_off as usize + 16 > mdat.len() {
        return Err(LoadError::TruncatedControlData {
            offset: track_off as usize,
            expected: 16,
            available: mdat.len().saturating_sub(track_off as usize),
        });
    }

    let control: Vec<u32> = mdat
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let pattern_starts = fixup_table(&control, mdat.len(), patt_off, MAX_PATTERNS);
    let macro_starts = fixup_table(&control, mdat.len(), macro_off, MAX_MACROS);

    // Trackstep rows run until the nearest following region.
    let next = [patt_off, macro_off]
        .into_iter()
        .filter(|&o| o > track_off)
        .map(|o| o as usize)
        .chain(core::iter::once(mdat.len()))
        .min()
        .unwrap_or(mdat.len());
    let trackstep_rows = (next - track_off as usize) / 16;

    let mut comment: [arrayvec::ArrayString<40>; 6] = Default::default();
    for (line, raw) in comment.iter_mut().zip(hdr.comment.iter()) {
        for &b in raw {
            let c = if (0x20..0x7F).contains(&b) { b as char } else { ' ' };
            let _ = line.try_push(c);
        }
        while line.ends_with(' ') {
            line.pop();
        }
    }

    let subsongs: Vec<Subsong> = (0..MAX_SUBSONGS)
        .map(|i| Subsong {
            start: hdr.song_starts[i],
            end: hdr.song_ends[i],
            tempo: hdr.tempos[i],
        })
        .collect();

    let checksum = mdat_checksum(mdat);
    let mut quirks = lookup_quirks(checksum);
    quirks.gemx |= comment.iter().any(|l| l.contains("GEMX"));

    Ok(Module {
        comment,
        subsongs,
        control,
        samples: smpl.iter().map(|&b| b as i8).collect(),
        trackstep_start: (track_off >> 2) as usize,
        trackstep_rows,
        pattern_starts,
        macro_starts,
        checksum,
        quirks,
    })
}

fn fallback(offset: u32, default: u32) -> u32 {
    if offset == 0 { default } else { offset }
}

/// Convert a table of byte offsets into word indices, truncating at the
/// first entry that is inconsistent with the buffer. Modules routinely
/// carry garbage in unused tail entries.
fn fixup_table(control: &[u32], mdat_len: usize, table_off: u32, max: usize) -> Vec<u32> {
    let base = (table_off >> 2) as usize;
    let mut starts = Vec::new();
    for i in 0..max {
        let Some(&byte_off) = control.get(base + i) else { break };
        if byte_off == 0 || byte_off & 3 != 0 || byte_off as usize + 4 > mdat_len {
            break;
        }
        starts.push(byte_off >> 2);
    }
    starts
}
