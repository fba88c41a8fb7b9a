//! TFMX module loader.
//!
//! Parses raw module bytes into the fixed-up `tfx_ir::Module`. Parsing is
//! deliberately tolerant: only an unreadable *used* region fails the load;
//! inconsistent tail table entries are truncated instead of rejected,
//! because real-world modules have always relied on that leniency.

mod quirks;
mod tfmx_format;

pub use quirks::{lookup_quirks, mdat_checksum, QuirkEntry, QUIRK_TABLE};
pub use tfmx_format::load_tfmx;

use core::fmt;

/// Error type for module loading. Each variant carries enough context to
/// report what was expected against what was actually there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The input is smaller than any valid container.
    TooShort { len: usize, min: usize },
    /// The fixed-layout header region is incomplete.
    TruncatedHeader { expected: usize, available: usize },
    /// The container header claims more control data than is present.
    TruncatedControlData { offset: usize, expected: usize, available: usize },
    /// The container header claims more sample data than is present.
    TruncatedSamples { offset: usize, expected: usize, available: usize },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::TooShort { len, min } => {
                write!(f, "input too short: {} bytes, need at least {}", len, min)
            }
            LoadError::TruncatedHeader { expected, available } => {
                write!(f, "truncated header: need {} bytes, have {}", expected, available)
            }
            LoadError::TruncatedControlData { offset, expected, available } => write!(
                f,
                "truncated control data at offset {}: need {} bytes, have {}",
                offset, expected, available
            ),
            LoadError::TruncatedSamples { offset, expected, available } => write!(
                f,
                "truncated sample data at offset {}: need {} bytes, have {}",
                offset, expected, available
            ),
        }
    }
}

impl std::error::Error for LoadError {}
