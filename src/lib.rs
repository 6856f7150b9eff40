//! HP 2000 Time-Shared BASIC tape images: catalog, dump, extract, convert.
//!
//! Reads SIMH-format dump tapes written by the 2000F and 2000 Access
//! generations of TSB, decodes the tokenized BASIC and data files they
//! carry, and rewrites whole tapes from one generation to the other.

/// Tokenized BASIC decoding and pretty-printing
pub mod basic;
/// The `-r` and `-t` tape listings
pub mod catalog;
/// The 2000F ↔ Access transducer
pub mod convert;
/// Record-oriented and ASCII data files
pub mod datafile;
/// Labels and directory entries
pub mod dirent;
/// Error taxonomy
pub mod error;
/// File matching and extraction
pub mod extract;
/// Host filesystem collaborators
pub mod outfile;
/// In-memory program buffers and statements
pub mod prog;
/// SIMH container codec
pub mod simh;
/// Output sinks
pub mod sink;
/// Tape-file framing between tape marks
pub mod tfile;

/// Dialect tables and token codes
pub mod dialect {
    /// Token fields, operator and function code spaces
    pub mod codes;
    /// Name tables, limits, level words
    pub mod tables;
}

pub use self::dialect::tables::Dialect;
pub use self::error::Error;
pub use self::simh::{Block, TapeReader, TapeWriter};

/// Process-wide settings, fixed at dispatcher startup.
///
/// The dialect starts unresolved and may be pinned once, either by the CLI
/// or by the first TSB label encountered.
#[derive(Debug, Default)]
pub struct Config {
    pub dialect: Option<Dialect>,
    pub verbose: u8,
    pub ignore_errors: bool,
    pub debug: bool,
    pub to_stdout: bool,
}

impl Config {
    /// The effective dialect; an unlabeled, unforced tape reads as 2000F.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect.unwrap_or(Dialect::Tsb2000F)
    }
}
