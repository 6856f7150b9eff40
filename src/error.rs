use std::io;

use thiserror::Error;

/// Errors in the SIMH container layer.
#[derive(Error, Debug)]
pub enum TapeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("block size {size} too large at offset {offset:#x}")]
    BlockTooLarge { size: u32, offset: u64 },
    #[error("EOF reading {expected} data bytes at offset {offset:#x}")]
    ShortData { expected: u32, offset: u64 },
    #[error("trailer size {trailer} (offset {offset:#x}) doesn't match header size {header}")]
    TrailerMismatch {
        header: u32,
        trailer: u32,
        offset: u64,
    },
    #[error("tape stream in error state")]
    Poisoned,
}

/// Errors in the TSB on-tape structures.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("string extends past end of statement")]
    TruncatedString,
    #[error("number extends past end of statement")]
    TruncatedNumber,
    #[error("value extends past end of statement")]
    TruncatedValue,
    #[error("unknown operand type")]
    UnknownOperandType,
    #[error("lines out of order")]
    LinesOutOfOrder,
    #[error("can't find symtab for CSAVEd program")]
    SymtabNotFound,
    #[error("invalid symtab addr for CSAVEd program")]
    SymtabInvalid,
    #[error("corrupted destination line number")]
    CorruptedDestination,
    #[error("corrupted symbol table")]
    CorruptedSymbolTable,
    #[error("string extends past end of record")]
    TruncatedRecordString,
    #[error("number extends past end of record")]
    TruncatedRecordNumber,
    #[error("string extends past end of ASCII file")]
    TruncatedAsciiString,
    #[error("unrecognized item {0:#06x}")]
    UnrecognizedItem(u16),
    #[error("invalid record size {0}")]
    BadRecordSize(u16),
    #[error("read past end of program buffer")]
    ProgramRange,
}

/// Errors in the conversion layer.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("already in Access format")]
    AlreadyAccess,
    #[error("already in 2000F format")]
    Already2000F,
    #[error("unsupported construct")]
    Unsupported,
    #[error("statement too long")]
    StatementTooLong,
}

/// Any error the toolkit can produce.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Tape(#[from] TapeError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Process exit code for this error per the CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Convert(ConvertError::AlreadyAccess)
            | Error::Convert(ConvertError::Already2000F) => 1,
            _ => 2,
        }
    }
}
