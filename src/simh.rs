//! Reading and writing SIMH-format tape images.
//!
//! Each block is framed `[len32_le] [payload] [pad if odd] [len32_le]`;
//! a tape mark is a lone zero length word; end-of-medium is the sentinel
//! `0xFFFFFFFF` or plain truncation. Payload bytes are big-endian TSB data,
//! only the envelope is little-endian.

use std::io::{Read, Write};

use crate::error::TapeError;

/// Sanity cap on a single block; real TSB tapes use 2 KB blocks.
const MAX_BLOCK: u32 = 1 << 20;

/// End-of-medium sentinel length word.
const EOM_MARKER: u32 = 0xffff_ffff;

/// One item of a tape image.
#[derive(Debug, PartialEq, Eq)]
pub enum Block<'a> {
    /// Block payload; borrows the reader's scratch buffer until the next read.
    Data(&'a [u8]),
    /// Zero-length block, delimits tape files.
    Mark,
    /// Sentinel or truncation; distinct from a read error.
    EndOfMedium,
}

/// Sequential reader for a SIMH tape image.
#[derive(Debug)]
pub struct TapeReader<R> {
    inner: R,
    buf: Vec<u8>,
    offset: u64,
    at_eom: bool,
    errored: bool,
}

impl<R: Read> TapeReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            offset: 0,
            at_eom: false,
            errored: false,
        }
    }

    /// Byte offset into the container, for error reporting.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Fill `buf` completely, or return how many bytes were available.
    fn read_full(&mut self, len: usize) -> Result<usize, TapeError> {
        let mut nread = 0;
        while nread < len {
            let n = self.inner.read(&mut self.buf[nread..len])?;
            if n == 0 {
                break;
            }
            nread += n;
            self.offset += n as u64;
        }
        Ok(nread)
    }

    fn read_word(&mut self) -> Result<Option<u32>, TapeError> {
        if self.buf.len() < 4 {
            self.buf.resize(4, 0);
        }
        if self.read_full(4)? < 4 {
            return Ok(None);
        }
        Ok(Some(u32::from_le_bytes(self.buf[..4].try_into().unwrap())))
    }

    /// Read the next tape block.
    ///
    /// The returned payload slice is valid until the next call; the reader
    /// owns the scratch buffer.
    pub fn read_block(&mut self) -> Result<Block<'_>, TapeError> {
        if self.errored {
            return Err(TapeError::Poisoned);
        }
        if self.at_eom {
            return Ok(Block::EndOfMedium);
        }

        let Some(nbytes) = self.read_word()? else {
            self.at_eom = true;
            return Ok(Block::EndOfMedium);
        };
        if nbytes == EOM_MARKER {
            self.at_eom = true;
            return Ok(Block::EndOfMedium);
        }
        if nbytes == 0 {
            return Ok(Block::Mark);
        }
        if nbytes > MAX_BLOCK {
            self.errored = true;
            return Err(TapeError::BlockTooLarge {
                size: nbytes,
                offset: self.offset - 4,
            });
        }

        // payload, then trailer length word
        self.buf.resize(nbytes as usize + 4, 0);
        let nread = self.read_full(nbytes as usize)?;
        if nread < nbytes as usize {
            self.errored = true;
            return Err(TapeError::ShortData {
                expected: nbytes,
                offset: self.offset,
            });
        }
        let mut trailer = [0u8; 4];
        if self.read_tail(&mut trailer)? < 4 {
            // Truncated final trailer: keep the block, stop afterwards.
            self.at_eom = true;
            return Ok(Block::Data(&self.buf[..nbytes as usize]));
        }

        if nbytes & 1 == 1 && u32::from_le_bytes(trailer) != nbytes {
            // Conforming images pad odd payloads; this one did, so the byte
            // we took for the trailer was the pad. Shift and read one more.
            trailer.copy_within(1.., 0);
            if self.read_tail(&mut trailer[3..])? < 1 {
                self.at_eom = true;
                return Ok(Block::Data(&self.buf[..nbytes as usize]));
            }
        }
        let tsize = u32::from_le_bytes(trailer);
        if tsize != nbytes {
            self.errored = true;
            return Err(TapeError::TrailerMismatch {
                header: nbytes,
                trailer: tsize,
                offset: self.offset - 4,
            });
        }

        Ok(Block::Data(&self.buf[..nbytes as usize]))
    }

    fn read_tail(&mut self, out: &mut [u8]) -> Result<usize, TapeError> {
        let mut nread = 0;
        while nread < out.len() {
            let n = self.inner.read(&mut out[nread..])?;
            if n == 0 {
                break;
            }
            nread += n;
            self.offset += n as u64;
        }
        Ok(nread)
    }
}

/// Sequential writer for a SIMH tape image. Always emits conforming padding.
#[derive(Debug)]
pub struct TapeWriter<W> {
    inner: W,
}

impl<W: Write> TapeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one data block: header, payload, pad byte when odd, trailer.
    /// An empty payload degenerates to a tape mark.
    pub fn write_block(&mut self, payload: &[u8]) -> Result<(), TapeError> {
        let len = (payload.len() as u32).to_le_bytes();
        self.inner.write_all(&len)?;
        if payload.is_empty() {
            return Ok(());
        }
        self.inner.write_all(payload)?;
        if payload.len() & 1 == 1 {
            self.inner.write_all(&[0])?;
        }
        self.inner.write_all(&len)?;
        Ok(())
    }

    /// Write a tape mark: a lone zero header, no payload or trailer.
    pub fn write_mark(&mut self) -> Result<(), TapeError> {
        self.inner.write_all(&0u32.to_le_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), TapeError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
