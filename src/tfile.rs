//! Tape-file framing: the span between two tape marks seen as one
//! contiguous byte stream.
//!
//! Pre-Access (2000F) tapes prefix every block of a file with a 16-bit word
//! holding `-data_bytes/2`; that word is not part of the logical stream, so
//! the framer skips it per block (`hdr = 2`). Access tapes have no per-block
//! header (`hdr = 0`).

use std::io::{Read, Write};

use crate::error::TapeError;
use crate::simh::{Block, TapeReader, TapeWriter};

/// Observed TSB tape data block size.
pub const TBLOCK_SIZE: usize = 2048;

/// Read side: drains blocks up to the next tape mark on demand.
#[derive(Debug)]
pub struct TfileReader<'t, R> {
    tap: &'t mut TapeReader<R>,
    buf: Vec<u8>,
    pos: usize,
    hdr: usize,
    at_eof: bool,
}

impl<'t, R: Read> TfileReader<'t, R> {
    /// Wrap a tape positioned just past `first`, the block already read by
    /// the dispatcher. The per-block header skip applies to `first` too.
    pub fn new(tap: &'t mut TapeReader<R>, first: &[u8], hdr: usize) -> Self {
        Self {
            tap,
            buf: first.get(hdr.min(first.len())..).unwrap_or_default().to_vec(),
            pos: 0,
            hdr,
            at_eof: false,
        }
    }

    fn refill(&mut self) -> Result<bool, TapeError> {
        match self.tap.read_block() {
            Ok(Block::Data(d)) => {
                let skip = self.hdr.min(d.len());
                self.buf.clear();
                self.buf.extend_from_slice(&d[skip..]);
                self.pos = 0;
                Ok(true)
            }
            Ok(Block::Mark) | Ok(Block::EndOfMedium) => {
                self.at_eof = true;
                Ok(false)
            }
            Err(e) => {
                self.at_eof = true;
                Err(e)
            }
        }
    }

    /// Copy up to `out.len()` bytes; a short count means the tape file ended.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, TapeError> {
        let mut nread = 0;
        while nread < out.len() {
            if self.pos == self.buf.len() {
                if self.at_eof || !self.refill()? {
                    break;
                }
                continue;
            }
            let n = (out.len() - nread).min(self.buf.len() - self.pos);
            out[nread..nread + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            nread += n;
        }
        Ok(nread)
    }

    /// Advance without copying; returns the number of bytes skipped.
    pub fn skip(&mut self, nbytes: usize) -> Result<usize, TapeError> {
        let mut skipped = 0;
        while skipped < nbytes {
            if self.pos == self.buf.len() {
                if self.at_eof || !self.refill()? {
                    break;
                }
                continue;
            }
            let n = (nbytes - skipped).min(self.buf.len() - self.pos);
            self.pos += n;
            skipped += n;
        }
        Ok(skipped)
    }

    /// Drain to the next tape mark, however much the consumer actually read.
    pub fn skip_to_mark(&mut self) -> Result<(), TapeError> {
        while !self.at_eof {
            match self.tap.read_block() {
                Ok(Block::Data(_)) => {}
                Ok(Block::Mark) | Ok(Block::EndOfMedium) => self.at_eof = true,
                Err(e) => {
                    self.at_eof = true;
                    return Err(e);
                }
            }
        }
        self.buf.clear();
        self.pos = 0;
        Ok(())
    }
}

/// Write side: accumulates bytes and emits canonical-size blocks.
///
/// One writer serves a whole conversion run; `finish_file` resets it for the
/// next tape file.
#[derive(Debug)]
pub struct TfileWriter {
    buf: Vec<u8>,
    cap: usize,
    hdr: usize,
}

impl TfileWriter {
    pub fn new(cap: usize, hdr: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap + hdr),
            cap,
            hdr,
        }
    }

    fn flush_block<W: Write>(&mut self, tap: &mut TapeWriter<W>) -> Result<(), TapeError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.hdr == 2 {
            let words = -((self.buf.len() / 2) as i16);
            let mut block = Vec::with_capacity(self.buf.len() + 2);
            block.extend_from_slice(&words.to_be_bytes());
            block.extend_from_slice(&self.buf);
            tap.write_block(&block)?;
        } else {
            tap.write_block(&self.buf)?;
        }
        self.buf.clear();
        Ok(())
    }

    /// Append bytes, emitting full blocks as the accumulator fills.
    pub fn write<W: Write>(
        &mut self,
        tap: &mut TapeWriter<W>,
        mut bytes: &[u8],
    ) -> Result<(), TapeError> {
        while !bytes.is_empty() {
            let room = self.cap - self.buf.len();
            let n = room.min(bytes.len());
            self.buf.extend_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            if self.buf.len() == self.cap {
                self.flush_block(tap)?;
            }
        }
        Ok(())
    }

    /// Flush the tail block, zero-padded up to `min_bytes`, and write the
    /// file's tape mark.
    pub fn finish_file<W: Write>(
        &mut self,
        tap: &mut TapeWriter<W>,
        min_bytes: usize,
    ) -> Result<(), TapeError> {
        if self.buf.len() < min_bytes {
            self.buf.resize(min_bytes, 0);
        }
        self.flush_block(tap)?;
        tap.write_mark()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_file_tape(blocks: &[&[u8]]) -> Vec<u8> {
        let mut image = Vec::new();
        let mut w = TapeWriter::new(&mut image);
        for b in blocks {
            w.write_block(b).unwrap();
        }
        w.write_mark().unwrap();
        drop(w);
        image
    }

    #[test]
    fn stream_spans_blocks() {
        let image = one_file_tape(&[b"abcd", b"efgh", b"ij"]);
        let mut tap = TapeReader::new(image.as_slice());
        let Ok(Block::Data(first)) = tap.read_block() else {
            panic!("expected data block");
        };
        let first = first.to_vec();
        let mut tf = TfileReader::new(&mut tap, &first, 0);
        let mut buf = [0u8; 16];
        assert_eq!(tf.read(&mut buf).unwrap(), 10);
        assert_eq!(&buf[..10], b"abcdefghij");
        assert_eq!(tf.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn pre_access_headers_are_skipped() {
        // Each block carries a 2-byte length word that is not data.
        let image = one_file_tape(&[b"\xff\xfeabcd", b"\xff\xffef"]);
        let mut tap = TapeReader::new(image.as_slice());
        let Ok(Block::Data(first)) = tap.read_block() else {
            panic!("expected data block");
        };
        let first = first.to_vec();
        let mut tf = TfileReader::new(&mut tap, &first, 2);
        let mut buf = [0u8; 8];
        assert_eq!(tf.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcdef");
    }

    #[test]
    fn skip_and_resync() {
        let image = one_file_tape(&[b"abcd", b"efgh"]);
        let mut tap = TapeReader::new(image.as_slice());
        let Ok(Block::Data(first)) = tap.read_block() else {
            panic!("expected data block");
        };
        let first = first.to_vec();
        let mut tf = TfileReader::new(&mut tap, &first, 0);
        assert_eq!(tf.skip(6).unwrap(), 6);
        tf.skip_to_mark().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(tf.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn writer_blocks_and_padding() {
        let mut image = Vec::new();
        let mut tap = TapeWriter::new(&mut image);
        let mut tw = TfileWriter::new(8, 2);
        tw.write(&mut tap, b"0123456789").unwrap();
        tw.finish_file(&mut tap, 24).unwrap();
        drop(tap);

        let mut tap = TapeReader::new(image.as_slice());
        // First block: full accumulator with its -words header.
        let Ok(Block::Data(d)) = tap.read_block() else {
            panic!("expected data block");
        };
        assert_eq!(d, b"\xff\xfc01234567");
        // Tail block padded up to the 24-byte minimum.
        let Ok(Block::Data(d)) = tap.read_block() else {
            panic!("expected data block");
        };
        assert_eq!(d.len(), 26);
        assert_eq!(&d[..2], &(-12i16).to_be_bytes());
        assert_eq!(&d[2..4], b"89");
        assert_eq!(tap.read_block().unwrap(), Block::Mark);
    }
}
