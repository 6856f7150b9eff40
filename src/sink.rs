//! Byte sinks: a stream for extraction output, a bounded buffer for sizing
//! converted statements before committing them.

use std::io::{self, Write};

/// A thing you can write bytes to.
///
/// The buffer form refuses bytes past its capacity; `finish` reports how
/// many bytes actually landed, so a statement that overflowed a
/// `limit + 1`-byte buffer is detectable by `finish() > limit`.
pub enum Sink<'a> {
    Stream {
        out: &'a mut dyn Write,
        nwritten: usize,
    },
    Buffer {
        buf: &'a mut [u8],
        pos: usize,
    },
}

impl<'a> Sink<'a> {
    pub fn stream(out: &'a mut dyn Write) -> Self {
        Sink::Stream { out, nwritten: 0 }
    }

    pub fn buffer(buf: &'a mut [u8]) -> Self {
        Sink::Buffer { buf, pos: 0 }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Sink::Stream { out, nwritten } => {
                out.write_all(bytes)?;
                *nwritten += bytes.len();
            }
            Sink::Buffer { buf, pos } => {
                let n = bytes.len().min(buf.len() - *pos);
                buf[*pos..*pos + n].copy_from_slice(&bytes[..n]);
                *pos += n;
            }
        }
        Ok(())
    }

    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_bytes(s.as_bytes())
    }

    pub fn put_byte(&mut self, c: u8) -> io::Result<()> {
        self.write_bytes(&[c])
    }

    /// Bytes written (stream) or bytes landed in the buffer.
    pub fn finish(self) -> usize {
        match self {
            Sink::Stream { nwritten, .. } => nwritten,
            Sink::Buffer { pos, .. } => pos,
        }
    }
}
