//! Record-oriented TSB files: BASIC-formatted data files and ASCII files.
//!
//! A logical record occupies `2 * recsz` data bytes plus padding up to 512
//! bytes on tape. Items inside a record carry 2-byte headers; `0xFFFF` ends
//! the file, `0xFFFE` ends the record.

use std::io::{Read, Write};

use crate::basic::format_number;
use crate::dirent::DirEntry;
use crate::error::{Error, FormatError};
use crate::tfile::TfileReader;

const END_OF_FILE: u16 = 0xffff;
const END_OF_RECORD: u16 = 0xfffe;

/// Bytes a record occupies on tape, padding included.
const RECORD_SPAN: usize = 512;

/// One logical record of a data file.
struct RecordReader<'a, 't, R> {
    tfile: &'a mut TfileReader<'t, R>,
    nleft: usize,
    pad: usize,
}

impl<'a, 't, R: Read> RecordReader<'a, 't, R> {
    fn new(tfile: &'a mut TfileReader<'t, R>, recsz: usize) -> Self {
        debug_assert!(recsz > 0 && recsz <= 256);
        Self {
            tfile,
            nleft: 2 * recsz,
            pad: RECORD_SPAN - 2 * recsz,
        }
    }

    /// Read up to `out.len()` bytes, bounded by the record's data area.
    fn read(&mut self, out: &mut [u8]) -> Result<usize, Error> {
        let n = out.len().min(self.nleft);
        let nread = self.tfile.read(&mut out[..n])?;
        self.nleft -= nread;
        Ok(nread)
    }

    /// Consume whatever is left of the record, padding included.
    fn skip_rest(&mut self) -> Result<(), Error> {
        self.tfile.skip(self.nleft + self.pad)?;
        self.nleft = 0;
        Ok(())
    }
}

/// CSV field quoting: double internal quotes, escape NUL and newline.
fn csv_quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');
    for &c in bytes {
        match c {
            b'"' => out.push_str("\"\""),
            0 => out.push_str("\\0"),
            b'\n' => out.push_str("\\n"),
            c => out.push(c as char),
        }
    }
    out.push('"');
    out
}

/// Extract a BASIC-formatted (record) file as CSV, one record per line.
pub fn extract_record_file<R: Read>(
    tfile: &mut TfileReader<'_, R>,
    dent: &DirEntry,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let recsz = dent.record_size();
    if recsz == 0 || recsz > 256 {
        return Err(FormatError::BadRecordSize(recsz).into());
    }

    'file: loop {
        let mut rec = RecordReader::new(tfile, recsz as usize);
        let mut sep = "";
        loop {
            let mut buf = [0u8; 4];
            if rec.read(&mut buf[..2])? < 2 {
                // record data exhausted without an end marker
                break;
            }
            let code = u16::from_be_bytes([buf[0], buf[1]]);
            if code == END_OF_FILE {
                break 'file;
            }
            if code == END_OF_RECORD {
                break;
            }

            // string item
            if buf[0] == 0x02 {
                let stlen = buf[1] as usize;
                let nbytes = (stlen + 1) & !1;
                let mut sbuf = vec![0u8; nbytes];
                if rec.read(&mut sbuf)? < nbytes {
                    return Err(FormatError::TruncatedRecordString.into());
                }
                write!(out, "{sep}{}", csv_quote(&sbuf[..stlen]))?;
                sep = ",";
                continue;
            }

            // number item: header plus next word form an HP float
            let bits = code & 0xc000;
            if bits != 0x8000 && bits != 0x4000 && code != 0 {
                return Err(FormatError::UnrecognizedItem(code).into());
            }
            if rec.read(&mut buf[2..])? < 2 {
                return Err(FormatError::TruncatedRecordNumber.into());
            }
            write!(out, "{sep}{}", format_number(&buf))?;
            sep = ",";
        }
        rec.skip_rest()?;
        writeln!(out)?;
    }
    Ok(())
}

/// Extract an ASCII file as plain text, one stored string per line.
pub fn extract_ascii_file<R: Read>(
    tfile: &mut TfileReader<'_, R>,
    out: &mut dyn Write,
) -> Result<(), Error> {
    'file: loop {
        let mut rec = RecordReader::new(tfile, 256);
        loop {
            let mut buf = [0u8; 2];
            if rec.read(&mut buf)? < 2 {
                break;
            }
            let stlen = u16::from_be_bytes(buf);
            if stlen == END_OF_FILE {
                break 'file;
            }
            if stlen == END_OF_RECORD {
                break;
            }

            let nbytes = (stlen as usize + 1) & !1;
            let mut sbuf = vec![0u8; nbytes];
            if rec.read(&mut sbuf)? < nbytes {
                return Err(FormatError::TruncatedAsciiString.into());
            }
            out.write_all(&sbuf[..stlen as usize])?;
            out.write_all(b"\n")?;
        }
        rec.skip_rest()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::DIR_ENTRY_SIZE;
    use crate::simh::{Block, TapeReader, TapeWriter};

    fn entry_with_recsz(recsz: u16) -> DirEntry {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[4] = 0x80;
        raw[8..10].copy_from_slice(&recsz.to_be_bytes());
        DirEntry::from_bytes(raw)
    }

    /// One tape file whose payload is `data`, then run `f` on a framer.
    fn with_tfile<T>(data: &[u8], f: impl FnOnce(&mut TfileReader<'_, &[u8]>) -> T) -> T {
        let mut image = Vec::new();
        let mut w = TapeWriter::new(&mut image);
        w.write_block(data).unwrap();
        w.write_mark().unwrap();
        drop(w);
        let mut tap = TapeReader::new(image.as_slice());
        let first = match tap.read_block() {
            Ok(Block::Data(d)) => d.to_vec(),
            other => panic!("expected data block, got {other:?}"),
        };
        let mut tf = TfileReader::new(&mut tap, &first, 0);
        f(&mut tf)
    }

    fn record(recsz: usize, items: &[u8]) -> Vec<u8> {
        let mut r = items.to_vec();
        r.resize(RECORD_SPAN.min(2 * recsz), 0);
        r.resize(RECORD_SPAN, 0);
        r
    }

    #[test]
    fn empty_record_then_eof() {
        // FFFE ends an empty record, FFFF ends the file: one empty CSV line.
        let mut data = record(4, &[0xff, 0xfe]);
        data.extend_from_slice(&[0xff, 0xff]);
        let out = with_tfile(&data, |tf| {
            let mut out = Vec::new();
            extract_record_file(tf, &entry_with_recsz(4), &mut out).unwrap();
            out
        });
        assert_eq!(out, b"\n");
    }

    #[test]
    fn numbers_and_strings_to_csv() {
        // 1.0 as HP float, then "A,B", then end of record and file.
        let mut items = vec![0x40, 0x00, 0x00, 0x02];
        items.extend_from_slice(&[0x02, 0x03]);
        items.extend_from_slice(b"A,B\0");
        items.extend_from_slice(&[0xff, 0xfe]);
        let mut data = record(16, &items);
        data.extend_from_slice(&[0xff, 0xff]);
        let out = with_tfile(&data, |tf| {
            let mut out = Vec::new();
            extract_record_file(tf, &entry_with_recsz(16), &mut out).unwrap();
            out
        });
        assert_eq!(String::from_utf8(out).unwrap(), "1,\"A,B\"\n");
    }

    #[test]
    fn csv_quote_escapes() {
        assert_eq!(csv_quote(b"a\"b"), "\"a\"\"b\"");
        assert_eq!(csv_quote(b"x\ny\0"), "\"x\\ny\\0\"");
    }

    #[test]
    fn ascii_strings() {
        // "HI" and "X" as length-prefixed strings, then EOF.
        let mut items = vec![0x00, 0x02];
        items.extend_from_slice(b"HI");
        items.extend_from_slice(&[0x00, 0x01]);
        items.extend_from_slice(b"X\0");
        items.extend_from_slice(&[0xff, 0xff]);
        let data = record(256, &items);
        let out = with_tfile(&data, |tf| {
            let mut out = Vec::new();
            extract_ascii_file(tf, &mut out).unwrap();
            out
        });
        assert_eq!(String::from_utf8(out).unwrap(), "HI\nX\n");
    }
}
