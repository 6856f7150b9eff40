//! Helpers for building TSB tape images in memory.
#![allow(dead_code)]

use tsbtap::dialect::tables::Dialect;
use tsbtap::dirent::{DIR_ENTRY_SIZE, DirEntry, is_tsb_label};
use tsbtap::simh::{Block, TapeReader, TapeWriter};
use tsbtap::tfile::{TBLOCK_SIZE, TfileReader, TfileWriter};
use tsbtap::{Config, basic};

/// User B001.
pub const UID: u16 = (2 << 10) | 1;

pub fn dirent(uid: u16, name: &str) -> [u8; DIR_ENTRY_SIZE] {
    let mut d = [0u8; DIR_ENTRY_SIZE];
    d[0..2].copy_from_slice(&uid.to_be_bytes());
    let mut n = [b' '; 6];
    n[..name.len()].copy_from_slice(name.as_bytes());
    d[2..8].copy_from_slice(&n);
    d
}

pub fn set_length_words(d: &mut [u8; DIR_ENTRY_SIZE], words: i16) {
    d[22..24].copy_from_slice(&(-words).to_be_bytes());
}

/// Assemble a token word from its fields.
pub fn tok(kind: u16, op: u16, name: u16, typ: u16) -> u16 {
    (kind << 15) | (op << 9) | (name << 4) | typ
}

/// One statement: line number, word count, body.
pub fn stmt(line: u16, body: &[u8]) -> Vec<u8> {
    assert_eq!(body.len() % 2, 0);
    let mut v = Vec::with_capacity(body.len() + 4);
    v.extend_from_slice(&line.to_be_bytes());
    v.extend_from_slice(&(body.len() as u16 / 2 + 2).to_be_bytes());
    v.extend_from_slice(body);
    v
}

pub struct TapeBuilder {
    w: TapeWriter<Vec<u8>>,
}

impl TapeBuilder {
    pub fn new() -> Self {
        Self {
            w: TapeWriter::new(Vec::new()),
        }
    }

    /// A 20-byte TSB label for reel 1, day 1 of 1990.
    pub fn label(&mut self, dialect: Dialect) -> &mut Self {
        let (sys, feat) = dialect.os_levels();
        let mut b = [0u8; 20];
        b[0..2].copy_from_slice(&dialect.label_length_word().to_be_bytes());
        b[2..6].copy_from_slice(b"LBTS");
        b[8..10].copy_from_slice(&1u16.to_be_bytes());
        b[10..12].copy_from_slice(&90u16.to_be_bytes());
        b[12..14].copy_from_slice(&24u16.to_be_bytes());
        b[16..18].copy_from_slice(&sys.to_be_bytes());
        b[18..20].copy_from_slice(&feat.to_be_bytes());
        self.w.write_block(&b).unwrap();
        self.w.write_mark().unwrap();
        self
    }

    /// One tape file: directory entry followed by the file body.
    pub fn file(&mut self, dent: &[u8; DIR_ENTRY_SIZE], body: &[u8], dialect: Dialect) -> &mut Self {
        let mut tw = TfileWriter::new(TBLOCK_SIZE + DIR_ENTRY_SIZE, dialect.block_header_len());
        tw.write(&mut self.w, dent).unwrap();
        tw.write(&mut self.w, body).unwrap();
        tw.finish_file(&mut self.w, DIR_ENTRY_SIZE).unwrap();
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.w.into_inner()
    }
}

/// Extract the first program file on the image as BASIC source.
pub fn read_first_program(image: &[u8], dialect: Dialect) -> String {
    let cfg = Config {
        dialect: Some(dialect),
        ..Config::default()
    };
    let mut tap = TapeReader::new(image);
    loop {
        let block = match tap.read_block().unwrap() {
            Block::Data(d) => d.to_vec(),
            Block::Mark => continue,
            Block::EndOfMedium => panic!("no program file on image"),
        };
        if is_tsb_label(&block) {
            let mut tf = TfileReader::new(&mut tap, &[], 0);
            tf.skip_to_mark().unwrap();
            continue;
        }
        let mut tf = TfileReader::new(&mut tap, &block, dialect.block_header_len());
        let mut dbuf = [0u8; DIR_ENTRY_SIZE];
        assert_eq!(tf.read(&mut dbuf).unwrap(), DIR_ENTRY_SIZE);
        let dent = DirEntry::from_bytes(dbuf);
        let mut out = Vec::new();
        basic::extract_program(&mut tf, &dent, dialect, &cfg, &mut out).unwrap();
        return String::from_utf8(out).unwrap();
    }
}

/// Read the first file's framed contents (directory entry included).
pub fn read_first_file(image: &[u8], dialect: Dialect, nbytes: usize) -> Vec<u8> {
    let mut tap = TapeReader::new(image);
    loop {
        let block = match tap.read_block().unwrap() {
            Block::Data(d) => d.to_vec(),
            Block::Mark => continue,
            Block::EndOfMedium => panic!("no file on image"),
        };
        if is_tsb_label(&block) {
            let mut tf = TfileReader::new(&mut tap, &[], 0);
            tf.skip_to_mark().unwrap();
            continue;
        }
        let mut tf = TfileReader::new(&mut tap, &block, dialect.block_header_len());
        let mut buf = vec![0u8; nbytes];
        let n = tf.read(&mut buf).unwrap();
        buf.truncate(n);
        return buf;
    }
}
