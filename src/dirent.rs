//! TSB label blocks and 24-byte directory entries.

use bitflags::bitflags;
use chrono::NaiveDate;

use crate::dialect::tables::Dialect;

pub const DIR_ENTRY_SIZE: usize = 24;

/// Label header size on tape, leading length word included.
pub const LABEL_SIZE: usize = 20;

fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

bitflags! {
    /// Access flags word at directory offset 14. On 2000F the same word is
    /// the drum address.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u16 {
        const UNRESTRICTED = 0x0001;
        const PROTECTED    = 0x0002;
        const LOCKED       = 0x0004;
        const FCP          = 0x0800;
        const MWA          = 0x1000;
        const PFA          = 0x2000;
        const OUTPUT       = 0x4000;
        const INPUT        = 0x8000;
    }
}

/// Per-file record at the head of each tape file.
#[derive(Debug, Clone)]
pub struct DirEntry {
    raw: [u8; DIR_ENTRY_SIZE],
}

impl DirEntry {
    #[must_use]
    pub fn from_bytes(raw: [u8; DIR_ENTRY_SIZE]) -> Self {
        Self { raw }
    }

    #[must_use]
    pub fn raw(&self) -> &[u8; DIR_ENTRY_SIZE] {
        &self.raw
    }

    #[must_use]
    pub fn uid_word(&self) -> u16 {
        be16(&self.raw)
    }

    /// User id as printed: letter from the top 6 bits, 3-digit number from
    /// the low 10, e.g. `B001`.
    #[must_use]
    pub fn user_id(&self) -> String {
        let uid = self.uid_word();
        format!(
            "{}{:03}",
            (b'@' + (uid >> 10) as u8) as char,
            uid & 0x3ff
        )
    }

    /// Six name characters, high bits stripped.
    #[must_use]
    pub fn name_chars(&self) -> [u8; 6] {
        let mut name = [0u8; 6];
        for (i, c) in name.iter_mut().enumerate() {
            *c = self.raw[i + 2] & 0x7f;
        }
        name
    }

    /// Name trimmed at the first space.
    #[must_use]
    pub fn name(&self) -> String {
        let chars = self.name_chars();
        let end = chars.iter().position(|&c| c == b' ').unwrap_or(6);
        chars[..end].iter().map(|&c| c as char).collect()
    }

    /// High bit of the first name byte: ASCII file on Access, protected on
    /// 2000F.
    #[must_use]
    pub fn name_flag(&self) -> bool {
        self.raw[2] & 0x80 != 0
    }

    #[must_use]
    pub fn is_ascii(&self, dialect: Dialect) -> bool {
        dialect == Dialect::Access && self.name_flag()
    }

    /// BASIC-formatted (record) file.
    #[must_use]
    pub fn is_record_file(&self) -> bool {
        self.raw[4] & 0x80 != 0
    }

    #[must_use]
    pub fn is_csave(&self) -> bool {
        self.raw[6] & 0x80 != 0
    }

    pub fn clear_csave(&mut self) {
        self.raw[6] &= 0x7f;
    }

    /// Record size in words for data files, start address for programs.
    #[must_use]
    pub fn record_size(&self) -> u16 {
        be16(&self.raw[8..])
    }

    #[must_use]
    pub fn start_addr(&self) -> u16 {
        be16(&self.raw[8..])
    }

    /// Last-access date word: year-1900 in the top 7 bits, Julian day in
    /// the low 9.
    #[must_use]
    pub fn access_date_word(&self) -> u16 {
        be16(&self.raw[10..])
    }

    #[must_use]
    pub fn access_date(&self) -> Option<NaiveDate> {
        let w = self.access_date_word();
        julian_date(w >> 9, w & 0x1ff)
    }

    /// Flags word (Access) / drum address (2000F).
    #[must_use]
    pub fn flags_word(&self) -> u16 {
        be16(&self.raw[14..])
    }

    #[must_use]
    pub fn flags(&self) -> AccessFlags {
        AccessFlags::from_bits_retain(self.flags_word())
    }

    /// Clears the flags word; on 2000F output this is the drum address area.
    pub fn clear_flags(&mut self) {
        self.raw[14] = 0;
        self.raw[15] = 0;
    }

    pub fn set_protected_flag(&mut self) {
        self.raw[15] |= AccessFlags::PROTECTED.bits() as u8;
    }

    pub fn set_name_flag(&mut self, on: bool) {
        if on {
            self.raw[2] |= 0x80;
        } else {
            self.raw[2] &= 0x7f;
        }
    }

    /// Replace name character `i`, preserving the flag bit of byte 2.
    pub fn set_name_char(&mut self, i: usize, c: u8) {
        self.raw[i + 2] = self.raw[i + 2] & 0x80 | c & 0x7f;
    }

    /// An ASCII file that names a device rather than tape data.
    #[must_use]
    pub fn device(&self) -> Option<u16> {
        if be16(&self.raw[16..]) == 0xffff {
            Some(be16(&self.raw[18..]))
        } else {
            None
        }
    }

    /// Raw length word at offset 22; stores `-words` for programs and
    /// ASCII files.
    #[must_use]
    pub fn length_word(&self) -> u16 {
        be16(&self.raw[22..])
    }

    /// File length in words (negated length word).
    #[must_use]
    pub fn length_words(&self) -> i32 {
        -i32::from(self.length_word() as i16)
    }

    #[must_use]
    pub fn length_bytes(&self) -> i32 {
        2 * self.length_words()
    }

    pub fn set_length_words(&mut self, words: i16) {
        self.raw[22..24].copy_from_slice(&(-words).to_be_bytes());
    }
}

/// Printed form of a device id word, e.g. `LP0`.
#[must_use]
pub fn device_name(device: u16) -> String {
    format!(
        "{}{}{}",
        (b'A' + (device >> 10) as u8) as char,
        (b'A' + ((device >> 5) & 0x1f) as u8) as char,
        device & 0x1f
    )
}

/// A TSB label: 20-byte header-of-a-tape with the `LBTS` signature.
///
/// The leading word is a negative half-length; no directory entry starts
/// with its high bit set, which is how labels are told apart.
#[must_use]
pub fn is_tsb_label(block: &[u8]) -> bool {
    block.len() >= 18 && &block[2..6] == b"LBTS" && block[0] & 0x80 != 0
}

/// Accessors and conversion rewrites over a label block.
#[derive(Debug, Clone)]
pub struct Label {
    raw: Vec<u8>,
}

impl Label {
    #[must_use]
    pub fn from_block(block: &[u8]) -> Self {
        Self {
            raw: block.to_vec(),
        }
    }

    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[must_use]
    pub fn reel(&self) -> u16 {
        be16(&self.raw[8..])
    }

    /// Year count at word 10, hours at word 12.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        let yr = be16(&self.raw[10..]);
        let hours = be16(&self.raw[12..]);
        julian_date(yr, hours / 24)
    }

    #[must_use]
    pub fn year(&self) -> u16 {
        be16(&self.raw[10..])
    }

    #[must_use]
    pub fn hours(&self) -> u16 {
        be16(&self.raw[12..])
    }

    #[must_use]
    pub fn os_level(&self) -> u16 {
        be16(&self.raw[16..])
    }

    #[must_use]
    pub fn feature_level(&self) -> u16 {
        if self.raw.len() >= LABEL_SIZE {
            be16(&self.raw[18..])
        } else {
            0
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        Dialect::from_os_level(self.os_level())
    }

    /// Rewrite the length word and OS/feature levels for the target
    /// generation; used by whole-tape conversion.
    pub fn set_dialect(&mut self, to: Dialect) {
        self.raw[0..2].copy_from_slice(&to.label_length_word().to_be_bytes());
        let (sys, feat) = to.os_levels();
        if self.raw.len() >= LABEL_SIZE {
            self.raw[16..18].copy_from_slice(&sys.to_be_bytes());
            self.raw[18..20].copy_from_slice(&feat.to_be_bytes());
        }
    }
}

/// Convert a TSB Julian date (year offset from 1900, day of year) to a
/// calendar date.
#[must_use]
pub fn julian_date(yr: u16, jday: u16) -> Option<NaiveDate> {
    NaiveDate::from_yo_opt(1900 + i32::from(yr), u32::from(jday))
}

/// Catalog date format, `dd-Mon-yyyy` with a blank-padded day.
#[must_use]
pub fn format_date(yr: u16, jday: u16) -> String {
    match julian_date(yr, jday) {
        Some(d) => d.format("%e-%b-%Y").to_string(),
        None => format!("??-????-{:4}", 1900 + u32::from(yr)),
    }
}
