//! Tape-level listings: the raw block dump (`-r`) and the catalog (`-t`).

use std::io::{Read, Write};

use crate::Config;
use crate::dialect::tables::Dialect;
use crate::dirent::{
    AccessFlags, DIR_ENTRY_SIZE, DirEntry, Label, device_name, format_date, is_tsb_label,
};
use crate::error::Error;
use crate::simh::{Block, TapeReader};
use crate::tfile::TfileReader;

/// Show raw tape block structure.
pub fn raw_dump<R: Read>(
    tap: &mut TapeReader<R>,
    cfg: &Config,
    out: &mut dyn Write,
) -> Result<(), Error> {
    loop {
        let block = match tap.read_block()? {
            Block::EndOfMedium => break,
            Block::Mark => {
                writeln!(out, "  --mark--")?;
                continue;
            }
            Block::Data(d) => d.to_vec(),
        };

        let lim = match cfg.verbose {
            0 => 32,
            1 => 128,
            _ => block.len(),
        }
        .min(block.len());

        write!(out, "{:6}  ", block.len())?;
        for i in (0..lim).step_by(16) {
            if i > 0 {
                write!(out, "        ")?;
            }

            // sixteen bytes as hex
            for j in 0..16 {
                if i + j < lim {
                    write!(out, "{:02x}", block[i + j])?;
                } else {
                    write!(out, "  ")?;
                }
                if j % 2 == 1 {
                    write!(out, " ")?;
                }
                if j % 8 == 7 {
                    write!(out, " ")?;
                }
            }

            // sixteen bytes as ASCII; high-bit TSB characters underlined
            for j in 0..16 {
                if i + j < lim {
                    let b = block[i + j];
                    let mut c = b;
                    let mut sfx = "";
                    if (c & 0x7f) < 32 || (c & 0x7f) == 127 {
                        c = b'.';
                    }
                    if c & 0x80 != 0 {
                        c &= 0x7f;
                        if c == b' ' || c.is_ascii_uppercase() || c.is_ascii_digit() {
                            write!(out, "\x1b[4m")?;
                            sfx = "\x1b[0m";
                        } else {
                            c = b'.';
                        }
                    }
                    write!(out, "{}{sfx}", c as char)?;
                } else {
                    write!(out, " ")?;
                }
                if j % 8 == 7 {
                    write!(out, " ")?;
                }
            }

            if i % 64 == 0 {
                write!(out, " {i:#x}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

/// One catalog line for a directory entry; returns the uid for grouping.
fn print_direntry(
    dent: &DirEntry,
    prev_uid: i32,
    dialect: Dialect,
    verbose: u8,
    out: &mut dyn Write,
) -> std::io::Result<i32> {
    let flags = dent.flags();
    let mut len = i32::from(dent.length_word());

    let mut type_c = ' ';
    let mut mode = ' ';
    let mut sanct = ' ';
    if dent.is_record_file() {
        type_c = 'F';
    } else if dent.is_csave() {
        type_c = 'C';
    }
    if type_c != 'F' {
        len = -i32::from(dent.length_word() as i16);
    }

    if dialect == Dialect::Access {
        if dent.name_flag() {
            type_c = 'A';
        }
        if type_c == 'F' && flags.contains(AccessFlags::MWA) {
            type_c = 'M';
        }
        if flags.contains(AccessFlags::UNRESTRICTED) {
            mode = 'U';
        } else if flags.contains(AccessFlags::PROTECTED) {
            mode = 'P';
        } else if flags.contains(AccessFlags::LOCKED) {
            mode = 'L';
        }
    } else {
        if dent.name_flag() {
            mode = 'P';
        }
        if dent.flags_word() != 0 {
            // non-zero drum address
            sanct = 'S';
        }
    }

    let uid = i32::from(dent.uid_word());
    if uid != prev_uid {
        if verbose == 0 {
            writeln!(out)?;
        }
        writeln!(out, "\n{}:", dent.user_id())?;
    }

    let name: String = dent.name_chars().iter().map(|&c| c as char).collect();
    write!(out, "{name} {type_c}{mode}{sanct} {len:4}")?;

    if verbose > 0 {
        let w = dent.access_date_word();
        write!(out, "  {}", format_date(w >> 9, w & 0x1ff))?;
        if verbose > 1 {
            write!(out, " flags=0x{:04x}", dent.flags_word())?;
        }
        if dent.is_record_file() {
            write!(out, " recsz={}", dent.record_size())?;
        }
        if type_c == 'A' {
            if let Some(device) = dent.device() {
                write!(out, " device={}", device_name(device))?;
            }
        }
        if flags.contains(AccessFlags::FCP) {
            write!(out, " FCP")?;
        }
        if flags.contains(AccessFlags::PFA) {
            write!(out, " PFA")?;
        }
        writeln!(out)?;
    } else {
        write!(out, "\t")?;
    }

    Ok(uid)
}

/// Catalog the tape.
pub fn catalog<R: Read>(
    tap: &mut TapeReader<R>,
    cfg: &mut Config,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let mut prev_uid = -1;

    loop {
        let block = match tap.read_block()? {
            Block::EndOfMedium => break,
            Block::Mark => {
                writeln!(out, "  --mark--")?;
                continue;
            }
            Block::Data(d) => d.to_vec(),
        };

        if is_tsb_label(&block) {
            let label = Label::from_block(&block);
            if cfg.dialect.is_none() {
                cfg.dialect = Some(label.dialect());
            }
            writeln!(
                out,
                "\nTSB Dump reel {:<2}  {}  oslvl {}-{}",
                label.reel(),
                format_date(label.year(), label.hours() / 24),
                label.os_level(),
                label.feature_level()
            )?;
            let mut tf = TfileReader::new(tap, &[], 0);
            tf.skip_to_mark()?;
            continue;
        }

        let dialect = cfg.dialect();
        let mut tf = TfileReader::new(tap, &block, dialect.block_header_len());
        let mut dbuf = [0u8; DIR_ENTRY_SIZE];
        if tf.read(&mut dbuf)? < DIR_ENTRY_SIZE {
            writeln!(out, "Unrecognized tape block")?;
        } else {
            let dent = DirEntry::from_bytes(dbuf);
            prev_uid = print_direntry(&dent, prev_uid, dialect, cfg.verbose, out)?;
        }
        tf.skip_to_mark()?;
    }

    if cfg.verbose == 0 {
        writeln!(out)?;
    }
    Ok(())
}
