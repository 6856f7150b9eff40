//! File matching and extraction: the `-x` and `-d` operations.

use std::io::Read;

use crate::Config;
use crate::basic::{dump_program, extract_program};
use crate::datafile::{extract_ascii_file, extract_record_file};
use crate::dialect::tables::Dialect;
use crate::dirent::{DIR_ENTRY_SIZE, DirEntry, Label, device_name, is_tsb_label};
use crate::error::Error;
use crate::outfile::{name_match, open_output, set_mtime};
use crate::simh::{Block, TapeReader};
use crate::tfile::TfileReader;

/// What to do with a matched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    /// Write the file's surface form to the host filesystem.
    Extract,
    /// Print the token structure of BASIC programs to stdout.
    Dump,
}

/// Walk the tape, applying `op` to every file matching one of `patterns`.
///
/// Returns the exit code: 0 ok, 2 errors, 3 when a pattern matched nothing.
pub fn scan_files<R: Read>(
    tap: &mut TapeReader<R>,
    patterns: &[String],
    file_op: FileOp,
    cfg: &mut Config,
) -> Result<i32, Error> {
    let mut found = vec![false; patterns.len()];
    let mut ec = 0;

    loop {
        let block = match tap.read_block()? {
            Block::EndOfMedium => break,
            Block::Mark => continue,
            Block::Data(d) => d.to_vec(),
        };

        if is_tsb_label(&block) {
            if cfg.dialect.is_none() {
                cfg.dialect = Some(Label::from_block(&block).dialect());
            }
            let mut tf = TfileReader::new(tap, &[], 0);
            tf.skip_to_mark()?;
            continue;
        }

        let dialect = cfg.dialect();
        let mut tf = TfileReader::new(tap, &block, dialect.block_header_len());
        let mut dbuf = [0u8; DIR_ENTRY_SIZE];
        if tf.read(&mut dbuf)? < DIR_ENTRY_SIZE {
            tf.skip_to_mark()?;
            continue;
        }
        let dent = DirEntry::from_bytes(dbuf);
        let id = dent.user_id();
        let name = dent.name();

        let mut hit = None;
        for (i, pat) in patterns.iter().enumerate() {
            if let Some(f) = name_match(pat, &id, &name) {
                hit = Some((i, f.to_string()));
                break;
            }
        }
        let Some((i, matched)) = hit else {
            tf.skip_to_mark()?;
            continue;
        };
        found[i] = true;
        if cfg.debug {
            eprintln!("scan_files: matched {id}/{name}");
        }

        // place in a subdirectory unless the pattern named the user id
        let path = if patterns[i].contains('/') {
            matched
        } else {
            format!("{id}/{matched}")
        };

        let result = match file_op {
            FileOp::Dump => {
                if dent.is_ascii(dialect) || dent.is_record_file() {
                    println!("{path}: not a BASIC program");
                    Ok(())
                } else {
                    dump_program(&mut tf, &dent, dialect, &mut std::io::stdout())
                }
            }
            FileOp::Extract => extract_one(&mut tf, &dent, dialect, cfg, &path),
        };

        if let Err(e) = result {
            match e {
                Error::Tape(e) => return Err(e.into()),
                e => {
                    ec = 2;
                    println!("{path}: {e}");
                }
            }
        }

        tf.skip_to_mark()?;
    }

    for (i, pat) in patterns.iter().enumerate() {
        if !found[i] {
            eprintln!("{pat} not found");
            ec = 3;
        }
    }
    Ok(ec)
}

fn extract_one<R: Read>(
    tf: &mut TfileReader<'_, R>,
    dent: &DirEntry,
    dialect: Dialect,
    cfg: &Config,
    path: &str,
) -> Result<(), Error> {
    if dent.is_ascii(dialect) {
        if let Some(device) = dent.device() {
            println!("{path}: not extracting device {}", device_name(device));
            return Ok(());
        }
    }

    let sfx = if dent.is_ascii(dialect) {
        "txt"
    } else if dent.is_record_file() {
        "csv"
    } else {
        "bas"
    };
    let (mut out, opath) = open_output(path, sfx, cfg.to_stdout)?;

    let result = if dent.is_ascii(dialect) {
        extract_ascii_file(tf, &mut out)
    } else if dent.is_record_file() {
        extract_record_file(tf, dent, &mut out)
    } else {
        extract_program(tf, dent, dialect, cfg, &mut out)
    };
    drop(out);

    // stamp the host file with the on-tape access date
    if let Some(opath) = opath {
        if let Some(date) = dent.access_date() {
            if let Err(e) = set_mtime(&opath, date) {
                eprintln!("{}: {e}", opath.display());
            }
        }
    }

    result
}
