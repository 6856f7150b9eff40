//! Converting tapes between 2000F and 2000 Access.
//!
//! Programs are re-emitted statement by statement; constructs the target
//! generation cannot express are either fatal for the file or, under the
//! ignore-errors flag, replayed as a `REM !<reason><source>` line so the
//! numbering survives and the dropped text stays inspectable.

use std::io::{Read, Write};

use crate::Config;
use crate::basic::{print_stmt, relocate_csave};
use crate::dialect::codes::{BuiltinFn, MAT_FN_SHIFT, Token, op, operand, stmt};
use crate::dialect::tables::Dialect;
use crate::dirent::{AccessFlags, DIR_ENTRY_SIZE, DirEntry, Label, LABEL_SIZE, is_tsb_label};
use crate::error::{ConvertError, Error, FormatError, TapeError};
use crate::prog::{ProgBuffer, Stmt};
use crate::simh::{Block, TapeReader, TapeWriter};
use crate::sink::Sink;
use crate::tfile::{TBLOCK_SIZE, TfileReader, TfileWriter};

/// How one statement came out of the transducer.
enum Outcome {
    Done,
    /// Reason letter plus the report text.
    Unsupported(u8, &'static str),
}

fn copy_raw_stmt(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    token: Token,
) -> Result<(), Error> {
    sink.write_bytes(&token.be_bytes())?;
    loop {
        let chunk = stmt.take(prog, 256);
        if chunk.is_empty() {
            return Ok(());
        }
        sink.write_bytes(chunk)?;
    }
}

fn copy_number(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
) -> Result<(), Error> {
    let b = stmt.take(prog, 4);
    if b.len() < 4 {
        return Err(FormatError::TruncatedNumber.into());
    }
    let b = [b[0], b[1], b[2], b[3]];
    sink.write_bytes(&b)?;
    Ok(())
}

/// Re-emit one 2000F statement in Access form.
fn stmt_to_access(
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    sink: &mut Sink<'_>,
) -> Result<Outcome, Error> {
    let mut first = true;
    let mut stmt_op = 0u8;
    let mut len_state = 0u8; // 1=LEN 2=( 3=v$

    while let Some(word) = stmt.next_word(prog) {
        let mut token = Token(word);
        let opcode = token.op();

        if first {
            stmt_op = opcode;
            if stmt::is_raw_body(opcode) {
                copy_raw_stmt(sink, prog, stmt, token)?;
                break;
            }
        } else {
            match opcode {
                op::RPAREN => {
                    // Access wants an end-of-formula word after LEN(v$
                    if len_state == 3 {
                        sink.write_bytes(&[0, 0])?;
                        len_state = 0;
                    }
                }
                op::LPAREN => {
                    if len_state == 1 {
                        len_state = 2;
                    }
                }
                _ => {}
            }
        }
        first = false;

        if token.is_operand() && token.typ() == operand::FUNCTION {
            let name = token.name();
            if name == u8::from(BuiltinFn::Len) {
                len_state = 1;
            } else if (0o24..=0o30).contains(&name) {
                // ZER..TRN sit seven slots higher in the Access table
                token = token.with_name(name + MAT_FN_SHIFT);
            }
        }

        sink.write_bytes(&token.be_bytes())?;

        if token.is_operand() {
            match token.typ() {
                operand::NUMBER => copy_number(sink, prog, stmt)?,
                operand::INTEGER => {
                    let Some(v) = stmt.next_word(prog) else {
                        return Err(FormatError::TruncatedValue.into());
                    };
                    sink.write_bytes(&v.to_be_bytes())?;
                    if matches!(stmt_op, stmt::COM | stmt::DIM) || opcode == op::USING {
                        continue;
                    }
                    while let Some(v) = stmt.next_word(prog) {
                        sink.write_bytes(&v.to_be_bytes())?;
                    }
                }
                _ => {}
            }
        } else if opcode == op::QUOTE {
            let n = (token.str_len() + 1) & !1;
            let body = stmt.take(prog, n);
            if body.len() < n {
                return Err(FormatError::TruncatedString.into());
            }
            let body = body.to_vec();
            for c in body {
                sink.put_byte(match c {
                    0o16 => b'\n',
                    0o17 => b'\r',
                    c => c,
                })?;
            }
        } else if token.typ() == 0 && token.name() != 0 && len_state == 2 {
            // string variable inside LEN(
            len_state = 3;
        }
    }
    Ok(Outcome::Done)
}

/// Re-emit one Access statement in 2000F form, or flag it unsupported.
fn stmt_to_2000f(
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    sink: &mut Sink<'_>,
) -> Result<Outcome, Error> {
    let mut first = true;
    let mut stmt_op = 0u8;
    let mut dim_state = 0u8; // 1=DIM/COM 2=v$ 3=[
    let mut len_state = 0u8; // 1=LEN 2=( 3=v$
    let mut prt_state = 0u8; // 1=PRINT 2=#(file)

    while let Some(word) = stmt.next_word(prog) {
        let mut token = Token(word);
        let opcode = token.op();

        if first {
            stmt_op = opcode;
            match opcode {
                stmt::IMAGE | stmt::REM | stmt::FILES => {
                    copy_raw_stmt(sink, prog, stmt, token)?;
                    break;
                }
                stmt::COM | stmt::DIM => dim_state = 1,
                stmt::ASSIGN => {}
                stmt::PRINT => prt_state = 1,
                _ => {
                    if opcode <= 0o44 {
                        // SYSTEM, CONVERT, LOCK, ... exist only on Access
                        return Ok(Outcome::Unsupported(b's', "unsupported statement type"));
                    }
                }
            }
        } else {
            match opcode {
                op::END_FORMULA => {
                    // omitted after LEN(v$ on 2000F
                    if len_state == 3 {
                        len_state = 0;
                        continue;
                    }
                    if len_state == 2 {
                        return Ok(Outcome::Unsupported(b'i', "LEN of string constant"));
                    }
                }
                op::QUOTE => {
                    if len_state == 2 {
                        return Ok(Outcome::Unsupported(b'i', "LEN of string constant"));
                    }
                }
                op::FILE_NUM => {
                    if prt_state == 1 {
                        prt_state = 2;
                    }
                }
                op::RBRACKET => {
                    if dim_state > 0 {
                        dim_state = 1;
                    }
                }
                op::LBRACKET => {
                    if dim_state == 2 {
                        dim_state = 3;
                    }
                }
                op::LPAREN => {
                    if len_state == 1 {
                        len_state = 2;
                    }
                }
                op::STAR_STAR => token = token.with_op(op::CARET),
                op::USING => {
                    if prt_state == 2 {
                        return Ok(Outcome::Unsupported(b'u', "PRINT USING to file"));
                    }
                }
                op::FILE_OP_FIRST..=op::FILE_OP_LAST => {
                    // RR/WR/NR/ERROR
                    return Ok(Outcome::Unsupported(b'o', "unsupported operator"));
                }
                _ => {}
            }
        }
        first = false;

        if !token.is_operand() {
            if token.op() == op::QUOTE {
                if token.str_len() > 72 {
                    return Ok(Outcome::Unsupported(b'l', "string too long"));
                }
            } else if token.typ() == 0 {
                if token.name() > 0o32 {
                    return Ok(Outcome::Unsupported(b'v', "unsupported string variable"));
                }
                if token.name() != 0 {
                    if len_state == 2 {
                        len_state = 3;
                    }
                    if dim_state == 1 {
                        dim_state = 2;
                    }
                }
            }
        } else if token.typ() == operand::FUNCTION {
            match BuiltinFn::try_from(token.name()) {
                Ok(BuiltinFn::Len) => len_state = 1,
                Ok(
                    BuiltinFn::Ctl
                    | BuiltinFn::Itm
                    | BuiltinFn::Rec
                    | BuiltinFn::Num
                    | BuiltinFn::Pos
                    | BuiltinFn::Chr
                    | BuiltinFn::Ups
                    | BuiltinFn::Sys
                    | BuiltinFn::Spare,
                ) => {
                    return Ok(Outcome::Unsupported(b'f', "unsupported function"));
                }
                Ok(
                    BuiltinFn::Zer
                    | BuiltinFn::Con
                    | BuiltinFn::Idn
                    | BuiltinFn::Inv
                    | BuiltinFn::Trn,
                ) => {
                    token = token.with_name(token.name() - MAT_FN_SHIFT);
                }
                _ => {}
            }
        }

        sink.write_bytes(&token.be_bytes())?;

        if token.is_operand() {
            match token.typ() {
                operand::NUMBER => copy_number(sink, prog, stmt)?,
                operand::INTEGER => {
                    let Some(v) = stmt.next_word(prog) else {
                        return Err(FormatError::TruncatedValue.into());
                    };
                    sink.write_bytes(&v.to_be_bytes())?;
                    if token.op() == op::USING {
                        continue;
                    }
                    if dim_state != 0 {
                        // string dimensions cap at 72 on 2000F
                        if dim_state == 3 && v > 72 {
                            return Ok(Outcome::Unsupported(b'd', "string dimension too large"));
                        }
                        continue;
                    }
                    while let Some(v) = stmt.next_word(prog) {
                        sink.write_bytes(&v.to_be_bytes())?;
                    }
                }
                _ => {}
            }
        } else if token.op() == op::QUOTE {
            let n = (token.str_len() + 1) & !1;
            let body = stmt.take(prog, n);
            if body.len() < n {
                return Err(FormatError::TruncatedString.into());
            }
            let body = body.to_vec();
            for c in body {
                sink.put_byte(match c {
                    b'\n' => 0o16,
                    b'\r' => 0o17,
                    c => c,
                })?;
            }
        }
    }
    Ok(Outcome::Done)
}

fn report(cfg: &Config, pname: &str, lineno: u16, errors: &mut u32, msg: &str) {
    if cfg.verbose > 1 || (cfg.verbose > 0 && *errors == 0) {
        println!("{pname} line {lineno}: {msg}");
    }
    *errors += 1;
}

/// Convert one tokenized program and write it (directory entry first) to
/// the output framer.
pub fn convert_program<R: Read, W: Write>(
    pname: &str,
    dent: &mut DirEntry,
    tf: &mut TfileReader<'_, R>,
    tap_out: &mut TapeWriter<W>,
    otf: &mut TfileWriter,
    to: Dialect,
    cfg: &Config,
) -> Result<(), Error> {
    let from = match to {
        Dialect::Access => Dialect::Tsb2000F,
        Dialect::Tsb2000F => Dialect::Access,
    };

    let mut prog = ProgBuffer::read_from(tf)?;
    if dent.is_csave() {
        relocate_csave(&mut prog, dent, from)?;
        dent.clear_csave();
    } else {
        let len = dent.length_bytes();
        if len <= 0 || !prog.set_logical_size(len as usize) {
            println!("invalid size in directory entry");
        }
    }

    let limit = to.stmt_limit();
    let mut text: Vec<u8> = Vec::with_capacity(8 * TBLOCK_SIZE);
    let mut errors = 0u32;

    loop {
        let save = prog.cursor();
        let Some(mut stmt) = Stmt::next(&mut prog) else {
            break;
        };
        let lineno = stmt.line_no();

        // statement staging area; one spare byte detects overflow
        let mut staged = vec![0u8; limit + 2];
        let mut sink = Sink::buffer(&mut staged[..limit + 1]);
        sink.write_bytes(&[0; 4])?;
        let outcome = match to {
            Dialect::Access => stmt_to_access(&mut prog, &mut stmt, &mut sink)?,
            Dialect::Tsb2000F => stmt_to_2000f(&mut prog, &mut stmt, &mut sink)?,
        };
        let mut stlen = sink.finish();

        let reason = match outcome {
            Outcome::Unsupported(reason, what) => {
                report(cfg, pname, lineno, &mut errors, what);
                Some(reason)
            }
            Outcome::Done if stlen > limit => {
                report(cfg, pname, lineno, &mut errors, "statement too long");
                Some(if to == Dialect::Access { b'T' } else { b't' })
            }
            Outcome::Done => None,
        };

        if let Some(reason) = reason {
            if !cfg.ignore_errors {
                return Err(if reason == b't' || reason == b'T' {
                    ConvertError::StatementTooLong.into()
                } else {
                    ConvertError::Unsupported.into()
                });
            }

            // redo as REM, preserving the line number
            prog.set_cursor(save);
            let Some(mut stmt) = Stmt::next(&mut prog) else {
                break;
            };
            let mut sink = Sink::buffer(&mut staged[..limit]);
            sink.write_bytes(&[0; 4])?;
            sink.write_bytes(&[stmt::REM << 1, b' '])?;
            sink.put_byte(b'!')?;
            sink.put_byte(reason)?;
            print_stmt(&mut sink, &mut prog, &mut stmt, from)?;
            stlen = sink.finish();

            // pad to a 16-bit word boundary
            if stlen & 1 == 1 {
                staged[stlen] = 0;
                stlen += 1;
            }
        }

        staged[0..2].copy_from_slice(&lineno.to_be_bytes());
        staged[2..4].copy_from_slice(&((stlen / 2) as u16).to_be_bytes());
        text.extend_from_slice(&staged[..stlen]);
    }

    dent.set_length_words((text.len() / 2) as i16);
    otf.write(tap_out, dent.raw())?;
    otf.write(tap_out, &text)?;
    Ok(())
}

fn raw_copy<R: Read, W: Write>(
    tf: &mut TfileReader<'_, R>,
    tap_out: &mut TapeWriter<W>,
    otf: &mut TfileWriter,
) -> Result<(), TapeError> {
    let mut buf = [0u8; 512];
    loop {
        let n = tf.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        otf.write(tap_out, &buf[..n])?;
    }
}

/// Convert a whole tape image to the other TSB generation.
pub fn convert_tape<R: Read, W: Write>(
    tap: &mut TapeReader<R>,
    out: &mut TapeWriter<W>,
    to: Dialect,
    cfg: &Config,
) -> Result<(), Error> {
    let from = match to {
        Dialect::Access => Dialect::Tsb2000F,
        Dialect::Tsb2000F => Dialect::Access,
    };
    let mut otf: Option<TfileWriter> = None;

    loop {
        let block = match tap.read_block()? {
            Block::EndOfMedium => break,
            Block::Mark => {
                out.write_mark()?;
                continue;
            }
            Block::Data(d) => d.to_vec(),
        };

        if is_tsb_label(&block) {
            let mut label = Label::from_block(&block);
            if label.dialect() == to {
                return Err(match to {
                    Dialect::Access => ConvertError::AlreadyAccess.into(),
                    Dialect::Tsb2000F => ConvertError::Already2000F.into(),
                });
            }
            label.set_dialect(to);
            let n = LABEL_SIZE.min(label.raw().len());
            out.write_block(&label.raw()[..n])?;
            out.write_mark()?;

            // skip Hibernate or Sleep data structures
            let mut tf = TfileReader::new(tap, &[], 0);
            tf.skip_to_mark()?;
            continue;
        }

        let otf = otf.get_or_insert_with(|| {
            TfileWriter::new(TBLOCK_SIZE + DIR_ENTRY_SIZE, to.block_header_len())
        });

        let mut tf = TfileReader::new(tap, &block, from.block_header_len());
        let mut dbuf = [0u8; DIR_ENTRY_SIZE];
        if tf.read(&mut dbuf)? < DIR_ENTRY_SIZE {
            tf.skip_to_mark()?;
            continue;
        }
        let mut dent = DirEntry::from_bytes(dbuf);
        let orig_name = dent.name();
        let pname = format!("{}/{}", dent.user_id(), orig_name);
        if cfg.debug {
            eprintln!("convert_tape: {pname}");
        }

        let mut renamed = false;
        match to {
            Dialect::Access => {
                // replace name characters Access won't accept
                let chars = dent.name_chars();
                for (i, &c) in chars.iter().enumerate() {
                    if c == b' ' {
                        break;
                    }
                    if !c.is_ascii_uppercase() && !c.is_ascii_digit() {
                        dent.set_name_char(i, b'Z');
                        renamed = true;
                    }
                }
                dent.clear_flags();
                if dent.name_flag() {
                    // 2000F protected bit becomes the Access flag
                    dent.set_name_flag(false);
                    dent.set_protected_flag();
                }
            }
            Dialect::Tsb2000F => {
                if dent.is_ascii(from) {
                    println!("Skipped ASCII file {pname}");
                    tf.skip_to_mark()?;
                    continue;
                }
                if dent
                    .flags()
                    .intersects(AccessFlags::PROTECTED | AccessFlags::LOCKED)
                {
                    dent.set_name_flag(true);
                }
                dent.clear_flags();
            }
        }

        if dent.is_record_file() {
            // BASIC-formatted files carry no program text; copy unaltered
            otf.write(out, dent.raw())?;
            raw_copy(&mut tf, out, otf)?;
        } else if let Err(e) = convert_program(&pname, &mut dent, &mut tf, out, otf, to, cfg) {
            match e {
                Error::Tape(e) => return Err(e.into()),
                e => {
                    println!("Skipping {pname}: {e}");
                    tf.skip_to_mark()?;
                    continue;
                }
            }
        }

        otf.finish_file(out, DIR_ENTRY_SIZE)?;
        if cfg.verbose > 0 {
            if renamed {
                println!("Converted {pname} -> {}", dent.name());
            } else {
                println!("Converted {pname}");
            }
        }
        tf.skip_to_mark()?;
    }

    out.flush()?;
    Ok(())
}
