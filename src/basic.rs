//! Tokenized BASIC: decoding token streams back to surface source.
//!
//! Every statement word pairs an operator (`op`) with an operand (`name` +
//! `type`); the statement-initial operator is the statement keyword. CSAVEd
//! programs store destination addresses and symbol-table indices instead of
//! line numbers and variable names, so they get one in-place relocation
//! pass before any printing or conversion.

use std::io::{Read, Write};

use crate::Config;
use crate::dialect::codes::{Token, op, operand, stmt};
use crate::dialect::tables::Dialect;
use crate::dirent::DirEntry;
use crate::error::{Error, FormatError};
use crate::prog::{ProgBuffer, Stmt};
use crate::sink::Sink;
use crate::tfile::TfileReader;

fn be16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

/// Decode a 4-byte HP floating-point number: sign, 23-bit mantissa
/// fraction, 7-bit excess exponent with its own sign in the low bit.
#[must_use]
pub fn decode_number(b: &[u8; 4]) -> f64 {
    let mant = f64::from((u32::from(b[0] & 0x7f) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
        / f64::from(1u32 << 23);
    let mant = if b[0] & 0x80 != 0 { -mant } else { mant };
    let expt = i32::from(b[3] >> 1);
    if b[3] & 1 != 0 {
        mant / 2f64.powi(128 - expt)
    } else {
        mant * 2f64.powi(expt)
    }
}

fn trim_zeros(digits: &[u8]) -> &str {
    let end = digits
        .iter()
        .rposition(|&c| c != b'0')
        .map_or(0, |p| p + 1);
    std::str::from_utf8(&digits[..end]).unwrap_or("")
}

/// Render a number the way TSB lists it: six significant digits, no leading
/// zero before the decimal point, small exponents unrolled, a trailing `.`
/// marking non-integer storage of values above 32767, scientific notation
/// beyond six printable digits.
#[must_use]
pub fn tsb_number_string(val: f64) -> String {
    if val == 0.0 {
        return "0".to_string();
    }
    let sci = format!("{val:.5E}");
    let (mant, exp) = sci.split_once('E').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let neg = mant.starts_with('-');
    let digits: Vec<u8> = mant.bytes().filter(|b| b.is_ascii_digit()).collect();

    if !(-6..=5).contains(&exp) {
        let m = trim_zeros(&digits);
        let mut out = String::new();
        if neg {
            out.push('-');
        }
        if m.len() > 1 {
            out.push_str(&m[..1]);
            out.push('.');
            out.push_str(&m[1..]);
        } else {
            out.push_str(m);
        }
        out.push('E');
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&format!("{:02}", exp.abs()));
        return out;
    }

    let mut out = String::new();
    if neg {
        out.push('-');
    }
    if exp >= 0 {
        let ip = exp as usize + 1;
        out.push_str(std::str::from_utf8(&digits[..ip]).unwrap_or(""));
        let frac = trim_zeros(&digits[ip..]);
        if frac.is_empty() {
            let intval: u32 = std::str::from_utf8(&digits[..ip])
                .unwrap_or("0")
                .parse()
                .unwrap_or(0);
            if intval > 32767 {
                out.push('.');
            }
        } else {
            out.push('.');
            out.push_str(frac);
        }
    } else {
        out.push('.');
        for _ in 0..(-exp - 1) {
            out.push('0');
        }
        out.push_str(trim_zeros(&digits));
    }
    out
}

/// Decode and render an on-tape number.
#[must_use]
pub fn format_number(b: &[u8; 4]) -> String {
    tsb_number_string(decode_number(b))
}

fn take_number(prog: &mut ProgBuffer, stmt: &mut Stmt) -> Result<[u8; 4], FormatError> {
    let b = stmt.take(prog, 4);
    if b.len() < 4 {
        return Err(FormatError::TruncatedNumber);
    }
    Ok([b[0], b[1], b[2], b[3]])
}

fn var_letter(name: u8) -> char {
    (b'@' + name) as char
}

/// Render a variable operand (`kind == 0`, not a string literal).
pub fn print_var_operand(sink: &mut Sink<'_>, token: Token) -> std::io::Result<()> {
    let name = token.name();
    let typ = token.typ();

    // string variable with digit 0 or 1
    if name > 0o32 {
        let letter = (b'A' + (token.0.wrapping_sub(0xb0) & 0x1f) as u8) as char;
        return sink.write_str(&format!("{letter}{}$", u8::from(name > 0o34)));
    }

    match typ {
        0 => {
            if name != 0 {
                sink.write_str(&format!("{}$", var_letter(name)))?;
            }
            Ok(())
        }
        1..=4 => sink.write_str(&var_letter(name).to_string()),
        0o17 => sink.write_str(&format!("FN{}", var_letter(name))),
        t => sink.write_str(&format!("{}{}", var_letter(name), t - 5)),
    }
}

/// Render a string literal body.
fn print_str_operand(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    token: Token,
    dialect: Dialect,
) -> Result<(), Error> {
    let len = token.str_len();
    if len == 0 {
        sink.write_str("\"\"")?;
        return Ok(());
    }

    // consume an even number of bytes
    let nread = (len + 1) & !1;
    let body = stmt.take(prog, nread);
    if body.len() < nread {
        return Err(FormatError::TruncatedString.into());
    }
    let body = body[..len].to_vec();

    match dialect {
        // Access: 'decimal notation for non-printable chars and quotes
        Dialect::Access => {
            let mut inquote = false;
            for c in body {
                if (32..127).contains(&c) && c != b'"' {
                    if !inquote {
                        sink.put_byte(b'"')?;
                    }
                    inquote = true;
                    sink.put_byte(c)?;
                } else {
                    if inquote {
                        sink.put_byte(b'"')?;
                    }
                    inquote = false;
                    sink.write_str(&format!("'{c}"))?;
                }
            }
            if inquote {
                sink.put_byte(b'"')?;
            }
        }
        // 2000F: ctrl-N stands for LF, ctrl-O for CR
        Dialect::Tsb2000F => {
            sink.put_byte(b'"')?;
            for c in body {
                sink.put_byte(match c {
                    b'\n' => 0o16,
                    b'\r' => 0o17,
                    0o16 => b'\n',
                    0o17 => b'\r',
                    c => c,
                })?;
            }
            sink.put_byte(b'"')?;
        }
    }
    Ok(())
}

/// Render a `kind == 1` operand: number, integer list, function or formal
/// parameter.
fn print_operand(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    token: Token,
    stmt_op: u8,
    dialect: Dialect,
) -> Result<(), Error> {
    match token.typ() {
        operand::NUMBER => {
            let b = take_number(prog, stmt)?;
            sink.write_str(&format_number(&b))?;
        }
        operand::INTEGER => {
            let Some(v) = stmt.next_word(prog) else {
                return Err(FormatError::TruncatedValue.into());
            };
            sink.write_str(&v.to_string())?;
            if matches!(stmt_op, stmt::COM | stmt::DIM) || token.op() == op::USING {
                return Ok(());
            }
            // GOTO/GOSUB OF: values run to the end of the statement
            while let Some(v) = stmt.next_word(prog) {
                sink.write_str(&format!(",{v}"))?;
            }
        }
        1 | 2 => return Err(FormatError::UnknownOperandType.into()),
        operand::PARAM => sink.write_str(&var_letter(token.name()).to_string())?,
        operand::FUNCTION => sink.write_str(dialect.function_name(token.name()))?,
        t => sink.write_str(&format!("{}{}", var_letter(token.name()), t - 5))?,
    }
    Ok(())
}

fn copy_raw_body(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
) -> Result<(), Error> {
    let mut body = Vec::with_capacity(stmt.remaining());
    loop {
        let chunk = stmt.take(prog, 256);
        if chunk.is_empty() {
            break;
        }
        body.extend_from_slice(chunk);
    }
    // odd-length bodies carry one NUL pad byte
    if body.last() == Some(&0) {
        body.pop();
    }
    sink.write_bytes(&body)?;
    Ok(())
}

/// Pretty-print one statement body (everything after the line number) as
/// BASIC source. The caller prints the line number and newline.
pub fn print_stmt(
    sink: &mut Sink<'_>,
    prog: &mut ProgBuffer,
    stmt: &mut Stmt,
    dialect: Dialect,
) -> Result<(), Error> {
    let mut first = true;
    let mut stmt_op = 0u8;

    while let Some(word) = stmt.next_word(prog) {
        let token = Token(word);
        let opcode = token.op();
        let names = if first {
            dialect.statement_names()
        } else {
            dialect.operator_names()
        };
        let name = names[opcode as usize];
        let sep = if name.len() > 1 { " " } else { "" };

        if !first {
            sink.write_str(sep)?;
        }
        sink.write_str(name)?;

        if first {
            stmt_op = opcode;
            if stmt::is_raw_body(opcode) {
                if opcode == stmt::FILES {
                    sink.put_byte(b' ')?;
                }
                if opcode != stmt::IMAGE && word & 0xff != 0 {
                    sink.put_byte((word & 0xff) as u8)?;
                }
                return copy_raw_body(sink, prog, stmt);
            }
        }
        sink.write_str(sep)?;

        if token.is_operand() {
            print_operand(sink, prog, stmt, token, stmt_op, dialect)?;
        } else if opcode == op::QUOTE {
            print_str_operand(sink, prog, stmt, token, dialect)?;
        } else {
            print_var_operand(sink, token)?;
        }
        first = false;
    }
    Ok(())
}

/// Resolve a CSAVEd program in place: destination addresses become line
/// numbers, variable indices become name bits from the symbol table. The
/// logical size is clamped to the program text and the cursor rewound.
pub fn relocate_csave(
    prog: &mut ProgBuffer,
    dent: &DirEntry,
    dialect: Dialect,
) -> Result<(), FormatError> {
    let len = dent.length_bytes();
    let start = i32::from(dent.start_addr());
    let symoff = dialect.symptr_offset() as i32;
    if len <= symoff {
        return Err(FormatError::SymtabNotFound);
    }
    let symptr = match prog.peek_at((len - symoff) as usize, 2) {
        Ok(b) if b.len() == 2 => i32::from(be16(b)),
        _ => return Err(FormatError::SymtabNotFound),
    };
    let symtab = (symptr - start) * 2;
    if symtab <= 0 || symtab as usize > prog.total_read() {
        return Err(FormatError::SymtabInvalid);
    }
    let symtab = symtab as usize;
    prog.set_logical_size(symtab);
    prog.set_cursor(0);

    while let Some(mut stmt) = Stmt::next(prog) {
        let mut first = true;
        let mut stmt_op = 0u8;
        loop {
            let tok_off = prog.cursor();
            let Some(word) = stmt.next_word(prog) else {
                break;
            };
            let token = Token(word);
            if first {
                stmt_op = token.op();
                first = false;
                if stmt::is_raw_body(stmt_op) {
                    while !stmt.take(prog, 256).is_empty() {}
                    break;
                }
            }
            if token.is_operand() {
                match token.typ() {
                    operand::NUMBER => {
                        let _ = stmt.take(prog, 4);
                    }
                    operand::INTEGER => {
                        let is_dim = matches!(stmt_op, stmt::COM | stmt::DIM);
                        loop {
                            let val_off = prog.cursor();
                            let Some(addr) = stmt.next_word(prog) else {
                                break;
                            };
                            if !is_dim {
                                let dest = (i32::from(addr) - start) * 2;
                                let line = match usize::try_from(dest)
                                    .ok()
                                    .and_then(|d| prog.peek_at(d, 2).ok())
                                {
                                    Some(b) if b.len() == 2 => be16(b),
                                    _ => return Err(FormatError::CorruptedDestination),
                                };
                                prog.patch(val_off, &line.to_be_bytes())?;
                            }
                            if is_dim || token.op() == op::USING {
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            } else if token.op() == op::QUOTE {
                let _ = stmt.take(prog, (token.str_len() + 1) & !1);
            } else {
                let idx = token.var_index();
                if idx != 0 {
                    let soff = symtab + 4 * (idx as usize - 1);
                    let bits = match prog.peek_at(soff, 2) {
                        Ok(b) if b.len() == 2 => be16(b),
                        _ => return Err(FormatError::CorruptedSymbolTable),
                    };
                    prog.patch(tok_off, &token.with_var_index(bits).be_bytes())?;
                }
            }
        }
    }

    prog.set_cursor(0);
    Ok(())
}

/// Read a tokenized program off tape and write it out as BASIC source.
pub fn extract_program<R: Read>(
    tfile: &mut TfileReader<'_, R>,
    dent: &DirEntry,
    dialect: Dialect,
    cfg: &Config,
    out: &mut dyn Write,
) -> Result<(), Error> {
    let mut prog = ProgBuffer::read_from(tfile)?;
    if dent.is_csave() {
        relocate_csave(&mut prog, dent, dialect)?;
    } else {
        let len = dent.length_bytes();
        if len <= 0 || !prog.set_logical_size(len as usize) {
            eprintln!("invalid size in directory entry");
        }
    }

    let mut sink = Sink::stream(out);
    let mut prev_line = 0u16;
    while let Some(mut stmt) = Stmt::next(&mut prog) {
        let line = stmt.line_no();
        if line > 9999 || line <= prev_line {
            if !cfg.ignore_errors {
                return Err(FormatError::LinesOutOfOrder.into());
            }
            eprintln!("warning: line {line} out of order");
        }
        prev_line = line;
        sink.write_str(&format!("{line} "))?;
        print_stmt(&mut sink, &mut prog, &mut stmt, dialect)?;
        sink.put_byte(b'\n')?;
    }
    Ok(())
}

/// Dump a program's raw token words with their decoded interpretations.
pub fn dump_program<R: Read>(
    tfile: &mut TfileReader<'_, R>,
    dent: &DirEntry,
    dialect: Dialect,
    out: &mut dyn Write,
) -> Result<(), Error> {
    writeln!(
        out,
        "\n{}/{}  len=0x{:04x} start=0x{:04x} disk=0x{:04x}{:04x}",
        dent.user_id(),
        dent.name(),
        dent.length_words(),
        dent.start_addr(),
        be16(&dent.raw()[16..]),
        be16(&dent.raw()[18..]),
    )?;

    let mut prog = ProgBuffer::read_from(tfile)?;

    // display tables: blank the ?NN slots, name the structural codes
    let mut stmts: Vec<&str> = dialect
        .statement_names()
        .iter()
        .map(|n| if n.starts_with('?') { "" } else { *n })
        .collect();
    let mut ops: Vec<&str> = dialect
        .operator_names()
        .iter()
        .map(|n| if n.starts_with('?') { "" } else { *n })
        .collect();
    ops[op::END_FORMULA as usize] = "(end)";
    ops[op::QUOTE as usize] = "\"";
    ops[op::FILE_NUM as usize] = "#(file)";
    stmts[0o73] = "(LET)";
    if dialect == Dialect::Tsb2000F {
        ops[0o73] = "(LET)";
    }

    let mut nused = 0i32;
    let mut nleft = 0i32;
    let mut off = 0usize;
    loop {
        let b = prog.take(2);
        if b.len() < 2 {
            break;
        }
        let val = be16(b);
        let token = Token(val);

        // start or end of statement?
        let mut pfx = " ";
        match nleft {
            1 => pfx = "}",
            0 => {
                pfx = "{";
                nused = 0;
            }
            -1 => nleft = i32::from(val) - 1,
            _ => {}
        }
        nleft -= 1;
        write!(out, "{pfx} ")?;

        // offset, one per row of eight words
        if off & 0x7 != 0 {
            write!(out, "     ")?;
        } else {
            write!(out, "{off:5x}")?;
        }

        // contents as hex and decimal, line numbers underlined
        let (upfx, usfx) = if nused == 0 {
            ("\x1b[4m", "\x1b[0m")
        } else {
            ("", "")
        };
        write!(out, "  {val:04x} ({upfx}{val:5}{usfx})  ")?;

        // contents as ASCII
        for &c in b {
            let c = if !(32..127).contains(&c) { b'.' } else { c };
            write!(out, "{}", c as char)?;
        }

        // contents as token fields
        write!(
            out,
            "  {}-{:2o}-{:2o}-{:2o}  ",
            u8::from(token.is_operand()),
            token.op(),
            token.name(),
            token.typ()
        )?;

        // contents as operator name(s), statement name underlined
        let (spfx, ssfx) = if nused == 2 {
            ("\x1b[4m", "\x1b[0m")
        } else {
            ("", "")
        };
        let opi = token.op() as usize;
        match dialect {
            Dialect::Access => write!(out, "{spfx}{:<7}{ssfx}|{:<7}", stmts[opi], ops[opi])?,
            Dialect::Tsb2000F => write!(out, "{spfx}{:<7}{ssfx}", ops[opi])?,
        }

        // contents as operand
        write!(out, "  ")?;
        let mut sink = Sink::stream(&mut *out);
        if token.is_operand() {
            match token.typ() {
                operand::NUMBER => sink.write_str("(num)")?,
                operand::INTEGER => sink.write_str("(int)")?,
                operand::FUNCTION => sink.write_str(dialect.function_name(token.name()))?,
                _ if token.name() == 0 => sink.write_str("(par)")?,
                operand::PARAM => sink.write_str(&var_letter(token.name()).to_string())?,
                1 | 2 => sink.write_str("(?)")?,
                t => sink.write_str(&format!("{}{}", var_letter(token.name()), t - 5))?,
            }
        } else if token.op() == op::QUOTE {
            sink.write_str("(str)")?;
        } else if token.name() != 0 {
            print_var_operand(&mut sink, token)?;
        } else if token.typ() != 0 {
            sink.write_str("(var)")?;
        } else {
            sink.write_str("     ")?;
        }

        // contents read as an FP number
        if prog.remaining() >= 2 {
            if let Ok(four) = prog.peek_at(off * 2, 4) {
                if four.len() == 4 {
                    let n = format_number(&[four[0], four[1], four[2], four[3]]);
                    write!(out, "\t{n}")?;
                }
            }
        }

        writeln!(out)?;
        nused += 1;
        off += 1;
    }
    Ok(())
}
