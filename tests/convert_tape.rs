//! Whole-tape conversion between the two TSB generations.

mod common;

use common::{TapeBuilder, UID, dirent, read_first_file, read_first_program, set_length_words, stmt, tok};
use tsbtap::convert::convert_tape;
use tsbtap::dialect::tables::{Dialect, FEATLVL_2000F, SYSLVL_2000F};
use tsbtap::error::{ConvertError, Error};
use tsbtap::{Block, Config, TapeReader, TapeWriter};

fn convert(image: &[u8], to: Dialect, cfg: &Config) -> Result<Vec<u8>, Error> {
    let mut tap = TapeReader::new(image);
    let mut out = TapeWriter::new(Vec::new());
    convert_tape(&mut tap, &mut out, to, cfg)?;
    Ok(out.into_inner())
}

/// `10 PRINT "HI"` as an Access program body.
fn print_hi_body() -> Vec<u8> {
    let mut s = tok(0, 0o65, 0, 0).to_be_bytes().to_vec();
    s.extend_from_slice(&(tok(0, 0o01, 0, 0) | 2).to_be_bytes());
    s.extend_from_slice(b"HI");
    stmt(10, &s)
}

#[test]
fn print_hi_round_trips() {
    let body = print_hi_body();
    let mut d = dirent(UID, "HELLO");
    set_length_words(&mut d, (body.len() / 2) as i16);

    let mut b = TapeBuilder::new();
    b.label(Dialect::Access);
    b.file(&d, &body, Dialect::Access);
    let image_a = b.finish();

    let cfg = Config::default();
    let image_f = convert(&image_a, Dialect::Tsb2000F, &cfg).unwrap();

    // label rewritten for 2000F
    let mut tap = TapeReader::new(image_f.as_slice());
    let Ok(Block::Data(label)) = tap.read_block() else {
        panic!("expected label block");
    };
    assert_eq!(&label[..2], &[0xff, 0xf7]);
    assert_eq!(&label[2..6], b"LBTS");
    assert_eq!(label[16..18], SYSLVL_2000F.to_be_bytes());
    assert_eq!(label[18..20], FEATLVL_2000F.to_be_bytes());

    assert_eq!(
        read_first_program(&image_f, Dialect::Tsb2000F),
        "10 PRINT \"HI\"\n"
    );

    // and back again
    let image_a2 = convert(&image_f, Dialect::Access, &cfg).unwrap();
    assert_eq!(
        read_first_program(&image_a2, Dialect::Access),
        "10 PRINT \"HI\"\n"
    );
}

#[test]
fn refuses_wrong_direction() {
    let mut b = TapeBuilder::new();
    b.label(Dialect::Access);
    let image = b.finish();

    let cfg = Config::default();
    let err = convert(&image, Dialect::Access, &cfg).unwrap_err();
    assert!(matches!(err, Error::Convert(ConvertError::AlreadyAccess)));
}

#[test]
fn unsupported_function_becomes_rem() {
    // 10 PRINT CHR$(65)
    let mut s = tok(1, 0o65, 0o27, 0o17).to_be_bytes().to_vec();
    s.extend_from_slice(&tok(1, 0o13, 0, 0).to_be_bytes());
    s.extend_from_slice(&[0x41, 0x00, 0x00, 0x0e]); // 65.0
    s.extend_from_slice(&tok(0, 0o10, 0, 0).to_be_bytes());
    let body = stmt(10, &s);

    let mut d = dirent(UID, "CHRTST");
    set_length_words(&mut d, (body.len() / 2) as i16);

    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Access);
    let image_a = b.finish();

    // fatal per-file without -e: the file is skipped
    let cfg = Config {
        dialect: Some(Dialect::Access),
        ..Config::default()
    };
    let image_f = convert(&image_a, Dialect::Tsb2000F, &cfg).unwrap();
    let mut tap = TapeReader::new(image_f.as_slice());
    assert_eq!(tap.read_block().unwrap(), Block::EndOfMedium);

    // with -e the line is replayed as a REM carrying the source text
    let cfg = Config {
        dialect: Some(Dialect::Access),
        ignore_errors: true,
        ..Config::default()
    };
    let image_f = convert(&image_a, Dialect::Tsb2000F, &cfg).unwrap();
    assert_eq!(
        read_first_program(&image_f, Dialect::Tsb2000F),
        "10 REM !fPRINT CHR$(65)\n"
    );
}

#[test]
fn len_of_string_variable_round_trips() {
    // 10 PRINT LEN(B$) on 2000F; Access needs an end-of-formula word
    let mut s = tok(1, 0o65, 0o15, 0o17).to_be_bytes().to_vec();
    s.extend_from_slice(&tok(0, 0o13, 2, 0).to_be_bytes());
    s.extend_from_slice(&tok(0, 0o10, 0, 0).to_be_bytes());
    let body = stmt(10, &s);

    let mut d = dirent(UID, "LENTST");
    set_length_words(&mut d, (body.len() / 2) as i16);

    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Tsb2000F);
    let image_f = b.finish();

    let cfg = Config::default();
    let image_a = convert(&image_f, Dialect::Access, &cfg).unwrap();
    assert_eq!(
        read_first_program(&image_a, Dialect::Access),
        "10 PRINT LEN(B$)\n"
    );
    // the inserted word grew the statement by 2 bytes
    let file = read_first_file(&image_a, Dialect::Access, 24 + 12);
    assert_eq!(&file[26..28], &[6u16.to_be_bytes()[0], 6u16.to_be_bytes()[1]]);

    let cfg = Config {
        dialect: Some(Dialect::Access),
        ..Config::default()
    };
    let image_f2 = convert(&image_a, Dialect::Tsb2000F, &cfg).unwrap();
    assert_eq!(
        read_first_program(&image_f2, Dialect::Tsb2000F),
        "10 PRINT LEN(B$)\n"
    );
}

#[test]
fn matrix_functions_shift_tables() {
    // 10 MAT READ ZER-ish: a bare ZER function reference is enough to see
    // the code move between tables.
    let mut s = tok(0, 0o67, 0, 0).to_be_bytes().to_vec(); // MAT
    s.extend_from_slice(&tok(1, 0o00, 0o24, 0o17).to_be_bytes()); // ZER (2000F)
    let body = stmt(10, &s);

    let mut d = dirent(UID, "MATZER");
    set_length_words(&mut d, (body.len() / 2) as i16);

    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Tsb2000F);
    let image_f = b.finish();

    let cfg = Config::default();
    let image_a = convert(&image_f, Dialect::Access, &cfg).unwrap();
    // Access file now holds function code 033
    let file = read_first_file(&image_a, Dialect::Access, 24 + 8);
    let word = u16::from_be_bytes([file[30], file[31]]);
    assert_eq!((word >> 4) & 0x1f, 0o33);
    assert_eq!(read_first_program(&image_a, Dialect::Access), "10 MAT ZER\n");
}

#[test]
fn statement_length_boundary() {
    let rem = tok(0, 0o51, 0, 0) | u16::from(b' ');

    // 204 bytes exactly: allowed on 2000F
    let mut s = rem.to_be_bytes().to_vec();
    s.extend_from_slice(&[b'A'; 198]);
    let body = stmt(10, &s);
    let mut d = dirent(UID, "LONG");
    set_length_words(&mut d, (body.len() / 2) as i16);
    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Access);
    let image = b.finish();

    let cfg = Config {
        dialect: Some(Dialect::Access),
        ignore_errors: true,
        ..Config::default()
    };
    let out = convert(&image, Dialect::Tsb2000F, &cfg).unwrap();
    let text = read_first_program(&out, Dialect::Tsb2000F);
    assert_eq!(text, format!("10 REM {}\n", "A".repeat(198)));

    // 206 bytes: replayed as REM !t
    let mut s = rem.to_be_bytes().to_vec();
    s.extend_from_slice(&[b'A'; 200]);
    let body = stmt(10, &s);
    let mut d = dirent(UID, "LONGER");
    set_length_words(&mut d, (body.len() / 2) as i16);
    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Access);
    let image = b.finish();

    let out = convert(&image, Dialect::Tsb2000F, &cfg).unwrap();
    let text = read_first_program(&out, Dialect::Tsb2000F);
    assert!(text.starts_with("10 REM !t"), "{text}");
}

#[test]
fn record_files_copy_and_flags_translate() {
    let mut d = dirent(UID, "DATA");
    d[4] |= 0x80; // BASIC-formatted
    d[8..10].copy_from_slice(&4u16.to_be_bytes());
    d[15] |= 0x02; // protected
    set_length_words(&mut d, 8);
    let body: Vec<u8> = (0u8..16).collect();

    let mut b = TapeBuilder::new();
    b.file(&d, &body, Dialect::Access);
    let image_a = b.finish();

    let cfg = Config {
        dialect: Some(Dialect::Access),
        ..Config::default()
    };
    let image_f = convert(&image_a, Dialect::Tsb2000F, &cfg).unwrap();

    let file = read_first_file(&image_f, Dialect::Tsb2000F, 24 + 16);
    // protected flag moved to the name byte, flags word cleared
    assert_eq!(file[2] & 0x80, 0x80);
    assert_eq!(&file[14..16], &[0, 0]);
    // record contents byte-identical
    assert_eq!(&file[24..40], body.as_slice());

    // and back: the name-byte flag becomes the Access protected bit
    let cfg = Config::default();
    let image_a2 = convert(&image_f, Dialect::Access, &cfg).unwrap();
    let file = read_first_file(&image_a2, Dialect::Access, 24 + 16);
    assert_eq!(file[2] & 0x80, 0);
    assert_eq!(file[15] & 0x02, 0x02);
    assert_eq!(&file[24..40], body.as_slice());
}
