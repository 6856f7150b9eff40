//! Command-line front end for the TSB tape toolkit.

use std::fs::File;
use std::io::{BufReader, BufWriter, stdout};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use tsbtap::catalog::{catalog, raw_dump};
use tsbtap::convert::convert_tape;
use tsbtap::extract::{FileOp, scan_files};
use tsbtap::{Config, Dialect, TapeReader, TapeWriter};

#[derive(Parser)]
#[command(
    name = "tsbtap",
    about = "Read and convert HP 2000 TSB dump tapes in SIMH format"
)]
struct Cli {
    /// Tape image in SIMH format (required)
    #[arg(short = 'f', value_name = "PATH")]
    file: PathBuf,

    /// Show raw tape block structure
    #[arg(short = 'r')]
    raw: bool,

    /// Catalog the tape
    #[arg(short = 't')]
    catalog: bool,

    /// Dump token structure of matched BASIC programs
    #[arg(short = 'd')]
    dump: bool,

    /// Extract matched files from the tape
    #[arg(short = 'x')]
    extract: bool,

    /// With OUT: convert a 2000F tape to Access. Without: force the
    /// Access dialect for reading an unlabeled tape
    #[arg(short = 'a', value_name = "OUT", num_args = 0..=1)]
    access: Option<Option<PathBuf>>,

    /// Convert an Access tape to 2000F, writing OUT
    #[arg(short = 'c', value_name = "OUT")]
    to_2000f: Option<PathBuf>,

    /// Ignore certain errors (unconvertible statements become REMs)
    #[arg(short = 'e')]
    ignore_errors: bool,

    /// Extract to stdout instead of files
    #[arg(short = 'O')]
    to_stdout: bool,

    /// Verbose output; repeat for more
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Debug output
    #[arg(short = 'D')]
    debug: bool,

    /// File names or patterns for -d / -x (`name` or `uid/name`, with
    /// *, ? and [...] wildcards)
    #[arg(value_name = "FILES")]
    files: Vec<String>,
}

fn usage(msg: &str) -> ExitCode {
    eprintln!("tsbtap: {msg}");
    eprintln!("Usage: tsbtap [-aeOvD] -f path.tap [-r | -t | -d files... | -x files... | -a out.tap | -c out.tap]");
    ExitCode::from(1)
}

fn run() -> Result<i32, (String, i32)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => return Err((e.to_string(), 1)),
        Err(e) => {
            // --help / --version
            print!("{e}");
            return Ok(0);
        }
    };

    let convert_to_access = matches!(cli.access, Some(Some(_)));
    let force_access = matches!(cli.access, Some(None));

    let mut cfg = Config {
        dialect: force_access.then_some(Dialect::Access),
        verbose: cli.verbose,
        ignore_errors: cli.ignore_errors,
        debug: cli.debug,
        to_stdout: cli.to_stdout,
    };

    let n_ops = [
        cli.raw,
        cli.catalog,
        cli.dump,
        cli.extract,
        convert_to_access,
        cli.to_2000f.is_some(),
    ]
    .iter()
    .filter(|&&b| b)
    .count();
    if n_ops != 1 {
        return Err((
            "must specify exactly one of -r, -t, -d, -x, -a out.tap, -c out.tap".into(),
            1,
        ));
    }
    if (cli.dump || cli.extract) && cli.files.is_empty() {
        return Err(("no files specified".into(), 1));
    }
    if !(cli.dump || cli.extract) && !cli.files.is_empty() {
        return Err(("file arguments not allowed with this operation".into(), 1));
    }

    let input = File::open(&cli.file)
        .map_err(|e| (format!("{}: {e}", cli.file.display()), 1))?;
    let mut tap = TapeReader::new(BufReader::new(input));

    let open_out = |path: &PathBuf| -> Result<TapeWriter<BufWriter<File>>, (String, i32)> {
        let f = File::create(path).map_err(|e| (format!("{}: {e}", path.display()), 1))?;
        Ok(TapeWriter::new(BufWriter::new(f)))
    };

    let result = if cli.raw {
        raw_dump(&mut tap, &cfg, &mut stdout()).map(|()| 0)
    } else if cli.catalog {
        catalog(&mut tap, &mut cfg, &mut stdout()).map(|()| 0)
    } else if cli.dump {
        scan_files(&mut tap, &cli.files, FileOp::Dump, &mut cfg)
    } else if cli.extract {
        scan_files(&mut tap, &cli.files, FileOp::Extract, &mut cfg)
    } else if let Some(Some(out_path)) = &cli.access {
        let mut out = open_out(out_path)?;
        convert_tape(&mut tap, &mut out, Dialect::Access, &cfg).map(|()| 0)
    } else if let Some(out_path) = &cli.to_2000f {
        let mut out = open_out(out_path)?;
        convert_tape(&mut tap, &mut out, Dialect::Tsb2000F, &cfg).map(|()| 0)
    } else {
        return Err(("no operation selected".into(), 1));
    };

    result.map_err(|e| (e.to_string(), e.exit_code()))
}

fn main() -> ExitCode {
    match run() {
        Ok(ec) => ExitCode::from(ec as u8),
        Err((msg, 1)) => usage(&msg),
        Err((msg, ec)) => {
            eprintln!("tsbtap: {msg}");
            ExitCode::from(ec as u8)
        }
    }
}
