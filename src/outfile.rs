//! Host-side collaborators: output file naming, wildcard matching and
//! modification-time stamping.

use std::fs::{self, File, FileTimes, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDate, TimeZone};

/// Match `pattern` (either `name` or `uid/name`) against a file.
///
/// Returns the pattern tail on a case-free exact match, the on-tape name on
/// a wildcard match, `None` otherwise.
pub fn name_match<'n>(pattern: &'n str, id: &str, name: &'n str) -> Option<&'n str> {
    let pat = match pattern.split_once('/') {
        Some((pid, rest)) => {
            if id.len() < pid.len() || !id[..pid.len()].eq_ignore_ascii_case(pid) {
                return None;
            }
            rest
        }
        None => pattern,
    };

    if pat.eq_ignore_ascii_case(name) {
        return Some(pat);
    }
    if glob_match(pat.as_bytes(), name.as_bytes()) {
        return Some(name);
    }
    None
}

fn eq_nocase(a: u8, b: u8) -> bool {
    a.eq_ignore_ascii_case(&b)
}

/// Case-insensitive glob: `*`, `?` and `[...]` classes with ranges and
/// leading `!`/`^` negation.
fn glob_match(pat: &[u8], name: &[u8]) -> bool {
    match pat.split_first() {
        None => name.is_empty(),
        Some((&b'*', rest)) => {
            (0..=name.len()).any(|k| glob_match(rest, &name[k..]))
        }
        Some((&b'?', rest)) => !name.is_empty() && glob_match(rest, &name[1..]),
        Some((&b'[', rest)) => {
            let Some((&c, ntail)) = name.split_first() else {
                return false;
            };
            let (negate, rest) = match rest.split_first() {
                Some((&(b'!' | b'^'), r)) => (true, r),
                _ => (false, rest),
            };
            let Some(close) = rest.iter().position(|&b| b == b']') else {
                return false;
            };
            let (class, ptail) = (&rest[..close], &rest[close + 1..]);
            let mut hit = false;
            let mut i = 0;
            while i < class.len() {
                if i + 2 < class.len() && class[i + 1] == b'-' {
                    let (lo, hi) = (class[i].to_ascii_lowercase(), class[i + 2].to_ascii_lowercase());
                    if (lo..=hi).contains(&c.to_ascii_lowercase()) {
                        hit = true;
                    }
                    i += 3;
                } else {
                    if eq_nocase(class[i], c) {
                        hit = true;
                    }
                    i += 1;
                }
            }
            hit != negate && glob_match(ptail, ntail)
        }
        Some((&p, rest)) => {
            !name.is_empty() && eq_nocase(p, name[0]) && glob_match(rest, &name[1..])
        }
    }
}

/// Open the output file for an extraction, creating the per-user
/// subdirectory and de-duplicating as `NAME.N.ext` up to 100 tries.
///
/// Returns the writer plus the path actually created (`None` for stdout).
pub fn open_output(
    name: &str,
    sfx: &str,
    to_stdout: bool,
) -> io::Result<(Box<dyn Write>, Option<PathBuf>)> {
    if to_stdout {
        return Ok((Box::new(io::stdout()), None));
    }

    if let Some((dir, _)) = name.split_once('/') {
        if let Err(e) = fs::create_dir(dir) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                return Err(e);
            }
        }
    }

    let mut path = format!("{name}.{sfx}");
    for i in 1..=100 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => {
                println!("Extracting to {path}");
                return Ok((Box::new(f), Some(PathBuf::from(path))));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                path = format!("{name}.{i}.{sfx}");
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{name}.{sfx}: too many duplicates"),
    ))
}

/// Stamp the extracted file with the directory entry's access date;
/// access time becomes "now" like any fresh copy.
pub fn set_mtime(path: &Path, date: NaiveDate) -> io::Result<()> {
    let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
        return Ok(());
    };
    let Some(local) = Local.from_local_datetime(&midnight).earliest() else {
        return Ok(());
    };
    let mtime: SystemTime = local.into();
    let f = File::options().write(true).open(path)?;
    f.set_times(
        FileTimes::new()
            .set_accessed(SystemTime::now())
            .set_modified(mtime),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_case_insensitive() {
        assert_eq!(name_match("hello", "B001", "HELLO"), Some("hello"));
        assert_eq!(name_match("b001/hello", "B001", "HELLO"), Some("hello"));
        assert_eq!(name_match("c001/hello", "B001", "HELLO"), None);
        assert_eq!(name_match("WORLD", "B001", "HELLO"), None);
    }

    #[test]
    fn wildcards() {
        assert_eq!(name_match("he*", "B001", "HELLO"), Some("HELLO"));
        assert_eq!(name_match("h?llo", "B001", "HELLO"), Some("HELLO"));
        assert_eq!(name_match("*", "B001", "HELLO"), Some("HELLO"));
        assert_eq!(name_match("h*x", "B001", "HELLO"), None);
    }

    #[test]
    fn classes() {
        assert!(glob_match(b"[a-f]1", b"B1"));
        assert!(!glob_match(b"[a-f]1", b"G1"));
        assert!(glob_match(b"[!xyz]A", b"BA"));
        assert!(!glob_match(b"[!xyz]A", b"XA"));
    }
}
