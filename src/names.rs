//! Collection of server names from a domain list and the command line.
//!
//! A domain list holds one name per line. Blank lines and lines starting
//! with `#` are skipped, and only the first whitespace-delimited token of a
//! line is used, so trailing notes are allowed:
//!
//! ```text
//! # production
//! example.com      main site
//! api.example.com
//! ```

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Failure to acquire the list of names. Fatal for a run.
#[derive(Debug)]
pub enum InputError {
    /// The domain list could not be opened
    Open { path: PathBuf, source: io::Error },
    /// The domain list could not be read to the end
    Read { path: PathBuf, source: io::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::Open { path, source } => {
                write!(f, "open {}: {}", path.display(), source)
            }
            InputError::Read { path, source } => {
                write!(f, "read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InputError::Open { source, .. } | InputError::Read { source, .. } => Some(source),
        }
    }
}

/// Parses a domain list.
pub fn parse<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.split_whitespace().next() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Reads a domain list from `path`.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, InputError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| InputError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse(BufReader::new(file)).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Names from the optional domain list first, then the direct arguments.
/// Duplicates are kept.
pub fn gather(file: Option<&Path>, args: &[String]) -> Result<Vec<String>, InputError> {
    let mut names = match file {
        Some(path) => from_file(path)?,
        None => Vec::new(),
    };
    names.extend(args.iter().cloned());
    Ok(names)
}

/// Width of the server column: the longest name, in characters.
pub fn column_width<S: AsRef<str>>(names: &[S]) -> usize {
    names
        .iter()
        .map(|name| name.as_ref().chars().count())
        .max()
        .unwrap_or(0)
}
