//! # Distribution Filename Parsing
//!
//! Uploaded artifacts carry their metadata in the filename, following the
//! `name-version[-extra].ext` convention of Python distributions:
//!
//! ```text
//! requests-2.25.1.tar.gz          -> requests / 2.25.1
//! foo-1.0-py3.7.whl               -> foo / 1.0 / python 3.7
//! some_package-1.0.0-py3-none-any.whl -> some-package / 1.0.0 / python 3
//! ```
//!
//! The split is heuristic rather than a grammar. Names that contain
//! version-looking segments can mis-split; the behavior deliberately mirrors
//! the long-standing index behavior instead of guessing better.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::ParseError;
use crate::normalize::normalize;

/// Extensions of built distributions. Checked before source archives.
pub const BINARY_EXTENSIONS: &[&str] = &[".egg", ".exe", ".whl"];

/// Extensions of source archives.
pub const SOURCE_EXTENSIONS: &[&str] = &[".tar.gz", ".tar.bz2", ".tar", ".zip", ".tgz", ".tbz"];

/// Metadata recovered from a distribution filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    /// Canonical package name.
    pub name: String,
    pub version: String,
    /// Interpreter tag such as `3.7`; empty when the filename has none.
    pub python_tag: String,
}

fn python_tag_regex() -> &'static Regex {
    static PYTHON_TAG: OnceLock<Regex> = OnceLock::new();
    PYTHON_TAG.get_or_init(|| {
        Regex::new(r"-py(\d\.?\d?)").unwrap_or_else(|e| {
            panic!("Failed to compile python tag regex `-py(\\d\\.?\\d?)`: {e}")
        })
    })
}

fn name_version_regex() -> &'static Regex {
    static NAME_VERSION: OnceLock<Regex> = OnceLock::new();
    NAME_VERSION.get_or_init(|| {
        Regex::new(r"(?i)([a-z0-9_]+(?:[.-][a-z_][a-z0-9_]*)*)-([a-z0-9_.+-]+)").unwrap_or_else(
            |e| panic!("Failed to compile package name/version regex: {e}"),
        )
    })
}

/// Returns the first known distribution extension `file_name` ends with.
///
/// Binary extensions win over source extensions.
pub fn matching_extension(file_name: &str) -> Option<&'static str> {
    BINARY_EXTENSIONS
        .iter()
        .chain(SOURCE_EXTENSIONS)
        .copied()
        .find(|ext| file_name.ends_with(ext))
}

/// Extract name, version and interpreter tag from a distribution filename.
///
/// # Errors
///
/// - [`ParseError::UnrecognizedExtension`] when no known extension matches
/// - [`ParseError::MissingVersion`] when the stem has no `name-version` split
///
/// # Examples
///
/// ```
/// # use pail_catalog::parse_filename;
/// let parsed = parse_filename("foo-1.0-py3.7.whl").unwrap();
/// assert_eq!(parsed.name, "foo");
/// assert_eq!(parsed.version, "1.0");
/// assert_eq!(parsed.python_tag, "3.7");
///
/// assert!(parse_filename("notes.pdf").is_err());
/// ```
pub fn parse_filename(file_name: &str) -> Result<ParsedFilename, ParseError> {
    let ext = matching_extension(file_name).ok_or_else(|| ParseError::UnrecognizedExtension {
        file_name: file_name.to_string(),
    })?;

    let stem = file_name[..file_name.len() - ext.len()].replace(' ', "-");

    let (stem, python_tag) = match python_tag_regex().captures(&stem) {
        Some(caps) => {
            let tag = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let start = caps.get(0).map_or(stem.len(), |m| m.start());
            (&stem[..start], tag)
        }
        None => (stem.as_str(), String::new()),
    };

    let caps = name_version_regex()
        .captures(stem)
        .ok_or_else(|| ParseError::MissingVersion {
            file_name: file_name.to_string(),
        })?;

    match (caps.get(1), caps.get(2)) {
        (Some(name), Some(version)) => Ok(ParsedFilename {
            name: normalize(name.as_str()),
            version: version.as_str().to_string(),
            python_tag,
        }),
        _ => Err(ParseError::MissingVersion {
            file_name: file_name.to_string(),
        }),
    }
}
