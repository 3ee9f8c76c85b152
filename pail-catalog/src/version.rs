//! # Version Resolution
//!
//! Picks the "latest" of a package's version strings by semantic-version
//! precedence while always handing back the caller's original text.
//!
//! Package indexes accept whatever version strings uploaders declare, so parsing
//! is lenient: a leading `v` is ignored and short numeric cores are padded
//! (`1.0` is read as `1.0.0`). Strings that still do not parse are skipped with
//! a warning rather than failing the whole resolution.

use semver::Version;
use std::cmp::Ordering;
use tracing::warn;

use crate::error::ResolveError;

/// Parse a version string as a semantic version, padding short numeric cores.
///
/// # Examples
///
/// ```
/// # use pail_catalog::version::parse_version;
/// assert_eq!(parse_version("1.0").unwrap().to_string(), "1.0.0");
/// assert_eq!(parse_version("v2.1.3-rc.1").unwrap().to_string(), "2.1.3-rc.1");
/// assert!(parse_version("not-a-semver").is_none());
/// ```
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let core_end = trimmed.find(&['-', '+'][..]).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(core_end);
    let parts: Vec<&str> = core.split('.').collect();
    let numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !numeric || parts.len() > 2 {
        return None;
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(rest);
    Version::parse(&padded).ok()
}

/// Precedence order: build metadata never decides.
fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Resolve the latest version, reporting when no candidate parsed.
///
/// - no input: `Ok(None)`
/// - a single input: returned unchanged, never validated
/// - several inputs: the highest by precedence; the first one wins a tie
///
/// # Errors
///
/// [`ResolveError::AllVersionsUnparsable`] when several inputs were given and
/// none of them is a semantic version.
pub fn try_latest<S: AsRef<str>>(versions: &[S]) -> Result<Option<&str>, ResolveError> {
    match versions {
        [] => return Ok(None),
        [only] => return Ok(Some(only.as_ref())),
        _ => {}
    }

    let mut best: Option<(Version, &str)> = None;
    for raw in versions {
        let raw = raw.as_ref();
        let Some(parsed) = parse_version(raw) else {
            warn!(version = %raw, "Skipping version that is not a semantic version");
            continue;
        };
        let replace = match &best {
            Some((current, _)) => cmp_precedence(&parsed, current) == Ordering::Greater,
            None => true,
        };
        if replace {
            best = Some((parsed, raw));
        }
    }

    match best {
        Some((_, raw)) => Ok(Some(raw)),
        None => Err(ResolveError::AllVersionsUnparsable {
            count: versions.len(),
        }),
    }
}

/// Latest version, or `None` when there is nothing parsable to choose from.
///
/// # Examples
///
/// ```
/// # use pail_catalog::latest;
/// assert_eq!(latest(&["1.0.0", "2.0.0", "1.5.0"]), Some("2.0.0"));
/// assert_eq!(latest(&["not-a-semver"]), Some("not-a-semver"));
/// assert_eq!(latest(&["not-a-semver", "also-bad"]), None);
/// ```
pub fn latest<S: AsRef<str>>(versions: &[S]) -> Option<&str> {
    try_latest(versions).unwrap_or_default()
}

/// Order version strings newest first.
///
/// Parsable versions come first by descending precedence; unparsable ones
/// follow in their original order.
pub fn sort_descending<S: AsRef<str>>(versions: &[S]) -> Vec<&str> {
    let mut parsed: Vec<(Version, &str)> = Vec::new();
    let mut unparsed: Vec<&str> = Vec::new();
    for raw in versions {
        let raw = raw.as_ref();
        match parse_version(raw) {
            Some(v) => parsed.push((v, raw)),
            None => unparsed.push(raw),
        }
    }
    parsed.sort_by(|(a, _), (b, _)| cmp_precedence(b, a));
    parsed
        .into_iter()
        .map(|(_, raw)| raw)
        .chain(unparsed)
        .collect()
}
