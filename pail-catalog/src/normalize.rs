//! Canonical package names.

use regex::Regex;
use std::sync::OnceLock;

/// Normalize a package name to its canonical form.
///
/// Lower-cases the input and collapses every run of `-`, `_` and `.` into a
/// single `-`, so `Django-REST-framework`, `django_rest_framework` and
/// `django.rest.framework` all share one catalog key.
///
/// # Examples
///
/// ```
/// # use pail_catalog::normalize;
/// assert_eq!(normalize("My_Package..Name"), "my-package-name");
/// assert_eq!(normalize("some_package"), "some-package");
/// assert_eq!(normalize(""), "");
/// ```
pub fn normalize(name: &str) -> String {
    static SEPARATOR_RUNS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATOR_RUNS.get_or_init(|| {
        Regex::new(r"[-_.]+").unwrap_or_else(|e| {
            panic!("Failed to compile package name normalization regex `[-_.]+`: {e}")
        })
    });
    re.replace_all(&name.to_lowercase(), "-").into_owned()
}
