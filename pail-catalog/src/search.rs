//! Name and summary search over a catalog snapshot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::catalog::{latest_record, Catalog};
use crate::record::PackageRecord;

/// A legacy search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Substrings matched against package names.
    #[serde(default)]
    pub name_terms: Vec<String>,
    /// Substrings matched against the summary of every version.
    #[serde(default)]
    pub summary_terms: Vec<String>,
    /// Accepted for compatibility; terms are always OR-ed.
    #[serde(default)]
    pub operator: String,
}

impl SearchQuery {
    pub fn by_name(term: impl Into<String>) -> Self {
        Self {
            name_terms: vec![term.into()],
            ..Self::default()
        }
    }

    pub fn by_summary(term: impl Into<String>) -> Self {
        Self {
            summary_terms: vec![term.into()],
            ..Self::default()
        }
    }
}

/// One package in a search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub summary: String,
    pub version: String,
    /// Always `false`; kept for clients that expect the field.
    #[serde(rename = "_pypi_ordering")]
    pub ordering: bool,
}

impl From<&PackageRecord> for SearchHit {
    fn from(record: &PackageRecord) -> Self {
        Self {
            name: record.name.clone(),
            summary: record.summary.clone(),
            version: record.version.clone(),
            ordering: false,
        }
    }
}

fn lowered_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Run a query against `catalog`, one hit per package, sorted by name.
///
/// Summary matches report the latest of the *matching* versions of a package.
/// A name match reports the latest of *all* its versions and replaces any
/// summary hit for the same package. Packages whose versions yield no latest
/// version are left out.
pub fn search(catalog: &Catalog, query: &SearchQuery) -> Vec<SearchHit> {
    let mut hits: BTreeMap<&str, SearchHit> = BTreeMap::new();

    let summary_terms = lowered_terms(&query.summary_terms);
    if !summary_terms.is_empty() {
        let mut matching: HashMap<&str, Vec<&PackageRecord>> = HashMap::new();
        for (name, records) in catalog.iter() {
            for record in records {
                let summary = record.summary.to_lowercase();
                if summary_terms.iter().any(|t| summary.contains(t.as_str())) {
                    matching.entry(name).or_default().push(record);
                }
            }
        }
        for (name, records) in matching {
            match latest_record(records.iter().copied()) {
                Some(record) => {
                    hits.insert(name, SearchHit::from(record));
                }
                None => debug!(package = %name, "No resolvable version among summary matches"),
            }
        }
    }

    let name_terms = lowered_terms(&query.name_terms);
    for (name, records) in catalog.iter() {
        if !name_terms.iter().any(|t| name.contains(t.as_str())) {
            continue;
        }
        match latest_record(records.iter()) {
            Some(record) => {
                hits.insert(name, SearchHit::from(record));
            }
            None => debug!(package = %name, "No resolvable version for name match"),
        }
    }

    hits.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, summary: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            file_name: format!("{name}-{version}.tar.gz"),
            version: version.to_string(),
            python_tag: String::new(),
            location: format!("{name}/{name}-{version}.tar.gz"),
            checksum: String::new(),
            summary: summary.to_string(),
        }
    }

    fn catalog(records: Vec<PackageRecord>) -> Catalog {
        let mut catalog = Catalog::new();
        for r in records {
            catalog.insert(r).expect("unique test records");
        }
        catalog
    }

    #[test]
    fn test_summary_and_name_matches_combine() {
        let catalog = catalog(vec![
            record("reqs", "1.0.0", "http client"),
            record("flask-http", "0.2.0", "web"),
        ]);

        let by_summary = search(&catalog, &SearchQuery::by_summary("http"));
        assert_eq!(by_summary.len(), 1);
        assert_eq!(by_summary[0].name, "reqs");

        let combined = search(
            &catalog,
            &SearchQuery {
                name_terms: vec!["http".to_string()],
                summary_terms: vec!["http".to_string()],
                operator: "or".to_string(),
            },
        );
        let found: Vec<_> = combined
            .iter()
            .map(|h| (h.name.as_str(), h.version.as_str()))
            .collect();
        assert_eq!(found, vec![("flask-http", "0.2.0"), ("reqs", "1.0.0")]);
        assert!(combined.iter().all(|h| !h.ordering));
    }

    #[test]
    fn test_summary_hits_use_latest_matching_version() {
        let catalog = catalog(vec![
            record("foo", "1.0.0", "HTTP tools"),
            record("foo", "1.5.0", "http tools, faster"),
            record("foo", "2.0.0", "async networking"),
        ]);
        let hits = search(&catalog, &SearchQuery::by_summary("Http"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, "1.5.0");
        assert_eq!(hits[0].summary, "http tools, faster");
    }

    #[test]
    fn test_name_match_overrides_summary_match() {
        let catalog = catalog(vec![
            record("foo", "1.0.0", "foo helpers"),
            record("foo", "2.0.0", "rewritten"),
        ]);
        let hits = search(
            &catalog,
            &SearchQuery {
                name_terms: vec!["FOO".to_string()],
                summary_terms: vec!["helpers".to_string()],
                operator: String::new(),
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, "2.0.0");
        assert_eq!(hits[0].summary, "rewritten");
    }

    #[test]
    fn test_summary_matches_are_reduced_per_package() {
        let catalog = catalog(vec![
            record("alpha", "1.0.0", "parser"),
            record("beta", "3.0.0", "parser"),
        ]);
        let hits = search(&catalog, &SearchQuery::by_summary("parser"));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "alpha");
        assert_eq!(hits[1].name, "beta");
    }

    #[test]
    fn test_no_matches_and_blank_terms() {
        let catalog = catalog(vec![record("foo", "1.0.0", "anything")]);
        assert!(search(&catalog, &SearchQuery::by_name("zzz")).is_empty());
        assert!(search(&catalog, &SearchQuery::by_name("  ")).is_empty());
        assert!(search(&catalog, &SearchQuery::default()).is_empty());
    }

    #[test]
    fn test_packages_without_resolvable_version_are_skipped() {
        let catalog = catalog(vec![
            record("odd", "banana", "fruit"),
            record("odd", "cherry", "fruit"),
            record("single", "nightly", "fruit"),
        ]);
        let hits = search(&catalog, &SearchQuery::by_summary("fruit"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "single");
        assert_eq!(hits[0].version, "nightly");
    }

    #[test]
    fn test_hit_wire_field_names() {
        let hit = SearchHit::from(&record("foo", "1.0", "demo"));
        let value = serde_json::to_value(&hit).expect("serialize");
        assert_eq!(value["_pypi_ordering"], false);
        assert_eq!(value["name"], "foo");
    }
}
