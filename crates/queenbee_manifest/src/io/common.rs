//! Shared pieces of the I/O descriptor model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationIssue;

/// Element type for array inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemType {
    String,
    Integer,
    Number,
    Boolean,
    Folder,
    Array,
    Object,
}

impl Default for ItemType {
    fn default() -> Self {
        Self::String
    }
}

/// Default source for a file or folder input when no value is supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArtifactSource {
    /// A file or folder fetched over HTTP.
    #[serde(rename = "HTTP")]
    Http { url: String },
    /// An object in an S3-compatible store.
    #[serde(rename = "S3")]
    S3 {
        key: String,
        endpoint: String,
        bucket: String,
        credentials_path: Option<String>,
    },
    /// A path inside the project folder the workflow runs against.
    #[serde(rename = "ProjectFolder")]
    ProjectFolder { path: Option<String> },
}

/// Collect the duplicated entries of a name list.
pub fn find_duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        *counts.entry(name).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}

/// One issue per duplicated name in `names`, labeled with `scope`.
pub fn unique_name_issues<'a>(
    scope: &'static str,
    names: impl IntoIterator<Item = &'a str>,
) -> Vec<ValidationIssue> {
    find_duplicates(names)
        .into_iter()
        .map(|name| ValidationIssue::DuplicateName { scope, name })
        .collect()
}

/// De-duplicate a list of opaque alias handlers, keeping first occurrences.
///
/// Aliases are platform UI handlers; the core treats them as opaque values
/// and only guarantees the list carries no exact duplicates.
pub fn dedup_aliases(aliases: &mut Option<Vec<Value>>) {
    if let Some(values) = aliases {
        let mut seen: Vec<Value> = Vec::with_capacity(values.len());
        values.retain(|value| {
            if seen.contains(value) {
                false
            } else {
                seen.push(value.clone());
                true
            }
        });
    }
}
