//! Package metadata shared by plugins and recipes.

use serde::{Deserialize, Serialize};

/// A maintainer of a plugin or recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    pub email: Option<String>,
}

/// License information for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// SPDX identifier, e.g. `MIT`.
    pub name: String,
    /// Link to the full license text.
    pub url: Option<String>,
}

/// Metadata carried by every package manifest.
///
/// `name` and `tag` identify a package version inside a repository; the
/// rest is descriptive and surfaces in index search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    /// Package version tag.
    pub tag: String,
    /// Version of the application the package wraps, if any.
    pub app_version: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub maintainers: Option<Vec<Maintainer>>,
    /// Homepage URL.
    pub home: Option<String>,
    /// Source repositories for the packaged application.
    pub sources: Option<Vec<String>>,
    pub icon: Option<String>,
    pub deprecated: Option<bool>,
    pub description: Option<String>,
    pub license: Option<License>,
}

impl Metadata {
    /// Minimal metadata with just a name and tag, used by scaffolding.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            app_version: None,
            keywords: None,
            maintainers: None,
            home: None,
            sources: None,
            icon: None,
            deprecated: None,
            description: None,
            license: None,
        }
    }
}
