//! Recipe dependencies: typed pointers into package repositories.

use serde::{Deserialize, Serialize};

/// What kind of package a dependency points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Recipe,
    Plugin,
}

impl DependencyKind {
    /// The repository subfolder this kind of package is stored under.
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Recipe => "recipes",
            Self::Plugin => "plugins",
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recipe => write!(f, "recipe"),
            Self::Plugin => write!(f, "plugin"),
        }
    }
}

impl std::str::FromStr for DependencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recipe" => Ok(Self::Recipe),
            "plugin" => Ok(Self::Plugin),
            other => Err(format!("`{other}` is not a package kind (recipe, plugin)")),
        }
    }
}

/// A reference to a recipe or plugin hosted in a repository.
///
/// A dependency starts out unlocked; resolving it against its source
/// repository records the manifest digest, after which the digest is
/// immutable for as long as it remains published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub kind: DependencyKind,
    /// Package name inside the source repository.
    pub name: String,
    /// The manifest digest recorded when the dependency was locked.
    pub digest: Option<String>,
    /// Alternative name to refer to this dependency by, for when `name`
    /// collides with another dependency.
    pub alias: Option<String>,
    /// Version tag to resolve inside the source repository.
    pub version: String,
    /// URL of the hosting repository (`file:` or `http(s)`).
    pub source: String,
}

impl Dependency {
    /// The name the owning recipe refers to this dependency by.
    pub fn ref_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_locked(&self) -> bool {
        self.digest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_wins_over_name() {
        let dependency: Dependency = serde_yaml::from_str(
            "kind: plugin\nname: honeybee-radiance\nalias: radiance\nversion: 1.0.0\nsource: file:../repo\n",
        )
        .unwrap();
        assert_eq!(dependency.ref_name(), "radiance");
        assert!(!dependency.is_locked());
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DependencyKind::Plugin).unwrap(),
            r#""plugin""#
        );
        assert_eq!(DependencyKind::Recipe.folder_name(), "recipes");
    }
}
