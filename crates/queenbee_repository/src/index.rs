//! Repository indexes: `index.json` plus the archive folder tree.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use queenbee_manifest::DependencyKind;

use crate::error::RepositoryError;
use crate::package::{PackageVersion, unpack_package};
use crate::transport::{AuthHeader, Transport, urljoin};

pub const INDEX_FILE: &str = "index.json";

/// The tag that resolves to the newest package version.
pub const LATEST_TAG: &str = "latest";

/// An index over the packages of one repository folder.
///
/// Versions are grouped by package name, separately for plugins and
/// recipes. The index is a plain value: callers are responsible for
/// serializing concurrent writes to the backing file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// When this index was generated.
    pub generated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub plugin: BTreeMap<String, Vec<PackageVersion>>,
    #[serde(default)]
    pub recipe: BTreeMap<String, Vec<PackageVersion>>,
}

impl RepositoryIndex {
    /// Generate a fresh index by scanning a repository folder's
    /// `plugins/` and `recipes/` subfolders.
    pub fn from_folder(folder: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let mut index = Self::default();
        for version in scan_folder(folder.as_ref())? {
            index.packages_mut(version.kind).entry(version.metadata.name.clone())
                .or_default()
                .push(version);
        }
        index.generated = Some(Utc::now());
        Ok(index)
    }

    /// Merge the archives found in a repository folder into this index.
    ///
    /// A `(kind, name, tag)` that is unknown is inserted; one that exists
    /// with the same digest is kept; one that exists with a different
    /// digest is overwritten with `force`, retained with `skip` and a
    /// conflict otherwise.
    pub fn merge_folder(
        &mut self,
        folder: impl AsRef<Path>,
        force: bool,
        skip: bool,
    ) -> Result<(), RepositoryError> {
        for version in scan_folder(folder.as_ref())? {
            let kind = version.kind;
            let name = version.metadata.name.clone();
            let versions = self.packages_mut(kind).entry(name.clone()).or_default();

            let existing = versions
                .iter()
                .position(|existing| existing.metadata.tag == version.metadata.tag);
            match existing {
                None => versions.push(version),
                Some(index) if versions[index].digest == version.digest => {}
                Some(index) => {
                    if force {
                        tracing::warn!(
                            %kind,
                            %name,
                            tag = %version.metadata.tag,
                            "overwriting index entry with a different digest"
                        );
                        versions[index] = version;
                    } else if skip {
                        tracing::debug!(
                            %kind,
                            %name,
                            tag = %version.metadata.tag,
                            "keeping existing index entry"
                        );
                    } else {
                        return Err(RepositoryError::PackageConflict {
                            kind,
                            name,
                            tag: version.metadata.tag.clone(),
                        });
                    }
                }
            }
        }
        self.generated = Some(Utc::now());
        Ok(())
    }

    /// Read an `index.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let bytes = fs_err::read(path).map_err(|err| RepositoryError::io(path, err))?;
        serde_json::from_slice(&bytes).map_err(|err| RepositoryError::Parse {
            context: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Write this index to an `index.json` file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), RepositoryError> {
        let path = path.as_ref();
        let contents =
            serde_json::to_vec_pretty(self).map_err(|err| RepositoryError::Parse {
                context: path.display().to_string(),
                message: err.to_string(),
            })?;
        fs_err::write(path, contents).map_err(|err| RepositoryError::io(path, err))
    }

    /// Fetch and parse the `index.json` of a repository source.
    pub async fn fetch(
        source: &str,
        transport: &Transport,
        auth: Option<&AuthHeader>,
        cancel: &CancellationToken,
    ) -> Result<Self, RepositoryError> {
        let url = urljoin(source, INDEX_FILE);
        let bytes = transport.fetch(&url, auth, cancel).await?;
        serde_json::from_slice(&bytes).map_err(|err| RepositoryError::Parse {
            context: url,
            message: err.to_string(),
        })
    }

    fn packages(&self, kind: DependencyKind) -> &BTreeMap<String, Vec<PackageVersion>> {
        match kind {
            DependencyKind::Plugin => &self.plugin,
            DependencyKind::Recipe => &self.recipe,
        }
    }

    fn packages_mut(&mut self, kind: DependencyKind) -> &mut BTreeMap<String, Vec<PackageVersion>> {
        match kind {
            DependencyKind::Plugin => &mut self.plugin,
            DependencyKind::Recipe => &mut self.recipe,
        }
    }

    fn versions(
        &self,
        kind: DependencyKind,
        name: &str,
    ) -> Result<&[PackageVersion], RepositoryError> {
        self.packages(kind)
            .get(name)
            .map(Vec::as_slice)
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| RepositoryError::PackageNotFound {
                kind,
                name: name.to_string(),
                selector: "of any version".to_string(),
            })
    }

    /// Look up a package version by tag. The `latest` tag selects the
    /// newest `created` entry, ties broken by tag lexicographically.
    pub fn package_by_tag(
        &self,
        kind: DependencyKind,
        name: &str,
        tag: &str,
    ) -> Result<&PackageVersion, RepositoryError> {
        let versions = self.versions(kind, name)?;
        if tag == LATEST_TAG {
            return Ok(versions
                .iter()
                .max_by_key(|version| (version.created, version.metadata.tag.clone()))
                .expect("versions lists are never empty"));
        }
        versions
            .iter()
            .find(|version| version.metadata.tag == tag)
            .ok_or_else(|| RepositoryError::PackageNotFound {
                kind,
                name: name.to_string(),
                selector: format!("with tag `{tag}`"),
            })
    }

    /// Alias of [`RepositoryIndex::package_by_tag`]; dependency versions
    /// and package tags are the same namespace.
    pub fn package_by_version(
        &self,
        kind: DependencyKind,
        name: &str,
        version: &str,
    ) -> Result<&PackageVersion, RepositoryError> {
        self.package_by_tag(kind, name, version)
    }

    /// Exact-match lookup by manifest digest.
    pub fn package_by_digest(
        &self,
        kind: DependencyKind,
        name: &str,
        digest: &str,
    ) -> Result<&PackageVersion, RepositoryError> {
        self.versions(kind, name)?
            .iter()
            .find(|version| version.digest == digest)
            .ok_or_else(|| RepositoryError::PackageNotFound {
                kind,
                name: name.to_string(),
                selector: format!("with digest `{digest}`"),
            })
    }

    /// All package versions matching a kind filter and a search query,
    /// stripped of readme, license and manifest bodies.
    pub fn search(&self, kind: Option<DependencyKind>, query: Option<&str>) -> Vec<PackageVersion> {
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => vec![DependencyKind::Plugin, DependencyKind::Recipe],
        };
        let mut results = Vec::new();
        for kind in kinds {
            for versions in self.packages(kind).values() {
                for version in versions {
                    if version.matches_query(query) {
                        results.push(version.stripped());
                    }
                }
            }
        }
        results
    }

    /// Label every version with a `<repository>/<package>` slug.
    pub fn add_slugs(&mut self, repository_name: &str) {
        for versions in self.plugin.values_mut().chain(self.recipe.values_mut()) {
            for version in versions {
                version.slug = Some(format!("{repository_name}/{}", version.metadata.name));
            }
        }
    }
}

/// Scaffold an empty repository folder: `plugins/`, `recipes/` and a
/// fresh `index.json`.
pub fn init_repository(folder: impl AsRef<Path>) -> Result<(), RepositoryError> {
    let folder = folder.as_ref();
    for kind in [DependencyKind::Plugin, DependencyKind::Recipe] {
        let subfolder = folder.join(kind.folder_name());
        fs_err::create_dir_all(&subfolder).map_err(|err| RepositoryError::io(subfolder, err))?;
    }
    let mut index = RepositoryIndex::default();
    index.generated = Some(Utc::now());
    index.to_file(folder.join(INDEX_FILE))
}

/// Unpack every archive under `plugins/` and `recipes/` into index rows.
///
/// Rows keep the `created` timestamp recorded inside each archive so that
/// re-indexing an unchanged folder is stable; manifest and readme bodies
/// are dropped to keep the index lean.
fn scan_folder(folder: &Path) -> Result<Vec<PackageVersion>, RepositoryError> {
    let mut versions = Vec::new();
    for kind in [DependencyKind::Plugin, DependencyKind::Recipe] {
        let subfolder = folder.join(kind.folder_name());
        if !subfolder.is_dir() {
            continue;
        }
        let mut entries: Vec<_> = fs_err::read_dir(&subfolder)
            .map_err(|err| RepositoryError::io(&subfolder, err))?
            .collect::<Result<_, _>>()
            .map_err(|err| RepositoryError::io(&subfolder, err))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("tgz") {
                continue;
            }
            let bytes = fs_err::read(&path).map_err(|err| RepositoryError::io(&path, err))?;
            let mut version = unpack_package(&bytes, false, None).map_err(|err| {
                tracing::error!(path = %path.display(), "failed to unpack archive");
                err
            })?;
            if version.kind != kind {
                return Err(RepositoryError::corrupt(format!(
                    "`{}` contains a {} package",
                    path.display(),
                    version.kind
                )));
            }
            version.url = format!(
                "{}/{}",
                kind.folder_name(),
                entry.file_name().to_string_lossy()
            );
            version.manifest = None;
            version.readme = None;
            versions.push(version);
        }
    }
    Ok(versions)
}
