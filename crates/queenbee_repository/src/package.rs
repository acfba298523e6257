//! Deterministic gzipped tar packaging of plugins and recipes.
//!
//! A package carries exactly three members, in order: `resource.json`
//! (canonical manifest bytes), `version.json` (canonical
//! [`PackageVersion`] bytes) and an optional `README.md`. All entries use
//! uid/gid 0, uname/gname `"0"`, mode `0o664` and an mtime derived from
//! the version's `created` timestamp, so packaging the same content twice
//! produces byte-identical archives.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use queenbee_manifest::{
    digest_bytes, ContentDigest, DependencyKind, Metadata, Plugin, Recipe,
};

use crate::error::RepositoryError;
use crate::transport::{resolve_local, urljoin, AuthHeader, Transport};

const RESOURCE_MEMBER: &str = "resource.json";
const VERSION_MEMBER: &str = "version.json";
const README_MEMBER: &str = "README.md";

/// The manifest stored inside a package: a plugin or a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageManifest {
    Plugin(Plugin),
    Recipe(Recipe),
}

impl PackageManifest {
    pub fn kind(&self) -> DependencyKind {
        match self {
            Self::Plugin(_) => DependencyKind::Plugin,
            Self::Recipe(_) => DependencyKind::Recipe,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Plugin(plugin) => &plugin.metadata,
            Self::Recipe(recipe) => &recipe.metadata,
        }
    }

    /// Parse manifest bytes according to the declared package kind.
    pub fn from_bytes(kind: DependencyKind, bytes: &[u8]) -> Result<Self, RepositoryError> {
        Ok(match kind {
            DependencyKind::Plugin => Self::Plugin(Plugin::from_bytes(bytes)?),
            DependencyKind::Recipe => Self::Recipe(Recipe::from_bytes(bytes)?),
        })
    }
}

fn package_version_type() -> String {
    "PackageVersion".to_string()
}

/// The metadata row stored in a repository index for one archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    #[serde(rename = "type", default = "package_version_type")]
    pub type_name: String,
    #[serde(flatten)]
    pub metadata: Metadata,
    /// Digest of the packaged manifest's canonical JSON.
    pub digest: String,
    pub created: DateTime<Utc>,
    /// Location of the archive, relative to its repository root.
    pub url: String,
    pub kind: DependencyKind,
    /// `<repository>/<package>` label attached when fetching a remote
    /// index; opaque to the core.
    pub slug: Option<String>,
    pub readme: Option<String>,
    pub manifest: Option<PackageManifest>,
}

impl PackageVersion {
    /// Describe a manifest as a fresh package version.
    pub fn from_manifest(
        manifest: &PackageManifest,
        created: Option<DateTime<Utc>>,
    ) -> Result<Self, RepositoryError> {
        let metadata = manifest.metadata().clone();
        let digest = manifest.content_digest().map_err(|err| RepositoryError::Parse {
            context: "manifest".to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            type_name: package_version_type(),
            url: format!("{}-{}.tgz", metadata.name, metadata.tag),
            metadata,
            digest,
            created: created.unwrap_or_else(Utc::now),
            kind: manifest.kind(),
            slug: None,
            readme: None,
            manifest: None,
        })
    }

    /// The `<name>-<tag>.tgz` file name of this version's archive.
    pub fn archive_name(&self) -> String {
        format!("{}-{}.tgz", self.metadata.name, self.metadata.tag)
    }

    /// A copy fit for search results: no readme, license or manifest body.
    pub fn stripped(&self) -> Self {
        let mut version = self.clone();
        version.readme = None;
        version.manifest = None;
        version.metadata.license = None;
        version
    }

    /// Whether a search query matches this package. A `None` query matches
    /// everything; otherwise the query must be a case-insensitive
    /// substring of the name or one of the keywords.
    pub fn matches_query(&self, query: Option<&str>) -> bool {
        let Some(query) = query else {
            return true;
        };
        let query = query.to_lowercase();
        if self.metadata.name.to_lowercase().contains(&query) {
            return true;
        }
        self.metadata
            .keywords
            .iter()
            .flatten()
            .any(|keyword| keyword.to_lowercase() == query)
    }

    /// Load a package version from a local archive, without digest
    /// verification.
    pub fn from_package(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = match resolve_local(&path.as_ref().to_string_lossy()) {
            Some(resolved) => resolved,
            None => path.as_ref().to_path_buf(),
        };
        let bytes = fs_err::read(&path).map_err(|err| RepositoryError::io(path, err))?;
        unpack_package(&bytes, false, None)
    }

    /// Fetch this version's archive from its repository and unpack it,
    /// verifying the digest recorded in the index.
    pub async fn fetch_package(
        &self,
        source: &str,
        transport: &Transport,
        auth: Option<&AuthHeader>,
        verify_digest: bool,
        cancel: &CancellationToken,
    ) -> Result<Self, RepositoryError> {
        let url = urljoin(source, &self.url);
        let bytes = transport.fetch(&url, auth, cancel).await?;
        unpack_package(&bytes, verify_digest, Some(&self.digest))
    }
}

/// Package a manifest into `(version, gzipped bytes)`.
///
/// `created` pins the version timestamp and, through it, every tar entry
/// mtime; leave it unset only when reproducibility does not matter.
pub fn pack_package(
    manifest: &PackageManifest,
    readme: Option<&str>,
    created: Option<DateTime<Utc>>,
) -> Result<(PackageVersion, Vec<u8>), RepositoryError> {
    let mut version = PackageVersion::from_manifest(manifest, created)?;

    let resource_bytes = manifest.canonical_json().map_err(|err| RepositoryError::Parse {
        context: "manifest".to_string(),
        message: err.to_string(),
    })?;
    let version_bytes = version.canonical_json().map_err(|err| RepositoryError::Parse {
        context: "package version".to_string(),
        message: err.to_string(),
    })?;

    let mtime = version.created.timestamp().max(0) as u64;
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    append_member(&mut builder, RESOURCE_MEMBER, &resource_bytes, mtime)?;
    append_member(&mut builder, VERSION_MEMBER, &version_bytes, mtime)?;
    if let Some(readme) = readme {
        append_member(&mut builder, README_MEMBER, readme.as_bytes(), mtime)?;
    }

    let bytes = builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|err| RepositoryError::corrupt(err.to_string()))?;

    version.readme = readme.map(str::to_string);
    Ok((version, bytes))
}

fn append_member<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    data: &[u8],
    mtime: u64,
) -> Result<(), RepositoryError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o664);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime);
    header.set_entry_type(tar::EntryType::Regular);
    header
        .set_username("0")
        .and_then(|_| header.set_groupname("0"))
        .map_err(|err| RepositoryError::corrupt(err.to_string()))?;
    builder
        .append_data(&mut header, name, data)
        .map_err(|err| RepositoryError::corrupt(err.to_string()))
}

/// Unpack a package archive into a fully-populated [`PackageVersion`].
///
/// When `verify_digest` is set, the manifest bytes must hash to
/// `expected_digest`.
pub fn unpack_package(
    bytes: &[u8],
    verify_digest: bool,
    expected_digest: Option<&str>,
) -> Result<PackageVersion, RepositoryError> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);

    let mut resource_bytes = None;
    let mut version: Option<PackageVersion> = None;
    let mut readme = None;

    let entries = archive
        .entries()
        .map_err(|err| RepositoryError::corrupt(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| RepositoryError::corrupt(err.to_string()))?;
        let path = entry
            .path()
            .map_err(|err| RepositoryError::corrupt(err.to_string()))?
            .to_string_lossy()
            .to_string();

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|err| RepositoryError::corrupt(err.to_string()))?;

        match path.as_str() {
            RESOURCE_MEMBER => resource_bytes = Some(data),
            VERSION_MEMBER => {
                version = Some(serde_json::from_slice(&data).map_err(|err| {
                    RepositoryError::Parse {
                        context: VERSION_MEMBER.to_string(),
                        message: err.to_string(),
                    }
                })?)
            }
            README_MEMBER => {
                readme = Some(String::from_utf8_lossy(&data).to_string());
            }
            _ => {}
        }
    }

    let resource_bytes =
        resource_bytes.ok_or_else(|| RepositoryError::corrupt("missing resource.json member"))?;
    let mut version =
        version.ok_or_else(|| RepositoryError::corrupt("missing version.json member"))?;

    let read_digest = digest_bytes(&resource_bytes);
    if verify_digest {
        let expected = expected_digest.unwrap_or(&version.digest);
        if read_digest != expected {
            return Err(RepositoryError::DigestMismatch {
                expected: expected.to_string(),
                actual: read_digest,
            });
        }
    }

    version.manifest = Some(PackageManifest::from_bytes(version.kind, &resource_bytes)?);
    version.readme = readme;
    version.digest = read_digest;
    Ok(version)
}

/// Read the `README.md` of a package folder, matched case-insensitively.
pub fn read_readme(folder: impl AsRef<Path>) -> Result<Option<String>, RepositoryError> {
    let folder = folder.as_ref();
    let entries = fs_err::read_dir(folder).map_err(|err| RepositoryError::io(folder, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| RepositoryError::io(folder, err))?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case("readme.md") {
            let contents = fs_err::read_to_string(entry.path())
                .map_err(|err| RepositoryError::io(entry.path(), err))?;
            return Ok(Some(contents));
        }
    }
    Ok(None)
}

/// Load a plugin or recipe folder and package it.
pub fn package_folder(
    kind: DependencyKind,
    folder: impl AsRef<Path>,
    created: Option<DateTime<Utc>>,
) -> Result<(PackageVersion, Vec<u8>), RepositoryError> {
    let folder = folder.as_ref();
    let manifest = match kind {
        DependencyKind::Plugin => PackageManifest::Plugin(Plugin::from_folder(folder)?),
        DependencyKind::Recipe => PackageManifest::Recipe(Recipe::from_folder(folder)?),
    };
    let readme = read_readme(folder)?;
    pack_package(&manifest, readme.as_deref(), created)
}
