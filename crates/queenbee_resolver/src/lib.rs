//! Dependency resolution for recipes.
//!
//! Resolution walks a recipe's declared dependencies, locates each one in
//! its source repository's index, downloads and verifies the archive, and
//! records the manifest digest (the lock). Recipe dependencies recurse;
//! the flattened, digest-keyed set of every transitive manifest is the
//! second output, ready for the baker.
//!
//! Locking is all-or-nothing: the recipe is only updated after every
//! dependency resolved, and `install` stages `.dependencies` in a temp
//! directory that is renamed into place on success, so cancellation or
//! failure leaves the folder in its pre-operation state.

use std::collections::HashMap;
use std::path::Path;

use futures::future;
use indexmap::IndexMap;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use queenbee_manifest::{
    Dependency, DependencyKind, ManifestError, Plugin, Recipe, parser::parse_file,
    DEPENDENCIES_FOLDER,
};
use queenbee_repository::{
    AuthProvider, PackageManifest, PackageVersion, RepositoryError, RepositoryIndex, Transport,
};

/// Flattened transitive dependency manifests, keyed by the digest each
/// one was locked to. Recipe manifests carry their own dependencies
/// locked in turn.
pub type DependencyManifests = IndexMap<String, PackageManifest>;

/// Options controlling how dependencies are locked.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Verify that fetched manifest bytes hash to the locked digest.
    pub verify_digest: bool,
    /// Fail when a locked digest has disappeared from the index instead
    /// of re-locking to the digest now published for the same version.
    pub strict_digest: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            verify_digest: true,
            strict_digest: false,
        }
    }
}

/// Errors produced while resolving or installing dependencies.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("dependency `{name}` ({kind}, version `{version}`) was not found in `{source}`")]
    #[diagnostic(code(queenbee::dep_not_found))]
    DependencyNotFound {
        kind: DependencyKind,
        name: String,
        version: String,
        source: String,
    },

    #[error(
        "dependency `{name}` is locked to digest `{digest}` which no longer exists in `{source}`"
    )]
    #[diagnostic(code(queenbee::digest_mismatch))]
    LockedDigestGone {
        name: String,
        digest: String,
        source: String,
    },

    #[error("dependency cycle detected: {chain}")]
    #[diagnostic(code(queenbee::cycle_detected))]
    CycleDetected { chain: String },

    #[error("`{name}` is not a dependency of this recipe")]
    #[diagnostic(code(queenbee::dep_not_found))]
    UnknownDependency { name: String },

    #[error("dependency `{name}` is not locked; run install first")]
    #[diagnostic(code(queenbee::dep_not_found))]
    Unlocked { name: String },

    #[error("no installed manifest for dependency `{name}` (digest `{digest}`)")]
    #[diagnostic(code(queenbee::dep_not_found))]
    NotInstalled { name: String, digest: String },

    #[error("failed to access `{path}`")]
    #[diagnostic(code(queenbee::io_error))]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),
}

impl ResolveError {
    fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

struct ResolveContext<'a> {
    transport: &'a Transport,
    auth: &'a dyn AuthProvider,
    options: &'a LockOptions,
    cancel: &'a CancellationToken,
    /// Repository indexes already fetched, by source URL.
    indexes: HashMap<String, RepositoryIndex>,
    /// Every transitive manifest resolved so far, by digest.
    manifests: DependencyManifests,
    /// The `(source, name, version)` chain currently being resolved.
    path: Vec<(String, String, String)>,
}

impl ResolveContext<'_> {
    /// Fetch the indexes of every source in `sources` that is not cached
    /// yet, concurrently.
    async fn prefetch_indexes<'s>(
        &mut self,
        sources: impl Iterator<Item = &'s str>,
    ) -> Result<(), ResolveError> {
        let missing: Vec<String> = sources
            .filter(|source| !self.indexes.contains_key(*source))
            .map(str::to_string)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let transport = self.transport;
        let cancel = self.cancel;
        let fetched = future::try_join_all(missing.iter().map(|source| {
            let auth = self.auth.header_for(source);
            async move {
                RepositoryIndex::fetch(source, transport, auth.as_ref(), cancel)
                    .await
                    .map(|index| (source.clone(), index))
            }
        }))
        .await?;

        self.indexes.extend(fetched);
        Ok(())
    }

    /// Select the package version a dependency resolves to, returning the
    /// locked digest alongside the index row.
    fn select_version(&self, dependency: &Dependency) -> Result<PackageVersion, ResolveError> {
        let index = self
            .indexes
            .get(&dependency.source)
            .expect("indexes are prefetched before selection");

        let not_found = |_| ResolveError::DependencyNotFound {
            kind: dependency.kind,
            name: dependency.name.clone(),
            version: dependency.version.clone(),
            source: dependency.source.clone(),
        };

        let row = match &dependency.digest {
            None => index
                .package_by_version(dependency.kind, &dependency.name, &dependency.version)
                .map_err(not_found)?,
            Some(digest) => {
                match index.package_by_digest(dependency.kind, &dependency.name, digest) {
                    Ok(row) => row,
                    Err(_) if self.options.strict_digest => {
                        return Err(ResolveError::LockedDigestGone {
                            name: dependency.name.clone(),
                            digest: digest.clone(),
                            source: dependency.source.clone(),
                        });
                    }
                    Err(_) => {
                        // The owner republished this version under a new
                        // digest; follow it and update the lock.
                        let row = index
                            .package_by_version(
                                dependency.kind,
                                &dependency.name,
                                &dependency.version,
                            )
                            .map_err(not_found)?;
                        tracing::warn!(
                            name = %dependency.name,
                            old = %digest,
                            new = %row.digest,
                            "locked digest disappeared from the index; re-locking"
                        );
                        row
                    }
                }
            }
        };
        Ok(row.clone())
    }

    /// Resolve one dependency list in place, locking digests and
    /// collecting transitive manifests.
    async fn resolve_list(&mut self, dependencies: &mut [Dependency]) -> Result<(), ResolveError> {
        self.prefetch_indexes(
            dependencies
                .iter()
                .map(|dependency| dependency.source.as_str()),
        )
        .await?;

        let mut rows = Vec::with_capacity(dependencies.len());
        for dependency in dependencies.iter_mut() {
            let row = self.select_version(dependency)?;
            dependency.digest = Some(row.digest.clone());
            rows.push(row);
        }

        // Archives of this level download concurrently; recursion below
        // stays sequential so the lock and manifest set mutate on one
        // task only.
        let transport = self.transport;
        let verify_digest = self.options.verify_digest;
        let cancel = self.cancel;
        let fetches = dependencies
            .iter()
            .zip(&rows)
            .filter(|(_, row)| !self.manifests.contains_key(&row.digest))
            .map(|(dependency, row)| {
                let auth = self.auth.header_for(&dependency.source);
                let source = dependency.source.clone();
                let row = row.clone();
                async move {
                    let unpacked = row
                        .fetch_package(&source, transport, auth.as_ref(), verify_digest, cancel)
                        .await?;
                    Ok::<_, ResolveError>((source, row.digest.clone(), unpacked))
                }
            });
        let unpacked = future::try_join_all(fetches).await?;

        for (source, digest, version) in unpacked {
            if self.manifests.contains_key(&digest) {
                continue;
            }
            let manifest = version
                .manifest
                .expect("unpacked packages always carry their manifest");
            match manifest {
                PackageManifest::Plugin(plugin) => {
                    self.manifests
                        .insert(digest, PackageManifest::Plugin(plugin));
                }
                PackageManifest::Recipe(mut recipe) => {
                    let key = (
                        source,
                        recipe.metadata.name.clone(),
                        recipe.metadata.tag.clone(),
                    );
                    if self.path.contains(&key) {
                        let chain = self
                            .path
                            .iter()
                            .chain(std::iter::once(&key))
                            .map(|(_, name, version)| format!("{name}@{version}"))
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        return Err(ResolveError::CycleDetected { chain });
                    }

                    // Reserve the slot before recursing so a nested cycle
                    // cannot re-enter this manifest.
                    self.path.push(key);
                    let nested: future::LocalBoxFuture<'_, Result<(), ResolveError>> =
                        Box::pin(self.resolve_list(&mut recipe.dependencies));
                    let result = nested.await;
                    self.path.pop();
                    result?;

                    self.manifests
                        .insert(digest, PackageManifest::Recipe(recipe));
                }
            }
        }

        Ok(())
    }
}

/// Resolve every dependency of a recipe.
///
/// Returns the locked dependency list and the flattened transitive
/// manifest set. The recipe itself is left untouched; apply the lock with
/// [`lock_dependencies`] or persist it through
/// [`Recipe::write_dependency_file`].
pub async fn resolve_dependencies(
    recipe: &Recipe,
    transport: &Transport,
    auth: &dyn AuthProvider,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> Result<(Vec<Dependency>, DependencyManifests), ResolveError> {
    let mut dependencies = recipe.dependencies.clone();
    let mut context = ResolveContext {
        transport,
        auth,
        options,
        cancel,
        indexes: HashMap::new(),
        manifests: IndexMap::new(),
        path: Vec::new(),
    };
    context.resolve_list(&mut dependencies).await?;
    Ok((dependencies, context.manifests))
}

/// Lock a recipe's dependencies in place. Either every dependency locks
/// or the recipe is unchanged.
pub async fn lock_dependencies(
    recipe: &mut Recipe,
    transport: &Transport,
    auth: &dyn AuthProvider,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> Result<DependencyManifests, ResolveError> {
    let (dependencies, manifests) =
        resolve_dependencies(recipe, transport, auth, options, cancel).await?;
    recipe.dependencies = dependencies;
    Ok(manifests)
}

/// Resolve a recipe folder's dependencies and install them into its
/// `.dependencies` folder, then persist the lockfile.
///
/// The folder mirrors the repository layout so later bakes work offline:
///
/// ```text
/// .dependencies/
///   plugins/<digest>.yaml
///   recipes/<digest>.yaml
/// ```
pub async fn install_dependencies(
    folder: impl AsRef<Path>,
    transport: &Transport,
    auth: &dyn AuthProvider,
    options: &LockOptions,
    cancel: &CancellationToken,
) -> Result<Recipe, ResolveError> {
    let folder = folder.as_ref();
    let mut recipe = Recipe::from_folder(folder)?;
    let manifests = lock_dependencies(&mut recipe, transport, auth, options, cancel).await?;

    // Stage in a sibling temp directory and swap on success.
    let staging =
        tempfile::tempdir_in(folder).map_err(|err| ResolveError::io(folder, err))?;
    for kind in [DependencyKind::Plugin, DependencyKind::Recipe] {
        let subfolder = staging.path().join(kind.folder_name());
        fs_err::create_dir_all(&subfolder).map_err(|err| ResolveError::io(&subfolder, err))?;
    }
    for (digest, manifest) in &manifests {
        let path = staging
            .path()
            .join(manifest.kind().folder_name())
            .join(format!("{digest}.yaml"));
        write_manifest(&path, manifest)?;
    }

    let target = folder.join(DEPENDENCIES_FOLDER);
    if target.exists() {
        fs_err::remove_dir_all(&target).map_err(|err| ResolveError::io(&target, err))?;
    }
    fs_err::rename(staging.keep(), &target).map_err(|err| ResolveError::io(&target, err))?;

    recipe.write_dependency_file(folder)?;
    tracing::info!(
        folder = %folder.display(),
        count = manifests.len(),
        "installed dependencies"
    );
    Ok(recipe)
}

/// Load the previously installed manifests of a recipe folder for an
/// offline bake.
pub fn load_installed_manifests(
    folder: impl AsRef<Path>,
    recipe: &Recipe,
) -> Result<DependencyManifests, ResolveError> {
    let folder = folder.as_ref().join(DEPENDENCIES_FOLDER);
    let mut manifests = IndexMap::new();

    for kind in [DependencyKind::Plugin, DependencyKind::Recipe] {
        let subfolder = folder.join(kind.folder_name());
        if !subfolder.is_dir() {
            continue;
        }
        let mut entries: Vec<_> = fs_err::read_dir(&subfolder)
            .map_err(|err| ResolveError::io(&subfolder, err))?
            .collect::<Result<_, _>>()
            .map_err(|err| ResolveError::io(&subfolder, err))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let Some(digest) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let value = parse_file(&path)?;
            let manifest = match kind {
                DependencyKind::Plugin => PackageManifest::Plugin(Plugin::from_value(value)?),
                DependencyKind::Recipe => PackageManifest::Recipe(Recipe::from_value(value)?),
            };
            manifests.insert(digest.to_string(), manifest);
        }
    }

    // Every locked dependency must have its manifest on disk.
    for dependency in &recipe.dependencies {
        let digest = dependency
            .digest
            .as_ref()
            .ok_or_else(|| ResolveError::Unlocked {
                name: dependency.ref_name().to_string(),
            })?;
        if !manifests.contains_key(digest) {
            return Err(ResolveError::NotInstalled {
                name: dependency.ref_name().to_string(),
                digest: digest.clone(),
            });
        }
    }

    Ok(manifests)
}

/// Point a dependency at a locally checked-out folder.
///
/// The folder's manifest is written into `.dependencies` under its own
/// digest and the lockfile is updated to match, so the next bake uses the
/// local code without touching the source repository.
pub fn link_dependency(
    folder: impl AsRef<Path>,
    dependency_name: &str,
    local_path: impl AsRef<Path>,
) -> Result<(), ResolveError> {
    use queenbee_manifest::ContentDigest;

    let folder = folder.as_ref();
    let mut recipe = Recipe::from_folder(folder)?;

    let Some(dependency) = recipe
        .dependencies
        .iter_mut()
        .find(|dependency| dependency.ref_name() == dependency_name)
    else {
        return Err(ResolveError::UnknownDependency {
            name: dependency_name.to_string(),
        });
    };

    let manifest = match dependency.kind {
        DependencyKind::Plugin => {
            PackageManifest::Plugin(Plugin::from_folder(local_path.as_ref())?)
        }
        DependencyKind::Recipe => {
            PackageManifest::Recipe(Recipe::from_folder(local_path.as_ref())?)
        }
    };
    let digest = manifest
        .content_digest()
        .map_err(|err| RepositoryError::Parse {
            context: "linked manifest".to_string(),
            message: err.to_string(),
        })?;

    let subfolder = folder
        .join(DEPENDENCIES_FOLDER)
        .join(dependency.kind.folder_name());
    fs_err::create_dir_all(&subfolder).map_err(|err| ResolveError::io(&subfolder, err))?;
    write_manifest(&subfolder.join(format!("{digest}.yaml")), &manifest)?;

    tracing::info!(
        dependency = dependency_name,
        digest = %digest,
        "linked local folder over dependency"
    );
    dependency.digest = Some(digest);
    recipe.write_dependency_file(folder)?;
    Ok(())
}

fn write_manifest(path: &Path, manifest: &PackageManifest) -> Result<(), ResolveError> {
    let contents = serde_yaml::to_string(manifest).map_err(|err| RepositoryError::Parse {
        context: path.display().to_string(),
        message: err.to_string(),
    })?;
    fs_err::write(path, contents).map_err(|err| ResolveError::io(path, err))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chrono::{TimeZone, Utc};

    use queenbee_manifest::Plugin;
    use queenbee_repository::{pack_package, INDEX_FILE};

    use super::*;

    fn radiance_plugin(image: &str) -> Plugin {
        Plugin::from_value(serde_json::json!({
            "metadata": {"name": "honeybee-radiance", "tag": "1.0.0"},
            "config": {
                "docker": {"image": image, "registry": null, "workdir": "/opt/run"},
                "local": null
            },
            "functions": [{
                "name": "rtrace",
                "description": null,
                "inputs": [
                    {"type": "FunctionFileInput", "name": "grid", "required": true, "path": "grid.pts"}
                ],
                "outputs": [
                    {"type": "FunctionFileOutput", "name": "result", "path": "output.res"}
                ],
                "command": "rtrace < {{inputs.grid}} > output.res"
            }]
        }))
        .unwrap()
    }

    /// Pack a manifest into the repository folder and return its digest.
    fn publish(repo: &Path, manifest: &PackageManifest) -> String {
        let created = Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap();
        let (version, bytes) = pack_package(manifest, None, Some(created)).unwrap();
        let subfolder = repo.join(manifest.kind().folder_name());
        fs_err::create_dir_all(&subfolder).unwrap();
        fs_err::write(subfolder.join(version.archive_name()), bytes).unwrap();
        version.digest
    }

    fn reindex(repo: &Path) {
        RepositoryIndex::from_folder(repo)
            .unwrap()
            .to_file(repo.join(INDEX_FILE))
            .unwrap();
    }

    fn write_recipe_folder(folder: &Path, source: &str) {
        fs_err::create_dir_all(folder.join("flow")).unwrap();
        fs_err::write(folder.join("recipe.yaml"), "name: df\ntag: 0.1.0\n").unwrap();
        fs_err::write(
            folder.join("dependencies.yaml"),
            format!(
                "dependencies:\n  - kind: plugin\n    name: honeybee-radiance\n    version: 1.0.0\n    source: {source}\n"
            ),
        )
        .unwrap();
        fs_err::write(
            folder.join("flow/main.yaml"),
            r#"
name: main
inputs: []
tasks:
  - name: simulate
    template: honeybee-radiance/rtrace
    arguments:
      - type: TaskPathArgument
        name: grid
        from: {type: ValueFileReference, path: grid.pts}
outputs: []
"#,
        )
        .unwrap();
    }

    struct Fixture {
        _repo: tempfile::TempDir,
        repo_path: PathBuf,
        source: String,
        _workdir: tempfile::TempDir,
        recipe_folder: PathBuf,
    }

    fn fixture() -> Fixture {
        let repo = tempfile::tempdir().unwrap();
        let repo_path = repo.path().to_path_buf();
        let source = format!("file:{}", repo_path.display());

        publish(
            &repo_path,
            &PackageManifest::Plugin(radiance_plugin("radiance:5.4")),
        );
        reindex(&repo_path);

        let workdir = tempfile::tempdir().unwrap();
        let recipe_folder = workdir.path().join("df");
        write_recipe_folder(&recipe_folder, &source);

        Fixture {
            _repo: repo,
            repo_path,
            source,
            _workdir: workdir,
            recipe_folder,
        }
    }

    async fn install(
        fixture: &Fixture,
        options: &LockOptions,
    ) -> Result<Recipe, ResolveError> {
        install_dependencies(
            &fixture.recipe_folder,
            &Transport::new(),
            &(),
            options,
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn install_locks_and_writes_the_dependencies_folder() {
        let fixture = fixture();
        let expected = PackageManifest::Plugin(radiance_plugin("radiance:5.4"));
        let expected_digest = {
            use queenbee_manifest::ContentDigest;
            expected.content_digest().unwrap()
        };

        let recipe = install(&fixture, &LockOptions::default()).await.unwrap();
        assert_eq!(
            recipe.dependencies[0].digest.as_deref(),
            Some(expected_digest.as_str())
        );
        assert!(fixture
            .recipe_folder
            .join(".dependencies/plugins")
            .join(format!("{expected_digest}.yaml"))
            .is_file());

        // The lockfile is persisted.
        let reloaded = Recipe::from_folder(&fixture.recipe_folder).unwrap();
        assert!(reloaded.is_locked());

        // The installed manifests satisfy an offline load.
        let manifests = load_installed_manifests(&fixture.recipe_folder, &reloaded).unwrap();
        assert_eq!(manifests.len(), 1);
        assert!(matches!(
            manifests.get(&expected_digest),
            Some(PackageManifest::Plugin(_))
        ));
    }

    #[tokio::test]
    async fn relocking_against_an_unchanged_index_is_stable() {
        let fixture = fixture();
        let first = install(&fixture, &LockOptions::default()).await.unwrap();
        let lockfile = fs_err::read_to_string(fixture.recipe_folder.join("dependencies.yaml")).unwrap();

        let second = install(&fixture, &LockOptions::default()).await.unwrap();
        assert_eq!(first.dependencies, second.dependencies);
        assert_eq!(
            lockfile,
            fs_err::read_to_string(fixture.recipe_folder.join("dependencies.yaml")).unwrap()
        );
    }

    #[tokio::test]
    async fn a_vanished_digest_relocks_to_the_republished_version() {
        let fixture = fixture();
        let first = install(&fixture, &LockOptions::default()).await.unwrap();
        let d1 = first.dependencies[0].digest.clone().unwrap();

        // The owner overwrites 1.0.0 with different content.
        let d2 = publish(
            &fixture.repo_path,
            &PackageManifest::Plugin(radiance_plugin("radiance:5.5")),
        );
        reindex(&fixture.repo_path);
        assert_ne!(d1, d2);

        let relocked = install(&fixture, &LockOptions::default()).await.unwrap();
        assert_eq!(relocked.dependencies[0].digest.as_deref(), Some(d2.as_str()));
    }

    #[tokio::test]
    async fn strict_digest_fails_when_the_lock_vanishes() {
        let fixture = fixture();
        install(&fixture, &LockOptions::default()).await.unwrap();

        publish(
            &fixture.repo_path,
            &PackageManifest::Plugin(radiance_plugin("radiance:5.5")),
        );
        reindex(&fixture.repo_path);

        let strict = LockOptions {
            strict_digest: true,
            ..LockOptions::default()
        };
        let err = install(&fixture, &strict).await.unwrap_err();
        assert!(matches!(err, ResolveError::LockedDigestGone { .. }));
    }

    #[tokio::test]
    async fn tampered_index_digests_fail_verification() {
        let fixture = fixture();

        // Rewrite the index row to advertise a digest the archive cannot
        // hash to.
        let index_path = fixture.repo_path.join(INDEX_FILE);
        let mut index: serde_json::Value =
            serde_json::from_slice(&fs_err::read(&index_path).unwrap()).unwrap();
        index["plugin"]["honeybee-radiance"][0]["digest"] =
            serde_json::json!("0000000000000000000000000000000000000000000000000000000000000000");
        fs_err::write(&index_path, serde_json::to_vec(&index).unwrap()).unwrap();

        let err = install(&fixture, &LockOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Repository(RepositoryError::DigestMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn missing_dependencies_leave_the_recipe_untouched() {
        let fixture = fixture();
        fs_err::write(
            fixture.recipe_folder.join("dependencies.yaml"),
            format!(
                "dependencies:\n  - kind: plugin\n    name: honeybee-radiance\n    version: 9.9.9\n    source: {}\n",
                fixture.source
            ),
        )
        .unwrap();
        let before = fs_err::read_to_string(fixture.recipe_folder.join("dependencies.yaml")).unwrap();

        let err = install(&fixture, &LockOptions::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::DependencyNotFound { .. }));

        // No partial locking, no partial install.
        assert_eq!(
            before,
            fs_err::read_to_string(fixture.recipe_folder.join("dependencies.yaml")).unwrap()
        );
        assert!(!fixture.recipe_folder.join(DEPENDENCIES_FOLDER).exists());
    }

    #[tokio::test]
    async fn recipe_dependencies_resolve_transitively() {
        let fixture = fixture();

        // Publish a recipe that itself depends on the plugin, unlocked.
        let sub_recipe = Recipe::from_value(serde_json::json!({
            "metadata": {"name": "comfort", "tag": "0.2.0"},
            "dependencies": [{
                "kind": "plugin",
                "name": "honeybee-radiance",
                "digest": null,
                "alias": null,
                "version": "1.0.0",
                "source": fixture.source
            }],
            "flow": [{
                "name": "main",
                "inputs": [],
                "tasks": [{
                    "name": "simulate",
                    "template": "honeybee-radiance/rtrace",
                    "arguments": [{
                        "type": "TaskPathArgument",
                        "name": "grid",
                        "from": {"type": "ValueFileReference", "path": "grid.pts"},
                        "sub_path": null
                    }]
                }],
                "outputs": []
            }]
        }))
        .unwrap();
        let sub_digest = publish(&fixture.repo_path, &PackageManifest::Recipe(sub_recipe));
        reindex(&fixture.repo_path);

        fs_err::write(
            fixture.recipe_folder.join("dependencies.yaml"),
            format!(
                "dependencies:\n  - kind: recipe\n    name: comfort\n    version: 0.2.0\n    source: {src}\n  - kind: plugin\n    name: honeybee-radiance\n    version: 1.0.0\n    source: {src}\n",
                src = fixture.source
            ),
        )
        .unwrap();
        fs_err::write(
            fixture.recipe_folder.join("flow/main.yaml"),
            r#"
name: main
inputs: []
tasks:
  - name: comfort-study
    template: comfort
outputs: []
"#,
        )
        .unwrap();

        let recipe = install(&fixture, &LockOptions::default()).await.unwrap();
        assert!(recipe.is_locked());

        let manifests = load_installed_manifests(&fixture.recipe_folder, &recipe).unwrap();
        // The sub-recipe and the shared plugin, flattened.
        assert_eq!(manifests.len(), 2);
        let Some(PackageManifest::Recipe(stored)) = manifests.get(&sub_digest) else {
            panic!("expected the sub-recipe manifest");
        };
        // The stored copy carries its own dependencies locked.
        assert!(stored.is_locked());
    }

    #[tokio::test]
    async fn self_referential_recipes_are_cycles() {
        let fixture = fixture();

        // A recipe that depends on its own published self.
        let ouroboros = Recipe::from_value(serde_json::json!({
            "metadata": {"name": "ouroboros", "tag": "0.1.0"},
            "dependencies": [{
                "kind": "recipe",
                "name": "ouroboros",
                "digest": null,
                "alias": "tail",
                "version": "0.1.0",
                "source": fixture.source
            }],
            "flow": [{
                "name": "main",
                "inputs": [],
                "tasks": [{"name": "bite", "template": "tail"}],
                "outputs": []
            }]
        }))
        .unwrap();
        publish(&fixture.repo_path, &PackageManifest::Recipe(ouroboros));
        reindex(&fixture.repo_path);

        fs_err::write(
            fixture.recipe_folder.join("dependencies.yaml"),
            format!(
                "dependencies:\n  - kind: recipe\n    name: ouroboros\n    version: 0.1.0\n    source: {}\n",
                fixture.source
            ),
        )
        .unwrap();
        fs_err::write(
            fixture.recipe_folder.join("flow/main.yaml"),
            "name: main\ninputs: []\ntasks:\n  - {name: chase, template: ouroboros}\noutputs: []\n",
        )
        .unwrap();

        let err = install(&fixture, &LockOptions::default()).await.unwrap_err();
        assert!(matches!(err, ResolveError::CycleDetected { .. }));
    }

    #[tokio::test]
    async fn linking_replaces_the_installed_manifest() {
        let fixture = fixture();
        install(&fixture, &LockOptions::default()).await.unwrap();

        // A locally checked-out copy of the plugin with different content.
        let local = tempfile::tempdir().unwrap();
        let local_plugin = radiance_plugin("radiance:dev");
        local_plugin.to_folder(local.path()).unwrap();
        let local_digest = {
            use queenbee_manifest::ContentDigest;
            local_plugin.content_digest().unwrap()
        };

        link_dependency(&fixture.recipe_folder, "honeybee-radiance", local.path()).unwrap();

        let recipe = Recipe::from_folder(&fixture.recipe_folder).unwrap();
        assert_eq!(
            recipe.dependencies[0].digest.as_deref(),
            Some(local_digest.as_str())
        );
        let manifests = load_installed_manifests(&fixture.recipe_folder, &recipe).unwrap();
        assert!(manifests.contains_key(&local_digest));
    }
}
