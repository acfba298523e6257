//! End-to-end flow: package a plugin into a repository, index it, install
//! it as a recipe dependency over `file:` transport, and bake the recipe
//! offline from its `.dependencies` folder.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use queenbee_baker::bake;
use queenbee_manifest::{ContentDigest, DependencyKind, Plugin, Recipe, Template};
use queenbee_repository::{
    pack_package, PackageManifest, RepositoryIndex, Transport, INDEX_FILE,
};
use queenbee_resolver::{install_dependencies, load_installed_manifests, LockOptions};

fn radiance_plugin() -> Plugin {
    Plugin::from_value(serde_json::json!({
        "metadata": {"name": "honeybee-radiance", "tag": "1.0.0"},
        "config": {
            "docker": {"image": "radiance:5.4", "registry": null, "workdir": "/opt/run"},
            "local": null
        },
        "functions": [{
            "name": "rtrace",
            "description": null,
            "inputs": [
                {"type": "FunctionFileInput", "name": "grid", "required": true, "path": "grid.pts"},
                {"type": "FunctionStringInput", "name": "radiance-parameters", "default": "-ab 2"}
            ],
            "outputs": [
                {"type": "FunctionFileOutput", "name": "result", "path": "output.res"}
            ],
            "command": "rtrace -h {{inputs.radiance-parameters}} < {{inputs.grid}} > output.res"
        }]
    }))
    .unwrap()
}

fn publish_plugin(repo: &Path, plugin: Plugin) -> String {
    let manifest = PackageManifest::Plugin(plugin);
    let (version, bytes) = pack_package(&manifest, None, None).unwrap();
    let subfolder = repo.join("plugins");
    fs_err::create_dir_all(&subfolder).unwrap();
    fs_err::write(subfolder.join(version.archive_name()), bytes).unwrap();

    RepositoryIndex::from_folder(repo)
        .unwrap()
        .to_file(repo.join(INDEX_FILE))
        .unwrap();
    version.digest
}

fn write_recipe_folder(folder: &Path, source: &str) {
    fs_err::create_dir_all(folder.join("flow")).unwrap();
    fs_err::write(folder.join("recipe.yaml"), "name: daylight-factor\ntag: 0.1.0\n").unwrap();
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
inputs:
  - type: DAGFileInput
    name: grid
    required: true
tasks:
  - name: simulate
    template: honeybee-radiance/rtrace
    arguments:
      - type: TaskPathArgument
        name: grid
        from: {type: InputFileReference, variable: grid}
    returns:
      - type: TaskPathReturn
        name: result
        path: output.res
outputs:
  - type: DAGFileOutput
    name: results
    from: {type: TaskFileReference, name: simulate, variable: result}
"#,
    )
    .unwrap();
}

#[tokio::test]
async fn a_recipe_bakes_into_a_self_contained_manifest() {
    let repo = tempfile::tempdir().unwrap();
    let plugin_digest = publish_plugin(repo.path(), radiance_plugin());

    let workdir = tempfile::tempdir().unwrap();
    let recipe_folder = workdir.path().join("daylight-factor");
    write_recipe_folder(&recipe_folder, &format!("file:{}", repo.path().display()));

    let recipe = install_dependencies(
        &recipe_folder,
        &Transport::new(),
        &(),
        &LockOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        recipe.dependencies[0].digest.as_deref(),
        Some(plugin_digest.as_str())
    );

    // Bake offline, from the installed manifests alone.
    let reloaded = Recipe::from_folder(&recipe_folder).unwrap();
    let recipe_digest = reloaded.content_digest().unwrap();
    let manifests = load_installed_manifests(&recipe_folder, &reloaded).unwrap();
    let baked = bake(&reloaded, &manifests).unwrap();

    assert_eq!(baked.digest, recipe_digest);
    assert_eq!(baked.flow[0].name, format!("{recipe_digest}/main"));
    assert_eq!(
        baked.flow[0].tasks[0].template,
        format!("{plugin_digest}/rtrace")
    );
    assert!(baked
        .templates
        .iter()
        .any(|template| template.name() == format!("{plugin_digest}/rtrace")));

    // The baked manifest is itself a valid manifest: it reparses and its
    // digest is reproducible.
    let value = serde_json::to_value(&baked).unwrap();
    let reparsed = queenbee_manifest::BakedRecipe::from_value(value).unwrap();
    assert_eq!(reparsed, baked);
    assert_eq!(
        reparsed.content_digest().unwrap(),
        baked.content_digest().unwrap()
    );

    // Rebaking with unchanged dependencies yields the same digest.
    let again = bake(&reloaded, &manifests).unwrap();
    assert_eq!(
        again.content_digest().unwrap(),
        baked.content_digest().unwrap()
    );

    // The inlined template kept the plugin's run configuration.
    let Some(Template::Function(function)) = baked
        .templates
        .iter()
        .find(|template| template.name().ends_with("/rtrace"))
    else {
        panic!("expected the rtrace template");
    };
    assert_eq!(
        function.config.docker.as_ref().unwrap().image,
        "radiance:5.4"
    );
}

#[tokio::test]
async fn install_is_idempotent_against_an_unchanged_repository() {
    let repo = tempfile::tempdir().unwrap();
    publish_plugin(repo.path(), radiance_plugin());

    let workdir = tempfile::tempdir().unwrap();
    let recipe_folder = workdir.path().join("daylight-factor");
    write_recipe_folder(&recipe_folder, &format!("file:{}", repo.path().display()));

    let transport = Transport::new();
    let cancel = CancellationToken::new();
    install_dependencies(&recipe_folder, &transport, &(), &LockOptions::default(), &cancel)
        .await
        .unwrap();
    let lockfile = fs_err::read_to_string(recipe_folder.join("dependencies.yaml")).unwrap();

    install_dependencies(&recipe_folder, &transport, &(), &LockOptions::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(
        lockfile,
        fs_err::read_to_string(recipe_folder.join("dependencies.yaml")).unwrap()
    );
}

#[test]
fn packaged_recipes_round_trip_through_a_repository() {
    let repo = tempfile::tempdir().unwrap();
    let plugin_digest = publish_plugin(repo.path(), radiance_plugin());

    let workdir = tempfile::tempdir().unwrap();
    let recipe_folder = workdir.path().join("daylight-factor");
    write_recipe_folder(&recipe_folder, &format!("file:{}", repo.path().display()));
    // Lock by hand so the recipe packages without a live install.
    fs_err::write(
        recipe_folder.join("dependencies.yaml"),
        format!(
            "dependencies:\n  - kind: plugin\n    name: honeybee-radiance\n    version: 1.0.0\n    source: file:{}\n    digest: {plugin_digest}\n",
            repo.path().display()
        ),
    )
    .unwrap();

    let (version, bytes) =
        queenbee_repository::package_folder(DependencyKind::Recipe, &recipe_folder, None).unwrap();
    let unpacked = queenbee_repository::unpack_package(&bytes, true, Some(&version.digest)).unwrap();

    let Some(PackageManifest::Recipe(recipe)) = unpacked.manifest else {
        panic!("expected a recipe manifest");
    };
    assert_eq!(recipe.metadata.name, "daylight-factor");
    assert_eq!(recipe.content_digest().unwrap(), version.digest);
    assert!(recipe.is_locked());
}
