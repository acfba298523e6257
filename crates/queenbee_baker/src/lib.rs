//! The recipe baker: merge a recipe with its resolved dependencies into a
//! self-contained baked manifest.
//!
//! Baking is a pure, deterministic transformation. Given the same recipe
//! and the same dependency manifests it produces the same baked recipe on
//! every machine:
//!
//! 1. The recipe's own DAGs are renamed to `<recipeDigest>/<name>`.
//! 2. Plugin dependencies contribute one template per function, named
//!    `<pluginDigest>/<function>` with the plugin's run configuration
//!    embedded.
//! 3. Recipe dependencies are baked recursively (memoized on their
//!    digest) and contribute their templates and renamed DAGs.
//! 4. Every task's template identifier is rewritten to its
//!    `<digest>/<member>` form, templates are de-duplicated by name, and
//!    each task is checked against the template it instantiates.
//!
//! No network or filesystem access happens here; dependency manifests
//! arrive pre-resolved, keyed by digest.

use std::collections::HashMap;

use indexmap::IndexMap;
use itertools::Itertools;
use miette::Diagnostic;
use thiserror::Error;

use queenbee_manifest::{
    BakedRecipe, ContentDigest, Dag, DependencyKind, ManifestError, Recipe, Template,
    TemplateFunction, ValidationErrors, ValidationIssue,
};
use queenbee_repository::PackageManifest;

/// Transitive dependency manifests keyed by locked digest, as produced by
/// the resolver.
pub type DependencyManifests = IndexMap<String, PackageManifest>;

/// Errors produced while baking a recipe.
#[derive(Debug, Error, Diagnostic)]
pub enum BakeError {
    #[error("dependency `{name}` is not locked; run install first")]
    #[diagnostic(code(queenbee::dep_not_found))]
    Unlocked { name: String },

    #[error("no manifest available for dependency `{name}` (digest `{digest}`)")]
    #[diagnostic(code(queenbee::dep_not_found))]
    MissingManifest { name: String, digest: String },

    #[error("dependency `{name}` is declared as a {declared} but its manifest is a {actual}")]
    #[diagnostic(code(queenbee::schema_violation))]
    KindMismatch {
        name: String,
        declared: DependencyKind,
        actual: DependencyKind,
    },

    #[error("failed to serialize manifest: {message}")]
    #[diagnostic(code(queenbee::parse_error))]
    Serialize { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),
}

impl From<ValidationErrors> for BakeError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Manifest(ManifestError::Validation(errors))
    }
}

/// Bake a recipe against its resolved dependency manifests.
pub fn bake(recipe: &Recipe, manifests: &DependencyManifests) -> Result<BakedRecipe, BakeError> {
    let digest = recipe
        .content_digest()
        .map_err(|err| BakeError::Serialize {
            message: err.to_string(),
        })?;
    let mut memo = HashMap::new();
    bake_with_digest(recipe, &digest, manifests, &mut memo)
}

/// Bake a recipe whose digest is already known: for dependencies that is
/// the digest recorded in the lock, not one recomputed from the (possibly
/// re-locked) in-memory copy.
fn bake_with_digest(
    recipe: &Recipe,
    digest: &str,
    manifests: &DependencyManifests,
    memo: &mut HashMap<String, BakedRecipe>,
) -> Result<BakedRecipe, BakeError> {
    let mut templates = Vec::new();

    for dependency in &recipe.dependencies {
        let dep_digest = dependency
            .digest
            .as_ref()
            .ok_or_else(|| BakeError::Unlocked {
                name: dependency.ref_name().to_string(),
            })?;
        let manifest =
            manifests
                .get(dep_digest)
                .ok_or_else(|| BakeError::MissingManifest {
                    name: dependency.ref_name().to_string(),
                    digest: dep_digest.clone(),
                })?;

        match (dependency.kind, manifest) {
            (DependencyKind::Plugin, PackageManifest::Plugin(plugin)) => {
                templates.extend(
                    TemplateFunction::from_plugin(plugin, dep_digest)
                        .into_iter()
                        .map(Template::Function),
                );
            }
            (DependencyKind::Recipe, PackageManifest::Recipe(sub_recipe)) => {
                let baked = match memo.get(dep_digest) {
                    Some(baked) => baked.clone(),
                    None => {
                        tracing::debug!(
                            dependency = dependency.ref_name(),
                            digest = %dep_digest,
                            "baking recipe dependency"
                        );
                        let baked =
                            bake_with_digest(sub_recipe, dep_digest, manifests, memo)?;
                        memo.insert(dep_digest.clone(), baked.clone());
                        baked
                    }
                };
                templates.extend(baked.templates);
                templates.extend(baked.flow.into_iter().map(Template::Dag));
            }
            (declared, manifest) => {
                return Err(BakeError::KindMismatch {
                    name: dependency.ref_name().to_string(),
                    declared,
                    actual: manifest.kind(),
                });
            }
        }
    }

    let (flow, rewrite_issues) = rewrite_flow(recipe, digest);
    if !rewrite_issues.is_empty() {
        return Err(ValidationErrors {
            kind: "baked recipe",
            name: recipe.metadata.name.clone(),
            issues: rewrite_issues,
        }
        .into());
    }

    // Identical names are guaranteed identical content: template names
    // embed the content digest of the package they came from.
    let templates: Vec<Template> = templates
        .into_iter()
        .unique_by(|template| template.name().to_string())
        .collect();

    let value = serde_json::json!({
        "metadata": recipe.metadata,
        "dependencies": recipe.dependencies,
        "digest": digest,
        "flow": flow,
        "templates": templates,
    });
    Ok(BakedRecipe::from_value(value)?)
}

/// Rename the recipe's DAGs to `<digest>/<name>` and rewrite every task
/// template to its fully-qualified form.
fn rewrite_flow(recipe: &Recipe, digest: &str) -> (Vec<Dag>, Vec<ValidationIssue>) {
    let dag_names: Vec<String> = recipe.flow.iter().map(|dag| dag.name.clone()).collect();
    let mut issues = Vec::new();

    let mut flow = recipe.flow.clone();
    for dag in &mut flow {
        for task in &mut dag.tasks {
            let segments: Vec<&str> = task.template.split('/').collect();
            let head = segments[0];

            // A sibling DAG of this recipe.
            if dag_names.iter().any(|name| name == head) {
                task.template = format!("{digest}/{head}");
                continue;
            }

            let Some(dependency) = recipe.dependency_by_ref_name(head) else {
                issues.push(ValidationIssue::UnresolvedTemplate {
                    task: task.name.clone(),
                    template: task.template.clone(),
                    reason: format!(
                        "`{head}` is neither a DAG of this recipe nor a declared dependency"
                    ),
                });
                continue;
            };
            let Some(dep_digest) = dependency.digest.as_deref() else {
                issues.push(ValidationIssue::UnresolvedTemplate {
                    task: task.name.clone(),
                    template: task.template.clone(),
                    reason: format!("dependency `{head}` is not locked"),
                });
                continue;
            };

            match (dependency.kind, segments.len()) {
                // A recipe dependency stands for its own `main` DAG.
                (DependencyKind::Recipe, 1) => {
                    task.template = format!("{dep_digest}/main");
                }
                (DependencyKind::Plugin, 2) => {
                    task.template = format!("{dep_digest}/{}", segments[1]);
                }
                (DependencyKind::Recipe, _) => issues.push(ValidationIssue::UnresolvedTemplate {
                    task: task.name.clone(),
                    template: task.template.clone(),
                    reason: "recipe dependencies are used by their bare ref-name".to_string(),
                }),
                (DependencyKind::Plugin, _) => issues.push(ValidationIssue::UnresolvedTemplate {
                    task: task.name.clone(),
                    template: task.template.clone(),
                    reason: "plugin templates must be `<dependency>/<function>`".to_string(),
                }),
            }
        }
        dag.name = format!("{digest}/{}", dag.name);
    }

    (flow, issues)
}

#[cfg(test)]
mod tests {
    use queenbee_manifest::Plugin;

    use super::*;

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

    fn plugin_digest(plugin: &Plugin) -> String {
        plugin.content_digest().unwrap()
    }

    fn df_recipe(plugin_digest: &str) -> Recipe {
        Recipe::from_value(serde_json::json!({
            "metadata": {"name": "df", "tag": "0.1.0"},
            "dependencies": [{
                "kind": "plugin",
                "name": "honeybee-radiance",
                "digest": plugin_digest,
                "alias": null,
                "version": "1.0.0",
                "source": "file:../repo"
            }],
            "flow": [{
                "name": "main",
                "inputs": [{
                    "type": "DAGFileInput",
                    "name": "grid",
                    "required": true
                }],
                "tasks": [{
                    "name": "simulate",
                    "template": "honeybee-radiance/rtrace",
                    "arguments": [{
                        "type": "TaskPathArgument",
                        "name": "grid",
                        "from": {"type": "InputFileReference", "variable": "grid"},
                        "sub_path": null
                    }],
                    "returns": [{"type": "TaskPathReturn", "name": "result", "path": "output.res"}]
                }],
                "outputs": []
            }]
        }))
        .unwrap()
    }

    fn manifests_with(plugin: Plugin) -> DependencyManifests {
        let digest = plugin_digest(&plugin);
        let mut manifests = DependencyManifests::new();
        manifests.insert(digest, PackageManifest::Plugin(plugin));
        manifests
    }

    #[test]
    fn baking_inlines_plugin_functions_and_rewrites_templates() {
        let plugin = radiance_plugin();
        let plugin_digest = plugin_digest(&plugin);
        let recipe = df_recipe(&plugin_digest);
        let recipe_digest = recipe.content_digest().unwrap();

        let baked = bake(&recipe, &manifests_with(plugin)).unwrap();

        assert_eq!(baked.digest, recipe_digest);
        assert_eq!(baked.flow[0].name, format!("{recipe_digest}/main"));
        assert_eq!(
            baked.flow[0].tasks[0].template,
            format!("{plugin_digest}/rtrace")
        );
        let template_names: Vec<_> = baked
            .templates
            .iter()
            .map(|template| template.name().to_string())
            .collect();
        assert_eq!(template_names, vec![format!("{plugin_digest}/rtrace")]);

        // The inlined function embeds the plugin's run configuration.
        let Template::Function(function) = &baked.templates[0] else {
            panic!("expected a function template");
        };
        assert_eq!(
            function.config.docker.as_ref().unwrap().image,
            "radiance:5.4"
        );
    }

    #[test]
    fn baking_is_deterministic() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let recipe = df_recipe(&digest);

        let first = bake(&recipe, &manifests_with(plugin.clone())).unwrap();
        let second = bake(&recipe, &manifests_with(plugin)).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.content_digest().unwrap(),
            second.content_digest().unwrap()
        );
    }

    #[test]
    fn unlocked_dependencies_cannot_bake() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let mut recipe = df_recipe(&digest);
        recipe.dependencies[0].digest = None;

        let err = bake(&recipe, &manifests_with(plugin)).unwrap_err();
        assert!(matches!(err, BakeError::Unlocked { .. }));
    }

    #[test]
    fn missing_manifests_cannot_bake() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let recipe = df_recipe(&digest);

        let err = bake(&recipe, &DependencyManifests::new()).unwrap_err();
        assert!(matches!(err, BakeError::MissingManifest { .. }));
    }

    #[test]
    fn missing_required_arguments_fail_the_bake() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let mut recipe = df_recipe(&digest);
        recipe.flow[0].tasks[0].arguments.clear();

        let err = bake(&recipe, &manifests_with(plugin)).unwrap_err();
        let BakeError::Manifest(ManifestError::Validation(errors)) = err else {
            panic!("expected a validation batch");
        };
        assert!(errors
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::MissingArgument { .. })));
    }

    #[test]
    fn unknown_plugin_functions_fail_the_bake() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let mut recipe = df_recipe(&digest);
        recipe.flow[0].tasks[0].template = "honeybee-radiance/rcontrib".to_string();

        let err = bake(&recipe, &manifests_with(plugin)).unwrap_err();
        let BakeError::Manifest(ManifestError::Validation(errors)) = err else {
            panic!("expected a validation batch");
        };
        assert!(errors
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::UnresolvedTemplate { .. })));
    }

    #[test]
    fn recipe_dependencies_inline_their_flow_and_templates() {
        let plugin = radiance_plugin();
        let plugin_digest = plugin_digest(&plugin);

        // A published recipe that wraps the plugin.
        let sub_recipe = df_recipe(&plugin_digest);
        let sub_digest = sub_recipe.content_digest().unwrap();

        let root = Recipe::from_value(serde_json::json!({
            "metadata": {"name": "study", "tag": "1.0.0"},
            "dependencies": [{
                "kind": "recipe",
                "name": "df",
                "digest": sub_digest,
                "alias": null,
                "version": "0.1.0",
                "source": "file:../repo"
            }],
            "flow": [{
                "name": "main",
                "inputs": [{
                    "type": "DAGFileInput",
                    "name": "model",
                    "required": true
                }],
                "tasks": [{
                    "name": "daylight-factor",
                    "template": "df",
                    "arguments": [{
                        "type": "TaskPathArgument",
                        "name": "grid",
                        "from": {"type": "InputFileReference", "variable": "model"},
                        "sub_path": null
                    }]
                }],
                "outputs": []
            }]
        }))
        .unwrap();

        let mut manifests = manifests_with(plugin);
        manifests.insert(sub_digest.clone(), PackageManifest::Recipe(sub_recipe));

        let baked = bake(&root, &manifests).unwrap();

        // The task now points at the sub-recipe's renamed entrypoint.
        assert_eq!(
            baked.flow[0].tasks[0].template,
            format!("{sub_digest}/main")
        );
        // Both the sub-recipe's DAG and the plugin function are inlined.
        let names: Vec<_> = baked
            .templates
            .iter()
            .map(|template| template.name().to_string())
            .collect();
        assert!(names.contains(&format!("{sub_digest}/main")));
        assert!(names.contains(&format!("{plugin_digest}/rtrace")));
    }

    #[test]
    fn shared_dependencies_deduplicate_by_name() {
        let plugin = radiance_plugin();
        let plugin_digest = plugin_digest(&plugin);

        let sub_recipe = df_recipe(&plugin_digest);
        let sub_digest = sub_recipe.content_digest().unwrap();

        // The root uses the plugin directly and through the sub-recipe.
        let root = Recipe::from_value(serde_json::json!({
            "metadata": {"name": "study", "tag": "1.0.0"},
            "dependencies": [
                {
                    "kind": "recipe",
                    "name": "df",
                    "digest": sub_digest,
                    "alias": null,
                    "version": "0.1.0",
                    "source": "file:../repo"
                },
                {
                    "kind": "plugin",
                    "name": "honeybee-radiance",
                    "digest": plugin_digest,
                    "alias": null,
                    "version": "1.0.0",
                    "source": "file:../repo"
                }
            ],
            "flow": [{
                "name": "main",
                "inputs": [{
                    "type": "DAGFileInput",
                    "name": "model",
                    "required": true
                }],
                "tasks": [
                    {
                        "name": "daylight-factor",
                        "template": "df",
                        "arguments": [{
                            "type": "TaskPathArgument",
                            "name": "grid",
                            "from": {"type": "InputFileReference", "variable": "model"},
                            "sub_path": null
                        }]
                    },
                    {
                        "name": "simulate",
                        "template": "honeybee-radiance/rtrace",
                        "arguments": [{
                            "type": "TaskPathArgument",
                            "name": "grid",
                            "from": {"type": "InputFileReference", "variable": "model"},
                            "sub_path": null
                        }]
                    }
                ],
                "outputs": []
            }]
        }))
        .unwrap();

        let mut manifests = manifests_with(plugin);
        manifests.insert(sub_digest, PackageManifest::Recipe(sub_recipe));

        let baked = bake(&root, &manifests).unwrap();
        let rtrace_count = baked
            .templates
            .iter()
            .filter(|template| template.name().ends_with("/rtrace"))
            .count();
        assert_eq!(rtrace_count, 1);
    }

    #[test]
    fn kind_mismatches_are_rejected() {
        let plugin = radiance_plugin();
        let digest = plugin_digest(&plugin);
        let mut recipe = df_recipe(&digest);
        recipe.dependencies[0].kind = DependencyKind::Recipe;
        // Keep the flow consistent with a recipe dependency.
        recipe.flow[0].tasks[0].template = "honeybee-radiance".to_string();

        let err = bake(&recipe, &manifests_with(plugin)).unwrap_err();
        assert!(matches!(err, BakeError::KindMismatch { .. }));
    }
}
