//! Recipes: named, versioned packages of DAG flows with dependencies.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dag::Dag;
use crate::dependency::{Dependency, DependencyKind};
use crate::error::{ManifestError, ValidationErrors, ValidationIssue};
use crate::io::common::unique_name_issues;
use crate::metadata::Metadata;
use crate::parser::parse_file;
use crate::plugin::write_yaml;

pub const ENTRYPOINT_DAG: &str = "main";

/// The name of the folder `install` populates with dependency manifests.
pub const DEPENDENCIES_FOLDER: &str = ".dependencies";

/// A DAG workflow package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub metadata: Metadata,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// The DAG templates of this recipe; one must be named `main`.
    pub flow: Vec<Dag>,
}

impl Recipe {
    /// Load a recipe from its folder layout:
    ///
    /// ```text
    /// <recipe>/
    ///   recipe.yaml         # metadata
    ///   dependencies.yaml   # { dependencies: [...] }
    ///   flow/<dag>.yaml     # one file per DAG
    /// ```
    pub fn from_folder(folder: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let folder = folder.as_ref();
        let metadata = parse_file(folder.join("recipe.yaml"))?;
        let dependencies = parse_file(folder.join("dependencies.yaml"))?
            .get("dependencies")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));

        let flow_dir = folder.join("flow");
        let mut dag_files: Vec<_> = fs_err::read_dir(&flow_dir)
            .map_err(|err| ManifestError::io(&flow_dir, err))?
            .collect::<Result<_, _>>()
            .map_err(|err| ManifestError::io(&flow_dir, err))?;
        dag_files.sort_by_key(|entry| entry.file_name());

        let mut flow = Vec::with_capacity(dag_files.len());
        for entry in dag_files {
            flow.push(parse_file(entry.path())?);
        }

        let value = serde_json::json!({
            "metadata": metadata,
            "dependencies": dependencies,
            "flow": flow,
        });
        Self::from_value(value)
    }

    /// Deserialize, normalize and validate a recipe from an untyped value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
        let mut recipe: Self =
            serde_json::from_value(value).map_err(|err| ManifestError::Parse {
                kind: "recipe",
                message: err.to_string(),
            })?;
        recipe.normalize();
        recipe.validate()?;
        Ok(recipe)
    }

    /// Parse a recipe from raw manifest bytes (JSON).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let value = serde_json::from_slice(bytes).map_err(|err| ManifestError::Parse {
            kind: "recipe",
            message: err.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Write the recipe back to its folder layout.
    pub fn to_folder(&self, folder: impl AsRef<Path>) -> Result<(), ManifestError> {
        let folder = folder.as_ref();
        let flow_dir = folder.join("flow");
        fs_err::create_dir_all(&flow_dir).map_err(|err| ManifestError::io(&flow_dir, err))?;

        write_yaml(&folder.join("recipe.yaml"), &self.metadata)?;
        self.write_dependency_file(folder)?;
        for dag in &self.flow {
            write_yaml(&flow_dir.join(format!("{}.yaml", dag.name)), dag)?;
        }
        Ok(())
    }

    /// Persist the dependencies section (the lockfile) to
    /// `dependencies.yaml`.
    pub fn write_dependency_file(&self, folder: impl AsRef<Path>) -> Result<(), ManifestError> {
        #[derive(Serialize)]
        struct DependencyFile<'a> {
            dependencies: &'a [Dependency],
        }
        write_yaml(
            &folder.as_ref().join("dependencies.yaml"),
            &DependencyFile {
                dependencies: &self.dependencies,
            },
        )
    }

    pub fn dag_by_name(&self, name: &str) -> Option<&Dag> {
        self.flow.iter().find(|dag| dag.name == name)
    }

    pub fn dependency_by_ref_name(&self, name: &str) -> Option<&Dependency> {
        self.dependencies
            .iter()
            .find(|dependency| dependency.ref_name() == name)
    }

    /// Whether every dependency carries a locked digest.
    pub fn is_locked(&self) -> bool {
        self.dependencies.iter().all(Dependency::is_locked)
    }

    pub(crate) fn normalize(&mut self) {
        self.flow.sort_by(|a, b| a.name.cmp(&b.name));
        for dag in &mut self.flow {
            dag.normalize();
        }
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut issues = Vec::new();

        if self.dag_by_name(ENTRYPOINT_DAG).is_none() {
            issues.push(ValidationIssue::MissingMainDag);
        }
        issues.extend(unique_name_issues(
            "DAG",
            self.flow.iter().map(|dag| dag.name.as_str()),
        ));
        issues.extend(unique_name_issues(
            "dependency",
            self.dependencies.iter().map(Dependency::ref_name),
        ));

        for dag in &self.flow {
            issues.extend(dag.validate());
            for task in &dag.tasks {
                issues.extend(self.validate_template_name(&dag.name, &task.name, &task.template));
            }
        }

        ValidationErrors::from_issues("recipe", &self.metadata.name, issues)
    }

    /// Check a task's template identifier against the recipe's own DAGs
    /// and declared dependencies. Whether a plugin dependency actually
    /// exposes the named function is only known at bake time.
    fn validate_template_name(
        &self,
        dag_name: &str,
        task_name: &str,
        template: &str,
    ) -> Vec<ValidationIssue> {
        let segments: Vec<&str> = template.split('/').collect();
        let head = segments[0];

        if self.dag_by_name(head).is_some() {
            // Local DAG: a bare name, nothing to select inside it.
            if segments.len() != 1 && head != dag_name {
                return vec![ValidationIssue::UnresolvedTemplate {
                    task: task_name.to_string(),
                    template: template.to_string(),
                    reason: "names a local DAG and cannot select a member".to_string(),
                }];
            }
            return Vec::new();
        }

        match self.dependency_by_ref_name(head) {
            Some(dependency) => match (dependency.kind, segments.len()) {
                (DependencyKind::Recipe, 1) | (DependencyKind::Plugin, 2) => Vec::new(),
                (DependencyKind::Recipe, _) => vec![ValidationIssue::UnresolvedTemplate {
                    task: task_name.to_string(),
                    template: template.to_string(),
                    reason: "recipe dependencies are used by their bare ref-name".to_string(),
                }],
                (DependencyKind::Plugin, _) => vec![ValidationIssue::UnresolvedTemplate {
                    task: task_name.to_string(),
                    template: template.to_string(),
                    reason: "plugin templates must be `<dependency>/<function>`".to_string(),
                }],
            },
            None => vec![ValidationIssue::UnresolvedTemplate {
                task: task_name.to_string(),
                template: template.to_string(),
                reason: format!(
                    "`{head}` is neither a DAG of this recipe nor a declared dependency"
                ),
            }],
        }
    }
}
