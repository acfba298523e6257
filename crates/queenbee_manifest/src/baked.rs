//! Baked recipes: self-contained manifests with dependencies inlined.

use serde::{Deserialize, Serialize};

use crate::dag::Dag;
use crate::dependency::Dependency;
use crate::error::{ManifestError, ValidationErrors, ValidationIssue};
use crate::function::Function;
use crate::io::common::unique_name_issues;
use crate::metadata::Metadata;
use crate::plugin::{Plugin, PluginConfig};
use crate::task::Task;

/// A function inlined into a baked recipe together with the run
/// configuration of the plugin it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateFunction {
    #[serde(flatten)]
    pub function: Function,
    pub config: PluginConfig,
}

impl TemplateFunction {
    /// Clone every function of a plugin under `<digest>/<function>` names,
    /// embedding the plugin's run configuration.
    pub fn from_plugin(plugin: &Plugin, digest: &str) -> Vec<Self> {
        plugin
            .functions
            .iter()
            .map(|function| {
                let mut function = function.clone();
                function.name = format!("{digest}/{}", function.name);
                Self {
                    function,
                    config: plugin.config.clone(),
                }
            })
            .collect()
    }
}

/// A template available to tasks of a baked recipe: an inlined function or
/// an inlined DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    Function(TemplateFunction),
    Dag(Dag),
}

impl Template {
    pub fn name(&self) -> &str {
        match self {
            Self::Function(function) => &function.function.name,
            Self::Dag(dag) => &dag.name,
        }
    }

    /// `(name, required, is_artifact)` for every input of the template.
    fn input_summaries(&self) -> Vec<(&str, bool, bool)> {
        match self {
            Self::Function(function) => function
                .function
                .inputs
                .iter()
                .map(|input| (input.name(), input.required(), input.is_artifact()))
                .collect(),
            Self::Dag(dag) => dag
                .inputs
                .iter()
                .map(|input| (input.name(), input.required(), input.is_artifact()))
                .collect(),
        }
    }

    /// Whether the named output exists, and if so whether it is an
    /// artifact.
    fn output_is_artifact(&self, name: &str) -> Option<bool> {
        match self {
            Self::Function(function) => function
                .function
                .outputs
                .iter()
                .find(|output| output.name() == name)
                .map(|output| output.is_artifact()),
            Self::Dag(dag) => dag
                .outputs
                .iter()
                .find(|output| output.name() == name)
                .map(|output| output.is_artifact()),
        }
    }
}

/// Check one task against the template it instantiates.
///
/// Collected issues cover the three template laws: required inputs are
/// bound, returns exist as template outputs, and parameter/artifact kinds
/// agree on both sides.
pub fn check_task_against_template(task: &Task, template: &Template) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for (input, required, declared_artifact) in template.input_summaries() {
        match task.argument_by_name(input) {
            None if required => issues.push(ValidationIssue::MissingArgument {
                task: task.name.clone(),
                template: template.name().to_string(),
                input: input.to_string(),
            }),
            None => {}
            Some(argument) => {
                if argument.is_artifact() != declared_artifact {
                    issues.push(ValidationIssue::ArgumentKindMismatch {
                        task: task.name.clone(),
                        template: template.name().to_string(),
                        name: input.to_string(),
                        bound: kind_name(argument.is_artifact()),
                        declared: kind_name(declared_artifact),
                    });
                }
            }
        }
    }

    for ret in &task.returns {
        match template.output_is_artifact(ret.name()) {
            None => issues.push(ValidationIssue::UnknownReturn {
                task: task.name.clone(),
                template: template.name().to_string(),
                name: ret.name().to_string(),
            }),
            Some(declared_artifact) => {
                if ret.is_artifact() != declared_artifact {
                    issues.push(ValidationIssue::ArgumentKindMismatch {
                        task: task.name.clone(),
                        template: template.name().to_string(),
                        name: ret.name().to_string(),
                        bound: kind_name(ret.is_artifact()),
                        declared: kind_name(declared_artifact),
                    });
                }
            }
        }
    }

    issues
}

fn kind_name(is_artifact: bool) -> &'static str {
    if is_artifact { "an artifact" } else { "a parameter" }
}

/// A recipe whose dependencies have been inlined and whose template names
/// have been rewritten to globally-unique `<digest>/<member>` identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakedRecipe {
    pub metadata: Metadata,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Digest of the source recipe's manifest.
    pub digest: String,
    pub flow: Vec<Dag>,
    /// Flattened collection of every transitive function and inner DAG.
    pub templates: Vec<Template>,
}

impl BakedRecipe {
    /// Deserialize, normalize and validate a baked recipe.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
        let mut baked: Self = serde_json::from_value(value).map_err(|err| ManifestError::Parse {
            kind: "baked recipe",
            message: err.to_string(),
        })?;
        baked.normalize();
        baked.validate()?;
        Ok(baked)
    }

    /// Parse a baked recipe from raw manifest bytes (JSON).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let value = serde_json::from_slice(bytes).map_err(|err| ManifestError::Parse {
            kind: "baked recipe",
            message: err.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Look up a template by its fully-qualified name, in either the
    /// inlined templates or the recipe's own flow.
    pub fn template_by_name(&self, name: &str) -> Option<Template> {
        if let Some(template) = self
            .templates
            .iter()
            .find(|template| template.name() == name)
        {
            return Some(template.clone());
        }
        self.flow
            .iter()
            .find(|dag| dag.name == name)
            .map(|dag| Template::Dag(dag.clone()))
    }

    pub(crate) fn normalize(&mut self) {
        self.flow.sort_by(|a, b| a.name.cmp(&b.name));
        self.templates.sort_by(|a, b| a.name().cmp(b.name()));
        for dag in &mut self.flow {
            dag.normalize();
        }
    }

    /// After baking no dangling references may remain: every task template
    /// resolves to exactly one entry, and every task satisfies its
    /// template.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut issues = Vec::new();

        issues.extend(unique_name_issues(
            "template",
            self.templates.iter().map(Template::name),
        ));
        issues.extend(unique_name_issues(
            "DAG",
            self.flow.iter().map(|dag| dag.name.as_str()),
        ));
        if !self
            .flow
            .iter()
            .any(|dag| dag.name == crate::recipe::ENTRYPOINT_DAG || dag.name.ends_with("/main"))
        {
            issues.push(ValidationIssue::MissingMainDag);
        }

        for dag in &self.flow {
            issues.extend(dag.validate());
            for task in &dag.tasks {
                match self.template_by_name(&task.template) {
                    None => issues.push(ValidationIssue::UnresolvedTemplate {
                        task: task.name.clone(),
                        template: task.template.clone(),
                        reason: "does not resolve to any inlined template or flow DAG"
                            .to_string(),
                    }),
                    Some(template) => {
                        issues.extend(check_task_against_template(task, &template));
                    }
                }
            }
        }

        ValidationErrors::from_issues("baked recipe", &self.metadata.name, issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtrace_template() -> Template {
        Template::Function(
            serde_json::from_value(serde_json::json!({
                "name": "digest/rtrace",
                "description": null,
                "inputs": [
                    {"type": "FunctionFileInput", "name": "grid", "required": true, "path": "grid.pts"},
                    {"type": "FunctionStringInput", "name": "radiance-parameters", "default": "-ab 2"}
                ],
                "outputs": [
                    {"type": "FunctionFileOutput", "name": "result", "path": "output.res"}
                ],
                "command": "rtrace -h {{inputs.radiance-parameters}} < {{inputs.grid}} > output.res",
                "config": {"docker": {"image": "radiance:5.4", "registry": null, "workdir": "/opt/run"}, "local": null}
            }))
            .unwrap(),
        )
    }

    fn task(value: serde_json::Value) -> Task {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn templates_parse_untagged_as_function_or_dag() {
        let Template::Function(function) = rtrace_template() else {
            panic!("expected a function template");
        };
        assert_eq!(function.function.name, "digest/rtrace");

        let dag: Template = serde_json::from_value(serde_json::json!({
            "name": "digest/main",
            "inputs": [],
            "fail_fast": true,
            "tasks": [],
            "outputs": []
        }))
        .unwrap();
        assert!(matches!(dag, Template::Dag(_)));
    }

    #[test]
    fn missing_required_arguments_are_template_mismatches() {
        let template = rtrace_template();
        let task = task(serde_json::json!({
            "name": "simulate",
            "template": "digest/rtrace",
            "arguments": []
        }));
        let issues = check_task_against_template(&task, &template);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ValidationIssue::MissingArgument { .. }));
    }

    #[test]
    fn unknown_returns_are_template_mismatches() {
        let template = rtrace_template();
        let task = task(serde_json::json!({
            "name": "simulate",
            "template": "digest/rtrace",
            "arguments": [{
                "type": "TaskPathArgument",
                "name": "grid",
                "from": {"type": "InputFileReference", "variable": "grid"},
                "sub_path": null
            }],
            "returns": [{"type": "TaskReturn", "name": "missing"}]
        }));
        let issues = check_task_against_template(&task, &template);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ValidationIssue::UnknownReturn { .. }));
    }

    #[test]
    fn kind_mismatches_are_reported_on_both_sides() {
        let template = rtrace_template();
        let task = task(serde_json::json!({
            "name": "simulate",
            "template": "digest/rtrace",
            // grid is a file input but is bound as a parameter.
            "arguments": [{
                "type": "TaskArgument",
                "name": "grid",
                "from": {"type": "ValueReference", "value": "room"}
            }],
            // result is a file output but is returned as a parameter.
            "returns": [{"type": "TaskReturn", "name": "result"}]
        }));
        let issues = check_task_against_template(&task, &template);
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|issue| matches!(issue, ValidationIssue::ArgumentKindMismatch { .. })));
    }

    #[test]
    fn optional_inputs_may_stay_unbound() {
        let template = rtrace_template();
        let task = task(serde_json::json!({
            "name": "simulate",
            "template": "digest/rtrace",
            "arguments": [{
                "type": "TaskPathArgument",
                "name": "grid",
                "from": {"type": "InputFileReference", "variable": "grid"},
                "sub_path": null
            }]
        }));
        assert!(check_task_against_template(&task, &template).is_empty());
    }
}
