//! A directed acyclic graph of tasks.

use serde::{Deserialize, Serialize};

use crate::error::ValidationIssue;
use crate::io::common::unique_name_issues;
use crate::io::{DagInput, DagOutput, TaskReturn};
use crate::reference::Reference;
use crate::task::Task;

fn default_true() -> bool {
    true
}

/// A named template composed of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    /// DAG name, unique within its recipe.
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<DagInput>,
    /// Stop scheduling new tasks as soon as one fails. Interpreted by the
    /// execution engine, carried through untouched here.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub outputs: Vec<DagOutput>,
}

impl Dag {
    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn input_by_name(&self, name: &str) -> Option<&DagInput> {
        self.inputs.iter().find(|input| input.name() == name)
    }

    /// Find the return a task reference points at.
    ///
    /// Parameter references cannot target looped tasks: the loop fans out
    /// into many runs and there is no single value to pull. Artifact
    /// references are allowed; the executor aggregates them under the
    /// task's sub folders.
    pub fn find_task_return<'a>(
        &'a self,
        reference: &Reference,
    ) -> Result<&'a TaskReturn, String> {
        let (task_name, variable) = reference
            .task_source()
            .ok_or_else(|| "not a task reference".to_string())?;

        let task = self
            .task_by_name(task_name)
            .ok_or_else(|| format!("task `{task_name}` not found in this DAG"))?;

        if reference.is_parameter_task_reference() && task.loop_.is_some() {
            return Err(format!(
                "cannot refer to parameter outputs of looped task `{task_name}`; \
                 aggregate the runs and refer to a fixed path instead"
            ));
        }

        task.return_by_name(variable).ok_or_else(|| {
            format!("task `{task_name}` does not declare a return named `{variable}`")
        })
    }

    pub(crate) fn normalize(&mut self) {
        self.inputs.sort_by(|a, b| a.name().cmp(b.name()));
        self.outputs.sort_by(|a, b| a.name().cmp(b.name()));
        self.tasks.sort_by(|a, b| a.name.cmp(&b.name));
        for input in &mut self.inputs {
            input.normalize();
        }
        for output in &mut self.outputs {
            output.normalize();
        }
        for task in &mut self.tasks {
            task.normalize();
        }
    }

    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        issues.extend(unique_name_issues(
            "task",
            self.tasks.iter().map(|task| task.name.as_str()),
        ));
        issues.extend(unique_name_issues(
            "DAG input",
            self.inputs.iter().map(DagInput::name),
        ));
        issues.extend(unique_name_issues(
            "DAG output",
            self.outputs.iter().map(DagOutput::name),
        ));

        for input in &self.inputs {
            issues.extend(input.validate());
        }
        for output in &self.outputs {
            issues.extend(output.validate());
        }
        for task in &self.tasks {
            issues.extend(task.validate());
            issues.extend(self.validate_task_scope(task));
        }
        issues.extend(self.validate_output_sources());

        issues
    }

    /// Scope checks that need the whole DAG: `needs` resolution, input
    /// references against the DAG's own inputs, and task references
    /// against sibling returns.
    fn validate_task_scope(&self, task: &Task) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for need in &task.needs {
            if self.task_by_name(need).is_none() {
                issues.push(ValidationIssue::UnknownNeed {
                    task: task.name.clone(),
                    dependency: need.clone(),
                });
            }
        }

        // A task cannot use its own DAG as a template.
        if task.template.split('/').next() == Some(self.name.as_str()) {
            issues.push(ValidationIssue::UnresolvedTemplate {
                task: task.name.clone(),
                template: task.template.clone(),
                reason: "refers to the task's own DAG".to_string(),
            });
        }

        let mut check_reference = |reference: &Reference, context: String| {
            if let Some(variable) = reference.input_variable() {
                if self.input_by_name(variable).is_none() {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: reference
                            .to_ref_string()
                            .unwrap_or_else(|| variable.to_string()),
                        context,
                        reason: format!("`{variable}` is not an input of DAG `{}`", self.name),
                    });
                }
            } else if reference.task_source().is_some() {
                if let Err(reason) = self.find_task_return(reference) {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: reference.to_ref_string().unwrap_or_default(),
                        context,
                        reason,
                    });
                }
            }
        };

        for argument in &task.arguments {
            check_reference(
                argument.from_ref(),
                format!("argument `{}` of task `{}`", argument.name(), task.name),
            );
        }
        if let Some(task_loop) = &task.loop_ {
            check_reference(&task_loop.from_, format!("loop of task `{}`", task.name));
        }

        issues
    }

    fn validate_output_sources(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for output in &self.outputs {
            let reference = output.from_ref();
            if reference.task_source().is_some() {
                if let Err(reason) = self.find_task_return(reference) {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: reference.to_ref_string().unwrap_or_default(),
                        context: format!("output `{}`", output.name()),
                        reason,
                    });
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn two_task_dag() -> serde_json::Value {
        serde_json::json!({
            "name": "main",
            "inputs": [
                {"type": "DAGStringInput", "name": "grid", "default": "room"}
            ],
            "tasks": [
                {
                    "name": "a",
                    "template": "honeybee-radiance/rtrace",
                    "arguments": [{
                        "type": "TaskArgument",
                        "name": "grid",
                        "from": {"type": "InputReference", "variable": "grid"}
                    }],
                    "returns": [{"type": "TaskReturn", "name": "result"}]
                },
                {
                    "name": "b",
                    "template": "honeybee-radiance/rtrace",
                    "needs": ["a"],
                    "arguments": [{
                        "type": "TaskArgument",
                        "name": "grid",
                        "from": {"type": "TaskReference", "name": "a", "variable": "result"}
                    }]
                }
            ]
        })
    }

    #[test]
    fn a_well_formed_dag_validates() {
        let dag: Dag = serde_json::from_value(two_task_dag()).unwrap();
        assert!(dag.validate().is_empty());
    }

    #[test]
    fn task_reference_outside_needs_is_unresolved() {
        let mut value = two_task_dag();
        value["tasks"][1]["needs"] = serde_json::json!([]);
        let dag: Dag = serde_json::from_value(value).unwrap();
        let issues = dag.validate();
        assert_eq!(issues.len(), 1);
        let message = issues[0].to_string();
        assert!(message.contains("tasks.a.result"), "got: {message}");
    }

    #[test]
    fn input_reference_must_name_a_dag_input() {
        let mut value = two_task_dag();
        value["tasks"][0]["arguments"][0]["from"]["variable"] = serde_json::json!("missing");
        let dag: Dag = serde_json::from_value(value).unwrap();
        let issues = dag.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("missing"));
    }

    #[test]
    fn parameter_references_to_looped_tasks_are_rejected() {
        let mut value = two_task_dag();
        value["tasks"][0]["loop"] = serde_json::json!({
            "from": {"type": "ValueListReference", "value": ["room", "hall"]}
        });
        let dag: Dag = serde_json::from_value(value).unwrap();
        let issues = dag.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("looped task"));
    }

    #[test]
    fn unknown_needs_are_reported() {
        let mut value = two_task_dag();
        value["tasks"][1]["needs"] = serde_json::json!(["ghost", "a"]);
        let dag: Dag = serde_json::from_value(value).unwrap();
        let issues = dag.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], ValidationIssue::UnknownNeed { .. }));
    }

    #[test]
    fn a_task_cannot_template_its_own_dag() {
        let mut value = two_task_dag();
        value["tasks"][0]["template"] = serde_json::json!("main");
        let dag: Dag = serde_json::from_value(value).unwrap();
        assert!(!dag.validate().is_empty());
    }

    #[test]
    fn duplicate_task_names_are_reported() {
        let mut value = two_task_dag();
        value["tasks"][1]["name"] = serde_json::json!("a");
        value["tasks"][1]["needs"] = serde_json::json!([]);
        value["tasks"][1]["arguments"] = serde_json::json!([]);
        let dag: Dag = serde_json::from_value(value).unwrap();
        assert!(dag
            .validate()
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::DuplicateName { .. })));
    }

    #[test]
    fn outputs_sourced_from_missing_returns_are_reported() {
        let mut value = two_task_dag();
        value["outputs"] = serde_json::json!([{
            "type": "DAGFileOutput",
            "name": "results",
            "from": {"type": "TaskFileReference", "name": "b", "variable": "missing"}
        }]);
        let dag: Dag = serde_json::from_value(value).unwrap();
        let issues = dag.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("missing"));
    }
}
