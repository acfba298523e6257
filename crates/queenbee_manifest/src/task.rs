//! A single node of a DAG.

use serde::{Deserialize, Serialize};

use crate::error::ValidationIssue;
use crate::io::common::unique_name_issues;
use crate::io::{TaskArgument, TaskReturn};
use crate::reference::Reference;

/// Loop configuration: run the template once per element of an iterable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLoop {
    /// The iterable to loop over: a DAG input, a sibling task's parameter
    /// return, or a literal list.
    #[serde(rename = "from")]
    pub from_: Reference,
}

/// One task in a DAG flow, bound to a template by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task name, unique within the DAG.
    pub name: String,
    /// Template identifier: a sibling DAG's bare name, or
    /// `<dependency>/<member>` for templates pulled from dependencies.
    pub template: String,
    /// Names of tasks that must finish before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,
    /// Bindings for the template's inputs.
    #[serde(default)]
    pub arguments: Vec<TaskArgument>,
    #[serde(rename = "loop")]
    pub loop_: Option<TaskLoop>,
    /// Folder, relative to the run folder, where this task's artifacts
    /// land. May cite `{{item…}}` (when looped) or `{{arguments.<name>}}`.
    pub sub_folder: Option<String>,
    /// Template outputs this task exposes to the rest of the DAG.
    #[serde(default)]
    pub returns: Vec<TaskReturn>,
}

impl Task {
    pub fn argument_by_name(&self, name: &str) -> Option<&TaskArgument> {
        self.arguments.iter().find(|argument| argument.name() == name)
    }

    pub fn return_by_name(&self, name: &str) -> Option<&TaskReturn> {
        self.returns.iter().find(|ret| ret.name() == name)
    }

    pub(crate) fn normalize(&mut self) {
        self.arguments.sort_by(|a, b| a.name().cmp(b.name()));
        self.returns.sort_by(|a, b| a.name().cmp(b.name()));
        self.needs.sort();
    }

    /// Checks that only need the task itself; DAG-level scope checks live
    /// in [`crate::dag::Dag`].
    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        issues.extend(unique_name_issues(
            "task argument",
            self.arguments.iter().map(TaskArgument::name),
        ));
        issues.extend(unique_name_issues(
            "task return",
            self.returns.iter().map(TaskReturn::name),
        ));

        // `item` references only make sense against a loop.
        if self.loop_.is_none() {
            for argument in &self.arguments {
                if argument.from_ref().is_item() {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: "{{item}}".to_string(),
                        context: format!("argument `{}` of task `{}`", argument.name(), self.name),
                        reason: "item references require the task to declare a loop".to_string(),
                    });
                }
            }
        }

        // Referenced sibling tasks must be declared as dependencies.
        for argument in &self.arguments {
            if let Some((task, _)) = argument.from_ref().task_source() {
                if !self.needs.iter().any(|need| need == task) {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: argument
                            .from_ref()
                            .to_ref_string()
                            .unwrap_or_else(|| task.to_string()),
                        context: format!("argument `{}` of task `{}`", argument.name(), self.name),
                        reason: format!("task `{task}` is missing from `needs`"),
                    });
                }
            }
        }
        if let Some(task_loop) = &self.loop_ {
            if let Some((task, _)) = task_loop.from_.task_source() {
                if !self.needs.iter().any(|need| need == task) {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: task_loop
                            .from_
                            .to_ref_string()
                            .unwrap_or_else(|| task.to_string()),
                        context: format!("loop of task `{}`", self.name),
                        reason: format!("task `{task}` is missing from `needs`"),
                    });
                }
            }
            if let Reference::ValueList { value } = &task_loop.from_ {
                if value.is_empty() {
                    issues.push(ValidationIssue::InvalidField {
                        message: format!(
                            "loop of task `{}` iterates over an empty literal list",
                            self.name
                        ),
                    });
                }
            }
        }

        issues.extend(self.validate_sub_folder());

        issues
    }

    fn validate_sub_folder(&self) -> Vec<ValidationIssue> {
        let Some(sub_folder) = &self.sub_folder else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        let context = format!("sub_folder of task `{}`", self.name);

        for payload in crate::reference::template_variables(sub_folder) {
            if payload == "item" || payload.starts_with("item.") {
                if self.loop_.is_none() {
                    issues.push(ValidationIssue::UnresolvedReference {
                        reference: payload,
                        context: context.clone(),
                        reason: "item references require the task to declare a loop".to_string(),
                    });
                }
                continue;
            }

            let segments: Vec<&str> = payload.split('.').collect();
            if segments[0] != "arguments" || segments.len() != 2 {
                issues.push(ValidationIssue::UnresolvedReference {
                    reference: payload.clone(),
                    context: context.clone(),
                    reason: "sub_folder may only cite `item` or `arguments.<name>`".to_string(),
                });
                continue;
            }
            if self.argument_by_name(segments[1]).is_none() {
                issues.push(ValidationIssue::UnresolvedReference {
                    reference: payload.clone(),
                    context: context.clone(),
                    reason: format!("`{}` is not an argument of this task", segments[1]),
                });
            }
        }

        issues
    }
}
