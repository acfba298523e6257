//! A single-command leaf template.

use serde::{Deserialize, Serialize};

use crate::error::ValidationIssue;
use crate::io::common::unique_name_issues;
use crate::io::{FunctionInput, FunctionOutput};
use crate::reference::{parse_references, ParsedReference};

/// A Function runs one shell command with `{{inputs.x}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name, unique within its plugin.
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<FunctionInput>,
    #[serde(default)]
    pub outputs: Vec<FunctionOutput>,
    /// Full shell command. Chain commands with `&&` or pipe with `|`.
    pub command: String,
}

impl Function {
    pub(crate) fn normalize(&mut self) {
        self.inputs.sort_by(|a, b| a.name().cmp(b.name()));
        self.outputs.sort_by(|a, b| a.name().cmp(b.name()));
    }

    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        issues.extend(unique_name_issues(
            "function input",
            self.inputs.iter().map(FunctionInput::name),
        ));
        issues.extend(unique_name_issues(
            "function output",
            self.outputs.iter().map(FunctionOutput::name),
        ));
        for input in &self.inputs {
            issues.extend(input.validate());
        }
        issues.extend(self.validate_command_refs());

        issues
    }

    /// Every `{{…}}` in the command must cite one of the declared inputs.
    fn validate_command_refs(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let context = format!("command of function `{}`", self.name);

        match parse_references(&self.command) {
            Ok(references) => {
                for reference in references {
                    match reference {
                        ParsedReference::Input { variable } => {
                            if !self.inputs.iter().any(|input| input.name() == variable) {
                                issues.push(ValidationIssue::UnresolvedReference {
                                    reference: format!("inputs.{variable}"),
                                    context: context.clone(),
                                    reason: format!("`{variable}` is not an input of this function"),
                                });
                            }
                        }
                        ParsedReference::Passthrough { .. } => {}
                        other => {
                            let reference = match other {
                                ParsedReference::Task { task, variable } => {
                                    format!("tasks.{task}.{variable}")
                                }
                                ParsedReference::Item { variable } => match variable {
                                    Some(variable) => format!("item.{variable}"),
                                    None => "item".to_string(),
                                },
                                ParsedReference::Input { .. }
                                | ParsedReference::Passthrough { .. } => unreachable!(),
                            };
                            issues.push(ValidationIssue::UnresolvedReference {
                                reference,
                                context: context.clone(),
                                reason: "function commands can only refer to inputs".to_string(),
                            });
                        }
                    }
                }
            }
            Err(reason) => issues.push(ValidationIssue::UnresolvedReference {
                reference: self.command.clone(),
                context,
                reason,
            }),
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtrace() -> Function {
        serde_yaml::from_str(
            r#"
name: rtrace
description: Run ray tracing over a grid of sensors
inputs:
  - type: FunctionFileInput
    name: grid
    required: true
    path: grid.pts
  - type: FunctionStringInput
    name: radiance-parameters
    default: -ab 2
outputs:
  - type: FunctionFileOutput
    name: result
    path: output.res
command: rtrace -h {{inputs.radiance-parameters}} < {{inputs.grid}} > output.res
"#,
        )
        .unwrap()
    }

    #[test]
    fn a_well_formed_function_validates() {
        assert!(rtrace().validate().is_empty());
    }

    #[test]
    fn commands_may_only_cite_declared_inputs() {
        let mut function = rtrace();
        function.command = "rtrace {{inputs.missing}}".to_string();
        let issues = function.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("missing"));
    }

    #[test]
    fn duplicate_input_names_are_schema_violations() {
        let mut function = rtrace();
        let duplicate = function.inputs[0].clone();
        function.inputs.push(duplicate);
        assert!(function
            .validate()
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::DuplicateName { .. })));
    }

    #[test]
    fn task_references_in_commands_are_rejected() {
        let mut function = rtrace();
        function.command = "cat {{tasks.other.result}}".to_string();
        let issues = function.validate();
        assert_eq!(issues.len(), 1);
    }
}
