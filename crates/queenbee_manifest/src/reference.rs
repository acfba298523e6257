//! References to DAG inputs, sibling task returns, loop items and literals.
//!
//! Inside manifests a value source is either written out as a tagged object
//! (the [`Reference`] model) or cited inline in a string as `{{inputs.x}}`,
//! `{{tasks.simulate.result}}` or `{{item.key}}`. This module owns both
//! representations and the parsing from one to the other.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The pattern accepted between `{{` and `}}`.
const TEMPLATE_PATTERN: &str = r"\{\{\s*([_a-zA-Z0-9.\-\$\#\?]*)\s*\}\}";

fn template_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(TEMPLATE_PATTERN).expect("the template pattern is valid"))
}

/// Extract every `{{…}}` payload from a string, in order of appearance.
pub fn template_variables(input: &str) -> Vec<String> {
    template_regex()
        .captures_iter(input)
        .map(|captures| captures[1].to_string())
        .collect()
}

/// Replace every `{{<key>}}` citation in `text` with `replacement`.
pub fn replace_template_variable(text: &str, key: &str, replacement: &str) -> String {
    let pattern = format!(r"\{{\{{\s*{}\s*\}}\}}", regex::escape(key));
    Regex::new(&pattern)
        .expect("escaped keys always form a valid pattern")
        .replace_all(text, replacement)
        .to_string()
}

/// A classified `{{…}}` citation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReference {
    /// `inputs.<name>`: an input of the enclosing DAG.
    Input { variable: String },
    /// `tasks.<task>.<variable>`: a return of a sibling task.
    Task { task: String, variable: String },
    /// `item` or `item.<path>`: the current loop item.
    Item { variable: Option<String> },
    /// Anything else (`self.*`, workflow variables). Reserved for the
    /// execution engine and passed through untouched.
    Passthrough { variable: String },
}

impl ParsedReference {
    /// Classify a single payload (the part between the braces).
    ///
    /// Returns `Err` with a human-readable reason when the payload names a
    /// known head segment but has the wrong shape.
    pub fn parse(payload: &str) -> Result<Self, String> {
        let segments: Vec<&str> = payload.split('.').collect();
        match segments[0] {
            "inputs" => {
                if segments.len() != 2 || segments[1].is_empty() {
                    return Err(format!(
                        "input references must be formatted as `inputs.<variable>`, not `{payload}`"
                    ));
                }
                Ok(Self::Input {
                    variable: segments[1].to_string(),
                })
            }
            "tasks" => {
                if segments.len() != 3 || segments[1].is_empty() || segments[2].is_empty() {
                    return Err(format!(
                        "task references must be formatted as `tasks.<task>.<variable>`, not `{payload}`"
                    ));
                }
                Ok(Self::Task {
                    task: segments[1].to_string(),
                    variable: segments[2].to_string(),
                })
            }
            "item" => {
                let variable = (segments.len() > 1).then(|| segments[1..].join("."));
                Ok(Self::Item { variable })
            }
            _ => Ok(Self::Passthrough {
                variable: payload.to_string(),
            }),
        }
    }
}

/// Classify every citation found in a string.
pub fn parse_references(input: &str) -> Result<Vec<ParsedReference>, String> {
    template_variables(input)
        .iter()
        .map(|payload| ParsedReference::parse(payload))
        .collect()
}

/// A tagged value source, as written out in manifests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reference {
    /// A DAG input parameter.
    #[serde(rename = "InputReference")]
    Input { variable: String },
    #[serde(rename = "InputFileReference")]
    InputFile { variable: String },
    #[serde(rename = "InputFolderReference")]
    InputFolder { variable: String },
    #[serde(rename = "InputPathReference")]
    InputPath { variable: String },

    /// A parameter return of another task.
    #[serde(rename = "TaskReference")]
    Task { name: String, variable: String },
    #[serde(rename = "TaskFileReference")]
    TaskFile { name: String, variable: String },
    #[serde(rename = "TaskFolderReference")]
    TaskFolder { name: String, variable: String },
    #[serde(rename = "TaskPathReference")]
    TaskPath { name: String, variable: String },

    /// The current loop item, with an optional dotted path into it.
    #[serde(rename = "ItemReference")]
    Item { variable: Option<String> },

    /// A literal value.
    #[serde(rename = "ValueReference")]
    Value { value: Value },
    /// A literal, non-empty list of values.
    #[serde(rename = "ValueListReference")]
    ValueList { value: Vec<Value> },
    #[serde(rename = "ValueFileReference")]
    ValueFile { path: String },
    #[serde(rename = "ValueFolderReference")]
    ValueFolder { path: String },

    /// A fixed path relative to the run folder.
    #[serde(rename = "FileReference")]
    File { path: String },
    #[serde(rename = "FolderReference")]
    Folder { path: String },
}

impl Reference {
    /// The DAG input variable this reference targets, if it is an input
    /// reference of any kind.
    pub fn input_variable(&self) -> Option<&str> {
        match self {
            Self::Input { variable }
            | Self::InputFile { variable }
            | Self::InputFolder { variable }
            | Self::InputPath { variable } => Some(variable),
            _ => None,
        }
    }

    /// The `(task, variable)` pair this reference targets, if it is a task
    /// reference of any kind.
    pub fn task_source(&self) -> Option<(&str, &str)> {
        match self {
            Self::Task { name, variable }
            | Self::TaskFile { name, variable }
            | Self::TaskFolder { name, variable }
            | Self::TaskPath { name, variable } => Some((name, variable)),
            _ => None,
        }
    }

    /// Whether this is a parameter (non-artifact) task reference. Only
    /// these are forbidden from targeting looped tasks: a looped task runs
    /// many times and has no single parameter value to pull.
    pub fn is_parameter_task_reference(&self) -> bool {
        matches!(self, Self::Task { .. })
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Self::Item { .. })
    }

    /// Whether the referenced value is a file, folder or path artifact.
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            Self::InputFile { .. }
                | Self::InputFolder { .. }
                | Self::InputPath { .. }
                | Self::TaskFile { .. }
                | Self::TaskFolder { .. }
                | Self::TaskPath { .. }
                | Self::ValueFile { .. }
                | Self::ValueFolder { .. }
                | Self::File { .. }
                | Self::Folder { .. }
        )
    }

    /// The fixed path carried by file/folder literals, if any.
    pub fn literal_path(&self) -> Option<&str> {
        match self {
            Self::ValueFile { path }
            | Self::ValueFolder { path }
            | Self::File { path }
            | Self::Folder { path } => Some(path),
            _ => None,
        }
    }

    /// Render the `{{…}}` citation equivalent to this reference, when one
    /// exists (literals have none).
    pub fn to_ref_string(&self) -> Option<String> {
        if let Some(variable) = self.input_variable() {
            return Some(format!("{{{{inputs.{variable}}}}}"));
        }
        if let Some((task, variable)) = self.task_source() {
            return Some(format!("{{{{tasks.{task}.{variable}}}}}"));
        }
        if let Self::Item { variable } = self {
            return Some(match variable {
                Some(variable) => format!("{{{{item.{variable}}}}}"),
                None => "{{item}}".to_string(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn payloads_are_extracted_in_order() {
        let command = "rtrace -h {{inputs.radiance-parameters}} < {{inputs.grid}} > out.res";
        assert_eq!(
            template_variables(command),
            vec!["inputs.radiance-parameters", "inputs.grid"]
        );
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        assert_eq!(template_variables("{{ inputs.grid }}"), vec!["inputs.grid"]);
    }

    #[rstest]
    #[case("inputs.grid", ParsedReference::Input { variable: "grid".to_string() })]
    #[case(
        "tasks.simulate.result",
        ParsedReference::Task { task: "simulate".to_string(), variable: "result".to_string() }
    )]
    #[case("item", ParsedReference::Item { variable: None })]
    #[case("item.key.sub", ParsedReference::Item { variable: Some("key.sub".to_string()) })]
    #[case(
        "self.id",
        ParsedReference::Passthrough { variable: "self.id".to_string() }
    )]
    fn payloads_classify(#[case] payload: &str, #[case] expected: ParsedReference) {
        assert_eq!(ParsedReference::parse(payload).unwrap(), expected);
    }

    #[rstest]
    #[case("inputs")]
    #[case("inputs.a.b")]
    #[case("tasks.simulate")]
    #[case("tasks.simulate.result.extra")]
    fn malformed_shapes_are_rejected(#[case] payload: &str) {
        assert!(ParsedReference::parse(payload).is_err());
    }

    #[test]
    fn tagged_references_round_trip() {
        let reference = Reference::TaskFile {
            name: "simulate".to_string(),
            variable: "result".to_string(),
        };
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(
            json,
            r#"{"type":"TaskFileReference","name":"simulate","variable":"result"}"#
        );
        let parsed: Reference = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reference);
    }

    #[test]
    fn unknown_discriminators_are_fatal() {
        let err =
            serde_json::from_str::<Reference>(r#"{"type":"MysteryReference","variable":"x"}"#)
                .unwrap_err();
        assert!(err.to_string().contains("MysteryReference"));
    }

    #[test]
    fn ref_strings_render_for_scoped_references() {
        let reference = Reference::Task {
            name: "simulate".to_string(),
            variable: "result".to_string(),
        };
        assert_eq!(
            reference.to_ref_string().unwrap(),
            "{{tasks.simulate.result}}"
        );
        assert_eq!(
            Reference::Value { value: Value::from(42) }.to_ref_string(),
            None
        );
    }

    #[test]
    fn replacement_substitutes_all_occurrences() {
        let text = "echo {{inputs.name}} && cat {{ inputs.name }}";
        assert_eq!(
            replace_template_variable(text, "inputs.name", "grid"),
            "echo grid && cat grid"
        );
    }
}
