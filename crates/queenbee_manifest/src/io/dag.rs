//! Typed inputs and outputs of a DAG.
//!
//! Each variant is selected by its `type` discriminator. Parameter inputs
//! must either carry a default or be marked required; file and folder
//! inputs may be optional, in which case the executor simply skips the
//! artifact. DAG I/O additionally carries opaque platform alias handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationIssue;
use crate::io::common::{dedup_aliases, ArtifactSource, ItemType};
use crate::reference::{parse_references, ParsedReference, Reference};

/// An input of a DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DagInput {
    #[serde(rename = "DAGGenericInput")]
    Generic {
        name: String,
        description: Option<String>,
        default: Option<String>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGStringInput")]
    String {
        name: String,
        description: Option<String>,
        default: Option<String>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGIntegerInput")]
    Integer {
        name: String,
        description: Option<String>,
        default: Option<i64>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGNumberInput")]
    Number {
        name: String,
        description: Option<String>,
        default: Option<f64>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGBooleanInput")]
    Boolean {
        name: String,
        description: Option<String>,
        default: Option<bool>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGFolderInput")]
    Folder {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "DAGFileInput")]
    File {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        /// Acceptable file extensions, without the leading dot.
        extensions: Option<Vec<String>>,
    },
    /// A file-or-folder input; the executor accepts either.
    #[serde(rename = "DAGPathInput")]
    Path {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        extensions: Option<Vec<String>>,
    },
    #[serde(rename = "DAGArrayInput")]
    Array {
        name: String,
        description: Option<String>,
        default: Option<Vec<Value>>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        #[serde(default)]
        items_type: ItemType,
    },
    #[serde(rename = "DAGJSONObjectInput")]
    JsonObject {
        name: String,
        description: Option<String>,
        default: Option<Map<String, Value>>,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
}

impl DagInput {
    pub fn name(&self) -> &str {
        match self {
            Self::Generic { name, .. }
            | Self::String { name, .. }
            | Self::Integer { name, .. }
            | Self::Number { name, .. }
            | Self::Boolean { name, .. }
            | Self::Folder { name, .. }
            | Self::File { name, .. }
            | Self::Path { name, .. }
            | Self::Array { name, .. }
            | Self::JsonObject { name, .. } => name,
        }
    }

    /// Whether a value must be supplied when the DAG is invoked.
    pub fn required(&self) -> bool {
        match self {
            Self::Generic { required, .. }
            | Self::String { required, .. }
            | Self::Integer { required, .. }
            | Self::Number { required, .. }
            | Self::Boolean { required, .. }
            | Self::Folder { required, .. }
            | Self::File { required, .. }
            | Self::Path { required, .. }
            | Self::Array { required, .. }
            | Self::JsonObject { required, .. } => *required,
        }
    }

    /// File, folder and path inputs are artifacts; the rest are parameters.
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            Self::Folder { .. } | Self::File { .. } | Self::Path { .. }
        )
    }

    fn has_default(&self) -> bool {
        match self {
            Self::Generic { default, .. } | Self::String { default, .. } => default.is_some(),
            Self::Integer { default, .. } => default.is_some(),
            Self::Number { default, .. } => default.is_some(),
            Self::Boolean { default, .. } => default.is_some(),
            Self::Folder { default, .. } | Self::File { default, .. } | Self::Path { default, .. } => {
                default.is_some()
            }
            Self::Array { default, .. } => default.is_some(),
            Self::JsonObject { default, .. } => default.is_some(),
        }
    }

    fn alias_mut(&mut self) -> &mut Option<Vec<Value>> {
        match self {
            Self::Generic { alias, .. }
            | Self::String { alias, .. }
            | Self::Integer { alias, .. }
            | Self::Number { alias, .. }
            | Self::Boolean { alias, .. }
            | Self::Folder { alias, .. }
            | Self::File { alias, .. }
            | Self::Path { alias, .. }
            | Self::Array { alias, .. }
            | Self::JsonObject { alias, .. } => alias,
        }
    }

    pub(crate) fn normalize(&mut self) {
        dedup_aliases(self.alias_mut());
    }

    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !self.has_default() && !self.required() {
            if self.is_artifact() {
                // Optional artifact: the executor skips it when unset.
                tracing::debug!(input = self.name(), "optional input artifact");
            } else {
                issues.push(ValidationIssue::MissingDefault {
                    name: self.name().to_string(),
                });
            }
        }

        // String defaults may cite other inputs; anything else is out of
        // scope for a default value.
        if let Self::Generic { default: Some(default), .. }
        | Self::String { default: Some(default), .. } = self
        {
            match parse_references(default) {
                Ok(references) => {
                    for reference in references {
                        if !matches!(
                            reference,
                            ParsedReference::Input { .. } | ParsedReference::Passthrough { .. }
                        ) {
                            issues.push(ValidationIssue::UnresolvedReference {
                                reference: default.clone(),
                                context: format!("default of input `{}`", self.name()),
                                reason: "defaults may only refer to other inputs".to_string(),
                            });
                        }
                    }
                }
                Err(reason) => issues.push(ValidationIssue::UnresolvedReference {
                    reference: default.clone(),
                    context: format!("default of input `{}`", self.name()),
                    reason,
                }),
            }
        }

        issues
    }
}

/// An output of a DAG, sourced `from` a task return or a fixed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DagOutput {
    #[serde(rename = "DAGGenericOutput")]
    Generic {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGStringOutput")]
    String {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGIntegerOutput")]
    Integer {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGNumberOutput")]
    Number {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGBooleanOutput")]
    Boolean {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGArrayOutput")]
    Array {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
        #[serde(default)]
        items_type: ItemType,
    },
    #[serde(rename = "DAGJSONObjectOutput")]
    JsonObject {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGFileOutput")]
    File {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGFolderOutput")]
    Folder {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
    #[serde(rename = "DAGPathOutput")]
    Path {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        alias: Option<Vec<Value>>,
    },
}

impl DagOutput {
    pub fn name(&self) -> &str {
        match self {
            Self::Generic { name, .. }
            | Self::String { name, .. }
            | Self::Integer { name, .. }
            | Self::Number { name, .. }
            | Self::Boolean { name, .. }
            | Self::Array { name, .. }
            | Self::JsonObject { name, .. }
            | Self::File { name, .. }
            | Self::Folder { name, .. }
            | Self::Path { name, .. } => name,
        }
    }

    pub fn from_ref(&self) -> &Reference {
        match self {
            Self::Generic { from_, .. }
            | Self::String { from_, .. }
            | Self::Integer { from_, .. }
            | Self::Number { from_, .. }
            | Self::Boolean { from_, .. }
            | Self::Array { from_, .. }
            | Self::JsonObject { from_, .. }
            | Self::File { from_, .. }
            | Self::Folder { from_, .. }
            | Self::Path { from_, .. } => from_,
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            Self::File { .. } | Self::Folder { .. } | Self::Path { .. }
        )
    }

    fn alias_mut(&mut self) -> &mut Option<Vec<Value>> {
        match self {
            Self::Generic { alias, .. }
            | Self::String { alias, .. }
            | Self::Integer { alias, .. }
            | Self::Number { alias, .. }
            | Self::Boolean { alias, .. }
            | Self::Array { alias, .. }
            | Self::JsonObject { alias, .. }
            | Self::File { alias, .. }
            | Self::Folder { alias, .. }
            | Self::Path { alias, .. } => alias,
        }
    }

    pub(crate) fn normalize(&mut self) {
        dedup_aliases(self.alias_mut());
    }

    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        // A fixed-path output cannot carry template citations; there is no
        // scope to resolve them against once the DAG has finished.
        if let Some(path) = self.from_ref().literal_path() {
            if !crate::reference::template_variables(path).is_empty() {
                issues.push(ValidationIssue::UnresolvedReference {
                    reference: path.to_string(),
                    context: format!("output `{}`", self.name()),
                    reason: "fixed output paths cannot use templated values".to_string(),
                });
            }
        }

        if self.from_ref().is_item() {
            issues.push(ValidationIssue::UnresolvedReference {
                reference: "{{item}}".to_string(),
                context: format!("output `{}`", self.name()),
                reason: "DAG outputs cannot source from a loop item".to_string(),
            });
        }

        issues
    }
}
