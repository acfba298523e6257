//! Typed inputs and outputs of a Function.
//!
//! These mirror the DAG descriptors without the platform alias handlers.
//! Function outputs always carry a `path`: parameter outputs are read back
//! from a file the command writes, artifact outputs expose the file or
//! folder itself.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationIssue;
use crate::io::common::{ArtifactSource, ItemType};

/// An input of a Function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FunctionInput {
    #[serde(rename = "FunctionStringInput")]
    String {
        name: String,
        description: Option<String>,
        default: Option<String>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "FunctionIntegerInput")]
    Integer {
        name: String,
        description: Option<String>,
        default: Option<i64>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "FunctionNumberInput")]
    Number {
        name: String,
        description: Option<String>,
        default: Option<f64>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "FunctionBooleanInput")]
    Boolean {
        name: String,
        description: Option<String>,
        default: Option<bool>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
    #[serde(rename = "FunctionFolderInput")]
    Folder {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        /// Where the artifact lands relative to the command's working
        /// directory.
        path: Option<String>,
    },
    #[serde(rename = "FunctionFileInput")]
    File {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        path: Option<String>,
        extensions: Option<Vec<String>>,
    },
    #[serde(rename = "FunctionPathInput")]
    Path {
        name: String,
        description: Option<String>,
        default: Option<ArtifactSource>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        path: Option<String>,
        extensions: Option<Vec<String>>,
    },
    #[serde(rename = "FunctionArrayInput")]
    Array {
        name: String,
        description: Option<String>,
        default: Option<Vec<Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
        #[serde(default)]
        items_type: ItemType,
    },
    #[serde(rename = "FunctionJSONObjectInput")]
    JsonObject {
        name: String,
        description: Option<String>,
        default: Option<Map<String, Value>>,
        #[serde(default)]
        required: bool,
        spec: Option<Value>,
    },
}

impl FunctionInput {
    pub fn name(&self) -> &str {
        match self {
            Self::String { name, .. }
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

    pub fn required(&self) -> bool {
        match self {
            Self::String { required, .. }
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

    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            Self::Folder { .. } | Self::File { .. } | Self::Path { .. }
        )
    }

    fn has_default(&self) -> bool {
        match self {
            Self::String { default, .. } => default.is_some(),
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

    pub(crate) fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if !self.has_default() && !self.required() && !self.is_artifact() {
            issues.push(ValidationIssue::MissingDefault {
                name: self.name().to_string(),
            });
        }
        issues
    }
}

/// An output of a Function, read from a path the command produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FunctionOutput {
    #[serde(rename = "FunctionStringOutput")]
    String {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionIntegerOutput")]
    Integer {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionNumberOutput")]
    Number {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionBooleanOutput")]
    Boolean {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionArrayOutput")]
    Array {
        name: String,
        description: Option<String>,
        path: String,
        #[serde(default)]
        items_type: ItemType,
    },
    #[serde(rename = "FunctionJSONObjectOutput")]
    JsonObject {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionFileOutput")]
    File {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionFolderOutput")]
    Folder {
        name: String,
        description: Option<String>,
        path: String,
    },
    #[serde(rename = "FunctionPathOutput")]
    Path {
        name: String,
        description: Option<String>,
        path: String,
    },
}

impl FunctionOutput {
    pub fn name(&self) -> &str {
        match self {
            Self::String { name, .. }
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

    pub fn path(&self) -> &str {
        match self {
            Self::String { path, .. }
            | Self::Integer { path, .. }
            | Self::Number { path, .. }
            | Self::Boolean { path, .. }
            | Self::Array { path, .. }
            | Self::JsonObject { path, .. }
            | Self::File { path, .. }
            | Self::Folder { path, .. }
            | Self::Path { path, .. } => path,
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            Self::File { .. } | Self::Folder { .. } | Self::Path { .. }
        )
    }
}
