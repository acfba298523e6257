//! Arguments and returns binding a task to its template.

use serde::{Deserialize, Serialize};

use crate::reference::Reference;

/// A value bound to one input of a task's template.
///
/// `TaskArgument` binds a parameter, `TaskPathArgument` an artifact; the
/// optional `sub_path` selects a file inside a referenced folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskArgument {
    #[serde(rename = "TaskArgument")]
    Parameter {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
    },
    #[serde(rename = "TaskPathArgument")]
    Path {
        name: String,
        description: Option<String>,
        #[serde(rename = "from")]
        from_: Reference,
        sub_path: Option<String>,
    },
}

impl TaskArgument {
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter { name, .. } | Self::Path { name, .. } => name,
        }
    }

    pub fn from_ref(&self) -> &Reference {
        match self {
            Self::Parameter { from_, .. } | Self::Path { from_, .. } => from_,
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::Path { .. })
    }
}

/// One output a task exposes from its template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskReturn {
    /// A parameter return.
    #[serde(rename = "TaskReturn")]
    Parameter {
        name: String,
        description: Option<String>,
    },
    /// A file or folder return, placed at `path` relative to the run
    /// folder.
    #[serde(rename = "TaskPathReturn")]
    Path {
        name: String,
        description: Option<String>,
        path: String,
    },
}

impl TaskReturn {
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter { name, .. } | Self::Path { name, .. } => name,
        }
    }

    pub fn is_artifact(&self) -> bool {
        matches!(self, Self::Path { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_parse_by_discriminator() {
        let argument: TaskArgument = serde_yaml::from_str(
            "type: TaskPathArgument\nname: grid\nfrom:\n  type: InputFileReference\n  variable: grid\nsub_path: room.pts\n",
        )
        .unwrap();
        assert!(argument.is_artifact());
        assert_eq!(argument.name(), "grid");
        assert_eq!(argument.from_ref().input_variable(), Some("grid"));
    }

    #[test]
    fn returns_parse_by_discriminator() {
        let ret: TaskReturn =
            serde_yaml::from_str("type: TaskPathReturn\nname: result\npath: output.res\n").unwrap();
        assert!(ret.is_artifact());
        assert_eq!(ret.name(), "result");
    }
}
