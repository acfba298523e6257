//! Plugins: a run configuration plus a set of functions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, ValidationErrors, ValidationIssue};
use crate::function::Function;
use crate::io::common::unique_name_issues;
use crate::metadata::Metadata;
use crate::parser::parse_file;

/// Configuration to run a plugin's functions in a Docker container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Image name, including its tag.
    pub image: String,
    /// Registry to pull from; Docker Hub when unset.
    pub registry: Option<String>,
    /// Working directory the entrypoint command runs in.
    pub workdir: String,
}

/// Configuration to run a plugin's functions on the local machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {}

/// How a plugin's functions are scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub docker: Option<DockerConfig>,
    pub local: Option<LocalConfig>,
}

impl PluginConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        if self.docker.is_none() && self.local.is_none() {
            vec![ValidationIssue::InvalidField {
                message: "plugin config must define a docker or local run configuration"
                    .to_string(),
            }]
        } else {
            Vec::new()
        }
    }
}

/// A named, versioned collection of functions sharing a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub metadata: Metadata,
    pub config: PluginConfig,
    pub functions: Vec<Function>,
}

impl Plugin {
    /// Load a plugin from its folder layout:
    ///
    /// ```text
    /// <plugin>/
    ///   package.yaml        # metadata
    ///   config.yaml         # run configuration
    ///   functions/<fn>.yaml # one file per function
    /// ```
    pub fn from_folder(folder: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let folder = folder.as_ref();
        let metadata = parse_file(folder.join("package.yaml"))?;
        let config = parse_file(folder.join("config.yaml"))?;

        let functions_dir = folder.join("functions");
        let mut function_files: Vec<_> = fs_err::read_dir(&functions_dir)
            .map_err(|err| ManifestError::io(&functions_dir, err))?
            .collect::<Result<_, _>>()
            .map_err(|err| ManifestError::io(&functions_dir, err))?;
        function_files.sort_by_key(|entry| entry.file_name());

        let mut functions = Vec::with_capacity(function_files.len());
        for entry in function_files {
            functions.push(parse_file(entry.path())?);
        }

        let value = serde_json::json!({
            "metadata": metadata,
            "config": config,
            "functions": functions,
        });
        Self::from_value(value)
    }

    /// Deserialize, normalize and validate a plugin from an untyped value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ManifestError> {
        let mut plugin: Self =
            serde_json::from_value(value).map_err(|err| ManifestError::Parse {
                kind: "plugin",
                message: err.to_string(),
            })?;
        plugin.normalize();
        plugin.validate()?;
        Ok(plugin)
    }

    /// Parse a plugin from raw manifest bytes (JSON).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManifestError> {
        let value = serde_json::from_slice(bytes).map_err(|err| ManifestError::Parse {
            kind: "plugin",
            message: err.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Write the plugin back to its folder layout.
    pub fn to_folder(&self, folder: impl AsRef<Path>) -> Result<(), ManifestError> {
        let folder = folder.as_ref();
        let functions_dir = folder.join("functions");
        fs_err::create_dir_all(&functions_dir)
            .map_err(|err| ManifestError::io(&functions_dir, err))?;

        write_yaml(&folder.join("package.yaml"), &self.metadata)?;
        write_yaml(&folder.join("config.yaml"), &self.config)?;
        for function in &self.functions {
            write_yaml(
                &functions_dir.join(format!("{}.yaml", function.name)),
                function,
            )?;
        }
        Ok(())
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    fn normalize(&mut self) {
        self.functions.sort_by(|a, b| a.name.cmp(&b.name));
        for function in &mut self.functions {
            function.normalize();
        }
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut issues = Vec::new();
        issues.extend(unique_name_issues(
            "function",
            self.functions.iter().map(|function| function.name.as_str()),
        ));
        issues.extend(self.config.validate());
        for function in &self.functions {
            issues.extend(function.validate());
        }
        ValidationErrors::from_issues("plugin", &self.metadata.name, issues)
    }
}

pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
    let contents = serde_yaml::to_string(value).map_err(|err| ManifestError::Parse {
        kind: "yaml",
        message: err.to_string(),
    })?;
    fs_err::write(path, contents).map_err(|err| ManifestError::io(path, err))
}
