use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A single problem found while validating a manifest.
///
/// Issues are never returned on their own; they are collected into a
/// [`ValidationErrors`] batch so an author sees every problem in one pass.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ValidationIssue {
    #[error("duplicate {scope} name `{name}`")]
    #[diagnostic(code(queenbee::schema_violation))]
    DuplicateName { scope: &'static str, name: String },

    #[error("input `{name}` has no default value and is not marked as required")]
    #[diagnostic(code(queenbee::schema_violation))]
    MissingDefault { name: String },

    #[error("no DAG named `main` found in flow")]
    #[diagnostic(code(queenbee::schema_violation))]
    MissingMainDag,

    #[error("{message}")]
    #[diagnostic(code(queenbee::schema_violation))]
    InvalidField { message: String },

    #[error("task `{task}` needs `{dependency}` which is not a task in this DAG")]
    #[diagnostic(code(queenbee::schema_violation))]
    UnknownNeed { task: String, dependency: String },

    #[error("unresolved reference `{reference}` in {context}: {reason}")]
    #[diagnostic(code(queenbee::ref_unresolved))]
    UnresolvedReference {
        reference: String,
        context: String,
        reason: String,
    },

    #[error("task `{task}` uses template `{template}` which {reason}")]
    #[diagnostic(code(queenbee::ref_unresolved))]
    UnresolvedTemplate {
        task: String,
        template: String,
        reason: String,
    },

    #[error(
        "task `{task}` does not bind required input `{input}` of template `{template}`"
    )]
    #[diagnostic(code(queenbee::template_mismatch))]
    MissingArgument {
        task: String,
        template: String,
        input: String,
    },

    #[error("task `{task}` declares return `{name}` which is not an output of template `{template}`")]
    #[diagnostic(code(queenbee::template_mismatch))]
    UnknownReturn {
        task: String,
        template: String,
        name: String,
    },

    #[error(
        "task `{task}` binds `{name}` as {bound} but template `{template}` declares it as {declared}"
    )]
    #[diagnostic(code(queenbee::template_mismatch))]
    ArgumentKindMismatch {
        task: String,
        template: String,
        name: String,
        bound: &'static str,
        declared: &'static str,
    },
}

/// Every problem found in one manifest, reported as a batch.
#[derive(Debug, Error, Diagnostic)]
#[error("invalid {kind} manifest `{name}`")]
pub struct ValidationErrors {
    /// The manifest kind, e.g. `plugin` or `recipe`.
    pub kind: &'static str,
    /// Name of the offending manifest.
    pub name: String,
    #[related]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationErrors {
    /// Wrap a non-empty list of issues; `Ok(())` when there is nothing to report.
    pub fn from_issues(
        kind: &'static str,
        name: impl Into<String>,
        issues: Vec<ValidationIssue>,
    ) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self {
                kind,
                name: name.into(),
                issues,
            })
        }
    }
}

/// Errors produced while loading, parsing or validating manifests.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("failed to read `{path}`")]
    #[diagnostic(code(queenbee::io_error))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{path}`: {message}")]
    #[diagnostic(code(queenbee::parse_error))]
    ParseFile { path: PathBuf, message: String },

    #[error("failed to parse {kind} manifest: {message}")]
    #[diagnostic(code(queenbee::parse_error))]
    Parse { kind: &'static str, message: String },

    #[error("`{path}` has unsupported extension; only JSON and YAML files are valid")]
    #[diagnostic(code(queenbee::parse_error))]
    UnsupportedExtension { path: PathBuf },

    #[error("`import_from` cycle detected: `{path}` is already being imported")]
    #[diagnostic(code(queenbee::parse_error))]
    ImportCycle { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationErrors),
}

impl ManifestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
