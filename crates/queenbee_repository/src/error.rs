use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use queenbee_manifest::{DependencyKind, ManifestError};

/// Errors produced by packaging, indexing and transport.
#[derive(Debug, Error, Diagnostic)]
pub enum RepositoryError {
    #[error("failed to reach `{url}`: {message}")]
    #[diagnostic(code(queenbee::unreachable_repo))]
    Unreachable { url: String, message: String },

    #[error("`{url}` does not exist")]
    #[diagnostic(code(queenbee::package_not_found))]
    NotFound { url: String },

    #[error("no {kind} package named `{name}` {selector} exists in this index")]
    #[diagnostic(code(queenbee::package_not_found))]
    PackageNotFound {
        kind: DependencyKind,
        name: String,
        /// Human-readable selector, e.g. ``with tag `1.0.0` ``.
        selector: String,
    },

    #[error(
        "{kind} package `{name}` already has tag `{tag}` with a different digest; \
         pass force to overwrite or skip to keep the existing entry"
    )]
    #[diagnostic(code(queenbee::package_conflict))]
    PackageConflict {
        kind: DependencyKind,
        name: String,
        tag: String,
    },

    #[error("manifest digest mismatch: expected `{expected}` but hashed `{actual}`")]
    #[diagnostic(code(queenbee::digest_mismatch))]
    DigestMismatch { expected: String, actual: String },

    #[error("corrupt package archive: {message}")]
    #[diagnostic(code(queenbee::corrupt_archive))]
    CorruptArchive { message: String },

    #[error("failed to parse `{context}`: {message}")]
    #[diagnostic(code(queenbee::parse_error))]
    Parse { context: String, message: String },

    #[error("failed to access `{path}`")]
    #[diagnostic(code(queenbee::io_error))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the operation was cancelled")]
    #[diagnostic(code(queenbee::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),
}

impl RepositoryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            message: message.into(),
        }
    }
}
