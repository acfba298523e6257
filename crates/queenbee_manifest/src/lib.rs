//! Typed manifest model for Queenbee.
//!
//! This crate owns the in-memory representation of plugins, recipes, DAG
//! flows and their I/O descriptors, together with:
//!
//! - JSON/YAML (de)serialization with `import_from` expansion,
//! - canonical-JSON SHA-256 content digests,
//! - `{{…}}` reference parsing and scope validation.
//!
//! Manifests are validated once at load time and immutable afterwards;
//! every loader returns either a fully-checked value or a batch of
//! validation issues.

pub mod baked;
pub mod dag;
pub mod dependency;
pub mod digest;
pub mod error;
pub mod function;
pub mod io;
pub mod metadata;
pub mod parser;
pub mod plugin;
pub mod recipe;
pub mod reference;
pub mod task;

pub use baked::{check_task_against_template, BakedRecipe, Template, TemplateFunction};
pub use dag::Dag;
pub use dependency::{Dependency, DependencyKind};
pub use digest::{digest_bytes, ContentDigest};
pub use error::{ManifestError, ValidationErrors, ValidationIssue};
pub use function::Function;
pub use metadata::{License, Maintainer, Metadata};
pub use plugin::{DockerConfig, LocalConfig, Plugin, PluginConfig};
pub use recipe::{Recipe, DEPENDENCIES_FOLDER, ENTRYPOINT_DAG};
pub use reference::{ParsedReference, Reference};
pub use task::{Task, TaskLoop};
