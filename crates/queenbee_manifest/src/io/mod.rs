//! I/O descriptors for DAGs, functions and tasks.

pub mod common;
pub mod dag;
pub mod function;
pub mod task;

pub use common::{ArtifactSource, ItemType};
pub use dag::{DagInput, DagOutput};
pub use function::{FunctionInput, FunctionOutput};
pub use task::{TaskArgument, TaskReturn};
