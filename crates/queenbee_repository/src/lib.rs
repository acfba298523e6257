//! Content-addressed packaging, repository indexes and transport.
//!
//! A repository is a folder tree (local or HTTP-served) with `plugins/`,
//! `recipes/` and an `index.json` grouping package versions by name. This
//! crate produces and consumes that layout: deterministic gzipped tar
//! archives, index generation and merging, tag/digest lookup, search, and
//! a uniform fetcher for `file:` and `http(s)` sources.

pub mod error;
pub mod index;
pub mod package;
pub mod transport;

pub use error::RepositoryError;
pub use index::{init_repository, RepositoryIndex, INDEX_FILE, LATEST_TAG};
pub use package::{
    pack_package, package_folder, read_readme, unpack_package, PackageManifest, PackageVersion,
};
pub use transport::{resolve_local, urljoin, AuthHeader, AuthProvider, Transport, USER_AGENT};
