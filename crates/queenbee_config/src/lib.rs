//! Process-wide configuration for the Queenbee CLI.
//!
//! The config lives at `~/.queenbee/config.yaml` (the directory can be
//! overridden through `QUEENBEE_HOME`) and carries two lists: auth
//! entries for registry domains and named repository references. It is
//! read once at command start; mutations write the whole file back
//! atomically via a temp file rename.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use queenbee_repository::{AuthHeader, AuthProvider};

pub const CONFIG_DIR: &str = ".queenbee";
pub const CONFIG_FILE: &str = "config.yaml";

/// Environment variable overriding the config directory.
pub const HOME_ENV: &str = "QUEENBEE_HOME";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("could not determine a home directory for the config file")]
    #[diagnostic(code(queenbee::io_error))]
    NoHome,

    #[error("failed to access `{path}`")]
    #[diagnostic(code(queenbee::io_error))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse `{path}`: {message}")]
    #[diagnostic(code(queenbee::parse_error))]
    Parse { path: PathBuf, message: String },

    #[error("repository `{name}` already exists; pass force to overwrite")]
    #[diagnostic(code(queenbee::package_conflict))]
    RepositoryExists { name: String },

    #[error("no repository named `{name}` is configured")]
    #[diagnostic(code(queenbee::package_not_found))]
    UnknownRepository { name: String },
}

impl ConfigError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Authentication for one registry domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEntry {
    /// Host this entry applies to, e.g. `registry.pollination.cloud`.
    pub domain: String,
    /// Bearer token sent as `Authorization: Bearer <token>`.
    pub access_token: Option<String>,
    /// Raw token sent under `header_name` instead of a bearer header.
    pub api_token: Option<String>,
    /// Header carrying `api_token`, for registries with a custom scheme.
    pub header_name: Option<String>,
}

impl AuthEntry {
    /// The header this entry contributes, if it carries a token.
    pub fn auth_header(&self) -> Option<AuthHeader> {
        if let Some(token) = &self.access_token {
            return Some(AuthHeader::bearer(token));
        }
        match (&self.api_token, &self.header_name) {
            (Some(token), Some(name)) => Some(AuthHeader::new(name, token)),
            (Some(token), None) => Some(AuthHeader::new("Authorization", token)),
            _ => None,
        }
    }
}

/// A named repository the CLI can search and resolve against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub name: String,
    /// Repository URL; plain local paths are normalized to `file:` URLs.
    pub path: String,
}

impl RepositoryReference {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.contains("://") || path.starts_with("file:") {
            path
        } else {
            format!("file:{path}")
        };
        Self {
            name: name.into(),
            path,
        }
    }
}

/// The whole config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: Vec<AuthEntry>,
    #[serde(default)]
    pub repositories: Vec<RepositoryReference>,
}

impl Config {
    /// The config directory: `$QUEENBEE_HOME` or `~/.queenbee`.
    pub fn directory() -> Result<PathBuf, ConfigError> {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Ok(PathBuf::from(home));
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR))
            .ok_or(ConfigError::NoHome)
    }

    /// Load the config, or defaults when no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::directory()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match fs_err::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(ConfigError::io(path, err)),
        };
        serde_yaml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Write the config back atomically: serialize to a temp file in the
    /// config directory, then rename over the target.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::directory()?.join(CONFIG_FILE))
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        fs_err::create_dir_all(directory).map_err(|err| ConfigError::io(directory, err))?;

        let contents = serde_yaml::to_string(self).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let temp = tempfile::NamedTempFile::new_in(directory)
            .map_err(|err| ConfigError::io(directory, err))?;
        fs_err::write(temp.path(), contents)
            .map_err(|err| ConfigError::io(temp.path().to_path_buf(), err))?;
        temp.persist(path)
            .map_err(|err| ConfigError::io(path, err.error))?;
        Ok(())
    }

    /// The auth header configured for a repository URL's host, if any.
    pub fn auth_header_for(&self, repository_url: &str) -> Option<AuthHeader> {
        let host = Url::parse(repository_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))?;
        self.auth
            .iter()
            .find(|entry| entry.domain == host)
            .and_then(AuthEntry::auth_header)
    }

    /// Add or replace the auth entry for a domain.
    pub fn add_auth(&mut self, entry: AuthEntry) {
        match self
            .auth
            .iter()
            .position(|existing| existing.domain == entry.domain)
        {
            Some(index) => self.auth[index] = entry,
            None => self.auth.push(entry),
        }
    }

    pub fn repository(&self, name: &str) -> Option<&RepositoryReference> {
        self.repositories
            .iter()
            .find(|repository| repository.name == name)
    }

    pub fn add_repository(
        &mut self,
        repository: RepositoryReference,
        force: bool,
    ) -> Result<(), ConfigError> {
        match self
            .repositories
            .iter()
            .position(|existing| existing.name == repository.name)
        {
            Some(index) if force => {
                self.repositories[index] = repository;
                Ok(())
            }
            Some(_) => Err(ConfigError::RepositoryExists {
                name: repository.name,
            }),
            None => {
                self.repositories.push(repository);
                Ok(())
            }
        }
    }

    pub fn remove_repository(&mut self, name: &str) -> Result<(), ConfigError> {
        let before = self.repositories.len();
        self.repositories.retain(|repository| repository.name != name);
        if self.repositories.len() == before {
            return Err(ConfigError::UnknownRepository {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl AuthProvider for Config {
    fn header_for(&self, url: &str) -> Option<AuthHeader> {
        self.auth_header_for(url)
    }
}
