//! Uniform fetching of `file:` and `http(s)` resources.
//!
//! The transport never retries and applies no timeout of its own; both are
//! the caller's concern, configured on the underlying client. Cancellation
//! is cooperative through a [`CancellationToken`].

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::error::RepositoryError;

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = "Queenbee";

/// An opaque authentication header supplied by the caller.
///
/// The core never inspects the value; it is forwarded verbatim on every
/// HTTP request against the source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    /// Header name, `Authorization` unless the registry uses a custom one.
    pub name: String,
    pub value: String,
}

impl AuthHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn bearer(token: impl std::fmt::Display) -> Self {
        Self::new("Authorization", format!("Bearer {token}"))
    }
}

/// Source of authentication headers, keyed by the URL being fetched.
///
/// The unit implementation never authenticates; the CLI wires the local
/// config in through this seam.
pub trait AuthProvider: Send + Sync {
    fn header_for(&self, url: &str) -> Option<AuthHeader>;
}

impl AuthProvider for () {
    fn header_for(&self, _url: &str) -> Option<AuthHeader> {
        None
    }
}

/// Join URL segments with single slashes, normalizing backslashes.
pub fn urljoin(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
    .replace('\\', "/")
}

/// Resolve a `file:` URL to a local path, relative paths against the
/// current working directory.
pub fn resolve_local(url: &str) -> Option<PathBuf> {
    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("file:"))?;
    Some(PathBuf::from(path))
}

/// Fetcher for repository indexes and package archives.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("the default client configuration is valid");
        Self { client }
    }

    /// Use a caller-configured client, e.g. with timeouts.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the raw bytes behind a `file:` or `http(s)` URL.
    pub async fn fetch(
        &self,
        url: &str,
        auth: Option<&AuthHeader>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RepositoryError> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        if let Some(path) = resolve_local(url) {
            tracing::debug!(path = %path.display(), "reading local resource");
            return match fs_err::read(&path) {
                Ok(bytes) => Ok(bytes),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    Err(RepositoryError::NotFound {
                        url: url.to_string(),
                    })
                }
                Err(err) => Err(RepositoryError::io(path, err)),
            };
        }

        tracing::debug!(url, "fetching remote resource");
        let request = self.client.get(url).header(
            auth.map_or("Authorization", |auth| auth.name.as_str()),
            auth.map_or("", |auth| auth.value.as_str()),
        );

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            response = request.send() => response.map_err(|err| RepositoryError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            })?,
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound {
                url: url.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(RepositoryError::Unreachable {
                url: url.to_string(),
                message: format!("server answered with status {}", response.status()),
            });
        }

        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Err(RepositoryError::Cancelled),
            bytes = response.bytes() => bytes.map_err(|err| RepositoryError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            })?,
        };
        Ok(bytes.to_vec())
    }
}
