//! Error types for GitHub operations

use fluxpreview_core::CoreError;
use thiserror::Error;

/// Result type for fluxpreview-github operations
pub type Result<T> = std::result::Result<T, GitHubError>;

/// GitHub API errors
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success REST response
    #[error("GitHub API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The GraphQL endpoint answered with `errors`
    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),

    #[error("Rate limited by GitHub. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("no GitHub token configured (set GITHUB_TOKEN)")]
    MissingToken,

    #[error("Invalid GitHub configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Input(#[from] CoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GitHubError {
    fn from(e: serde_json::Error) -> Self {
        GitHubError::Serialization(e.to_string())
    }
}

impl GitHubError {
    /// HTTP status, when the failure was a response
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Status { status, .. } => Some(*status),
            GitHubError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}
