//! GitHub API errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("unauthorized response from {0}")]
    Unauthorized(String),

    #[error("API error ({status}) from {url}: {message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("could not parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("missing token: environment variable {0} is not set")]
    MissingToken(String),
}

pub type GitHubResult<T> = Result<T, GitHubError>;

impl From<GitHubError> for cadence_core::Error {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Unauthorized(_) | GitHubError::MissingToken(_) => {
                cadence_core::Error::Unauthorized(err.to_string())
            }
            GitHubError::FileNotFound(_) => cadence_core::Error::NotFound(err.to_string()),
            _ => cadence_core::Error::Backend(err.to_string()),
        }
    }
}
