//! Response payloads.

use serde::{Deserialize, Serialize};

/// One entry of a commit listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: CommitDetails,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetails {
    pub message: String,
    pub author: AuthorDetails,
    pub committer: Option<AuthorDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorDetails {
    pub name: String,
    pub email: String,
    /// RFC 3339 timestamp as sent by GitHub.
    pub date: String,
}

/// A single commit with its changed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitEvent {
    pub sha: String,
    pub commit: CommitDetails,
    #[serde(default)]
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

/// Repository file contents. `content` is encoded per `encoding`, normally base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubFile {
    pub name: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubOrganization {
    pub id: i64,
    pub login: String,
}

/// Result of exchanging an OAuth code.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TokenReply {
    Token(TokenResponse),
    Rejected {
        error: String,
        #[serde(default)]
        error_description: String,
    },
}

/// Body GitHub sends alongside error statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}
