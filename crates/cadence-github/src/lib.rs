//! GitHub API client used to discover revisions and fetch project files.

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use client::{
    CommitPage, GITHUB_API_BASE, GITHUB_OAUTH_TOKEN_URL, GitHubClient, OAuthApp, file_url,
    next_page_link,
};
pub use error::{GitHubError, GitHubResult};
pub use rate_limit::RateLimit;
pub use types::{
    AuthorDetails, CommitDetails, CommitEvent, CommitFile, GitHubCommit, GitHubFile,
    GitHubOrganization, GitHubUser, TokenResponse,
};
