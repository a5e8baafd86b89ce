//! GitHub API client for repository operations.

use cadence_config::GitHubSettings;
use cadence_core::retry::{Failure, RetryPolicy, retry};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LINK};
use serde::de::DeserializeOwned;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::rate_limit::RateLimit;
use crate::types::{
    ApiErrorBody, CommitEvent, GitHubCommit, GitHubFile, GitHubOrganization, GitHubUser,
    TokenReply, TokenResponse,
};
use crate::{GitHubError, GitHubResult};

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_OAUTH_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

const USER_AGENT: &str = "Cadence-Scheduler";

// Matches `<url>; rel="next"` within a Link header
static NEXT_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).unwrap());

/// One page of a commit listing.
#[derive(Debug, Clone)]
pub struct CommitPage {
    pub commits: Vec<GitHubCommit>,
    /// URL of the following page, if GitHub advertised one.
    pub next: Option<String>,
}

/// GitHub API client.
pub struct GitHubClient {
    client: reqwest::Client,
    access_token: String,
    api_base: String,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(access_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            api_base: GITHUB_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Build a client from settings, reading the token from the configured
    /// environment variable.
    pub fn from_settings(settings: &GitHubSettings) -> GitHubResult<Self> {
        let token = std::env::var(&settings.token_env)
            .map_err(|_| GitHubError::MissingToken(settings.token_env.clone()))?;
        Ok(Self::new(token).with_retry(retry_policy(settings)))
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Point the client at another API host, e.g. GitHub Enterprise.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn commits_url(&self, owner: &str, repo: &str, branch: &str) -> String {
        format!(
            "{}/repos/{}/{}/commits?sha={}",
            self.api_base,
            owner,
            repo,
            urlencoding::encode(branch)
        )
    }

    /// Fetch one page of commits from a listing URL.
    ///
    /// Start with [`GitHubClient::commits_url`] and follow [`CommitPage::next`].
    pub async fn get_commits(&self, commits_url: &str) -> GitHubResult<CommitPage> {
        let response = self.get(commits_url).await?;
        let next = next_page_link(response.headers());
        let commits: Vec<GitHubCommit> = read_json(commits_url, response).await?;

        Ok(CommitPage { commits, next })
    }

    /// Get a single commit, including the files it touched.
    pub async fn get_commit_event(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> GitHubResult<CommitEvent> {
        let url = format!("{}/repos/{}/{}/commits/{}", self.api_base, owner, repo, sha);
        debug!(url = %url, "Requesting GitHub commit");

        let response = self.get(&url).await?;
        read_json(&url, response).await
    }

    /// Get a file's contents at a revision.
    pub async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: &str,
    ) -> GitHubResult<GitHubFile> {
        let url = format!("{}{}", self.api_base, file_path(owner, repo, path, revision));

        let response = self.get(&url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            error!(url = %url, "GitHub file not found");
            return Err(GitHubError::FileNotFound(url));
        }
        read_json(&url, response).await
    }

    /// Get the authenticated user and the organizations they belong to.
    pub async fn get_user(&self) -> GitHubResult<(GitHubUser, Vec<GitHubOrganization>)> {
        let user_url = format!("{}/user", self.api_base);
        let response = self.get(&user_url).await?;
        let user: GitHubUser = read_json(&user_url, response).await?;

        let org_url = format!("{}/user/orgs", self.api_base);
        let response = self.get(&org_url).await?;
        let organizations = read_json(&org_url, response).await?;

        Ok((user, organizations))
    }

    /// Exchange an OAuth authorization code for an access token.
    pub async fn exchange_code(&self, app: &OAuthApp, code: &str) -> GitHubResult<TokenResponse> {
        let url = GITHUB_OAUTH_TOKEN_URL;
        let form = app.token_form(code);

        let response = self
            .send("POST", url, |client| {
                client
                    .post(url)
                    .header("Accept", "application/json")
                    .form(&form)
            })
            .await?;

        accept_token(url, read_json(url, response).await?)
    }

    /// GET with the access token attached.
    async fn get(&self, url: &str) -> GitHubResult<reqwest::Response> {
        let token = self.access_token.as_str();
        self.send("GET", url, |client| {
            client
                .get(url)
                .header("Authorization", format!("token {}", token))
                .header("Accept", "application/vnd.github+json")
        })
        .await
    }

    /// Send a request with retry.
    ///
    /// Transport failures and 5xx responses are retried. A 401 stops
    /// immediately. Any other response is handed back for the caller to judge.
    async fn send<F>(
        &self,
        method: &'static str,
        url: &str,
        build: F,
    ) -> GitHubResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        info!(method, url, "Attempting GitHub API call");

        let client = &self.client;
        let build = &build;

        let result = retry(self.retry, move || {
            let request = build(client).header("User-Agent", USER_AGENT);
            async move {
                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(method, url, error = %e, "GitHub request failed");
                        return Err(Failure::Retriable(GitHubError::Request {
                            url: url.to_string(),
                            message: e.to_string(),
                        }));
                    }
                };

                let status = response.status();
                if status == StatusCode::UNAUTHORIZED {
                    error!(method, url, "GitHub got an unauthorized response");
                    return Err(Failure::Fatal(GitHubError::Unauthorized(url.to_string())));
                }
                if status.is_server_error() {
                    return Err(Failure::Retriable(GitHubError::Api {
                        status: status.as_u16(),
                        url: url.to_string(),
                        message: status.to_string(),
                    }));
                }

                RateLimit::from_headers(response.headers()).log(url, status.as_u16());
                Ok(response)
            }
        })
        .await;

        result.map_err(|e| {
            if e.is_exhausted() {
                error!(method, url, "GitHub request used up all retries");
            }
            e.into_inner()
        })
    }
}

/// OAuth application credentials.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthApp {
    fn token_form<'a>(&'a self, code: &'a str) -> [(&'static str, &'a str); 3] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
        ]
    }
}

// GitHub rejects a bad code with 200 and an error body
fn accept_token(url: &str, reply: TokenReply) -> GitHubResult<TokenResponse> {
    match reply {
        TokenReply::Token(token) if !token.access_token.is_empty() => Ok(token),
        TokenReply::Token(_) => Err(GitHubError::Unauthorized(format!(
            "{} (no access token issued)",
            url
        ))),
        TokenReply::Rejected {
            error,
            error_description,
        } => {
            error!(url, error = %error, "GitHub rejected the OAuth code");
            Err(GitHubError::Unauthorized(format!(
                "{} ({}: {})",
                url, error, error_description
            )))
        }
    }
}

fn retry_policy(settings: &GitHubSettings) -> RetryPolicy {
    RetryPolicy::fixed(
        settings.max_attempts,
        Duration::from_millis(settings.retry_delay_ms),
    )
    .with_multiplier(settings.backoff_multiplier)
}

/// URL of a file's contents at a revision on public GitHub.
pub fn file_url(owner: &str, repo: &str, path: &str, revision: &str) -> String {
    format!("{}{}", GITHUB_API_BASE, file_path(owner, repo, path, revision))
}

fn file_path(owner: &str, repo: &str, path: &str, revision: &str) -> String {
    format!(
        "/repos/{}/{}/contents/{}?ref={}",
        owner,
        repo,
        path.trim_start_matches('/'),
        urlencoding::encode(revision)
    )
}

/// Next-page URL from the `Link` headers, per RFC 5988.
pub fn next_page_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            NEXT_LINK_REGEX
                .captures(value)
                .map(|caps| caps[1].to_string())
        })
}

/// Decode a successful response, or turn an error status into [`GitHubError::Api`].
async fn read_json<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> GitHubResult<T> {
    let status = response.status();
    let body = response.text().await.map_err(|e| GitHubError::Request {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    debug!(url, status = status.as_u16(), bytes = body.len(), "GitHub API response body");

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        return Err(GitHubError::Api {
            status: status.as_u16(),
            url: url.to_string(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| GitHubError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}
