//! GitHub commands.

use anyhow::{Context, Result};
use cadence_config::SystemConfig;
use cadence_github::GitHubClient;

/// List commits on a branch, newest first, following pagination.
pub async fn commits(
    config: &SystemConfig,
    owner: &str,
    repo: &str,
    branch: &str,
    pages: u32,
) -> Result<()> {
    let client = GitHubClient::from_settings(&config.github)?;
    let mut url = Some(client.commits_url(owner, repo, branch));
    let mut fetched = 0;

    while let Some(page_url) = url.take() {
        if fetched >= pages {
            break;
        }
        let page = client
            .get_commits(&page_url)
            .await
            .with_context(|| format!("Failed to list commits of {}/{}", owner, repo))?;
        fetched += 1;

        for commit in &page.commits {
            let summary = commit.commit.message.lines().next().unwrap_or_default();
            println!("{:.10}  {}  {}", commit.sha, commit.commit.author.name, summary);
        }
        url = page.next;
    }

    Ok(())
}
