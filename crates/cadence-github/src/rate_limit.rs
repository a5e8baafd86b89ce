//! Interpretation of the `X-RateLimit-*` response headers.

use reqwest::header::HeaderMap;
use std::fmt;
use tracing::{error, info, warn};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Remaining requests below which the budget is considered nearly exhausted.
const CRITICAL_REMAINING: u64 = 20;

/// Rate limit budget reported by a response, graded by how close it is to running out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimit {
    /// Headers were absent or unparseable.
    Unknown,
    /// More than a tenth of the budget left.
    Healthy { remaining: u64, limit: u64 },
    Low { remaining: u64, limit: u64 },
    Critical { remaining: u64, limit: u64 },
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };

        match (read(LIMIT_HEADER), read(REMAINING_HEADER)) {
            (Some(limit), Some(remaining)) => Self::grade(remaining, limit),
            _ => RateLimit::Unknown,
        }
    }

    pub fn grade(remaining: u64, limit: u64) -> Self {
        if remaining > limit / 10 {
            RateLimit::Healthy { remaining, limit }
        } else if remaining > CRITICAL_REMAINING {
            RateLimit::Low { remaining, limit }
        } else {
            RateLimit::Critical { remaining, limit }
        }
    }

    /// Log the budget at a level matching its severity.
    pub fn log(&self, url: &str, status: u16) {
        match self {
            RateLimit::Healthy { .. } => info!(url, status, rate_limit = %self, "GitHub API response"),
            RateLimit::Unknown | RateLimit::Low { .. } => {
                warn!(url, status, rate_limit = %self, "GitHub API response")
            }
            RateLimit::Critical { .. } => {
                error!(url, status, rate_limit = %self, "GitHub API response")
            }
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimit::Unknown => write!(f, "could not get rate limit data"),
            RateLimit::Healthy { remaining, limit } => {
                write!(f, "rate limit: {}/{}", remaining, limit)
            }
            RateLimit::Low { remaining, limit } => {
                write!(f, "rate limit significantly low: {}/{}", remaining, limit)
            }
            RateLimit::Critical { remaining, limit } => write!(
                f,
                "throttling required, rate limit almost exhausted: {}/{}",
                remaining, limit
            ),
        }
    }
}
