//! Versions: evaluated revisions of a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Requester, ResourceId};

/// A single evaluated revision of a project.
///
/// Tasks created for a version inherit its revision and order number; the
/// order number is what history lookups compare, never the commit hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: ResourceId,
    pub project: String,
    /// Commit hash.
    pub revision: String,
    /// Monotonic per-project sequence number.
    pub order_number: i64,
    pub requester: Requester,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn new(
        project: impl Into<String>,
        revision: impl Into<String>,
        order_number: i64,
        requester: Requester,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            project: project.into(),
            revision: revision.into(),
            order_number,
            requester,
            created_at: Utc::now(),
        }
    }
}
