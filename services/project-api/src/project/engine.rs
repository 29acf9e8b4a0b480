//! Query resolution and aggregate statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

use crate::error::ProjectApiError;
use crate::project::model::{Priority, ProjectStatus};
use crate::project::query::{FilterSpec, PaginationSpec, QueryPage, QueryPlan};
use crate::project::repository::Repository;

/// Counts over a filtered project set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    /// Size of the filtered set
    pub total_projects: usize,
    /// Counts per status; statuses without projects are absent
    pub by_status: BTreeMap<ProjectStatus, usize>,
    /// Counts per priority
    pub by_priority: BTreeMap<Priority, usize>,
    /// Counts per team
    pub by_team: BTreeMap<String, usize>,
    /// When the counts were taken
    pub generated_at: DateTime<Utc>,
}

/// Turns filter and pagination requests into plans and runs them. Never writes.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    repository: Repository,
}

impl QueryEngine {
    /// Creates an engine reading through `repository`
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Filters, sorts and pages projects
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        filter: FilterSpec,
        pagination: &PaginationSpec,
    ) -> Result<QueryPage, ProjectApiError> {
        let plan = QueryPlan::build(filter, pagination)?;
        self.repository.query(&plan).await
    }

    /// Counts the full filtered set by status, priority and team
    #[instrument(skip_all)]
    pub async fn stats(&self, filter: &FilterSpec) -> Result<ProjectStats, ProjectApiError> {
        filter.validate()?;
        let projects = self.repository.scan(filter).await?;

        let mut stats = ProjectStats {
            total_projects: projects.len(),
            by_status: BTreeMap::new(),
            by_priority: BTreeMap::new(),
            by_team: BTreeMap::new(),
            generated_at: Utc::now(),
        };
        for project in &projects {
            *stats.by_status.entry(project.status).or_default() += 1;
            *stats.by_priority.entry(project.priority).or_default() += 1;
            *stats.by_team.entry(project.team.clone()).or_default() += 1;
        }
        Ok(stats)
    }
}
