//! Filter, sort and pagination plan for project queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::ProjectApiError;
use crate::project::model::{Priority, Project, ProjectStatus, RiskLevel};

/// Largest page a caller may request
pub const MAX_LIMIT: i64 = 100;

/// Optional predicates, AND-ed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterSpec {
    /// Status equality
    pub status: Option<ProjectStatus>,
    /// Owner equality
    pub owner: Option<String>,
    /// Team equality
    pub team: Option<String>,
    /// Priority equality
    pub priority: Option<Priority>,
    /// Risk level equality
    pub risk_level: Option<RiskLevel>,
    /// Every listed tag must be present
    pub tags: BTreeSet<String>,
    /// Inclusive lower bound on `created_at`
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub created_before: Option<DateTime<Utc>>,
}

impl FilterSpec {
    /// Rejects an inverted date range
    pub fn validate(&self) -> Result<(), ProjectApiError> {
        if let (Some(after), Some(before)) = (self.created_after, self.created_before) {
            if after > before {
                return Err(ProjectApiError::validation(
                    "createdAfter",
                    "must not be later than createdBefore",
                ));
            }
        }
        Ok(())
    }

    /// Whether a project satisfies every present predicate
    pub fn matches(&self, project: &Project) -> bool {
        self.status.is_none_or(|s| project.status == s)
            && self.owner.as_ref().is_none_or(|o| &project.owner == o)
            && self.team.as_ref().is_none_or(|t| &project.team == t)
            && self.priority.is_none_or(|p| project.priority == p)
            && self.risk_level.is_none_or(|r| project.risk_level == r)
            && self.tags.is_subset(&project.tags)
            && self.created_after.is_none_or(|after| project.created_at >= after)
            && self.created_before.is_none_or(|before| project.created_at <= before)
    }

    /// Renders the predicates as parameterized document-store SQL.
    ///
    /// Ordering and paging are not part of the rendered query.
    pub fn to_sql(&self) -> SqlQuery {
        let mut query = SqlQuery::default();
        let mut clauses: Vec<String> = Vec::new();

        let mut eq = |query: &mut SqlQuery, column: &str, value: Value| {
            let name = query.bind(value);
            clauses.push(format!("c.{column} = {name}"));
        };
        if let Some(status) = self.status {
            eq(&mut query, "status", Value::from(status.as_str()));
        }
        if let Some(owner) = &self.owner {
            eq(&mut query, "owner", Value::from(owner.as_str()));
        }
        if let Some(team) = &self.team {
            eq(&mut query, "team", Value::from(team.as_str()));
        }
        if let Some(priority) = self.priority {
            eq(&mut query, "priority", Value::from(priority.as_str()));
        }
        if let Some(risk_level) = self.risk_level {
            eq(&mut query, "risk_level", Value::from(risk_level.as_str()));
        }
        for tag in &self.tags {
            let name = query.bind(Value::from(tag.as_str()));
            clauses.push(format!("ARRAY_CONTAINS(c.tags, {name})"));
        }
        if let Some(after) = self.created_after {
            let name = query.bind(Value::from(after.to_rfc3339()));
            clauses.push(format!("c.created_at >= {name}"));
        }
        if let Some(before) = self.created_before {
            let name = query.bind(Value::from(before.to_rfc3339()));
            clauses.push(format!("c.created_at <= {name}"));
        }

        query.text.push_str("SELECT * FROM c");
        if !clauses.is_empty() {
            let _ = write!(query.text, " WHERE {}", clauses.join(" AND "));
        }
        query
    }
}

/// A query text with named `@pN` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    /// Query text
    pub text: String,
    /// Parameters in binding order
    pub parameters: Vec<(String, Value)>,
}

impl SqlQuery {
    fn bind(&mut self, value: Value) -> String {
        let name = format!("@p{}", self.parameters.len());
        self.parameters.push((name.clone(), value));
        name
    }
}

/// Fields a caller may sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Creation time (default)
    CreatedAt,
    /// Last modification time
    UpdatedAt,
    /// Name, byte order
    Name,
    /// Status, declaration order
    Status,
    /// Priority rank
    Priority,
    /// Risk rank
    RiskLevel,
    /// Planned completion, unset first
    EstimatedCompletion,
    /// Budget, unset first
    Budget,
}

impl SortField {
    /// Orders two projects by this field alone
    pub fn compare(self, a: &Project, b: &Project) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            Self::Name => a.name.cmp(&b.name),
            Self::Status => a.status.cmp(&b.status),
            Self::Priority => a.priority.cmp(&b.priority),
            Self::RiskLevel => a.risk_level.cmp(&b.risk_level),
            Self::EstimatedCompletion => a.estimated_completion.cmp(&b.estimated_completion),
            Self::Budget => match (a.budget, b.budget) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                (x, y) => x.is_some().cmp(&y.is_some()),
            },
        }
    }
}

impl FromStr for SortField {
    type Err = ProjectApiError;

    /// Accepts both the wire (`createdAt`) and document (`created_at`) spelling
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "updatedAt" | "updated_at" => Ok(Self::UpdatedAt),
            "name" => Ok(Self::Name),
            "status" => Ok(Self::Status),
            "priority" => Ok(Self::Priority),
            "riskLevel" | "risk_level" => Ok(Self::RiskLevel),
            "estimatedCompletion" | "estimated_completion" => Ok(Self::EstimatedCompletion),
            "budget" => Ok(Self::Budget),
            other => Err(ProjectApiError::validation(
                "sortBy",
                format!("cannot sort by {other:?}"),
            )),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending
    Asc,
    /// Descending
    Desc,
}

impl FromStr for SortOrder {
    type Err = ProjectApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ProjectApiError::validation(
                "sortOrder",
                format!("must be asc or desc, got {other:?}"),
            )),
        }
    }
}

/// Pagination exactly as the caller sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct PaginationSpec {
    /// Page size, 1 to 100
    pub limit: i64,
    /// Matches to skip, >= 0
    pub offset: i64,
    /// Sort field name
    pub sort_by: String,
    /// `asc` or `desc`
    pub sort_order: String,
}

impl Default for PaginationSpec {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            sort_by: "createdAt".to_string(),
            sort_order: "desc".to_string(),
        }
    }
}

impl PaginationSpec {
    /// Pagination with the given window and the default sort
    pub fn window(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    /// Rejects out-of-range values; nothing is clamped
    pub fn validate(&self) -> Result<Page, ProjectApiError> {
        if !(1..=MAX_LIMIT).contains(&self.limit) {
            return Err(ProjectApiError::validation(
                "limit",
                format!("must be between 1 and {MAX_LIMIT}"),
            ));
        }
        if self.offset < 0 {
            return Err(ProjectApiError::validation("offset", "must be >= 0"));
        }
        let limit = usize::try_from(self.limit)
            .map_err(|_| ProjectApiError::validation("limit", "out of range"))?;
        let offset = usize::try_from(self.offset)
            .map_err(|_| ProjectApiError::validation("offset", "out of range"))?;

        Ok(Page {
            limit,
            offset,
            sort_by: self.sort_by.parse()?,
            sort_order: self.sort_order.parse()?,
        })
    }
}

/// Validated pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Page size
    pub limit: usize,
    /// Matches skipped
    pub offset: usize,
    /// Primary sort key
    pub sort_by: SortField,
    /// Direction of the primary key; ties are always by id ascending
    pub sort_order: SortOrder,
}

impl Page {
    /// Sorts deterministically: primary field in the requested direction,
    /// then id ascending
    pub fn sort(&self, projects: &mut [Project]) {
        projects.sort_by(|a, b| {
            let primary = self.sort_by.compare(a, b);
            let primary = match self.sort_order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });
    }

    /// Sorts, then takes the requested window
    pub fn apply(&self, mut projects: Vec<Project>) -> Vec<Project> {
        self.sort(&mut projects);
        projects
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

/// A validated filter plus pagination, ready for the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// Predicates
    pub filter: FilterSpec,
    /// Window and ordering
    pub page: Page,
}

impl QueryPlan {
    /// Validates both halves of a request into a plan
    pub fn build(filter: FilterSpec, pagination: &PaginationSpec) -> Result<Self, ProjectApiError> {
        filter.validate()?;
        let page = pagination.validate()?;
        Ok(Self { filter, page })
    }
}

/// One page of results and the size of the whole match set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// Projects in the requested window, in order
    pub items: Vec<Project>,
    /// Matches before pagination
    pub total_count: usize,
}
