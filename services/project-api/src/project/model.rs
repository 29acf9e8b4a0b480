//! Project resource and its write inputs.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::ProjectApiError;

const NAME_MAX_CHARS: usize = 100;
const DESCRIPTION_MAX_CHARS: usize = 500;

/// A wire name that names no variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown value {value:?}, expected one of {expected}")]
pub struct UnknownVariant {
    value: String,
    expected: &'static str,
}

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    /// Not started
    Planning,
    /// Work underway
    InProgress,
    /// Delivered
    Completed,
    /// Paused
    OnHold,
    /// Abandoned
    Cancelled,
}

impl ProjectStatus {
    /// Every status in declaration order
    pub const ALL: [Self; 5] = [
        Self::Planning,
        Self::InProgress,
        Self::Completed,
        Self::OnHold,
        Self::Cancelled,
    ];

    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::OnHold => "ON_HOLD",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                value: s.to_string(),
                expected: "PLANNING, IN_PROGRESS, COMPLETED, ON_HOLD, CANCELLED",
            })
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority scale, also used for risk levels. Ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Lowest
    Low,
    /// Default priority
    Medium,
    /// Elevated
    High,
    /// Highest
    Critical,
}

/// Risk levels share the priority scale
pub type RiskLevel = Priority;

impl Priority {
    /// Every level from lowest to highest
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Wire name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                value: s.to_string(),
                expected: "LOW, MEDIUM, HIGH, CRITICAL",
            })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes a camelCase request body into `T`.
///
/// Unknown keys and unknown enum names are a validation error on `input`;
/// the reason names the offending key or value.
pub fn decode_input<T: DeserializeOwned>(input: &str, body: Value) -> Result<T, ProjectApiError> {
    serde_json::from_value(body).map_err(|e| ProjectApiError::validation(input, e.to_string()))
}

/// A stored project, free of store metadata.
///
/// This is also the document shape, so fields keep their snake_case names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Server-generated id, also the partition key
    pub id: String,
    /// Display name
    pub name: String,
    /// Free text description
    pub description: String,
    /// Lifecycle state
    pub status: ProjectStatus,
    /// Owning user
    pub owner: String,
    /// Owning team
    pub team: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Labels
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Priority
    pub priority: Priority,
    /// Risk level
    pub risk_level: RiskLevel,
    /// Planned completion
    #[serde(default)]
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Actual completion
    #[serde(default)]
    pub actual_completion: Option<DateTime<Utc>>,
    /// Budget, never negative
    #[serde(default)]
    pub budget: Option<f64>,
    /// Ids of projects this one depends on, in order
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Input for creating a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectCreate {
    /// Display name, 1 to 100 characters
    pub name: String,
    /// Description, 1 to 500 characters
    pub description: String,
    /// Owning user
    pub owner: String,
    /// Owning team
    pub team: String,
    /// Defaults to `PLANNING`
    pub status: Option<ProjectStatus>,
    /// Defaults to `MEDIUM`
    pub priority: Option<Priority>,
    /// Defaults to `LOW`
    pub risk_level: Option<RiskLevel>,
    /// Labels
    pub tags: BTreeSet<String>,
    /// Planned completion
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Budget
    pub budget: Option<f64>,
    /// Dependencies, in order
    pub dependencies: Vec<String>,
}

impl ProjectCreate {
    /// Input with the four required fields and defaults elsewhere
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        owner: impl Into<String>,
        team: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            owner: owner.into(),
            team: team.into(),
            ..Self::default()
        }
    }

    /// Checks field bounds
    pub fn validate(&self) -> Result<(), ProjectApiError> {
        validate_text("name", &self.name, NAME_MAX_CHARS)?;
        validate_text("description", &self.description, DESCRIPTION_MAX_CHARS)?;
        validate_required("owner", &self.owner)?;
        validate_required("team", &self.team)?;
        validate_budget(self.budget)
    }

    /// Builds the stored project with defaults applied
    pub fn into_project(self, id: String, now: DateTime<Utc>) -> Project {
        Project {
            id,
            name: self.name,
            description: self.description,
            status: self.status.unwrap_or(ProjectStatus::Planning),
            owner: self.owner,
            team: self.team,
            created_at: now,
            updated_at: now,
            tags: self.tags,
            priority: self.priority.unwrap_or(Priority::Medium),
            risk_level: self.risk_level.unwrap_or(Priority::Low),
            estimated_completion: self.estimated_completion,
            actual_completion: None,
            budget: self.budget,
            dependencies: self.dependencies,
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New status
    pub status: Option<ProjectStatus>,
    /// New owner
    pub owner: Option<String>,
    /// New team
    pub team: Option<String>,
    /// Replacement tag set
    pub tags: Option<BTreeSet<String>>,
    /// New priority
    pub priority: Option<Priority>,
    /// New risk level
    pub risk_level: Option<RiskLevel>,
    /// New planned completion
    pub estimated_completion: Option<DateTime<Utc>>,
    /// New actual completion
    pub actual_completion: Option<DateTime<Utc>>,
    /// New budget
    pub budget: Option<f64>,
    /// Replacement dependency list
    pub dependencies: Option<Vec<String>>,
}

impl ProjectUpdate {
    /// Checks bounds of the provided fields
    pub fn validate(&self) -> Result<(), ProjectApiError> {
        if let Some(name) = &self.name {
            validate_text("name", name, NAME_MAX_CHARS)?;
        }
        if let Some(description) = &self.description {
            validate_text("description", description, DESCRIPTION_MAX_CHARS)?;
        }
        if let Some(owner) = &self.owner {
            validate_required("owner", owner)?;
        }
        if let Some(team) = &self.team {
            validate_required("team", team)?;
        }
        validate_budget(self.budget)
    }

    /// Merges the provided fields into `project`; `updated_at` is the caller's concern.
    pub fn apply_to(self, project: &mut Project) {
        if let Some(name) = self.name {
            project.name = name;
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(owner) = self.owner {
            project.owner = owner;
        }
        if let Some(team) = self.team {
            project.team = team;
        }
        if let Some(tags) = self.tags {
            project.tags = tags;
        }
        if let Some(priority) = self.priority {
            project.priority = priority;
        }
        if let Some(risk_level) = self.risk_level {
            project.risk_level = risk_level;
        }
        if let Some(estimated) = self.estimated_completion {
            project.estimated_completion = Some(estimated);
        }
        if let Some(actual) = self.actual_completion {
            project.actual_completion = Some(actual);
        }
        if let Some(budget) = self.budget {
            project.budget = Some(budget);
        }
        if let Some(dependencies) = self.dependencies {
            project.dependencies = dependencies;
        }
    }
}

fn validate_text(field: &str, value: &str, max_chars: usize) -> Result<(), ProjectApiError> {
    let len = value.chars().count();
    if len == 0 || len > max_chars {
        return Err(ProjectApiError::validation(
            field,
            format!("must be between 1 and {max_chars} characters"),
        ));
    }
    Ok(())
}

fn validate_required(field: &str, value: &str) -> Result<(), ProjectApiError> {
    if value.trim().is_empty() {
        return Err(ProjectApiError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn validate_budget(budget: Option<f64>) -> Result<(), ProjectApiError> {
    match budget {
        Some(b) if !b.is_finite() || b < 0.0 => Err(ProjectApiError::validation(
            "budget",
            "must be a finite number >= 0",
        )),
        _ => Ok(()),
    }
}
