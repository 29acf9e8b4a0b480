//! Project persistence over a [`DocumentStore`].
//!
//! Every store call is bounded by the configured timeout. Store metadata is
//! stripped from every document before it becomes a [`Project`].

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ProjectApiError;
use crate::observability::CoreMetrics;
use crate::project::model::{Project, ProjectCreate, ProjectUpdate};
use crate::project::query::{FilterSpec, QueryPage, QueryPlan};
use crate::project::store::{validate_id, Document, DocumentStore, StoreError};

/// Top-level fields that belong to the store, not the project
const STORE_FIELDS: &[&str] = &["ttl", "pk"];

/// CRUD and query execution for projects
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    metrics: CoreMetrics,
}

impl Repository {
    /// Creates a repository bounding each store call by `timeout`
    pub fn new(store: Arc<dyn DocumentStore>, timeout: Duration, metrics: CoreMetrics) -> Self {
        Self {
            store,
            timeout,
            metrics,
        }
    }

    /// Stores a new project under a server-generated id
    #[instrument(skip_all)]
    pub async fn create(&self, input: ProjectCreate) -> Result<Project, ProjectApiError> {
        input.validate()?;
        let id = Uuid::new_v4().to_string();
        let project = input.into_project(id, Utc::now());
        let document = to_document(&project)?;

        let stored = self.call("create", self.store.create(document)).await?;
        let created = from_document(stored)?;
        info!(id = %created.id, "Project created");
        Ok(created)
    }

    /// Reads a project by id
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<Project, ProjectApiError> {
        validate_id(id)?;
        let document = self.call("read", self.store.read(id)).await?;
        Ok(from_document(document)?)
    }

    /// Merges the provided fields and advances `updated_at`
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: &str, update: ProjectUpdate) -> Result<Project, ProjectApiError> {
        update.validate()?;
        let mut project = self.get(id).await?;
        let previous = project.updated_at;

        update.apply_to(&mut project);
        project.updated_at = advance(previous, Utc::now());

        let document = to_document(&project)?;
        let stored = self.call("replace", self.store.replace(id, document)).await?;
        Ok(from_document(stored)?)
    }

    /// Deletes a project by id
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ProjectApiError> {
        validate_id(id)?;
        self.call("delete", self.store.delete(id)).await?;
        info!(id = %id, "Project deleted");
        Ok(())
    }

    /// Every project matching the filter, unordered
    pub async fn scan(&self, filter: &FilterSpec) -> Result<Vec<Project>, ProjectApiError> {
        let sql = filter.to_sql();
        let documents = self.call("query", self.store.query(filter, &sql)).await?;
        documents
            .into_iter()
            .map(|document| from_document(document).map_err(ProjectApiError::from))
            .collect()
    }

    /// Executes a plan: scan, deterministic sort, then the offset window
    #[instrument(skip_all, fields(limit = plan.page.limit, offset = plan.page.offset))]
    pub async fn query(&self, plan: &QueryPlan) -> Result<QueryPage, ProjectApiError> {
        let matches = self.scan(&plan.filter).await?;
        let total_count = matches.len();
        Ok(QueryPage {
            items: plan.page.apply(matches),
            total_count,
        })
    }

    /// Probes the store within the call timeout
    pub async fn health_check(&self) -> Result<(), ProjectApiError> {
        self.call("health", self.store.health_check()).await?;
        Ok(())
    }

    async fn call<T, F>(&self, operation: &'static str, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                duration: self.timeout,
            }),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(_) => self.metrics.record_store_call(operation, elapsed, None),
            Err(err) => {
                self.metrics
                    .record_store_call(operation, elapsed, Some(err.code()));
                if matches!(
                    err,
                    StoreError::Timeout { .. } | StoreError::Throttled { .. } | StoreError::Unavailable(_)
                ) {
                    warn!(operation, error = %err, "Document store call failed");
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// `updated_at` never repeats or goes backwards, even under clock skew
fn advance(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + ChronoDuration::microseconds(1))
}

fn to_document(project: &Project) -> Result<Document, ProjectApiError> {
    match serde_json::to_value(project) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(ProjectApiError::Internal(anyhow::anyhow!(
            "project did not serialize to an object"
        ))),
        Err(e) => Err(ProjectApiError::Internal(e.into())),
    }
}

/// Drops store metadata and decodes the remaining fields.
fn from_document(mut document: Document) -> Result<Project, StoreError> {
    document.retain(|key, _| !key.starts_with('_') && !STORE_FIELDS.contains(&key.as_str()));
    serde_json::from_value(Value::Object(document)).map_err(|e| StoreError::Corrupt(e.to_string()))
}
