//! Per-call composition: authenticate, then resolve.
//!
//! Every operation except the ones listed in [`Operation::ANONYMOUS`] runs
//! token validation before it touches the repository or the query engine.
//! Verified claims travel with the call only as audit metadata.

pub mod audit;

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ErrorResponse, ProjectApiError};
use crate::jwt::{Claims, KeyRing, TokenValidator};
use crate::project::{
    FilterSpec, PaginationSpec, Project, ProjectCreate, ProjectStats, ProjectUpdate, QueryEngine,
    QueryPage, Repository,
};

pub use audit::{AuditError, AuditOutcome, AuditRecord, AuditSink, TracingAuditSink};

/// Operations the pipeline serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read one project
    Project,
    /// Filtered, paged listing
    Projects,
    /// Aggregate counts
    ProjectStats,
    /// Create a project
    CreateProject,
    /// Partially update a project
    UpdateProject,
    /// Delete a project
    DeleteProject,
    /// Liveness and dependency report
    Health,
    /// Build information
    Version,
}

impl Operation {
    /// Operations served without a bearer token
    pub const ANONYMOUS: &'static [Self] = &[Self::Health, Self::Version];

    /// Stable operation name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Projects => "projects",
            Self::ProjectStats => "project_stats",
            Self::CreateProject => "create_project",
            Self::UpdateProject => "update_project",
            Self::DeleteProject => "delete_project",
            Self::Health => "health",
            Self::Version => "version",
        }
    }

    /// Whether the operation is served without authentication
    pub fn allows_anonymous(self) -> bool {
        Self::ANONYMOUS.contains(&self)
    }

    const fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateProject | Self::UpdateProject | Self::DeleteProject
        )
    }
}

/// What the transport layer hands over for one inbound call
#[derive(Debug, Clone)]
pub struct CallMetadata {
    authorization: Option<String>,
    correlation_id: Uuid,
}

impl CallMetadata {
    /// Call carrying the raw `Authorization` header value, if any
    pub fn new(authorization: Option<impl Into<String>>) -> Self {
        Self {
            authorization: authorization.map(Into::into),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Call without an `Authorization` header
    pub fn anonymous() -> Self {
        Self {
            authorization: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Call presenting `token` as a bearer token
    pub fn bearer(token: &str) -> Self {
        Self::new(Some(format!("Bearer {token}")))
    }

    /// Reuses a correlation id assigned upstream
    #[must_use]
    pub const fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Correlation id of the call
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Builds the boundary response for a failure of this call
    pub fn error_response(&self, error: &ProjectApiError) -> ErrorResponse {
        ErrorResponse::from_error(error, self.correlation_id)
    }
}

/// An authenticated (or explicitly anonymous) call in progress.
///
/// Only [`RequestPipeline`] creates contexts, so a context with claims
/// always carries verified claims.
#[derive(Debug, Clone)]
pub struct RequestContext {
    operation: Operation,
    correlation_id: Uuid,
    claims: Option<Claims>,
}

impl RequestContext {
    /// Operation being served
    pub const fn operation(&self) -> Operation {
        self.operation
    }

    /// Correlation id of the call
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Verified claims; `None` only for anonymous operations
    pub const fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Subject of the verified token
    pub fn actor(&self) -> Option<&str> {
        self.claims.as_ref().map(Claims::subject)
    }
}

/// Reachability of one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    /// Whether the dependency answered
    pub healthy: bool,
    /// Failure description when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Key ring state as reported by `health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRingHealth {
    /// Cached signing keys
    pub key_count: usize,
    /// Whether the cached set is past its TTL or was never fetched
    pub stale: bool,
}

/// Result of the anonymous `health` operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `healthy` or `degraded`
    pub status: &'static str,
    /// Document store probe
    pub store: ComponentHealth,
    /// Key ring state
    pub key_ring: KeyRingHealth,
}

/// Result of the anonymous `version` operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Package name
    pub name: &'static str,
    /// Package version
    pub version: &'static str,
}

/// Composes token validation with project reads and writes
#[derive(Clone)]
pub struct RequestPipeline {
    validator: TokenValidator,
    key_ring: KeyRing,
    repository: Repository,
    engine: QueryEngine,
    audit: Arc<dyn AuditSink>,
}

impl RequestPipeline {
    /// Wires the pipeline
    pub fn new(
        validator: TokenValidator,
        key_ring: KeyRing,
        repository: Repository,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let engine = QueryEngine::new(repository.clone());
        Self {
            validator,
            key_ring,
            repository,
            engine,
            audit,
        }
    }

    /// Authenticates a call for `operation`.
    ///
    /// Anonymous operations skip validation entirely; everything else needs
    /// a valid bearer token.
    pub async fn authenticate(
        &self,
        operation: Operation,
        call: &CallMetadata,
    ) -> Result<RequestContext, ProjectApiError> {
        let claims = if operation.allows_anonymous() {
            None
        } else {
            Some(
                self.validator
                    .validate_authorization_header(call.authorization.as_deref())
                    .await?,
            )
        };
        Ok(RequestContext {
            operation,
            correlation_id: call.correlation_id,
            claims,
        })
    }

    /// Reads one project
    pub async fn project(&self, call: &CallMetadata, id: &str) -> Result<Project, ProjectApiError> {
        let span = info_span!("project", correlation_id = %call.correlation_id, id = %id);
        async {
            self.authenticate(Operation::Project, call).await?;
            self.repository.get(id).await
        }
        .instrument(span)
        .await
    }

    /// Lists projects
    pub async fn projects(
        &self,
        call: &CallMetadata,
        filter: Option<FilterSpec>,
        pagination: Option<PaginationSpec>,
    ) -> Result<QueryPage, ProjectApiError> {
        let span = info_span!("projects", correlation_id = %call.correlation_id);
        async {
            self.authenticate(Operation::Projects, call).await?;
            self.engine
                .resolve(filter.unwrap_or_default(), &pagination.unwrap_or_default())
                .await
        }
        .instrument(span)
        .await
    }

    /// Counts projects matching the filter
    pub async fn project_stats(
        &self,
        call: &CallMetadata,
        filter: Option<FilterSpec>,
    ) -> Result<ProjectStats, ProjectApiError> {
        let span = info_span!("project_stats", correlation_id = %call.correlation_id);
        async {
            self.authenticate(Operation::ProjectStats, call).await?;
            self.engine.stats(&filter.unwrap_or_default()).await
        }
        .instrument(span)
        .await
    }

    /// Creates a project
    pub async fn create_project(
        &self,
        call: &CallMetadata,
        input: ProjectCreate,
    ) -> Result<Project, ProjectApiError> {
        let span = info_span!("create_project", correlation_id = %call.correlation_id);
        async {
            let ctx = self.authenticate(Operation::CreateProject, call).await?;
            let result = self.repository.create(input).await;
            let id = result.as_ref().ok().map(|p| p.id.clone());
            self.audit(&ctx, id, &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Partially updates a project
    pub async fn update_project(
        &self,
        call: &CallMetadata,
        id: &str,
        update: ProjectUpdate,
    ) -> Result<Project, ProjectApiError> {
        let span = info_span!("update_project", correlation_id = %call.correlation_id, id = %id);
        async {
            let ctx = self.authenticate(Operation::UpdateProject, call).await?;
            let result = self.repository.update(id, update).await;
            self.audit(&ctx, Some(id.to_string()), &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Deletes a project
    pub async fn delete_project(&self, call: &CallMetadata, id: &str) -> Result<(), ProjectApiError> {
        let span = info_span!("delete_project", correlation_id = %call.correlation_id, id = %id);
        async {
            let ctx = self.authenticate(Operation::DeleteProject, call).await?;
            let result = self.repository.delete(id).await;
            self.audit(&ctx, Some(id.to_string()), &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Reports store reachability and key ring state; never authenticates
    pub async fn health(&self, call: &CallMetadata) -> HealthReport {
        let span = info_span!("health", correlation_id = %call.correlation_id);
        self.health_report().instrument(span).await
    }

    async fn health_report(&self) -> HealthReport {
        let store = match self.repository.health_check().await {
            Ok(()) => ComponentHealth {
                healthy: true,
                detail: None,
            },
            Err(err) => ComponentHealth {
                healthy: false,
                detail: Some(err.to_string()),
            },
        };
        let key_ring = KeyRingHealth {
            key_count: self.key_ring.key_count(),
            stale: self.key_ring.is_stale(),
        };
        HealthReport {
            status: if store.healthy { "healthy" } else { "degraded" },
            store,
            key_ring,
        }
    }

    /// Package name and version
    pub const fn version(&self) -> VersionInfo {
        VersionInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    async fn audit<T>(
        &self,
        ctx: &RequestContext,
        project_id: Option<String>,
        result: &Result<T, ProjectApiError>,
    ) {
        debug_assert!(ctx.operation.is_write());
        let record = AuditRecord {
            operation: ctx.operation.as_str(),
            project_id,
            actor: ctx.actor().map(str::to_string),
            actor_name: ctx
                .claims()
                .and_then(Claims::preferred_username)
                .map(str::to_string),
            correlation_id: ctx.correlation_id,
            timestamp: Utc::now(),
            outcome: match result {
                Ok(_) => AuditOutcome::Success,
                Err(err) => AuditOutcome::Failure(err.code().as_str()),
            },
        };
        if let Err(err) = self.audit.record(record).await {
            warn!(error = %err, "Audit record dropped");
        }
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}
