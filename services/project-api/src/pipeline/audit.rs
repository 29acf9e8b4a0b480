//! Audit trail seam for write operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Failure to persist an audit record
#[derive(Error, Debug)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// How the audited call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "code", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Completed
    Success,
    /// Failed with this error code
    Failure(&'static str),
}

/// Who did what to which project, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// Operation name
    pub operation: &'static str,
    /// Affected project, when known
    pub project_id: Option<String>,
    /// Subject of the verified token
    pub actor: Option<String>,
    /// Display name of the actor
    pub actor_name: Option<String>,
    /// Correlation id of the call
    pub correlation_id: Uuid,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
    /// Result
    pub outcome: AuditOutcome,
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one record
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Writes audit records as structured `tracing` events on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        let outcome = match record.outcome {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure(code) => code,
        };
        tracing::info!(
            target: "audit",
            operation = record.operation,
            project_id = record.project_id.as_deref(),
            actor = record.actor.as_deref(),
            actor_name = record.actor_name.as_deref(),
            correlation_id = %record.correlation_id,
            timestamp = %record.timestamp.to_rfc3339(),
            outcome,
            "Project operation audited"
        );
        Ok(())
    }
}
