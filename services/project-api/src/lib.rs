//! Project API core - bearer-token authentication and project queries.
//!
//! This crate provides the core of the project service: JWT validation with
//! the type-state pattern against a rotating, single-flight key ring, and a
//! project repository with a filter/sort/paginate query engine behind an
//! authenticating request pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod jwt;
pub mod observability;
pub mod pipeline;
pub mod project;
pub mod retry;
pub mod shutdown;

pub use config::{Config, ConfigError};
pub use error::{ErrorCode, ErrorResponse, ProjectApiError};
pub use jwt::{Claims, KeyRing, KeyRingSettings, TokenValidator};
pub use pipeline::{CallMetadata, Operation, RequestContext, RequestPipeline};
pub use project::{
    FilterSpec, MemoryDocumentStore, PaginationSpec, Project, QueryEngine, QueryPage, Repository,
};
