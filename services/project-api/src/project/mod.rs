//! The project resource: model, persistence and queries.

pub mod engine;
pub mod memory;
pub mod model;
pub mod query;
pub mod repository;
pub mod store;

pub use engine::{ProjectStats, QueryEngine};
pub use memory::MemoryDocumentStore;
pub use model::{
    decode_input, Priority, Project, ProjectCreate, ProjectStatus, ProjectUpdate, RiskLevel, UnknownVariant,
};
pub use query::{
    FilterSpec, Page, PaginationSpec, QueryPage, QueryPlan, SortField, SortOrder, SqlQuery,
};
pub use repository::Repository;
pub use store::{validate_id, Document, DocumentStore, StoreError};
