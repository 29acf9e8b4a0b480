//! In-memory document store.
//!
//! Documents live in a [`BTreeMap`] behind a [`parking_lot::RwLock`]; every
//! call takes the lock once, so each document operation is atomic. Stored
//! documents carry the same metadata fields the cloud store adds.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use uuid::Uuid;

use crate::project::model::Project;
use crate::project::query::{FilterSpec, SqlQuery};
use crate::project::store::{validate_id, Document, DocumentStore, StoreError};

/// In-memory [`DocumentStore`]
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
    unavailable: AtomicBool,
}

impl MemoryDocumentStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn document_id(document: &Document) -> Result<String, StoreError> {
    match document.get("id") {
        Some(Value::String(id)) => {
            validate_id(id)?;
            Ok(id.clone())
        }
        _ => Err(StoreError::InvalidId { id: String::new() }),
    }
}

/// Adds `_rid`, `_self`, `_etag` and `_ts`, replacing any previous values.
fn stamp(mut document: Document, rid: &str) -> Result<Document, StoreError> {
    document.retain(|key, _| !key.starts_with('_'));
    let body = serde_json::to_vec(&document).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&body)));

    document.insert("_rid".to_string(), Value::from(rid));
    document.insert(
        "_self".to_string(),
        Value::from(format!("dbs/projects/colls/projects/docs/{rid}/")),
    );
    document.insert("_etag".to_string(), Value::from(etag));
    document.insert("_ts".to_string(), Value::from(chrono::Utc::now().timestamp()));
    Ok(document)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: Document) -> Result<Document, StoreError> {
        self.check_available()?;
        let id = document_id(&document)?;
        let rid = Uuid::new_v4().simple().to_string();

        let mut documents = self.documents.write();
        if documents.contains_key(&id) {
            return Err(StoreError::Conflict { id });
        }
        let stored = stamp(document, &rid)?;
        documents.insert(id.clone(), stored.clone());
        debug!(id = %id, "Document created");
        Ok(stored)
    }

    async fn read(&self, id: &str) -> Result<Document, StoreError> {
        self.check_available()?;
        validate_id(id)?;
        self.documents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn replace(&self, id: &str, document: Document) -> Result<Document, StoreError> {
        self.check_available()?;
        validate_id(id)?;
        if document_id(&document)? != id {
            return Err(StoreError::InvalidId { id: id.to_string() });
        }

        let mut documents = self.documents.write();
        let rid = match documents.get(id).and_then(|existing| existing.get("_rid")) {
            Some(Value::String(rid)) => rid.clone(),
            Some(_) => return Err(StoreError::Corrupt(format!("{id} has no _rid"))),
            None => return Err(StoreError::NotFound { id: id.to_string() }),
        };
        let stored = stamp(document, &rid)?;
        documents.insert(id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        validate_id(id)?;
        self.documents
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn query(&self, filter: &FilterSpec, sql: &SqlQuery) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        debug!(query = %sql.text, parameters = sql.parameters.len(), "Evaluating query in memory");
        let documents = self.documents.read();
        let mut matches = Vec::new();
        for (id, document) in documents.iter() {
            let project: Project = serde_json::from_value(Value::Object(document.clone()))
                .map_err(|e| StoreError::Corrupt(format!("{id}: {e}")))?;
            if filter.matches(&project) {
                matches.push(document.clone());
            }
        }
        Ok(matches)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
