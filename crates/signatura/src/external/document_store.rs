/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Document storage interface.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error("document not found: {0}")]
    NotFound(Uuid),

    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    async fn get_document_content(&self, document_id: Uuid) -> Result<Vec<u8>, DocumentStoreError>;

    /// Stores a signed rendition of `original_id` and returns its reference.
    async fn store_signed_document(
        &self,
        tenant_id: Uuid,
        original_id: Uuid,
        content: Vec<u8>,
        title: &str,
    ) -> Result<Uuid, DocumentStoreError>;
}

/// A stored document.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub tenant_id: Option<Uuid>,
    pub original_id: Option<Uuid>,
    pub title: String,
    pub content: Vec<u8>,
}

/// In-process document store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<Uuid, StoredDocument>>>,
    failing_reads: Arc<RwLock<HashSet<Uuid>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an original document and returns its id.
    pub fn insert(&self, title: &str, content: impl Into<Vec<u8>>) -> Uuid {
        let id = Uuid::new_v4();
        self.documents.write().insert(
            id,
            StoredDocument {
                tenant_id: None,
                original_id: None,
                title: title.to_string(),
                content: content.into(),
            },
        );
        id
    }

    pub fn get(&self, id: Uuid) -> Option<StoredDocument> {
        self.documents.read().get(&id).cloned()
    }

    /// Makes reads of `id` fail as if the backend were down.
    pub fn fail_reads_of(&self, id: Uuid) {
        self.failing_reads.write().insert(id);
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document_content(&self, document_id: Uuid) -> Result<Vec<u8>, DocumentStoreError> {
        if self.failing_reads.read().contains(&document_id) {
            return Err(DocumentStoreError::Unavailable(format!(
                "read of {document_id} failed"
            )));
        }
        self.documents
            .read()
            .get(&document_id)
            .map(|d| d.content.clone())
            .ok_or(DocumentStoreError::NotFound(document_id))
    }

    async fn store_signed_document(
        &self,
        tenant_id: Uuid,
        original_id: Uuid,
        content: Vec<u8>,
        title: &str,
    ) -> Result<Uuid, DocumentStoreError> {
        let id = Uuid::new_v4();
        self.documents.write().insert(
            id,
            StoredDocument {
                tenant_id: Some(tenant_id),
                original_id: Some(original_id),
                title: title.to_string(),
                content,
            },
        );
        Ok(id)
    }
}
