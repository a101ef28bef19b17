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

//! Signed artifact written to the document store on completion.
//!
//! The artifact is a JSON manifest binding the document hash to every
//! signature produced over it. It carries names and certificate details but
//! never email addresses or BPK values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CertificateInfo, Signer};
use crate::signing_api::HASH_ALGORITHM_SHA256;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSignature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub identity_subject: String,
    pub signature_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
    pub signed_at: DateTime<Utc>,
}

impl ManifestSignature {
    /// Entry for a signed signer. `None` if the signer has no signature yet.
    pub fn from_signer(signer: &Signer) -> Option<Self> {
        Some(Self {
            signer_id: Some(signer.id),
            order_index: Some(signer.order_index),
            name: Some(signer.name.clone()),
            identity_subject: signer.identity_subject.clone()?,
            signature_value: signer.signature_value.clone()?,
            signature_timestamp: signer.signature_timestamp.clone(),
            certificate: signer.certificate.clone(),
            signed_at: signer.signed_at?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureManifest {
    pub version: u32,
    pub document_id: Uuid,
    pub document_hash: String,
    pub hash_algorithm: String,
    pub title: String,
    pub signatures: Vec<ManifestSignature>,
    pub completed_at: DateTime<Utc>,
}

impl SignatureManifest {
    pub fn new(
        document_id: Uuid,
        document_hash: impl Into<String>,
        title: impl Into<String>,
        signatures: Vec<ManifestSignature>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION,
            document_id,
            document_hash: document_hash.into(),
            hash_algorithm: HASH_ALGORITHM_SHA256.to_string(),
            title: title.into(),
            signatures,
            completed_at,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}
