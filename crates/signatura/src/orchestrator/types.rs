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

//! Inputs and results of orchestrator operations.

use uuid::Uuid;

use crate::models::{SignatureField, SignatureRequest, Signer};

/// One party to invite.
#[derive(Debug, Clone, PartialEq)]
pub struct SignerInput {
    pub email: String,
    pub name: String,
    /// Explicit order; defaults to the position in the list.
    pub order_index: Option<i32>,
}

impl SignerInput {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            order_index: None,
        }
    }

    pub fn at(mut self, order_index: i32) -> Self {
        self.order_index = Some(order_index);
        self
    }
}

/// Placement of a visible signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInput {
    /// Index into [`CreateSignatureRequest::signers`] of the signer who fills
    /// this field, if bound.
    pub signer: Option<usize>,
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub show_name: bool,
    pub show_date: bool,
    pub show_reason: bool,
    pub reason: Option<String>,
}

impl FieldInput {
    pub fn new(page: i32, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            signer: None,
            page,
            x,
            y,
            width,
            height,
            show_name: true,
            show_date: true,
            show_reason: false,
            reason: None,
        }
    }

    pub fn for_signer(mut self, signer: usize) -> Self {
        self.signer = Some(signer);
        self
    }
}

/// Everything needed to open a signature request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateSignatureRequest {
    pub document_id: Uuid,
    pub name: Option<String>,
    pub message: Option<String>,
    pub signers: Vec<SignerInput>,
    pub fields: Vec<FieldInput>,
    pub is_sequential: bool,
    /// Defaults to the configured link expiry.
    pub expires_in_days: Option<i64>,
}

impl CreateSignatureRequest {
    pub fn new(document_id: Uuid) -> Self {
        Self {
            document_id,
            name: None,
            message: None,
            signers: Vec::new(),
            fields: Vec::new(),
            is_sequential: false,
            expires_in_days: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn signer(mut self, signer: SignerInput) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn field(mut self, field: FieldInput) -> Self {
        self.fields.push(field);
        self
    }

    pub fn sequential(mut self, is_sequential: bool) -> Self {
        self.is_sequential = is_sequential;
        self
    }

    pub fn expires_in_days(mut self, days: i64) -> Self {
        self.expires_in_days = Some(days);
        self
    }
}

/// A request with its signers and fields.
#[derive(Debug, Clone)]
pub struct RequestDetails {
    pub request: SignatureRequest,
    pub signers: Vec<Signer>,
    pub fields: Vec<SignatureField>,
}

/// What a signer sees when opening their link. Only returned when signing
/// may begin.
#[derive(Debug, Clone)]
pub struct SigningInfo {
    pub request: SignatureRequest,
    pub signer: Signer,
    /// Fields bound to this signer.
    pub fields: Vec<SignatureField>,
    pub total_signers: usize,
}

/// Result of a completed signer callback.
#[derive(Debug, Clone)]
pub struct SigningOutcome {
    pub request: SignatureRequest,
    pub signer: Signer,
    /// Signer invited as a result of this signature (sequential mode).
    pub next_signer: Option<Uuid>,
    pub redirect_after: Option<String>,
}

impl SigningOutcome {
    pub fn request_completed(&self) -> bool {
        self.request.signed_document_id.is_some()
    }
}
