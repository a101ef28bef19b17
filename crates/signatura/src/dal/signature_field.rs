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

//! Signature field DAL.

use diesel::prelude::*;
use uuid::Uuid;

use super::models::{decode_all, uuid_to_blob, SqliteSignatureField};
use super::DAL;
use crate::database::schema::{signature_fields, signature_requests};
use crate::error::StorageError;
use crate::models::SignatureField;

#[derive(Clone)]
pub struct SignatureFieldDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SignatureFieldDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Fields of a request, page then position order.
    pub async fn list_for_request(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
    ) -> Result<Vec<SignatureField>, StorageError> {
        self.list(tenant_id, request_id, None).await
    }

    /// Fields a given signer fills.
    pub async fn list_for_signer(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        signer_id: Uuid,
    ) -> Result<Vec<SignatureField>, StorageError> {
        self.list(tenant_id, request_id, Some(signer_id)).await
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        signer_id: Option<Uuid>,
    ) -> Result<Vec<SignatureField>, StorageError> {
        let (tenant, request) = (uuid_to_blob(&tenant_id), uuid_to_blob(&request_id));
        let signer = signer_id.as_ref().map(uuid_to_blob);
        let rows = self
            .dal
            .database
            .interact(move |conn| {
                let owned: i64 = signature_requests::table
                    .filter(signature_requests::id.eq(&request))
                    .filter(signature_requests::tenant_id.eq(&tenant))
                    .count()
                    .get_result(conn)?;
                if owned == 0 {
                    return Err(StorageError::not_found("signature_request", request_id));
                }

                let mut query = signature_fields::table
                    .filter(signature_fields::request_id.eq(request))
                    .into_boxed();
                if let Some(signer) = signer {
                    query = query.filter(signature_fields::signer_id.eq(signer));
                }
                Ok(query
                    .order((
                        signature_fields::page.asc(),
                        signature_fields::y.asc(),
                        signature_fields::x.asc(),
                    ))
                    .select(SqliteSignatureField::as_select())
                    .load::<SqliteSignatureField>(conn)?)
            })
            .await?;
        decode_all(rows)
    }
}
