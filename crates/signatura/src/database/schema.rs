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

//! Diesel table definitions for the SQLite store.
//!
//! Kept in step with `migrations/sqlite` by hand.

diesel::table! {
    signature_requests (id) {
        id -> Binary,
        tenant_id -> Binary,
        document_id -> Binary,
        name -> Nullable<Text>,
        message -> Nullable<Text>,
        expires_at -> Text,
        status -> Text,
        is_sequential -> Bool,
        current_signer_index -> Integer,
        signed_document_id -> Nullable<Binary>,
        created_by -> Binary,
        created_at -> Text,
        updated_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    signers (id) {
        id -> Binary,
        request_id -> Binary,
        tenant_id -> Binary,
        email -> Text,
        name -> Text,
        order_index -> Integer,
        token -> Text,
        token_expires_at -> Text,
        token_used -> Bool,
        status -> Text,
        certificate -> Nullable<Text>,
        signature_value -> Nullable<Text>,
        signature_timestamp -> Nullable<Text>,
        identity_subject -> Nullable<Text>,
        bpk_hash -> Nullable<Text>,
        notified_at -> Nullable<Text>,
        signed_at -> Nullable<Text>,
        reminder_count -> Integer,
        last_reminder_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    signature_fields (id) {
        id -> Binary,
        request_id -> Binary,
        signer_id -> Nullable<Binary>,
        page -> Integer,
        x -> Double,
        y -> Double,
        width -> Double,
        height -> Double,
        show_name -> Bool,
        show_date -> Bool,
        show_reason -> Bool,
        reason -> Nullable<Text>,
    }
}

diesel::table! {
    signature_batches (id) {
        id -> Binary,
        tenant_id -> Binary,
        created_by -> Binary,
        name -> Nullable<Text>,
        total_documents -> Integer,
        status -> Text,
        signed_count -> Integer,
        failed_count -> Integer,
        identity_subject -> Nullable<Text>,
        bpk_hash -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
        completed_at -> Nullable<Text>,
    }
}

diesel::table! {
    signature_batch_items (id) {
        id -> Binary,
        batch_id -> Binary,
        position -> Integer,
        document_id -> Binary,
        title -> Nullable<Text>,
        status -> Text,
        error_message -> Nullable<Text>,
        document_hash -> Nullable<Text>,
        signature_value -> Nullable<Text>,
        signed_document_id -> Nullable<Binary>,
        signed_at -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    signature_audit_events (seq) {
        seq -> BigInt,
        id -> Binary,
        tenant_id -> Binary,
        request_id -> Nullable<Binary>,
        signer_id -> Nullable<Binary>,
        batch_id -> Nullable<Binary>,
        verification_id -> Nullable<Binary>,
        event_type -> Text,
        details -> Text,
        actor_type -> Text,
        actor_id -> Nullable<Text>,
        client_ip -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    oidc_sessions (id) {
        id -> Binary,
        tenant_id -> Binary,
        state -> Text,
        nonce -> Text,
        code_verifier -> Text,
        binding_kind -> Text,
        binding_id -> Binary,
        redirect_after -> Nullable<Text>,
        status -> Text,
        identity_subject -> Nullable<Text>,
        bpk_hash -> Nullable<Text>,
        created_at -> Text,
        authenticated_at -> Nullable<Text>,
        updated_at -> Text,
    }
}

diesel::table! {
    usage_records (seq) {
        seq -> BigInt,
        id -> Binary,
        tenant_id -> Binary,
        request_id -> Nullable<Binary>,
        batch_id -> Nullable<Binary>,
        signature_count -> Integer,
        cost_cents -> Nullable<BigInt>,
        created_at -> Text,
    }
}

diesel::table! {
    audit_logs (seq) {
        seq -> BigInt,
        id -> Binary,
        tenant_id -> Binary,
        user_id -> Nullable<Binary>,
        action -> Text,
        resource_type -> Text,
        resource_id -> Nullable<Text>,
        details -> Text,
        ip_address -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    security_events (seq) {
        seq -> BigInt,
        id -> Binary,
        event_type -> Text,
        severity -> Text,
        outcome -> Text,
        tenant_id -> Nullable<Binary>,
        actor_id -> Nullable<Text>,
        client_ip -> Nullable<Text>,
        user_agent -> Nullable<Text>,
        metadata -> Text,
        occurred_at -> Text,
    }
}

diesel::table! {
    two_factor_enrollments (tenant_id, user_id) {
        tenant_id -> Binary,
        user_id -> Binary,
        encrypted_secret -> Binary,
        encrypted_recovery_codes -> Binary,
        enabled_at -> Text,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    signature_requests,
    signers,
    signature_fields,
    signature_batches,
    signature_batch_items,
    signature_audit_events,
    oidc_sessions,
    usage_records,
    audit_logs,
    security_events,
    two_factor_enrollments,
);
