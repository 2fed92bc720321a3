// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Execution records: the unit of telemetry.
//!
//! A record describes one instrumented invocation. Records are immutable once
//! written; a correction is a later record, never an edit.

pub mod bounded;
pub mod types;

pub use bounded::{
    bound_value, bounded_json, bounded_payload, is_truncated, MAX_CONTAINER_ENTRIES,
    MAX_STRING_CHARS, TRUNCATED_KEY, TRUNCATION_MARKER, UNSERIALIZABLE_KEY,
};
pub use types::{component_identity, layers, ExecutionRecord, ExecutionStatus, Payload};
