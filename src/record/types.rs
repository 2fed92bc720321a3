// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Execution record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::bounded::bound_map;

/// Structured payload attached to a record (request, response, metadata).
pub type Payload = Map<String, Value>;

/// Well-known layers. The layer set is open; any string is accepted.
pub mod layers {
    /// A plain function call.
    pub const FUNCTION: &str = "function";
    /// A tool invocation.
    pub const TOOL: &str = "tool";
    /// A workflow step.
    pub const STEP: &str = "step";
    /// A graph node.
    pub const NODE: &str = "node";
    /// A complete workflow run.
    pub const WORKFLOW: &str = "workflow";

    /// All built-in layers, innermost first.
    pub const ALL: &[&str] = &[FUNCTION, TOOL, STEP, NODE, WORKFLOW];
}

/// Outcome of an instrumented invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    Retry,
}

impl ExecutionStatus {
    /// Get the status as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Retry => "retry",
        }
    }

    /// Parse a status from a string. Unknown values map to `Error`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "timeout" => Self::Timeout,
            "retry" => Self::Retry,
            _ => Self::Error,
        }
    }

    /// Whether this status counts as a failure in error-rate figures.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Timeout)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry describing a single instrumented invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Globally unique identifier. Empty until assigned by the record store.
    pub id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Layer being tracked ("tool", "step", ...).
    pub context_type: String,
    /// Stable identifier of the instrumented component.
    pub context_id: String,
    /// Human-readable component name.
    pub context_name: String,
    /// Identity (`layer:name`) of the enclosing instrumented call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<String>,
    /// Bounded view of the inputs.
    #[serde(default)]
    pub request_data: Payload,
    /// Bounded view of the result.
    #[serde(default)]
    pub response_data: Payload,
    /// Auxiliary fields (peak memory, I/O bytes, thread count, ...).
    #[serde(default)]
    pub metadata: Payload,
    pub duration_ms: f64,
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snapshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
}

impl ExecutionRecord {
    /// Create a successful, zero-cost record for a component.
    ///
    /// The context id defaults to the component name.
    pub fn new(context_type: impl Into<String>, context_name: impl Into<String>) -> Self {
        let context_name = context_name.into();
        Self {
            id: String::new(),
            timestamp: Utc::now(),
            context_type: context_type.into(),
            context_id: context_name.clone(),
            context_name,
            parent_context: None,
            request_data: Payload::new(),
            response_data: Payload::new(),
            metadata: Payload::new(),
            duration_ms: 0.0,
            memory_mb: 0.0,
            cpu_percent: 0.0,
            status: ExecutionStatus::Success,
            error: None,
            code_snapshot: None,
            code_hash: None,
            variant_id: None,
        }
    }

    /// Generate a new record identifier.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Set an explicit record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the stable context id.
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    /// Set the parent context identity.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_context = Some(parent.into());
        self
    }

    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the wall-clock duration.
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the memory figure.
    pub fn with_memory_mb(mut self, memory_mb: f64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Set the CPU figure.
    pub fn with_cpu_percent(mut self, cpu_percent: f64) -> Self {
        self.cpu_percent = cpu_percent;
        self
    }

    /// Mark the record as failed with a message.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.status = ExecutionStatus::Error;
        self.error = Some(message.into());
        self
    }

    /// Set the status without touching the error message.
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach request data.
    pub fn with_request(mut self, request: Payload) -> Self {
        self.request_data = request;
        self
    }

    /// Attach response data.
    pub fn with_response(mut self, response: Payload) -> Self {
        self.response_data = response;
        self
    }

    /// Insert a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a code snapshot and its hash.
    pub fn with_code(mut self, snapshot: impl Into<String>, hash: impl Into<String>) -> Self {
        self.code_snapshot = Some(snapshot.into());
        self.code_hash = Some(hash.into());
        self
    }

    /// Link the record to a code variant.
    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    /// Identity of the component this record describes (`layer:name`).
    pub fn component_identity(&self) -> String {
        component_identity(&self.context_type, &self.context_name)
    }

    /// Apply the payload size bounds to every structured field.
    ///
    /// Non-finite metrics become zero; JSON cannot carry them and the stored
    /// record would no longer decode.
    pub fn enforce_bounds(&mut self) {
        bound_map(&mut self.request_data);
        bound_map(&mut self.response_data);
        bound_map(&mut self.metadata);
        for metric in [&mut self.duration_ms, &mut self.memory_mb, &mut self.cpu_percent] {
            if !metric.is_finite() {
                *metric = 0.0;
            }
        }
    }

    /// Timestamp as microseconds since the Unix epoch, clamped at zero.
    pub fn timestamp_micros(&self) -> u64 {
        u64::try_from(self.timestamp.timestamp_micros()).unwrap_or(0)
    }
}

/// Label used to relate nested executions: `layer:name`.
pub fn component_identity(layer: &str, name: &str) -> String {
    format!("{}:{}", layer, name)
}
