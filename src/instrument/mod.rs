// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumentation wrapper.
//!
//! Captures timing, resource deltas, and bounded inputs/outputs of each
//! invocation and writes one record per call to a [`RecordSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_perf::instrument::Collector;
//! use codi_perf::record::layers;
//!
//! let collector = Collector::new(store.clone());
//! let matches = collector.call(layers::TOOL, "grep", &args, || grep(&args))?;
//!
//! // Explicit scope for code that cannot be expressed as a closure.
//! let scope = collector.begin(layers::STEP, "plan");
//! let plan = build_plan();
//! scope.finish_ok(&plan)?;
//! ```
//!
//! [`RecordSink`]: crate::store::RecordSink

pub mod collector;
pub mod context;
pub mod sampler;
pub mod scope;

pub use collector::Collector;
pub use context::current_parent;
pub use sampler::{MemoryPressure, ResourceSampler, ResourceSnapshot, ResourceUsage};
pub use scope::{CodeSnapshot, ExecutionScope};
