// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Analytics store: the query-optimized tier.
//!
//! A SQLite projection of the record store. It holds one row per synced
//! record plus a per-component summary table that is refreshed inside the
//! same transaction as each batch insert.
//!
//! # Example
//!
//! ```rust,ignore
//! use codi_perf::analytics::{AggregateFilter, AnalyticsStore, GroupBy};
//!
//! let analytics = AnalyticsStore::open(Path::new("analytics.db"))?;
//! let rows = analytics.aggregate(&AggregateFilter::component("tool", "grep"), GroupBy::None)?;
//! println!("p95 = {:.1}ms", rows[0].p95_duration_ms);
//! ```

pub mod database;
pub mod types;

pub use database::{AnalyticsStore, SCHEMA_VERSION};
pub use types::{
    percentile, AggregateFilter, AggregateRow, ComponentSummary, GroupBy, GroupKey, LayerSummary,
};
