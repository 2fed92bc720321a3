// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Synchronizer between the record store and the analytics store.
//!
//! Runs on demand (audits, CLI `sync`) and on a periodic tokio task. Pending
//! markers live in the record store, so a crash at any point only delays
//! synchronization.

pub mod synchronizer;

pub use synchronizer::{SyncHandle, SyncReport, Synchronizer, DEFAULT_BATCH_SIZE};
