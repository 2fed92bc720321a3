// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! redb table definitions for the record store.
//!
//! Index keys are composite strings joined with [`KEY_SEPARATOR`]; timestamps
//! are zero-padded so lexicographic order matches chronological order.

use redb::TableDefinition;

/// Serialized records keyed by record id.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Secondary index keyed by `{context_type}␟{context_id}␟{timestamp_us}␟{id}`, value is the id.
pub const CONTEXT_INDEX: TableDefinition<&str, &str> = TableDefinition::new("context_index");

/// Chronological index keyed by `{timestamp_us}␟{id}`, value is the id.
pub const TIME_INDEX: TableDefinition<&str, &str> = TableDefinition::new("time_index");

/// Pending-sync markers keyed by a monotonically increasing sequence number.
pub const PENDING: TableDefinition<u64, &str> = TableDefinition::new("pending");

/// Reverse lookup from record id to its pending sequence number.
pub const PENDING_IDS: TableDefinition<&str, u64> = TableDefinition::new("pending_ids");

/// Store counters.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Counter holding the next pending sequence number.
pub const NEXT_PENDING_SEQ: &str = "next_pending_seq";

/// Separator between composite key parts (ASCII unit separator).
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Sorts after every timestamp digit; used as an exclusive range bound.
const RANGE_END: char = '\u{7f}';

/// Prefix shared by all index entries of one context.
pub fn context_prefix(context_type: &str, context_id: &str) -> String {
    format!(
        "{}{sep}{}{sep}",
        context_type,
        context_id,
        sep = KEY_SEPARATOR
    )
}

/// Exclusive upper bound for a prefix scan.
pub fn prefix_end(prefix: &str) -> String {
    format!("{}{}", prefix, RANGE_END)
}

/// Full context index key for one record.
pub fn context_key(context_type: &str, context_id: &str, timestamp_us: u64, id: &str) -> String {
    format!(
        "{}{:020}{}{}",
        context_prefix(context_type, context_id),
        timestamp_us,
        KEY_SEPARATOR,
        id
    )
}

/// Chronological index key for one record.
pub fn time_key(timestamp_us: u64, id: &str) -> String {
    format!("{:020}{}{}", timestamp_us, KEY_SEPARATOR, id)
}
