//! redb table definitions for [`RedbStore`](crate::RedbStore).
//!
//! Both tables use `&str` keys and JSON-serialized `&[u8]` values.

use redb::TableDefinition;

/// Job records keyed by job id.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Worker records keyed by worker id.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");
