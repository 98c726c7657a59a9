//! gpugrid-state: job and worker records plus the store they live in.
//!
//! # Architecture
//!
//! The scheduler talks to state only through the [`Store`] trait, so the
//! backend can be swapped without touching scheduling logic:
//!
//! - [`MemoryStore`]: plain maps behind a lock, the default.
//! - [`RedbStore`]: JSON values in redb tables, on disk or in memory.
//!
//! Status changes happen through the transition methods on [`Job`] and
//! [`Worker`]; nothing else writes a status field.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::Store;
pub use types::*;
