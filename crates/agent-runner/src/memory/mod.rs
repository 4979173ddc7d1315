//! User memories and session history
//!
//! Two backends sit behind [`MemoryDb`] and [`SessionStorage`]: Postgres for
//! the server and an in-process map for tests and ephemeral chat sessions.

mod manager;
mod postgres;
mod store;
mod types;

pub use manager::{parse_operations, MemoryManager, MemoryOperation, MemoryUpdate};
pub use postgres::{PostgresMemoryDb, PostgresStorage, MEMORY_TABLE, SESSION_TABLE};
pub use store::{InMemoryMemoryDb, InMemoryStorage, MemoryDb, SessionStorage};
pub use types::{RunRecord, SessionRecord, UserMemory};
