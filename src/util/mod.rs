//! Utility modules: retry, blocking adapters, SQLite pools.

pub mod blocking;
pub mod retry;
pub mod sqlite;
