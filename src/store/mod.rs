//! Persistence for accounts, rules, and reviews.

mod libsql_backend;
pub mod migrations;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, LlmCallRecord};
