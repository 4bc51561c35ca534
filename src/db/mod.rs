//! Persistence layer: table models, SQLite repositories and the store adapter
//! the pipeline is wired against.

pub mod models;
pub mod repository;
pub mod store;

pub use models::*;
pub use repository::*;
pub use store::SqliteStore;
