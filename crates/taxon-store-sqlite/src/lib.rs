//! SQLite backend for the Taxon category cache.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every closure handed to that thread
//! runs to completion before the next one starts, and multi-row writes run in
//! `BEGIN IMMEDIATE` transactions.

mod encode;
mod merge;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
