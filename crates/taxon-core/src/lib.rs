//! Core types and trait definitions for the Taxon category cache.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The store, gateway and resolver crates all depend on it.

pub mod category;
pub mod error;
pub mod gateway;
pub mod redirect;
pub mod store;

pub use error::{Error, Result};
