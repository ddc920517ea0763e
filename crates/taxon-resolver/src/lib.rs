//! Cache-first category resolution for Taxon.
//!
//! [`Resolver`] turns a mixed request of canonical ids and taxonomy names
//! into one ordered, deduplicated list of categories. It serves what it can
//! from a [`taxon_core::store::CategoryStore`], fetches the rest through a
//! [`taxon_core::gateway::CategoryGateway`] in bounded batches, chases the
//! redirects the knowledge base announces, and persists everything it learned
//! before answering.

mod fetch;
mod resolver;

pub mod error;

pub use error::{Error, Result};
pub use resolver::{DEFAULT_MAX_REDIRECT_HOPS, Resolution, Resolver, ResolverConfig};

#[cfg(test)]
mod tests;
