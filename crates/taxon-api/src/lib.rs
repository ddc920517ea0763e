//! JSON REST API for Taxon.
//!
//! Exposes an axum [`Router`] over a [`Resolver`] and the store behind it.
//! The `taxon-server` binary in this crate wires it to SQLite and Wikidata.

pub mod categories;
pub mod config;
pub mod error;
pub mod interactions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use taxon_core::{gateway::CategoryGateway, store::InteractionTracker};
use taxon_resolver::Resolver;

pub use config::ServerConfig;
pub use error::ApiError;

/// Build the API router for `resolver`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn router<S, G>(resolver: Arc<Resolver<S, G>>) -> Router<()>
where
  S: InteractionTracker + 'static,
  G: CategoryGateway + 'static,
{
  Router::new()
    // Resolution
    .route("/categories", get(categories::resolve::<S, G>))
    .route("/categories/{local_id}", get(categories::get_one::<S, G>))
    // Interactions
    .route("/categories/{local_id}/view", post(interactions::view::<S, G>))
    .route("/categories/{local_id}/bookmark", put(interactions::bookmark::<S, G>))
    .route("/bookmarks", get(interactions::bookmarks::<S, G>))
    .route("/recent", get(interactions::recent::<S, G>))
    .with_state(resolver)
}
