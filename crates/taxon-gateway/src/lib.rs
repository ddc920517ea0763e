//! HTTP implementation of [`taxon_core::gateway::CategoryGateway`] against
//! Wikidata.
//!
//! Item payloads and the Commons-category crossref come from the SPARQL query
//! service; labels, descriptions and redirects come from `wbgetentities`,
//! which applies language fallback and reports merged items.

mod client;
mod entities;
mod sparql;

pub mod error;

pub use client::{GatewayConfig, WikidataGateway};
pub use error::{GatewayError, Result};
