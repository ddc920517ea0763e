//! Handlers for `/categories` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/categories` | `?ids=Q1,Q2&names=Earth\|Rivers&refresh=false` |
//! | `GET`  | `/categories/:local_id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use taxon_core::{category::Category, gateway::CategoryGateway, store::CategoryStore};
use taxon_resolver::{Resolution, Resolver};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Resolve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ResolveParams {
  /// Comma-separated canonical ids.
  #[serde(default)]
  pub ids:     String,
  /// `|`-separated taxonomy names; names may themselves contain commas.
  #[serde(default)]
  pub names:   String,
  #[serde(default)]
  pub refresh: bool,
}

fn split(list: &str, separator: char) -> Vec<String> {
  list
    .split(separator)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
    .collect()
}

/// `GET /categories?ids=…&names=…[&refresh=true]`
pub async fn resolve<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
  Query(params): Query<ResolveParams>,
) -> Result<Json<Resolution>, ApiError>
where
  S: CategoryStore,
  G: CategoryGateway,
{
  let ids = split(&params.ids, ',');
  let names = split(&params.names, '|');
  if ids.is_empty() && names.is_empty() {
    return Err(ApiError::BadRequest("expected at least one of `ids` or `names`".into()));
  }

  let resolution = resolver.resolve(&ids, &names, params.refresh).await?;
  Ok(Json(resolution))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /categories/:local_id`
pub async fn get_one<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
  Path(local_id): Path<Uuid>,
) -> Result<Json<Category>, ApiError>
where
  S: CategoryStore,
  G: CategoryGateway,
{
  let category = resolver
    .store()
    .get(local_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("category {local_id} not found")))?;
  Ok(Json(category))
}
