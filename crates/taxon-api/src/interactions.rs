//! Handlers for user interactions with cached categories.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/categories/:local_id/view` | Records a view |
//! | `PUT`  | `/categories/:local_id/bookmark` | Body: `{"bookmarked":true}` |
//! | `GET`  | `/bookmarks` | Ordered by label |
//! | `GET`  | `/recent` | Optional `?limit=<n>`, newest first |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use taxon_core::{category::Category, gateway::CategoryGateway, store::InteractionTracker};
use taxon_resolver::Resolver;
use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_RECENT_LIMIT: usize = 20;
const MAX_RECENT_LIMIT: usize = 200;

async fn load<S>(store: &S, local_id: Uuid) -> Result<Category, ApiError>
where
  S: InteractionTracker,
{
  store
    .get(local_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("category {local_id} not found")))
}

// ─── Views ────────────────────────────────────────────────────────────────────

/// `POST /categories/:local_id/view`
pub async fn view<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
  Path(local_id): Path<Uuid>,
) -> Result<Json<Category>, ApiError>
where
  S: InteractionTracker,
  G: CategoryGateway,
{
  let store = resolver.store();
  let category = load(store.as_ref(), local_id).await?;
  let category = store
    .record_view(&category)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(category))
}

// ─── Bookmarks ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BookmarkBody {
  pub bookmarked: bool,
}

/// `PUT /categories/:local_id/bookmark` with body `{"bookmarked":true}`
pub async fn bookmark<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
  Path(local_id): Path<Uuid>,
  Json(body): Json<BookmarkBody>,
) -> Result<Json<Category>, ApiError>
where
  S: InteractionTracker,
  G: CategoryGateway,
{
  let store = resolver.store();
  let category = load(store.as_ref(), local_id).await?;
  let category = store
    .set_bookmark(&category, body.bookmarked)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(category))
}

/// `GET /bookmarks`
pub async fn bookmarks<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
) -> Result<Json<Vec<Category>>, ApiError>
where
  S: InteractionTracker,
  G: CategoryGateway,
{
  let categories = resolver
    .store()
    .bookmarked()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(categories))
}

// ─── Recent ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecentParams {
  pub limit: Option<usize>,
}

/// `GET /recent[?limit=<n>]`
pub async fn recent<S, G>(
  State(resolver): State<Arc<Resolver<S, G>>>,
  Query(params): Query<RecentParams>,
) -> Result<Json<Vec<Category>>, ApiError>
where
  S: InteractionTracker,
  G: CategoryGateway,
{
  let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
  if limit == 0 || limit > MAX_RECENT_LIMIT {
    return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_RECENT_LIMIT}")));
  }

  let categories = resolver
    .store()
    .recently_viewed(limit)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(categories))
}
