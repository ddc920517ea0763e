//! The `CategoryStore` and `InteractionTracker` traits.
//!
//! The traits are implemented by storage backends (e.g. `taxon-store-sqlite`).
//! The resolver and the API depend on this abstraction, not on any concrete
//! backend.

use std::{collections::HashMap, future::Future};

use uuid::Uuid;

use crate::category::Category;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Persistent cache of categories keyed by two independently nullable, unique
/// keys: the canonical id and the taxonomy name.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CategoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or update a populated category and return the stored row.
  ///
  /// The incoming category may match one existing row by canonical id and a
  /// different one by taxonomy name. In that case the two rows are merged
  /// into the id-matched one, interaction state included, atomically.
  fn upsert(
    &self,
    category: Category,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + '_;

  /// Upsert every populated category and record every `from → to` redirect
  /// as a stub row, in one transaction.
  ///
  /// Categories whose canonical id is a redirect source are not stored as
  /// populated rows. Only populated rows are returned.
  fn upsert_all(
    &self,
    categories: Vec<Category>,
    redirects: HashMap<String, String>,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + '_;

  /// Fetch rows by canonical id, in request order.
  ///
  /// With `resolve_redirections`, stubs are replaced by the row their chain
  /// ends at and never returned themselves.
  fn fetch_by_ids<'a>(
    &'a self,
    ids: &'a [String],
    resolve_redirections: bool,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + 'a;

  /// Fetch rows by taxonomy name, in request order.
  fn fetch_by_names<'a>(
    &'a self,
    names: &'a [String],
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + 'a;

  /// Every stored redirect hop reachable from `ids`.
  fn redirects_from<'a>(
    &'a self,
    ids: &'a [String],
  ) -> impl Future<Output = Result<HashMap<String, String>, Self::Error>> + Send + 'a;

  /// Retrieve a row by local id. Returns `None` if not found.
  fn get(
    &self,
    local_id: Uuid,
  ) -> impl Future<Output = Result<Option<Category>, Self::Error>> + Send + '_;

  /// Number of stored rows, stubs included.
  fn count(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Interaction tracking ────────────────────────────────────────────────────

/// View and bookmark state, created lazily per category.
///
/// A category is addressed by its `local_id`; when that is absent or no longer
/// stored (e.g. the row was merged away) it is looked up by its identity.
pub trait InteractionTracker: CategoryStore {
  /// Increment the view count and stamp `last_viewed_at` with now.
  fn record_view<'a>(
    &'a self,
    category: &'a Category,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + 'a;

  /// Set or clear the bookmark flag.
  fn set_bookmark<'a>(
    &'a self,
    category: &'a Category,
    bookmarked: bool,
  ) -> impl Future<Output = Result<Category, Self::Error>> + Send + 'a;

  /// All bookmarked categories, ordered by label.
  fn bookmarked(&self) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + '_;

  /// The most recently viewed categories, newest first.
  fn recently_viewed(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Category>, Self::Error>> + Send + '_;
}
