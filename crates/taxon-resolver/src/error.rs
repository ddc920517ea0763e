//! Error type for `taxon-resolver`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A gateway call failed; the whole resolution is abandoned.
  #[error("gateway error: {0}")]
  Gateway(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("redirect cycle through {0}")]
  RedirectCycle(String),

  #[error("redirect chain through {id} is longer than {max_hops} hops")]
  RedirectDepthExceeded { id: String, max_hops: usize },
}

impl Error {
  pub(crate) fn gateway(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Gateway(Box::new(e))
  }

  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
