//! Error types for `taxon-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("category has neither a canonical id nor a taxonomy name")]
  MissingIdentity,

  #[error("canonical id {0} cannot redirect to itself")]
  SelfRedirect(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
