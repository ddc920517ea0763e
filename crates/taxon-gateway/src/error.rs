//! Error type for `taxon-gateway`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{endpoint} responded with status {status}")]
  Status { endpoint: String, status: u16 },

  /// The endpoint answered 200 but reported a failure in the body.
  #[error("{code}: {info}")]
  Api { code: String, info: String },

  #[error("batch of {size} identifiers exceeds the limit of {max}")]
  BatchTooLarge { size: usize, max: usize },

  #[error("malformed response: {0}")]
  Parse(#[from] serde_json::Error),
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
