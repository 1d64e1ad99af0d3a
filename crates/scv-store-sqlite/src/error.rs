//! Error type for `scv-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// Profile read for a client id with no registered client row.
  #[error("client not found: {0}")]
  ClientNotFound(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
