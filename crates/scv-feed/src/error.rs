//! Error types for `scv-feed`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("feed has no header row")]
  MissingHeader,

  #[error("header row names no columns")]
  EmptyHeader,

  #[error("unterminated quoted field on line {line}")]
  UnterminatedQuote { line: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
