//! Session error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("directory error: {0}")]
  Directory(#[from] peerdir_core::Error),
  #[error("unknown call: {0}")]
  UnknownCall(String),
  #[error("call already tracked: {0}")]
  DuplicateCall(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
