//! Unified error type for cache, mutation, and HTTP operations.

/// Errors surfaced by this crate.
///
/// `Clone` so a settled failure can be recorded on a cache entry and handed
/// to every caller attached to the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  /// The server answered with a non-success HTTP status.
  #[error("network error: status {status}")]
  Network { status: u16 },

  /// The connection itself failed (DNS, refused, timeout, ...).
  #[error("transport error: {message}")]
  Transport { message: String },

  /// Cached or wire data did not match the requested type.
  #[error("decode error: {message}")]
  Decode { message: String },

  /// Configuration could not be loaded or parsed.
  #[error("config error: {message}")]
  Config { message: String },

  /// The fetch this caller was waiting on was cancelled before it settled.
  #[error("fetch cancelled before completion")]
  Cancelled,

  /// The cache mutex was poisoned by a panicking thread.
  #[error("cache lock poisoned")]
  LockPoisoned,
}

impl Error {
  /// True for failures of the request/response exchange itself.
  pub fn is_network(&self) -> bool {
    matches!(self, Error::Network { .. })
  }

  pub fn is_transport(&self) -> bool {
    matches!(self, Error::Transport { .. })
  }

  pub(crate) fn decode(err: serde_json::Error) -> Self {
    Error::Decode {
      message: err.to_string(),
    }
  }

  pub(crate) fn config(message: impl Into<String>) -> Self {
    Error::Config {
      message: message.into(),
    }
  }

  /// Map a reqwest failure onto our error kinds. Status errors are handled
  /// before this point, so anything left is either a body-decode problem or
  /// a connection-level failure.
  pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Error::Decode {
        message: err.to_string(),
      }
    } else {
      Error::Transport {
        message: err.to_string(),
      }
    }
  }
}
