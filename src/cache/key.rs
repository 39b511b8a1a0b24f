//! Structural query keys.
//!
//! A key is an ordered sequence of primitive segments, compared segment by
//! segment. `["user", 5]` and `["users"]` are unrelated keys even though one
//! is a string prefix of the other; invalidation and cancellation match on
//! the structural prefix relation only.

use std::fmt;

/// One element of a query key: a collection name or a record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
  Text(String),
  Id(u64),
}

impl fmt::Display for Segment {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Segment::Text(s) => write!(f, "{}", s),
      Segment::Id(n) => write!(f, "{}", n),
    }
  }
}

impl From<&str> for Segment {
  fn from(value: &str) -> Self {
    Segment::Text(value.to_string())
  }
}

impl From<String> for Segment {
  fn from(value: String) -> Self {
    Segment::Text(value)
  }
}

impl From<u64> for Segment {
  fn from(value: u64) -> Self {
    Segment::Id(value)
  }
}

/// Identifier for a cached resource.
///
/// Two keys are equal iff their segment sequences are deep-equal. Equality
/// and hashing are derived from the segments, so keys work directly as map
/// keys without any canonical-string step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<Segment>);

impl QueryKey {
  /// Create a single-segment key, e.g. `QueryKey::new("users")`.
  pub fn new(root: impl Into<Segment>) -> Self {
    QueryKey(vec![root.into()])
  }

  /// Append a segment, e.g. `QueryKey::new("user").push(5u64)`.
  pub fn push(mut self, segment: impl Into<Segment>) -> Self {
    self.0.push(segment.into());
    self
  }

  pub fn segments(&self) -> &[Segment] {
    &self.0
  }

  /// Structural prefix relation used by `invalidate` and `cancel`.
  ///
  /// Every key starts with the empty key, and with itself.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, segment) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ":")?;
      }
      write!(f, "{}", segment)?;
    }
    Ok(())
  }
}

impl From<&str> for QueryKey {
  fn from(value: &str) -> Self {
    QueryKey::new(value)
  }
}
