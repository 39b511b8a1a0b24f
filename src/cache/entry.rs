//! Per-key cache entry state.
//!
//! Entries store their data as a canonical `serde_json::Value` so one cache
//! can hold heterogeneous resources; the typed boundary is re-established at
//! read time by deserializing into the caller's type.

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::Error;

/// Lifecycle state of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// No fetch has been issued for this key yet.
  Idle,
  /// A fetch is in flight.
  Loading,
  /// The last settled fetch succeeded.
  Success,
  /// The last settled fetch failed.
  Error,
}

impl QueryStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryStatus::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryStatus::Success)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryStatus::Error)
  }
}

/// Per-query overrides for the client's default freshness windows.
///
/// Options take effect when the entry for a key is first created; later
/// callers for the same key reuse the entry's existing windows, so the
/// first caller wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
  pub stale_time: Option<Duration>,
  pub cache_time: Option<Duration>,
}

impl QueryOptions {
  /// How long fetched data counts as fresh.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  /// How long an unsubscribed entry is kept before eviction.
  pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
    self.cache_time = Some(cache_time);
    self
  }
}

/// The public read model of a cache entry, decoded into the caller's type.
///
/// `data` is populated whenever the entry holds a last-good value, including
/// while a refetch is loading or after a failed refetch, so consumers can
/// keep rendering stale data alongside the current status.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
  pub status: QueryStatus,
  pub data: Option<T>,
  pub error: Option<Error>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub is_stale: bool,
}

impl<T> QuerySnapshot<T> {
  pub(crate) fn idle() -> Self {
    QuerySnapshot {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      is_stale: true,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.status.is_error()
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&Error> {
    self.error.as_ref()
  }
}

/// A fetch future already erased to the cache's canonical value form.
pub(crate) type ValueFuture = BoxFuture<'static, Result<Value, Error>>;

/// A re-callable fetcher registered by a subscriber; invoked again by
/// invalidate-triggered and explicit refetches.
pub(crate) type StoredFetcher = Arc<dyn Fn() -> ValueFuture + Send + Sync>;

/// Internal state for one query key.
pub(crate) struct CacheEntry {
  pub data: Option<Value>,
  pub error: Option<Error>,
  pub status: QueryStatus,
  pub fetched_at: Option<DateTime<Utc>>,
  pub stale_time: Duration,
  pub cache_time: Duration,
  /// Set by `invalidate`; cleared by the next successful fetch.
  pub invalidated: bool,
  /// Counter of issued fetches. The newest issued generation is the only
  /// one allowed to write its completion back.
  pub generation: u64,
  pub in_flight: Option<u64>,
  pub subscribers: usize,
  /// When the last subscriber went away; starts the `cache_time` clock.
  pub idle_since: Option<DateTime<Utc>>,
  pub fetcher: Option<StoredFetcher>,
  /// Bumped on every transition so attached waiters and handles wake up.
  pub notify: watch::Sender<u64>,
}

impl CacheEntry {
  pub fn new(stale_time: Duration, cache_time: Duration, now: DateTime<Utc>) -> Self {
    let (notify, _) = watch::channel(0);
    CacheEntry {
      data: None,
      error: None,
      status: QueryStatus::Idle,
      fetched_at: None,
      stale_time,
      cache_time,
      invalidated: false,
      generation: 0,
      in_flight: None,
      subscribers: 0,
      idle_since: Some(now),
      fetcher: None,
      notify,
    }
  }

  /// Fresh means: a successful fetch, not explicitly invalidated, and still
  /// inside the staleness window.
  pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    if self.invalidated || !self.status.is_success() {
      return false;
    }
    match self.fetched_at {
      Some(at) => now - at < self.stale_time,
      None => false,
    }
  }

  pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
    !self.is_fresh(now)
  }

  /// Start a new fetch generation, superseding any in-flight one.
  /// Prior data stays readable while loading.
  pub fn begin_fetch(&mut self) -> u64 {
    self.generation += 1;
    self.in_flight = Some(self.generation);
    self.status = QueryStatus::Loading;
    self.bump();
    self.generation
  }

  /// Record a settled fetch. A fetch error keeps the previous data.
  pub fn settle(&mut self, result: Result<Value, Error>, now: DateTime<Utc>) {
    self.in_flight = None;
    match result {
      Ok(value) => {
        self.data = Some(value);
        self.fetched_at = Some(now);
        self.status = QueryStatus::Success;
        self.error = None;
        self.invalidated = false;
      }
      Err(err) => {
        self.status = QueryStatus::Error;
        self.error = Some(err);
      }
    }
    self.bump();
  }

  /// Discard the logical effect of the in-flight fetch. Status falls back
  /// to what the entry can still show.
  pub fn cancel(&mut self) {
    self.in_flight = None;
    self.status = if self.data.is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Idle
    };
    self.bump();
  }

  /// An entry may be evicted only once nothing can still observe it: no
  /// subscriber, no in-flight fetch, no attached waiter, and the
  /// `cache_time` clock has run out.
  pub fn evictable(&self, now: DateTime<Utc>) -> bool {
    if self.subscribers > 0 || self.in_flight.is_some() || self.notify.receiver_count() > 0 {
      return false;
    }
    match self.idle_since {
      Some(since) => now - since > self.cache_time,
      None => false,
    }
  }

  pub fn decode_data<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
    match &self.data {
      Some(value) => serde_json::from_value(value.clone())
        .map(Some)
        .map_err(Error::decode),
      None => Ok(None),
    }
  }

  pub fn snapshot<T: DeserializeOwned>(&self, now: DateTime<Utc>) -> Result<QuerySnapshot<T>, Error> {
    Ok(QuerySnapshot {
      status: self.status,
      data: self.decode_data()?,
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      is_stale: self.is_stale(now),
    })
  }

  pub fn bump(&self) {
    self.notify.send_modify(|version| *version += 1);
  }
}
