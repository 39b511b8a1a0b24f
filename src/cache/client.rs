//! The query cache client.
//!
//! `QueryClient` owns the keyed entry map and coordinates every cache
//! transition: fresh reads, deduplicated fetches, invalidation-triggered
//! refetches, cancellation, optimistic writes, and eviction. It is cheaply
//! clonable; clones share the same cache.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryClient::new();
//! let users: Vec<UserRecord> = cache
//!   .ensure_fresh(QueryKey::new("users"), || fetch_users(), QueryOptions::default())
//!   .await?;
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::entry::{CacheEntry, QueryOptions, QuerySnapshot, StoredFetcher, ValueFuture};
use super::key::QueryKey;
use crate::config::CacheConfig;
use crate::error::Error;

struct Inner {
  entries: Mutex<HashMap<QueryKey, CacheEntry>>,
  stale_time: Duration,
  cache_time: Duration,
}

/// Keyed query cache with deduplicated fetching and staleness tracking.
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  /// Create a cache with the default windows (60 s stale, 5 min eviction).
  pub fn new() -> Self {
    Self::with_defaults(Duration::seconds(60), Duration::minutes(5))
  }

  /// Create a cache with explicit default windows; individual queries can
  /// still override them via `QueryOptions`.
  pub fn with_defaults(stale_time: Duration, cache_time: Duration) -> Self {
    QueryClient {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        stale_time,
        cache_time,
      }),
    }
  }

  pub fn from_config(config: &CacheConfig) -> Self {
    Self::with_defaults(config.stale_time(), config.cache_time())
  }

  fn lock(&self) -> Result<MutexGuard<'_, HashMap<QueryKey, CacheEntry>>, Error> {
    self.inner.entries.lock().map_err(|_| Error::LockPoisoned)
  }

  /// Read the current state of a key without triggering any I/O.
  pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<QuerySnapshot<T>, Error> {
    let entries = self.lock()?;
    match entries.get(key) {
      Some(entry) => entry.snapshot(Utc::now()),
      None => Ok(QuerySnapshot::idle()),
    }
  }

  /// Return cached data for `key` if it is still fresh; otherwise fetch.
  ///
  /// If another fetch for the same key is already in flight, this call
  /// attaches to it instead of issuing a duplicate request; every attached
  /// caller receives the same settled outcome. On a fetch error the entry
  /// keeps its previous data and the error is returned.
  pub async fn ensure_fresh<T, F, Fut>(
    &self,
    key: QueryKey,
    fetch_fn: F,
    options: QueryOptions,
  ) -> Result<T, Error>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
  {
    let rx = {
      let mut entries = self.lock()?;
      let now = Utc::now();
      sweep(&mut entries, now);

      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| self.new_entry(options, now));

      if entry.is_fresh(now) {
        tracing::debug!(%key, "cache hit, returning fresh data");
        return entry
          .decode_data()?
          .ok_or_else(|| Error::Decode {
            message: "fresh entry without data".to_string(),
          });
      }

      if entry.in_flight.is_some() {
        tracing::debug!(%key, "attaching to in-flight fetch");
      } else {
        let generation = entry.begin_fetch();
        tracing::debug!(%key, generation, "issuing fetch");
        self.spawn_completion(key.clone(), generation, erase(fetch_fn()));
      }
      entry.notify.subscribe()
    };

    self.wait_settled(&key, rx).await
  }

  /// Subscribe to a key: register a re-callable fetcher, pin the entry
  /// against eviction, and trigger a fetch if the entry is not fresh.
  ///
  /// The returned handle observes every transition; dropping it
  /// unsubscribes and starts the entry's `cache_time` clock.
  pub fn watch<T, F, Fut>(
    &self,
    key: QueryKey,
    fetcher: F,
    options: QueryOptions,
  ) -> Result<QueryHandle<T>, Error>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
  {
    let stored: StoredFetcher = Arc::new(move || erase(fetcher()));

    let rx = {
      let mut entries = self.lock()?;
      let now = Utc::now();
      sweep(&mut entries, now);

      let entry = entries
        .entry(key.clone())
        .or_insert_with(|| self.new_entry(options, now));
      entry.fetcher = Some(stored.clone());
      entry.subscribers += 1;
      entry.idle_since = None;

      if !entry.is_fresh(now) && entry.in_flight.is_none() {
        let generation = entry.begin_fetch();
        tracing::debug!(%key, generation, "issuing fetch for new subscriber");
        self.spawn_completion(key.clone(), generation, stored());
      }
      entry.notify.subscribe()
    };

    Ok(QueryHandle {
      client: self.clone(),
      key,
      rx,
      _marker: PhantomData,
    })
  }

  /// Synchronously overwrite an entry's data via a pure transform of the
  /// previous decoded value. Creates the entry if absent. Used for
  /// optimistic writes and rollback.
  pub fn set_data<T, U>(&self, key: &QueryKey, updater: U) -> Result<(), Error>
  where
    T: Serialize + DeserializeOwned,
    U: FnOnce(Option<T>) -> T,
  {
    let mut entries = self.lock()?;
    let now = Utc::now();
    sweep(&mut entries, now);

    let entry = entries
      .entry(key.clone())
      .or_insert_with(|| self.new_entry(QueryOptions::default(), now));

    let previous = entry.decode_data()?;
    let next = serde_json::to_value(updater(previous)).map_err(Error::decode)?;
    entry.data = Some(next);
    entry.fetched_at = Some(now);
    entry.status = super::entry::QueryStatus::Success;
    entry.error = None;
    entry.bump();
    tracing::debug!(%key, "set_data applied");
    Ok(())
  }

  /// Reset an entry to its never-fetched state: no data, no error, no
  /// fetch timestamp. Used to roll back an optimistic write applied to an
  /// entry that held nothing. A no-op for absent keys.
  pub fn clear_data(&self, key: &QueryKey) -> Result<(), Error> {
    let mut entries = self.lock()?;
    if let Some(entry) = entries.get_mut(key) {
      entry.data = None;
      entry.fetched_at = None;
      entry.error = None;
      entry.invalidated = false;
      entry.status = if entry.in_flight.is_some() {
        super::entry::QueryStatus::Loading
      } else {
        super::entry::QueryStatus::Idle
      };
      entry.bump();
      tracing::debug!(%key, "cleared entry data");
    }
    Ok(())
  }

  /// Mark every entry whose key starts with `prefix` as stale. Entries with
  /// an active subscriber and a registered fetcher refetch immediately,
  /// superseding any in-flight fetch; the rest refetch on next access.
  pub fn invalidate(&self, prefix: &QueryKey) -> Result<(), Error> {
    let mut jobs = Vec::new();
    {
      let mut entries = self.lock()?;
      let now = Utc::now();
      sweep(&mut entries, now);

      for (key, entry) in entries.iter_mut() {
        if !key.starts_with(prefix) {
          continue;
        }
        entry.invalidated = true;
        if entry.subscribers > 0 {
          if let Some(fetcher) = entry.fetcher.clone() {
            let generation = entry.begin_fetch();
            tracing::debug!(%key, generation, "invalidated, refetching for subscribers");
            jobs.push((key.clone(), generation, fetcher));
            continue;
          }
        }
        tracing::debug!(%key, "invalidated");
        entry.bump();
      }
    }
    for (key, generation, fetcher) in jobs {
      self.spawn_completion(key, generation, fetcher());
    }
    Ok(())
  }

  /// Discard the logical effect of any in-flight fetch for entries matching
  /// `prefix`: their completions will not write the cache. The in-flight
  /// task itself is not aborted.
  pub fn cancel(&self, prefix: &QueryKey) -> Result<(), Error> {
    let mut entries = self.lock()?;
    for (key, entry) in entries.iter_mut() {
      if key.starts_with(prefix) && entry.in_flight.is_some() {
        tracing::debug!(%key, "cancelling in-flight fetch");
        entry.cancel();
      }
    }
    Ok(())
  }

  /// Force a new fetch for `key` using its registered fetcher, superseding
  /// any in-flight one. Returns whether a fetch was issued.
  pub fn refetch(&self, key: &QueryKey) -> Result<bool, Error> {
    let job = {
      let mut entries = self.lock()?;
      match entries.get_mut(key) {
        Some(entry) => match entry.fetcher.clone() {
          Some(fetcher) => {
            let generation = entry.begin_fetch();
            tracing::debug!(%key, generation, "refetching");
            Some((generation, fetcher))
          }
          None => None,
        },
        None => None,
      }
    };
    match job {
      Some((generation, fetcher)) => {
        self.spawn_completion(key.clone(), generation, fetcher());
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Remove entries whose unsubscribed age exceeds their `cache_time`.
  /// Also runs opportunistically before mutating cache operations.
  pub fn evict_expired(&self) -> Result<(), Error> {
    let mut entries = self.lock()?;
    sweep(&mut entries, Utc::now());
    Ok(())
  }

  /// Number of live entries, mainly for tests and debugging.
  pub fn len(&self) -> Result<usize, Error> {
    Ok(self.lock()?.len())
  }

  pub fn is_empty(&self) -> Result<bool, Error> {
    Ok(self.lock()?.is_empty())
  }

  fn new_entry(&self, options: QueryOptions, now: DateTime<Utc>) -> CacheEntry {
    CacheEntry::new(
      options.stale_time.unwrap_or(self.inner.stale_time),
      options.cache_time.unwrap_or(self.inner.cache_time),
      now,
    )
  }

  /// Drive a fetch future to completion and write it back, unless a newer
  /// generation superseded it in the meantime.
  fn spawn_completion(&self, key: QueryKey, generation: u64, future: ValueFuture) {
    let client = self.clone();
    tokio::spawn(async move {
      let result = future.await;
      client.complete(key, generation, result);
    });
  }

  fn complete(&self, key: QueryKey, generation: u64, result: Result<serde_json::Value, Error>) {
    let Ok(mut entries) = self.inner.entries.lock() else {
      tracing::warn!(%key, "cache lock poisoned, dropping fetch result");
      return;
    };
    let Some(entry) = entries.get_mut(&key) else {
      tracing::debug!(%key, "entry evicted before fetch settled, discarding");
      return;
    };
    if entry.in_flight != Some(generation) {
      tracing::debug!(%key, generation, "discarding superseded fetch completion");
      return;
    }
    if let Err(err) = &result {
      tracing::warn!(%key, %err, "fetch failed");
    }
    entry.settle(result, Utc::now());
  }

  /// Wait until the entry has no in-flight fetch, then read its outcome.
  ///
  /// A waiter whose fetch gets superseded keeps waiting and observes the
  /// newest settled state instead.
  async fn wait_settled<T: DeserializeOwned>(
    &self,
    key: &QueryKey,
    mut rx: watch::Receiver<u64>,
  ) -> Result<T, Error> {
    loop {
      let outcome = {
        let entries = self.lock()?;
        match entries.get(key) {
          Some(entry) if entry.in_flight.is_none() => Some(settled_outcome(entry)),
          Some(_) => None,
          // Evicted while waiting; treated as a cancellation.
          None => Some(Err(Error::Cancelled)),
        }
      };
      if let Some(result) = outcome {
        return result;
      }
      if rx.changed().await.is_err() {
        return Err(Error::Cancelled);
      }
    }
  }
}

impl Clone for QueryClient {
  fn clone(&self) -> Self {
    QueryClient {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new()
  }
}

/// A live subscription to one query key.
///
/// Holding the handle pins the entry against eviction; dropping it starts
/// the `cache_time` clock once no other subscriber remains.
pub struct QueryHandle<T> {
  client: QueryClient,
  key: QueryKey,
  rx: watch::Receiver<u64>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Send + 'static> QueryHandle<T> {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Current state of the watched entry.
  pub fn snapshot(&self) -> Result<QuerySnapshot<T>, Error> {
    self.client.get(&self.key)
  }

  /// Wait for the next transition of the watched entry.
  pub async fn changed(&mut self) -> Result<(), Error> {
    self.rx.changed().await.map_err(|_| Error::Cancelled)
  }

  /// Force a refetch using the registered fetcher.
  pub fn refetch(&self) -> Result<bool, Error> {
    self.client.refetch(&self.key)
  }
}

impl<T> Drop for QueryHandle<T> {
  fn drop(&mut self) {
    // Poisoned lock means a panic elsewhere; nothing to unwind here.
    if let Ok(mut entries) = self.client.inner.entries.lock() {
      if let Some(entry) = entries.get_mut(&self.key) {
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
          entry.idle_since = Some(Utc::now());
        }
      }
    }
  }
}

/// Erase a typed fetch future into the canonical value form entries store.
fn erase<T, Fut>(future: Fut) -> ValueFuture
where
  T: Serialize + Send + 'static,
  Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
  Box::pin(async move {
    let value = future.await?;
    serde_json::to_value(value).map_err(Error::decode)
  })
}

fn settled_outcome<T: DeserializeOwned>(entry: &CacheEntry) -> Result<T, Error> {
  use super::entry::QueryStatus;
  match entry.status {
    QueryStatus::Success => entry.decode_data()?.ok_or_else(|| Error::Decode {
      message: "successful entry without data".to_string(),
    }),
    QueryStatus::Error => Err(entry.error.clone().unwrap_or(Error::Cancelled)),
    QueryStatus::Idle => Err(Error::Cancelled),
    // `in_flight` is already None, so Loading cannot be observed here.
    QueryStatus::Loading => Err(Error::Cancelled),
  }
}

fn sweep(entries: &mut HashMap<QueryKey, CacheEntry>, now: DateTime<Utc>) {
  entries.retain(|key, entry| {
    let evict = entry.evictable(now);
    if evict {
      tracing::debug!(%key, "evicting expired entry");
    }
    !evict
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::QueryStatus;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration as StdDuration;

  /// Opt-in log output for debugging tests: RUST_LOG=requery=debug.
  fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  }

  fn counting_fetcher(
    counter: Arc<AtomicU32>,
    value: Vec<u32>,
  ) -> impl Fn() -> futures::future::BoxFuture<'static, Result<Vec<u32>, Error>> + Send + Sync {
    move || {
      counter.fetch_add(1, Ordering::SeqCst);
      let value = value.clone();
      Box::pin(async move { Ok(value) })
    }
  }

  #[tokio::test]
  async fn test_fresh_data_skips_second_fetch() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = counting_fetcher(calls.clone(), vec![1, 2, 3]);

    let key = QueryKey::new("users");
    let first: Vec<u32> = cache
      .ensure_fresh(key.clone(), &fetcher, QueryOptions::default())
      .await
      .unwrap();
    let second: Vec<u32> = cache
      .ensure_fresh(key, &fetcher, QueryOptions::default())
      .await
      .unwrap();

    assert_eq!(first, vec![1, 2, 3]);
    assert_eq!(second, vec![1, 2, 3]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_callers_share_one_fetch() {
    init_logging();
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let slow = {
      let calls = calls.clone();
      move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
          tokio::time::sleep(StdDuration::from_millis(20)).await;
          Ok::<_, Error>(vec![7u32])
        })
      }
    };

    let key = QueryKey::new("users");
    let (a, b) = tokio::join!(
      cache.ensure_fresh::<Vec<u32>, _, _>(key.clone(), &slow, QueryOptions::default()),
      cache.ensure_fresh::<Vec<u32>, _, _>(key, &slow, QueryOptions::default()),
    );

    assert_eq!(a.unwrap(), vec![7]);
    assert_eq!(b.unwrap(), vec![7]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_stale_data_refetches() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = counting_fetcher(calls.clone(), vec![1]);
    let options = QueryOptions::default().with_stale_time(Duration::zero());

    let key = QueryKey::new("users");
    let _: Vec<u32> = cache.ensure_fresh(key.clone(), &fetcher, options).await.unwrap();
    let _: Vec<u32> = cache.ensure_fresh(key, &fetcher, options).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_first_caller_options_win() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = counting_fetcher(calls.clone(), vec![1]);

    let key = QueryKey::new("users");
    let zero = QueryOptions::default().with_stale_time(Duration::zero());
    let _: Vec<u32> = cache.ensure_fresh(key.clone(), &fetcher, zero).await.unwrap();

    // The entry keeps its creation-time windows; a later caller's longer
    // stale time does not revive it.
    let long = QueryOptions::default().with_stale_time(Duration::hours(1));
    let _: Vec<u32> = cache.ensure_fresh(key, &fetcher, long).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_clear_data_resets_entry() {
    let cache = QueryClient::new();
    let key = QueryKey::new("users");

    cache
      .set_data(&key, |_: Option<Vec<u32>>| vec![1, 2])
      .unwrap();
    cache.clear_data(&key).unwrap();

    let snapshot: QuerySnapshot<Vec<u32>> = cache.get(&key).unwrap();
    assert_eq!(snapshot.status, QueryStatus::Idle);
    assert!(snapshot.data().is_none());
    assert!(snapshot.is_stale);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch_within_stale_time() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = counting_fetcher(calls.clone(), vec![1]);

    let key = QueryKey::new("users");
    let _: Vec<u32> = cache
      .ensure_fresh(key.clone(), &fetcher, QueryOptions::default())
      .await
      .unwrap();
    cache.invalidate(&key).unwrap();
    let _: Vec<u32> = cache
      .ensure_fresh(key, &fetcher, QueryOptions::default())
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_invalidate_prefix_is_structural() {
    let cache = QueryClient::new();
    let user_calls = Arc::new(AtomicU32::new(0));
    let users_calls = Arc::new(AtomicU32::new(0));
    let user_fetcher = counting_fetcher(user_calls.clone(), vec![5]);
    let users_fetcher = counting_fetcher(users_calls.clone(), vec![1, 2]);

    let user_key = QueryKey::new("user").push(5u64);
    let users_key = QueryKey::new("users");
    let _: Vec<u32> = cache
      .ensure_fresh(user_key.clone(), &user_fetcher, QueryOptions::default())
      .await
      .unwrap();
    let _: Vec<u32> = cache
      .ensure_fresh(users_key.clone(), &users_fetcher, QueryOptions::default())
      .await
      .unwrap();

    cache.invalidate(&QueryKey::new("user")).unwrap();

    let _: Vec<u32> = cache
      .ensure_fresh(user_key, &user_fetcher, QueryOptions::default())
      .await
      .unwrap();
    let _: Vec<u32> = cache
      .ensure_fresh(users_key, &users_fetcher, QueryOptions::default())
      .await
      .unwrap();

    // ["user", 5] refetched, ["users"] still fresh.
    assert_eq!(user_calls.load(Ordering::SeqCst), 2);
    assert_eq!(users_calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_invalidate_refetches_subscribed_entry_immediately() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));
    let fetcher = counting_fetcher(calls.clone(), vec![1]);

    let handle: QueryHandle<Vec<u32>> = cache
      .watch(QueryKey::new("users"), fetcher, QueryOptions::default())
      .unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    cache.invalidate(&QueryKey::new("users")).unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(handle.snapshot().unwrap().is_success());
  }

  #[tokio::test]
  async fn test_superseded_completion_is_discarded() {
    init_logging();
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    // First call is slow and returns "first"; later calls return "second".
    let fetcher = {
      let calls = calls.clone();
      move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
          if call == 0 {
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            Ok::<_, Error>("first".to_string())
          } else {
            Ok("second".to_string())
          }
        })
      }
    };

    let handle: QueryHandle<String> = cache
      .watch(QueryKey::new("users"), fetcher, QueryOptions::default())
      .unwrap();

    // Supersede the slow fetch while it is still in flight.
    cache.invalidate(&QueryKey::new("users")).unwrap();
    tokio::time::sleep(StdDuration::from_millis(100)).await;

    // The slow first fetch settled last but must not clobber the refetch.
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.data(), Some(&"second".to_string()));
  }

  #[tokio::test]
  async fn test_cancel_discards_in_flight_completion() {
    let cache = QueryClient::new();
    let key = QueryKey::new("users");

    let pending = {
      let cache = cache.clone();
      let key = key.clone();
      tokio::spawn(async move {
        cache
          .ensure_fresh::<Vec<u32>, _, _>(
            key,
            || {
              Box::pin(async move {
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                Ok::<_, Error>(vec![1u32])
              })
            },
            QueryOptions::default(),
          )
          .await
      })
    };

    tokio::time::sleep(StdDuration::from_millis(10)).await;
    cache.cancel(&key).unwrap();

    assert!(matches!(pending.await.unwrap(), Err(Error::Cancelled)));

    // The cancelled completion must not flip the entry to success.
    tokio::time::sleep(StdDuration::from_millis(60)).await;
    let snapshot: QuerySnapshot<Vec<u32>> = cache.get(&key).unwrap();
    assert_eq!(snapshot.status, QueryStatus::Idle);
    assert!(snapshot.data().is_none());
  }

  #[tokio::test]
  async fn test_set_data_overwrites_and_reads_back() {
    let cache = QueryClient::new();
    let key = QueryKey::new("users");

    cache
      .set_data(&key, |previous: Option<Vec<String>>| {
        let mut list = previous.unwrap_or_default();
        list.push("ada".to_string());
        list
      })
      .unwrap();

    let snapshot: QuerySnapshot<Vec<String>> = cache.get(&key).unwrap();
    assert!(snapshot.is_success());
    assert_eq!(snapshot.data(), Some(&vec!["ada".to_string()]));
  }

  #[tokio::test]
  async fn test_error_keeps_previous_data() {
    let cache = QueryClient::new();
    let calls = Arc::new(AtomicU32::new(0));

    let fetcher = {
      let calls = calls.clone();
      move || {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
          if call == 0 {
            Ok::<_, Error>(vec!["grace".to_string()])
          } else {
            Err(Error::Network { status: 500 })
          }
        })
      }
    };

    let handle: QueryHandle<Vec<String>> = cache
      .watch(QueryKey::new("users"), fetcher, QueryOptions::default())
      .unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    handle.refetch().unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    let snapshot = handle.snapshot().unwrap();
    assert!(snapshot.is_error());
    assert_eq!(snapshot.error(), Some(&Error::Network { status: 500 }));
    // Stale but displayable.
    assert_eq!(snapshot.data(), Some(&vec!["grace".to_string()]));
  }

  #[tokio::test]
  async fn test_watch_observes_loading_then_success() {
    let cache = QueryClient::new();

    let mut handle: QueryHandle<serde_json::Value> = cache
      .watch(
        QueryKey::new("user").push(5u64),
        || {
          Box::pin(async move {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
            Ok::<_, Error>(serde_json::json!({"id": 5, "name": "Grace"}))
          })
        },
        QueryOptions::default(),
      )
      .unwrap();

    assert!(handle.snapshot().unwrap().status.is_loading());

    while !handle.snapshot().unwrap().is_success() {
      handle.changed().await.unwrap();
    }
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.data().unwrap()["name"], "Grace");
  }

  #[tokio::test]
  async fn test_live_handle_pins_entry_against_eviction() {
    let cache = QueryClient::new();
    let options = QueryOptions::default().with_cache_time(Duration::zero());

    let handle: QueryHandle<Vec<u32>> = cache
      .watch(
        QueryKey::new("users"),
        || Box::pin(async move { Ok::<_, Error>(vec![1u32]) }),
        options,
      )
      .unwrap();
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    cache.evict_expired().unwrap();
    assert_eq!(cache.len().unwrap(), 1);

    drop(handle);
    tokio::time::sleep(StdDuration::from_millis(5)).await;
    cache.evict_expired().unwrap();
    assert_eq!(cache.len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unused_entry_evicted_after_cache_time() {
    let cache = QueryClient::new();
    let options = QueryOptions::default().with_cache_time(Duration::zero());

    let _: Vec<u32> = cache
      .ensure_fresh(
        QueryKey::new("users"),
        || Box::pin(async move { Ok::<_, Error>(vec![1u32]) }),
        options,
      )
      .await
      .unwrap();
    assert_eq!(cache.len().unwrap(), 1);

    tokio::time::sleep(StdDuration::from_millis(5)).await;
    cache.evict_expired().unwrap();
    assert_eq!(cache.len().unwrap(), 0);
  }
}
