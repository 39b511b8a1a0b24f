//! Cached users client: the HTTP access layer wired to the query cache.
//!
//! This is the presentation-facing surface: list and detail reads served
//! through the cache, subscription handles for observing transitions, and
//! create mutations with plain or optimistic cache coordination.

use chrono::Utc;

use super::client::UsersClient;
use super::types::{NewUser, UserRecord};
use crate::cache::{QueryClient, QueryHandle, QueryKey, QueryOptions};
use crate::config::Config;
use crate::error::Error;
use crate::mutation::Mutation;

/// Query keys for the users collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsersQuery {
  /// The full collection: `["users"]`.
  All,
  /// One record: `["user", id]`.
  ById(u64),
}

impl UsersQuery {
  pub fn key(&self) -> QueryKey {
    match self {
      UsersQuery::All => QueryKey::new("users"),
      UsersQuery::ById(id) => QueryKey::new("user").push(*id),
    }
  }
}

/// Users client with transparent caching and mutation coordination.
#[derive(Clone)]
pub struct CachedUsersClient {
  inner: UsersClient,
  cache: QueryClient,
}

impl CachedUsersClient {
  pub fn new(config: &Config) -> Result<Self, Error> {
    let inner = UsersClient::new(config)?;
    let cache = QueryClient::from_config(&config.cache);
    Ok(CachedUsersClient { inner, cache })
  }

  /// Build on top of an existing cache, so several clients can share one.
  pub fn with_cache(config: &Config, cache: QueryClient) -> Result<Self, Error> {
    let inner = UsersClient::new(config)?;
    Ok(CachedUsersClient { inner, cache })
  }

  /// The shared query cache, for invalidation or direct reads.
  pub fn cache(&self) -> &QueryClient {
    &self.cache
  }

  /// The full user list, served from cache when fresh.
  pub async fn users(&self) -> Result<Vec<UserRecord>, Error> {
    let inner = self.inner.clone();
    self
      .cache
      .ensure_fresh(
        UsersQuery::All.key(),
        move || async move { inner.fetch_collection().await },
        QueryOptions::default(),
      )
      .await
  }

  /// One user by id, served from cache when fresh.
  pub async fn user(&self, id: u64) -> Result<UserRecord, Error> {
    let inner = self.inner.clone();
    self
      .cache
      .ensure_fresh(
        UsersQuery::ById(id).key(),
        move || async move { inner.fetch_one(id).await },
        QueryOptions::default(),
      )
      .await
  }

  /// Subscribe to the user list; the handle observes every transition.
  pub fn watch_users(&self) -> Result<QueryHandle<Vec<UserRecord>>, Error> {
    let inner = self.inner.clone();
    self.cache.watch(
      UsersQuery::All.key(),
      move || {
        let inner = inner.clone();
        async move { inner.fetch_collection().await }
      },
      QueryOptions::default(),
    )
  }

  /// Subscribe to one user's detail state.
  pub fn watch_user(&self, id: u64) -> Result<QueryHandle<UserRecord>, Error> {
    let inner = self.inner.clone();
    self.cache.watch(
      UsersQuery::ById(id).key(),
      move || {
        let inner = inner.clone();
        async move { inner.fetch_one(id).await }
      },
      QueryOptions::default(),
    )
  }

  /// Create a user. On success the list is invalidated so the next read
  /// refetches authoritative data; no optimistic update is applied.
  pub async fn add_user(&self, new_user: NewUser) -> Result<UserRecord, Error> {
    let inner = self.inner.clone();
    let cache = self.cache.clone();

    let mut mutation: Mutation<NewUser, UserRecord> = Mutation::new(move |record: NewUser| {
      let inner = inner.clone();
      async move { inner.create(&record).await }
    })
    .with_on_success(move |created: &UserRecord| {
      tracing::debug!(id = created.id, "user created, invalidating list");
      if let Err(err) = cache.invalidate(&UsersQuery::All.key()) {
        tracing::warn!(%err, "failed to invalidate users list");
      }
    })
    .with_on_error(|err, _record, _context| {
      tracing::warn!(%err, "failed to add user");
    });

    mutation.run(new_user).await
  }

  /// Create a user with an optimistic list update.
  ///
  /// Before the network call: cancel in-flight list fetches, snapshot the
  /// current list, and append the draft under a temporary id. On failure
  /// the pre-mutation state is restored exactly — including "no data at
  /// all" when the cache was cold; on success the list is invalidated.
  pub async fn add_user_optimistic(&self, new_user: NewUser) -> Result<UserRecord, Error> {
    let inner = self.inner.clone();
    let key = UsersQuery::All.key();

    let mut mutation: Mutation<NewUser, UserRecord, ListRollback> =
      Mutation::new(move |record: NewUser| {
        let inner = inner.clone();
        async move { inner.create(&record).await }
      })
      .with_on_mutate({
        let cache = self.cache.clone();
        let key = key.clone();
        move |record: &NewUser| {
          if let Err(err) = cache.cancel(&key) {
            tracing::warn!(%err, "failed to cancel in-flight list fetches");
          }

          let previous = match cache.get::<Vec<UserRecord>>(&key) {
            Ok(snapshot) => snapshot.data,
            Err(err) => {
              // Cannot snapshot, so do not touch the cache at all.
              tracing::warn!(%err, "failed to read users list, skipping optimistic update");
              return ListRollback::Skip;
            }
          };

          let draft = optimistic_draft(record);
          if let Err(err) = cache.set_data(&key, |list: Option<Vec<UserRecord>>| {
            let mut list = list.unwrap_or_default();
            list.push(draft);
            list
          }) {
            tracing::warn!(%err, "failed to apply optimistic update");
            return ListRollback::Skip;
          }

          match previous {
            Some(list) => ListRollback::Restore(list),
            None => ListRollback::Clear,
          }
        }
      })
      .with_on_error({
        let cache = self.cache.clone();
        let key = key.clone();
        move |err, _record, context| {
          tracing::warn!(%err, "add user failed, rolling back optimistic update");
          let outcome = match context {
            Some(ListRollback::Restore(previous)) => {
              cache.set_data(&key, |_: Option<Vec<UserRecord>>| previous)
            }
            Some(ListRollback::Clear) => cache.clear_data(&key),
            Some(ListRollback::Skip) | None => Ok(()),
          };
          if let Err(err) = outcome {
            tracing::warn!(%err, "failed to roll back users list");
          }
        }
      })
      .with_on_success({
        let cache = self.cache.clone();
        let key = key.clone();
        move |created: &UserRecord| {
          tracing::debug!(id = created.id, "user created, invalidating list");
          if let Err(err) = cache.invalidate(&key) {
            tracing::warn!(%err, "failed to invalidate users list");
          }
        }
      });

    mutation.run(new_user).await
  }
}

/// What rollback must do to the users list if the create fails, captured
/// at mutation start.
enum ListRollback {
  /// Restore the exact pre-mutation list.
  Restore(Vec<UserRecord>),
  /// The entry held no data before the optimistic append; clear it back
  /// to its never-fetched state.
  Clear,
  /// No optimistic update was applied; leave the cache alone.
  Skip,
}

/// The draft appended optimistically: the submitted fields under a
/// timestamp-derived temporary id, replaced by the server's record once the
/// invalidated list refetches.
fn optimistic_draft(record: &NewUser) -> UserRecord {
  UserRecord {
    id: Utc::now().timestamp_millis() as u64,
    name: record.name.clone(),
    email: record.email.clone(),
    username: record.username.clone(),
    phone: record.phone.clone(),
    website: record.website.clone(),
  }
}
