//! Mutation runner with optimistic-update and rollback hooks.
//!
//! A `Mutation` wraps an async write operation and three optional hooks,
//! mirroring the cache side of a create/update flow:
//!
//! - `on_mutate` runs synchronously before the network call; it can snapshot
//!   affected cache entries and apply an optimistic `set_data`. Its return
//!   value becomes the mutation context.
//! - `on_error` receives the failure, the input record, and the context, and
//!   is expected to restore the snapshot.
//! - `on_success` receives the server's result and is expected to invalidate
//!   affected query keys.
//!
//! Each attempt is an explicit state machine: `Pending` at start, then
//! exactly one of `Committed` or `RolledBack` once the call settles.
//!
//! # Example
//!
//! ```ignore
//! let client = users_client.clone();
//! let cache = query_cache.clone();
//! let mut mutation = Mutation::new(move |new_user: NewUser| {
//!   let client = client.clone();
//!   Box::pin(async move { client.create(&new_user).await })
//! })
//! .with_on_success(move |_created| {
//!   let _ = cache.invalidate(&QueryKey::new("users"));
//! });
//!
//! let created = mutation.run(new_user).await?;
//! ```

use futures::future::BoxFuture;

use crate::error::Error;

/// Terminal and in-progress states of a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
  /// No attempt has been run yet.
  Idle,
  /// The network call of the current attempt has not settled.
  Pending,
  /// The last attempt succeeded; `on_success` has fired.
  Committed,
  /// The last attempt failed; `on_error` has fired.
  RolledBack,
}

impl MutationState {
  pub fn is_pending(&self) -> bool {
    matches!(self, MutationState::Pending)
  }

  pub fn is_committed(&self) -> bool {
    matches!(self, MutationState::Committed)
  }

  pub fn is_rolled_back(&self) -> bool {
    matches!(self, MutationState::RolledBack)
  }
}

type MutateFn<In, Out> = Box<dyn Fn(In) -> BoxFuture<'static, Result<Out, Error>> + Send + Sync>;
type OnMutate<In, Ctx> = Box<dyn Fn(&In) -> Ctx + Send + Sync>;
type OnError<In, Ctx> = Box<dyn Fn(&Error, &In, Option<Ctx>) + Send + Sync>;
type OnSuccess<Out> = Box<dyn Fn(&Out) + Send + Sync>;

/// A reusable write operation with optimistic-update hooks.
///
/// `In` is the record handed to the write, `Out` the server's response, and
/// `Ctx` the caller-defined rollback context produced by `on_mutate`.
pub struct Mutation<In, Out, Ctx = ()> {
  mutate_fn: MutateFn<In, Out>,
  on_mutate: Option<OnMutate<In, Ctx>>,
  on_error: Option<OnError<In, Ctx>>,
  on_success: Option<OnSuccess<Out>>,
  state: MutationState,
}

impl<In, Out, Ctx> Mutation<In, Out, Ctx>
where
  In: Clone,
{
  pub fn new<F, Fut>(mutate_fn: F) -> Self
  where
    F: Fn(In) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Out, Error>> + Send + 'static,
  {
    Mutation {
      mutate_fn: Box::new(move |record| Box::pin(mutate_fn(record))),
      on_mutate: None,
      on_error: None,
      on_success: None,
      state: MutationState::Idle,
    }
  }

  /// Hook run synchronously before the network call; returns the context
  /// used for rollback.
  pub fn with_on_mutate<F>(mut self, hook: F) -> Self
  where
    F: Fn(&In) -> Ctx + Send + Sync + 'static,
  {
    self.on_mutate = Some(Box::new(hook));
    self
  }

  pub fn with_on_error<F>(mut self, hook: F) -> Self
  where
    F: Fn(&Error, &In, Option<Ctx>) + Send + Sync + 'static,
  {
    self.on_error = Some(Box::new(hook));
    self
  }

  pub fn with_on_success<F>(mut self, hook: F) -> Self
  where
    F: Fn(&Out) + Send + Sync + 'static,
  {
    self.on_success = Some(Box::new(hook));
    self
  }

  /// State of the most recent attempt.
  pub fn state(&self) -> MutationState {
    self.state
  }

  /// Run one mutation attempt.
  ///
  /// Exactly one of `on_error`/`on_success` fires, exactly once, after the
  /// call settles — whether or not an optimistic update was applied. The
  /// context is owned by this attempt and dropped at settlement.
  pub async fn run(&mut self, record: In) -> Result<Out, Error> {
    self.state = MutationState::Pending;
    let context = self.on_mutate.as_ref().map(|hook| hook(&record));

    match (self.mutate_fn)(record.clone()).await {
      Ok(result) => {
        if let Some(hook) = &self.on_success {
          hook(&result);
        }
        self.state = MutationState::Committed;
        tracing::debug!("mutation committed");
        Ok(result)
      }
      Err(err) => {
        if let Some(hook) = &self.on_error {
          hook(&err, &record, context);
        }
        self.state = MutationState::RolledBack;
        tracing::warn!(%err, "mutation rolled back");
        Err(err)
      }
    }
  }
}
