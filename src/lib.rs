//! Client-side query cache with stale-while-revalidate fetching and
//! optimistic mutations.
//!
//! The crate coordinates reads and writes against a remote JSON REST
//! collection: a [`QueryClient`] caches fetched data under structural
//! [`QueryKey`]s with staleness and eviction windows, deduplicates
//! concurrent fetches, and discards superseded completions; a [`Mutation`]
//! runs a write with optional optimistic-update and rollback hooks; the
//! [`CachedUsersClient`] wires both to the `/users` endpoints.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load(None)?;
//! let client = CachedUsersClient::new(&config)?;
//!
//! // Served from cache when fresh, fetched (once) otherwise.
//! let users = client.users().await?;
//!
//! // Optimistic create: the list shows the draft immediately and rolls
//! // back if the request fails.
//! let created = client
//!   .add_user_optimistic(NewUser::new("Ada", "ada@x.com"))
//!   .await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod mutation;
pub mod users;

pub use cache::{QueryClient, QueryHandle, QueryKey, QueryOptions, QuerySnapshot, QueryStatus, Segment};
pub use config::Config;
pub use error::Error;
pub use mutation::{Mutation, MutationState};
pub use users::{CachedUsersClient, NewUser, UserRecord, UsersClient, UsersQuery};
