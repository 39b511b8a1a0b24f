//! Users domain: wire types, HTTP access layer, and the cached facade.

mod cached_client;
mod client;
mod types;

pub use cached_client::{CachedUsersClient, UsersQuery};
pub use client::UsersClient;
pub use types::{NewUser, UserRecord};
