//! Thin typed wrapper over the remote users collection.
//!
//! One method per endpoint; a non-success status maps to `Error::Network`
//! and a connection-level failure to `Error::Transport`. No retry logic
//! lives here — retries, if any, are the caller's responsibility.

use reqwest::StatusCode;
use std::time::{Duration, Instant};
use url::Url;

use super::types::{NewUser, UserRecord};
use crate::config::Config;
use crate::error::Error;

/// HTTP access layer for `GET /users`, `GET /users/{id}`, `POST /users`.
#[derive(Clone)]
pub struct UsersClient {
  client: reqwest::Client,
  base_url: Url,
}

impl UsersClient {
  pub fn new(config: &Config) -> Result<Self, Error> {
    let base_url = Url::parse(&config.api.base_url)
      .map_err(|e| Error::config(format!("invalid base url {}: {}", config.api.base_url, e)))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_millis(config.api.timeout_ms))
      .user_agent(config.api.user_agent.clone())
      .build()
      .map_err(Error::from_reqwest)?;

    Ok(UsersClient { client, base_url })
  }

  /// Fetch the full collection, in server order.
  pub async fn fetch_collection(&self) -> Result<Vec<UserRecord>, Error> {
    let url = self.endpoint("users")?;
    let started = Instant::now();

    let response = self.client.get(url).send().await.map_err(Error::from_reqwest)?;
    check_status(response.status())?;
    let users: Vec<UserRecord> = response.json().await.map_err(Error::from_reqwest)?;

    tracing::debug!(count = users.len(), elapsed_ms = started.elapsed().as_millis() as u64, "fetched users");
    Ok(users)
  }

  /// Fetch a single record by id.
  pub async fn fetch_one(&self, id: u64) -> Result<UserRecord, Error> {
    let url = self.endpoint(&format!("users/{}", id))?;
    let started = Instant::now();

    let response = self.client.get(url).send().await.map_err(Error::from_reqwest)?;
    check_status(response.status())?;
    let user: UserRecord = response.json().await.map_err(Error::from_reqwest)?;

    tracing::debug!(id, elapsed_ms = started.elapsed().as_millis() as u64, "fetched user");
    Ok(user)
  }

  /// Create a record; the server assigns the id.
  pub async fn create(&self, record: &NewUser) -> Result<UserRecord, Error> {
    let url = self.endpoint("users")?;

    let response = self
      .client
      .post(url)
      .json(record)
      .send()
      .await
      .map_err(Error::from_reqwest)?;
    check_status(response.status())?;
    let created: UserRecord = response.json().await.map_err(Error::from_reqwest)?;

    tracing::debug!(id = created.id, "created user");
    Ok(created)
  }

  fn endpoint(&self, path: &str) -> Result<Url, Error> {
    self
      .base_url
      .join(path)
      .map_err(|e| Error::config(format!("invalid endpoint {}: {}", path, e)))
  }
}

fn check_status(status: StatusCode) -> Result<(), Error> {
  if status.is_success() {
    Ok(())
  } else {
    Err(Error::Network {
      status: status.as_u16(),
    })
  }
}
