use serde::{Deserialize, Serialize};

/// A user record as exchanged with the remote collection.
///
/// The cache treats this as an opaque value; no invariants are enforced
/// beyond what the wire format carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
  pub id: u64,
  pub name: String,
  pub email: String,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub website: Option<String>,
}

/// Payload for creating a user. The id is assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
  pub name: String,
  pub email: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub website: Option<String>,
}

impl NewUser {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    NewUser {
      name: name.into(),
      email: email.into(),
      username: None,
      phone: None,
      website: None,
    }
  }

  pub fn with_username(mut self, username: impl Into<String>) -> Self {
    self.username = Some(username.into());
    self
  }
}
