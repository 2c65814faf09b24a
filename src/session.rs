//! Session context: who is acting, if anyone.
//!
//! The session is loaded once at startup and passed explicitly to the post
//! client and the synchronizer. Logging in or out rewrites the persisted
//! session file; it never mutates a live `Session`.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::posts::Post;

/// A logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub email: Option<String>,
}

impl User {
  /// Identifier sent to the post service: username, falling back to email.
  pub fn identifier(&self) -> Option<&str> {
    if !self.username.is_empty() {
      return Some(&self.username);
    }
    self.email.as_deref().filter(|e| !e.is_empty())
  }
}

/// The acting identity for one run of the application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
  user: Option<User>,
}

impl Session {
  pub fn anonymous() -> Self {
    Self { user: None }
  }

  pub fn for_user(user: User) -> Self {
    Self { user: Some(user) }
  }

  pub fn user(&self) -> Option<&User> {
    self.user.as_ref()
  }

  /// Identifier of the current user, or `None` for anonymous (read-only) access.
  pub fn current_user(&self) -> Option<&str> {
    self.user.as_ref().and_then(User::identifier)
  }

  /// Whether edit/delete should be offered for `post`.
  ///
  /// This only gates what is offered; the post service enforces ownership itself.
  pub fn owns(&self, post: &Post) -> bool {
    self.current_user() == Some(post.owner.as_str())
  }
}

/// Persists the session across runs as a small JSON file.
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Load the persisted session. A missing or unreadable file yields an anonymous session.
  pub fn load(&self) -> Session {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Session::anonymous(),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to read session file");
        return Session::anonymous();
      }
    };

    match serde_json::from_str::<User>(&contents) {
      Ok(user) => Session::for_user(user),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "ignoring malformed session file");
        Session::anonymous()
      }
    }
  }

  /// Persist `user` as the current session.
  pub fn login(&self, user: User) -> Result<Session> {
    if user.identifier().is_none() {
      return Err(eyre!("A username or email is required to log in"));
    }

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let contents =
      serde_json::to_string(&user).map_err(|e| eyre!("Failed to serialize session: {}", e))?;
    std::fs::write(&self.path, contents)
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))?;

    Ok(Session::for_user(user))
  }

  /// Remove the persisted session.
  pub fn logout(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove session file {}: {}",
        self.path.display(),
        e
      )),
    }
  }
}
