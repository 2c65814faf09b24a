//! Error taxonomy for feed and post operations.

use thiserror::Error;

/// Errors surfaced by the post client and the feed synchronizer.
#[derive(Error, Debug)]
pub enum FeedError {
  /// Network or connectivity failure.
  #[error("transport error: {0}")]
  Transport(String),

  /// Non-2xx response from the post service.
  #[error("{}", remote_display(*status, message.as_deref()))]
  Remote {
    status: u16,
    message: Option<String>,
  },

  /// A response body did not match the expected shape.
  #[error("unexpected response: {0}")]
  Decode(String),

  /// Input rejected before any request was sent.
  #[error("invalid input: {0}")]
  Validation(String),

  /// The acting user does not own the target post.
  #[error("permission denied{}", message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
  Permission { message: Option<String> },

  /// Local cache storage failed.
  #[error("cache storage error: {0}")]
  Storage(String),

  /// A background task ended without producing a result.
  #[error("background task failed: {0}")]
  Task(String),

  /// Writing command output failed.
  #[error("output error: {0}")]
  Output(String),
}

fn remote_display(status: u16, message: Option<&str>) -> String {
  match message {
    Some(m) => format!("remote error {}: {}", status, m),
    None => format!("remote error {}", status),
  }
}

impl From<reqwest::Error> for FeedError {
  fn from(err: reqwest::Error) -> Self {
    // A body that arrived but does not parse is not a connectivity problem
    if err.is_decode() {
      FeedError::Decode(err.to_string())
    } else {
      FeedError::Transport(err.to_string())
    }
  }
}

impl From<color_eyre::Report> for FeedError {
  fn from(report: color_eyre::Report) -> Self {
    FeedError::Storage(format!("{:#}", report))
  }
}

impl FeedError {
  /// Whether retrying the same call later may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      FeedError::Transport(_) => true,
      FeedError::Remote { status, .. } => *status >= 500,
      _ => false,
    }
  }

  pub fn is_permission(&self) -> bool {
    matches!(self, FeedError::Permission { .. })
  }

  /// A sentence suitable for showing to the user at the point of action.
  pub fn friendly_message(&self) -> String {
    match self {
      FeedError::Transport(_) => "Connection error. Check your network and try again.".to_string(),
      FeedError::Remote { status, .. } => status_message(*status),
      FeedError::Decode(_) => "Unexpected response from the server.".to_string(),
      FeedError::Validation(msg) => msg.clone(),
      FeedError::Permission { .. } => "You are not allowed to edit or delete this post.".to_string(),
      FeedError::Storage(_) => "The local feed cache could not be accessed.".to_string(),
      FeedError::Task(_) => "Something went wrong. Please try again.".to_string(),
      FeedError::Output(_) => "Could not write the command output.".to_string(),
    }
  }
}

fn status_message(status: u16) -> String {
  match status {
    400 => "Invalid request. Check the data you entered.".to_string(),
    401 => "Please log in to continue.".to_string(),
    403 => "You are not allowed to perform this action.".to_string(),
    404 => "The requested post was not found.".to_string(),
    409 => "A resource with this data already exists.".to_string(),
    422 => "The data provided is not valid.".to_string(),
    500 => "Server error. Please try again later.".to_string(),
    502 => "The server is temporarily unavailable.".to_string(),
    503 => "Service unavailable. Please try again later.".to_string(),
    other => format!("Error {}. Please try again.", other),
  }
}
