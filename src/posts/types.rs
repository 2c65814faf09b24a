use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Maximum title length, in code points.
pub const MAX_TITLE_CHARS: usize = 100;

pub type PostId = u64;

/// A shared image post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  pub id: PostId,
  pub title: String,
  pub description: Option<String>,
  pub image_url: String,
  /// Identifier of the creating user
  pub owner: String,
  /// Assigned by the post service at creation
  pub created_at: DateTime<Utc>,
}

/// User-supplied fields for creating or editing a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
  pub title: String,
  pub description: Option<String>,
  pub image_url: String,
}

impl PostDraft {
  /// Build a draft from raw input, trimming fields. A blank description becomes `None`.
  pub fn new(title: &str, description: Option<&str>, image_url: &str) -> Self {
    Self {
      title: title.trim().to_string(),
      description: description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from),
      image_url: image_url.trim().to_string(),
    }
  }

  /// Reject input that must never reach the post service.
  pub fn validate(&self) -> Result<(), FeedError> {
    if self.title.trim().is_empty() {
      return Err(FeedError::Validation("Title is required.".to_string()));
    }
    if self.title.chars().count() > MAX_TITLE_CHARS {
      return Err(FeedError::Validation(format!(
        "Title must be at most {} characters.",
        MAX_TITLE_CHARS
      )));
    }
    if self.image_url.trim().is_empty() {
      return Err(FeedError::Validation("Image URL is required.".to_string()));
    }
    // Url::parse only accepts absolute URLs
    url::Url::parse(&self.image_url)
      .map_err(|_| FeedError::Validation("Please enter a valid image URL.".to_string()))?;
    Ok(())
  }
}
