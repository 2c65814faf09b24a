//! Serde types matching the post service's JSON payloads.
//!
//! These types are separate from domain types so that wire quirks (offset-less
//! timestamps, structured error details) stay out of the rest of the crate.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Post, PostDraft, PostId};

#[derive(Debug, Deserialize)]
pub struct ApiPost {
  pub id: PostId,
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  pub image_url: String,
  pub owner: String,
  pub created_at: String,
}

impl ApiPost {
  pub fn into_post(self) -> Result<Post, String> {
    let created_at = parse_created_at(&self.created_at)?;
    Ok(Post {
      id: self.id,
      title: self.title,
      description: self.description,
      image_url: self.image_url,
      owner: self.owner,
      created_at,
    })
  }
}

/// Parse a creation timestamp. Values without an offset are taken as UTC.
pub fn parse_created_at(s: &str) -> Result<DateTime<Utc>, String> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|dt| dt.and_utc())
    .map_err(|e| format!("invalid created_at '{}': {}", s, e))
}

/// Body of create and update requests
#[derive(Debug, Serialize)]
pub struct ApiPostBody<'a> {
  pub title: &'a str,
  pub description: Option<&'a str>,
  pub image_url: &'a str,
}

impl<'a> From<&'a PostDraft> for ApiPostBody<'a> {
  fn from(draft: &'a PostDraft) -> Self {
    Self {
      title: &draft.title,
      description: draft.description.as_deref(),
      image_url: &draft.image_url,
    }
  }
}

/// Error body; `detail` is a string for most errors and a list for validation failures
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
  pub fn message(&self) -> Option<String> {
    match self.detail.as_ref()? {
      serde_json::Value::String(s) => Some(s.clone()),
      serde_json::Value::Null => None,
      other => Some(other.to_string()),
    }
  }
}
