//! Caching implementations for post types.

use sha2::{Digest, Sha256};

use crate::cache::Cacheable;

use super::types::Post;

impl Cacheable for Post {
  fn cache_key(&self) -> String {
    self.id.to_string()
  }
}

/// Cache scope for a post service, so two services never share a snapshot.
///
/// The base URL is normalized (trailing slashes, case) before hashing.
pub fn feed_scope(api_url: &str) -> String {
  let input = format!("feed:{}", api_url.trim().trim_end_matches('/').to_lowercase());

  // SHA256 hash for stable, fixed-length keys
  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}
