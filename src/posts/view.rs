//! In-memory feed presented to the user.

use std::collections::HashSet;
use tokio::sync::watch;

use crate::cache::CacheSource;

use super::types::{Post, PostId};

/// Ordered, id-unique list of posts, newest first.
///
/// Every mutation republishes the full list to subscribers.
#[derive(Debug)]
pub struct FeedView {
  posts: Vec<Post>,
  source: Option<CacheSource>,
  publisher: watch::Sender<Vec<Post>>,
}

impl FeedView {
  pub fn new() -> Self {
    let (publisher, _) = watch::channel(Vec::new());
    Self {
      posts: Vec::new(),
      source: None,
      publisher,
    }
  }

  /// Receive every published list, starting with the current one.
  pub fn subscribe(&self) -> watch::Receiver<Vec<Post>> {
    self.publisher.subscribe()
  }

  pub fn posts(&self) -> &[Post] {
    &self.posts
  }

  /// Where the current list came from, `None` before the first publish.
  pub fn source(&self) -> Option<CacheSource> {
    self.source
  }

  pub fn get(&self, id: PostId) -> Option<&Post> {
    self.posts.iter().find(|p| p.id == id)
  }

  /// Replace the whole list. Order is kept as given; repeated ids keep their first entry.
  pub fn publish(&mut self, posts: Vec<Post>, source: CacheSource) {
    let mut seen = HashSet::with_capacity(posts.len());
    self.posts = posts.into_iter().filter(|p| seen.insert(p.id)).collect();
    self.source = Some(source);
    self.notify();
  }

  /// Insert a post at the head, dropping any older entry with the same id.
  pub fn prepend(&mut self, post: Post) {
    self.posts.retain(|p| p.id != post.id);
    self.posts.insert(0, post);
    self.notify();
  }

  /// Replace the post with the same id in place. Returns false if it is not shown.
  pub fn replace(&mut self, post: Post) -> bool {
    match self.posts.iter_mut().find(|p| p.id == post.id) {
      Some(existing) => {
        *existing = post;
        self.notify();
        true
      }
      None => false,
    }
  }

  /// Remove the post with `id`. Returns false if it is not shown.
  pub fn remove(&mut self, id: PostId) -> bool {
    let before = self.posts.len();
    self.posts.retain(|p| p.id != id);
    if self.posts.len() == before {
      return false;
    }
    self.notify();
    true
  }

  fn notify(&self) {
    self.publisher.send_replace(self.posts.clone());
  }
}

impl Default for FeedView {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn post(id: PostId) -> Post {
    Post {
      id,
      title: format!("post {}", id),
      description: None,
      image_url: format!("https://example.com/{}.jpg", id),
      owner: "ana".to_string(),
      created_at: Utc::now(),
    }
  }

  fn ids(view: &FeedView) -> Vec<PostId> {
    view.posts().iter().map(|p| p.id).collect()
  }

  #[test]
  fn test_publish_keeps_order_and_drops_duplicates() {
    let mut view = FeedView::new();
    view.publish(vec![post(3), post(1), post(3), post(2)], CacheSource::Network);
    assert_eq!(ids(&view), vec![3, 1, 2]);
    assert_eq!(view.source(), Some(CacheSource::Network));
  }

  #[test]
  fn test_prepend_moves_existing_id_to_head() {
    let mut view = FeedView::new();
    view.publish(vec![post(5), post(4)], CacheSource::CacheFresh);
    view.prepend(post(4));
    assert_eq!(ids(&view), vec![4, 5]);
    view.prepend(post(7));
    assert_eq!(ids(&view), vec![7, 4, 5]);
  }

  #[test]
  fn test_replace_in_place() {
    let mut view = FeedView::new();
    view.publish(vec![post(3), post(2), post(1)], CacheSource::Network);

    let mut edited = post(2);
    edited.title = "edited".to_string();
    assert!(view.replace(edited));

    assert_eq!(ids(&view), vec![3, 2, 1]);
    assert_eq!(view.get(2).unwrap().title, "edited");
    assert!(!view.replace(post(9)));
  }

  #[test]
  fn test_remove() {
    let mut view = FeedView::new();
    view.publish(vec![post(2), post(1)], CacheSource::Network);
    assert!(view.remove(2));
    assert!(!view.remove(2));
    assert_eq!(ids(&view), vec![1]);
  }

  #[test]
  fn test_subscribers_see_latest_list() {
    let mut view = FeedView::new();
    let rx = view.subscribe();
    view.publish(vec![post(1)], CacheSource::CacheFresh);
    view.prepend(post(2));
    let ids: Vec<PostId> = rx.borrow().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 1]);
  }
}
