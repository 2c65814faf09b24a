//! Feed synchronizer: cached-first loading, background revalidation and
//! reconciliation of local create/update/delete actions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{merge_newest_first, CacheLayer, CacheSource, CacheStorage};
use crate::error::FeedError;
use crate::query::BackgroundQueries;
use crate::session::Session;

use super::client::PostSource;
use super::types::{Post, PostDraft, PostId};
use super::view::FeedView;

/// Number of posts requested per feed fetch.
pub const PAGE_SIZE: usize = 50;

/// Result of an incremental fetch: when it was issued, and what arrived.
type Incremental = (DateTime<Utc>, Vec<Post>);

/// What `load_feed` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  /// No usable cache; the feed was fetched in full.
  Fetched,
  /// Cached feed shown; newer posts are being fetched in the background.
  Revalidating,
  /// Cached feed was expired and has been replaced by a full fetch.
  Refreshed,
}

/// Keeps the feed view and its persisted snapshot up to date.
///
/// The synchronizer is the only writer of the snapshot. Background fetches
/// never mutate state directly; their results are applied by
/// `poll_background` or `settle` on the owning task.
pub struct FeedSynchronizer<P: PostSource + 'static, S: CacheStorage> {
  source: Arc<P>,
  cache: CacheLayer<S>,
  session: Session,
  view: FeedView,
  background: BackgroundQueries<Incremental>,
  page_size: usize,
}

impl<P: PostSource + 'static, S: CacheStorage> FeedSynchronizer<P, S> {
  pub fn new(source: P, cache: CacheLayer<S>, session: Session) -> Self {
    Self {
      source: Arc::new(source),
      cache,
      session,
      view: FeedView::new(),
      background: BackgroundQueries::new(),
      page_size: PAGE_SIZE,
    }
  }

  pub fn view(&self) -> &FeedView {
    &self.view
  }

  pub fn posts(&self) -> &[Post] {
    self.view.posts()
  }

  pub fn subscribe(&self) -> watch::Receiver<Vec<Post>> {
    self.view.subscribe()
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn source(&self) -> &P {
    &self.source
  }

  /// Number of background fetches that have not been applied yet.
  pub fn pending(&self) -> usize {
    self.background.in_flight()
  }

  /// Show the feed, trusting the cache as far as it can be trusted.
  ///
  /// A cached snapshot is published before any network call. Within the stale
  /// window only newer posts are fetched, in the background; past it the whole
  /// feed is fetched before returning. Errors are returned only for full fetches,
  /// and leave whatever was already published in place.
  pub async fn load_feed(&mut self) -> Result<LoadOutcome, FeedError> {
    let snapshot = match self.cache.read::<Post>() {
      Some(snapshot) => snapshot,
      None => {
        info!("no cached feed, fetching in full");
        self.fetch_all().await?;
        return Ok(LoadOutcome::Fetched);
      }
    };

    let stale = self.cache.is_stale(snapshot.fetched_at);
    let source = if stale {
      CacheSource::CacheStale
    } else {
      CacheSource::CacheFresh
    };
    debug!(
      posts = snapshot.entries.len(),
      fetched_at = %snapshot.fetched_at,
      stale,
      "publishing cached feed"
    );
    self.view.publish(snapshot.entries, source);

    if stale {
      info!("cached feed expired, fetching in full");
      self.fetch_all().await?;
      Ok(LoadOutcome::Refreshed)
    } else {
      self.fetch_incremental(snapshot.fetched_at);
      Ok(LoadOutcome::Revalidating)
    }
  }

  /// Fetch the first page of the feed and make it the whole feed.
  ///
  /// On failure neither the view nor the snapshot is touched. On success any
  /// background revalidation still in flight is discarded.
  pub async fn fetch_all(&mut self) -> Result<(), FeedError> {
    let started = Utc::now();
    let posts = match self.source.list_posts(self.page_size).await {
      Ok(posts) => posts,
      Err(e) => {
        warn!(error = %e, "full feed fetch failed");
        return Err(e);
      }
    };

    // Revalidations issued before this fetch would move fetched_at backwards
    if self.background.in_flight() > 0 {
      debug!(
        pending = self.background.in_flight(),
        "discarding revalidation superseded by full fetch"
      );
    }
    self.background.cancel();

    info!(posts = posts.len(), "fetched feed");
    self.view.publish(posts, CacheSource::Network);
    if let Err(e) = self.cache.replace(self.view.posts(), started) {
      warn!(error = %e, "failed to store feed snapshot");
    }
    Ok(())
  }

  /// Start fetching posts created after `since` without waiting for them.
  ///
  /// The result is merged when it is applied; a failure is dropped silently.
  pub fn fetch_incremental(&mut self, since: DateTime<Utc>) {
    let source = Arc::clone(&self.source);
    let limit = self.page_size;
    debug!(%since, "starting background revalidation");

    self.background.spawn(async move {
      let started = Utc::now();
      let posts = source.list_posts_after(since, limit).await?;
      Ok::<_, FeedError>((started, posts))
    });
  }

  /// Apply background results that have already settled. Returns how many were applied.
  pub fn poll_background(&mut self) -> usize {
    let mut applied = 0;
    while let Some(result) = self.background.try_next() {
      self.apply_background(result);
      applied += 1;
    }
    applied
  }

  /// Wait for every in-flight background fetch and apply it.
  pub async fn settle(&mut self) {
    while let Some(result) = self.background.next().await {
      self.apply_background(result);
    }
  }

  /// The consuming view went away: discard anything still in flight.
  pub fn deactivate(&mut self) {
    if self.background.in_flight() > 0 {
      debug!(
        pending = self.background.in_flight(),
        "discarding background revalidation"
      );
    }
    self.background.cancel();
  }

  /// Drop the snapshot and load the feed again, which forces a full fetch.
  pub async fn force_refresh(&mut self) -> Result<LoadOutcome, FeedError> {
    info!("forcing feed refresh");
    self.cache.clear()?;
    self.load_feed().await
  }

  fn apply_background(&mut self, result: Result<Incremental, FeedError>) {
    match result {
      Ok((started, posts)) => self.apply_incremental(started, posts),
      Err(e) => {
        // Background revalidation must never disturb a usable feed
        debug!(error = %e, "background revalidation failed, keeping current feed");
      }
    }
  }

  fn apply_incremental(&mut self, fetched_at: DateTime<Utc>, posts: Vec<Post>) {
    if posts.is_empty() {
      debug!("no new posts");
      return;
    }

    info!(new_posts = posts.len(), "merging new posts into feed");
    let merged = merge_newest_first(self.view.posts(), posts);
    self.view.publish(merged, CacheSource::Network);
    if let Err(e) = self.cache.replace(self.view.posts(), fetched_at) {
      warn!(error = %e, "failed to store merged feed snapshot");
    }
  }

  // ==========================================================================
  // Local actions
  // ==========================================================================

  /// Create a post and put it at the head of the feed.
  pub async fn create_post(&mut self, draft: &PostDraft) -> Result<Post, FeedError> {
    draft.validate()?;
    self.hydrate();

    let post = self.source.create_post(draft).await?;
    info!(id = post.id, "created post");
    self.view.prepend(post.clone());
    self.patch_cache();
    Ok(post)
  }

  /// Edit a post, keeping its position in the feed.
  pub async fn update_post(&mut self, id: PostId, draft: &PostDraft) -> Result<Post, FeedError> {
    draft.validate()?;
    self.hydrate();

    let post = self.source.update_post(id, draft).await?;
    info!(id, "updated post");
    if self.view.replace(post.clone()) {
      self.patch_cache();
    } else {
      debug!(id, "updated post is not in the feed");
    }
    Ok(post)
  }

  /// Delete a post and drop it from the feed.
  pub async fn delete_post(&mut self, id: PostId) -> Result<(), FeedError> {
    self.hydrate();

    self.source.delete_post(id).await?;
    info!(id, "deleted post");
    if self.view.remove(id) {
      self.patch_cache();
    }
    Ok(())
  }

  /// Whether edit/delete should be offered for the post with `id`.
  ///
  /// `None` when the post is not in the feed.
  pub fn can_modify(&mut self, id: PostId) -> Option<bool> {
    self.hydrate();
    self.view.get(id).map(|post| self.session.owns(post))
  }

  /// Publish the cached snapshot if nothing has been shown yet, so that a
  /// local action patches the full cached feed rather than an empty one.
  fn hydrate(&mut self) {
    if self.view.source().is_some() {
      return;
    }
    if let Some(snapshot) = self.cache.read::<Post>() {
      let source = if self.cache.is_stale(snapshot.fetched_at) {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      };
      self.view.publish(snapshot.entries, source);
    }
  }

  fn patch_cache(&self) {
    if let Err(e) = self.cache.patch(self.view.posts()) {
      warn!(error = %e, "failed to patch feed snapshot");
    }
  }
}
