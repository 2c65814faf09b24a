//! Cancellable background queries whose results are applied by their owner.
//!
//! Background work runs on tokio tasks, but never touches shared state itself.
//! Each task sends its settled result over a channel; the owner drains the
//! channel and applies results in completion order. Cancelling flips a
//! liveness flag so that anything settling afterwards is discarded.
//!
//! # Example
//!
//! ```ignore
//! let mut queries = BackgroundQueries::new();
//! let client = client.clone();
//! queries.spawn(async move { client.list_posts_after(since, 50).await });
//!
//! // In event loop tick
//! while let Some(result) = queries.try_next() {
//!     apply(result);
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::FeedError;

type Settled<T> = Result<T, FeedError>;

/// A set of in-flight background queries sharing one liveness flag.
pub struct BackgroundQueries<T> {
  sender: mpsc::UnboundedSender<Settled<T>>,
  receiver: mpsc::UnboundedReceiver<Settled<T>>,
  alive: Arc<AtomicBool>,
  in_flight: usize,
}

impl<T: Send + 'static> BackgroundQueries<T> {
  pub fn new() -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      sender,
      receiver,
      alive: Arc::new(AtomicBool::new(true)),
      in_flight: 0,
    }
  }

  /// Spawn a query without waiting for it.
  ///
  /// Its result becomes available through `try_next()` or `next()` once it
  /// settles, unless the set is cancelled first.
  pub fn spawn<Fut>(&mut self, future: Fut)
  where
    Fut: Future<Output = Settled<T>> + Send + 'static,
  {
    let tx = self.sender.clone();
    let alive = Arc::clone(&self.alive);
    self.in_flight += 1;

    tokio::spawn(async move {
      let result = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(FeedError::Task("background query panicked".to_string())),
      };
      if alive.load(Ordering::SeqCst) {
        // Ignore send errors - the owner may have been dropped
        let _ = tx.send(result);
      }
    });
  }

  /// Number of spawned queries that have not been received yet.
  pub fn in_flight(&self) -> usize {
    self.in_flight
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::SeqCst)
  }

  /// Take the next settled result without blocking.
  pub fn try_next(&mut self) -> Option<Settled<T>> {
    if !self.is_alive() {
      return None;
    }
    match self.receiver.try_recv() {
      Ok(result) => {
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(result)
      }
      Err(_) => None,
    }
  }

  /// Wait for the next settled result.
  ///
  /// Returns `None` immediately when nothing is in flight.
  pub async fn next(&mut self) -> Option<Settled<T>> {
    if self.in_flight == 0 || !self.is_alive() {
      return None;
    }
    let result = self.receiver.recv().await;
    if result.is_some() {
      self.in_flight -= 1;
    }
    result
  }

  /// Discard every pending and queued result.
  ///
  /// The set stays usable: queries spawned afterwards get a fresh liveness flag.
  pub fn cancel(&mut self) {
    self.alive.store(false, Ordering::SeqCst);

    let (sender, receiver) = mpsc::unbounded_channel();
    self.sender = sender;
    self.receiver = receiver;
    self.alive = Arc::new(AtomicBool::new(true));
    self.in_flight = 0;
  }
}

impl<T: Send + 'static> Default for BackgroundQueries<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> std::fmt::Debug for BackgroundQueries<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BackgroundQueries")
      .field("in_flight", &self.in_flight)
      .field("alive", &self.alive.load(Ordering::SeqCst))
      .finish_non_exhaustive()
  }
}
