//! Posts: domain types, the post service client, photo discovery, and the feed synchronizer.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod discovery;
pub mod sync;
pub mod types;
pub mod view;

pub use client::{PostClient, PostSource};
pub use sync::{FeedSynchronizer, LoadOutcome};
pub use types::{Post, PostDraft, PostId};
