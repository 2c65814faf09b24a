use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::error::FeedError;
use crate::posts::api_types::{ApiErrorBody, ApiPost, ApiPostBody};
use crate::posts::types::{Post, PostDraft, PostId};
use crate::session::Session;

/// Header carrying the acting user's identifier.
pub const USER_HEADER: &str = "x-user-id";

/// The remote post service, as seen by the synchronizer.
#[async_trait]
pub trait PostSource: Send + Sync {
  /// First page of the feed, newest first.
  async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, FeedError>;

  /// Posts created strictly after `since`, newest first.
  async fn list_posts_after(
    &self,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<Post>, FeedError>;

  async fn get_post(&self, id: PostId) -> Result<Post, FeedError>;

  async fn create_post(&self, draft: &PostDraft) -> Result<Post, FeedError>;

  async fn update_post(&self, id: PostId, draft: &PostDraft) -> Result<Post, FeedError>;

  async fn delete_post(&self, id: PostId) -> Result<(), FeedError>;
}

/// HTTP client for the post service
#[derive(Clone)]
pub struct PostClient {
  http: reqwest::Client,
  base_url: String,
  session: Session,
}

impl PostClient {
  pub fn new(base_url: &str, session: Session) -> Result<Self> {
    url::Url::parse(base_url).map_err(|e| eyre!("Invalid API URL '{}': {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("pinfeed/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      session,
    })
  }

  pub(super) fn http(&self) -> &reqwest::Client {
    &self.http
  }

  pub(super) fn url(&self, endpoint: &str) -> String {
    format!("{}{}", self.base_url, endpoint)
  }

  /// Attach the identity header when a user is logged in.
  fn with_identity(&self, request: RequestBuilder) -> RequestBuilder {
    match self.session.current_user() {
      Some(user) => request.header(USER_HEADER, user),
      None => request,
    }
  }

  pub(super) async fn send(&self, request: RequestBuilder) -> Result<Response, FeedError> {
    let response = self.with_identity(request).send().await?;
    check_status(response).await
  }

  async fn fetch_list(&self, query: &[(&str, String)]) -> Result<Vec<Post>, FeedError> {
    let request = self.http.get(self.url("/posts")).query(query);
    let response = self.send(request).await?;
    let posts: Vec<ApiPost> = response.json().await?;

    posts
      .into_iter()
      .map(|p| p.into_post().map_err(FeedError::Decode))
      .collect()
  }
}

/// Turn a non-2xx response into the matching error.
async fn check_status(response: Response) -> Result<Response, FeedError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let message = response
    .json::<ApiErrorBody>()
    .await
    .ok()
    .and_then(|body| body.message());

  debug!(status = status.as_u16(), ?message, "post service returned an error");

  if status == StatusCode::FORBIDDEN {
    Err(FeedError::Permission { message })
  } else {
    Err(FeedError::Remote {
      status: status.as_u16(),
      message,
    })
  }
}

#[async_trait]
impl PostSource for PostClient {
  async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, FeedError> {
    debug!(limit, "fetching feed");
    self.fetch_list(&[("limit", limit.to_string())]).await
  }

  async fn list_posts_after(
    &self,
    since: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<Post>, FeedError> {
    let after_date = since.to_rfc3339_opts(SecondsFormat::Micros, true);
    debug!(%after_date, limit, "fetching posts created after");
    self
      .fetch_list(&[("after_date", after_date), ("limit", limit.to_string())])
      .await
  }

  async fn get_post(&self, id: PostId) -> Result<Post, FeedError> {
    let response = self
      .send(self.http.get(self.url(&format!("/posts/{}", id))))
      .await?;
    let post: ApiPost = response.json().await?;
    post.into_post().map_err(FeedError::Decode)
  }

  async fn create_post(&self, draft: &PostDraft) -> Result<Post, FeedError> {
    let request = self
      .http
      .post(self.url("/posts"))
      .json(&ApiPostBody::from(draft));
    let response = self.send(request).await?;
    let post: ApiPost = response.json().await?;
    post.into_post().map_err(FeedError::Decode)
  }

  async fn update_post(&self, id: PostId, draft: &PostDraft) -> Result<Post, FeedError> {
    let request = self
      .http
      .put(self.url(&format!("/posts/{}", id)))
      .json(&ApiPostBody::from(draft));
    let response = self.send(request).await?;
    let post: ApiPost = response.json().await?;
    post.into_post().map_err(FeedError::Decode)
  }

  async fn delete_post(&self, id: PostId) -> Result<(), FeedError> {
    self
      .send(self.http.delete(self.url(&format!("/posts/{}", id))))
      .await?;
    Ok(())
  }
}
