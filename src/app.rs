use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cache::{CacheLayer, CacheSource, CacheStorage};
use crate::commands::{Command, SearchArgs};
use crate::config::Config;
use crate::error::FeedError;
use crate::event::{Event, EventHandler};
use crate::posts::discovery::{DiscoveryPhoto, Paging, PhotoOrder, MUSIC_SUGGESTIONS};
use crate::posts::{FeedSynchronizer, LoadOutcome, Post, PostClient, PostDraft, PostId, PostSource};
use crate::session::Session;

/// How often the follow loop applies settled background results
const TICK_RATE: Duration = Duration::from_millis(250);

/// Main application state: one synchronizer, one output.
pub struct App<S: CacheStorage, W: Write> {
  feed: FeedSynchronizer<PostClient, S>,
  config: Config,
  out: W,
}

impl<S: CacheStorage, W: Write> App<S, W> {
  pub fn new(config: Config, session: Session, storage: S, out: W) -> color_eyre::Result<Self> {
    let client = PostClient::new(config.api_url()?, session.clone())?;
    let feed = FeedSynchronizer::new(client, CacheLayer::new(storage), session);

    Ok(Self { feed, config, out })
  }

  /// Run a feed command to completion.
  pub async fn run(&mut self, command: Command) -> Result<(), FeedError> {
    debug!(?command, "running command");
    match command {
      Command::Feed { no_wait } => self.show_feed(!no_wait).await,
      Command::Follow => self.follow().await,
      Command::Refresh => {
        let result = self.feed.force_refresh().await;
        self.finish_load(result)
      }
      Command::Show { id } => {
        let post = self.feed.source().get_post(id).await?;
        let owned = self.feed.session().owns(&post);
        self.write(&render_post(&post, owned))
      }
      Command::Create(fields) => {
        self.require_login()?;
        let post = self.feed.create_post(&fields.to_draft()).await?;
        self.write(&format!("Created post #{}\n", post.id))
      }
      Command::Edit { id, fields } => self.edit(id, fields.to_draft()).await,
      Command::Delete { id } => {
        self.require_login()?;
        self.check_ownership(id)?;
        self.feed.delete_post(id).await?;
        self.write(&format!("Deleted post #{}\n", id))
      }
      Command::Explore { order, paging } => self.explore(paging.to_paging(), order).await,
      Command::Search(args) => self.search(&args).await,
      Command::Login { .. } | Command::Logout | Command::Whoami => {
        // Session commands never reach the synchronizer
        Ok(())
      }
    }
  }

  async fn show_feed(&mut self, wait: bool) -> Result<(), FeedError> {
    let result = self.feed.load_feed().await;
    let outcome = result.as_ref().ok().copied();
    self.finish_load(result)?;

    if wait && outcome == Some(LoadOutcome::Revalidating) {
      let mut updates = self.feed.subscribe();
      self.feed.settle().await;
      if updates.has_changed().unwrap_or(false) {
        self.write("\nNew posts arrived:\n\n")?;
        self.print_feed()?;
      }
    }
    Ok(())
  }

  /// Print whatever was published, then surface the load error if any.
  ///
  /// A failed full fetch still leaves an older cached feed on screen.
  fn finish_load(&mut self, result: Result<LoadOutcome, FeedError>) -> Result<(), FeedError> {
    match result {
      Ok(_) => self.print_feed(),
      Err(e) => {
        if self.feed.view().source().is_some_and(|s| s.is_cached()) {
          self.print_feed()?;
        }
        Err(e)
      }
    }
  }

  async fn follow(&mut self) -> Result<(), FeedError> {
    let mut events = EventHandler::new(TICK_RATE);
    self.follow_events(&mut events).await
  }

  /// Follow loop: apply settled results on every tick, reload periodically,
  /// and drop pending work once the events stop.
  async fn follow_events(&mut self, events: &mut EventHandler) -> Result<(), FeedError> {
    let mut updates = self.feed.subscribe();
    let reload_every = Duration::from_secs(self.config.follow.reload_secs.max(1));

    self.reload().await?;
    let _ = updates.borrow_and_update();
    self.print_feed()?;
    let mut last_load = Instant::now();

    while let Some(event) = events.next().await {
      match event {
        Event::Tick => {
          self.feed.poll_background();
          if last_load.elapsed() >= reload_every {
            last_load = Instant::now();
            self.reload().await?;
          }
          if updates.has_changed().unwrap_or(false) {
            let _ = updates.borrow_and_update();
            self.write("\n")?;
            self.print_feed()?;
          }
        }
        Event::Interrupt => {
          info!("follow interrupted");
          break;
        }
      }
    }

    self.feed.deactivate();
    Ok(())
  }

  /// Load the feed, reporting a failure without leaving the follow loop.
  async fn reload(&mut self) -> Result<(), FeedError> {
    if let Err(e) = self.feed.load_feed().await {
      self.write(&format!("{}\n", e.friendly_message()))?;
    }
    Ok(())
  }

  async fn explore(&mut self, paging: Paging, order: PhotoOrder) -> Result<(), FeedError> {
    let photos = self.feed.source().discover_photos(paging, order).await?;
    let mut text = format!("Discover (page {})\n\n", paging.page);
    if photos.is_empty() {
      text.push_str("No photos found.\n");
    }
    for photo in &photos {
      text.push_str(&render_photo(photo));
    }
    self.write(&text)
  }

  async fn search(&mut self, args: &SearchArgs) -> Result<(), FeedError> {
    let search = args.to_search();
    let page = self.feed.source().search_photos(&search).await?;

    let mut text = format!(
      "Results for \"{}\" (page {} of {}, {} photos)\n\n",
      search.query,
      search.paging.page,
      page.total_pages.max(1),
      page.total
    );
    for photo in &page.results {
      text.push_str(&render_photo(photo));
    }
    if page.results.is_empty() {
      text.push_str("No photos found.\n");
      if args.music {
        text.push_str(&format!("Try: {}\n", MUSIC_SUGGESTIONS.join(", ")));
      }
    }
    self.write(&text)
  }

  async fn edit(&mut self, id: PostId, draft: PostDraft) -> Result<(), FeedError> {
    self.require_login()?;
    self.check_ownership(id)?;
    let post = self.feed.update_post(id, &draft).await?;
    self.write(&format!("Updated post #{}\n", post.id))
  }

  fn require_login(&self) -> Result<(), FeedError> {
    match self.feed.session().current_user() {
      Some(_) => Ok(()),
      None => Err(FeedError::Validation(
        "Log in first: pinfeed login <username>".to_string(),
      )),
    }
  }

  /// Refuse locally when the cached post is known to belong to someone else.
  fn check_ownership(&mut self, id: PostId) -> Result<(), FeedError> {
    match self.feed.can_modify(id) {
      Some(false) => Err(FeedError::Permission { message: None }),
      // Unknown posts are left to the post service to decide
      Some(true) | None => Ok(()),
    }
  }

  fn print_feed(&mut self) -> Result<(), FeedError> {
    let header = match self.feed.view().source() {
      Some(CacheSource::CacheStale) => "Feed (cached, may be out of date)\n\n",
      Some(CacheSource::CacheFresh) => "Feed (cached)\n\n",
      Some(CacheSource::Network) | None => "Feed\n\n",
    };

    let mut text = header.to_string();
    if self.feed.posts().is_empty() {
      text.push_str("No posts yet.\n");
    }
    for post in self.feed.posts() {
      text.push_str(&render_post(post, self.feed.session().owns(post)));
    }
    self.write(&text)
  }

  fn write(&mut self, text: &str) -> Result<(), FeedError> {
    self
      .out
      .write_all(text.as_bytes())
      .and_then(|_| self.out.flush())
      .map_err(|e| FeedError::Output(e.to_string()))
  }
}

/// One post as a small text block.
pub fn render_post(post: &Post, owned: bool) -> String {
  let mut text = format!(
    "#{} {}{}\n    by {} on {}\n",
    post.id,
    post.title,
    if owned { " [yours]" } else { "" },
    post.owner,
    post.created_at.format("%Y-%m-%d %H:%M UTC"),
  );
  if let Some(description) = &post.description {
    text.push_str(&format!("    {}\n", description));
  }
  text.push_str(&format!("    {}\n", post.image_url));
  text
}

/// A discovery photo, credited to its author.
pub fn render_photo(photo: &DiscoveryPhoto) -> String {
  format!(
    "{}\n    {}\n    by {} ({})\n",
    photo.description, photo.url, photo.user.name, photo.user.profile_link
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSnapshot, SqliteStorage};
  use crate::commands::PostFields;
  use crate::session::User;
  use chrono::{Duration as ChronoDuration, Utc};
  use serde_json::json;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn post(id: PostId, owner: &str) -> Post {
    Post {
      id,
      title: format!("post {}", id),
      description: None,
      image_url: format!("https://example.com/{}.jpg", id),
      owner: owner.to_string(),
      created_at: Utc::now() - ChronoDuration::hours(id as i64),
    }
  }

  fn post_json(id: PostId, owner: &str) -> serde_json::Value {
    json!({
      "id": id,
      "title": format!("post {}", id),
      "description": "fresh",
      "image_url": format!("https://example.com/{}.jpg", id),
      "owner": owner,
      "created_at": "2024-03-01T10:00:00Z"
    })
  }

  fn session(name: &str) -> Session {
    Session::for_user(User {
      username: name.to_string(),
      email: None,
    })
  }

  fn app(
    server: &MockServer,
    session: Session,
    storage: SqliteStorage,
  ) -> App<SqliteStorage, Vec<u8>> {
    App::new(Config::with_api_url(&server.uri()), session, storage, Vec::new()).unwrap()
  }

  fn output<S: CacheStorage>(app: &App<S, Vec<u8>>) -> String {
    String::from_utf8_lossy(&app.out).to_string()
  }

  fn fields(title: &str) -> PostFields {
    PostFields {
      title: title.to_string(),
      image_url: "https://example.com/new.jpg".to_string(),
      description: None,
    }
  }

  #[tokio::test]
  async fn test_feed_without_cache_prints_fetched_posts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(2, "ana")])))
      .expect(1)
      .mount(&server)
      .await;

    let mut app = app(&server, session("ana"), SqliteStorage::open_in_memory("t").unwrap());
    app.run(Command::Feed { no_wait: false }).await.unwrap();

    let out = output(&app);
    assert!(out.starts_with("Feed\n"));
    assert!(out.contains("#2 post 2 [yours]"));
    assert!(out.contains("    fresh\n"));
  }

  #[tokio::test]
  async fn test_stale_cache_is_shown_when_refresh_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let storage = SqliteStorage::open_in_memory("t").unwrap();
    storage
      .store_snapshot(&CacheSnapshot::new(
        vec![post(1, "bob")],
        Utc::now() - ChronoDuration::minutes(30),
      ))
      .unwrap();

    let mut app = app(&server, Session::anonymous(), storage);
    let err = app.run(Command::Feed { no_wait: true }).await.unwrap_err();

    assert!(matches!(err, FeedError::Remote { status: 503, .. }));
    let out = output(&app);
    assert!(out.contains("may be out of date"));
    assert!(out.contains("#1 post 1\n"));
  }

  #[tokio::test]
  async fn test_feed_reprints_after_background_revalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(9, "cy")])))
      .expect(1)
      .mount(&server)
      .await;

    let storage = SqliteStorage::open_in_memory("t").unwrap();
    storage
      .store_snapshot(&CacheSnapshot::new(vec![post(1, "bob")], Utc::now()))
      .unwrap();

    let mut app = app(&server, Session::anonymous(), storage);
    app.run(Command::Feed { no_wait: false }).await.unwrap();

    let out = output(&app);
    assert!(out.starts_with("Feed (cached)\n"));
    let (before, after) = out.split_once("New posts arrived").unwrap();
    assert!(!before.contains("#9"));
    assert!(after.contains("#9 post 9"));
    assert!(after.contains("#1 post 1"));
  }

  #[tokio::test]
  async fn test_edit_of_foreign_cached_post_is_refused_locally() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .respond_with(ResponseTemplate::new(200).set_body_json(post_json(1, "bob")))
      .expect(0)
      .mount(&server)
      .await;

    let storage = SqliteStorage::open_in_memory("t").unwrap();
    storage
      .store_snapshot(&CacheSnapshot::new(vec![post(1, "bob")], Utc::now()))
      .unwrap();

    let mut app = app(&server, session("ana"), storage);
    let err = app
      .run(Command::Edit {
        id: 1,
        fields: fields("Mine now"),
      })
      .await
      .unwrap_err();
    assert!(err.is_permission());
  }

  #[tokio::test]
  async fn test_create_requires_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(200).set_body_json(post_json(5, "ana")))
      .expect(0)
      .mount(&server)
      .await;

    let mut app = app(&server, Session::anonymous(), SqliteStorage::open_in_memory("t").unwrap());
    let err = app.run(Command::Create(fields("Hello"))).await.unwrap_err();
    assert!(matches!(err, FeedError::Validation(_)));
  }

  #[tokio::test]
  async fn test_delete_unknown_post_defers_to_service() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
      .and(path("/posts/44"))
      .respond_with(ResponseTemplate::new(403).set_body_json(json!({"detail": "Not your post"})))
      .expect(1)
      .mount(&server)
      .await;

    let mut app = app(&server, session("ana"), SqliteStorage::open_in_memory("t").unwrap());
    let err = app.run(Command::Delete { id: 44 }).await.unwrap_err();
    assert!(err.is_permission());
  }

  #[tokio::test]
  async fn test_show_renders_single_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts/3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(post_json(3, "ana")))
      .mount(&server)
      .await;

    let mut app = app(&server, session("bob"), SqliteStorage::open_in_memory("t").unwrap());
    app.run(Command::Show { id: 3 }).await.unwrap();
    assert_eq!(
      output(&app),
      "#3 post 3\n    by ana on 2024-03-01 10:00 UTC\n    fresh\n    https://example.com/3.jpg\n"
    );
  }

  struct BrokenPipe;

  impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
      Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_output_failure_is_not_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts/3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(post_json(3, "ana")))
      .mount(&server)
      .await;

    let mut app = App::new(
      Config::with_api_url(&server.uri()),
      Session::anonymous(),
      SqliteStorage::open_in_memory("t").unwrap(),
      BrokenPipe,
    )
    .unwrap();
    let err = app.run(Command::Show { id: 3 }).await.unwrap_err();

    assert!(matches!(err, FeedError::Output(_)));
    assert!(!err.is_retryable());
    assert_eq!(err.friendly_message(), "Could not write the command output.");
  }

  #[test]
  fn test_missing_api_url_is_reported() {
    let result = App::new(
      Config::default(),
      Session::anonymous(),
      SqliteStorage::open_in_memory("t").unwrap(),
      Vec::new(),
    );
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_follow_interrupt_discards_pending_revalidation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!([post_json(9, "cy")]))
          .set_delay(std::time::Duration::from_millis(300)),
      )
      .mount(&server)
      .await;

    let storage = SqliteStorage::open_in_memory("t").unwrap();
    storage
      .store_snapshot(&CacheSnapshot::new(vec![post(1, "bob")], Utc::now()))
      .unwrap();
    let mut app = app(&server, Session::anonymous(), storage);

    let (mut events, tx) = EventHandler::manual();
    tx.send(Event::Tick).unwrap();
    tx.send(Event::Interrupt).unwrap();
    app.follow_events(&mut events).await.unwrap();

    assert_eq!(app.feed.pending(), 0);
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert_eq!(app.feed.poll_background(), 0);
    let ids: Vec<PostId> = app.feed.posts().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![1]);
    assert!(!output(&app).contains("#9"));
  }

  #[tokio::test]
  async fn test_follow_tick_applies_new_posts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/posts"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([post_json(9, "cy")])))
      .mount(&server)
      .await;

    let storage = SqliteStorage::open_in_memory("t").unwrap();
    storage
      .store_snapshot(&CacheSnapshot::new(vec![post(1, "bob")], Utc::now()))
      .unwrap();
    let mut app = app(&server, Session::anonymous(), storage);

    let (mut events, tx) = EventHandler::manual();
    tokio::spawn(async move {
      tokio::time::sleep(std::time::Duration::from_millis(200)).await;
      let _ = tx.send(Event::Tick);
      let _ = tx.send(Event::Interrupt);
    });
    app.follow_events(&mut events).await.unwrap();

    let out = output(&app);
    let (first, reprint) = out.split_once("\n\nFeed\n").unwrap();
    assert!(first.starts_with("Feed (cached)\n"));
    assert!(!first.contains("#9"));
    assert!(reprint.contains("#9 post 9"));
    assert!(reprint.contains("#1 post 1"));
  }

  fn photo_json(id: &str) -> serde_json::Value {
    json!({
      "id": id,
      "description": "turntable at dusk",
      "url": format!("https://images.example.com/{}", id),
      "thumb": format!("https://images.example.com/{}/thumb", id),
      "user": {
        "name": "Lu Reed",
        "username": "lureed",
        "profile_link": "https://photos.example.com/@lureed"
      }
    })
  }

  #[tokio::test]
  async fn test_explore_lists_photos() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/discovery/photos"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([photo_json("a1")])))
      .expect(1)
      .mount(&server)
      .await;

    let mut app = app(&server, Session::anonymous(), SqliteStorage::open_in_memory("t").unwrap());
    app
      .run(Command::Explore {
        order: PhotoOrder::Popular,
        paging: crate::commands::PagingArgs {
          page: 1,
          per_page: 12,
        },
      })
      .await
      .unwrap();

    assert_eq!(
      output(&app),
      "Discover (page 1)\n\nturntable at dusk\n    https://images.example.com/a1\n    by Lu Reed (https://photos.example.com/@lureed)\n"
    );
  }

  #[tokio::test]
  async fn test_empty_music_search_offers_suggestions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/discovery/search"))
      .and(query_param("query", "zzz music"))
      .respond_with(
        ResponseTemplate::new(200).set_body_json(json!({"total": 0, "total_pages": 0, "results": []})),
      )
      .expect(1)
      .mount(&server)
      .await;

    let mut app = app(&server, Session::anonymous(), SqliteStorage::open_in_memory("t").unwrap());
    let args = SearchArgs {
      query: "zzz".to_string(),
      order: crate::posts::discovery::SearchOrder::Relevant,
      orientation: None,
      color: None,
      music: true,
      paging: crate::commands::PagingArgs {
        page: 1,
        per_page: 12,
      },
    };
    app.run(Command::Search(args)).await.unwrap();

    let out = output(&app);
    assert!(out.starts_with("Results for \"zzz music\" (page 1 of 1, 0 photos)"));
    assert!(out.contains("No photos found."));
    assert!(out.contains("Try: chill, sad, party"));
  }
}
