//! Photo discovery: popular photos and photo search proxied by the post service.
//!
//! Discovery results are never part of the feed and are never cached.

use clap::ValueEnum;
use serde::Deserialize;
use tracing::debug;

use crate::error::FeedError;

use super::client::PostClient;

/// Largest page the post service accepts.
pub const MAX_PER_PAGE: u32 = 30;

/// Terms that already make a query music-themed.
const MUSIC_TERMS: &[&str] = &[
  "music",
  "musical",
  "musician",
  "song",
  "songs",
  "album",
  "vinyl",
  "concert",
  "band",
  "guitar",
  "piano",
  "drums",
  "dj",
  "headphones",
  "spotify",
  "playlist",
];

/// Search ideas offered when a music search comes back empty.
pub const MUSIC_SUGGESTIONS: &[&str] = &[
  "chill",
  "sad",
  "party",
  "romantic",
  "energetic",
  "melancholic",
  "happy",
  "lo-fi",
  "rock",
  "jazz",
  "hip hop",
  "electronic",
  "classical",
  "indie",
  "pop",
  "retro",
  "80s vibes",
  "summer",
  "night drive",
  "study",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhotoAuthor {
  pub name: String,
  pub username: String,
  /// Profile page, with attribution parameters already attached
  pub profile_link: String,
}

/// A photo suggested for inspiration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryPhoto {
  pub id: String,
  pub description: String,
  pub url: String,
  pub thumb: String,
  pub user: PhotoAuthor,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchPage {
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub total_pages: u64,
  #[serde(default)]
  pub results: Vec<DiscoveryPhoto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PhotoOrder {
  Latest,
  Oldest,
  #[default]
  Popular,
}

impl PhotoOrder {
  fn as_str(self) -> &'static str {
    match self {
      PhotoOrder::Latest => "latest",
      PhotoOrder::Oldest => "oldest",
      PhotoOrder::Popular => "popular",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchOrder {
  #[default]
  Relevant,
  Latest,
}

impl SearchOrder {
  fn as_str(self) -> &'static str {
    match self {
      SearchOrder::Relevant => "relevant",
      SearchOrder::Latest => "latest",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Orientation {
  Landscape,
  Portrait,
  Squarish,
}

impl Orientation {
  fn as_str(self) -> &'static str {
    match self {
      Orientation::Landscape => "landscape",
      Orientation::Portrait => "portrait",
      Orientation::Squarish => "squarish",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhotoColor {
  BlackAndWhite,
  Black,
  White,
  Yellow,
  Orange,
  Red,
  Purple,
  Magenta,
  Green,
  Teal,
  Blue,
}

impl PhotoColor {
  fn as_str(self) -> &'static str {
    match self {
      PhotoColor::BlackAndWhite => "black_and_white",
      PhotoColor::Black => "black",
      PhotoColor::White => "white",
      PhotoColor::Yellow => "yellow",
      PhotoColor::Orange => "orange",
      PhotoColor::Red => "red",
      PhotoColor::Purple => "purple",
      PhotoColor::Magenta => "magenta",
      PhotoColor::Green => "green",
      PhotoColor::Teal => "teal",
      PhotoColor::Blue => "blue",
    }
  }
}

/// Paging shared by both discovery endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
  pub page: u32,
  pub per_page: u32,
}

impl Default for Paging {
  fn default() -> Self {
    Self {
      page: 1,
      per_page: 10,
    }
  }
}

impl Paging {
  fn validate(&self) -> Result<(), FeedError> {
    if self.page == 0 {
      return Err(FeedError::Validation("Page numbers start at 1.".to_string()));
    }
    if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
      return Err(FeedError::Validation(format!(
        "Photos per page must be between 1 and {}.",
        MAX_PER_PAGE
      )));
    }
    Ok(())
  }

  fn query(&self) -> Vec<(&'static str, String)> {
    vec![
      ("page", self.page.to_string()),
      ("per_page", self.per_page.to_string()),
    ]
  }
}

/// A photo search request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhotoSearch {
  pub query: String,
  pub paging: Paging,
  pub order: SearchOrder,
  pub orientation: Option<Orientation>,
  pub color: Option<PhotoColor>,
}

impl PhotoSearch {
  pub fn new(query: &str) -> Self {
    Self {
      query: query.trim().to_string(),
      ..Self::default()
    }
  }

  fn query(&self) -> Result<Vec<(&'static str, String)>, FeedError> {
    if self.query.is_empty() {
      return Err(FeedError::Validation("Enter something to search for.".to_string()));
    }
    self.paging.validate()?;

    let mut query = vec![("query", self.query.clone())];
    query.extend(self.paging.query());
    query.push(("order_by", self.order.as_str().to_string()));
    if let Some(orientation) = self.orientation {
      query.push(("orientation", orientation.as_str().to_string()));
    }
    if let Some(color) = self.color {
      query.push(("color", color.as_str().to_string()));
    }
    Ok(query)
  }
}

/// Make a search music-themed unless it already is.
pub fn with_music_keyword(query: &str) -> String {
  let trimmed = query.trim();
  if trimmed.is_empty() {
    return "music".to_string();
  }

  let lower = trimmed.to_lowercase();
  if MUSIC_TERMS.iter().any(|term| lower.contains(term)) {
    trimmed.to_string()
  } else {
    format!("{} music", trimmed)
  }
}

impl PostClient {
  /// Photos picked for browsing, in the requested order.
  pub async fn discover_photos(
    &self,
    paging: Paging,
    order: PhotoOrder,
  ) -> Result<Vec<DiscoveryPhoto>, FeedError> {
    paging.validate()?;
    let mut query = paging.query();
    query.push(("order_by", order.as_str().to_string()));

    debug!(page = paging.page, order = order.as_str(), "fetching discovery photos");
    let response = self
      .send(self.http().get(self.url("/discovery/photos")).query(&query))
      .await?;
    Ok(response.json().await?)
  }

  /// Photos matching a search.
  pub async fn search_photos(&self, search: &PhotoSearch) -> Result<SearchPage, FeedError> {
    let query = search.query()?;

    debug!(query = %search.query, page = search.paging.page, "searching photos");
    let response = self
      .send(self.http().get(self.url("/discovery/search")).query(&query))
      .await?;
    Ok(response.json().await?)
  }
}
