//! Command line surface

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::posts::discovery::{Orientation, Paging, PhotoColor, PhotoOrder, PhotoSearch, SearchOrder};
use crate::posts::{PostDraft, PostId};

#[derive(Parser, Debug)]
#[command(name = "pinfeed")]
#[command(about = "A cache-first client for a shared image feed")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pinfeed/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// Base URL of the post service, overriding the config file
  #[arg(long, global = true)]
  pub api_url: Option<String>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Show the feed, cached copy first
  Feed {
    /// Don't wait for newer posts after showing the cached feed
    #[arg(long)]
    no_wait: bool,
  },
  /// Keep the feed on screen, picking up new posts until interrupted
  Follow,
  /// Drop the cached feed and fetch it again
  Refresh,
  /// Show a single post
  Show { id: PostId },
  /// Publish a new post
  Create(PostFields),
  /// Edit one of your posts
  Edit {
    id: PostId,
    #[command(flatten)]
    fields: PostFields,
  },
  /// Delete one of your posts
  Delete { id: PostId },
  /// Remember who you are for later commands
  Login {
    username: String,
    #[arg(long)]
    email: Option<String>,
  },
  /// Browse photos for inspiration
  Explore {
    #[arg(long, value_enum, default_value_t = PhotoOrder::Popular)]
    order: PhotoOrder,
    #[command(flatten)]
    paging: PagingArgs,
  },
  /// Search photos for inspiration
  Search(SearchArgs),
  /// Forget the current user
  Logout,
  /// Print the current user
  Whoami,
}

impl Command {
  /// Whether the command only touches the local session file.
  pub fn is_session_command(&self) -> bool {
    matches!(
      self,
      Command::Login { .. } | Command::Logout | Command::Whoami
    )
  }
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct PostFields {
  #[arg(long)]
  pub title: String,
  #[arg(long)]
  pub image_url: String,
  #[arg(long)]
  pub description: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingArgs {
  #[arg(long, default_value_t = 1)]
  pub page: u32,
  /// Photos per page (at most 30)
  #[arg(long, default_value_t = 12)]
  pub per_page: u32,
}

impl PagingArgs {
  pub fn to_paging(self) -> Paging {
    Paging {
      page: self.page,
      per_page: self.per_page,
    }
  }
}

#[derive(ClapArgs, Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
  pub query: String,
  #[arg(long, value_enum, default_value_t = SearchOrder::Relevant)]
  pub order: SearchOrder,
  #[arg(long, value_enum)]
  pub orientation: Option<Orientation>,
  #[arg(long, value_enum)]
  pub color: Option<PhotoColor>,
  /// Keep results music-themed
  #[arg(long)]
  pub music: bool,
  #[command(flatten)]
  pub paging: PagingArgs,
}

impl SearchArgs {
  pub fn to_search(&self) -> PhotoSearch {
    let query = if self.music {
      crate::posts::discovery::with_music_keyword(&self.query)
    } else {
      self.query.clone()
    };
    PhotoSearch {
      paging: self.paging.to_paging(),
      order: self.order,
      orientation: self.orientation,
      color: self.color,
      ..PhotoSearch::new(&query)
    }
  }
}

impl PostFields {
  pub fn to_draft(&self) -> PostDraft {
    PostDraft::new(&self.title, self.description.as_deref(), &self.image_url)
  }
}
