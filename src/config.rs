use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub session: SessionConfig,
  #[serde(default)]
  pub follow: FollowConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the post service (e.g., "http://127.0.0.1:8000")
  #[serde(default)]
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is persisted and every load fetches the full feed
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// SQLite file (defaults to $XDG_DATA_HOME/pinfeed/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
  /// Session file (defaults to $XDG_DATA_HOME/pinfeed/session.json)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowConfig {
  /// Seconds between feed reloads in follow mode
  #[serde(default = "default_reload_secs")]
  pub reload_secs: u64,
}

impl Default for FollowConfig {
  fn default() -> Self {
    Self {
      reload_secs: default_reload_secs(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_reload_secs() -> u64 {
  60
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pinfeed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pinfeed/config.yaml
  ///
  /// A missing file yields the defaults. `api_url` overrides the file; whether
  /// any URL is configured at all is checked by `api_url()`.
  pub fn load(explicit_path: Option<&Path>, api_url: Option<&str>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    Ok(match api_url {
      Some(url) => Config {
        api: ApiConfig {
          url: url.to_string(),
        },
        ..config
      },
      None => config,
    })
  }

  /// Default configuration pointing at `url`.
  pub fn with_api_url(url: &str) -> Self {
    Self {
      api: ApiConfig {
        url: url.to_string(),
      },
      ..Self::default()
    }
  }

  /// Base URL of the post service, required by every command that talks to it.
  pub fn api_url(&self) -> Result<&str> {
    let url = self.api.url.trim();
    if url.is_empty() {
      return Err(eyre!(
        "No post service configured. Set api.url in ~/.config/pinfeed/config.yaml\n\
               or pass --api-url."
      ));
    }
    Ok(url)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pinfeed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pinfeed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Directory for the cache database, session file and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pinfeed"))
  }

  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache.path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("cache.db")),
    }
  }

  pub fn session_path(&self) -> Result<PathBuf> {
    match &self.session.path {
      Some(p) => Ok(p.clone()),
      None => Ok(Self::data_dir()?.join("session.json")),
    }
  }
}
