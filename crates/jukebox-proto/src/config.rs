use serde::{Deserialize, Serialize};

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub art: ArtConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
}

/// The storage bucket the catalog is built from: a listing endpoint
/// returning `{ "items": [{ "name": "<album>/<song>" }] }` and a media
/// base URL the per-song URLs are derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    #[serde(default = "default_media_base_url")]
    pub media_base_url: String,
    /// Hard cap on listing entries; anything beyond is dropped with a
    /// warning.  The endpoint is expected to return a complete list,
    /// there is no pagination.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtConfig {
    /// Shown whenever a track has no embedded picture or resolution fails.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            media_base_url: default_media_base_url(),
            max_entries: default_max_entries(),
        }
    }
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            port: default_port(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
        }
    }
}

fn default_listing_url() -> String {
    "https://storage.googleapis.com/storage/v1/b/michoel-streicher-songs/o".to_string()
}

fn default_media_base_url() -> String {
    "https://storage.googleapis.com/michoel-streicher-songs".to_string()
}

fn default_max_entries() -> usize {
    5000
}

fn default_placeholder() -> String {
    "https://via.placeholder.com/150".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> std::path::PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.library.listing_url.starts_with("https://"));
        assert!(!config.library.media_base_url.ends_with('/'));
        assert_eq!(config.library.max_entries, 5000);
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.daemon.bind_address, "127.0.0.1");
        assert_eq!(config.art.placeholder, "https://via.placeholder.com/150");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [library]
            listing_url = "https://example.com/list"
            "#,
        )
        .unwrap();
        assert_eq!(config.library.listing_url, "https://example.com/list");
        assert_eq!(config.library.max_entries, 5000);
        assert_eq!(config.mpv.default_volume, 0.5);
    }
}
