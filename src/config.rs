use crate::aidb::{AnimeDbConfig, Corpus, DetailLevel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub anime_db: AnimeDbSection,

    pub metadata: MetadataConfig,

    pub addons: Vec<AddonConfig>,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub data_dir: String,

    pub log_level: String,

    /// 0 lets the runtime size itself.
    pub worker_threads: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8657,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Anime database settings. Refresh intervals are milliseconds; unset
/// sources use their built-in cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeDbSection {
    pub level_of_detail: String,

    pub mappings_refresh_interval_ms: Option<u64>,

    pub offline_refresh_interval_ms: Option<u64>,

    pub kitsu_imdb_refresh_interval_ms: Option<u64>,

    pub anitrakt_movies_refresh_interval_ms: Option<u64>,

    pub anitrakt_shows_refresh_interval_ms: Option<u64>,

    pub anime_list_refresh_interval_ms: Option<u64>,
}

impl Default for AnimeDbSection {
    fn default() -> Self {
        Self {
            level_of_detail: "full".to_string(),
            mappings_refresh_interval_ms: None,
            offline_refresh_interval_ms: None,
            kitsu_imdb_refresh_interval_ms: None,
            anitrakt_movies_refresh_interval_ms: None,
            anitrakt_shows_refresh_interval_ms: None,
            anime_list_refresh_interval_ms: None,
        }
    }
}

impl AnimeDbSection {
    fn interval_for(&self, corpus: Corpus) -> Option<u64> {
        match corpus {
            Corpus::Mappings => self.mappings_refresh_interval_ms,
            Corpus::Offline => self.offline_refresh_interval_ms,
            Corpus::KitsuImdb => self.kitsu_imdb_refresh_interval_ms,
            Corpus::AnitraktMovies => self.anitrakt_movies_refresh_interval_ms,
            Corpus::AnitraktShows => self.anitrakt_shows_refresh_interval_ms,
            Corpus::AnimeList => self.anime_list_refresh_interval_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub api_key: String,
}

/// One upstream stream-provider addon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonConfig {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("streamarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".streamarr").join("config.toml"));
        }

        paths
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    /// Environment variables override the file for the options operators
    /// most commonly tune per deployment.
    fn apply_env_overrides(&mut self) {
        if let Ok(detail) = std::env::var("ANIME_DB_LEVEL_OF_DETAIL") {
            self.anime_db.level_of_detail = detail;
        }
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            self.metadata.api_key = key;
        }

        let interval_vars = [
            ("ANIME_DB_MAPPINGS_REFRESH_INTERVAL", Corpus::Mappings),
            ("ANIME_DB_OFFLINE_REFRESH_INTERVAL", Corpus::Offline),
            ("ANIME_DB_KITSU_IMDB_REFRESH_INTERVAL", Corpus::KitsuImdb),
            (
                "ANIME_DB_ANITRAKT_MOVIES_REFRESH_INTERVAL",
                Corpus::AnitraktMovies,
            ),
            (
                "ANIME_DB_ANITRAKT_SHOWS_REFRESH_INTERVAL",
                Corpus::AnitraktShows,
            ),
            ("ANIME_DB_ANIME_LIST_REFRESH_INTERVAL", Corpus::AnimeList),
        ];
        for (var, corpus) in interval_vars {
            if let Ok(raw) = std::env::var(var)
                && let Ok(ms) = raw.parse::<u64>()
            {
                let slot = match corpus {
                    Corpus::Mappings => &mut self.anime_db.mappings_refresh_interval_ms,
                    Corpus::Offline => &mut self.anime_db.offline_refresh_interval_ms,
                    Corpus::KitsuImdb => &mut self.anime_db.kitsu_imdb_refresh_interval_ms,
                    Corpus::AnitraktMovies => {
                        &mut self.anime_db.anitrakt_movies_refresh_interval_ms
                    }
                    Corpus::AnitraktShows => &mut self.anime_db.anitrakt_shows_refresh_interval_ms,
                    Corpus::AnimeList => &mut self.anime_db.anime_list_refresh_interval_ms,
                };
                *slot = Some(ms);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.data_dir.trim().is_empty() {
            anyhow::bail!("general.data_dir cannot be empty");
        }
        if self.detail_level().is_none() {
            anyhow::bail!(
                "anime_db.level_of_detail must be one of none/required/full, got '{}'",
                self.anime_db.level_of_detail
            );
        }
        for addon in &self.addons {
            if addon.id.trim().is_empty() || addon.url.trim().is_empty() {
                anyhow::bail!("addons entries need both an id and a url");
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn detail_level(&self) -> Option<DetailLevel> {
        DetailLevel::parse(&self.anime_db.level_of_detail)
    }

    /// The resolved anime-database configuration.
    #[must_use]
    pub fn anime_db_config(&self) -> AnimeDbConfig {
        let detail = self.detail_level().unwrap_or(DetailLevel::Full);
        let mut db_config = AnimeDbConfig::new(detail, &self.general.data_dir);
        for spec in &mut db_config.sources {
            if let Some(ms) = self.anime_db.interval_for(spec.corpus) {
                spec.refresh_interval = Duration::from_millis(ms.max(1));
            }
        }
        db_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8657);
        assert_eq!(config.anime_db.level_of_detail, "full");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [anime_db]
            level_of_detail = "required"
            offline_refresh_interval_ms = 60000

            [[addons]]
            id = "torrentio"
            url = "https://torrentio.example"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.detail_level(), Some(DetailLevel::Required));
        assert_eq!(config.addons.len(), 1);

        assert_eq!(config.server.port, 8657);
    }

    #[test]
    fn interval_overrides_flow_into_source_specs() {
        let mut config = Config::default();
        config.anime_db.offline_refresh_interval_ms = Some(60_000);
        let db_config = config.anime_db_config();
        let offline = db_config
            .sources
            .iter()
            .find(|s| s.corpus == Corpus::Offline)
            .unwrap();
        assert_eq!(offline.refresh_interval, Duration::from_millis(60_000));
    }

    #[test]
    fn invalid_detail_level_fails_validation() {
        let mut config = Config::default();
        config.anime_db.level_of_detail = "verbose".into();
        assert!(config.validate().is_err());
    }
}
