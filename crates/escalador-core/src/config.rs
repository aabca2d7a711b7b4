// Configuration loading and parsing (config/escalador.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    Missing { path: PathBuf },

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid `{field}`: {message}")]
    Invalid { field: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub scoring: ScoringConfig,
    pub api: ApiConfig,
    pub pipeline: PipelineConfig,
}

// ---------------------------------------------------------------------------
// escalador.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire escalador.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EscaladorFile {
    database: DatabaseSection,
    scoring: ScoringConfig,
    api: ApiConfig,
    #[serde(default)]
    pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// How many ranked candidates are persisted per position.
    pub top_n: usize,
    pub min_jogos_pref: i64,
    /// From this round on, `min_jogos_pref` applies; before it, 1 game.
    pub rodada_min_jogos: u32,
    /// Use the provável table as the liveness source instead of status 7.
    pub usar_provaveis_cartola: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            top_n: 20,
            min_jogos_pref: 3,
            rodada_min_jogos: 8,
            usar_provaveis_cartola: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_url: String,
    pub timeout_secs: u64,
    pub success_message: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://api.cartola.globo.com".to_string(),
            auth_url: "https://web-api.globoid.globo.com".to_string(),
            timeout_secs: 30,
            success_message: "Time Escalado! Boa Sorte!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// Fixed round; when absent the round comes from the market status.
    #[serde(default)]
    pub round: Option<u32>,
    /// Compute and log lineups without posting them.
    #[serde(default)]
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Overrides `database.path`.
pub const ENV_DB_PATH: &str = "ESCALADOR_DB_PATH";
/// Overrides `pipeline.round`.
pub const ENV_ROUND: &str = "ESCALADOR_ROUND";
/// Overrides `pipeline.dry_run` ("1"/"true"/"yes" or "0"/"false"/"no").
pub const ENV_DRY_RUN: &str = "ESCALADOR_DRY_RUN";

fn config_path(base_dir: &Path) -> PathBuf {
    base_dir.join("config").join("escalador.toml")
}

/// Load `config/escalador.toml` under `base_dir`, apply the `ESCALADOR_*`
/// overrides read through `env`, fill in the database path and validate.
pub fn load_config_from(base_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let path = config_path(base_dir);
    let text = std::fs::read_to_string(&path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => ConfigError::Missing { path: path.clone() },
        _ => ConfigError::Io {
            path: path.clone(),
            source,
        },
    })?;
    let file: EscaladorFile = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    let mut config = Config {
        db_path: file.database.path,
        scoring: file.scoring,
        api: file.api,
        pipeline: file.pipeline,
    };
    apply_env(&mut config, env)?;
    if config.db_path.trim().is_empty() {
        config.db_path = default_db_path()?;
    }

    validate(&config)?;
    Ok(config)
}

/// Install `defaults/escalador.toml` as `config/escalador.toml` when no
/// config exists yet. Returns whether the file was installed.
pub fn install_default_config(base_dir: &Path) -> Result<bool, ConfigError> {
    let target = config_path(base_dir);
    if target.is_file() {
        return Ok(false);
    }
    let source = base_dir.join("defaults").join("escalador.toml");
    if !source.is_file() {
        return Err(ConfigError::Missing { path: target });
    }
    let config_dir = base_dir.join("config");
    std::fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
        path: config_dir.clone(),
        source,
    })?;
    std::fs::copy(&source, &target).map_err(|source| ConfigError::Io {
        path: target.clone(),
        source,
    })?;
    Ok(true)
}

/// Config for the process: current directory, defaults installed on first
/// run, overrides from the real environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: PathBuf::from("."),
        source,
    })?;
    install_default_config(&cwd)?;
    load_config_from(&cwd, |key| std::env::var(key).ok())
}

fn apply_env(config: &mut Config, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
    if let Some(path) = env(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
        config.db_path = path;
    }
    if let Some(raw) = env(ENV_ROUND) {
        let round = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(ENV_ROUND, format!("not a round number: {raw:?}")))?;
        config.pipeline.round = Some(round);
    }
    if let Some(raw) = env(ENV_DRY_RUN) {
        config.pipeline.dry_run = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => return Err(invalid(ENV_DRY_RUN, format!("expected a boolean, got {raw:?}"))),
        };
    }
    Ok(())
}

/// Database location under the platform data directory, used when neither
/// the file nor the environment names one.
fn default_db_path() -> Result<String, ConfigError> {
    let dirs = directories::ProjectDirs::from("br", "escalador", "escalador")
        .ok_or_else(|| invalid("database.path", "empty and no home directory to derive a default from"))?;
    let data_dir = dirs.data_local_dir();
    std::fs::create_dir_all(data_dir).map_err(|source| ConfigError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    Ok(data_dir.join("escalador.db").display().to_string())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.scoring.top_n == 0 {
        return Err(invalid("scoring.top_n", "must be greater than 0"));
    }
    if config.scoring.min_jogos_pref < 1 {
        return Err(invalid(
            "scoring.min_jogos_pref",
            format!("must be >= 1, got {}", config.scoring.min_jogos_pref),
        ));
    }
    if config.api.timeout_secs == 0 {
        return Err(invalid("api.timeout_secs", "must be greater than 0"));
    }
    if config.api.success_message.trim().is_empty() {
        return Err(invalid("api.success_message", "must not be empty"));
    }
    for (name, url) in [("api.base_url", &config.api.base_url), ("api.auth_url", &config.api.auth_url)] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(name, format!("must be an http(s) URL, got {url:?}")));
        }
    }
    if config.pipeline.round == Some(0) {
        return Err(invalid("pipeline.round", "rounds start at 1"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
