//! Configuration management for ticketscope
//!
//! A single strongly-typed [`Config`] is loaded once at startup from TOML, patched with
//! `TICKETSCOPE_SECTION__KEY` environment overrides and validated before use.

use crate::error::{Result, TicketscopeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

const ENV_PREFIX: &str = "TICKETSCOPE_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub codebase: CodebaseConfig,
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub log_search: LogSearchConfig,
    #[serde(default)]
    pub url_resolution: UrlResolutionConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.ticketscope"),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
        }
    }
}

/// Chunk size limits, all measured in characters or lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Hard upper bound on chunk text (embedding model input limit)
    pub max_chunk_chars: usize,
    /// Code segments shorter than this (trimmed) are dropped as noise
    pub min_chunk_chars: usize,
    /// Config sections shorter than this (trimmed) are dropped as noise
    pub min_config_chars: usize,
    /// Config sections longer than this are re-split by line count
    pub config_section_max_chars: usize,
    pub config_split_lines: usize,
    pub config_overlap_lines: usize,
    pub window_lines: usize,
    pub window_overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2400,
            min_chunk_chars: 50,
            min_config_chars: 30,
            config_section_max_chars: 4000,
            config_split_lines: 60,
            config_overlap_lines: 5,
            window_lines: 50,
            window_overlap_lines: 5,
        }
    }
}

/// Embedding index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum entries written per upsert transaction
    pub upsert_batch_size: usize,
    pub default_top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            upsert_batch_size: 1000,
            default_top_k: 5,
        }
    }
}

/// Source code tree to index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebaseConfig {
    pub root: PathBuf,
    pub collection: String,
    pub include_patterns: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

impl Default for CodebaseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            collection: "code".to_string(),
            include_patterns: ["*.rb", "*.py", "*.js", "*.yml", "*.yaml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_dirs: [
                ".git",
                "node_modules",
                "tmp",
                "log",
                "coverage",
                "__pycache__",
                "vendor",
                "spec",
                "test",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Wiki page export to index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiConfig {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file: Option<PathBuf>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            collection: "wiki".to_string(),
            export_file: None,
        }
    }
}

/// Log-search backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSearchConfig {
    /// Pod name to base URL of that pod's log-search frontend
    pub pod_urls: BTreeMap<String, String>,
    pub default_pod: String,
    pub default_index_pattern: String,
    /// Session cookies sent with log-search and authenticated URL resolution
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    pub timeout_secs: u64,
    pub max_results: usize,
}

impl Default for LogSearchConfig {
    fn default() -> Self {
        let pod_urls = [
            ("us", "https://logs.haystack.es"),
            ("in", "https://logs-in.haystack.es"),
            ("eu", "https://logs-euc.haystack.es"),
            ("au", "https://logs-au.haystack.es"),
        ]
        .iter()
        .map(|(pod, url)| (pod.to_string(), url.to_string()))
        .collect();

        Self {
            pod_urls,
            default_pod: "us".to_string(),
            default_index_pattern: "freshservice*".to_string(),
            cookies: BTreeMap::new(),
            timeout_secs: 30,
            max_results: 2000,
        }
    }
}

impl LogSearchConfig {
    /// Find the pod whose base URL has the given host
    pub fn pod_for_host(&self, host: &str) -> Option<&str> {
        self.pod_urls.iter().find_map(|(pod, base)| {
            let base_host = base
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/');
            base_host.eq_ignore_ascii_case(host).then_some(pod.as_str())
        })
    }

    /// Hosts of every configured pod
    pub fn hosts(&self) -> Vec<String> {
        self.pod_urls
            .values()
            .filter_map(|base| url::Url::parse(base).ok())
            .filter_map(|u| u.host_str().map(|h| h.to_string()))
            .collect()
    }
}

/// Short-link resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlResolutionConfig {
    pub short_path: String,
    pub destination_path: String,
    /// Substrings of a final URL that mean we landed on a login page
    pub login_markers: Vec<String>,
    pub timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for UrlResolutionConfig {
    fn default() -> Self {
        Self {
            short_path: "/goto/".to_string(),
            destination_path: "/app/discover".to_string(),
            login_markers: vec!["accounts.google.com".to_string(), "login".to_string()],
            timeout_secs: 10,
            max_redirects: 10,
        }
    }
}

/// Triage rule parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    pub capture_buffer_minutes: i64,
    pub lookback_days: i64,
    pub max_capture_entries: usize,
    pub body_scan_chars: usize,
    pub errors_only: bool,
    pub max_error_text_chars: usize,
    pub auth_keywords: Vec<String>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            capture_buffer_minutes: 30,
            lookback_days: 7,
            max_capture_entries: 10,
            body_scan_chars: 1000,
            errors_only: true,
            max_error_text_chars: 200,
            auth_keywords: [
                "login",
                "logout",
                "authentication",
                "authorization",
                "sso",
                "saml",
                "oauth",
                "session",
                "token",
                "401",
                "403",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebase_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<i64>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TicketscopeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TicketscopeError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TicketscopeError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| TicketscopeError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(root) = overrides.codebase_root {
            self.codebase.root = root;
        }
        if let Some(pod) = overrides.default_pod {
            self.log_search.default_pod = pod;
        }
        if let Some(days) = overrides.lookback_days {
            self.triage.lookback_days = days;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TICKETSCOPE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__BATCH_SIZE" => {
                self.embedding.batch_size = parse_number(path, value)?;
            }
            "CODEBASE__ROOT" => {
                self.codebase.root = PathBuf::from(value);
            }
            "LOG_SEARCH__DEFAULT_POD" => {
                self.log_search.default_pod = value.to_string();
            }
            "LOG_SEARCH__TIMEOUT_SECS" => {
                self.log_search.timeout_secs = parse_number(path, value)?;
            }
            "TRIAGE__LOOKBACK_DAYS" => {
                self.triage.lookback_days = parse_number(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TicketscopeError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("ticketscope").join("config.toml"))
    }

    /// Directory holding one SQLite file per collection
    pub fn vectors_dir(&self) -> Result<PathBuf> {
        Ok(expand_home(&self.storage.data_dir)?.join("vectors"))
    }

    /// Path of a collection's index file
    pub fn collection_path(&self, collection: &str) -> Result<PathBuf> {
        Ok(self.vectors_dir()?.join(format!("{}.sqlite", collection)))
    }
}

fn parse_number<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| TicketscopeError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}' as a number", value),
        })
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| TicketscopeError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            TicketscopeError::Config("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            codebase: CodebaseConfig::default(),
            wiki: WikiConfig::default(),
            log_search: LogSearchConfig::default(),
            url_resolution: UrlResolutionConfig::default(),
            triage: TriageConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.embedding.model, config.embedding.model);
        assert_eq!(loaded.log_search.pod_urls.len(), 4);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[triage]\ncapture_buffer_minutes = 15\n\
             lookback_days = 3\nmax_capture_entries = 10\nbody_scan_chars = 1000\n\
             errors_only = true\nmax_error_text_chars = 200\nauth_keywords = [\"sso\"]\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.triage.lookback_days, 3);
        assert_eq!(config.chunking.window_lines, 50);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/ticketscope.toml"));
        assert!(matches!(result, Err(TicketscopeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "eu".to_string(),
            ProfileOverrides {
                default_pod: Some("eu".to_string()),
                ..Default::default()
            },
        );

        config.apply_profile("eu").unwrap();
        assert_eq!(config.log_search.default_pod, "eu");
        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_pod_for_host() {
        let config = LogSearchConfig::default();
        assert_eq!(config.pod_for_host("logs-euc.haystack.es"), Some("eu"));
        assert_eq!(config.pod_for_host("example.com"), None);
        assert_eq!(config.hosts().len(), 4);
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths() {
        let path = Path::new("/var/lib/ticketscope");
        assert_eq!(expand_home(path).unwrap(), path.to_path_buf());
    }
}
