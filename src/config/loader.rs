//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults for the selected profile (Serialized)
//! 2. Global config (~/.config/ai-relay/config.toml)
//! 3. Project config (.ai-relay/config.toml)
//! 4. Environment variables (AI_RELAY_* prefix, `__` separates sections)
//!
//! The profile itself is resolved from the upper layers first
//! (`AI_RELAY_PROFILE` or a `profile` key in a file), then its defaults
//! are placed underneath.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::{Config, Profile};
use crate::types::{RelayError, Result};

const ENV_PREFIX: &str = "AI_RELAY_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_layers(
            Self::global_config_path().as_deref(),
            &Self::project_config_path(),
        )
    }

    /// Load configuration from a specific file (plus environment overrides)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(RelayError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load_layers(None, path)
    }

    fn load_layers(global: Option<&Path>, project: &Path) -> Result<Config> {
        let mut layers = Figment::new();

        // Merge global config
        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            layers = layers.merge(Toml::file(global_path));
        }

        // Merge project config
        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            layers = layers.merge(Toml::file(project));
        }

        // Merge environment variables (e.g., AI_RELAY_RETRY__MAX_ATTEMPTS -> retry.max_attempts)
        layers = layers.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let profile = match layers.find_value("profile") {
            Ok(_) => layers
                .extract_inner::<Profile>("profile")
                .map_err(|e| RelayError::Config(format!("Invalid profile: {}", e)))?,
            Err(_) => Profile::default(),
        };
        debug!(%profile, "Resolved configuration profile");

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::for_profile(profile)))
            .merge(layers)
            .extract()
            .map_err(|e| RelayError::Config(format!("Configuration error: {}", e)))?;

        // Validate configuration after loading
        config.validate()?;

        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/ai-relay/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("ai-relay"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".ai-relay")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration as JSON or TOML
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| RelayError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a starter project config under `root`
    pub fn init_project(root: &Path, force: bool) -> Result<PathBuf> {
        let project_dir = root.join(Self::project_dir());
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Generate default project config content (TOML)
    fn default_project_config() -> String {
        r#"# ai-relay Project Configuration
# Settings here override ~/.config/ai-relay/config.toml.
# Credentials belong in GEMINI_API_KEY / GROQ_API_KEY, not in this file.

version = "1.0"

# development | production | test
profile = "production"

[server]
bind = "127.0.0.1:3000"
# Set only when a reverse proxy overwrites X-Forwarded-For
trust_forwarded_for = false

[providers]
priority = ["gemini", "groq"]

[rate_limit]
requests_per_minute = 30
burst = 10
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.toml",
            r#"
[server]
bind = "0.0.0.0:8080"

[providers.groq]
model = "llama-3.1-8b-instant"
"#,
        );

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.providers.groq.model, "llama-3.1-8b-instant");
        // Untouched values keep their defaults
        assert_eq!(config.providers.priority, vec!["gemini", "groq"]);
    }

    #[test]
    fn test_profile_key_selects_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "profile = \"test\"\n");

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.profile, Profile::Test);
        assert_eq!(config.retry.max_attempts, 2);
        assert!(!config.circuit_breaker.enabled);
    }

    #[test]
    fn test_project_layer_overrides_global() {
        let dir = TempDir::new().unwrap();
        let global = write(&dir, "global.toml", "[retry]\nmax_attempts = 6\nbase_delay_ms = 50\n");
        let project = write(&dir, "project.toml", "[retry]\nmax_attempts = 2\n");

        let config = ConfigLoader::load_layers(Some(&global), &project).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 50);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "[circuit_breaker]\nfailure_threshold = 0\n");
        let err = ConfigLoader::load_from_file(&path).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::load_from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_init_project_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let path = ConfigLoader::init_project(dir.path(), false).unwrap();
        assert!(path.ends_with(".ai-relay/config.toml"));

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.profile, Profile::Production);

        // Existing file is left alone without force
        fs::write(&path, "version = \"2.0\"\n").unwrap();
        ConfigLoader::init_project(dir.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"2.0\"\n");
    }

    #[test]
    fn test_render_never_contains_api_key() {
        let mut config = Config::default();
        config.providers.gemini.api_key = Some("AIza-secret".into());
        for as_json in [true, false] {
            let rendered = ConfigLoader::render(&config, as_json).unwrap();
            assert!(!rendered.contains("AIza-secret"));
            assert!(rendered.contains("gemini"));
        }
    }

    #[test]
    fn test_env_override() {
        let dir = TempDir::new().unwrap();
        // SAFETY: This test is the only one touching AI_RELAY_* variables
        unsafe {
            std::env::set_var("AI_RELAY_RATE_LIMIT__BURST", "3");
        }
        let config = ConfigLoader::load_layers(None, &dir.path().join("absent.toml"));
        unsafe {
            std::env::remove_var("AI_RELAY_RATE_LIMIT__BURST");
        }
        assert_eq!(config.unwrap().rate_limit.burst, 3);
    }
}
