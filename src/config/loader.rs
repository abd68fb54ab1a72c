//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (`<config dir>/pcfpipe/config.toml`)
//! 3. Project config (`./pcfpipe.toml`, or the file given with `--config`)
//! 4. Environment variables (`PCFPIPE_*` prefix, `__` separates sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{PcfError, Result};

/// Project-level config file name
pub const PROJECT_CONFIG_FILE: &str = "pcfpipe.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PCFPIPE_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project (or explicit file) → env vars
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(PcfError::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                debug!("Loading config from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let project_path = Self::project_config_path();
                if project_path.exists() {
                    debug!("Loading project config from: {}", project_path.display());
                    figment = figment.merge(Toml::file(&project_path));
                }
            }
        }

        // e.g. PCFPIPE_LLM__MAIN_MODEL -> llm.main_model
        figment = Self::merge_env(figment);

        let config: Config = figment
            .extract()
            .map_err(|e| PcfError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only (defaults underneath)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| PcfError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn merge_env(figment: Figment) -> Figment {
        figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true))
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (platform specific)
    pub fn global_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pcfpipe").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Project config file in the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(PROJECT_CONFIG_FILE)
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
        println!("  Env:     {}<SECTION>__<KEY>", ENV_PREFIX);
    }

    /// Render the effective configuration
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| PcfError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default project config to `path`
    pub fn init_project(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            info!("Project config exists: {}", path.display());
            return Ok(false);
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, Self::default_project_config())?;
        info!("Created project config: {}", path.display());
        Ok(true)
    }

    /// Default project config content (TOML)
    fn default_project_config() -> String {
        r#"# pcfpipe configuration
# Environment variables override these values, e.g. PCFPIPE_LLM__MAIN_MODEL.
# The API key is best supplied via PCFPIPE_LLM__API_KEY or GEMINI_API_KEY.

version = "1.0"

[llm]
provider = "gemini"
guidance_model = "gemini-3-pro-preview"
main_model = "gemini-3-pro-preview"
temperature = 1.0
max_output_tokens = 65535
thinking_level = "high"
web_search = true
url_context = true
timeout_secs = 600

[retry]
max_attempts = 3
delay_ms = 2000

[pipeline]
max_audit_loops = 2

[batch]
workers = 10
batch_size = 10

[columns]
subject_name = "subject_name"
subject_description = "subject_description"
extracted_value = "extracted_value"
transcript = "transcript"
"#
        .to_string()
    }
}
