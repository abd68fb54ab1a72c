//! Config Command
//!
//! Inspect and initialize pcfpipe configuration.
//!
//! Usage:
//!   pcfpipe config show [-f toml|json]
//!   pcfpipe config path
//!   pcfpipe config init [--force]

use std::path::Path;

use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::types::{PcfError, Result};

/// Show the merged effective configuration
pub fn show(config_path: Option<&Path>, format: &str) -> Result<()> {
    let as_json = match format {
        "json" => true,
        "toml" => false,
        other => {
            return Err(PcfError::Config(format!(
                "Unknown format: {}. Supported: toml, json",
                other
            )));
        }
    };
    let config = ConfigLoader::load(config_path)?;
    println!("{}", ConfigLoader::render(&config, as_json)?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write a default project configuration
pub fn init(force: bool) -> Result<()> {
    let path = ConfigLoader::project_config_path();
    let output = Output::new();
    if ConfigLoader::init_project(&path, force)? {
        output.success(&format!("Created {}", path.display()));
        output.info("Set PCFPIPE_LLM__API_KEY or GEMINI_API_KEY before running");
    } else {
        output.warning(&format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    Ok(())
}
