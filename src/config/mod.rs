//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (platform config dir)
//! 3. Project config (./pcfpipe.toml or --config)
//! 4. Environment variables (PCFPIPE_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::{ConfigLoader, ENV_PREFIX, PROJECT_CONFIG_FILE};
pub use types::*;
