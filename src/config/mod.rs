//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults (per profile)
//! 2. Global config (~/.config/ai-relay/config.toml)
//! 3. Project config (.ai-relay/config.toml)
//! 4. Environment variables (AI_RELAY_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
