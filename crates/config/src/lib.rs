//! Configuration loading for the `rag-studio` client.
//!
//! Config files are discovered in the override directory, then the working
//! directory, then `~/.config/rag-studio/`. TOML, YAML and JSON are accepted;
//! `${VAR}` placeholders are expanded before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, clear_config_dir, config_dir, data_dir, discover_and_load,
        find_or_default_config_path, load_config, save_config, set_config_dir, update_config,
    },
    schema::{ApiConfig, ChannelSection, StorageConfig, StudioConfig},
};
