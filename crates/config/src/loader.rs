use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{debug, info, warn};

use crate::{env_subst::substitute_env, schema::StudioConfig};

/// Config file names, checked in order within each directory.
const CONFIG_FILENAMES: &[&str] = &[
    "rag-studio.toml",
    "rag-studio.yaml",
    "rag-studio.yml",
    "rag-studio.json",
];

const APP_DIR: &str = "rag-studio";

pub const ENV_API_URL: &str = "RAG_STUDIO_API_URL";
pub const ENV_API_TOKEN: &str = "RAG_STUDIO_API_TOKEN";

/// Set by `--config`; when present, discovery looks nowhere else.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Serializes read-modify-write cycles on the config file.
static CONFIG_SAVE_LOCK: Mutex<()> = Mutex::new(());

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn set_config_dir(path: PathBuf) {
    *lock(&CONFIG_DIR_OVERRIDE) = Some(path);
}

pub fn clear_config_dir() {
    *lock(&CONFIG_DIR_OVERRIDE) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    lock(&CONFIG_DIR_OVERRIDE).clone()
}

/// Load one config file, picking the parser from its extension.
pub fn load_config(path: &Path) -> anyhow::Result<StudioConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&substitute_env(&raw), path)
}

/// Find and load the config, then apply environment overrides.
///
/// With no config file anywhere, a default `rag-studio.toml` is written to
/// the config directory. A file that fails to parse is reported and
/// defaults are used instead.
pub fn discover_and_load() -> StudioConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                StudioConfig::default()
            })
        },
        None => {
            let config = StudioConfig::default();
            if let Err(e) = write_default_config(&config) {
                warn!(error = %e, "failed to write default config file");
            }
            config
        },
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

/// `RAG_STUDIO_API_URL` and `RAG_STUDIO_API_TOKEN` win over the file.
pub fn apply_env_overrides(config: &mut StudioConfig, lookup: impl Fn(&str) -> Option<String>) {
    let present = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    if let Some(url) = present(ENV_API_URL) {
        debug!(url = %url, "api url overridden from environment");
        config.api.url = url;
    }
    if let Some(token) = present(ENV_API_TOKEN) {
        config.api.token = Some(token);
    }
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return find_in(&dir);
    }
    find_in(Path::new(".")).or_else(|| user_config_dir().and_then(|dir| find_in(&dir)))
}

fn user_config_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".config").join(APP_DIR))
}

/// The override directory, or `~/.config/rag-studio/`.
pub fn config_dir() -> Option<PathBuf> {
    config_dir_override().or_else(user_config_dir)
}

/// `storage.data_dir` when configured, otherwise `~/.rag-studio/`.
pub fn data_dir(config: &StudioConfig) -> PathBuf {
    if let Some(dir) = &config.storage.data_dir {
        return dir.clone();
    }
    home_dir()
        .map(|h| h.join(".rag-studio"))
        .unwrap_or_else(|| PathBuf::from(".rag-studio"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// The existing config file, or where a new TOML one would go.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAMES[0])
    })
}

/// Load, apply `f`, save; under a process-wide lock. Returns the path
/// written.
pub fn update_config(f: impl FnOnce(&mut StudioConfig)) -> anyhow::Result<PathBuf> {
    let _guard = lock(&CONFIG_SAVE_LOCK);
    let path = find_or_default_config_path();
    let mut config = if path.exists() {
        load_config(&path)?
    } else {
        StudioConfig::default()
    };
    f(&mut config);
    write_config(&config, &path)?;
    Ok(path)
}

/// Write `config` to the discovered config file, or to the default TOML
/// path. Prefer [`update_config`] for read-modify-write.
pub fn save_config(config: &StudioConfig) -> anyhow::Result<PathBuf> {
    let _guard = lock(&CONFIG_SAVE_LOCK);
    let path = find_or_default_config_path();
    write_config(config, &path)?;
    Ok(path)
}

fn write_default_config(config: &StudioConfig) -> anyhow::Result<()> {
    let path = find_or_default_config_path();
    if path.exists() {
        return Ok(());
    }
    write_config(config, &path)?;
    info!(path = %path.display(), "wrote default config file");
    Ok(())
}

fn write_config(config: &StudioConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let serialized = match extension(path) {
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        _ => toml::to_string_pretty(config)
            .map_err(|e| anyhow::anyhow!("serialize config: {e}"))?,
    };
    std::fs::write(path, serialized)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<StudioConfig> {
    match extension(path) {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
