//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`GAZ_ROOT_FOLDER`, then `GAZ_ROOT`)
//! 3. TOML config file (`~/.config/gaz/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unparsable TOML file never aborts startup; it is logged and
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "gaz.db";

/// Compiled-in defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Document index connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL of the search cluster. `None` selects the in-process index.
    #[serde(default)]
    pub url: Option<String>,
    /// Name of the canonical index
    #[serde(default = "default_index_name")]
    pub name: String,
    /// Per-request timeout; store calls fail fast once it elapses
    #[serde(default = "default_index_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: default_index_name(),
            timeout_ms: default_index_timeout_ms(),
        }
    }
}

fn default_index_name() -> String {
    "gazetteer".to_string()
}

fn default_index_timeout_ms() -> u64 {
    10_000
}

/// Review engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSettings {
    /// Number of document ids per bulk delete request
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
    /// Authority whose accepted matches are consolidated into the index
    #[serde(default = "default_canonical_authority")]
    pub canonical_authority: String,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            bulk_chunk_size: default_bulk_chunk_size(),
            canonical_authority: default_canonical_authority(),
        }
    }
}

fn default_bulk_chunk_size() -> usize {
    300
}

fn default_canonical_authority() -> String {
    "whg".to_string()
}

/// Module TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub review: ReviewSettings,
}

/// Resolves the root folder for a module following the documented priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
        }
    }

    /// Supply the command-line override (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Resolve root folder; never fails, falls back to compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        for var in ["GAZ_ROOT_FOLDER", "GAZ_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    debug!(var, path = %path, "Root folder from environment");
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(config_path) = self.config_file_path() {
            if config_path.exists() {
                match load_toml_config(&config_path) {
                    Ok(config) => {
                        if let Some(root) = config.root_folder {
                            debug!(path = %root.display(), "Root folder from TOML config");
                            return root;
                        }
                    }
                    Err(e) => {
                        warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config file");
                    }
                }
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }

    /// Path of this module's TOML file, if a config directory exists on this platform
    pub fn config_file_path(&self) -> Option<PathBuf> {
        module_config_path(&self.module_name)
    }
}

/// Creates the root folder and locates the database inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder (and parents) if missing; idempotent
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

/// `~/.config/gaz/<module>.toml` on every platform that has a config dir
pub fn module_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gaz").join(format!("{}.toml", module_name)))
}

/// Load a module's TOML file, or compiled defaults when it does not exist
pub fn load_module_config(module_name: &str) -> TomlConfig {
    let Some(path) = module_config_path(module_name) else {
        return TomlConfig::default();
    };
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return TomlConfig::default();
    }
    match load_toml_config(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file unreadable, using defaults");
            TomlConfig::default()
        }
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/gaz (or /var/lib/gaz for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("gaz"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/gaz"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("gaz"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/gaz"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("gaz"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\gaz"))
    } else {
        PathBuf::from("./gaz_data")
    }
}
