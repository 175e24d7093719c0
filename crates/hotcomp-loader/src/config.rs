//! Reload configuration
//!
//! Supports YAML, TOML, JSON, INI, RON and JSON5 files (format detected from
//! the extension), `${VAR}` / `$VAR` substitution in file contents, and
//! environment overrides such as `HOTCOMP__TYPE_NAME`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use config::{Config as Cfg, Environment, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::DEFAULT_BINARY_EXTENSION;
use crate::runtime::RuntimeConfig;
use crate::watcher::WatcherOptions;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "HOTCOMP";

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced variable pattern is valid")
});

static SIMPLE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("variable pattern is valid")
});

fn default_binary_extension() -> String {
    DEFAULT_BINARY_EXTENSION.to_string()
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

/// Configuration of a reload service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Binary rewritten by the build
    pub watch_path: PathBuf,
    /// Directory holding transient binaries, defaults to the parent of `watch_path`
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Qualified name of the component type
    pub type_name: String,
    /// Extension of binaries removed by cleanup
    #[serde(default = "default_binary_extension")]
    pub binary_extension: String,
    /// Minimum interval between accepted change notifications
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Skip reloads whose image digest matches the loaded one
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
    /// Remove stale binaries from the working directory on start
    #[serde(default)]
    pub clean_on_start: bool,
    /// Engine configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl ReloadConfig {
    pub fn new(watch_path: impl Into<PathBuf>, type_name: &str) -> Self {
        Self {
            watch_path: watch_path.into(),
            working_dir: None,
            type_name: type_name.to_string(),
            binary_extension: default_binary_extension(),
            debounce_ms: default_debounce_ms(),
            skip_unchanged: true,
            clean_on_start: false,
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_skip_unchanged(mut self, enabled: bool) -> Self {
        self.skip_unchanged = enabled;
        self
    }

    pub fn with_clean_on_start(mut self, enabled: bool) -> Self {
        self.clean_on_start = enabled;
        self
    }

    pub fn with_binary_extension(mut self, ext: &str) -> Self {
        self.binary_extension = ext.to_string();
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Working directory, falling back to the watched binary's directory
    pub fn working_dir(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) => dir.clone(),
            None => match self.watch_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions::new(&self.watch_path)
    }

    /// Check required fields
    pub fn validate(&self) -> ConfigResult<()> {
        if self.type_name.trim().is_empty() {
            return Err(ConfigError::Invalid("type_name must not be empty".to_string()));
        }
        if self.watch_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "watch_path {:?} does not name a file",
                self.watch_path
            )));
        }
        if self.binary_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid(
                "binary_extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a file with `HOTCOMP__*` environment overrides
    pub fn load(path: &Path) -> ConfigResult<Self> {
        Self::load_with_env(path, ENV_PREFIX)
    }

    /// Load from a file with environment overrides under `env_prefix`
    pub fn load_with_env(path: &Path, env_prefix: &str) -> ConfigResult<Self> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);

        let config: Self = Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse from a string with explicit format
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let substituted = substitute_env_vars(content);

        let config: Self = Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute `${VAR}` and `$VAR` references; unknown variables are kept verbatim
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    SIMPLE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}
