//! Configuration and on-disk locations.
//!
//! All persistent state lives under one data directory:
//!
//! ```text
//! <data dir>/
//!   config.json           optional overrides (FlConfig)
//!   origins.txt           repository origin URLs, one per line
//!   startup-actions.txt   deferred action log (append-only)
//!   plugins.txt           installed plugin list, maintained by the bootstrap step
//! ```
//!
//! The data directory is `$FL_DATA_DIR` when set, otherwise
//! `<local data dir>/fl` from the `directories` crate.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "FL_DATA_DIR";
pub const KERNEL_DIR_ENV: &str = "FL_KERNEL_DIR";

pub const DEFAULT_ORIGIN_URL: &str =
    "https://open-fl.github.io/RepositoryOrigins/default-origin.txt";

/// Resolution of the input buffer handed to a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
        }
    }
}

/// User configuration, read from `config.json` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlConfig {
    /// Directory searched for `*.cl` kernel sources.
    pub kernel_dir: Option<PathBuf>,
    /// Where the default origins file is downloaded from.
    pub default_origin_url: String,
    /// Sleep between polls of an empty save queue.
    pub save_poll_interval_ms: u64,
    /// Default input buffer size for `fl run`.
    pub resolution: Resolution,
}

impl Default for FlConfig {
    fn default() -> Self {
        Self {
            kernel_dir: None,
            default_origin_url: DEFAULT_ORIGIN_URL.to_string(),
            save_poll_interval_ms: 100,
            resolution: Resolution::default(),
        }
    }
}

impl FlConfig {
    pub const FILE_NAME: &'static str = "config.json";

    /// Load the configuration from the data directory, or defaults if the
    /// file does not exist.
    pub fn load(paths: &DataPaths) -> Result<Self> {
        let path = paths.config_file();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: FlConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the kernel directory.
    ///
    /// Precedence: `$FL_KERNEL_DIR`, `kernel_dir` from config,
    /// `resources/kernel` next to the executable, the bundled kernels of
    /// this crate.
    pub fn resolve_kernel_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(KERNEL_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.kernel_dir {
            return dir.clone();
        }
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("resources").join("kernel")));
        match beside_exe {
            Some(dir) if dir.is_dir() => dir,
            _ => PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("resources")
                .join("kernel"),
        }
    }
}

/// Locations of the persisted files.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Data directory from the environment, falling back to the platform
    /// local data directory.
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return Ok(Self::new(dir));
        }
        let base = BaseDirs::new()
            .map(|d| d.data_local_dir().to_path_buf())
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".local/share"))
            })
            .context("Cannot determine a data directory (set FL_DATA_DIR)")?;
        Ok(Self::new(base.join("fl")))
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data directory {}", self.root.display()))
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(FlConfig::FILE_NAME)
    }

    pub fn origins_file(&self) -> PathBuf {
        self.root.join("origins.txt")
    }

    pub fn action_log(&self) -> PathBuf {
        self.root.join("startup-actions.txt")
    }

    pub fn plugin_list(&self) -> PathBuf {
        self.root.join("plugins.txt")
    }
}
