//! Package repositories and their origins.
//!
//! `origins.txt` lists one origin per line. An origin is either an
//! `http(s)://` URL or a local file path pointing at a repository listing:
//!
//! ```json
//! { "name": "core", "plugins": [{ "name": "blur", "version": "1.0.0", "origin": "https://..." }] }
//! ```
//!
//! Listings are only read here, to resolve package names to the origin that
//! gets recorded in the action log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::actions::{ActionEntry, ActionKind, ActionLog};

/// A package as advertised by a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPointer {
    pub name: String,
    pub version: String,
    /// Where the package itself is downloaded from.
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryListing {
    pub name: String,
    #[serde(default)]
    pub plugins: Vec<PluginPointer>,
}

/// Read access to the known repositories.
pub trait RepositoryIndex {
    fn repositories(&self) -> &[RepositoryListing];

    /// First package named `name`, in repository order.
    fn find(&self, name: &str) -> Option<&PluginPointer> {
        self.repositories()
            .iter()
            .flat_map(|r| r.plugins.iter())
            .find(|p| p.name == name)
    }

    fn all_packages(&self) -> Vec<&PluginPointer> {
        self.repositories()
            .iter()
            .flat_map(|r| r.plugins.iter())
            .collect()
    }
}

/// Repositories loaded from the configured origins.
#[derive(Debug, Clone, Default)]
pub struct LoadedRepositories {
    listings: Vec<RepositoryListing>,
}

impl LoadedRepositories {
    pub fn new(listings: Vec<RepositoryListing>) -> Self {
        Self { listings }
    }

    /// Load the listing behind every origin. Origins that cannot be fetched
    /// or parsed are logged and left out.
    pub fn load(origins: &[String]) -> Self {
        let mut listings = Vec::new();
        for origin in origins {
            match load_listing(origin) {
                Ok(listing) => {
                    debug!(
                        origin = %origin,
                        repository = %listing.name,
                        packages = listing.plugins.len(),
                        "Loaded repository"
                    );
                    listings.push(listing);
                }
                Err(e) => warn!("[repo] Skipping origin {origin}: {e:#}"),
            }
        }
        Self { listings }
    }
}

impl RepositoryIndex for LoadedRepositories {
    fn repositories(&self) -> &[RepositoryListing] {
        &self.listings
    }
}

fn is_remote(origin: &str) -> bool {
    origin.starts_with("http://") || origin.starts_with("https://")
}

/// Fetch the text behind an origin.
pub fn fetch_origin(origin: &str) -> Result<String> {
    if is_remote(origin) {
        return fl_common::http::download_text(origin)
            .with_context(|| format!("Failed to download {origin}"));
    }
    fs::read_to_string(origin).with_context(|| format!("Failed to read {origin}"))
}

fn load_listing(origin: &str) -> Result<RepositoryListing> {
    let text = fetch_origin(origin)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid repository listing at {origin}"))
}

/// The origins file.
#[derive(Debug, Clone)]
pub struct OriginsFile {
    path: PathBuf,
}

impl OriginsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Non-empty, non-comment lines. A missing file has no origins.
    pub fn origins(&self) -> Result<Vec<String>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(parse_origins(&content))
    }

    /// Replace the whole file. Written to a sibling temp file first and
    /// renamed into place.
    pub fn replace(&self, content: &str) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("{} has no parent directory", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let tmp = parent.join(".origins.txt.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

pub fn parse_origins(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Record an add or add-and-activate request for a package name.
///
/// The name is resolved to its origin through `index`. Unknown names are
/// logged and nothing is appended. Returns whether an entry was written.
pub fn request_package(
    index: &dyn RepositoryIndex,
    log: &ActionLog,
    kind: ActionKind,
    name: &str,
) -> Result<bool> {
    let Some(package) = index.find(name) else {
        warn!("[repo] Can not add package '{name}': no known repository provides it");
        return Ok(false);
    };
    log.append(&ActionEntry::new(kind, &package.origin))?;
    Ok(true)
}
