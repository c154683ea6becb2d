//! Deferred action queue.
//!
//! Installing, removing and (de)activating packages cannot happen while the
//! plugins are loaded in this process. Those requests are appended to a
//! plain text log that the bootstrap step replays (and clears) on the next
//! start. This process only ever appends.
//!
//! Each entry is one line: `<token> <argument>`.

use anyhow::{Context, Result, bail};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    AddPackage,
    AddActivatePackage,
    RemovePackage,
    ActivatePackage,
    DeactivatePackage,
    AddOrigin,
    RemoveOrigin,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::AddPackage,
        ActionKind::AddActivatePackage,
        ActionKind::RemovePackage,
        ActionKind::ActivatePackage,
        ActionKind::DeactivatePackage,
        ActionKind::AddOrigin,
        ActionKind::RemoveOrigin,
    ];

    pub fn token(self) -> &'static str {
        match self {
            ActionKind::AddPackage => "add-package",
            ActionKind::AddActivatePackage => "add-activate-package",
            ActionKind::RemovePackage => "remove-package",
            ActionKind::ActivatePackage => "activate-package",
            ActionKind::DeactivatePackage => "deactivate-package",
            ActionKind::AddOrigin => "add-origin",
            ActionKind::RemoveOrigin => "remove-origin",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match ActionKind::ALL.into_iter().find(|k| k.token() == s) {
            Some(kind) => Ok(kind),
            None => bail!("Unknown action '{s}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub kind: ActionKind,
    /// Package name, package origin or repository origin URL.
    pub argument: String,
}

impl ActionEntry {
    pub fn new(kind: ActionKind, argument: impl Into<String>) -> Self {
        Self {
            kind,
            argument: argument.into(),
        }
    }
}

impl fmt::Display for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.argument)
    }
}

impl FromStr for ActionEntry {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let (token, argument) = line
            .trim_end()
            .split_once(' ')
            .with_context(|| format!("Malformed action line '{line}'"))?;
        Ok(Self::new(token.parse()?, argument))
    }
}

/// Handle to the append-only action log.
#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. The line is written with a single `write` on a
    /// file opened in append mode; existing content is never read.
    pub fn append(&self, entry: &ActionEntry) -> Result<()> {
        if entry.argument.contains(['\n', '\r']) {
            bail!("Action argument must be a single line: {:?}", entry.argument);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open action log {}", self.path.display()))?;
        file.write_all(format!("{entry}\n").as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        debug!(action = %entry, "Deferred action recorded");
        Ok(())
    }

    /// Read the pending entries. Only used for display and tests; the
    /// bootstrap step owns consumption.
    pub fn entries(&self) -> Result<Vec<ActionEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}
