use crate::checksum::sha256_file;
use crate::error::CommonError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Name of the manifest entry at the root of every `.flres` archive.
pub const MANIFEST_ENTRY: &str = "package.json";

/// Directory inside the archive holding the packaged files.
pub const FILES_DIR: &str = "files";

pub const FORMAT_VERSION: u32 = 1;

/// A single file recorded in a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageFile {
    /// Path relative to the package root, always `/`-separated.
    pub path: String,
    /// SHA256 of the file contents.
    pub sha256: String,
}

/// Manifest describing the contents of a `.flres` package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    pub format_version: u32,
    /// Package name (`--name`).
    pub name: String,
    /// Unpack configuration selecting which unpackers handle the files.
    pub unpack_config: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub files: Vec<PackageFile>,
}

impl PackageManifest {
    /// Build a manifest for every regular file below `root`.
    ///
    /// Files are listed in sorted order so that the same tree always
    /// produces the same manifest (apart from the timestamp).
    pub fn scan(root: &Path, name: &str, unpack_config: &str) -> Result<Self, CommonError> {
        if !root.is_dir() {
            return Err(CommonError::Package(format!(
                "package root is not a directory: {}",
                root.display()
            )));
        }

        let mut relative = Vec::new();
        collect_files(root, root, &mut relative)?;
        relative.sort();

        let mut files = Vec::with_capacity(relative.len());
        for rel in relative {
            let sha256 = sha256_file(&root.join(&rel))?;
            files.push(PackageFile {
                path: to_manifest_path(&rel),
                sha256,
            });
        }

        Ok(Self {
            format_version: FORMAT_VERSION,
            name: name.to_string(),
            unpack_config: unpack_config.to_string(),
            created: Utc::now(),
            files,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CommonError> {
        let manifest: Self = serde_json::from_slice(bytes)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(CommonError::Package(format!(
                "unsupported package format version {}",
                manifest.format_version
            )));
        }
        if let Some(file) = manifest
            .files
            .iter()
            .find(|f| !is_contained(Path::new(&f.path)))
        {
            return Err(CommonError::Package(format!(
                "file path leaves the package: {}",
                file.path
            )));
        }
        Ok(manifest)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, CommonError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// True when `path` is non-empty and made only of plain names, so joining it
/// onto a directory stays inside that directory.
pub fn is_contained(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

fn collect_files(dir: &Path, base: &Path, files: &mut Vec<PathBuf>) -> Result<(), CommonError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, base, files)?;
        } else if path.is_file() {
            let relative = path.strip_prefix(base).unwrap_or(&path);
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}

fn to_manifest_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_lists_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::write(dir.path().join("z.fl"), "Main:").unwrap();
        fs::write(dir.path().join("b/c/a.flc"), "x").unwrap();

        let manifest = PackageManifest::scan(dir.path(), "pkg", "default").unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["b/c/a.flc", "z.fl"]);
        assert_eq!(manifest.name, "pkg");
    }

    #[test]
    fn from_slice_rejects_paths_leaving_the_package() {
        for path in ["../x", "/etc/x", "a/../../x", ""] {
            let json = format!(
                r#"{{"format_version": 1, "name": "x", "unpack_config": "default",
                    "created": "2024-01-01T00:00:00Z",
                    "files": [{{"path": "{path}", "sha256": "00"}}]}}"#
            );
            assert!(
                matches!(
                    PackageManifest::from_slice(json.as_bytes()),
                    Err(CommonError::Package(_))
                ),
                "{path}"
            );
        }
    }

    #[test]
    fn contained_paths() {
        assert!(is_contained(Path::new("scripts/blur.fl")));
        assert!(!is_contained(Path::new("./x")));
        assert!(!is_contained(Path::new("../x")));
        assert!(!is_contained(Path::new("/x")));
        assert!(!is_contained(Path::new("")));
    }

    #[test]
    fn from_slice_rejects_unknown_version() {
        let json = br#"{"format_version": 99, "name": "x", "unpack_config": "default",
                        "created": "2024-01-01T00:00:00Z"}"#;
        assert!(matches!(
            PackageManifest::from_slice(json),
            Err(CommonError::Package(_))
        ));
    }
}
