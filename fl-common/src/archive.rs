use crate::checksum::verify_file;
use crate::error::CommonError;
use crate::package::{FILES_DIR, MANIFEST_ENTRY, PackageManifest, is_contained};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tar::{Archive, Builder, Header};

/// Write a `.flres` package: a gzip'd tarball holding `package.json` and
/// every file listed in the manifest under `files/`.
pub fn create_package(
    root: &Path,
    manifest: &PackageManifest,
    output: &Path,
) -> Result<(), CommonError> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let manifest_bytes = manifest.to_vec()?;
    let mut header = Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(manifest.created.timestamp().max(0) as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, MANIFEST_ENTRY, manifest_bytes.as_slice())
        .map_err(|err| CommonError::Archive(err.to_string()))?;

    for entry in &manifest.files {
        let source = root.join(&entry.path);
        let archive_path = format!("{FILES_DIR}/{}", entry.path);
        builder
            .append_path_with_name(&source, &archive_path)
            .map_err(|err| CommonError::Archive(format!("{}: {err}", source.display())))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|err| CommonError::Archive(err.to_string()))?;
    encoder.finish()?;
    Ok(())
}

/// Extract a `.flres` package into `target_dir` and verify every file
/// against the manifest checksums.
///
/// Packaged files end up below `target_dir/files/`. Entries that are not
/// plain files or directories, or whose path would leave `target_dir`, fail
/// the whole extraction.
pub fn extract_package(archive: &Path, target_dir: &Path) -> Result<PackageManifest, CommonError> {
    let data = fs::read(archive)?;
    fs::create_dir_all(target_dir)?;
    let mut tar = Archive::new(GzDecoder::new(Cursor::new(data)));
    extract_entries(&mut tar, target_dir)?;

    let manifest_path = target_dir.join(MANIFEST_ENTRY);
    let bytes = fs::read(&manifest_path).map_err(|_| {
        CommonError::Package(format!("{} has no {MANIFEST_ENTRY}", archive.display()))
    })?;
    let manifest = PackageManifest::from_slice(&bytes)?;

    let files_root = target_dir.join(FILES_DIR);
    for entry in &manifest.files {
        verify_file(&files_root.join(&entry.path), &entry.sha256)?;
    }

    Ok(manifest)
}

fn extract_entries<R: Read>(archive: &mut Archive<R>, target_dir: &Path) -> Result<(), CommonError> {
    for entry in archive
        .entries()
        .map_err(|err| CommonError::Archive(err.to_string()))?
    {
        let mut entry = entry.map_err(|err| CommonError::Archive(err.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|err| CommonError::Archive(err.to_string()))?
            .into_owned();
        if !is_contained(&entry_path) {
            return Err(CommonError::Archive(format!(
                "entry escapes target directory: {}",
                entry_path.display()
            )));
        }

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(target_dir.join(&entry_path))?;
            continue;
        }
        if !kind.is_file() {
            return Err(CommonError::Archive(format!(
                "unsupported entry type for {}",
                entry_path.display()
            )));
        }

        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|err| CommonError::Archive(format!("{}: {err}", entry_path.display())))?;
        if !unpacked {
            return Err(CommonError::Archive(format!(
                "entry escapes target directory: {}",
                entry_path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/blur.flc"), b"compiled").unwrap();
        fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
        dir
    }

    #[test]
    fn package_extracts_with_manifest_and_files() {
        let src = sample_tree();
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("pkg.flres");

        let manifest = PackageManifest::scan(src.path(), "demo", "fl2flc").unwrap();
        create_package(src.path(), &manifest, &archive).unwrap();

        let target = out.path().join("extract");
        let loaded = extract_package(&archive, &target).unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.unpack_config, "fl2flc");
        assert_eq!(
            fs::read(target.join("files/scripts/blur.flc")).unwrap(),
            b"compiled"
        );
    }

    #[test]
    fn tampered_file_fails_verification() {
        let src = sample_tree();
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("pkg.flres");

        let mut manifest = PackageManifest::scan(src.path(), "demo", "default").unwrap();
        manifest.files[0].sha256 = "00".repeat(32);
        create_package(src.path(), &manifest, &archive).unwrap();

        let err = extract_package(&archive, &out.path().join("x")).unwrap_err();
        assert!(matches!(err, CommonError::ChecksumMismatch { .. }));
    }

    /// Write a gzip'd tar with the given names as-is, without the path
    /// checks `tar::Builder` applies.
    fn raw_archive(path: &Path, entries: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, data) in entries {
            let mut header = Header::new_gnu();
            let raw = &mut header.as_old_mut().name;
            raw[..name.len()].copy_from_slice(name.as_bytes());
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn absolute_entry_is_rejected_and_not_written() {
        let out = tempfile::tempdir().unwrap();
        let victim = out.path().join("outside/victim.txt");
        let archive = out.path().join("evil.flres");
        raw_archive(&archive, &[(victim.to_str().unwrap(), b"pwned")]);

        let err = extract_package(&archive, &out.path().join("staging")).unwrap_err();
        assert!(matches!(err, CommonError::Archive(_)));
        assert!(!victim.exists());
    }

    #[test]
    fn parent_dir_entry_is_rejected() {
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("evil.flres");
        raw_archive(&archive, &[("files/../../victim.txt", b"pwned")]);

        let err = extract_package(&archive, &out.path().join("staging")).unwrap_err();
        assert!(matches!(err, CommonError::Archive(_)));
        assert!(!out.path().join("victim.txt").exists());
    }

    #[test]
    fn manifest_path_leaving_files_dir_is_rejected() {
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("evil.flres");
        let manifest = PackageManifest {
            format_version: crate::package::FORMAT_VERSION,
            name: "evil".into(),
            unpack_config: "default".into(),
            created: chrono::Utc::now(),
            files: vec![crate::package::PackageFile {
                path: "../x".into(),
                sha256: crate::checksum::sha256_hex(b"payload"),
            }],
        };
        let manifest_bytes = manifest.to_vec().unwrap();
        raw_archive(
            &archive,
            &[(MANIFEST_ENTRY, manifest_bytes.as_slice()), ("x", b"payload")],
        );

        let err = extract_package(&archive, &out.path().join("staging")).unwrap_err();
        assert!(matches!(err, CommonError::Package(_)));
    }

    #[test]
    fn missing_manifest_is_a_package_error() {
        let out = tempfile::tempdir().unwrap();
        let archive = out.path().join("empty.flres");
        let encoder = GzEncoder::new(fs::File::create(&archive).unwrap(), Compression::default());
        let builder = Builder::new(encoder);
        builder.into_inner().unwrap().finish().unwrap();

        let err = extract_package(&archive, &out.path().join("x")).unwrap_err();
        assert!(matches!(err, CommonError::Package(_)));
    }
}
