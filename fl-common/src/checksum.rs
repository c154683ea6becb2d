use crate::error::CommonError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn sha256_file(path: &Path) -> Result<String, CommonError> {
    let bytes = fs::read(path)?;
    Ok(sha256_hex(&bytes))
}

/// Compare a file on disk against an expected lowercase hex digest.
pub fn verify_file(path: &Path, expected: &str) -> Result<(), CommonError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn verify_file_detects_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let good = sha256_hex(b"hello");
        assert!(verify_file(&path, &good).is_ok());
        assert!(verify_file(&path, &good.to_uppercase()).is_ok());

        let err = verify_file(&path, &sha256_hex(b"other")).unwrap_err();
        assert!(matches!(err, CommonError::ChecksumMismatch { .. }));
    }
}
