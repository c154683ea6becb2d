use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("http error: {0}")]
    Http(String),
    #[error("package error: {0}")]
    Package(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
