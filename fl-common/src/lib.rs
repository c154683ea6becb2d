//! Shared plumbing for the `fl` command line: `.flres` package archives,
//! sha256 checksums and plain HTTP downloads.

pub mod archive;
pub mod checksum;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod package;
