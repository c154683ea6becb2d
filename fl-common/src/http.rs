use crate::error::CommonError;
use std::io::Read;

pub fn download(url: &str) -> Result<Vec<u8>, CommonError> {
    let mut bytes = Vec::new();
    ureq::get(url)
        .call()
        .map_err(|e| CommonError::Http(format!("{url}: {e}")))?
        .body_mut()
        .as_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| CommonError::Http(format!("{url}: {e}")))?;
    Ok(bytes)
}

/// Download a text document (origins files, repository listings).
pub fn download_text(url: &str) -> Result<String, CommonError> {
    let bytes = download(url)?;
    String::from_utf8(bytes).map_err(|e| CommonError::Http(format!("{url}: not utf-8: {e}")))
}
