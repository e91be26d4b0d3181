//! Blob creation and content retrieval.

use git2::Repository;

use crate::error::{Error, Result};
use crate::storage::types::BlobId;

/// Write `content` as a blob and return its id.
pub fn write(repo: &Repository, content: &[u8]) -> Result<BlobId> {
    let oid = repo
        .blob(content)
        .map_err(|e| Error::blob(format!("blob creation failed: {}", e.message())))?;
    Ok(BlobId::new(oid))
}

/// Read the raw bytes of a blob.
pub fn read(repo: &Repository, id: BlobId) -> Result<Vec<u8>> {
    let blob = repo.find_blob(id.raw())?;
    Ok(blob.content().to_vec())
}

/// Canonical text form of blob bytes.
///
/// The store hands content back as UTF-8 text; anything else is a
/// `BlobError`.
pub fn text(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::blob(format!("blob is not valid UTF-8: {e}")))
}
