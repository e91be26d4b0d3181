//! Tree (directory snapshot) lookups relative to a root tree.
//!
//! Git trees are immutable sorted lists of `{name, mode, id}` entries; a
//! directory path is resolved by walking entries from the root. These
//! helpers run inside a `GitStore::with_repo` scope and never let a
//! libgit2 handle escape it.

use git2::{ObjectType, Repository, Tree};

use crate::error::{Error, Result};

/// Look up the tree for directory `dir` relative to `root`.
///
/// Returns `Ok(None)` when the directory does not exist (a brand-new
/// directory in a transaction), and fails `BadDir` when the path names a
/// blob instead of a directory. `dir` must not be empty; the root itself
/// is the caller's `root` argument.
pub fn tree_at<'r>(repo: &'r Repository, root: &Tree<'_>, dir: &str) -> Result<Option<Tree<'r>>> {
    let entry = match root.get_path(std::path::Path::new(dir)) {
        Ok(entry) => entry,
        Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    if entry.kind() != Some(ObjectType::Tree) {
        return Err(Error::bad_dir(format!("{dir} is not a directory")));
    }

    Ok(Some(repo.find_tree(entry.id())?))
}

/// A committed tree entry, reduced to what outlives the lookup scope.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo {
    pub id: git2::Oid,
    pub filemode: i32,
    pub kind: Option<ObjectType>,
}

impl EntryInfo {
    /// The entry's mode as the typed enum; unknown raw modes map to
    /// `Unreadable`.
    pub fn mode(&self) -> git2::FileMode {
        match self.filemode {
            0o040000 => git2::FileMode::Tree,
            0o100644 => git2::FileMode::Blob,
            0o100664 => git2::FileMode::BlobGroupWritable,
            0o100755 => git2::FileMode::BlobExecutable,
            0o120000 => git2::FileMode::Link,
            0o160000 => git2::FileMode::Commit,
            _ => git2::FileMode::Unreadable,
        }
    }

    /// True when the entry is a regular blob (any flavor).
    pub fn is_blob(&self) -> bool {
        self.kind == Some(ObjectType::Blob)
    }
}

/// Look up the entry at `path` under `root`.
///
/// Fails `NotFound` with the backend's "does not exist in the given tree"
/// message when the path is absent.
pub fn entry_at(root: &Tree<'_>, path: &str) -> Result<EntryInfo> {
    match root.get_path(std::path::Path::new(path)) {
        Ok(entry) => Ok(EntryInfo {
            id: entry.id(),
            filemode: entry.filemode(),
            kind: entry.kind(),
        }),
        Err(err) if err.code() == git2::ErrorCode::NotFound => {
            Err(Error::not_found(err.message()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Read the content of the blob at `path` under `root`.
///
/// Fails `BadFile` when the path resolves to a directory and `NotFound`
/// when it is absent.
pub fn blob_content(repo: &Repository, root: &Tree<'_>, path: &str) -> Result<Vec<u8>> {
    let entry = entry_at(root, path)?;

    if entry.kind != Some(ObjectType::Blob) {
        return Err(Error::bad_file(format!("{path} is not a file")));
    }

    let blob = repo.find_blob(entry.id)?;
    Ok(blob.content().to_vec())
}
