//! Type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;

/// Identifier of a commit object.
///
/// The newtypes here exist so a blob id cannot be passed where a commit id
/// is expected; the inner [`Oid`] stays private to the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// Parse a commit id from its hex form.
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// The abbreviated hex form used in log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tree (directory snapshot) object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a blob (file content) object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// The abbreviated hex form used in log lines.
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default branch of a fresh repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Ref used by a context before any branch is selected.
pub const DEFAULT_REF: &str = "HEAD";

/// A branch name with its `refs/heads/` rendering.
///
/// Kept deliberately more restrictive than git itself: no empty names, no
/// `..`, no leading or trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchName(String);

impl BranchName {
    /// Validate and wrap a short branch name.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::application("branch name cannot be empty"));
        }
        if name.contains("..") || name.starts_with('/') || name.ends_with('/') {
            return Err(crate::Error::application(format!(
                "invalid branch name: '{name}'"
            )));
        }
        Ok(Self(name))
    }

    /// The default branch.
    pub fn main() -> Self {
        Self(DEFAULT_BRANCH.to_string())
    }

    /// Full ref path, e.g. `refs/heads/main`.
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// The short name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of a single commit, for inspection and validation output.
#[derive(Debug, Clone)]
pub struct CommitDetails {
    pub id: CommitId,
    pub tree: TreeId,
    pub parents: Vec<CommitId>,
    pub author: String,
    pub email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitDetails {
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree: TreeId::new(commit.tree_id()),
            parents: commit.parent_ids().map(CommitId::new).collect(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
            timestamp,
        }
    }

    /// First line of the commit message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }

    /// The first (or only) parent.
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parents.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_name_valid() {
        assert!(BranchName::new("main").is_ok());
        assert!(BranchName::new("feature/x").is_ok());
        assert!(BranchName::new("brn12").is_ok());
    }

    #[test]
    fn branch_name_invalid() {
        assert!(BranchName::new("").is_err());
        assert!(BranchName::new("a..b").is_err());
        assert!(BranchName::new("/lead").is_err());
        assert!(BranchName::new("trail/").is_err());
    }

    #[test]
    fn branch_ref_path() {
        let branch = BranchName::main();
        assert_eq!(branch.as_ref_path(), "refs/heads/main");
        assert_eq!(branch.as_str(), "main");
    }

    #[test]
    fn short_sha_is_seven_chars() {
        let id = CommitId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        assert_eq!(id.short(), "0123456");
    }
}
