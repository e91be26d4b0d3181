//! Storage layer: a resource-safe facade over the Git object database.
//!
//! Everything here deals in content-addressed objects (blobs, trees,
//! commits) and refs. The staging and pipeline layers above never touch
//! libgit2 directly.

pub mod blob;
pub mod refs;
pub mod repository;
pub mod tree;
pub mod types;

pub use repository::GitStore;
pub use types::{
    BlobId, BranchName, CommitDetails, CommitId, TreeId, DEFAULT_BRANCH, DEFAULT_REF,
};
