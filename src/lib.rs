//! gitkv — a content-versioned key/value store on a Git object database.
//!
//! Paths are keys, blobs are values, and every committed transaction is a
//! revision in a Git-compatible repository. Operations are staged on a
//! [`Context`] and land atomically on a branch tip; concurrent writers race
//! on the tip and the loser is told to rebase and replay.
//!
//! # Example
//!
//! ```no_run
//! use gitkv::{select_repository, Pipeline};
//!
//! let result = select_repository("/tmp/kv", "example")
//!     .add("docs/hello.txt", "hello world")
//!     .commit("me", "me@example.com", "first revision")
//!     .read("docs/hello.txt");
//!
//! assert_eq!(result.unwrap().content(), "hello world");
//! ```

pub mod collector;
pub mod context;
pub mod error;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod storage;
pub mod stress;

pub use context::{Context, ReadContext, Tip};
pub use error::{Error, ErrorKind, Result};
pub use pipeline::Pipeline;
pub use registry::{clean_repo, db, select_repository};
pub use storage::{BlobId, BranchName, CommitDetails, CommitId, GitStore, TreeId};
