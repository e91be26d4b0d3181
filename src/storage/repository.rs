//! Core object-store facade.
//!
//! [`GitStore`] wraps a `git2::Repository` with serialized, scoped access
//! and exposes the handful of high-level operations the rest of the crate
//! needs. Clone it to share across threads; it uses `Arc` internally.
//!
//! All libgit2 handles (trees, blobs, builders, signatures) are acquired
//! inside a [`GitStore::with_repo`] closure and dropped before it returns;
//! only ids cross the boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions, RepositoryOpenFlags};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::storage::types::{CommitDetails, CommitId, TreeId, DEFAULT_BRANCH};

/// Shared handle to one on-disk repository.
///
/// `git2::Repository` is `Send` but not `Sync`, so access goes through a
/// mutex; the scoped-closure shape keeps every lock acquisition short and
/// every libgit2 handle inside the critical section.
#[derive(Clone)]
pub struct GitStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    repo: Mutex<Repository>,
    path: PathBuf,
}

impl GitStore {
    /// Open an existing repository at `path`, without searching upward.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open_ext(
            path,
            RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        })
    }

    /// Create a bare repository at `path`, making directories as needed.
    ///
    /// `creator` becomes the repository description; the initial head is
    /// `main`.
    pub fn create(path: impl AsRef<Path>, creator: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = RepositoryInitOptions::new();
        opts.bare(true)
            .mkpath(true)
            .initial_head(DEFAULT_BRANCH)
            .description(creator);

        let repo = Repository::init_opts(path, &opts)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        })
    }

    /// Whether a repository already exists on disk at `path`.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        Repository::open_ext(
            path.as_ref(),
            RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .is_ok()
    }

    /// Filesystem location of the repository.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run `f` with exclusive access to the underlying repository.
    pub fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// Whether the repository has no commits at all.
    pub fn is_empty(&self) -> Result<bool> {
        self.with_repo(|repo| Ok(repo.is_empty()?))
    }

    /// Metadata of a commit.
    pub fn details(&self, id: CommitId) -> Result<CommitDetails> {
        self.with_repo(|repo| {
            let commit = repo.find_commit(id.raw())?;
            Ok(CommitDetails::from_git2(&commit))
        })
    }

    /// Write a commit with `tree` as its root and advance `refname` to it.
    ///
    /// This is the only operation that mutates the revision graph. The
    /// backend advances the ref atomically iff the first parent is the
    /// ref's current tip; a stale tip surfaces as a `GitError` ("current
    /// tip is not the first parent") and leaves the graph untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn create_commit(
        &self,
        refname: &str,
        author: &str,
        email: &str,
        message: &str,
        tree: TreeId,
        parents: &[CommitId],
    ) -> Result<CommitId> {
        self.with_repo(|repo| {
            let signature = git2::Signature::now(author, email)
                .map_err(|e| Error::blob(format!("bad signature: {}", e.message())))?;
            let tree = repo.find_tree(tree.raw())?;

            let parent_commits = parents
                .iter()
                .map(|id| repo.find_commit(id.raw()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

            let oid = repo.commit(
                Some(refname),
                &signature,
                &signature,
                message,
                &tree,
                &parent_refs,
            )?;

            Ok(CommitId::new(oid))
        })
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("path", &self.inner.path)
            .finish()
    }
}
