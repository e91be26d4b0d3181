//! Process-wide registry of opened repositories.
//!
//! Opening a repository is not free, so handles are cached for the life of
//! the process, keyed by path. Lookups take a shared lock; insertion and
//! removal take an exclusive one. [`clean_repo`] exists for tests that
//! want a pristine directory.
//!
//! The registry also keeps a per-thread note of the last successfully
//! selected (repository, ref) pair; [`db`] materializes a fresh [`Context`]
//! from it so disjoint call sites can join the same logical spot without
//! threading a context through. The note is advisory: it never carries the
//! in-flight update collector.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::storage::GitStore;

static REPOS: Lazy<RwLock<HashMap<PathBuf, GitStore>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<(PathBuf, String)>> = const { RefCell::new(None) };
}

/// Select (and if needed create) the repository at `fullpath` and return a
/// context bound to it with ref `HEAD`.
///
/// Resolution order: the process cache, then an existing repository on
/// disk, then a fresh bare repository (directories created as needed,
/// description set to `creator`, initial head `main`).
pub fn select_repository(fullpath: impl AsRef<Path>, creator: &str) -> Result<Context> {
    let path = fullpath.as_ref();

    let cached = REPOS.read().get(path).cloned();
    let store = match cached {
        Some(store) => store,
        None => {
            let store = if GitStore::exists(path) {
                debug!(path = %path.display(), "opening existing repository");
                GitStore::open(path)?
            } else {
                info!(path = %path.display(), creator, "creating bare repository");
                GitStore::create(path, creator)?
            };
            REPOS
                .write()
                .entry(path.to_path_buf())
                .or_insert(store)
                .clone()
        }
    };

    let ctx = Context::new(store)?;
    remember_thread_context(path, ctx.refname());
    Ok(ctx)
}

/// Drop the cache entry for `fullpath` (releasing the handle) and delete
/// the directory recursively. Returns true if a cached handle was
/// released. Intended for tests.
pub fn clean_repo(fullpath: impl AsRef<Path>) -> bool {
    let path = fullpath.as_ref();
    let removed = REPOS.write().remove(path).is_some();
    let _ = std::fs::remove_dir_all(path);
    debug!(path = %path.display(), removed, "cleaned repository");
    removed
}

/// A fresh context for the thread's last selected (repository, ref).
///
/// Fails `MissingRepository` when this thread never selected one. The
/// returned context has an empty collector and a freshly resolved tip.
pub fn db() -> Result<Context> {
    let noted = THREAD_CONTEXT.with(|slot| slot.borrow().clone());
    let Some((path, refname)) = noted else {
        return Err(Error::missing_repository());
    };

    let store = REPOS
        .read()
        .get(&path)
        .cloned()
        .ok_or_else(Error::missing_repository)?;

    let mut ctx = Context::new(store)?;
    if refname != ctx.refname() {
        ctx.set_branch(refname);
        ctx.rebase()?;
    }
    Ok(ctx)
}

/// Record the thread's latest (repository, ref) pair. Called on successful
/// `select_repository` and `select_branch`.
pub(crate) fn remember_thread_context(path: &Path, refname: &str) {
    THREAD_CONTEXT.with(|slot| {
        *slot.borrow_mut() = Some((path.to_path_buf(), refname.to_string()));
    });
}
