//! The chainable operation pipeline.
//!
//! Every stage consumes a [`Context`] and returns `Result<Context>` (the
//! read stage returns `Result<ReadContext>`). The [`Pipeline`] extension
//! trait lifts the stages onto `Result` itself so call sites chain
//! left-to-right and short-circuit on the first failure:
//!
//! ```no_run
//! use gitkv::{select_repository, Pipeline};
//!
//! let result = select_repository("/tmp/kv", "demo")
//!     .add("docs/a.txt", "alpha")
//!     .commit("me", "me@example.com", "first");
//! ```
//!
//! Failure handling composes with plain `Result` combinators: `and_then`
//! to continue, `or_else` to recover.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::collector::Staged;
use crate::context::{Context, ReadContext, Tip};
use crate::error::{Error, Result};
use crate::registry;
use crate::storage::blob;
use crate::storage::refs;
use crate::storage::tree::{self, EntryInfo};
use crate::storage::types::{BranchName, CommitId, DEFAULT_BRANCH};

/// Serializes branch advancement (and first-time branch creation) across
/// all threads of the process. The critical section is exactly the commit
/// write plus the tip bump.
static COMMIT_LOCK: Mutex<()> = Mutex::new(());

impl Context {
    /// Switch this context to branch `name` and refresh the tip from the
    /// live ref.
    ///
    /// Selecting the default branch of a repository that has no commits
    /// yields an empty tip; selecting any other unknown branch fails with
    /// the backend's "revspec ... not found".
    pub fn select_branch(mut self, name: &str) -> Result<Context> {
        let branch = BranchName::new(name)?;
        let refname = branch.as_ref_path();
        self.set_branch(refname.clone());

        let store = self.store().clone();
        let resolved = store.with_repo(|repo| refs::peel_ref_to_commit(repo, &refname));

        match resolved {
            Ok((commit, root)) => self.set_tip(Tip::at(commit, root)),
            Err(err)
                if err.is_git_not_found()
                    && name == DEFAULT_BRANCH
                    && store.is_empty().unwrap_or(false) =>
            {
                self.set_tip(Tip::empty());
            }
            Err(err) => return Err(err),
        }

        registry::remember_thread_context(store.path(), &refname);
        debug!(branch = name, tip = ?self.commit_id().map(|c| c.short()), "selected branch");
        Ok(self)
    }

    /// Stage `content` at `fullpath` in the current transaction.
    pub fn add(mut self, fullpath: &str, content: &str) -> Result<Context> {
        let store = self.store().clone();
        let blob_id =
            store.with_repo(|repo| self.updates_mut().stage_file(repo, fullpath, content))?;
        debug!(path = fullpath, blob = %blob_id.short(), "staged add");
        Ok(self)
    }

    /// Stage several files at once, stopping at the first failure.
    pub fn add_many<'a, I>(self, files: I) -> Result<Context>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ctx = self;
        for (fullpath, content) in files {
            ctx = ctx.add(fullpath, content)?;
        }
        Ok(ctx)
    }

    /// Stage the removal of `fullpath`.
    pub fn rm(mut self, fullpath: &str) -> Result<Context> {
        self.updates_mut().stage_remove(fullpath)?;
        debug!(path = fullpath, "staged remove");
        Ok(self)
    }

    /// Stage a move of the blob at `from` to `to`.
    ///
    /// The source may live in the committed tip tree or in the staged
    /// overlay. Moving a directory is refused with `BadDir`; only blob
    /// entries move.
    pub fn mv(mut self, from: &str, to: &str) -> Result<Context> {
        let entry = match self.updates().find_staged(from)? {
            Staged::Blob(id) => EntryInfo {
                id: id.raw(),
                filemode: i32::from(git2::FileMode::Blob),
                kind: Some(git2::ObjectType::Blob),
            },
            Staged::Deleted => {
                return Err(Error::not_found(format!(
                    "the path '{from}' does not exist in the given tree"
                )))
            }
            Staged::NotFound => {
                let Some(root) = self.tip().root_id() else {
                    return Err(Error::not_found(format!(
                        "the path '{from}' does not exist in the given tree"
                    )));
                };
                let clean = from.strip_prefix('/').unwrap_or(from);
                let store = self.store().clone();
                let entry = store.with_repo(|repo| {
                    let root = repo.find_tree(root.raw())?;
                    tree::entry_at(&root, clean)
                })?;
                if !entry.is_blob() {
                    return Err(Error::bad_dir(format!(
                        "{from} is not a file; only files can be moved"
                    )));
                }
                entry
            }
        };

        self.updates_mut().stage_entry(to, &entry)?;
        self.updates_mut().stage_remove(from)?;
        debug!(from, to, "staged move");
        Ok(self)
    }

    /// Create branch `name` at the context's tip. The context itself is
    /// unchanged; pair with `select_branch` to switch onto it.
    pub fn create_branch(self, name: &str) -> Result<Context> {
        match self.commit_id() {
            Some(commit) => self.create_branch_at(commit, name),
            // Branching needs a commit to branch from; phrase the failure
            // the way the backend would.
            None => Err(Error::invalid_argument("commit")),
        }
    }

    /// Create branch `name` at an explicit commit.
    pub fn create_branch_at(self, commit: CommitId, name: &str) -> Result<Context> {
        let branch = BranchName::new(name)?;

        let _guard = COMMIT_LOCK.lock();
        self.store()
            .with_repo(|repo| refs::create_branch(repo, &branch, commit, false))?;

        info!(branch = name, at = %commit.short(), "created branch");
        Ok(self)
    }

    /// Commit everything staged as one revision on this context's ref.
    ///
    /// Materializes the new root tree from the collector, then — inside
    /// the process-wide commit lock — writes a commit whose sole parent is
    /// the cached tip and advances the ref. The backend rejects the
    /// advancement if the ref moved since the tip was cached ("current tip
    /// is not the first parent"); in that case the staged updates remain
    /// intact so the caller can rollback or rebase and replay.
    pub fn commit(mut self, author: &str, email: &str, message: &str) -> Result<Context> {
        if self.updates().is_empty() {
            return Err(Error::empty_commit("Nothing to commit"));
        }

        let store = self.store().clone();
        let base_root = self.tip().root_id();
        let new_root = store.with_repo(|repo| {
            let base = base_root.map(|id| repo.find_tree(id.raw())).transpose()?;
            self.updates().apply(repo, base.as_ref())
        })?;

        let parents: Vec<CommitId> = self.commit_id().into_iter().collect();

        let new_commit = {
            let _guard = COMMIT_LOCK.lock();
            let refname = self.refname().to_string();
            match store.create_commit(&refname, author, email, message, new_root, &parents) {
                Ok(id) => {
                    self.update(id)?;
                    id
                }
                Err(err) => {
                    warn!(r#ref = %refname, error = %err, "commit rejected");
                    return Err(err);
                }
            }
        };

        self.updates_mut().clear();
        info!(
            r#ref = %self.refname(),
            commit = %new_commit.short(),
            "committed"
        );
        Ok(self)
    }

    /// Discard everything staged in this transaction.
    pub fn rollback(mut self) -> Result<Context> {
        self.updates_mut().clear();
        debug!("rolled back staged updates");
        Ok(self)
    }

    /// Read the content at `fullpath`, honoring the uncommitted overlay
    /// before the committed tip tree.
    pub fn read(self, fullpath: &str) -> Result<ReadContext> {
        let content = match self.updates().find_staged(fullpath)? {
            Staged::Deleted => {
                return Err(Error::deleted("File deleted in uncommitted context"));
            }
            Staged::Blob(id) => {
                let bytes = self.store().with_repo(|repo| blob::read(repo, id))?;
                blob::text(bytes)?
            }
            Staged::NotFound => {
                let Some(root) = self.tip().root_id() else {
                    return Err(Error::not_found(format!(
                        "the path '{fullpath}' does not exist in the given tree"
                    )));
                };
                let clean = fullpath.strip_prefix('/').unwrap_or(fullpath);
                let bytes = self.store().with_repo(|repo| {
                    let root = repo.find_tree(root.raw())?;
                    tree::blob_content(repo, &root, clean)
                })?;
                blob::text(bytes)?
            }
        };

        Ok(ReadContext::new(self, content))
    }
}

/// Stage methods lifted onto `Result`, so pipelines chain without
/// unwrapping between stages. An `Err` value short-circuits every stage.
pub trait Pipeline: Sized {
    fn select_branch(self, name: &str) -> Result<Context>;
    fn add(self, fullpath: &str, content: &str) -> Result<Context>;
    fn add_many<'a, I>(self, files: I) -> Result<Context>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>;
    fn rm(self, fullpath: &str) -> Result<Context>;
    fn mv(self, from: &str, to: &str) -> Result<Context>;
    fn create_branch(self, name: &str) -> Result<Context>;
    fn create_branch_at(self, commit: CommitId, name: &str) -> Result<Context>;
    fn commit(self, author: &str, email: &str, message: &str) -> Result<Context>;
    fn rollback(self) -> Result<Context>;
    fn read(self, fullpath: &str) -> Result<ReadContext>;
}

impl Pipeline for Result<Context> {
    fn select_branch(self, name: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.select_branch(name))
    }

    fn add(self, fullpath: &str, content: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.add(fullpath, content))
    }

    fn add_many<'a, I>(self, files: I) -> Result<Context>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.and_then(|ctx| ctx.add_many(files))
    }

    fn rm(self, fullpath: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.rm(fullpath))
    }

    fn mv(self, from: &str, to: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.mv(from, to))
    }

    fn create_branch(self, name: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.create_branch(name))
    }

    fn create_branch_at(self, commit: CommitId, name: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.create_branch_at(commit, name))
    }

    fn commit(self, author: &str, email: &str, message: &str) -> Result<Context> {
        self.and_then(|ctx| ctx.commit(author, email, message))
    }

    fn rollback(self) -> Result<Context> {
        self.and_then(|ctx| ctx.rollback())
    }

    fn read(self, fullpath: &str) -> Result<ReadContext> {
        self.and_then(|ctx| ctx.read(fullpath))
    }
}

/// Chaining continues after a read from the carried context; the read
/// content is dropped unless the caller took it first.
impl Pipeline for Result<ReadContext> {
    fn select_branch(self, name: &str) -> Result<Context> {
        self.map(ReadContext::into_context).select_branch(name)
    }

    fn add(self, fullpath: &str, content: &str) -> Result<Context> {
        self.map(ReadContext::into_context).add(fullpath, content)
    }

    fn add_many<'a, I>(self, files: I) -> Result<Context>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.map(ReadContext::into_context).add_many(files)
    }

    fn rm(self, fullpath: &str) -> Result<Context> {
        self.map(ReadContext::into_context).rm(fullpath)
    }

    fn mv(self, from: &str, to: &str) -> Result<Context> {
        self.map(ReadContext::into_context).mv(from, to)
    }

    fn create_branch(self, name: &str) -> Result<Context> {
        self.map(ReadContext::into_context).create_branch(name)
    }

    fn create_branch_at(self, commit: CommitId, name: &str) -> Result<Context> {
        self.map(ReadContext::into_context).create_branch_at(commit, name)
    }

    fn commit(self, author: &str, email: &str, message: &str) -> Result<Context> {
        self.map(ReadContext::into_context).commit(author, email, message)
    }

    fn rollback(self) -> Result<Context> {
        self.map(ReadContext::into_context).rollback()
    }

    fn read(self, fullpath: &str) -> Result<ReadContext> {
        self.map(ReadContext::into_context).read(fullpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::ErrorKind;
    use crate::storage::GitStore;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Context) {
        let dir = TempDir::new().unwrap();
        let store = GitStore::create(dir.path().join("repo"), "test").unwrap();
        let ctx = Context::new(store).unwrap();
        (dir, ctx)
    }

    fn fresh(ctx: &Context) -> Result<Context> {
        Context::new(ctx.store().clone())
    }

    #[test]
    fn overlay_read_before_commit() {
        let (_dir, ctx) = setup();
        let result = ctx.add("README", "test text").read("README").unwrap();
        assert_eq!(result.content(), "test text");
    }

    #[test]
    fn staged_update_is_visible_before_commit() {
        let (_dir, ctx) = setup();
        let result = ctx
            .add("README", "one")
            .add("README", "oneone")
            .read("README")
            .unwrap();
        assert_eq!(result.content(), "oneone");
    }

    #[test]
    fn staged_delete_reads_as_deleted() {
        let (_dir, ctx) = setup();
        let err = ctx
            .add("README", "text")
            .rm("README")
            .read("README")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deleted);
        assert_eq!(err.message(), "File deleted in uncommitted context");
    }

    #[test]
    fn committed_content_reads_back() {
        let (_dir, ctx) = setup();
        let result = ctx
            .add("docs/a/b.txt", "nested")
            .commit("t", "t@t", "m1")
            .read("docs/a/b.txt")
            .unwrap();
        assert_eq!(result.content(), "nested");
    }

    #[test]
    fn committed_delete_is_gone_from_the_tree() {
        let (_dir, ctx) = setup();
        let err = ctx
            .add("README", "a")
            .commit("t", "t@t", "m1")
            .rm("README")
            .commit("t", "t@t", "m2")
            .read("README")
            .unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn empty_commit_is_rejected() {
        let (_dir, ctx) = setup();
        let err = ctx.commit("t", "t@t", "m").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCommit);
        assert_eq!(err.message(), "Nothing to commit");
    }

    #[test]
    fn rollback_discards_staged_updates() {
        let (_dir, ctx) = setup();
        let ctx = ctx.add("README", "x").rollback().unwrap();
        assert!(ctx.updates().is_empty());

        let err = ctx.commit("t", "t@t", "m").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCommit);
        assert_eq!(err.message(), "Nothing to commit");
    }

    #[test]
    fn rollback_is_idempotent() {
        let (_dir, ctx) = setup();
        let ctx = ctx
            .add("a", "1")
            .rollback()
            .rollback()
            .unwrap();
        assert!(ctx.updates().is_empty());
    }

    #[test]
    fn commit_advances_tip_with_prior_tip_as_parent() {
        let (_dir, ctx) = setup();
        let ctx = ctx.add("README", "a").commit("t", "t@t", "m1").unwrap();
        let first = ctx.commit_id().unwrap();

        let ctx = ctx.add("README", "ab").commit("t", "t@t", "m2").unwrap();
        let second = ctx.commit_id().unwrap();

        let details = ctx.store().details(second).unwrap();
        assert_eq!(details.parents, vec![first]);
        assert!(ctx.is_tip().unwrap());
        assert!(ctx.updates().is_empty());
    }

    #[test]
    fn create_branch_before_first_commit_fails() {
        let (_dir, ctx) = setup();
        let err = ctx.create_branch("First").unwrap_err();
        assert_eq!(err.message(), "invalid argument: 'commit'");
    }

    #[test]
    fn select_unknown_branch_keeps_backend_message() {
        let (_dir, ctx) = setup();
        let err = ctx.select_branch("other").unwrap_err();
        assert_eq!(err.message(), "revspec 'refs/heads/other' not found");
    }

    #[test]
    fn select_main_on_fresh_repo_gives_empty_tip() {
        let (_dir, ctx) = setup();
        let ctx = ctx.select_branch("main").unwrap();
        assert!(ctx.tip().is_empty());

        // and the branch is usable: first commit lands on it
        let ctx = ctx.add("README", "x").commit("t", "t@t", "m").unwrap();
        assert!(ctx.commit_id().is_some());
    }

    #[test]
    fn branch_isolation() {
        let (_dir, ctx) = setup();
        let ctx = ctx
            .add("README", "rm")
            .commit("t", "t@t", "m1")
            .create_branch("other")
            .select_branch("other")
            .add("notable", "x")
            .commit("t", "t@t", "m2")
            .unwrap();

        // visible on `other`
        let ctx = Ok(ctx).read("notable").unwrap().into_context();

        // absent on `main`
        let err = ctx.select_branch("main").read("notable").unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn branch_sees_files_of_parent_commit() {
        let (_dir, ctx) = setup();
        let result = ctx
            .add("README", "base")
            .commit("t", "t@t", "m1")
            .create_branch("other")
            .select_branch("other")
            .add("extra", "y")
            .commit("t", "t@t", "m2")
            .read("README")
            .unwrap();
        assert_eq!(result.content(), "base");
    }

    #[test]
    fn duplicate_branch_creation_fails() {
        let (_dir, ctx) = setup();
        let err = ctx
            .add("README", "x")
            .commit("t", "t@t", "m")
            .create_branch("twice")
            .create_branch("twice")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GitError);
    }

    #[test]
    fn mv_of_committed_blob() {
        let (_dir, ctx) = setup();
        let result = ctx
            .add("old/name", "payload")
            .commit("t", "t@t", "m1")
            .mv("old/name", "new/name")
            .commit("t", "t@t", "m2")
            .read("new/name")
            .unwrap();
        assert_eq!(result.content(), "payload");

        let err = Ok(result.into_context()).read("old/name").unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn mv_of_staged_blob_before_commit() {
        let (_dir, ctx) = setup();
        let result = ctx
            .add("from", "data")
            .mv("from", "to")
            .read("to")
            .unwrap();
        assert_eq!(result.content(), "data");

        let err = Ok(result.into_context()).read("from").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deleted);
    }

    #[test]
    fn mv_of_missing_path_is_not_found() {
        let (_dir, ctx) = setup();
        let err = ctx
            .add("present", "x")
            .commit("t", "t@t", "m")
            .mv("absent", "anywhere")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn mv_of_directory_is_refused() {
        let (_dir, ctx) = setup();
        let err = ctx
            .add("dir/file", "x")
            .commit("t", "t@t", "m")
            .mv("dir", "elsewhere")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadDir);
    }

    #[test]
    fn add_many_stages_everything() {
        let (_dir, ctx) = setup();
        let files = [
            ("a", "contents of A"),
            ("dir/a", "contents of dir/a"),
            ("dir/aa/f", "contents of dir/aa/f"),
        ];
        let ctx = ctx
            .add_many(files)
            .commit("t", "t@t", "bulk")
            .unwrap();

        for (path, content) in files {
            let got = fresh(&ctx).read(path).unwrap();
            assert_eq!(got.content(), content);
        }
    }

    #[test]
    fn stale_tip_commit_is_rejected() {
        let (_dir, ctx) = setup();
        let ctx = ctx.add("seed", "s").commit("t", "t@t", "m0").unwrap();

        // a second writer advances the branch underneath us
        let other = fresh(&ctx)
            .select_branch("main")
            .add("theirs", "t")
            .commit("t", "t@t", "their commit")
            .unwrap();
        assert!(other.is_tip().unwrap());

        // our cached tip is now stale
        let ctx = Ok(ctx).add("ours", "o").unwrap();
        assert!(!ctx.is_tip().unwrap());

        let err = ctx.commit("t", "t@t", "our commit").unwrap_err();
        assert!(err.message().contains("current tip is not the first parent"));
    }

    #[test]
    fn rebase_and_replay_after_losing_the_race() {
        let (_dir, ctx) = setup();
        let store = ctx.store().clone();
        let ctx = ctx.add("seed", "s").commit("t", "t@t", "m0").unwrap();

        let _other = fresh(&ctx)
            .select_branch("main")
            .add("theirs", "t")
            .commit("t", "t@t", "their commit")
            .unwrap();

        // lose the race
        let stale = Ok(ctx).add("ours", "o").unwrap();
        assert!(stale.commit("t", "t@t", "try 1").is_err());

        // replay on a context rebased to the live tip
        let replayed = Context::new(store)
            .select_branch("main")
            .add("ours", "o")
            .commit("t", "t@t", "try 2")
            .unwrap();

        for path in ["seed", "theirs", "ours"] {
            assert!(fresh(&replayed).read(path).is_ok());
        }
    }
}
