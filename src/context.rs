//! The transaction-scoped context threaded through the pipeline.
//!
//! A [`Context`] binds a repository handle, a ref name, the staged updates
//! of the in-flight transaction and a cached [`Tip`] snapshot of the branch
//! head. Stages consume it by value and hand back the next one; nothing is
//! refreshed implicitly between stages — refresh is explicit via
//! `select_branch` or [`Context::rebase`].

use crate::collector::UpdateCollector;
use crate::error::Result;
use crate::storage::refs;
use crate::storage::types::{CommitId, TreeId, DEFAULT_REF};
use crate::storage::GitStore;

/// Cached snapshot of a branch head: the tip commit and its root tree.
///
/// Both ids are set together so the root is always the tip commit's tree.
/// An empty tip describes a brand-new branch that has not received its
/// first commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tip {
    commit: Option<CommitId>,
    root: Option<TreeId>,
}

impl Tip {
    /// The tip of a branch with no commits yet.
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn at(commit: CommitId, root: TreeId) -> Self {
        Self {
            commit: Some(commit),
            root: Some(root),
        }
    }

    pub fn commit_id(&self) -> Option<CommitId> {
        self.commit
    }

    pub fn root_id(&self) -> Option<TreeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.commit.is_none()
    }
}

/// The in-flight transaction value.
pub struct Context {
    store: GitStore,
    refname: String,
    updates: UpdateCollector,
    tip: Tip,
}

impl Context {
    /// A fresh context on `store`, bound to the default ref (`HEAD`) with
    /// the tip resolved from the live repository (empty on a commit-less
    /// repository).
    pub(crate) fn new(store: GitStore) -> Result<Self> {
        let mut ctx = Self {
            store,
            refname: DEFAULT_REF.to_string(),
            updates: UpdateCollector::new(),
            tip: Tip::empty(),
        };
        ctx.rebase()?;
        Ok(ctx)
    }

    /// The shared repository handle.
    pub fn store(&self) -> &GitStore {
        &self.store
    }

    /// The full ref this context commits to (`HEAD` or `refs/heads/<n>`).
    pub fn refname(&self) -> &str {
        &self.refname
    }

    /// Staged updates of the in-flight transaction.
    pub fn updates(&self) -> &UpdateCollector {
        &self.updates
    }

    pub(crate) fn updates_mut(&mut self) -> &mut UpdateCollector {
        &mut self.updates
    }

    /// The cached tip snapshot.
    pub fn tip(&self) -> Tip {
        self.tip
    }

    /// Cached tip commit id; `None` before the first commit.
    pub fn commit_id(&self) -> Option<CommitId> {
        self.tip.commit
    }

    /// Rebind to another repository handle, resetting the ref to `HEAD`.
    pub fn set_repo(&mut self, store: GitStore) {
        self.store = store;
        self.refname = DEFAULT_REF.to_string();
    }

    /// Change the ref without refreshing the tip; `select_branch` does the
    /// refresh.
    pub fn set_branch(&mut self, full_ref: impl Into<String>) {
        self.refname = full_ref.into();
    }

    /// Point the tip at `commit`, resolving its root tree.
    pub(crate) fn update(&mut self, commit: CommitId) -> Result<()> {
        let root = self
            .store
            .with_repo(|repo| refs::tree_of_commit(repo, commit))?;
        self.tip = Tip::at(commit, root);
        Ok(())
    }

    /// Refresh the tip to the live tip of this context's ref.
    ///
    /// An unborn ref (no commits yet) yields an empty tip.
    pub fn rebase(&mut self) -> Result<()> {
        let refname = self.refname.clone();
        let tip = self.store.with_repo(|repo| {
            match refs::tip_of_ref(repo, &refname)? {
                Some(commit) => {
                    let root = refs::tree_of_commit(repo, commit)?;
                    Ok(Tip::at(commit, root))
                }
                None => Ok(Tip::empty()),
            }
        })?;
        self.tip = tip;
        Ok(())
    }

    /// Whether the cached tip still equals the live tip of the ref.
    pub fn is_tip(&self) -> Result<bool> {
        let refname = self.refname.clone();
        let live = self
            .store
            .with_repo(|repo| refs::tip_of_ref(repo, &refname))?;
        Ok(live == self.tip.commit)
    }

    /// Replace the tip wholesale (used by `select_branch`).
    pub(crate) fn set_tip(&mut self, tip: Tip) {
        self.tip = tip;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("path", &self.store.path())
            .field("ref", &self.refname)
            .field("tip", &self.tip)
            .field("staged", &!self.updates.is_empty())
            .finish()
    }
}

/// A context plus the content produced by a read stage.
///
/// Chaining continues from the carried context, which is unchanged by the
/// read.
pub struct ReadContext {
    ctx: Context,
    content: String,
}

impl ReadContext {
    pub(crate) fn new(ctx: Context, content: String) -> Self {
        Self { ctx, content }
    }

    /// The text produced by the read.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The carried transaction context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Give up the content and continue the pipeline.
    pub fn into_context(self) -> Context {
        self.ctx
    }

    /// Split into both parts.
    pub fn into_parts(self) -> (Context, String) {
        (self.ctx, self.content)
    }
}

impl std::fmt::Debug for ReadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadContext")
            .field("ctx", &self.ctx)
            .field("content", &self.content)
            .finish()
    }
}
