//! Thread-safe bookkeeping of the state the repository is expected to be
//! in, and the post-run validation that compares it against reality.
//!
//! Every successful commit is recorded with its parent and the full
//! `(path, content)` listing expected at that commit. After the agents
//! join, validation checks three things: all expected branches exist, all
//! expected content reads back verbatim at its commit, and every removed
//! path is truly absent from the commit that removed it.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{Error, ErrorKind, Result};
use crate::storage::refs;
use crate::storage::tree::blob_content;
use crate::storage::types::CommitId;
use crate::storage::GitStore;

const VALID: &str = "\u{2705}";
const INVALID: &str = "\u{274c}";

/// Expected `(path, content)` pairs visible at one commit.
pub type Elements = Vec<(String, String)>;

#[derive(Debug, Clone)]
struct CommitRecord {
    parent: Option<CommitId>,
    files: Elements,
}

#[derive(Debug, Default)]
struct LedgerInner {
    failed: bool,
    commits: HashMap<CommitId, CommitRecord>,
    branches: Vec<String>,
}

/// Shared expected-state ledger for one stress run.
#[derive(Debug)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
    /// Held by agents around `commit + record`, so a tip observed in the
    /// repository is always already registered here by the time another
    /// agent asks for its elements.
    commit_gate: Mutex<()>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                failed: false,
                commits: HashMap::new(),
                branches: vec![crate::storage::DEFAULT_BRANCH.to_string()],
            }),
            commit_gate: Mutex::new(()),
        }
    }

    /// Serialize an agent's commit-and-record step.
    pub fn gate(&self) -> MutexGuard<'_, ()> {
        self.commit_gate.lock()
    }

    pub fn ok(&self) -> bool {
        !self.inner.lock().failed
    }

    /// Mark the run as failed; agents stop at the next iteration.
    pub fn fail(&self) {
        self.inner.lock().failed = true;
    }

    /// True until the first commit of the run is recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().commits.is_empty()
    }

    /// Record a successful commit and the listing expected at it.
    pub fn record_commit(&self, id: CommitId, parent: Option<CommitId>, files: Elements) {
        self.inner
            .lock()
            .commits
            .insert(id, CommitRecord { parent, files });
    }

    /// Expected elements at `commit`; empty before the first commit.
    ///
    /// Asking about a commit that is missing from the bookkeeping is a
    /// harness bug and reported as `Application`.
    pub fn elements_of(&self, commit: Option<CommitId>) -> Result<Elements> {
        let Some(commit) = commit else {
            return Ok(Vec::new());
        };
        // taking the gate first means a freshly committed tip has been
        // registered by its writer before we look it up
        let _gate = self.commit_gate.lock();
        self.inner
            .lock()
            .commits
            .get(&commit)
            .map(|record| record.files.clone())
            .ok_or_else(|| {
                Error::application(format!(
                    "commit {} not found in bookkeeping",
                    commit.short()
                ))
            })
    }

    /// Branch name for a branch slot, registering a new one when the slot
    /// is past the end. Returns `(name, created_now)`.
    pub fn branch_for(&self, slot: usize) -> (String, bool) {
        let mut inner = self.inner.lock();
        if slot < inner.branches.len() {
            (inner.branches[slot].clone(), false)
        } else {
            let name = format!("brn{}", inner.branches.len());
            inner.branches.push(name.clone());
            (name, true)
        }
    }

    /// Compare the bookkeeping against the repository.
    ///
    /// Missing or diverging content is a validation failure (`Ok(false)`);
    /// unexpected backend errors bubble up as `Err` and are treated as
    /// fatal by the driver.
    pub fn validate(&self, store: &GitStore) -> Result<bool> {
        let inner = self.inner.lock();
        if inner.failed {
            return Ok(false);
        }

        let branches_ok = self.validate_branches(&inner, store)?;
        let content_ok = self.validate_content(&inner, store)?;
        let removals_ok = self.validate_removals(&inner, store)?;

        Ok(branches_ok && content_ok && removals_ok)
    }

    fn validate_branches(&self, inner: &LedgerInner, store: &GitStore) -> Result<bool> {
        info!("branch validation:");
        let mut valid = true;
        for branch in &inner.branches {
            let tip = store
                .with_repo(|repo| refs::tip_of_ref(repo, &format!("refs/heads/{branch}")))?;
            let icon = if tip.is_some() { VALID } else { INVALID };
            info!(
                "   {icon} {branch} [{}]",
                tip.map(|c| c.short()).unwrap_or_else(|| "missing".into())
            );
            valid &= tip.is_some();
        }
        Ok(valid)
    }

    fn validate_content(&self, inner: &LedgerInner, store: &GitStore) -> Result<bool> {
        info!("content validation:");
        let mut valid = true;
        for (id, record) in &inner.commits {
            let parent = record
                .parent
                .map(|p| p.short())
                .unwrap_or_else(|| "ROOT".into());
            info!("  [{}] -> [{}]:", parent, id.short());

            for (path, expected) in &record.files {
                match content_at(store, *id, path) {
                    Ok(actual) if actual == *expected => {
                        info!("   {VALID}  {path}");
                    }
                    Ok(_) => {
                        error!("   {INVALID}  {path}: content diverged");
                        valid = false;
                    }
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        error!("   {INVALID}  {path}: {err}");
                        valid = false;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(valid)
    }

    fn validate_removals(&self, inner: &LedgerInner, store: &GitStore) -> Result<bool> {
        info!("removal validation:");
        let mut valid = true;
        for (id, record) in &inner.commits {
            let Some(parent) = record.parent else {
                continue;
            };
            let Some(parent_record) = inner.commits.get(&parent) else {
                error!(
                    "   {INVALID} parent [{}] of [{}] missing from bookkeeping",
                    parent.short(),
                    id.short()
                );
                valid = false;
                continue;
            };

            for (path, _) in &parent_record.files {
                if record.files.iter().any(|(p, _)| p == path) {
                    continue;
                }
                // removed between parent and this commit; must be gone
                match content_at(store, *id, path) {
                    Err(err) if err.kind() == ErrorKind::NotFound => {
                        info!(
                            "   {VALID} in [{}] gone [{}] {path}",
                            parent.short(),
                            id.short()
                        );
                    }
                    Err(err) => return Err(err),
                    Ok(_) => {
                        error!(
                            "   {INVALID} in [{}] still present at [{}] {path}",
                            parent.short(),
                            id.short()
                        );
                        valid = false;
                    }
                }
            }
        }
        Ok(valid)
    }

    /// Serializable snapshot for the divergence report.
    pub fn report(&self, seed: u64) -> LedgerReport {
        let inner = self.inner.lock();
        LedgerReport {
            seed,
            branches: inner.branches.clone(),
            commits: inner
                .commits
                .iter()
                .map(|(id, record)| CommitReport {
                    id: id.to_string(),
                    parent: record.parent.map(|p| p.to_string()),
                    files: record
                        .files
                        .iter()
                        .map(|(path, content)| FileReport {
                            path: path.clone(),
                            content: content.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

fn content_at(store: &GitStore, commit: CommitId, path: &str) -> Result<String> {
    let bytes = store.with_repo(|repo| {
        let commit = repo.find_commit(commit.raw())?;
        let tree = commit.tree()?;
        blob_content(repo, &tree, path)
    })?;
    crate::storage::blob::text(bytes)
}

/// JSON-serializable dump of the expected state, written next to the
/// repository when validation fails.
#[derive(Debug, Serialize)]
pub struct LedgerReport {
    pub seed: u64,
    pub branches: Vec<String>,
    pub commits: Vec<CommitReport>,
}

#[derive(Debug, Serialize)]
pub struct CommitReport {
    pub id: String,
    pub parent: Option<String>,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub content: String,
}

impl LedgerReport {
    /// Write the report as pretty JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::application(format!("report serialization failed: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| Error::application(format!("report write failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::pipeline::Pipeline;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitStore) {
        let dir = TempDir::new().unwrap();
        let store = GitStore::create(dir.path().join("repo"), "test").unwrap();
        (dir, store)
    }

    #[test]
    fn validation_passes_on_a_faithful_run() {
        let (_dir, store) = setup();
        let ledger = Ledger::new();

        let ctx = Context::new(store.clone())
            .add("a/x", "one")
            .add("b/y", "two")
            .commit("t", "t@t", "c1")
            .unwrap();
        let first = ctx.commit_id().unwrap();
        ledger.record_commit(
            first,
            None,
            vec![
                ("a/x".to_string(), "one".to_string()),
                ("b/y".to_string(), "two".to_string()),
            ],
        );

        let ctx = Ok(ctx).rm("a/x").commit("t", "t@t", "c2").unwrap();
        let second = ctx.commit_id().unwrap();
        ledger.record_commit(second, Some(first), vec![("b/y".to_string(), "two".to_string())]);

        assert!(ledger.validate(&store).unwrap());
    }

    #[test]
    fn diverging_content_fails_validation() {
        let (_dir, store) = setup();
        let ledger = Ledger::new();

        let ctx = Context::new(store.clone())
            .add("f", "actual")
            .commit("t", "t@t", "c1")
            .unwrap();
        ledger.record_commit(
            ctx.commit_id().unwrap(),
            None,
            vec![("f".to_string(), "expected something else".to_string())],
        );

        assert!(!ledger.validate(&store).unwrap());
    }

    #[test]
    fn missing_expected_file_fails_validation() {
        let (_dir, store) = setup();
        let ledger = Ledger::new();

        let ctx = Context::new(store.clone())
            .add("present", "x")
            .commit("t", "t@t", "c1")
            .unwrap();
        ledger.record_commit(
            ctx.commit_id().unwrap(),
            None,
            vec![("absent".to_string(), "ghost".to_string())],
        );

        assert!(!ledger.validate(&store).unwrap());
    }

    #[test]
    fn missing_branch_fails_validation() {
        let (_dir, store) = setup();
        let ledger = Ledger::new();

        let ctx = Context::new(store.clone())
            .add("f", "x")
            .commit("t", "t@t", "c1")
            .unwrap();
        ledger.record_commit(ctx.commit_id().unwrap(), None, vec![("f".into(), "x".into())]);

        // register a branch that was never created in the repository
        let (name, created) = ledger.branch_for(1);
        assert_eq!(name, "brn1");
        assert!(created);

        assert!(!ledger.validate(&store).unwrap());
    }

    #[test]
    fn elements_follow_parent_linkage() {
        let ledger = Ledger::new();
        assert!(ledger.elements_of(None).unwrap().is_empty());

        let id = CommitId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        ledger.record_commit(id, None, vec![("p".into(), "c".into())]);
        assert_eq!(ledger.elements_of(Some(id)).unwrap().len(), 1);

        let unknown = CommitId::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        assert!(ledger.elements_of(Some(unknown)).is_err());
    }

    #[test]
    fn branch_slots_reuse_existing_names() {
        let ledger = Ledger::new();
        assert_eq!(ledger.branch_for(0), ("main".to_string(), false));
        assert_eq!(ledger.branch_for(1), ("brn1".to_string(), true));
        assert_eq!(ledger.branch_for(1), ("brn1".to_string(), false));
        assert_eq!(ledger.branch_for(2), ("brn2".to_string(), true));
    }

    #[test]
    fn failed_flag_short_circuits_validation() {
        let (_dir, store) = setup();
        let ledger = Ledger::new();
        ledger.fail();
        assert!(!ledger.ok());
        assert!(!ledger.validate(&store).unwrap());
    }
}
