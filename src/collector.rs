//! Per-transaction staging of directory updates.
//!
//! Every CRUD stage records its effect here instead of touching the object
//! database's trees directly. At commit time [`UpdateCollector::apply`]
//! walks the affected directories deepest-first and writes each one exactly
//! once, so a transaction touching N paths costs O(affected directories)
//! tree writes rather than one full root-to-leaf rebuild per path.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use git2::{FileMode, Oid, Repository, Tree};

use crate::error::{Error, Result};
use crate::path;
use crate::storage::tree::{self, EntryInfo};
use crate::storage::types::{BlobId, TreeId};
use crate::storage::blob;

/// What a staged update does to its directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Insert,
    Remove,
}

/// A staged change to exactly one entry of exactly one directory.
///
/// A removal carries the zero id and the `Unreadable` sentinel mode.
#[derive(Debug, Clone)]
pub struct ObjectUpdate {
    name: String,
    mode: FileMode,
    id: Oid,
    action: UpdateAction,
}

impl ObjectUpdate {
    fn insert(name: impl Into<String>, id: Oid, mode: FileMode) -> Self {
        Self {
            name: name.into(),
            mode,
            id,
            action: UpdateAction::Insert,
        }
    }

    fn remove(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: FileMode::Unreadable,
            id: Oid::zero(),
            action: UpdateAction::Remove,
        }
    }

    /// Entry name inside its directory (terminal segment only).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> UpdateAction {
        self.action
    }

    /// True for a pending removal (zero id).
    pub fn is_delete(&self) -> bool {
        self.id.is_zero()
    }

    /// Emit this update into a directory's tree builder.
    fn emit(&self, builder: &mut git2::TreeBuilder<'_>) -> Result<()> {
        match self.action {
            UpdateAction::Insert => {
                if self.id.is_zero() {
                    return Err(Error::application(format!(
                        "insert of '{}' has no object id",
                        self.name
                    )));
                }
                builder.insert(&self.name, self.id, self.mode.into())?;
            }
            UpdateAction::Remove => {
                builder.remove(&self.name)?;
            }
        }
        Ok(())
    }
}

/// A normalized relative directory path; `""` is the root.
///
/// Ordered so that deeper directories sort first (lexicographic descending
/// as tiebreak) and the root sorts last. This is the iteration order the
/// materialization pass depends on: children are written before their
/// parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirPath(String);

impl DirPath {
    pub fn new(dir: impl Into<String>) -> Self {
        Self(dir.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    fn depth(&self) -> usize {
        path::depth(&self.0)
    }

    /// Parent directory and own name; `None` for the root.
    fn parent_and_name(&self) -> Option<(&str, &str)> {
        if self.is_root() {
            return None;
        }
        path::split(&self.0).ok()
    }
}

impl Ord for DirPath {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .depth()
            .cmp(&self.depth())
            .then_with(|| other.0.cmp(&self.0))
    }
}

impl PartialOrd for DirPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Result of searching the uncommitted overlay for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staged {
    /// The newest staged update for the path is an insert of this blob.
    Blob(BlobId),
    /// The newest staged update for the path is a removal.
    Deleted,
    /// Nothing staged for the path.
    NotFound,
}

/// All pending updates of one in-progress transaction, grouped by
/// directory.
///
/// Updates are appended in pipeline order within a directory; staging the
/// same path twice in one transaction means last write wins, because the
/// tree builder applies the inserts in order and the later one supersedes.
#[derive(Debug, Clone, Default)]
pub struct UpdateCollector {
    dirs: BTreeMap<DirPath, Vec<ObjectUpdate>>,
}

impl UpdateCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, dir: &str, update: ObjectUpdate) {
        self.dirs
            .entry(DirPath::new(dir))
            .or_default()
            .push(update);
    }

    /// Create a blob from `content` and stage its insertion at `fullpath`.
    pub fn stage_file(&mut self, repo: &Repository, fullpath: &str, content: &str) -> Result<BlobId> {
        let (dir, name) = path::split(fullpath)?;
        let blob_id = blob::write(repo, content.as_bytes())?;
        self.push(dir, ObjectUpdate::insert(name, blob_id.raw(), FileMode::Blob));
        Ok(blob_id)
    }

    /// Stage the insertion of an existing entry (id and mode preserved) at
    /// `fullpath`. Used by move.
    pub fn stage_entry(&mut self, fullpath: &str, entry: &EntryInfo) -> Result<()> {
        let (dir, name) = path::split(fullpath)?;
        self.push(dir, ObjectUpdate::insert(name, entry.id, entry.mode()));
        Ok(())
    }

    /// Stage the removal of the entry at `fullpath`.
    pub fn stage_remove(&mut self, fullpath: &str) -> Result<()> {
        let (dir, name) = path::split(fullpath)?;
        self.push(dir, ObjectUpdate::remove(name));
        Ok(())
    }

    /// Search the overlay for `fullpath`, newest staged update first.
    pub fn find_staged(&self, fullpath: &str) -> Result<Staged> {
        let (dir, name) = path::split(fullpath)?;
        let Some(updates) = self.dirs.get(&DirPath::new(dir)) else {
            return Ok(Staged::NotFound);
        };

        for update in updates.iter().rev() {
            if update.name == name {
                return Ok(if update.is_delete() {
                    Staged::Deleted
                } else {
                    Staged::Blob(BlobId::new(update.id))
                });
            }
        }
        Ok(Staged::NotFound)
    }

    /// Materialize a new root tree containing all staged updates.
    ///
    /// Directories are visited deepest-first; each one is rebuilt from its
    /// committed base (absent for brand-new directories), written once, and
    /// its new id is staged as a tree insert into its parent. The walk
    /// therefore terminates at the root, whose id is returned.
    ///
    /// Works on a copy of the staged state: a failure at any point leaves
    /// the collector exactly as it was.
    pub fn apply(&self, repo: &Repository, base_root: Option<&Tree<'_>>) -> Result<TreeId> {
        let mut work = self.dirs.clone();
        let mut new_root = None;

        while let Some((dir, updates)) = work.pop_first() {
            let base = match (dir.is_root(), base_root) {
                (true, _) | (_, None) => None,
                (false, Some(root)) => tree::tree_at(repo, root, dir.as_str())?,
            };
            let mut builder = if dir.is_root() {
                repo.treebuilder(base_root)?
            } else {
                repo.treebuilder(base.as_ref())?
            };
            for update in &updates {
                update.emit(&mut builder)?;
            }
            let tree_id = builder.write()?;

            match dir.parent_and_name() {
                None => new_root = Some(TreeId::new(tree_id)),
                Some((parent, name)) => {
                    work.entry(DirPath::new(parent))
                        .or_default()
                        .push(ObjectUpdate::insert(name, tree_id, FileMode::Tree));
                }
            }
        }

        new_root.ok_or_else(|| Error::application("no updates to materialize"))
    }

    /// Drop all staged updates.
    pub fn clear(&mut self) {
        self.dirs.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// Directories with staged updates, in materialization order.
    pub fn directories(&self) -> impl Iterator<Item = &DirPath> {
        self.dirs.keys()
    }
}
