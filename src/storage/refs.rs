//! Ref resolution and branch creation.
//!
//! Refs are resolved through revparse so callers may pass either the
//! symbolic `HEAD` or a full `refs/heads/<name>` path. Unknown refs keep
//! libgit2's own "revspec '<ref>' not found" message.

use git2::{ObjectType, Repository};

use crate::error::{Error, Result};
use crate::storage::types::{BranchName, CommitId, TreeId, DEFAULT_REF};

/// Resolve `refname` to the commit it points at, along with its root tree.
///
/// Fails `EmptyCommit` when the ref peels to a non-commit object and
/// `InitialContext` when `HEAD` is resolved in a repository that has no
/// commits at all.
pub fn peel_ref_to_commit(repo: &Repository, refname: &str) -> Result<(CommitId, TreeId)> {
    let object = match repo.revparse_single(refname) {
        Ok(object) => object,
        Err(err) => {
            if refname == DEFAULT_REF && repo.is_empty().unwrap_or(false) {
                return Err(Error::initial_context(err.message()));
            }
            return Err(err.into());
        }
    };

    if object.kind() != Some(ObjectType::Commit) {
        return Err(Error::empty_commit(format!(
            "{refname} doesn't reference a commit"
        )));
    }

    // Consuming up-cast; the generic object handle is spent here.
    let commit = object
        .into_commit()
        .map_err(|_| Error::bad_commit(format!("{refname} is not a commit")))?;

    Ok((CommitId::new(commit.id()), TreeId::new(commit.tree_id())))
}

/// The commit a ref currently points at, `None` when the ref does not
/// exist yet (unborn branch).
pub fn tip_of_ref(repo: &Repository, refname: &str) -> Result<Option<CommitId>> {
    match repo.revparse_single(refname) {
        Ok(object) => match object.peel_to_commit() {
            Ok(commit) => Ok(Some(CommitId::new(commit.id()))),
            Err(err) => Err(err.into()),
        },
        Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Root tree id of a commit. Fails `BadCommit` when the id does not name a
/// commit object.
pub fn tree_of_commit(repo: &Repository, id: CommitId) -> Result<TreeId> {
    let object = repo.find_object(id.raw(), None)?;
    if object.kind() != Some(ObjectType::Commit) {
        return Err(Error::bad_commit(format!("{id} is not a commit")));
    }
    let commit = object
        .into_commit()
        .map_err(|_| Error::bad_commit(format!("{id} is not a commit")))?;
    Ok(TreeId::new(commit.tree_id()))
}

/// Create branch `name` pointing at `from`. Without `force` an existing
/// branch of the same name is an error.
pub fn create_branch(
    repo: &Repository,
    name: &BranchName,
    from: CommitId,
    force: bool,
) -> Result<()> {
    let commit = repo.find_commit(from.raw())?;
    repo.branch(name.as_str(), &commit, force)?;
    Ok(())
}

/// Whether a branch of this name exists.
pub fn branch_exists(repo: &Repository, name: &BranchName) -> bool {
    repo.find_reference(&name.as_ref_path()).is_ok()
}
