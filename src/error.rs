//! Error taxonomy for the whole crate.
//!
//! Every fallible operation returns [`Result`]. An [`Error`] pairs a kind
//! with a human message and the source location where it was raised, so a
//! failure deep in a pipeline can be traced without a backtrace. Errors
//! coming out of libgit2 additionally keep the backend's error class.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation attempted before a repository was selected.
    MissingRepository,
    /// A path component resolved to a blob where a directory was required.
    BadDir,
    /// A path resolved to a tree where a blob was required.
    BadFile,
    /// An id resolved to a non-commit object.
    BadCommit,
    /// Commit attempted with nothing staged, or a ref without commits.
    EmptyCommit,
    /// Blob creation or content extraction failed.
    BlobError,
    /// Catch-all for backend errors; carries the libgit2 class and message.
    GitError,
    /// Resolving `HEAD` in a repository that has no commits at all.
    InitialContext,
    /// Content exists in the committed tree but is staged for removal in
    /// this transaction.
    Deleted,
    /// Path does not exist in the current tip tree.
    NotFound,
    /// Programmer error (empty path, invalid input).
    Application,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MissingRepository => "missing repository",
            ErrorKind::BadDir => "bad directory",
            ErrorKind::BadFile => "bad file",
            ErrorKind::BadCommit => "bad commit",
            ErrorKind::EmptyCommit => "empty commit",
            ErrorKind::BlobError => "blob error",
            ErrorKind::GitError => "git error",
            ErrorKind::InitialContext => "initial context",
            ErrorKind::Deleted => "deleted",
            ErrorKind::NotFound => "not found",
            ErrorKind::Application => "application error",
        };
        f.write_str(name)
    }
}

/// A typed failure with its message and origin.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    location: &'static Location<'static>,
    git_class: Option<git2::ErrorClass>,
}

impl Error {
    /// Build an error of an arbitrary kind at the caller's location.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Location::caller(),
            git_class: None,
        }
    }

    #[track_caller]
    pub fn missing_repository() -> Self {
        Self::new(ErrorKind::MissingRepository, "No Repository selected")
    }

    #[track_caller]
    pub fn bad_dir(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadDir, message)
    }

    #[track_caller]
    pub fn bad_file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadFile, message)
    }

    #[track_caller]
    pub fn bad_commit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadCommit, message)
    }

    #[track_caller]
    pub fn empty_commit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyCommit, message)
    }

    #[track_caller]
    pub fn blob(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BlobError, message)
    }

    #[track_caller]
    pub fn initial_context(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InitialContext, message)
    }

    #[track_caller]
    pub fn deleted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Deleted, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[track_caller]
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Application, message)
    }

    /// A `GitError` with a message shaped like libgit2's own, for failures
    /// the backend would report itself were the call expressible through it.
    #[track_caller]
    pub fn invalid_argument(what: &str) -> Self {
        Self::new(ErrorKind::GitError, format!("invalid argument: '{what}'"))
    }

    /// The failure classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message, without location decoration.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the error was raised.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// The libgit2 error class, for errors that originated in the backend.
    pub fn git_class(&self) -> Option<git2::ErrorClass> {
        self.git_class
    }

    /// True when the underlying git failure was a not-found condition.
    pub fn is_git_not_found(&self) -> bool {
        self.kind == ErrorKind::GitError && self.message.contains("not found")
    }

    /// `file:line 'kind' message`, the long rendering used in logs.
    pub fn verbose(&self) -> String {
        format!(
            "{}:{} '{}' {}",
            self.location.file(),
            self.location.line(),
            self.kind,
            self.message
        )
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Self {
            kind: ErrorKind::GitError,
            message: err.message().to_string(),
            location: Location::caller(),
            git_class: Some(err.class()),
        }
    }
}
