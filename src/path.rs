//! Path splitting and directory traversal for staged updates.
//!
//! Paths are plain `/`-separated relative strings (`docs/a/b.txt`); a
//! leading `/` is tolerated and means the same thing. Directory walking
//! happens from the deepest component upward because the object database
//! builds trees leaf-first: each directory must be written before its
//! parent can reference it.

use crate::error::{Error, Result};

/// Splits a full path into `(directory, file name)`.
///
/// The directory part is `""` for a file at the root. Fails with
/// `Application` on an empty path or a path with no terminal name.
pub fn split(fullpath: &str) -> Result<(&str, &str)> {
    let path = normalize(fullpath)?;
    match path.rfind('/') {
        Some(idx) => {
            let name = &path[idx + 1..];
            if name.is_empty() {
                return Err(Error::application(format!(
                    "path '{fullpath}' has no file name"
                )));
            }
            Ok((&path[..idx], name))
        }
        None => Ok(("", path)),
    }
}

/// The terminal file name of a path.
pub fn file_name(fullpath: &str) -> Result<&str> {
    split(fullpath).map(|(_, name)| name)
}

/// The directory portion of a path, `""` for root-level entries.
pub fn dir_name(fullpath: &str) -> Result<&str> {
    split(fullpath).map(|(dir, _)| dir)
}

/// Number of segments in a directory path; the root `""` has depth zero.
pub fn depth(dir: &str) -> usize {
    if dir.is_empty() {
        0
    } else {
        dir.split('/').count()
    }
}

/// Iterate the directories containing a file, deepest first.
///
/// For `a/b/c/file.txt` the iterator yields `("a/b/c", "c")`, `("a/b", "b")`,
/// `("a", "a")`: each item is the directory prefix up to and including a
/// segment, paired with that segment's name. All items borrow from the
/// input; the sequence is a plain one-shot [`Iterator`].
pub fn ancestors(fullpath: &str) -> Result<Ancestors<'_>> {
    let (dir, _) = split(fullpath)?;
    Ok(Ancestors { rest: dir })
}

/// See [`ancestors`].
#[derive(Debug)]
pub struct Ancestors<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let prefix = self.rest;
        let segment = match prefix.rfind('/') {
            Some(idx) => {
                self.rest = &prefix[..idx];
                &prefix[idx + 1..]
            }
            None => {
                self.rest = "";
                prefix
            }
        };
        Some((prefix, segment))
    }
}

fn normalize(fullpath: &str) -> Result<&str> {
    let path = fullpath.strip_prefix('/').unwrap_or(fullpath);
    if path.is_empty() {
        return Err(Error::application("empty path"));
    }
    Ok(path)
}
