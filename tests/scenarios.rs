//! End-to-end pipeline scenarios through the public API.

use std::path::PathBuf;

use gitkv::{clean_repo, select_repository, ErrorKind, Pipeline};
use tempfile::TempDir;

fn unit_repo(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("unit");
    clean_repo(&path);
    path
}

#[test]
fn s1_create_and_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "")
        .add("README", "test text")
        .read("README");

    assert_eq!(result.unwrap().content(), "test text");
}

#[test]
fn s2_committed_update() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "")
        .add("README", "a")
        .commit("t", "t@t", "m1")
        .add("README", "ab")
        .commit("t", "t@t", "m2")
        .read("README");

    assert_eq!(result.unwrap().content(), "ab");
}

#[test]
fn s3_committed_delete() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "")
        .add("README", "a")
        .commit("t", "t@t", "m1")
        .rm("README")
        .commit("t", "t@t", "m2")
        .read("README");

    let err = result.unwrap_err();
    assert!(err.message().contains("does not exist"));
}

#[test]
fn s4_branch_isolation() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "")
        .add("README", "rm")
        .commit("t", "t@t", "m1")
        .create_branch("other")
        .select_branch("other")
        .add("notable", "x")
        .commit("t", "t@t", "m2")
        .select_branch("main")
        .read("notable");

    let err = result.unwrap_err();
    assert!(err.message().contains("does not exist"));
}

#[test]
fn s5_rollback() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "")
        .add("README", "x")
        .rollback()
        .commit("t", "t@t", "m");

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyCommit);
    assert_eq!(err.message(), "Nothing to commit");
}

#[test]
fn s6_branch_before_first_commit() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let result = select_repository(&repo, "").create_branch("First");

    let err = result.unwrap_err();
    assert!(err.message().contains("invalid argument: 'commit'"));
}

#[test]
fn delete_overlay_then_committed_delete() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    // staged deletion shadows the committed content
    let staged = select_repository(&repo, "")
        .add("f", "c1")
        .commit("t", "t@t", "m1")
        .rm("f")
        .read("f");
    assert_eq!(staged.unwrap_err().kind(), ErrorKind::Deleted);

    // after committing the deletion the path is simply absent
    let committed = select_repository(&repo, "")
        .rm("f")
        .commit("t", "t@t", "m2")
        .read("f");
    assert!(committed.unwrap_err().message().contains("does not exist"));
}

#[test]
fn recovery_runs_only_on_failure() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    // or_else is skipped on the happy path
    let untouched: gitkv::Result<gitkv::Context> = select_repository(&repo, "")
        .add("a", "1")
        .commit("t", "t@t", "m")
        .or_else(|err| panic!("unexpected failure: {err}"));
    assert!(untouched.unwrap().commit_id().is_some());

    // and runs on the failing one
    let mut seen = None;
    let _ = select_repository(&repo, "")
        .commit("t", "t@t", "empty")
        .or_else(|err| {
            seen = Some(err.message().to_string());
            Err(err)
        });
    assert_eq!(seen.as_deref(), Some("Nothing to commit"));
}

#[test]
fn deep_paths_materialize_once_per_directory() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    let ctx = select_repository(&repo, "")
        .add("a/b/c/d/deep.txt", "deep")
        .add("a/b/side.txt", "side")
        .add("top.txt", "top")
        .commit("t", "t@t", "m")
        .unwrap();

    for (path, content) in [
        ("a/b/c/d/deep.txt", "deep"),
        ("a/b/side.txt", "side"),
        ("top.txt", "top"),
    ] {
        let got = select_repository(&repo, "").read(path).unwrap();
        assert_eq!(got.content(), content);
    }
    assert!(ctx.is_tip().unwrap());
}

#[test]
fn concurrent_writers_race_on_one_branch() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    // seed commit so both writers share a tip
    select_repository(&repo, "")
        .add("seed", "s")
        .commit("t", "t@t", "seed")
        .unwrap();

    // both contexts snapshot the same tip
    let a = select_repository(&repo, "").select_branch("main").unwrap();
    let b = select_repository(&repo, "").select_branch("main").unwrap();

    let a = a.add("from-a", "a").commit("t", "t@t", "a wins").unwrap();

    // b's tip is stale now; its commit must be refused, not merged
    let err = b
        .add("from-b", "b")
        .commit("t", "t@t", "b loses")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GitError);
    assert!(err.message().contains("current tip is not the first parent"));

    // the canonical recovery: fresh context on the live tip, replay, win
    let b = select_repository(&repo, "")
        .select_branch("main")
        .add("from-b", "b")
        .commit("t", "t@t", "b retries")
        .unwrap();

    let b_tip = b.commit_id().unwrap();
    let details = b.store().details(b_tip).unwrap();
    assert_eq!(details.parents, vec![a.commit_id().unwrap()]);

    for path in ["seed", "from-a", "from-b"] {
        assert!(select_repository(&repo, "").read(path).is_ok());
    }
}

#[test]
fn many_threads_commit_with_rebase_retry() {
    let dir = TempDir::new().unwrap();
    let repo = unit_repo(&dir);

    select_repository(&repo, "")
        .add("seed", "s")
        .commit("t", "t@t", "seed")
        .unwrap();

    let threads = 4;
    let commits_each = 3;

    std::thread::scope(|scope| {
        for t in 0..threads {
            let repo = repo.clone();
            scope.spawn(move || {
                for c in 0..commits_each {
                    let path = format!("file-{t}-{c}");
                    // retry until the commit lands on the moving tip
                    loop {
                        let attempt = select_repository(&repo, "")
                            .select_branch("main")
                            .add(&path, "payload")
                            .commit("t", "t@t", &format!("commit {t}:{c}"));
                        match attempt {
                            Ok(_) => break,
                            Err(err) => {
                                assert_eq!(err.kind(), ErrorKind::GitError);
                                assert!(err
                                    .message()
                                    .contains("current tip is not the first parent"));
                            }
                        }
                    }
                }
            });
        }
    });

    // every file from every thread made it
    for t in 0..threads {
        for c in 0..commits_each {
            let path = format!("file-{t}-{c}");
            assert!(select_repository(&repo, "").read(&path).is_ok());
        }
    }

    // and history is a single chain: each commit's parent is the previous
    let ctx = select_repository(&repo, "").select_branch("main").unwrap();
    let mut cursor = ctx.commit_id();
    let mut count = 0;
    while let Some(id) = cursor {
        let details = ctx.store().details(id).unwrap();
        assert!(details.parents.len() <= 1);
        cursor = details.first_parent();
        count += 1;
    }
    assert_eq!(count, 1 + threads * commits_each);
}
