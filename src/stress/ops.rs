//! The CRUD operations a stress agent replays against a context.
//!
//! An operation batch is planned up front against a snapshot of the
//! branch's expected contents, so that losing a commit race lets the agent
//! re-plan the same shape of work against the rebased state.

use rand::rngs::StdRng;
use rand::Rng;
use tracing::info;

use crate::context::{Context, ReadContext};
use crate::error::Result;
use crate::pipeline::Pipeline;
use crate::stress::words::Syllabary;

/// One planned CRUD action against a concrete path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Create { path: String, content: String },
    Update { path: String, content: String },
    Delete { path: String },
    Read { path: String },
}

impl Op {
    /// True for actions that change the tree (and therefore justify a
    /// commit).
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Op::Read { .. })
    }

    fn kind(&self) -> &'static str {
        match self {
            Op::Create { .. } => "CREATE",
            Op::Update { .. } => "UPDATE",
            Op::Delete { .. } => "DELETE",
            Op::Read { .. } => "READ",
        }
    }
}

/// Plan up to `max_ops` operations against `elems`, the expected
/// `(path, content)` pairs visible at the transaction's base commit.
///
/// `elems` is updated in place to the state expected after the batch.
/// Weights follow the harness tradition: create 20%, update 30%, delete
/// 10%, read 40%. The very first operation of an empty repository is
/// always a create, and every batch carries at least one mutation so the
/// closing commit has something to commit.
pub fn plan_batch(
    rng: &mut StdRng,
    words: &Syllabary,
    elems: &mut Vec<(String, String)>,
    max_ops: usize,
    repo_is_empty: bool,
) -> Vec<Op> {
    let count = rng.gen_range(1..=max_ops.max(1));
    let mut ops = Vec::with_capacity(count + 1);

    if repo_is_empty {
        ops.push(plan_create(rng, words, elems));
    }

    while ops.len() < count {
        let roll = rng.gen_range(0..100u32);
        let op = if roll < 20 {
            Some(plan_create(rng, words, elems))
        } else if roll < 50 {
            plan_update(rng, words, elems)
        } else if roll < 60 {
            plan_delete(rng, elems)
        } else {
            plan_read(rng, elems)
        };
        if let Some(op) = op {
            ops.push(op);
        }
    }

    if !ops.iter().any(Op::is_mutation) {
        ops.push(plan_create(rng, words, elems));
    }

    ops
}

fn plan_create(rng: &mut StdRng, words: &Syllabary, elems: &mut Vec<(String, String)>) -> Op {
    let path = words.unique_file_path(rng);
    let content = words.content(rng);
    elems.push((path.clone(), content.clone()));
    Op::Create { path, content }
}

fn plan_update(
    rng: &mut StdRng,
    words: &Syllabary,
    elems: &mut Vec<(String, String)>,
) -> Option<Op> {
    if elems.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..elems.len());
    let content = words.content(rng);
    elems[idx].1 = content.clone();
    Some(Op::Update {
        path: elems[idx].0.clone(),
        content,
    })
}

fn plan_delete(rng: &mut StdRng, elems: &mut Vec<(String, String)>) -> Option<Op> {
    if elems.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..elems.len());
    let (path, _) = elems.remove(idx);
    Some(Op::Delete { path })
}

fn plan_read(rng: &mut StdRng, elems: &[(String, String)]) -> Option<Op> {
    if elems.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..elems.len());
    Some(Op::Read {
        path: elems[idx].0.clone(),
    })
}

/// Apply one operation to the pipeline, logging it the way the agents do.
pub fn apply_op(op: &Op, ctx: Result<Context>, agent: char) -> Result<Context> {
    if let Ok(ctx_ref) = &ctx {
        let tip = ctx_ref
            .commit_id()
            .map(|c| c.short())
            .unwrap_or_else(|| "-".to_string());
        info!(
            agent = %agent,
            r#ref = %ctx_ref.refname(),
            tip = %tip,
            op = op.kind(),
            path = op_path(op),
            "agent op"
        );
    }

    match op {
        Op::Create { path, content } | Op::Update { path, content } => ctx.add(path, content),
        Op::Delete { path } => ctx.rm(path),
        Op::Read { path } => ctx.read(path).map(ReadContext::into_context),
    }
}

fn op_path(op: &Op) -> &str {
    match op {
        Op::Create { path, .. }
        | Op::Update { path, .. }
        | Op::Delete { path }
        | Op::Read { path } => path,
    }
}
