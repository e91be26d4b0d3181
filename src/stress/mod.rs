//! Concurrent CRUD stress harness.
//!
//! Spawns N agent threads against one repository. Each agent performs a
//! fixed number of commits; every commit is a batch of randomized CRUD
//! operations planned against the expected state of the branch it lands
//! on. Agents hop between up to B branches. A shared [`Ledger`] records
//! what the repository must contain afterwards, and a post-run validation
//! compares bookkeeping and reality.
//!
//! Losing a tip race is part of normal operation here: the loser re-plans
//! its batch against the rebased branch state and tries again, which is
//! exactly the rollback-rebase-replay pattern clients of the library are
//! expected to use.

pub mod ledger;
pub mod ops;
pub mod words;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::pipeline::Pipeline;
use crate::registry;
use crate::storage::DEFAULT_BRANCH;

use ledger::Ledger;
use ops::{apply_op, plan_batch};
use words::Syllabary;

/// How often a losing writer retries one commit before giving up.
const MAX_COMMIT_ATTEMPTS: usize = 32;

/// Knobs of one stress run; mirrors the CLI surface.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Base directory; the repository lives in `<base>/stress`.
    pub base: PathBuf,
    /// PRNG seed; random when absent.
    pub seed: Option<u64>,
    /// Concurrent writer count.
    pub agents: usize,
    /// Maximum distinct branches.
    pub branches: usize,
    /// Commits per agent.
    pub commits: usize,
    /// Maximum CRUD operations per commit.
    pub ops: usize,
    /// Maximum directory depth.
    pub depth: usize,
    /// Maximum filename segment length (in syllables).
    pub length: usize,
    /// Run the post-run consistency check.
    pub validate: bool,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct StressReport {
    pub seed: u64,
    pub repo: PathBuf,
    /// `None` when validation was skipped.
    pub passed: Option<bool>,
}

/// Execute a full stress run: clean repo, agents, join, validate.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    let repo = config.base.join("stress");
    registry::clean_repo(&repo);

    let seed = config
        .seed
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..10_000));
    info!(seed, agents = config.agents, "starting stress run");

    let ledger = Arc::new(Ledger::new());

    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::new();
        for index in 0..config.agents.max(1) {
            let ledger = Arc::clone(&ledger);
            let repo = repo.clone();
            let config = config.clone();
            let agent_seed = seed.wrapping_add(index as u64);
            handles.push(scope.spawn(move || {
                agent(&repo, &config, agent_seed, agent_id(index), &ledger)
            }));
        }

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    ledger.fail();
                    return Err(err);
                }
                Err(_) => {
                    ledger.fail();
                    return Err(Error::application("agent thread panicked"));
                }
            }
        }
        Ok(())
    })?;

    let passed = if config.validate {
        let store = registry::select_repository(&repo, "stress")?.store().clone();
        let passed = ledger.validate(&store)?;
        if !passed {
            let report_path = config.base.join("validation-report.json");
            ledger.report(seed).write_to(&report_path)?;
            warn!(report = %report_path.display(), "validation failed; report written");
        }
        Some(passed)
    } else {
        None
    };

    Ok(StressReport { seed, repo, passed })
}

/// Circular agent id, 'A'..'Z'.
fn agent_id(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// One writer: `commits` commit batches across randomized branches.
fn agent(
    repo: &Path,
    config: &StressConfig,
    seed: u64,
    id: char,
    ledger: &Ledger,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let wordgen = Syllabary::new(config.depth, config.length);

    info!(
        agent = %id,
        branches = config.branches,
        commits = config.commits,
        ops = config.ops,
        "agent started"
    );

    let mut branch = DEFAULT_BRANCH.to_string();
    let mut ctx = registry::select_repository(repo, "stress")?;

    for commit_n in 1..=config.commits {
        if !ledger.ok() {
            break;
        }

        // Branch hopping is only possible once the repository has its
        // first commit to branch from.
        if !ledger.is_empty() && config.branches > 1 {
            if ctx.commit_id().is_none() {
                // another agent made the first commit; catch up
                ctx.rebase()?;
            }
            let slot = rng.gen_range(0..config.branches);
            let (name, created_now) = ledger.branch_for(slot);
            ctx = switch_branch(repo, ctx, &mut branch, &name, created_now)?;
        }

        ctx = commit_one_batch(repo, config, &mut rng, &wordgen, id, ledger, ctx, &branch, commit_n)?;
    }

    info!(agent = %id, "agent finished");
    Ok(())
}

/// Move the context onto `name`, creating the branch first when this agent
/// won the slot. A branch registered by another agent may not exist in the
/// repository yet; in that case stay where we are and let a later
/// iteration retry.
fn switch_branch(
    repo: &Path,
    ctx: Context,
    branch: &mut String,
    name: &str,
    created_now: bool,
) -> Result<Context> {
    let ctx = if created_now {
        ctx.create_branch(name)?
    } else {
        ctx
    };

    match ctx.select_branch(name) {
        Ok(ctx) => {
            *branch = name.to_string();
            Ok(ctx)
        }
        Err(err) if err.is_git_not_found() => {
            warn!(branch = name, "branch not visible yet; staying put");
            context_on(repo, branch)
        }
        Err(err) => Err(err),
    }
}

/// A fresh context positioned on `branch` with a live tip.
fn context_on(repo: &Path, branch: &str) -> Result<Context> {
    registry::select_repository(repo, "stress").select_branch(branch)
}

/// Plan, apply and commit one batch, re-planning against the rebased
/// branch state after each lost race.
#[allow(clippy::too_many_arguments)]
fn commit_one_batch(
    repo: &Path,
    config: &StressConfig,
    rng: &mut StdRng,
    wordgen: &Syllabary,
    id: char,
    ledger: &Ledger,
    mut ctx: Context,
    branch: &str,
    commit_n: usize,
) -> Result<Context> {
    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let parent = ctx.commit_id();
        let mut elements = ledger.elements_of(parent)?;
        let first_ever = ledger.is_empty();

        let batch = plan_batch(rng, wordgen, &mut elements, config.ops, first_ever);

        let mut work: Result<Context> = Ok(ctx);
        for op in &batch {
            work = apply_op(op, work, id);
        }

        // Commit and bookkeeping registration are one step as far as other
        // agents are concerned.
        let committed = {
            let _gate = ledger.gate();
            match work.commit("testagent", "agent@test.one", &format!("Commit {id}:{commit_n}")) {
                Ok(ctx) => {
                    let new_id = ctx.commit_id().ok_or_else(|| {
                        Error::application("commit succeeded without a tip")
                    })?;
                    ledger.record_commit(new_id, parent, elements);
                    Ok(ctx)
                }
                Err(err) => Err(err),
            }
        };

        match committed {
            Ok(ctx) => {
                // commits before the first branch hop happen on HEAD,
                // which is the default branch
                info!(
                    agent = %id,
                    r#ref = %ctx.refname(),
                    tip = %ctx.commit_id().map(|c| c.short()).unwrap_or_default(),
                    commit = commit_n,
                    attempt,
                    "agent committed"
                );
                return Ok(ctx);
            }
            Err(err) if err.kind() == ErrorKind::GitError && attempt < MAX_COMMIT_ATTEMPTS => {
                // lost the tip race; rebase onto the live branch and replay
                warn!(agent = %id, attempt, error = %err, "commit lost the race; rebasing");
                ctx = context_on(repo, branch)?;
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::application(format!(
        "agent {id} could not commit after {MAX_COMMIT_ATTEMPTS} attempts"
    )))
}
