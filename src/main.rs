//! Stress driver for the gitkv pipeline.
//!
//! Runs concurrent CRUD agents against one repository and checks the
//! result against the expected state. Exit codes: 0 on success, -2 when
//! the post-run validation fails, -3 on fatal errors.

use std::fs::File;
use std::path::PathBuf;
use std::process::exit;

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use gitkv::stress::{self, StressConfig};

#[derive(Debug, Parser)]
#[command(name = "gitkv-stress", about = "Concurrent CRUD stress harness for gitkv")]
struct Args {
    /// Base directory for the repository and logs.
    #[arg(long = "test", default_value = "/tmp/test")]
    test: PathBuf,

    /// PRNG seed (random if omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Number of concurrent writer agents.
    #[arg(long, default_value_t = 1)]
    agents: usize,

    /// Maximum number of distinct branches.
    #[arg(long, default_value_t = 3)]
    branches: usize,

    /// Commits per agent.
    #[arg(long, default_value_t = 10)]
    commits: usize,

    /// Maximum CRUD operations per commit.
    #[arg(long, default_value_t = 11)]
    ops: usize,

    /// Maximum directory depth.
    #[arg(long, default_value_t = 3)]
    depth: usize,

    /// Maximum filename segment length.
    #[arg(long, default_value_t = 2)]
    length: usize,

    /// Skip the post-run consistency check.
    #[arg(long = "no-validation")]
    no_validation: bool,
}

fn init_logging(base: &std::path::Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(base)
        .with_context(|| format!("creating test base directory {}", base.display()))?;
    let log_path = base.join("stress.log");
    let file = File::create(&log_path)
        .with_context(|| format!("creating log file {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(BoxMakeWriter::new(std::sync::Mutex::new(file)))
        .with_ansi(false)
        .init();

    Ok(log_path)
}

fn main() {
    let args = Args::parse();

    let log_path = match init_logging(&args.test) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("FATAL: {err:#}");
            exit(-3);
        }
    };

    let config = StressConfig {
        base: args.test,
        seed: args.seed,
        agents: args.agents,
        branches: args.branches,
        commits: args.commits,
        ops: args.ops,
        depth: args.depth,
        length: args.length,
        validate: !args.no_validation,
    };

    match stress::run(&config) {
        Ok(report) => {
            println!("seed: {}", report.seed);
            match report.passed {
                Some(true) => {
                    println!("Success");
                    exit(0);
                }
                Some(false) => {
                    println!(
                        "Failure. For more details see log file {}",
                        log_path.display()
                    );
                    exit(-2);
                }
                None => {
                    println!("Done (validation skipped)");
                    exit(0);
                }
            }
        }
        Err(err) => {
            eprintln!("FATAL: {} (see {})", err.verbose(), log_path.display());
            exit(-3);
        }
    }
}
