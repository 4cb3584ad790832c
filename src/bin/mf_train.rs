//! mf_train — asynchronous parameter-server matrix factorization trainer
//!
//! Usage:
//!   mf_train --feat-num ./feat_num --shards shards.txt --model model.txt
//!
//! Table of Contents:
//! - CLI argument parsing (clap)
//! - Hyperparams assembly
//! - Trainer invocation + summary

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use async_mf::{Hyperparams, Trainer};

/// Train a matrix-factorization model by asynchronous SGD.
#[derive(Parser, Debug)]
#[command(name = "mf_train", version, about = "Asynchronous parameter-server MF trainer")]
struct Args {
    /// Path to the descriptor file (user_num, item_num, d — one per line)
    #[arg(long, default_value = "./feat_num")]
    feat_num: PathBuf,

    /// Path to a file listing shard paths, one per line
    #[arg(long)]
    shards: PathBuf,

    /// Output model file path
    #[arg(long)]
    model: PathBuf,

    /// Learning rate
    #[arg(long, default_value_t = 0.01)]
    alpha: f32,

    /// L2 regularization coefficient
    #[arg(long, default_value_t = 1.0)]
    l2: f32,

    /// Number of epochs
    #[arg(long, default_value_t = 1)]
    epoch: usize,

    /// Worker thread count; 0 uses available hardware parallelism
    #[arg(long = "thread", default_value_t = 2)]
    num_threads: usize,

    /// Samples to batch before folding into the shared progress counters
    #[arg(long = "batch_size", default_value_t = 100_000)]
    batch_size: usize,

    /// Push a group's accumulated update to the store every N sub-steps
    #[arg(long, default_value_t = 3)]
    push_step: usize,

    /// Refresh a group's local mirror every N sub-steps
    #[arg(long, default_value_t = 3)]
    fetch_step: usize,

    /// Rows per lock-striped parameter group
    #[arg(long, default_value_t = 1)]
    group_size: usize,

    /// Seed the per-server/per-worker PRNGs for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    async_mf::init_logging();
    let args = Args::parse();

    let hp = Hyperparams {
        alpha: args.alpha,
        l2: args.l2,
        epoch: args.epoch,
        push_step: args.push_step,
        fetch_step: args.fetch_step,
        batch_size: args.batch_size,
        group_size: args.group_size,
        num_threads: args.num_threads,
        seed: args.seed,
    };

    match Trainer::new(hp).run(&args.feat_num, &args.shards, &args.model) {
        Ok(report) => {
            println!(
                "epochs={} samples={} rmse={:.6}",
                report.epochs_run, report.samples_processed, report.final_rmse
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("mf_train: {e}");
            ExitCode::FAILURE
        }
    }
}
