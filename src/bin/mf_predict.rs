//! mf_predict — batch scorer for a saved matrix-factorization model
//!
//! Loads a model file written by `mf_train` and reports the aggregate RMSE
//! over a list of test shards, mirroring the original's parallel
//! `mf_predict` worker-pool RMSE aggregation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;

use async_mf::{Model, Sample};
use async_mf::sample::{open_shard, partition_shards};
use async_mf::spinlock::SpinLock;

/// Score a test shard list against a saved model and report RMSE.
#[derive(Parser, Debug)]
#[command(name = "mf_predict", version, about = "Batch MF model scorer")]
struct Args {
    /// Path to a model file produced by mf_train
    #[arg(long)]
    model: PathBuf,

    /// Path to a file listing test-shard paths, one per line
    #[arg(long)]
    shards: PathBuf,

    /// Worker thread count; 0 uses available hardware parallelism
    #[arg(long = "thread", default_value_t = 2)]
    num_threads: usize,
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    sse: f64,
}

fn main() -> ExitCode {
    async_mf::init_logging();
    let args = Args::parse();

    let model = match Model::load(&args.model) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("mf_predict: {e}");
            return ExitCode::FAILURE;
        }
    };

    let shard_text = match std::fs::read_to_string(&args.shards) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("mf_predict: cannot read shard list: {e}");
            return ExitCode::FAILURE;
        }
    };
    let shard_paths: Vec<PathBuf> = shard_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect();
    if shard_paths.is_empty() {
        eprintln!("mf_predict: shard list is empty");
        return ExitCode::FAILURE;
    }

    let num_threads = if args.num_threads == 0 {
        num_cpus::get().max(1)
    } else {
        args.num_threads
    };
    let partitions = partition_shards(&shard_paths, num_threads);

    let acc = SpinLock::new(Accumulator::default());

    thread::scope(|scope| {
        for shards in partitions.iter() {
            let model = &model;
            let acc = &acc;
            scope.spawn(move || {
                let mut local_count: u64 = 0;
                let mut local_sse: f64 = 0.0;
                for shard in shards {
                    let source = match open_shard(shard) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(shard = %shard.display(), error = %e, "failed to open shard");
                            continue;
                        }
                    };
                    for record in source {
                        let sample: Sample = match record {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::debug!(error = %e, "skipping malformed sample");
                                continue;
                            }
                        };
                        let mse = model.predict(&sample);
                        local_count += 1;
                        local_sse += mse as f64;
                    }
                }
                let mut a = acc.lock();
                a.count += local_count;
                a.sse += local_sse;
            });
        }
    });

    let a = acc.lock();
    let rmse = if a.count > 0 {
        (a.sse / a.count as f64).sqrt()
    } else {
        0.0
    };
    println!("samples={} rmse={:.6}", a.count, rmse);
    ExitCode::SUCCESS
}
