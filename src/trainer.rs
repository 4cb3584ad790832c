//! Wires the parameter store, workers and shard partitioning together and
//! drives the epoch loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::info;

use crate::config::Hyperparams;
use crate::descriptor::Descriptor;
use crate::error::{MfError, Result};
use crate::param_server::ParamServer;
use crate::sample::{open_shard, partition_shards};
use crate::spinlock::SpinLock;
use crate::worker::Worker;

/// Returned by [`Trainer::run`] for programmatic callers; the `mf_train`
/// binary prints a summary derived from this.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub final_rmse: f32,
    pub samples_processed: u64,
}

#[derive(Default)]
struct Progress {
    count: u64,
    sse: f64,
}

pub struct Trainer {
    hp: Hyperparams,
}

impl Trainer {
    pub fn new(hp: Hyperparams) -> Self {
        Self { hp }
    }

    /// Read the descriptor, initialize the parameter server, partition the
    /// shard list across `num_threads` workers, run `epoch` passes, and
    /// write the final model. Mirrors `FastMFTrainer::Train`/`TrainImpl`.
    pub fn run(
        &self,
        descriptor_path: impl AsRef<Path>,
        shard_list_path: impl AsRef<Path>,
        model_out_path: impl AsRef<Path>,
    ) -> Result<TrainingReport> {
        let desc = Descriptor::read(descriptor_path)?;

        let shard_paths = read_shard_list(shard_list_path.as_ref())?;
        if shard_paths.is_empty() {
            return Err(MfError::Configuration("shard list is empty".into()));
        }

        let ps = ParamServer::new(
            self.hp.alpha,
            self.hp.l2,
            desc.user_num,
            desc.item_num,
            desc.d,
            self.hp.group_size,
            self.hp.seed,
        );

        let requested_threads = self.hp.resolved_thread_count();
        let partitions = partition_shards(&shard_paths, requested_threads);
        let num_threads = partitions.len();

        info!(
            alpha = self.hp.alpha,
            l2 = self.hp.l2,
            epoch = self.hp.epoch,
            num_threads,
            "starting training"
        );

        let mut workers: Vec<Worker> = (0..num_threads)
            .map(|i| {
                let seed = self.hp.seed.map(|s| s.wrapping_add(i as u64 + 1));
                Worker::new(&ps, self.hp.push_step, self.hp.fetch_step, seed)
            })
            .collect();

        let progress = SpinLock::new(Progress::default());
        let mut report = TrainingReport {
            epochs_run: 0,
            final_rmse: 0.0,
            samples_processed: 0,
        };

        for epoch in 0..self.hp.epoch {
            for w in workers.iter_mut() {
                w.reset(&ps);
            }
            *progress.lock() = Progress::default();

            thread::scope(|scope| {
                for (worker, shards) in workers.iter_mut().zip(partitions.iter()) {
                    let ps = &ps;
                    let progress = &progress;
                    let batch_size = self.hp.batch_size;
                    scope.spawn(move || {
                        run_shards(worker, shards, ps, batch_size, epoch, progress);
                    });
                }
            });

            for w in workers.iter_mut() {
                w.push_param(&ps);
            }

            let snap = progress.lock();
            report.epochs_run = epoch + 1;
            report.samples_processed = snap.count;
            report.final_rmse = if snap.count > 0 {
                ((snap.sse / snap.count as f64) as f32).sqrt()
            } else {
                0.0
            };
        }

        ps.save_model(model_out_path)?;
        Ok(report)
    }
}

/// One worker thread's pass over its shard partition: read `batch_size`
/// samples at a time, update per sample, and fold local count/SSE into the
/// shared progress counter once per batch to avoid hot contention.
fn run_shards(
    worker: &mut Worker,
    shards: &[PathBuf],
    ps: &ParamServer,
    batch_size: usize,
    epoch: usize,
    progress: &SpinLock<Progress>,
) {
    for shard in shards {
        let source = match open_shard(shard) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(shard = %shard.display(), error = %e, "failed to open shard");
                continue;
            }
        };

        let mut local_count: u64 = 0;
        let mut local_sse: f64 = 0.0;

        for record in source {
            let sample = match record {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed sample");
                    continue;
                }
            };

            let mse = worker.update(sample.score, &sample.x, ps);
            local_count += 1;
            local_sse += mse as f64;

            if local_count as usize % batch_size == 0 {
                flush_batch(progress, epoch, &mut local_count, &mut local_sse);
            }
        }

        if local_count > 0 {
            flush_batch(progress, epoch, &mut local_count, &mut local_sse);
        }
    }
}

fn flush_batch(progress: &SpinLock<Progress>, epoch: usize, count: &mut u64, sse: &mut f64) {
    let mut p = progress.lock();
    p.count += *count;
    p.sse += *sse;
    let rmse = if p.count > 0 {
        (p.sse / p.count as f64).sqrt()
    } else {
        0.0
    };
    info!(target: "progress", epoch, processed = p.count, rmse, "training progress");
    *count = 0;
    *sse = 0.0;
}

/// Read a flat, one-path-per-line shard list file.
fn read_shard_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_shard(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        path
    }

    #[test]
    fn rank_one_convergence_single_thread() {
        // u_true/v_true small fixed vectors; scores = <u_true[u], v_true[i]>
        let u_true = [[0.3_f32, 0.4], [0.6, 0.1], [0.2, 0.8]];
        let v_true = [[0.5_f32, 0.2], [0.1, 0.7]];

        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();
        for (u, urow) in u_true.iter().enumerate() {
            for (i, vrow) in v_true.iter().enumerate() {
                let score: f32 = urow[0] * vrow[0] + urow[1] * vrow[1];
                lines.push(format!("{u}\t{score:.6}\t{i}"));
            }
        }
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let shard = write_shard(dir.path(), "shard0", &line_refs);

        let shard_list = dir.path().join("shards.txt");
        fs::write(&shard_list, format!("{}\n", shard.display())).unwrap();

        let descriptor = dir.path().join("feat_num");
        fs::write(&descriptor, "3\n2\n2\n").unwrap();

        let model_out = dir.path().join("model.txt");

        let hp = Hyperparams {
            alpha: 0.1,
            l2: 0.0,
            epoch: 60,
            push_step: 1,
            fetch_step: 1,
            batch_size: 100,
            group_size: 1,
            num_threads: 1,
            seed: Some(7),
        };

        let report = Trainer::new(hp).run(&descriptor, &shard_list, &model_out).unwrap();
        assert!(
            report.final_rmse < 0.05,
            "rmse did not converge: {}",
            report.final_rmse
        );
        assert!(model_out.exists());
    }

    #[test]
    fn zero_alpha_no_updates_occur() {
        let dir = tempfile::tempdir().unwrap();
        let shard = write_shard(dir.path(), "shard0", &["0\t1.0\t0", "0\t0.5\t0"]);
        let shard_list = dir.path().join("shards.txt");
        fs::write(&shard_list, format!("{}\n", shard.display())).unwrap();
        let descriptor = dir.path().join("feat_num");
        fs::write(&descriptor, "1\n1\n2\n").unwrap();
        let model_out = dir.path().join("model.txt");

        let hp = Hyperparams {
            alpha: 0.0,
            l2: 0.0,
            epoch: 1,
            push_step: 1,
            fetch_step: 1,
            batch_size: 100,
            group_size: 1,
            num_threads: 1,
            seed: Some(1),
        };

        let report = Trainer::new(hp).run(&descriptor, &shard_list, &model_out).unwrap();
        // with alpha = 0, U is never modified, so RMSE reflects only the
        // initial random matrix against the observed scores.
        assert!(report.final_rmse.is_finite());
    }

    #[test]
    fn empty_shard_list_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let shard_list = dir.path().join("shards.txt");
        fs::write(&shard_list, "").unwrap();
        let descriptor = dir.path().join("feat_num");
        fs::write(&descriptor, "1\n1\n2\n").unwrap();
        let model_out = dir.path().join("model.txt");

        let hp = Hyperparams::default();
        let err = Trainer::new(hp)
            .run(&descriptor, &shard_list, &model_out)
            .unwrap_err();
        assert!(matches!(err, MfError::Configuration(_)));
    }
}
