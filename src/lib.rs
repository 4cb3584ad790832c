//! # async-mf — asynchronous parameter-server matrix factorization
//!
//! Trains two blocks of latent-factor vectors (users, items) by stochastic
//! gradient descent against a stream of `(user, item, score)` triples,
//! parallelized across worker threads that maintain local parameter
//! mirrors and synchronize with a shared, lock-striped authoritative store
//! at bounded staleness.
//!
//! ## Core
//! - [`spinlock`] — the busy-wait mutex every group lock is built from
//! - [`param_server`] — the authoritative, group-striped latent matrix
//! - [`worker`] — a thread's local mirror, accumulator and SGD step
//! - [`trainer`] — epoch loop, shard partitioning, progress reporting
//!
//! ## Ambient
//! - [`config`] — hyperparameters
//! - [`descriptor`] — the `feat_num` sidecar file
//! - [`sample`] — shard readers (plain text, gzip) and shard partitioning
//! - [`model`] — saved-model loading and prediction (the external
//!   predictor's half of the I/O contract)
//! - [`error`] — crate-wide error type

pub mod config;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod param_server;
pub mod sample;
pub mod spinlock;
pub mod trainer;
pub mod worker;

pub use config::Hyperparams;
pub use error::{MfError, Result};
pub use model::Model;
pub use param_server::ParamServer;
pub use sample::Sample;
pub use trainer::{Trainer, TrainingReport};
pub use worker::Worker;

/// Initialize a `tracing-subscriber` fmt layer driven by `RUST_LOG`,
/// defaulting to `info`. Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
