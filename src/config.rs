//! Hyperparameters shared by the trainer and its CLI front end.

#[derive(Debug, Clone, Copy)]
pub struct Hyperparams {
    pub alpha: f32,
    pub l2: f32,
    pub epoch: usize,
    pub push_step: usize,
    pub fetch_step: usize,
    pub batch_size: usize,
    pub group_size: usize,
    pub num_threads: usize,
    pub seed: Option<u64>,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            l2: 1.0,
            epoch: 1,
            push_step: 3,
            fetch_step: 3,
            batch_size: 100_000,
            group_size: 1,
            num_threads: 2,
            seed: None,
        }
    }
}

impl Hyperparams {
    /// `num_threads == 0` means "use the hardware's available
    /// parallelism", restoring the fallback
    /// `original_source/src/mf_train.h::Initialize` implements via
    /// `std::thread::hardware_concurrency()`.
    pub fn resolved_thread_count(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_threads
        }
    }
}
