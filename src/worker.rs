//! A single worker thread's local view of the model.
//!
//! Each worker owns a full-size mirror `u_local` it refreshes lazily from
//! the [`ParamServer`] and an accumulator `delta` it flushes back lazily —
//! the Hogwild!-style bounded-staleness trade of exact consistency for
//! lock-free-ish throughput.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::param_server::ParamServer;

pub struct Worker {
    d: usize,
    user_num: usize,
    feat_num: usize,
    group_size: usize,
    u_local: Vec<f32>,
    delta: Vec<f32>,
    step: Vec<usize>,
    push_step: usize,
    fetch_step: usize,
}

impl Worker {
    /// Allocate `u_local`/`delta` (`feat_num * d`), fill `u_local` with a
    /// harmless pre-fetch default (the original
    /// randomizes before the immediately-following authoritative fetch;
    /// this is observable only if the fetch silently failed, which cannot
    /// happen here since `fetch_param` is infallible), then overwrite it
    /// with the server's authoritative values.
    pub fn new(ps: &ParamServer, push_step: usize, fetch_step: usize, seed: Option<u64>) -> Self {
        let d = ps.d();
        let feat_num = ps.feat_num();
        let group_size = ps.group_size();
        let group_num = ps.group_num();

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let scale = if d == 0 { 0.0 } else { (1.0 / d as f32).sqrt() };
        let mut u_local = vec![0.0_f32; feat_num * d];
        for cell in u_local.iter_mut() {
            *cell = rng.gen::<f32>() * scale;
        }
        ps.fetch_param(&mut u_local);

        let delta = vec![0.0_f32; feat_num * d];
        let step = vec![0_usize; group_num];

        Self {
            d,
            user_num: ps.user_num(),
            feat_num,
            group_size,
            u_local,
            delta,
            step,
            push_step: push_step.max(1),
            fetch_step: fetch_step.max(1),
        }
    }

    fn group_of(&self, row: usize) -> usize {
        row / self.group_size
    }

    /// Re-fetch the full mirror from the server and reset all step
    /// counters. Called at the start of every epoch. `delta` is not
    /// re-zeroed — it is expected to already be zero after the prior
    /// epoch's end-of-epoch flush.
    pub fn reset(&mut self, ps: &ParamServer) {
        ps.fetch_param(&mut self.u_local);
        for s in self.step.iter_mut() {
            *s = 0;
        }
    }

    /// The core SGD step: `score` observed for `x = [user_id, item_id...]`.
    /// Returns the per-sample mean squared error, or `0.0` for a sample
    /// that's rejected or carries no valid items.
    pub fn update(&mut self, score: f32, x: &[i64], ps: &ParamServer) -> f32 {
        if x.len() < 2 {
            return 0.0;
        }
        let u = x[0];
        if u < 0 || u as usize >= self.user_num {
            return 0.0;
        }
        let u = u as usize;
        let g_u = self.group_of(u);

        let mut mse = 0.0_f32;

        for &raw_item in &x[1..] {
            if raw_item < 0 {
                break;
            }
            let i = self.user_num + raw_item as usize;
            if i >= self.feat_num {
                break;
            }
            let g_i = self.group_of(i);

            if self.step[g_i] % self.fetch_step == 0 {
                ps.fetch_param_group(&mut self.u_local, g_i);
            }
            if self.step[g_u] % self.fetch_step == 0 {
                ps.fetch_param_group(&mut self.u_local, g_u);
            }

            let u_row = u * self.d;
            let i_row = i * self.d;

            let mut p = 0.0_f32;
            for d in 0..self.d {
                p += self.u_local[u_row + d] * self.u_local[i_row + d];
            }
            let e = p - score;
            mse += e * e;

            let alpha = ps.alpha();
            let l2 = ps.l2();
            for d in 0..self.d {
                let uv = self.u_local[u_row + d];
                let iv = self.u_local[i_row + d];
                self.delta[u_row + d] -= alpha * (e * iv + l2 * uv);
                self.delta[i_row + d] -= alpha * (e * uv + l2 * iv);
            }

            if self.step[g_u] % self.push_step == 0 {
                ps.push_param_group(&mut self.delta, g_u);
            }
            if self.step[g_i] % self.push_step == 0 {
                ps.push_param_group(&mut self.delta, g_i);
            }

            self.step[g_u] += 1;
            self.step[g_i] += 1;
        }

        mse / (x.len() - 1) as f32
    }

    /// Flush every group's residual `delta` at end-of-epoch so no local
    /// update is dropped.
    pub fn push_param(&mut self, ps: &ParamServer) {
        for g in 0..self.step.len() {
            ps.push_param_group(&mut self.delta, g);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn const_server(d: usize, user_num: usize, item_num: usize, fill: f32) -> ParamServer {
        let ps = ParamServer::new(0.1, 0.0, user_num, item_num, d, 1, Some(1));
        let n = ps.feat_num();
        let mut dst = vec![0.0; n * d];
        ps.fetch_param(&mut dst);
        for g in 0..ps.group_num() {
            let mut delta = vec![0.0; n * d];
            for cell in 0..d {
                delta[g * d + cell] = fill - dst[g * d + cell];
            }
            ps.push_param_group(&mut delta, g);
        }
        ps
    }

    #[test]
    fn sample_too_short_is_rejected() {
        let ps = const_server(2, 1, 1, 0.5);
        let mut w = Worker::new(&ps, 1, 1, Some(1));
        assert_eq!(w.update(1.0, &[0], &ps), 0.0);
    }

    #[test]
    fn out_of_range_user_is_rejected() {
        let ps = const_server(2, 1, 1, 0.5);
        let mut w = Worker::new(&ps, 1, 1, Some(1));
        assert_eq!(w.update(1.0, &[1, 0], &ps), 0.0);
    }

    #[test]
    fn scenario_1_zero_residual_yields_zero_mse_and_noop_push() {
        // D=2, alpha=0.1, l2=0, push=fetch=1, one worker, U constant 0.5.
        let ps = const_server(2, 1, 1, 0.5);
        let mut w = Worker::new(&ps, 1, 1, Some(1));

        let mse = w.update(0.5, &[0, 0], &ps);
        assert!(mse.abs() < 1e-6);

        let mut after = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param(&mut after);
        assert!(after.iter().all(|&v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn scenario_2_single_sample_matches_closed_form() {
        let ps = const_server(2, 1, 1, 0.5);
        let mut w = Worker::new(&ps, 1, 1, Some(1));

        let mse = w.update(1.0, &[0, 0], &ps);
        assert!((mse - 0.25).abs() < 1e-6);

        let mut after = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param(&mut after);
        for v in after {
            assert!((v - 0.525).abs() < 1e-4);
        }
    }

    #[test]
    fn group_size_one_and_larger_agree_single_threaded_at_unit_cadence() {
        // With push_step = fetch_step = 1, every sub-step fetches
        // immediately before use and pushes immediately after, so there is
        // no staleness window for the grouping to change — group size is
        // purely a locking-granularity knob in this regime.
        let d = 3;
        let user_num = 4;
        let item_num = 4;

        let run = |group_size: usize| -> Vec<f32> {
            let ps = ParamServer::new(0.05, 0.01, user_num, item_num, d, group_size, Some(123));
            let mut w = Worker::new(&ps, 1, 1, Some(123));
            for step in 0..20 {
                let u = step % user_num as i64;
                let i = (step * 3) % item_num as i64;
                w.update(0.7, &[u, i], &ps);
            }
            w.push_param(&ps);
            let mut out = vec![0.0; ps.feat_num() * d];
            ps.fetch_param(&mut out);
            out
        };

        let g1 = run(1);
        let g3 = run(3);
        for (a, b) in g1.iter().zip(g3.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn end_of_epoch_flush_zeroes_delta() {
        let ps = const_server(2, 2, 2, 0.5);
        let mut w = Worker::new(&ps, 100, 100, Some(5));
        // push_step huge so nothing auto-flushes mid-epoch
        w.update(0.9, &[0, 0, 1], &ps);
        w.push_param(&ps);
        assert!(w.delta.iter().all(|&v| v == 0.0));
    }
}
