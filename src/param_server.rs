//! The authoritative parameter store.
//!
//! `U`'s rows are partitioned into contiguous groups of `group_size` rows,
//! each guarded by its own [`SpinLock`]. A reader or writer of group `g`
//! only ever touches `groups[g]`'s interior `Vec<f32>`, so the borrow
//! checker — rather than a documented convention, as in the C original —
//! enforces that every access to a row goes through its group's lock.
//!
//! Construction is the initialization step: there is no way to obtain a
//! `ParamServer` that hasn't had its matrix allocated and randomly seeded,
//! so the "uninitialized" failure mode spec'd for a C++ two-phase
//! `Initialize()` API doesn't exist here by construction (see DESIGN.md).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::spinlock::SpinLock;

fn calc_group_num(feat_num: usize, group_size: usize) -> usize {
    (feat_num + group_size - 1) / group_size
}

pub struct ParamServer {
    alpha: f32,
    l2: f32,
    d: usize,
    user_num: usize,
    item_num: usize,
    feat_num: usize,
    group_size: usize,
    groups: Vec<SpinLock<Vec<f32>>>,
}

impl ParamServer {
    /// Allocate `U[feat_num][d]`, fill each cell with `uniform(0,1) *
    /// sqrt(1/d)` (small positive-valued factors of magnitude `O(1/sqrt(D))`), and stripe the
    /// rows into `ceil(feat_num / group_size)` independently-locked groups.
    pub fn new(
        alpha: f32,
        l2: f32,
        user_num: usize,
        item_num: usize,
        d: usize,
        group_size: usize,
        seed: Option<u64>,
    ) -> Self {
        let feat_num = user_num + item_num;
        let group_size = group_size.max(1);
        let group_num = if feat_num == 0 {
            0
        } else {
            calc_group_num(feat_num, group_size)
        };

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let scale = if d == 0 { 0.0 } else { (1.0 / d as f32).sqrt() };

        let mut groups = Vec::with_capacity(group_num);
        for g in 0..group_num {
            let start = g * group_size;
            let end = ((g + 1) * group_size).min(feat_num);
            let rows = end - start;
            let mut cells = vec![0.0_f32; rows * d];
            for cell in cells.iter_mut() {
                *cell = rng.gen::<f32>() * scale;
            }
            groups.push(SpinLock::new(cells));
        }

        Self {
            alpha,
            l2,
            d,
            user_num,
            item_num,
            feat_num,
            group_size,
            groups,
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn l2(&self) -> f32 {
        self.l2
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn user_num(&self) -> usize {
        self.user_num
    }

    pub fn item_num(&self) -> usize {
        self.item_num
    }

    pub fn feat_num(&self) -> usize {
        self.feat_num
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    pub fn group_num(&self) -> usize {
        self.groups.len()
    }

    fn group_bounds(&self, g: usize) -> (usize, usize) {
        let start = g * self.group_size;
        let end = ((g + 1) * self.group_size).min(self.feat_num);
        (start, end)
    }

    /// Copy rows `[g*G, min((g+1)*G, F))` into the matching rows of `dst`
    /// (a full `feat_num * d` buffer) under group `g`'s lock.
    pub fn fetch_param_group(&self, dst: &mut [f32], g: usize) {
        let (start, end) = self.group_bounds(g);
        let group = self.groups[g].lock();
        let len = (end - start) * self.d;
        dst[start * self.d..start * self.d + len].copy_from_slice(&group[..len]);
    }

    /// Fetch every group in turn. Not atomic across groups by design — a
    /// reader may observe rows updated between two groups' fetches (spec
    /// §4.2: staleness vs. contention trade-off).
    pub fn fetch_param(&self, dst: &mut [f32]) {
        for g in 0..self.groups.len() {
            self.fetch_param_group(dst, g);
        }
    }

    /// Add `delta`'s rows for group `g` into `U`, then zero them in
    /// `delta` — the push transfers ownership of those updates from the
    /// worker's accumulator to the authoritative matrix.
    pub fn push_param_group(&self, delta: &mut [f32], g: usize) {
        let (start, end) = self.group_bounds(g);
        let mut group = self.groups[g].lock();
        let len = (end - start) * self.d;
        let base = start * self.d;
        for i in 0..len {
            group[i] += delta[base + i];
            delta[base + i] = 0.0;
        }
    }

    /// Write the model file: `U_n`, `I_n`, `D` on
    /// the first three lines, then `F` rows of `D` tab-separated values at
    /// 8 digits of precision.
    pub fn save_model(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "{}", self.user_num)?;
        writeln!(w, "{}", self.item_num)?;
        writeln!(w, "{}", self.d)?;
        for g in 0..self.groups.len() {
            let (start, end) = self.group_bounds(g);
            let group = self.groups[g].lock();
            for r in 0..(end - start) {
                let row = &group[r * self.d..(r + 1) * self.d];
                for (j, v) in row.iter().enumerate() {
                    if j + 1 == row.len() {
                        writeln!(w, "{:.8}", v)?;
                    } else {
                        write!(w, "{:.8}\t", v)?;
                    }
                }
            }
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_fetch_reflects_delta() {
        let ps = ParamServer::new(0.1, 0.0, 1, 1, 2, 1, Some(1));
        let mut dst = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param(&mut dst);

        let mut delta = vec![0.0; ps.feat_num() * ps.d()];
        delta[0] = 0.5;
        delta[1] = -0.25;
        ps.push_param_group(&mut delta, 0);
        assert_eq!(delta[0], 0.0);
        assert_eq!(delta[1], 0.0);

        let mut after = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param(&mut after);
        assert!((after[0] - (dst[0] + 0.5)).abs() < 1e-6);
        assert!((after[1] - (dst[1] - 0.25)).abs() < 1e-6);
    }

    #[test]
    fn fetch_then_push_zero_delta_is_noop() {
        let ps = ParamServer::new(0.1, 0.0, 3, 3, 4, 2, Some(7));
        let mut dst = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param_group(&mut dst, 1);
        let before = dst.clone();

        let mut zero = vec![0.0; ps.feat_num() * ps.d()];
        ps.push_param_group(&mut zero, 1);

        let mut after = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param_group(&mut after, 1);
        assert_eq!(before, after);
    }

    #[test]
    fn partial_tail_group_is_in_bounds() {
        // feat_num=5, group_size=2 -> groups of sizes 2,2,1
        let ps = ParamServer::new(0.1, 0.0, 2, 3, 3, 2, Some(3));
        assert_eq!(ps.group_num(), 3);
        let mut dst = vec![0.0; ps.feat_num() * ps.d()];
        ps.fetch_param_group(&mut dst, 2);
        // last row's cells must be non-default-zero-by-construction (seeded rand)
        assert!(dst[4 * 3..5 * 3].iter().any(|&v| v != 0.0));
    }

    #[test]
    fn zero_feat_num_has_no_groups() {
        let ps = ParamServer::new(0.1, 0.0, 0, 0, 4, 1, Some(9));
        assert_eq!(ps.group_num(), 0);
        assert_eq!(ps.feat_num(), 0);
    }

    #[test]
    fn concurrent_pushes_to_different_groups_sum_exactly() {
        use std::thread;

        let ps = ParamServer::new(0.1, 0.0, 4, 4, 2, 1, Some(42));
        let n = ps.feat_num();
        let d = ps.d();

        let mut initial = vec![0.0; n * d];
        ps.fetch_param(&mut initial);

        thread::scope(|scope| {
            for g in 0..n {
                let ps = &ps;
                scope.spawn(move || {
                    for _ in 0..100 {
                        let mut delta = vec![0.0; n * d];
                        delta[g * d] = 1.0;
                        ps.push_param_group(&mut delta, g);
                    }
                });
            }
        });

        let mut out = vec![0.0; n * d];
        ps.fetch_param(&mut out);
        for g in 0..n {
            assert!((out[g * d] - (initial[g * d] + 100.0)).abs() < 1e-3);
        }
    }
}
