//! Loads a saved model file and scores samples against it — the
//! predictor side, symmetric with the trainer's scoring
//! function by construction (both read `U_local[u]·U_local[i]`).

use std::fs;
use std::path::Path;

use crate::error::{MfError, Result};
use crate::sample::Sample;

pub struct Model {
    user_num: usize,
    item_num: usize,
    d: usize,
    u: Vec<f32>,
}

impl Model {
    /// Parse the format `ParamServer::save_model` writes: `U_n`, `I_n`,
    /// `D` on the first three lines, then `F` rows of `D` tab-separated
    /// values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            MfError::Configuration(format!("cannot read model {}: {e}", path.display()))
        })?;
        let mut lines = text.lines();

        let parse_header = |lines: &mut std::str::Lines, what: &str| -> Result<usize> {
            lines
                .next()
                .ok_or_else(|| MfError::Configuration(format!("model file missing {what}")))?
                .trim()
                .parse::<usize>()
                .map_err(|_| MfError::Configuration(format!("model {what} is not an integer")))
        };

        let user_num = parse_header(&mut lines, "user_num")?;
        let item_num = parse_header(&mut lines, "item_num")?;
        let d = parse_header(&mut lines, "latent dimension")?;
        let feat_num = user_num + item_num;

        let mut u = Vec::with_capacity(feat_num * d);
        for (row_idx, line) in lines.enumerate() {
            if row_idx >= feat_num {
                break;
            }
            let values: Vec<f32> = line
                .split('\t')
                .map(|tok| {
                    tok.trim().parse::<f32>().map_err(|_| {
                        MfError::Configuration(format!("model row {row_idx} has non-numeric cell"))
                    })
                })
                .collect::<Result<_>>()?;
            if values.len() != d {
                return Err(MfError::Configuration(format!(
                    "model row {row_idx} has {} columns, expected {d}",
                    values.len()
                )));
            }
            u.extend(values);
        }
        if u.len() != feat_num * d {
            return Err(MfError::Configuration(
                "model file has fewer rows than declared".into(),
            ));
        }

        Ok(Self {
            user_num,
            item_num,
            d,
            u,
        })
    }

    pub fn user_num(&self) -> usize {
        self.user_num
    }

    pub fn item_num(&self) -> usize {
        self.item_num
    }

    pub fn d(&self) -> usize {
        self.d
    }

    /// `p_k = Σ_d U[u][d] * U[U_n + i_k][d]` for each item, skipping any
    /// `i_k` with `U_n + i_k >= F`; returns the mean of `(p_k - score)^2`
    /// (the predictor contract).
    pub fn predict(&self, sample: &Sample) -> f32 {
        if sample.x.len() < 2 {
            return 0.0;
        }
        let user = sample.x[0];
        if user < 0 || user as usize >= self.user_num {
            return 0.0;
        }
        let user_row = user as usize * self.d;
        let feat_num = self.user_num + self.item_num;

        let mut sse = 0.0_f32;
        for &raw_item in &sample.x[1..] {
            if raw_item < 0 {
                continue;
            }
            let item = self.user_num + raw_item as usize;
            if item >= feat_num {
                continue;
            }
            let item_row = item * self.d;
            let mut p = 0.0_f32;
            for d in 0..self.d {
                p += self.u[user_row + d] * self.u[item_row + d];
            }
            let e = p - sample.score;
            sse += e * e;
        }
        sse / (sample.x.len() - 1) as f32
    }
}
