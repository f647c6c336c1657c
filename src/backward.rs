use ndarray::Array2;
use rayon::prelude::*;

use crate::error::{PiError, Result};
use crate::sampler::Sample;
use crate::types::Input;

/// `psi / num_samples` below this means fewer than ~1% of samples matter.
pub const LOW_SAMPLE_RATIO: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct BackwardPass {
    /// J[[sample, step]]
    pub cost_to_go: Array2<f64>,
    /// Sum of the min-max normalized weights per step (not divided by the
    /// sample count).
    pub psi_distorted: Vec<f64>,
    pub u_opt: Vec<Input>,
    /// Step at which every sample's cost-to-go was non-finite. Steps below it
    /// were never computed and hold zeros.
    pub degenerate_step: Option<usize>,
}

impl BackwardPass {
    pub fn is_complete(&self) -> bool {
        self.degenerate_step.is_none()
    }
}

/// Smallest and largest finite value, `None` if there is none.
pub fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Stabilized weights `exp(-(J - minJ) / (maxJ - minJ) / gamma)`.
///
/// The best sample always gets weight 1. Non-finite cost-to-go gets weight 0;
/// when every finite cost-to-go is equal, every finite sample gets weight 1.
/// Returns `None` when no cost-to-go is finite.
pub fn importance_weights(cost_to_go: &[f64], gamma: f64) -> Option<Vec<f64>> {
    let (min_j, max_j) = finite_range(cost_to_go)?;
    let range = max_j - min_j;
    let weights = cost_to_go
        .par_iter()
        .map(|&j| {
            if !j.is_finite() {
                0.0
            } else if range > 0.0 {
                (-(j - min_j) / range / gamma).exp()
            } else {
                1.0
            }
        })
        .collect();
    Some(weights)
}

/// Path integral recursion from the terminal step back to step 0.
///
/// The last entry of every sample's `stage_cost` is its terminal cost. Stops
/// at the first step (counting backward) where no sample has a finite
/// cost-to-go and reports it in `degenerate_step`.
pub fn backward_pass(samples: &[Sample], gamma: f64) -> Result<BackwardPass> {
    let num_samples = samples.len();
    let num_steps = samples.first().map_or(0, Sample::len);
    if num_samples == 0 || num_steps == 0 {
        return Err(PiError::DimensionMismatch {
            what: "backward pass samples",
            expected: 1,
            got: 0,
        });
    }
    if let Some(bad) = samples
        .iter()
        .find(|s| s.stage_cost.len() != num_steps || s.input.len() != num_steps)
    {
        return Err(PiError::DimensionMismatch {
            what: "sample length",
            expected: num_steps,
            got: bad.stage_cost.len().min(bad.input.len()),
        });
    }
    let input_dim = samples[0].input[0].len();

    let mut cost_to_go = Array2::<f64>::zeros((num_samples, num_steps));
    let mut psi_distorted = vec![0.0; num_steps];
    let mut u_opt = vec![Input::zeros(input_dim); num_steps];
    let mut degenerate_step = None;

    let last = num_steps - 1;
    for n in (0..num_steps).rev() {
        // J[s][n] = J[s][n+1] + L[s][n]
        for (s, sample) in samples.iter().enumerate() {
            cost_to_go[[s, n]] = if n == last {
                sample.stage_cost[n]
            } else {
                cost_to_go[[s, n + 1]] + sample.stage_cost[n]
            };
        }

        let column = cost_to_go.column(n).to_vec();
        let Some(weights) = importance_weights(&column, gamma) else {
            degenerate_step = Some(n);
            break;
        };

        psi_distorted[n] = weights.iter().sum();
        if psi_distorted[n] / (num_samples as f64) < LOW_SAMPLE_RATIO {
            log::warn!("less than ~1% of samples are significant in step {n}");
        }

        // 重み付き平均
        let mut u = Input::zeros(input_dim);
        for (w, sample) in weights.iter().zip(samples) {
            if sample.input[n].len() != input_dim {
                return Err(PiError::DimensionMismatch {
                    what: "sample input",
                    expected: input_dim,
                    got: sample.input[n].len(),
                });
            }
            if *w > 0.0 {
                u.axpy(*w, &sample.input[n], 1.0);
            }
        }
        u_opt[n] = u / psi_distorted[n];
    }

    Ok(BackwardPass {
        cost_to_go,
        psi_distorted,
        u_opt,
        degenerate_step,
    })
}
