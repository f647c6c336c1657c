use crate::error::{PiError, Result};
use crate::policy::PiController;

pub type State = na::DVector<f64>;
pub type Input = na::DVector<f64>;

/// Equally spaced solve grid `init_time + n * time_step`, `n < num_steps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeGrid {
    pub init_time: f64,
    pub final_time: f64,
    pub time_step: f64,
    pub num_steps: usize,
}

impl TimeGrid {
    pub fn new(init_time: f64, final_time: f64, time_step: f64) -> Result<Self> {
        if !(final_time > init_time) {
            return Err(PiError::InvalidHorizon {
                init_time,
                final_time,
            });
        }
        let intervals = ((final_time - init_time) / time_step).round();
        // usize::MAX as f64 は 2^64 に丸められる
        let num_steps = if intervals.is_finite() && intervals >= 0.0 && intervals < usize::MAX as f64 {
            (intervals as usize).checked_add(1)
        } else {
            None
        };
        let Some(num_steps) = num_steps else {
            return Err(PiError::InvalidHorizon {
                init_time,
                final_time,
            });
        };
        Ok(Self {
            init_time,
            final_time,
            time_step,
            num_steps,
        })
    }

    pub fn last(&self) -> usize {
        self.num_steps - 1
    }

    pub fn time(&self, n: usize) -> f64 {
        self.init_time + n as f64 * self.time_step
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.num_steps).map(|n| self.time(n)).collect()
    }
}

/// One controller invocation recorded during a sampling rollout.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub time: f64,
    pub state: State,
    pub input: Input,
    pub stage_cost: f64,
}

/// Whether a previous `run` left a usable nominal trajectory behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriorSolution {
    #[default]
    NoPriorSolution,
    HasPriorSolution,
}

/// Outcome of [`PiSolver::run`](crate::solver::PiSolver::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Complete,
    /// First-ever run hit an all-infinite cost-to-go; inputs before
    /// `degenerate_step` were never computed.
    Partial { degenerate_step: usize },
    /// Warm-started run hit an all-infinite cost-to-go and was aborted.
    KeptPrevious { degenerate_step: usize },
}

#[derive(Debug, Clone)]
pub struct NominalTrajectory {
    pub time: Vec<f64>,
    pub state: Vec<State>,
    pub input: Vec<Input>,
    pub controller: PiController,
    /// Set when `input[..degenerate_step]` holds zero placeholders instead of
    /// optimized values.
    pub degenerate_step: Option<usize>,
}

impl NominalTrajectory {
    pub fn is_partial(&self) -> bool {
        self.degenerate_step.is_some()
    }
}
