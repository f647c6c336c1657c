use crate::controller::Controller;
use crate::dynamics::Dynamics;
use crate::error::{PiError, Result};
use crate::settings::RolloutSettings;
use crate::types::{Input, State};

#[derive(Debug, Clone, Default)]
pub struct RolloutTrajectory {
    pub time: Vec<f64>,
    /// Index of the first sample after each discrete jump.
    pub events_past_the_end: Vec<usize>,
    pub state: Vec<State>,
    pub input: Vec<Input>,
}

/// Forward simulation under a controller.
///
/// `controller_calls(t0, tf)` states exactly how many times `run` will invoke
/// the controller; every invocation happens at a time in `[t0, tf)`.
pub trait Rollout: Sync {
    fn settings(&self) -> &RolloutSettings;

    fn controller_calls(&self, t0: f64, tf: f64) -> usize;

    fn run(&self, t0: f64, x0: &State, tf: f64, controller: &mut dyn Controller) -> Result<RolloutTrajectory>;
}

/// Explicit Euler on a fixed grid `t0 + k * min_time_step`, with jumps applied
/// at the given event times.
#[derive(Debug, Clone)]
pub struct TimeTriggeredRollout<D: Dynamics> {
    dynamics: D,
    settings: RolloutSettings,
    event_times: Vec<f64>,
}

impl<D: Dynamics> TimeTriggeredRollout<D> {
    pub fn new(dynamics: D, settings: RolloutSettings) -> Self {
        Self {
            dynamics,
            settings,
            event_times: Vec::new(),
        }
    }

    pub fn with_event_times(mut self, mut event_times: Vec<f64>) -> Self {
        event_times.sort_by(f64::total_cmp);
        self.event_times = event_times;
        self
    }

    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }
}

impl<D: Dynamics> Rollout for TimeTriggeredRollout<D> {
    fn settings(&self) -> &RolloutSettings {
        &self.settings
    }

    fn controller_calls(&self, t0: f64, tf: f64) -> usize {
        ((tf - t0) / self.settings.min_time_step).round().max(0.0) as usize
    }

    fn run(&self, t0: f64, x0: &State, tf: f64, controller: &mut dyn Controller) -> Result<RolloutTrajectory> {
        if !(tf > t0) {
            return Err(PiError::InvalidHorizon {
                init_time: t0,
                final_time: tf,
            });
        }
        let state_dim = self.dynamics.state_dim();
        let input_dim = self.dynamics.input_dim();
        if x0.len() != state_dim {
            return Err(PiError::DimensionMismatch {
                what: "rollout initial state",
                expected: state_dim,
                got: x0.len(),
            });
        }

        let steps = self.controller_calls(t0, tf);
        let dt = self.settings.min_time_step;
        let mut traj = RolloutTrajectory {
            time: Vec::with_capacity(steps + 1),
            events_past_the_end: Vec::new(),
            state: Vec::with_capacity(steps + 1),
            input: Vec::with_capacity(steps + 1),
        };

        let mut x = x0.clone();
        for k in 0..steps {
            let t = t0 + k as f64 * dt;
            // 最終ステップは tf に合わせる
            let t_next = if k + 1 == steps { tf } else { t0 + (k + 1) as f64 * dt };

            let u = controller.compute_input(t, &x)?;
            if u.len() != input_dim {
                return Err(PiError::DimensionMismatch {
                    what: "controller output",
                    expected: input_dim,
                    got: u.len(),
                });
            }

            let dx = self.dynamics.flow_map(t, &x, &u);
            traj.time.push(t);
            traj.state.push(x.clone());
            traj.input.push(u);
            x += dx * (t_next - t);

            for &te in self.event_times.iter().filter(|&&te| te > t && te <= t_next) {
                x = self.dynamics.jump_map(te, &x);
                traj.events_past_the_end.push(traj.time.len());
            }
        }

        let u_final = traj.input.last().cloned().unwrap_or_else(|| Input::zeros(input_dim));
        traj.time.push(tf);
        traj.state.push(x);
        traj.input.push(u_final);
        Ok(traj)
    }
}
