use rayon::prelude::*;

use crate::controller::Controller;
use crate::cost::{CostFunction, DesiredTrajectory};
use crate::error::{PiError, Result};
use crate::policy::{CachingPolicy, PiController};
use crate::rollout::Rollout;
use crate::types::{Input, State, TimeGrid};

/// One stochastic rollout, indexed by time step. The last entry holds the
/// terminal state, the policy's input there and the terminal cost.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub state: Vec<State>,
    pub input: Vec<Input>,
    pub stage_cost: Vec<f64>,
}

impl Sample {
    fn with_capacity(n: usize) -> Self {
        Self {
            state: Vec::with_capacity(n),
            input: Vec::with_capacity(n),
            stage_cost: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.stage_cost.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stage_cost.is_empty()
    }
}

/// Everything a sampling rollout reads but never changes.
pub struct SamplingProblem<'a, R: ?Sized, C: ?Sized> {
    pub rollout: &'a R,
    pub cost: &'a C,
    pub desired: &'a DesiredTrajectory,
    pub grid: &'a TimeGrid,
    pub init_state: &'a State,
}

/// Seed of the generator private to `sample` within one run.
pub fn sample_seed(run_seed: u64, sample: usize) -> u64 {
    run_seed.wrapping_add(sample as u64)
}

/// Runs `num_samples` independent rollouts from `init_state` in parallel.
///
/// Each sample gets its own fork of `policy` and its own cache, so results
/// depend only on `run_seed`, never on scheduling.
pub fn generate_samples<R, C>(
    problem: &SamplingProblem<'_, R, C>,
    policy: &PiController,
    num_samples: usize,
    run_seed: u64,
) -> Result<Vec<Sample>>
where
    R: Rollout + ?Sized,
    C: CostFunction + ?Sized,
{
    (0..num_samples)
        .into_par_iter()
        .map(|s| {
            let policy = policy.fork(sample_seed(run_seed, s));
            let mut caching = CachingPolicy::new(policy, problem.cost, problem.desired, problem.grid.num_steps);
            run_sample(problem, &mut caching)
        })
        .collect()
}

fn run_sample<R, C>(problem: &SamplingProblem<'_, R, C>, caching: &mut CachingPolicy<'_, C>) -> Result<Sample>
where
    R: Rollout + ?Sized,
    C: CostFunction + ?Sized,
{
    let SamplingProblem {
        rollout,
        cost,
        desired,
        grid,
        init_state,
    } = *problem;
    caching.clear();
    let traj = rollout.run(grid.init_time, init_state, grid.final_time, caching)?;

    // 積分器がコントローラを呼んだ回数の確認
    let expected = grid.num_steps - 1;
    if caching.cache().len() != expected {
        return Err(PiError::ControllerCallCount {
            expected,
            got: caching.cache().len(),
        });
    }

    let mut sample = Sample::with_capacity(grid.num_steps);
    for entry in caching.cache() {
        if entry.time >= grid.final_time {
            return Err(PiError::TimeBeyondFinal {
                time: entry.time,
                final_time: grid.final_time,
            });
        }
        sample.state.push(entry.state.clone());
        sample.input.push(entry.input.clone());
        sample.stage_cost.push(entry.stage_cost);
    }

    // 終端
    let x_final = traj.state.last().cloned().ok_or(PiError::EmptyRollout)?;
    let u_final = caching.policy_mut().compute_input(grid.final_time, &x_final)?;
    sample.stage_cost.push(cost.terminal_cost(grid.final_time, &x_final, desired));
    sample.state.push(x_final);
    sample.input.push(u_final);
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::QuadraticCost;
    use crate::dynamics::LinearSystem;
    use crate::rollout::{RolloutTrajectory, TimeTriggeredRollout};
    use crate::settings::{PiSettings, RolloutSettings};

    const COARSE: RolloutSettings = RolloutSettings { min_time_step: 0.1 };

    fn integrator() -> TimeTriggeredRollout<LinearSystem> {
        let sys = LinearSystem::new(na::dmatrix![0.0], na::dmatrix![1.0]);
        TimeTriggeredRollout::new(sys, RolloutSettings { min_time_step: 0.1 })
    }

    fn cost() -> QuadraticCost {
        QuadraticCost::new(
            na::DMatrix::identity(1, 1) * 2.0,
            na::DMatrix::zeros(1, 1),
            na::DMatrix::identity(1, 1) * 2.0,
        )
    }

    fn problem<'a, R: Rollout>(
        rollout: &'a R,
        cost: &'a QuadraticCost,
        desired: &'a DesiredTrajectory,
        grid: &'a TimeGrid,
        init_state: &'a State,
    ) -> SamplingProblem<'a, R, QuadraticCost> {
        SamplingProblem {
            rollout,
            cost,
            desired,
            grid,
            init_state,
        }
    }

    fn policy() -> PiController {
        PiController::new(&PiSettings::new(4, 1.0, na::DMatrix::identity(1, 1)), None, 0).unwrap()
    }

    #[test]
    fn samples_have_full_length_and_terminal_entry() {
        let rollout = integrator();
        let grid = TimeGrid::new(0.0, 1.0, 0.1).unwrap();
        let x0 = na::dvector![1.0];
        let desired = DesiredTrajectory::default();
        let cost = cost();
        let samples = generate_samples(&problem(&rollout, &cost, &desired, &grid, &x0), &policy(), 4, 9).unwrap();

        assert_eq!(samples.len(), 4);
        for sample in &samples {
            assert_eq!(sample.len(), grid.num_steps);
            assert_eq!(sample.state.len(), grid.num_steps);
            assert_eq!(sample.input.len(), grid.num_steps);
            assert_eq!(sample.state[0], x0);
            // 終端コストは x^2
            let x_end = sample.state[grid.last()][0];
            approx::assert_relative_eq!(sample.stage_cost[grid.last()], x_end * x_end, epsilon = 1e-12);
        }
    }

    #[test]
    fn samples_are_reproducible_and_independent() {
        let rollout = integrator();
        let grid = TimeGrid::new(0.0, 0.5, 0.1).unwrap();
        let x0 = na::dvector![0.0];
        let desired = DesiredTrajectory::default();
        let cost = cost();
        let problem = problem(&rollout, &cost, &desired, &grid, &x0);
        let a = generate_samples(&problem, &policy(), 3, 1).unwrap();
        let b = generate_samples(&problem, &policy(), 3, 1).unwrap();
        for (sa, sb) in a.iter().zip(&b) {
            assert_eq!(sa.input, sb.input);
            assert_eq!(sa.stage_cost, sb.stage_cost);
        }
        assert_ne!(a[0].input, a[1].input);
    }

    /// Calls the controller one time too many.
    struct Chatty;

    impl Rollout for Chatty {
        fn settings(&self) -> &RolloutSettings {
            &COARSE
        }
        fn controller_calls(&self, _t0: f64, _tf: f64) -> usize {
            1
        }
        fn run(&self, t0: f64, x0: &State, _tf: f64, controller: &mut dyn Controller) -> Result<RolloutTrajectory> {
            let u = controller.compute_input(t0, x0)?;
            controller.compute_input(t0, x0)?;
            Ok(RolloutTrajectory {
                time: vec![t0],
                events_past_the_end: vec![],
                state: vec![x0.clone()],
                input: vec![u],
            })
        }
    }

    /// Calls the controller at the final time.
    struct Late;

    impl Rollout for Late {
        fn settings(&self) -> &RolloutSettings {
            &COARSE
        }
        fn controller_calls(&self, _t0: f64, _tf: f64) -> usize {
            1
        }
        fn run(&self, _t0: f64, x0: &State, tf: f64, controller: &mut dyn Controller) -> Result<RolloutTrajectory> {
            let u = controller.compute_input(tf, x0)?;
            Ok(RolloutTrajectory {
                time: vec![tf],
                events_past_the_end: vec![],
                state: vec![x0.clone()],
                input: vec![u],
            })
        }
    }

    #[test]
    fn contract_violations_fail_fast() {
        let grid = TimeGrid::new(0.0, 0.1, 0.1).unwrap();
        let x0 = na::dvector![0.0];
        let desired = DesiredTrajectory::default();
        let cost = cost();

        let err = generate_samples(&problem(&Chatty, &cost, &desired, &grid, &x0), &policy(), 2, 0).unwrap_err();
        assert!(matches!(err, PiError::ControllerCallCount { expected: 1, got: 2 }));

        let err = generate_samples(&problem(&Late, &cost, &desired, &grid, &x0), &policy(), 2, 0).unwrap_err();
        assert!(matches!(err, PiError::TimeBeyondFinal { .. }));
    }
}
