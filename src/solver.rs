use std::sync::Arc;

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::backward::{backward_pass, BackwardPass};
use crate::constraint::StateInputConstraint;
use crate::controller::FeedforwardController;
use crate::cost::{CostFunction, DesiredTrajectory};
use crate::error::{PiError, Result};
use crate::policy::PiController;
use crate::rollout::Rollout;
use crate::sampler::{generate_samples, Sample, SamplingProblem};
use crate::settings::PiSettings;
use crate::types::{Input, NominalTrajectory, PriorSolution, SolveStatus, State, TimeGrid};

/// Path integral (MPPI-type) trajectory optimizer.
///
/// Every [`run`](Self::run) samples `num_samples` noisy rollouts around the
/// previous nominal input, averages their inputs per time step with
/// cost-to-go based importance weights, and re-rolls the averaged input
/// without noise to get the nominal trajectory. Not reentrant.
pub struct PiSolver<R: Rollout, C: CostFunction> {
    settings: PiSettings,
    rollout: R,
    cost: C,
    policy: PiController,
    seed: u64,
    seed_rng: Xoshiro256PlusPlus,
    num_iterations: usize,
    prior: PriorSolution,
    desired: DesiredTrajectory,
    desired_buffer: Option<DesiredTrajectory>,
    nominal: Option<NominalTrajectory>,
}

impl<R: Rollout, C: CostFunction> PiSolver<R, C> {
    pub fn new(
        rollout: R,
        cost: C,
        constraint: Option<Arc<dyn StateInputConstraint>>,
        settings: PiSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let rollout_dt = rollout.settings().min_time_step;
        if rollout_dt != settings.rollout.min_time_step {
            log::warn!(
                "rollout time step {rollout_dt} differs from solver time step {}",
                settings.rollout.min_time_step
            );
        }
        let seed = settings.seed.unwrap_or_else(|| rand::thread_rng().gen());
        log::info!("setting random seed to controller: {seed}");
        let policy = PiController::new(&settings, constraint, seed)?;
        Ok(Self {
            settings,
            rollout,
            cost,
            policy,
            seed,
            seed_rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            num_iterations: 0,
            prior: PriorSolution::NoPriorSolution,
            desired: DesiredTrajectory::default(),
            desired_buffer: None,
            nominal: None,
        })
    }

    /// Back to the state right after construction.
    pub fn reset(&mut self) {
        self.desired.clear();
        self.desired_buffer = None;
        self.nominal = None;
        self.num_iterations = 0;
        self.prior = PriorSolution::NoPriorSolution;
        self.policy.set_bias(None);
        self.policy.set_gamma(self.settings.gamma);
        self.seed_rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
    }

    /// Takes effect at the start of the next `run`.
    pub fn set_desired_trajectory(&mut self, desired: DesiredTrajectory) {
        self.desired_buffer = Some(desired);
    }

    pub fn run(&mut self, init_time: f64, init_state: &State, final_time: f64) -> Result<SolveStatus> {
        let grid = TimeGrid::new(init_time, final_time, self.settings.rollout.min_time_step)?;

        // ロールアウトの呼び出し回数の契約を先に確認
        let expected = grid.num_steps - 1;
        let calls = self.rollout.controller_calls(init_time, final_time);
        if calls != expected {
            return Err(PiError::ControllerCallCount { expected, got: calls });
        }

        self.num_iterations += 1;
        if let Some(desired) = self.desired_buffer.take() {
            self.desired = desired;
        }

        // MARK: - forward rollouts
        let run_seed = self.seed_rng.next_u64();
        let problem = SamplingProblem {
            rollout: &self.rollout,
            cost: &self.cost,
            desired: &self.desired,
            grid: &grid,
            init_state,
        };
        let samples = generate_samples(&problem, &self.policy, self.settings.num_samples, run_seed)?;

        // MARK: - backward pass
        let pass = backward_pass(&samples, self.settings.gamma)?;
        let status = match (pass.degenerate_step, self.prior) {
            (None, _) => SolveStatus::Complete,
            (Some(step), PriorSolution::HasPriorSolution) => {
                log::error!("cost-to-go in step {step} is infinite for all samples, keeping previous solution");
                return Ok(SolveStatus::KeptPrevious { degenerate_step: step });
            }
            (Some(step), PriorSolution::NoPriorSolution) => {
                log::error!(
                    "cost-to-go in step {step} is infinite for all samples, inputs before it are left at zero"
                );
                SolveStatus::Partial { degenerate_step: step }
            }
        };

        // MARK: - nominal trajectory
        let nominal = self.assemble(&grid, init_state, &pass)?;
        if self.settings.debug_print > 0 {
            self.print_debug(&grid, init_state, &samples, &pass, &nominal);
        }
        self.nominal = Some(nominal);
        self.prior = PriorSolution::HasPriorSolution;
        Ok(status)
    }

    /// Re-rolls `u_opt` without noise. The resulting feedforward also biases
    /// the next run's sampling.
    fn assemble(&mut self, grid: &TimeGrid, init_state: &State, pass: &BackwardPass) -> Result<NominalTrajectory> {
        let time = grid.times();
        let feedforward = FeedforwardController::new(time.clone(), pass.u_opt.clone())?;

        let mut policy = self.policy.clone();
        policy.set_bias(Some(feedforward));
        policy.set_gamma(0.0);
        let traj = self.rollout.run(grid.init_time, init_state, grid.final_time, &mut policy)?;
        let controller = policy.clone();

        // 次回のサンプリング用に温度を戻す
        policy.set_gamma(self.settings.gamma);
        self.policy = policy;

        Ok(NominalTrajectory {
            time,
            state: traj.state,
            input: pass.u_opt.clone(),
            controller,
            degenerate_step: pass.degenerate_step,
        })
    }

    fn print_debug(
        &self,
        grid: &TimeGrid,
        init_state: &State,
        samples: &[Sample],
        pass: &BackwardPass,
        nominal: &NominalTrajectory,
    ) {
        let level = self.settings.debug_print;
        log::info!("++++++++++++++++ debug print iteration {} ++++++++++++++++", self.num_iterations);
        log::info!("mpc init state: {:?}", init_state.as_slice());
        log::info!("after softmax: u_opt[0] = {:?}", nominal.input[0].as_slice());

        if level > 1 {
            for (s, sample) in samples.iter().enumerate() {
                log::debug!(
                    "sample {s} init noisy input {:?} init cost-to-go {}",
                    sample.input[0].as_slice(),
                    pass.cost_to_go[[s, 0]]
                );
            }
            for x in &nominal.state {
                log::debug!("predicted state {:?}", x.as_slice());
            }
        }

        if level > 2 {
            for (s, sample) in samples.iter().enumerate() {
                log::trace!("+++ sample #{s} +++");
                log::trace!("{:>11} {:>12} state / input", "time", "cost-to-go");
                for n in 0..grid.num_steps {
                    log::trace!(
                        "{:>11.3e} {:>12.3e} {:?} {:?}",
                        grid.time(n),
                        pass.cost_to_go[[s, n]],
                        sample.state[n].as_slice(),
                        sample.input[n].as_slice()
                    );
                }
            }
        }
    }

    pub fn settings(&self) -> &PiSettings {
        &self.settings
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn prior_solution(&self) -> PriorSolution {
        self.prior
    }

    pub fn desired_trajectory(&self) -> &DesiredTrajectory {
        &self.desired
    }

    pub fn nominal_trajectory(&self) -> Option<&NominalTrajectory> {
        self.nominal.as_ref()
    }

    pub fn time_trajectory(&self) -> &[f64] {
        self.nominal.as_ref().map(|n| n.time.as_slice()).unwrap_or_default()
    }

    pub fn state_trajectory(&self) -> &[State] {
        self.nominal.as_ref().map(|n| n.state.as_slice()).unwrap_or_default()
    }

    pub fn input_trajectory(&self) -> &[Input] {
        self.nominal.as_ref().map(|n| n.input.as_slice()).unwrap_or_default()
    }

    /// Deterministic (zero temperature) policy for execution.
    pub fn controller(&self) -> Option<&PiController> {
        self.nominal.as_ref().map(|n| &n.controller)
    }

    /// Sampling policy used by the next `run`.
    pub fn sampling_policy(&self) -> &PiController {
        &self.policy
    }

    pub fn rollout(&self) -> &R {
        &self.rollout
    }

    pub fn cost(&self) -> &C {
        &self.cost
    }
}
