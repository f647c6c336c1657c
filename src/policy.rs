use std::sync::Arc;

use optimization_engine::constraints::{Constraint, Rectangle};
use rand::prelude::*;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::constraint::StateInputConstraint;
use crate::controller::{Controller, FeedforwardController};
use crate::cost::{CostFunction, DesiredTrajectory};
use crate::error::{PiError, Result};
use crate::settings::{InputBounds, PiSettings};
use crate::types::{CacheEntry, Input, State};

const PINV_EPS: f64 = 1e-10;

/// Stochastic sampling policy of the path integral solver.
///
/// `u = u_bias + sqrt(gamma) * L * z` with `L L' = noise_covariance` and
/// `z ~ N(0, I)`, clipped to the input bounds and then corrected onto
/// `C x + D u + e = 0`. With `gamma == 0` no noise is drawn and the policy is
/// a deterministic feedforward, which is what the solver hands out as its
/// deployable controller.
#[derive(Debug, Clone)]
pub struct PiController {
    bias: Option<FeedforwardController>,
    input_dim: usize,
    noise_factor: na::DMatrix<f64>,
    gamma: f64,
    rng: Xoshiro256PlusPlus,
    constraint: Option<Arc<dyn StateInputConstraint>>,
    bounds: Option<InputBounds>,
}

impl PiController {
    pub fn new(
        settings: &PiSettings,
        constraint: Option<Arc<dyn StateInputConstraint>>,
        seed: u64,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            bias: None,
            input_dim: settings.input_dim(),
            noise_factor: matrix_sqrt(&settings.noise_covariance),
            gamma: settings.gamma,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            constraint,
            bounds: settings.input_bounds.clone(),
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn set_gamma(&mut self, gamma: f64) {
        self.gamma = gamma;
    }

    pub fn bias(&self) -> Option<&FeedforwardController> {
        self.bias.as_ref()
    }

    pub fn set_bias(&mut self, bias: Option<FeedforwardController>) {
        self.bias = bias;
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    }

    /// Copy of this policy drawing from its own generator.
    pub fn fork(&self, seed: u64) -> Self {
        let mut policy = self.clone();
        policy.reseed(seed);
        policy
    }

    fn nominal_input(&self, t: f64) -> Result<Input> {
        let u = match &self.bias {
            Some(ff) => ff.input_at(t),
            None => Input::zeros(self.input_dim),
        };
        if u.len() != self.input_dim {
            return Err(PiError::DimensionMismatch {
                what: "sampling policy bias input",
                expected: self.input_dim,
                got: u.len(),
            });
        }
        Ok(u)
    }

    fn project_constraint(&self, t: f64, x: &State, u: &mut Input) -> Result<()> {
        let Some(constraint) = &self.constraint else {
            return Ok(());
        };
        let m = constraint.num_constraints(t);
        if m == 0 {
            return Ok(());
        }
        let a = constraint.affine(t, x);
        if a.d.nrows() != m || a.c.nrows() != m || a.e.len() != m {
            return Err(PiError::DimensionMismatch {
                what: "affine constraint rows",
                expected: m,
                got: a.d.nrows().min(a.c.nrows()).min(a.e.len()),
            });
        }
        if a.d.ncols() != self.input_dim || a.c.ncols() != x.len() {
            return Err(PiError::DimensionMismatch {
                what: "affine constraint columns",
                expected: self.input_dim,
                got: a.d.ncols(),
            });
        }
        // 最小ノルム補正: u <- u - D^+ (C x + D u + e)
        let residual = &a.c * x + &a.d * &*u + &a.e;
        let d_pinv = a.d.pseudo_inverse(PINV_EPS).map_err(PiError::Numerical)?;
        *u -= d_pinv * residual;
        Ok(())
    }
}

impl Controller for PiController {
    fn compute_input(&mut self, t: f64, x: &State) -> Result<Input> {
        let mut u = self.nominal_input(t)?;

        if self.gamma > 0.0 {
            let z = Input::from_fn(self.input_dim, |_, _| self.rng.sample(StandardNormal));
            u += self.gamma.sqrt() * (&self.noise_factor * z);
        }

        if let Some(bounds) = &self.bounds {
            let rect = Rectangle::new(Some(bounds.lower.as_slice()), Some(bounds.upper.as_slice()));
            rect.project(u.as_mut_slice());
        }

        self.project_constraint(t, x, &mut u)?;
        Ok(u)
    }
}

/// Symmetric square root of a positive semi-definite matrix. Negative
/// eigenvalues from round-off are treated as zero.
fn matrix_sqrt(cov: &na::DMatrix<f64>) -> na::DMatrix<f64> {
    if cov.nrows() == 0 {
        return cov.clone();
    }
    let eigen = cov.clone().symmetric_eigen();
    let sqrt_values = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    &eigen.eigenvectors * na::DMatrix::from_diagonal(&sqrt_values) * eigen.eigenvectors.transpose()
}

/// Wraps a [`PiController`] for one sampling rollout and records every
/// invocation together with its stage cost.
pub struct CachingPolicy<'a, C: CostFunction + ?Sized> {
    policy: PiController,
    cost: &'a C,
    desired: &'a DesiredTrajectory,
    cache: Vec<CacheEntry>,
}

impl<'a, C: CostFunction + ?Sized> CachingPolicy<'a, C> {
    pub fn new(policy: PiController, cost: &'a C, desired: &'a DesiredTrajectory, capacity: usize) -> Self {
        Self {
            policy,
            cost,
            desired,
            cache: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &[CacheEntry] {
        &self.cache
    }

    /// Underlying policy, bypassing the cache.
    pub fn policy_mut(&mut self) -> &mut PiController {
        &mut self.policy
    }
}

impl<C: CostFunction + ?Sized> Controller for CachingPolicy<'_, C> {
    fn compute_input(&mut self, t: f64, x: &State) -> Result<Input> {
        let u = self.policy.compute_input(t, x)?;
        let stage_cost = self.cost.stage_cost(t, x, &u, self.desired);
        self.cache.push(CacheEntry {
            time: t,
            state: x.clone(),
            input: u.clone(),
            stage_cost,
        });
        Ok(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{AffineConstraint, LinearConstraint};
    use crate::cost::QuadraticCost;
    use approx::assert_relative_eq;

    fn settings(cov: na::DMatrix<f64>) -> PiSettings {
        PiSettings::new(10, 1.0, cov)
    }

    #[test]
    fn zero_gamma_is_deterministic_feedforward() {
        let mut policy = PiController::new(&settings(na::DMatrix::identity(1, 1)), None, 7).unwrap();
        policy.set_bias(Some(
            FeedforwardController::new(vec![0.0, 1.0], vec![na::dvector![1.0], na::dvector![3.0]]).unwrap(),
        ));
        policy.set_gamma(0.0);
        let x = na::dvector![0.0];
        for _ in 0..5 {
            assert_relative_eq!(policy.compute_input(0.5, &x).unwrap()[0], 2.0);
        }
    }

    #[test]
    fn same_seed_same_noise() {
        let s = settings(na::DMatrix::identity(2, 2));
        let mut a = PiController::new(&s, None, 42).unwrap();
        let mut b = a.fork(42);
        let mut c = a.fork(43);
        let x = na::dvector![0.0];
        let ua = a.compute_input(0.0, &x).unwrap();
        assert_eq!(ua, b.compute_input(0.0, &x).unwrap());
        assert_ne!(ua, c.compute_input(0.0, &x).unwrap());
    }

    #[test]
    fn zero_covariance_draws_nothing() {
        let mut policy = PiController::new(&settings(na::DMatrix::zeros(2, 2)), None, 1).unwrap();
        let u = policy.compute_input(0.0, &na::dvector![1.0]).unwrap();
        assert_eq!(u, na::dvector![0.0, 0.0]);
    }

    #[test]
    fn bounds_clip_samples() {
        let mut s = settings(na::DMatrix::identity(1, 1) * 100.0);
        s.input_bounds = Some(InputBounds::new(na::dvector![-0.5], na::dvector![0.5]));
        let mut policy = PiController::new(&s, None, 3).unwrap();
        for i in 0..50 {
            let u = policy.compute_input(i as f64, &na::dvector![0.0]).unwrap();
            assert!(u[0].abs() <= 0.5);
        }
    }

    #[test]
    fn constraint_holds_exactly_under_noise() {
        // x0 + u0 + u1 - 1 = 0
        let constraint = LinearConstraint::new(
            na::dmatrix![1.0, 0.0],
            na::dmatrix![1.0, 1.0],
            na::dvector![-1.0],
        );
        let s = settings(na::DMatrix::identity(2, 2));
        let mut policy = PiController::new(&s, Some(Arc::new(constraint)), 11).unwrap();
        let x = na::dvector![0.25, -3.0];
        for i in 0..20 {
            let u = policy.compute_input(i as f64 * 0.1, &x).unwrap();
            assert_relative_eq!(x[0] + u[0] + u[1] - 1.0, 0.0, epsilon = 1e-12);
        }
    }

    /// Reports one constraint but returns two rows.
    #[derive(Debug)]
    struct Miscounted;

    impl StateInputConstraint for Miscounted {
        fn num_constraints(&self, _t: f64) -> usize {
            1
        }

        fn affine(&self, _t: f64, _x: &State) -> AffineConstraint {
            AffineConstraint {
                c: na::DMatrix::zeros(2, 1),
                d: na::DMatrix::identity(2, 1),
                e: na::DVector::zeros(2),
            }
        }
    }

    /// Active only for `t >= 1`, fixing `u = 0` there.
    #[derive(Debug)]
    struct Switched;

    impl StateInputConstraint for Switched {
        fn num_constraints(&self, t: f64) -> usize {
            usize::from(t >= 1.0)
        }

        fn affine(&self, _t: f64, _x: &State) -> AffineConstraint {
            AffineConstraint {
                c: na::DMatrix::zeros(1, 1),
                d: na::DMatrix::identity(1, 1),
                e: na::DVector::zeros(1),
            }
        }
    }

    #[test]
    fn constraint_rows_follow_num_constraints() {
        let s = settings(na::DMatrix::identity(1, 1));
        let x = na::dvector![0.0];

        let mut policy = PiController::new(&s, Some(Arc::new(Miscounted)), 2).unwrap();
        assert!(matches!(
            policy.compute_input(0.0, &x),
            Err(PiError::DimensionMismatch { expected: 1, .. })
        ));

        let mut policy = PiController::new(&s, Some(Arc::new(Switched)), 2).unwrap();
        assert_ne!(policy.compute_input(0.5, &x).unwrap()[0], 0.0);
        assert_relative_eq!(policy.compute_input(1.5, &x).unwrap()[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn caching_policy_records_stage_cost() {
        let cost = QuadraticCost::new(
            na::DMatrix::identity(1, 1),
            na::DMatrix::zeros(1, 1),
            na::DMatrix::identity(1, 1),
        );
        let desired = DesiredTrajectory::default();
        let mut policy = PiController::new(&settings(na::DMatrix::identity(1, 1)), None, 5).unwrap();
        policy.set_gamma(0.0);
        let mut caching = CachingPolicy::new(policy, &cost, &desired, 4);
        caching.compute_input(0.0, &na::dvector![2.0]).unwrap();
        caching.compute_input(0.1, &na::dvector![4.0]).unwrap();

        let cache = caching.cache();
        assert_eq!(cache.len(), 2);
        assert_relative_eq!(cache[0].stage_cost, 2.0);
        assert_relative_eq!(cache[1].stage_cost, 8.0);
        assert_relative_eq!(cache[1].time, 0.1);

        caching.clear();
        assert!(caching.cache().is_empty());
    }
}
