use crate::error::SettingsError;

#[derive(Debug, Clone, Copy)]
pub struct RolloutSettings {
    /// 積分の刻み幅 [s]
    pub min_time_step: f64,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            min_time_step: 1e-2,
        }
    }
}

/// Box limits applied to every sampled input.
#[derive(Debug, Clone)]
pub struct InputBounds {
    pub lower: na::DVector<f64>,
    pub upper: na::DVector<f64>,
}

impl InputBounds {
    pub fn new(lower: na::DVector<f64>, upper: na::DVector<f64>) -> Self {
        Self { lower, upper }
    }
}

/// Path integral solver settings. Immutable once handed to the solver.
#[derive(Debug, Clone)]
pub struct PiSettings {
    pub num_samples: usize,
    /// 温度パラメータ
    pub gamma: f64,
    /// 0: silent, 1: iteration summary, 2: per-sample initial values, 3: full tables
    pub debug_print: u8,
    pub rollout: RolloutSettings,
    /// Covariance of the input perturbation at `gamma == 1`.
    pub noise_covariance: na::DMatrix<f64>,
    pub input_bounds: Option<InputBounds>,
    /// `None` draws a fresh seed at construction.
    pub seed: Option<u64>,
}

impl PiSettings {
    pub fn new(num_samples: usize, gamma: f64, noise_covariance: na::DMatrix<f64>) -> Self {
        Self {
            num_samples,
            gamma,
            noise_covariance,
            ..Default::default()
        }
    }

    pub fn input_dim(&self) -> usize {
        self.noise_covariance.nrows()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.num_samples == 0 {
            return Err(SettingsError::NoSamples);
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(SettingsError::InvalidGamma(self.gamma));
        }
        let dt = self.rollout.min_time_step;
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SettingsError::InvalidTimeStep(dt));
        }

        let cov = &self.noise_covariance;
        if !cov.is_square() {
            return Err(SettingsError::CovarianceNotSquare {
                rows: cov.nrows(),
                cols: cov.ncols(),
            });
        }
        let scale = cov.amax().max(1.0);
        if (cov - cov.transpose()).amax() > 1e-9 * scale {
            return Err(SettingsError::CovarianceNotPsd);
        }
        if cov.nrows() > 0 {
            let eigen = cov.clone().symmetric_eigen();
            if eigen.eigenvalues.min() < -1e-9 * scale {
                return Err(SettingsError::CovarianceNotPsd);
            }
        }

        if let Some(bounds) = &self.input_bounds {
            if bounds.lower.len() != bounds.upper.len() || bounds.lower.len() != cov.nrows() {
                return Err(SettingsError::BoundsDimension {
                    expected: cov.nrows(),
                    lower: bounds.lower.len(),
                    upper: bounds.upper.len(),
                });
            }
            if let Some(i) = (0..bounds.lower.len()).find(|&i| bounds.lower[i] > bounds.upper[i]) {
                return Err(SettingsError::BoundsOrder(i));
            }
        }
        Ok(())
    }
}

impl Default for PiSettings {
    fn default() -> Self {
        Self {
            num_samples: 100,
            gamma: 0.1,
            debug_print: 0,
            rollout: RolloutSettings::default(),
            noise_covariance: na::DMatrix::identity(1, 1),
            input_bounds: None,
            seed: None,
        }
    }
}
