use thiserror::Error;

pub type Result<T> = std::result::Result<T, PiError>;

#[derive(Debug, Error)]
pub enum PiError {
    #[error("invalid horizon: final time {final_time} must be greater than initial time {init_time}")]
    InvalidHorizon { init_time: f64, final_time: f64 },

    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    /// ロールアウトがコントローラを想定外の回数呼び出した
    #[error("rollout invoked the controller {got} times, expected {expected}")]
    ControllerCallCount { expected: usize, got: usize },

    #[error("cached time {time} is not before final time {final_time}")]
    TimeBeyondFinal { time: f64, final_time: f64 },

    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid trajectory: {0}")]
    InvalidTrajectory(&'static str),

    #[error("rollout returned an empty state trajectory")]
    EmptyRollout,

    #[error("numerical failure: {0}")]
    Numerical(&'static str),
}

/// Validation errors for [`PiSettings`](crate::settings::PiSettings).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("num_samples must be > 0")]
    NoSamples,

    #[error("gamma must be finite and > 0, got {0}")]
    InvalidGamma(f64),

    #[error("min_time_step must be finite and > 0, got {0}")]
    InvalidTimeStep(f64),

    #[error("noise covariance must be square, got {rows}x{cols}")]
    CovarianceNotSquare { rows: usize, cols: usize },

    #[error("noise covariance must be symmetric positive semi-definite")]
    CovarianceNotPsd,

    #[error("input bounds must have the input dimension {expected}, got lower={lower}, upper={upper}")]
    BoundsDimension { expected: usize, lower: usize, upper: usize },

    #[error("input bounds must satisfy lower <= upper at index {0}")]
    BoundsOrder(usize),
}
