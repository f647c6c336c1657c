extern crate nalgebra as na;

pub mod backward;
pub mod constraint;
pub mod controller;
pub mod cost;
pub mod dynamics;
pub mod error;
pub mod interpolation;
pub mod policy;
pub mod rollout;
pub mod sampler;
pub mod settings;
pub mod solver;
pub mod types;

pub use constraint::{AffineConstraint, LinearConstraint, StateInputConstraint};
pub use controller::{Controller, FeedforwardController};
pub use cost::{CostFunction, DesiredTrajectory, QuadraticCost};
pub use dynamics::{Dynamics, LinearSystem};
pub use error::{PiError, Result, SettingsError};
pub use policy::{CachingPolicy, PiController};
pub use rollout::{Rollout, RolloutTrajectory, TimeTriggeredRollout};
pub use settings::{InputBounds, PiSettings, RolloutSettings};
pub use solver::PiSolver;
pub use types::{CacheEntry, Input, NominalTrajectory, PriorSolution, SolveStatus, State, TimeGrid};
