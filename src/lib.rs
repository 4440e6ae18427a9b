//! Two-stage stochastic production planning.
//!
//! An [`Instance`] describes products, resources and demand over a horizon of periods. Demand
//! is either known or given as a finite set of scenarios. [`PlanningModel`] folds every scenario
//! into a single linear program where production and extra resources are decided up front,
//! while storage and unmet demand adapt to the scenario that occurs.

pub mod lp;
pub mod models;
pub mod problem;
pub mod scenario;
pub mod solution;
pub mod solver;

use derive_more::{Display, From};

pub use models::PlanningModel;
pub use problem::{ConfigError, Instance, InstanceData};
pub use solution::{PlanningSolution, Report};
pub use solver::{Solver, Status};

#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "invalid instance: {}", _0)]
    Config(problem::ConfigError),
    #[display(fmt = "invalid model: {}", _0)]
    Lp(lp::LpError),
    #[display(fmt = "solver failed: {}", _0)]
    Solver(solver::SolverError),
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Validates `data`, builds the deterministic equivalent and solves it with `solver`
pub fn plan<S: Solver + ?Sized>(data: InstanceData, solver: &S) -> Result<PlanningSolution> {
    let instance = Instance::new(data)?;
    let model = PlanningModel::build(instance)?;
    model.solve(solver)
}
