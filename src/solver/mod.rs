//! The boundary to linear programming solvers.
//!
//! A [`Solver`] receives a complete [`LinearProgram`] and minimizes its objective. Infeasible
//! and unbounded programs are reported through [`Status`]; only failures of the solver itself
//! are errors.

#[cfg(feature = "gurobi")]
pub mod gurobi;
pub mod microlp;

use derive_more::Display;
use serde::Serialize;
use typed_index_collections::TiVec;

use crate::lp::{LinearProgram, VarId};

#[cfg(feature = "gurobi")]
pub use gurobi::Gurobi;
pub use microlp::MicroLp;

/// Termination status reported by a solver
#[derive(Debug, Display, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[display(fmt = "optimal")]
    Optimal,
    #[display(fmt = "infeasible")]
    Infeasible,
    #[display(fmt = "unbounded")]
    Unbounded,
    /// Any other termination, e.g. a limit being reached
    #[display(fmt = "other ({})", _0)]
    Other(String),
}

#[derive(Debug, Display, Clone, PartialEq)]
pub enum SolverError {
    /// The solver itself failed, e.g. numerical trouble or a missing license
    #[display(fmt = "{}", _0)]
    Backend(String),
    #[display(fmt = "solver reported an optimal status without a solution")]
    MissingSolution,
    #[display(
        fmt = "solver returned {} values for {} variables",
        actual,
        expected
    )]
    ValueCount { expected: usize, actual: usize },
    /// The point reported as optimal breaks bounds or constraints beyond numerical noise
    #[display(fmt = "solver returned a point with {} violations, first: {}", count, first)]
    InfeasiblePoint { count: usize, first: String },
}

impl std::error::Error for SolverError {}

/// An optimal point
#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub objective: f64,
    /// Value of every variable, in the order of the program's variables
    pub values: TiVec<VarId, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    pub status: Status,
    /// Present when the status is optimal
    pub solution: Option<LpSolution>,
}

impl SolverOutput {
    pub fn optimal(objective: f64, values: TiVec<VarId, f64>) -> Self {
        Self {
            status: Status::Optimal,
            solution: Some(LpSolution { objective, values }),
        }
    }

    /// A termination without a solution
    pub fn without_solution(status: Status) -> Self {
        Self {
            status,
            solution: None,
        }
    }
}

pub trait Solver {
    /// Name used when logging
    fn name(&self) -> &str;

    /// Minimizes the objective of `lp`
    fn solve(&self, lp: &LinearProgram) -> Result<SolverOutput, SolverError>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, lp: &LinearProgram) -> Result<SolverOutput, SolverError> {
        (**self).solve(lp)
    }
}
