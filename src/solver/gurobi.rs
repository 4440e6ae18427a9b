use grb::{expr::LinExpr as GrbExpr, prelude::*};
use log::trace;
use typed_index_collections::{TiSlice, TiVec};

use super::{Solver, SolverError, SolverOutput, Status as SolverStatus};
use crate::lp::{ConstraintSense, LinExpr, LinearProgram, VarId};

/// Gurobi through the `grb` bindings. Requires a Gurobi installation and license.
#[derive(Debug, Clone, Default)]
pub struct Gurobi {
    /// Whether Gurobi should print its log
    pub verbose: bool,
}

impl Gurobi {
    fn build(
        &self,
        lp: &LinearProgram,
    ) -> grb::Result<(Model, TiVec<VarId, Var>)> {
        let mut model = Model::new(lp.name())?;
        model.set_param(param::OutputFlag, self.verbose as i32)?;
        // presolve must not stop at "infeasible or unbounded"
        model.set_param(param::DualReductions, 0)?;

        let vars = lp
            .variables()
            .iter()
            .map(|var| {
                model.add_var(
                    var.name(),
                    VarType::Continuous,
                    0.0,
                    var.lower(),
                    var.upper(),
                    std::iter::empty(),
                )
            })
            .collect::<grb::Result<TiVec<VarId, Var>>>()?;

        // variables must be integrated before constraints can refer to them
        model.update()?;

        for c in lp.constraints() {
            let lhs = expression(c.lhs(), &vars);
            let rhs = c.rhs();
            let constr = match c.sense() {
                ConstraintSense::Le => c!(lhs <= rhs),
                ConstraintSense::Eq => c!(lhs == rhs),
                ConstraintSense::Ge => c!(lhs >= rhs),
            };
            model.add_constr(c.name(), constr)?;
        }

        model.set_objective(expression(lp.objective(), &vars), Minimize)?;
        model.update()?;

        Ok((model, vars))
    }
}

fn expression(expr: &LinExpr, vars: &TiSlice<VarId, Var>) -> GrbExpr {
    let mut out = GrbExpr::new();
    for (var, coeff) in expr.terms() {
        out.add_term(*coeff, vars[*var]);
    }
    out.add_constant(expr.constant());
    out
}

fn backend(e: grb::Error) -> SolverError {
    SolverError::Backend(e.to_string())
}

impl Solver for Gurobi {
    fn name(&self) -> &str {
        "gurobi"
    }

    fn solve(&self, lp: &LinearProgram) -> Result<SolverOutput, SolverError> {
        let (mut model, vars) = self.build(lp).map_err(backend)?;
        trace!("Optimizing '{}' with gurobi", lp.name());
        model.optimize().map_err(backend)?;

        let status = match model.status().map_err(backend)? {
            grb::Status::Optimal => SolverStatus::Optimal,
            grb::Status::Infeasible => SolverStatus::Infeasible,
            grb::Status::Unbounded => SolverStatus::Unbounded,
            other => SolverStatus::Other(format!("{:?}", other)),
        };

        if status != SolverStatus::Optimal {
            return Ok(SolverOutput::without_solution(status));
        }

        let objective = model.get_attr(attr::ObjVal).map_err(backend)?;
        let values = vars
            .iter()
            .map(|var| model.get_obj_attr(attr::X, var))
            .collect::<grb::Result<TiVec<VarId, f64>>>()
            .map_err(backend)?;

        Ok(SolverOutput::optimal(objective, values))
    }
}
