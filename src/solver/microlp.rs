use good_lp::{
    constraint, microlp, Expression, IntoAffineExpression, ProblemVariables, ResolutionError,
    Solution, SolverModel, Variable as LpVariable,
};
use log::trace;
use typed_index_collections::{TiSlice, TiVec};

use super::{Solver, SolverError, SolverOutput, Status};
use crate::lp::{ConstraintSense, LinExpr, LinearProgram, VarId};

/// The pure Rust simplex solver shipped with `good_lp`
#[derive(Debug, Default, Clone, Copy)]
pub struct MicroLp;

fn expression(expr: &LinExpr, handles: &TiSlice<VarId, LpVariable>) -> Expression {
    let terms: Expression = expr
        .terms()
        .iter()
        .map(|(var, coeff)| *coeff * handles[*var])
        .sum();
    terms + expr.constant()
}

impl Solver for MicroLp {
    fn name(&self) -> &str {
        "microlp"
    }

    fn solve(&self, lp: &LinearProgram) -> Result<SolverOutput, SolverError> {
        let mut problem = ProblemVariables::new();
        let handles: TiVec<VarId, LpVariable> = lp
            .variables()
            .iter()
            .map(|var| {
                let mut definition = good_lp::variable().name(var.name());
                if var.lower().is_finite() {
                    definition = definition.min(var.lower());
                }
                if var.upper().is_finite() {
                    definition = definition.max(var.upper());
                }
                problem.add(definition)
            })
            .collect();

        let objective = expression(lp.objective(), &handles);
        let mut model = problem.minimise(objective).using(microlp);

        for c in lp.constraints() {
            let lhs = expression(c.lhs(), &handles);
            let rhs = c.rhs().into_expression();
            let constr = match c.sense() {
                ConstraintSense::Le => constraint::leq(lhs, rhs),
                ConstraintSense::Eq => constraint::eq(lhs, rhs),
                ConstraintSense::Ge => constraint::geq(lhs, rhs),
            };
            model = model.with(constr);
        }

        trace!(
            "Handing {} variables and {} constraints to microlp",
            handles.len(),
            lp.constraints().len()
        );

        match model.solve() {
            Ok(solution) => {
                let values: TiVec<VarId, f64> =
                    handles.iter().map(|h| solution.value(*h)).collect();
                let objective = lp.objective().eval(&values);
                Ok(SolverOutput::optimal(objective, values))
            }
            Err(ResolutionError::Infeasible) => {
                Ok(SolverOutput::without_solution(Status::Infeasible))
            }
            Err(ResolutionError::Unbounded) => {
                Ok(SolverOutput::without_solution(Status::Unbounded))
            }
            Err(e) => Err(SolverError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lp::{geq, leq, LinExpr};

    #[test]
    fn solves_a_small_lp() {
        // min x + 2y  s.t.  x + y >= 4,  x <= 3
        let mut lp = LinearProgram::new("small");
        let x = lp.add_var("x", &(0.0..3.0)).unwrap();
        let y = lp.add_var("y", &(0.0..f64::INFINITY)).unwrap();
        lp.add_constr("cover", geq(LinExpr::from(x) + y, 4.0))
            .unwrap();
        lp.set_objective(1.0 * x + 2.0 * y).unwrap();

        let output = MicroLp.solve(&lp).unwrap();
        assert_eq!(output.status, Status::Optimal);
        let solution = output.solution.unwrap();
        assert!((solution.values[x] - 3.0).abs() < 1e-6);
        assert!((solution.values[y] - 1.0).abs() < 1e-6);
        assert!((solution.objective - 5.0).abs() < 1e-6);
    }

    #[test]
    fn reports_infeasibility() {
        let mut lp = LinearProgram::new("infeasible");
        let x = lp.add_var("x", &(0.0..f64::INFINITY)).unwrap();
        lp.add_constr("upper", leq(x, 1.0)).unwrap();
        lp.add_constr("lower", geq(x, 2.0)).unwrap();
        lp.set_objective(x).unwrap();

        let output = MicroLp.solve(&lp).unwrap();
        assert_eq!(output.status, Status::Infeasible);
        assert!(output.solution.is_none());
    }

    #[test]
    fn reports_unboundedness() {
        let mut lp = LinearProgram::new("unbounded");
        let x = lp.add_var("x", &(0.0..f64::INFINITY)).unwrap();
        lp.add_constr("lower", geq(x, 1.0)).unwrap();
        lp.set_objective(-1.0 * x).unwrap();

        let output = MicroLp.solve(&lp).unwrap();
        assert_eq!(output.status, Status::Unbounded);
    }
}
