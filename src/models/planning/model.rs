use std::sync::Arc;

use itertools::iproduct;
use log::{debug, info, trace, warn};

use super::sets_and_parameters::{Parameters, Sets};
use crate::{
    lp::{eq, leq, LinExpr, LinSum, LinearProgram, LpError, VarId},
    models::utils::AddVars,
    problem::{Instance, PeriodIndex, ProductIndex, ResourceIndex},
    scenario::ScenarioIndex,
    solution::PlanningSolution,
    solver::{Solver, SolverError, Status},
};

/// Violations of solver points above this are logged as numerical noise
const FEASIBILITY_TOLERANCE: f64 = 1e-6;
/// Violations above this reject the point
const REJECT_TOLERANCE: f64 = 1e-4;

/// The decision variables of the planning model
#[derive(Debug, Clone)]
pub struct Variables {
    /// quantity of product p produced in period t, indexed (p, t). First stage.
    pub produce: Vec<Vec<VarId>>,
    /// amount of resource r used beyond its capacity in period t, indexed (r, t). First stage.
    pub extra: Vec<Vec<VarId>>,
    /// quantity of product p carried from period t into the next under scenario w,
    /// indexed (p, t, w)
    pub storage: Vec<Vec<Vec<VarId>>>,
    /// demand of product p in period t left unmet under scenario w, indexed (p, t, w).
    /// `None` when demand is known, in which case it must be met exactly.
    pub unmet: Option<Vec<Vec<Vec<VarId>>>>,
}

/// The deterministic equivalent of the planning problem: every scenario folded into one
/// linear program, with production and extra resources shared across scenarios.
#[derive(Debug, Clone)]
pub struct PlanningModel {
    instance: Arc<Instance>,
    lp: LinearProgram,
    vars: Variables,
}

/// `base[item,period]` or `base[item,period,scenario]`
fn indexed(base: &str, item: &str, t: PeriodIndex, scenario: Option<&str>) -> String {
    match scenario {
        Some(w) => format!("{}[{},{},{}]", base, item, t, w),
        None => format!("{}[{},{}]", base, item, t),
    }
}

#[allow(non_snake_case)]
impl PlanningModel {
    /// Builds the model for an instance
    pub fn build(instance: impl Into<Arc<Instance>>) -> Result<PlanningModel, LpError> {
        let instance = instance.into();
        info!("Building planning model for '{}'", instance.name());

        let sets = Sets::new(&instance);
        let parameters = Parameters::new(&instance, &sets);

        let mut lp = LinearProgram::new(instance.name());

        let vars = Self::variables(&mut lp, &sets, &parameters)?;
        Self::capacity_constraints(&mut lp, &sets, &parameters, &vars)?;
        Self::inventory_constraints(&mut lp, &sets, &parameters, &vars)?;
        lp.set_objective(Self::objective(&sets, &parameters, &vars))?;

        debug!(
            "Built '{}' with {} variables and {} constraints",
            lp.name(),
            lp.variables().len(),
            lp.constraints().len()
        );

        Ok(PlanningModel { instance, lp, vars })
    }

    fn variables(
        lp: &mut LinearProgram,
        sets: &Sets,
        parameters: &Parameters,
    ) -> Result<Variables, LpError> {
        let P = sets.P.len();
        let R = sets.R.len();
        let T = sets.T.len();
        let W = sets.W.len();

        let product = |p: usize| parameters.product(ProductIndex::from(p));
        let scenario = |w: usize| parameters.scenario(ScenarioIndex::from(w));

        // production, decided before demand is known
        let produce = (P, T).cont(lp, |(p, t)| {
            indexed("produce", product(p), t.into(), None)
        })?;

        // extra resources, bounded by the overage limit where there is one
        let extra = (R, T).vars_with(|(r, t)| {
            let r = ResourceIndex::from(r);
            let name = indexed("extra", parameters.resource(r), t.into(), None);
            lp.add_var(&name, &(0.0..parameters.E_max[r]))
        })?;

        // storage at the end of each period, per scenario
        let storage = (P, T, W).cont(lp, |(p, t, w)| {
            indexed("storage", product(p), t.into(), scenario(w))
        })?;

        // unmet demand, per scenario
        let unmet = match parameters.recourse {
            true => Some((P, T, W).cont(lp, |(p, t, w)| {
                indexed("unmet", product(p), t.into(), scenario(w))
            })?),
            false => None,
        };

        trace!(
            "Variables: produce {}x{}, extra {}x{}, storage {}x{}x{}, unmet {}",
            P,
            T,
            R,
            T,
            P,
            T,
            W,
            if parameters.recourse { "yes" } else { "no" }
        );

        Ok(Variables {
            produce,
            extra,
            storage,
            unmet,
        })
    }

    /// Resource usage in a period may exceed the capacity, but every unit beyond it is bought
    /// as extra resource. One constraint per resource and period, shared by all scenarios.
    fn capacity_constraints(
        lp: &mut LinearProgram,
        sets: &Sets,
        parameters: &Parameters,
        vars: &Variables,
    ) -> Result<(), LpError> {
        for (r, t) in iproduct!(&sets.R, &sets.T) {
            let used = sets
                .P
                .iter()
                .map(|p| parameters.U[*p][*r] * vars.produce[**p][**t])
                .lin_sum();
            let available = vars.extra[**r][**t] + parameters.L[*r];

            let name = indexed("resource", parameters.resource(*r), *t, None);
            lp.add_constr(&name, leq(used, available))?;
        }

        trace!("Added {} capacity constraints", sets.R.len() * sets.T.len());
        Ok(())
    }

    /// Inventory balance of every product in every period of every scenario:
    /// production plus incoming storage equals outgoing storage plus the demand that is met.
    fn inventory_constraints(
        lp: &mut LinearProgram,
        sets: &Sets,
        parameters: &Parameters,
        vars: &Variables,
    ) -> Result<(), LpError> {
        for (p, w) in iproduct!(&sets.P, &sets.W) {
            for t in &sets.T {
                let produced = vars.produce[**p][**t];
                let stored = vars.storage[**p][**t][**w];
                let demand = parameters.D(*p, *t, *w);

                // nothing is carried into the first period
                let inflow = match t.previous() {
                    None => LinExpr::from(produced),
                    Some(prev) => LinExpr::from(produced) + vars.storage[**p][*prev][**w],
                };

                let outflow = match &vars.unmet {
                    Some(unmet) => stored + demand - unmet[**p][**t][**w],
                    None => stored + demand,
                };

                let name = indexed("inventory", parameters.product(*p), *t, parameters.scenario(*w));
                lp.add_constr(&name, eq(inflow, outflow))?;
            }
        }

        trace!(
            "Added {} inventory constraints",
            sets.P.len() * sets.T.len() * sets.W.len()
        );
        Ok(())
    }

    /// Expected cost: first-stage costs plus the probability-weighted recourse costs
    fn objective(sets: &Sets, parameters: &Parameters, vars: &Variables) -> LinExpr {
        let production = iproduct!(&sets.P, &sets.T)
            .map(|(p, t)| parameters.C_prod[*p] * vars.produce[**p][**t])
            .lin_sum();

        let extra = iproduct!(&sets.R, &sets.T)
            .map(|(r, t)| parameters.C_extra[*r] * vars.extra[**r][**t])
            .lin_sum();

        let storage = iproduct!(&sets.W, &sets.P, &sets.T)
            .map(|(w, p, t)| parameters.pi[*w] * parameters.C_store[*p] * vars.storage[**p][**t][**w])
            .lin_sum();

        let unmet = match &vars.unmet {
            Some(unmet) => iproduct!(&sets.W, &sets.P, &sets.T)
                .map(|(w, p, t)| parameters.pi[*w] * parameters.C_unmet[*p] * unmet[**p][**t][**w])
                .lin_sum(),
            None => LinExpr::new(),
        };

        production + extra + storage + unmet
    }

    /// Submits the model to `solver` and collects the result
    pub fn solve<S: Solver + ?Sized>(&self, solver: &S) -> crate::Result<PlanningSolution> {
        info!("Solving '{}' with {}", self.lp.name(), solver.name());
        let output = solver.solve(&self.lp)?;
        info!("{} finished with status {}", solver.name(), output.status);

        let solution = match (output.status == Status::Optimal, output.solution) {
            (true, Some(solution)) => {
                let expected = self.lp.variables().len();
                if solution.values.len() != expected {
                    return Err(SolverError::ValueCount {
                        expected,
                        actual: solution.values.len(),
                    }
                    .into());
                }

                let rejected = self.lp.violations(&solution.values, REJECT_TOLERANCE);
                if let Some(first) = rejected.first() {
                    return Err(SolverError::InfeasiblePoint {
                        count: rejected.len(),
                        first: first.to_string(),
                    }
                    .into());
                }

                for violation in self.lp.violations(&solution.values, FEASIBILITY_TOLERANCE) {
                    warn!("{} returned a slightly infeasible point: {}", solver.name(), violation);
                }

                Some(solution)
            }
            (true, None) => return Err(SolverError::MissingSolution.into()),
            (false, _) => None,
        };

        Ok(PlanningSolution::new(
            self.instance.clone(),
            &self.vars,
            output.status,
            solution,
        ))
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The linear program, e.g. for exporting
    pub fn lp(&self) -> &LinearProgram {
        &self.lp
    }

    pub fn vars(&self) -> &Variables {
        &self.vars
    }
}
