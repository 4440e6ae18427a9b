use std::{fmt, sync::Arc};

use itertools::iproduct;
use serde::Serialize;
use typed_index_collections::TiVec;

use crate::{
    lp::VarId,
    models::{planning::Variables, utils::ConvertVars},
    problem::{Cost, Instance, PeriodIndex, ProductIndex, Quantity, ResourceIndex},
    scenario::ScenarioIndex,
    solver::{LpSolution, Status},
};

/// Variable values of an optimal plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlanValues {
    /// The expected cost
    pub objective: Cost,
    /// indexed (p, t)
    pub produce: Vec<Vec<Quantity>>,
    /// indexed (r, t)
    pub extra: Vec<Vec<Quantity>>,
    /// indexed (p, t, w)
    pub storage: Vec<Vec<Vec<Quantity>>>,
    /// indexed (p, t, w), `None` without recourse
    pub unmet: Option<Vec<Vec<Vec<Quantity>>>>,
    /// Every variable value in the order of the linear program
    pub raw: TiVec<VarId, f64>,
}

/// The outcome of solving a planning model
#[derive(Debug, Clone)]
pub struct PlanningSolution {
    instance: Arc<Instance>,
    status: Status,
    values: Option<PlanValues>,
}

/// The expected cost split on its terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub production: Cost,
    pub extra_resource: Cost,
    /// Probability-weighted storage cost
    pub expected_storage: Cost,
    /// Probability-weighted unmet demand penalty
    pub expected_unmet: Cost,
}

impl CostBreakdown {
    pub fn total(&self) -> Cost {
        self.production + self.extra_resource + self.expected_storage + self.expected_unmet
    }
}

/// Quantities of one product or resource over the horizon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    /// `None` for the implicit scenario of known demand
    pub name: Option<String>,
    pub probability: f64,
    /// Storage and unmet demand cost of this scenario, not weighted by its probability
    pub recourse_cost: Cost,
    pub storage: Vec<Series>,
    pub unmet: Vec<Series>,
}

/// A serializable summary of a solution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub instance: String,
    pub status: Status,
    pub expected_cost: Option<Cost>,
    pub costs: Option<CostBreakdown>,
    pub production: Vec<Series>,
    pub extra_resource: Vec<Series>,
    pub scenarios: Vec<ScenarioReport>,
}

impl PlanningSolution {
    pub(crate) fn new(
        instance: Arc<Instance>,
        vars: &Variables,
        status: Status,
        solution: Option<LpSolution>,
    ) -> Self {
        let values = solution.map(|LpSolution { objective, values }| PlanValues {
            objective,
            produce: vars.produce.convert(&values),
            extra: vars.extra.convert(&values),
            storage: vars.storage.convert(&values),
            unmet: vars.unmet.as_ref().map(|unmet| unmet.convert(&values)),
            raw: values,
        });

        PlanningSolution {
            instance,
            status,
            values,
        }
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_optimal(&self) -> bool {
        self.status == Status::Optimal
    }

    /// The optimal values, if the model was solved to optimality
    pub fn values(&self) -> Option<&PlanValues> {
        self.values.as_ref()
    }

    /// The optimal expected cost
    pub fn objective(&self) -> Option<Cost> {
        self.values.as_ref().map(|v| v.objective)
    }

    pub fn produce(&self, p: ProductIndex, t: PeriodIndex) -> Option<Quantity> {
        self.values.as_ref().map(|v| v.produce[*p][*t])
    }

    pub fn extra(&self, r: ResourceIndex, t: PeriodIndex) -> Option<Quantity> {
        self.values.as_ref().map(|v| v.extra[*r][*t])
    }

    pub fn storage(&self, p: ProductIndex, t: PeriodIndex, w: ScenarioIndex) -> Option<Quantity> {
        self.values.as_ref().map(|v| v.storage[*p][*t][*w])
    }

    /// `None` when not optimal or when the model has no unmet demand
    pub fn unmet(&self, p: ProductIndex, t: PeriodIndex, w: ScenarioIndex) -> Option<Quantity> {
        self.values
            .as_ref()
            .and_then(|v| v.unmet.as_ref())
            .map(|unmet| unmet[*p][*t][*w])
    }

    /// Storage and unmet demand cost incurred under scenario `w`
    pub fn scenario_cost(&self, w: ScenarioIndex) -> Option<Cost> {
        let values = self.values.as_ref()?;
        let products = self.instance.products();

        let cost: Cost = iproduct!(products.iter_enumerated(), 0..self.instance.periods())
            .map(|((p, product), t)| {
                let unmet = values.unmet.as_ref().map_or(0.0, |u| u[*p][t][*w]);
                product.storage_cost() * values.storage[*p][t][*w] + product.unmet_cost() * unmet
            })
            .sum();

        Some(cost)
    }

    pub fn costs(&self) -> Option<CostBreakdown> {
        let values = self.values.as_ref()?;
        let instance = &self.instance;
        let periods = 0..instance.periods();

        let production: Cost = iproduct!(instance.products().iter_enumerated(), periods.clone())
            .map(|((p, product), t)| product.production_cost() * values.produce[*p][t])
            .sum();

        let extra_resource: Cost = iproduct!(instance.resources().iter_enumerated(), periods.clone())
            .map(|((r, resource), t)| resource.extra_cost() * values.extra[*r][t])
            .sum();

        let mut expected_storage = 0.0;
        let mut expected_unmet = 0.0;
        for w in (0..instance.scenario_count()).map(ScenarioIndex::from) {
            let probability = instance.probability(w);
            for ((p, product), t) in iproduct!(instance.products().iter_enumerated(), periods.clone())
            {
                expected_storage += probability * product.storage_cost() * values.storage[*p][t][*w];
                if let Some(unmet) = &values.unmet {
                    expected_unmet += probability * product.unmet_cost() * unmet[*p][t][*w];
                }
            }
        }

        Some(CostBreakdown {
            production,
            extra_resource,
            expected_storage,
            expected_unmet,
        })
    }

    pub fn report(&self) -> Report {
        let instance = &self.instance;
        let products = instance.products();

        let series = |name: &str, values: &[f64]| Series {
            name: name.to_string(),
            values: values.to_vec(),
        };

        let (production, extra_resource, scenarios) = match &self.values {
            None => (Vec::new(), Vec::new(), Vec::new()),
            Some(v) => {
                let production = products
                    .iter()
                    .zip(&v.produce)
                    .map(|(p, values)| series(p.name(), values))
                    .collect();

                let extra_resource = instance
                    .resources()
                    .iter()
                    .zip(&v.extra)
                    .map(|(r, values)| series(r.name(), values))
                    .collect();

                let per_scenario = |family: &Vec<Vec<Vec<f64>>>, w: ScenarioIndex| {
                    products
                        .iter()
                        .zip(family)
                        .map(|(p, periods)| Series {
                            name: p.name().to_string(),
                            values: periods.iter().map(|scenarios| scenarios[*w]).collect(),
                        })
                        .collect::<Vec<_>>()
                };

                let scenarios = (0..instance.scenario_count())
                    .map(ScenarioIndex::from)
                    .map(|w| ScenarioReport {
                        name: instance.scenario_name(w).map(str::to_string),
                        probability: instance.probability(w),
                        recourse_cost: self.scenario_cost(w).unwrap_or_default(),
                        storage: per_scenario(&v.storage, w),
                        unmet: v
                            .unmet
                            .as_ref()
                            .map(|unmet| per_scenario(unmet, w))
                            .unwrap_or_default(),
                    })
                    .collect();

                (production, extra_resource, scenarios)
            }
        };

        Report {
            instance: instance.name().to_string(),
            status: self.status.clone(),
            expected_cost: self.objective(),
            costs: self.costs(),
            production,
            extra_resource,
            scenarios,
        }
    }
}

/// A plain text rendering of the plan
impl fmt::Display for PlanningSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = match &self.values {
            Some(values) => values,
            None => return writeln!(f, "No optimal solution found (status: {})", self.status),
        };

        let instance = &self.instance;
        let periods = (0..instance.periods()).map(PeriodIndex::from);

        writeln!(f, "Optimal expected cost: {:.2}", values.objective)?;
        if let Some(costs) = self.costs() {
            writeln!(
                f,
                "  production {:.2}, extra resources {:.2}, storage {:.2}, unmet demand {:.2}",
                costs.production, costs.extra_resource, costs.expected_storage, costs.expected_unmet
            )?;
        }

        writeln!(f, "\nProduction plan:")?;
        for ((p, product), t) in iproduct!(instance.products().iter_enumerated(), periods.clone()) {
            writeln!(
                f,
                "  {} - period {}: produce {:.2}",
                product.name(),
                t,
                values.produce[*p][*t]
            )?;
        }

        writeln!(f, "\nExtra resource usage:")?;
        for ((r, resource), t) in iproduct!(instance.resources().iter_enumerated(), periods.clone()) {
            writeln!(
                f,
                "  {} - period {}: extra used {:.2}",
                resource.name(),
                t,
                values.extra[*r][*t]
            )?;
        }

        match &values.unmet {
            None => {
                writeln!(f, "\nStorage plan:")?;
                for ((p, product), t) in
                    iproduct!(instance.products().iter_enumerated(), periods.clone())
                {
                    writeln!(
                        f,
                        "  {} - period {}: storage {:.2}",
                        product.name(),
                        t,
                        values.storage[*p][*t][0]
                    )?;
                }
            }
            Some(unmet) => {
                writeln!(f, "\nScenario summary (storage & unmet demand):")?;
                for w in (0..instance.scenario_count()).map(ScenarioIndex::from) {
                    writeln!(
                        f,
                        "\nScenario {} (probability {:.4}, recourse cost {:.2})",
                        instance.scenario_name(w).unwrap_or("-"),
                        instance.probability(w),
                        self.scenario_cost(w).unwrap_or_default()
                    )?;
                    for ((p, product), t) in
                        iproduct!(instance.products().iter_enumerated(), periods.clone())
                    {
                        writeln!(
                            f,
                            "  {} - period {}: storage {:.2}, unmet {:.2}",
                            product.name(),
                            t,
                            values.storage[*p][*t][*w],
                            unmet[*p][*t][*w]
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}
