//! Uncertain demand: the finite alphabet of demand states, scenarios over it and the
//! resolution of a scenario's demand for a product in a period.

use std::collections::BTreeMap;

use derive_more::{Deref, From, Into};
use log::trace;
use typed_index_collections::{TiSlice, TiVec};

use crate::problem::{
    column, names, ConfigError, MeanDemand, PeriodIndex, ProductIndex, Quantity, ScenarioData,
    Table,
};

/// Tolerance used when checking that scenario probabilities sum to one
const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct ScenarioIndex(usize);

/// A qualitative demand state, such as "good" or "bad"
#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct StateIndex(usize);

/// The alphabet of demand states a scenario is spelled in
#[derive(Debug, Clone, PartialEq)]
pub struct DemandStates(TiVec<StateIndex, String>);

impl DemandStates {
    pub fn label(&self, state: StateIndex) -> &str {
        &self.0[state]
    }

    pub fn parse(&self, label: &str) -> Option<StateIndex> {
        self.0.position(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One realization of demand over the whole horizon
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    name: String,
    /// The demand state of each period
    states: TiVec<PeriodIndex, StateIndex>,
    probability: f64,
}

impl Scenario {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn states(&self) -> &TiSlice<PeriodIndex, StateIndex> {
        &self.states
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

/// A validated scenario tree: every scenario has exactly one known state per period and the
/// probabilities sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    states: DemandStates,
    /// Demand of product p in state s, indexed (s, p)
    profile: TiVec<StateIndex, TiVec<ProductIndex, Quantity>>,
    scenarios: TiVec<ScenarioIndex, Scenario>,
}

impl ScenarioSet {
    pub(crate) fn new(
        profile: &BTreeMap<String, Table>,
        scenarios: &[ScenarioData],
        products: &TiSlice<ProductIndex, String>,
        periods: usize,
    ) -> Result<ScenarioSet, ConfigError> {
        let labels = profile.keys().cloned().collect::<Vec<_>>();
        let states = DemandStates(names("demand state", &labels)?);
        let profile = profile
            .iter()
            .map(|(label, table)| column(&format!("profile[{}]", label), table, products))
            .collect::<Result<TiVec<StateIndex, _>, _>>()?;

        if scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        // single character labels spell unambiguous names like `GBG`
        let separator = match labels.iter().all(|l| l.chars().count() == 1) {
            true => "",
            false => "-",
        };

        let mut parsed: TiVec<ScenarioIndex, Scenario> = TiVec::new();
        for data in scenarios {
            let name = match &data.name {
                Some(name) => name.clone(),
                None => {
                    let joined = data.states.join(separator);
                    match parsed.iter().any(|s| s.name == joined) {
                        true => format!("{}#{}", joined, parsed.len() + 1),
                        false => joined,
                    }
                }
            };

            if parsed.iter().any(|s| s.name == name) {
                return Err(ConfigError::DuplicateName {
                    kind: "scenario",
                    name,
                });
            }

            if data.states.len() != periods {
                return Err(ConfigError::ScenarioLengthMismatch {
                    scenario: name,
                    expected: periods,
                    actual: data.states.len(),
                });
            }

            let seq = data
                .states
                .iter()
                .enumerate()
                .map(|(t, label)| {
                    states
                        .parse(label)
                        .ok_or_else(|| ConfigError::UnknownState {
                            scenario: name.clone(),
                            period: t + 1,
                            label: label.clone(),
                        })
                })
                .collect::<Result<TiVec<PeriodIndex, _>, _>>()?;

            parsed.push(Scenario {
                name,
                states: seq,
                probability: 0.0,
            });
        }

        let given = scenarios.iter().filter(|s| s.probability.is_some()).count();
        let uniform = 1.0 / scenarios.len() as f64;
        let mut total = 0.0;
        for (scenario, data) in parsed.iter_mut().zip(scenarios) {
            let probability = match data.probability {
                Some(p) => p,
                None if given == 0 => uniform,
                None => return Err(ConfigError::MissingProbability(scenario.name.clone())),
            };
            if !(0.0..=1.0).contains(&probability) {
                return Err(ConfigError::InvalidProbability {
                    scenario: scenario.name.clone(),
                    probability,
                });
            }
            scenario.probability = probability;
            total += probability;
        }

        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ConfigError::ProbabilitySum(total));
        }

        trace!(
            "Parsed {} scenarios over {} demand states",
            parsed.len(),
            states.len()
        );

        Ok(ScenarioSet {
            states,
            profile,
            scenarios: parsed,
        })
    }

    pub fn states(&self) -> &DemandStates {
        &self.states
    }

    pub fn scenarios(&self) -> &TiSlice<ScenarioIndex, Scenario> {
        &self.scenarios
    }

    /// The demand level of product `p` in state `s`
    pub fn level(&self, s: StateIndex, p: ProductIndex) -> Quantity {
        self.profile[s][p]
    }

    /// The demand for product `p` in period `t` under scenario `w`
    pub fn demand(&self, p: ProductIndex, t: PeriodIndex, w: ScenarioIndex) -> Quantity {
        let state = self.scenarios[w].states[t];
        self.profile[state][p]
    }

    /// The probability-weighted demand for product `p` in period `t`
    pub fn expected_demand(&self, p: ProductIndex, t: PeriodIndex) -> Quantity {
        self.scenarios
            .iter_enumerated()
            .map(|(w, scenario)| scenario.probability * self.demand(p, t, w))
            .sum()
    }
}

/// Demand over the horizon, either known or as a scenario set
#[derive(Debug, Clone, PartialEq)]
pub enum Demand {
    /// Known demand, indexed (p, t). Forms a single implicit scenario of probability one.
    Mean(TiVec<ProductIndex, TiVec<PeriodIndex, Quantity>>),
    Scenarios(ScenarioSet),
}

impl Demand {
    pub(crate) fn mean(
        mean: &BTreeMap<String, MeanDemand>,
        products: &TiSlice<ProductIndex, String>,
        periods: usize,
    ) -> Result<Demand, ConfigError> {
        for key in mean.keys() {
            if !products.iter().any(|p| p == key) {
                return Err(ConfigError::UnknownKey {
                    table: "mean".to_string(),
                    key: key.clone(),
                });
            }
        }

        let demand: TiVec<ProductIndex, TiVec<PeriodIndex, Quantity>> = products
            .iter()
            .map(|product| {
                let per_period = match mean.get(product) {
                    Some(MeanDemand::Constant(d)) => vec![*d; periods],
                    Some(MeanDemand::PerPeriod(d)) if d.len() == periods => d.clone(),
                    Some(MeanDemand::PerPeriod(d)) => {
                        return Err(ConfigError::MeanLengthMismatch {
                            product: product.clone(),
                            expected: periods,
                            actual: d.len(),
                        })
                    }
                    None => {
                        return Err(ConfigError::MissingEntry {
                            table: "mean".to_string(),
                            key: product.clone(),
                        })
                    }
                };

                if let Some(d) = per_period.iter().find(|d| !d.is_finite() || **d < 0.0) {
                    return Err(ConfigError::InvalidValue {
                        table: "mean".to_string(),
                        key: product.clone(),
                        value: *d,
                    });
                }

                Ok(per_period.into())
            })
            .collect::<Result<_, _>>()?;

        Ok(Demand::Mean(demand))
    }

    pub(crate) fn scenarios(
        profile: &BTreeMap<String, Table>,
        scenarios: &[ScenarioData],
        products: &TiSlice<ProductIndex, String>,
        periods: usize,
    ) -> Result<Demand, ConfigError> {
        ScenarioSet::new(profile, scenarios, products, periods).map(Demand::Scenarios)
    }

    pub fn is_stochastic(&self) -> bool {
        matches!(self, Demand::Scenarios(_))
    }

    pub fn scenario_count(&self) -> usize {
        match self {
            Demand::Mean(_) => 1,
            Demand::Scenarios(set) => set.scenarios.len(),
        }
    }

    pub fn scenario_name(&self, w: ScenarioIndex) -> Option<&str> {
        match self {
            Demand::Mean(_) => None,
            Demand::Scenarios(set) => Some(set.scenarios[w].name()),
        }
    }

    pub fn probability(&self, w: ScenarioIndex) -> f64 {
        match self {
            Demand::Mean(_) => 1.0,
            Demand::Scenarios(set) => set.scenarios[w].probability,
        }
    }

    /// The demand for product `p` in period `t` under scenario `w`. The scenario is ignored
    /// for known demand.
    pub fn resolve(&self, p: ProductIndex, t: PeriodIndex, w: ScenarioIndex) -> Quantity {
        match self {
            Demand::Mean(mean) => mean[p][t],
            Demand::Scenarios(set) => set.demand(p, t, w),
        }
    }
}
