use std::{collections::BTreeMap, fmt};

use derive_more::{Deref, Display, From, Into};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use typed_index_collections::{TiSlice, TiVec};

use crate::scenario::{Demand, ScenarioIndex};

/// The type used for quantities of products and resources
pub type Quantity = f64;
/// The type used for cost.
pub type Cost = f64;

/// A table of values keyed on product, resource or scenario name
pub type Table = BTreeMap<String, f64>;

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct ProductIndex(usize);

#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct ResourceIndex(usize);

/// A period of the planning horizon. Zero-based internally, displayed one-based.
#[derive(Deref, Debug, PartialEq, Eq, PartialOrd, Ord, From, Into, Clone, Copy, Hash)]
pub struct PeriodIndex(usize);

impl PeriodIndex {
    /// The one-based period number
    pub fn number(self) -> usize {
        self.0 + 1
    }

    /// The period before this one, `None` for the first period of the horizon
    pub fn previous(self) -> Option<PeriodIndex> {
        self.0.checked_sub(1).map(PeriodIndex)
    }
}

impl fmt::Display for PeriodIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Inconsistencies in the input tables, detected before any model is built.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ConfigError {
    #[display(fmt = "{} '{}' is declared more than once", kind, name)]
    DuplicateName { kind: &'static str, name: String },
    #[display(fmt = "a {} has an empty name", _0)]
    EmptyName(&'static str),
    #[display(fmt = "table '{}' has no entry for '{}'", table, key)]
    MissingEntry { table: String, key: String },
    #[display(fmt = "table '{}' refers to '{}' which is not declared", table, key)]
    UnknownKey { table: String, key: String },
    #[display(
        fmt = "table '{}' has value {} for '{}', expected a finite non-negative number",
        table,
        value,
        key
    )]
    InvalidValue {
        table: String,
        key: String,
        value: f64,
    },
    #[display(fmt = "the scenario set is empty")]
    NoScenarios,
    #[display(
        fmt = "scenario '{}' has {} demand states, expected one per period ({})",
        scenario,
        actual,
        expected
    )]
    ScenarioLengthMismatch {
        scenario: String,
        expected: usize,
        actual: usize,
    },
    #[display(
        fmt = "scenario '{}' uses demand state '{}' in period {} which is not in the demand profile",
        scenario,
        label,
        period
    )]
    UnknownState {
        scenario: String,
        period: usize,
        label: String,
    },
    #[display(
        fmt = "scenario '{}' has no probability while other scenarios do",
        _0
    )]
    MissingProbability(String),
    #[display(fmt = "scenario '{}' has invalid probability {}", scenario, probability)]
    InvalidProbability { scenario: String, probability: f64 },
    #[display(fmt = "scenario probabilities sum to {}, expected 1", _0)]
    ProbabilitySum(f64),
    #[display(
        fmt = "mean demand of '{}' has {} periods, expected {}",
        product,
        actual,
        expected
    )]
    MeanLengthMismatch {
        product: String,
        expected: usize,
        actual: usize,
    },
}

impl std::error::Error for ConfigError {}

/// The raw input tables, as read from an instance file.
///
/// Products and resources are declared by name; every cost, capacity and usage table is keyed
/// on those names and must cover exactly the declared sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceData {
    #[serde(default)]
    pub name: String,
    /// The number of periods in the planning horizon
    pub periods: usize,
    pub products: Vec<String>,
    pub resources: Vec<String>,
    /// Unit production cost per product
    pub production_cost: Table,
    /// Unit cost per period of carrying a product in storage
    pub storage_cost: Table,
    /// Unit penalty of unmet demand per product. Required when demand is given as scenarios.
    #[serde(default)]
    pub unmet_cost: Table,
    /// Per-period capacity of each resource
    pub capacity: Table,
    /// Unit cost of using a resource beyond its capacity
    pub extra_cost: Table,
    /// Optional upper bound on the overage of a resource per period
    #[serde(default)]
    pub overage_limit: Table,
    /// Resource usage per unit produced, keyed on product, then resource
    pub usage: BTreeMap<String, Table>,
    pub demand: DemandData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandData {
    /// A single known demand per product and period
    Mean { mean: BTreeMap<String, MeanDemand> },
    /// Demand levels per qualitative state, and scenarios as one state per period
    Scenarios {
        profile: BTreeMap<String, Table>,
        scenarios: Vec<ScenarioData>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeanDemand {
    /// The same demand in every period
    Constant(Quantity),
    PerPeriod(Vec<Quantity>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioData {
    /// Defaults to the state labels, concatenated when all labels are single characters
    /// (`GBG`) and joined by `-` otherwise (`low-high`)
    #[serde(default)]
    pub name: Option<String>,
    /// One demand state label per period
    pub states: Vec<String>,
    /// Either given for every scenario or for none, in which case they are uniform
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// The name of the product
    name: String,
    /// The cost of producing one unit
    production_cost: Cost,
    /// The cost of carrying one unit into the next period
    storage_cost: Cost,
    /// The penalty of leaving one unit of demand unmet
    unmet_cost: Cost,
}

impl Product {
    /// The name of the product
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The cost of producing one unit
    pub fn production_cost(&self) -> Cost {
        self.production_cost
    }
    /// The cost of carrying one unit into the next period
    pub fn storage_cost(&self) -> Cost {
        self.storage_cost
    }
    /// The penalty of leaving one unit of demand unmet. Zero for mean-demand instances
    /// that do not specify it.
    pub fn unmet_cost(&self) -> Cost {
        self.unmet_cost
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// The name of the resource
    name: String,
    /// The amount available in each period
    capacity: Quantity,
    /// The cost per unit used beyond the capacity
    extra_cost: Cost,
    /// Upper bound on the amount used beyond the capacity, if any
    overage_limit: Option<Quantity>,
}

impl Resource {
    /// The name of the resource
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The amount available in each period
    pub fn capacity(&self) -> Quantity {
        self.capacity
    }
    /// The cost per unit used beyond the capacity
    pub fn extra_cost(&self) -> Cost {
        self.extra_cost
    }
    /// Upper bound on the amount used beyond the capacity, if any
    pub fn overage_limit(&self) -> Option<Quantity> {
        self.overage_limit
    }
}

/// A validated production planning instance.
#[derive(Debug, Clone)]
pub struct Instance {
    name: String,
    periods: usize,
    products: TiVec<ProductIndex, Product>,
    resources: TiVec<ResourceIndex, Resource>,
    /// Usage of resource r per unit of product p, indexed (p, r)
    usage: TiVec<ProductIndex, TiVec<ResourceIndex, Quantity>>,
    demand: Demand,
}

impl Instance {
    /// Validates the input tables. Fails on the first inconsistency found.
    pub fn new(data: InstanceData) -> Result<Instance, ConfigError> {
        debug!("Validating instance '{}'", data.name);

        let product_names = names::<ProductIndex>("product", &data.products)?;
        let resource_names = names::<ResourceIndex>("resource", &data.resources)?;

        let production_cost = column("production_cost", &data.production_cost, &product_names)?;
        let storage_cost = column("storage_cost", &data.storage_cost, &product_names)?;
        let capacity = column("capacity", &data.capacity, &resource_names)?;
        let extra_cost = column("extra_cost", &data.extra_cost, &resource_names)?;
        let overage_limit = partial_column("overage_limit", &data.overage_limit, &resource_names)?;

        let demand = match &data.demand {
            DemandData::Mean { mean } => Demand::mean(mean, &product_names, data.periods)?,
            DemandData::Scenarios { profile, scenarios } => {
                Demand::scenarios(profile, scenarios, &product_names, data.periods)?
            }
        };

        // unmet demand is only priced when there is recourse
        let unmet_cost = match (demand.is_stochastic(), data.unmet_cost.is_empty()) {
            (false, true) => vec![0.0; product_names.len()].into(),
            _ => column("unmet_cost", &data.unmet_cost, &product_names)?,
        };

        for key in data.usage.keys() {
            if !product_names.iter().any(|p| p == key) {
                return Err(ConfigError::UnknownKey {
                    table: "usage".to_string(),
                    key: key.clone(),
                });
            }
        }
        let usage = product_names
            .iter()
            .map(|p| match data.usage.get(p) {
                Some(row) => column(&format!("usage[{}]", p), row, &resource_names),
                None => Err(ConfigError::MissingEntry {
                    table: "usage".to_string(),
                    key: p.clone(),
                }),
            })
            .collect::<Result<TiVec<ProductIndex, _>, _>>()?;

        let products = product_names
            .into_iter_enumerated()
            .map(|(p, name)| Product {
                name,
                production_cost: production_cost[p],
                storage_cost: storage_cost[p],
                unmet_cost: unmet_cost[p],
            })
            .collect();

        let resources = resource_names
            .into_iter_enumerated()
            .map(|(r, name)| Resource {
                name,
                capacity: capacity[r],
                extra_cost: extra_cost[r],
                overage_limit: overage_limit[r],
            })
            .collect();

        let instance = Instance {
            name: data.name,
            periods: data.periods,
            products,
            resources,
            usage,
            demand,
        };

        debug!(
            "Instance '{}': {} products, {} resources, {} periods, {} scenarios",
            instance.name,
            instance.products.len(),
            instance.resources.len(),
            instance.periods,
            instance.scenario_count()
        );

        Ok(instance)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of periods in the planning horizon
    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn products(&self) -> &TiSlice<ProductIndex, Product> {
        &self.products
    }

    pub fn resources(&self) -> &TiSlice<ResourceIndex, Resource> {
        &self.resources
    }

    pub fn product(&self, name: &str) -> Option<ProductIndex> {
        self.products.position(|p| p.name == name)
    }

    pub fn resource(&self, name: &str) -> Option<ResourceIndex> {
        self.resources.position(|r| r.name == name)
    }

    /// The amount of resource `r` used to produce one unit of product `p`
    pub fn usage(&self, p: ProductIndex, r: ResourceIndex) -> Quantity {
        self.usage[p][r]
    }

    pub fn demand(&self) -> &Demand {
        &self.demand
    }

    /// Whether demand is uncertain, i.e. given as a scenario set
    pub fn is_stochastic(&self) -> bool {
        self.demand.is_stochastic()
    }

    /// The number of scenarios, one for mean-demand instances
    pub fn scenario_count(&self) -> usize {
        self.demand.scenario_count()
    }

    /// The name of scenario `w`, `None` for the implicit scenario of a mean-demand instance
    pub fn scenario_name(&self, w: ScenarioIndex) -> Option<&str> {
        self.demand.scenario_name(w)
    }

    pub fn probability(&self, w: ScenarioIndex) -> f64 {
        self.demand.probability(w)
    }

    /// The expected-value counterpart of this instance: scenario demand is replaced by its
    /// probability-weighted mean per product and period.
    pub fn expected_value(&self) -> Instance {
        let demand = match &self.demand {
            Demand::Mean(_) => self.demand.clone(),
            Demand::Scenarios(set) => {
                trace!("Collapsing {} scenarios to their mean", set.scenarios().len());
                Demand::Mean(
                    self.products
                        .iter_enumerated()
                        .map(|(p, _)| {
                            (0..self.periods)
                                .map(|t| set.expected_demand(p, PeriodIndex(t)))
                                .collect()
                        })
                        .collect(),
                )
            }
        };

        Instance {
            name: format!("{}_expected_value", self.name),
            demand,
            ..self.clone()
        }
    }
}

/// Checks that a list of names is free of duplicates and empty names
pub(crate) fn names<K>(kind: &'static str, names: &[String]) -> Result<TiVec<K, String>, ConfigError>
where
    K: From<usize>,
{
    for (i, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(ConfigError::EmptyName(kind));
        }
        if names[..i].contains(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(names.to_vec().into())
}

/// Reads a table that must contain exactly one finite, non-negative value for every key
pub(crate) fn column<K>(
    table: &str,
    values: &Table,
    keys: &TiSlice<K, String>,
) -> Result<TiVec<K, f64>, ConfigError>
where
    K: From<usize>,
    usize: From<K>,
{
    partial_column(table, values, keys)?
        .into_iter_enumerated()
        .map(|(k, value)| {
            value.ok_or_else(|| ConfigError::MissingEntry {
                table: table.to_string(),
                key: keys[k].clone(),
            })
        })
        .collect()
}

/// Like [`column`], but keys may be missing
pub(crate) fn partial_column<K>(
    table: &str,
    values: &Table,
    keys: &TiSlice<K, String>,
) -> Result<TiVec<K, Option<f64>>, ConfigError>
where
    K: From<usize>,
{
    for (key, value) in values {
        if !keys.iter().any(|k| k == key) {
            return Err(ConfigError::UnknownKey {
                table: table.to_string(),
                key: key.clone(),
            });
        }
        if !value.is_finite() || *value < 0.0 {
            return Err(ConfigError::InvalidValue {
                table: table.to_string(),
                key: key.clone(),
                value: *value,
            });
        }
    }

    Ok(keys.iter().map(|k| values.get(k).copied()).collect())
}
