use typed_index_collections::TiVec;

use crate::{
    problem::{Cost, Instance, PeriodIndex, ProductIndex, Quantity, ResourceIndex},
    scenario::ScenarioIndex,
};

macro_rules! set {
    ($type:ident, $n:expr) => {
        (0..$n).map($type::from).collect::<Vec<_>>()
    };
}

/// sets for the planning model
#[derive(Debug)]
#[allow(non_snake_case)]
pub struct Sets {
    /// Set of products
    pub P: Vec<ProductIndex>,
    /// Set of resources
    pub R: Vec<ResourceIndex>,
    /// Set of periods, in order
    pub T: Vec<PeriodIndex>,
    /// Set of scenarios. A single implicit scenario when demand is known.
    pub W: Vec<ScenarioIndex>,
}

impl Sets {
    pub fn new(instance: &Instance) -> Sets {
        Sets {
            P: set!(ProductIndex, instance.products().len()),
            R: set!(ResourceIndex, instance.resources().len()),
            T: set!(PeriodIndex, instance.periods()),
            W: set!(ScenarioIndex, instance.scenario_count()),
        }
    }
}

/// parameters for the planning model
#[allow(non_snake_case)]
pub struct Parameters<'a> {
    /// The instance these parameters "belong" to.
    instance: &'a Instance,
    /// Unit production cost of product p
    pub C_prod: TiVec<ProductIndex, Cost>,
    /// Unit storage cost of product p
    pub C_store: TiVec<ProductIndex, Cost>,
    /// Unit penalty of unmet demand of product p
    pub C_unmet: TiVec<ProductIndex, Cost>,
    /// Unit cost of extra resource r
    pub C_extra: TiVec<ResourceIndex, Cost>,
    /// Capacity of resource r in every period
    pub L: TiVec<ResourceIndex, Quantity>,
    /// Upper bound on the extra amount of resource r per period, infinite if unlimited
    pub E_max: TiVec<ResourceIndex, Quantity>,
    /// Usage of resource r per unit of product p, indexed (p, r)
    pub U: TiVec<ProductIndex, TiVec<ResourceIndex, Quantity>>,
    /// Probability of scenario w
    pub pi: TiVec<ScenarioIndex, f64>,
    /// Whether unmet demand is allowed, i.e. whether there is recourse
    pub recourse: bool,
}

#[allow(non_snake_case)]
impl<'a> Parameters<'a> {
    pub fn new(instance: &'a Instance, sets: &Sets) -> Parameters<'a> {
        let products = instance.products();
        let resources = instance.resources();

        let U = sets
            .P
            .iter()
            .map(|p| sets.R.iter().map(|r| instance.usage(*p, *r)).collect())
            .collect();

        Parameters {
            instance,
            C_prod: products.iter().map(|p| p.production_cost()).collect(),
            C_store: products.iter().map(|p| p.storage_cost()).collect(),
            C_unmet: products.iter().map(|p| p.unmet_cost()).collect(),
            C_extra: resources.iter().map(|r| r.extra_cost()).collect(),
            L: resources.iter().map(|r| r.capacity()).collect(),
            E_max: resources
                .iter()
                .map(|r| r.overage_limit().unwrap_or(f64::INFINITY))
                .collect(),
            U,
            pi: sets.W.iter().map(|w| instance.probability(*w)).collect(),
            recourse: instance.is_stochastic(),
        }
    }

    /// The demand of product `p` in period `t` under scenario `w`
    pub fn D(&self, p: ProductIndex, t: PeriodIndex, w: ScenarioIndex) -> Quantity {
        self.instance.demand().resolve(p, t, w)
    }

    pub fn product(&self, p: ProductIndex) -> &str {
        self.instance.products()[p].name()
    }

    pub fn resource(&self, r: ResourceIndex) -> &str {
        self.instance.resources()[r].name()
    }

    /// The name of scenario `w`, `None` for the implicit scenario of known demand
    pub fn scenario(&self, w: ScenarioIndex) -> Option<&str> {
        self.instance.scenario_name(w)
    }
}
