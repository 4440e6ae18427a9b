use prodplan::{
    lp::LinearProgram,
    models::PlanningModel,
    problem::{PeriodIndex, ProductIndex, ResourceIndex},
    scenario::ScenarioIndex,
    solver::{MicroLp, Solver, SolverError, SolverOutput, Status},
    ConfigError, Error, Instance, InstanceData,
};
use serde_json::json;

const EPS: f64 = 1e-6;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPS,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn load(path: &str) -> InstanceData {
    let file = std::fs::File::open(path).unwrap();
    serde_json::from_reader(std::io::BufReader::new(file)).unwrap()
}

fn tomatoes() -> Instance {
    Instance::new(load("data/tomatoes_stochastic.json")).unwrap()
}

/// One product whose demand jumps above capacity in the second period
fn ramp(demand: serde_json::Value) -> InstanceData {
    serde_json::from_value(json!({
        "name": "ramp",
        "periods": 2,
        "products": ["A"],
        "resources": ["R"],
        "production_cost": { "A": 1.0 },
        "storage_cost": { "A": 0.5 },
        "unmet_cost": { "A": 100.0 },
        "capacity": { "R": 10.0 },
        "extra_cost": { "R": 3.0 },
        "usage": { "A": { "R": 1.0 } },
        "demand": demand
    }))
    .unwrap()
}

/// A single period with a good and a bad demand state
fn newsvendor(unmet_cost: f64, storage_cost: f64, probabilities: Option<(f64, f64)>) -> Instance {
    let scenarios = match probabilities {
        Some((good, bad)) => json!([
            { "states": ["G"], "probability": good },
            { "states": ["B"], "probability": bad }
        ]),
        None => json!([{ "states": ["G"] }, { "states": ["B"] }]),
    };
    let data = serde_json::from_value(json!({
        "name": "newsvendor",
        "periods": 1,
        "products": ["A"],
        "resources": ["R"],
        "production_cost": { "A": 1.0 },
        "storage_cost": { "A": storage_cost },
        "unmet_cost": { "A": unmet_cost },
        "capacity": { "R": 100.0 },
        "extra_cost": { "R": 1.0 },
        "usage": { "A": { "R": 1.0 } },
        "demand": {
            "kind": "scenarios",
            "profile": { "G": { "A": 10.0 }, "B": { "A": 0.0 } },
            "scenarios": scenarios
        }
    }))
    .unwrap();
    Instance::new(data).unwrap()
}

fn solve(instance: Instance) -> prodplan::PlanningSolution {
    PlanningModel::build(instance)
        .unwrap()
        .solve(&MicroLp)
        .unwrap()
}

fn a() -> ProductIndex {
    ProductIndex::from(0)
}

#[test]
fn stores_early_instead_of_buying_extra_capacity() {
    let demand = json!({ "kind": "mean", "mean": { "A": [4.0, 14.0] } });
    let solution = solve(Instance::new(ramp(demand)).unwrap());
    let (t1, t2) = (PeriodIndex::from(0), PeriodIndex::from(1));
    let w = ScenarioIndex::from(0);

    assert_eq!(solution.status(), &Status::Optimal);
    assert_close(solution.produce(a(), t1).unwrap(), 8.0);
    assert_close(solution.produce(a(), t2).unwrap(), 10.0);
    assert_close(solution.storage(a(), t1, w).unwrap(), 4.0);
    assert_close(solution.storage(a(), t2, w).unwrap(), 0.0);
    assert_close(solution.extra(ResourceIndex::from(0), t2).unwrap(), 0.0);
    assert_close(solution.objective().unwrap(), 20.0);
    assert_eq!(solution.unmet(a(), t1, w), None);
}

#[test]
fn single_scenario_matches_known_demand() {
    let demand = json!({
        "kind": "scenarios",
        "profile": { "low": { "A": 4.0 }, "high": { "A": 14.0 } },
        "scenarios": [{ "states": ["low", "high"] }]
    });
    let instance = Instance::new(ramp(demand)).unwrap();
    assert_eq!(instance.scenario_name(ScenarioIndex::from(0)), Some("low-high"));

    let solution = solve(instance);
    let w = ScenarioIndex::from(0);
    assert_close(solution.produce(a(), PeriodIndex::from(0)).unwrap(), 8.0);
    assert_close(solution.unmet(a(), PeriodIndex::from(1), w).unwrap(), 0.0);
    assert_close(solution.objective().unwrap(), 20.0);
}

#[test]
fn cheap_shortage_is_left_unmet() {
    let solution = solve(newsvendor(1.5, 0.0, None));
    let t = PeriodIndex::from(0);

    assert_close(solution.produce(a(), t).unwrap(), 0.0);
    assert_close(solution.unmet(a(), t, ScenarioIndex::from(0)).unwrap(), 10.0);
    assert_close(solution.objective().unwrap(), 7.5);
}

#[test]
fn expensive_shortage_is_covered() {
    let solution = solve(newsvendor(3.0, 0.0, None));
    let t = PeriodIndex::from(0);

    assert_close(solution.produce(a(), t).unwrap(), 10.0);
    assert_close(solution.objective().unwrap(), 10.0);
}

#[test]
fn likely_scenarios_weigh_more() {
    let solution = solve(newsvendor(1.5, 0.1, Some((0.8, 0.2))));
    let t = PeriodIndex::from(0);
    let (good, bad) = (ScenarioIndex::from(0), ScenarioIndex::from(1));

    assert_close(solution.produce(a(), t).unwrap(), 10.0);
    assert_close(solution.storage(a(), t, good).unwrap(), 0.0);
    assert_close(solution.storage(a(), t, bad).unwrap(), 10.0);
    assert_close(solution.objective().unwrap(), 10.2);

    let costs = solution.costs().unwrap();
    assert_close(costs.production, 10.0);
    assert_close(costs.expected_storage, 0.2);
    assert_close(costs.total(), 10.2);
    assert_close(solution.scenario_cost(bad).unwrap(), 1.0);
}

#[test]
fn impossible_demand_is_infeasible() {
    let mut data = ramp(json!({ "kind": "mean", "mean": { "A": 5.0 } }));
    data.capacity.insert("R".to_string(), 0.0);
    data.overage_limit.insert("R".to_string(), 0.0);

    let solution = solve(Instance::new(data).unwrap());
    assert_eq!(solution.status(), &Status::Infeasible);
    assert!(!solution.is_optimal());
    assert_eq!(solution.objective(), None);
    assert_eq!(solution.produce(a(), PeriodIndex::from(0)), None);
}

#[test]
fn tomatoes_model_has_one_block_per_scenario() {
    let model = PlanningModel::build(tomatoes()).unwrap();
    let lp = model.lp();

    // produce 3x3, extra 4x3, storage and unmet 3x3x8
    assert_eq!(lp.variables().len(), 9 + 12 + 72 + 72);
    assert_eq!(lp.constraints().len(), 12 + 72);

    let stored = lp.variable("storage[Paste,1,GGG]").unwrap();
    assert_close(lp.objective().coefficient(stored), 0.5 / 8.0);
    let unmet = lp.variable("unmet[Salsa,3,BBB]").unwrap();
    assert_close(lp.objective().coefficient(unmet), 6.0 / 8.0);

    // production is shared by every scenario
    let produce = lp.variable("produce[Ketchup,2]").unwrap();
    for name in ["GGG", "GBB", "BGB", "BBB"] {
        let balance = lp
            .constraint(&format!("inventory[Ketchup,2,{}]", name))
            .unwrap();
        assert_eq!(balance.lhs().coefficient(produce), 1.0);
    }
    assert_eq!(
        lp.constraint("inventory[Ketchup,2,GBB]").unwrap().rhs(),
        30.0
    );
}

#[test]
fn tomatoes_plan_is_balanced_in_every_scenario() {
    let instance = tomatoes();
    let model = PlanningModel::build(instance.clone()).unwrap();
    let solution = model.solve(&MicroLp).unwrap();
    assert!(solution.is_optimal());

    let raw = &solution.values().unwrap().raw;
    assert_eq!(model.lp().violations(raw, EPS), vec![]);

    let demand = instance.demand();
    for (p, t, w) in itertools::iproduct!(
        (0..3).map(ProductIndex::from),
        (0..3).map(PeriodIndex::from),
        (0..8).map(ScenarioIndex::from)
    ) {
        let incoming = t.previous().map_or(0.0, |prev| solution.storage(p, prev, w).unwrap());
        let available = incoming + solution.produce(p, t).unwrap();
        let served = solution.storage(p, t, w).unwrap() + demand.resolve(p, t, w)
            - solution.unmet(p, t, w).unwrap();
        assert_close(available, served);
    }

    let costs = solution.costs().unwrap();
    assert_close(costs.total(), solution.objective().unwrap());
}

#[test]
fn more_capacity_never_costs_more() {
    let baseline = solve(tomatoes()).objective().unwrap();

    let mut data = load("data/tomatoes_stochastic.json");
    data.capacity.insert("Labor".to_string(), 300.0);
    let relaxed = solve(Instance::new(data).unwrap()).objective().unwrap();

    assert!(relaxed <= baseline + EPS);
}

#[test]
fn expected_value_matches_mean_instance() {
    let collapsed = tomatoes().expected_value();
    assert!(!collapsed.is_stochastic());
    let mean = Instance::new(load("data/tomatoes_mean.json")).unwrap();

    assert_close(
        solve(collapsed).objective().unwrap(),
        solve(mean).objective().unwrap(),
    );
}

#[test]
fn exports_lp_format() {
    let demand = json!({ "kind": "mean", "mean": { "A": 5.0 } });
    let model = PlanningModel::build(Instance::new(ramp(demand)).unwrap()).unwrap();
    let text = model.lp().to_string();

    assert!(text.starts_with("\\ Problem: ramp\nMinimize\n"));
    assert!(text.contains(" resource(R,1): "));
    assert!(text.contains(" inventory(A,2): "));
    assert!(text.trim_end().ends_with("End"));
}

#[test]
fn invalid_instance_fails_before_solving() {
    let mut data = ramp(json!({ "kind": "mean", "mean": { "A": 5.0 } }));
    data.production_cost.clear();

    match prodplan::plan(data, &MicroLp) {
        Err(Error::Config(ConfigError::MissingEntry { table, key })) => {
            assert_eq!(table, "production_cost");
            assert_eq!(key, "A");
        }
        other => panic!("expected a configuration error, got {:?}", other.map(|s| s.report())),
    }
}

/// Stands in for a real solver
enum Stub {
    Infeasible,
    Failing,
    ShortAnswer,
    OptimalWithoutPoint,
    /// Claims optimality for the all-zero point
    Zeros,
}

impl Solver for Stub {
    fn name(&self) -> &str {
        "stub"
    }

    fn solve(&self, lp: &LinearProgram) -> Result<SolverOutput, SolverError> {
        match self {
            Stub::Infeasible => Ok(SolverOutput::without_solution(Status::Infeasible)),
            Stub::Failing => Err(SolverError::Backend("license expired".to_string())),
            Stub::ShortAnswer => Ok(SolverOutput::optimal(0.0, vec![0.0].into())),
            Stub::Zeros => {
                let values = vec![0.0; lp.variables().len()].into();
                Ok(SolverOutput::optimal(0.0, values))
            }
            Stub::OptimalWithoutPoint => Ok(SolverOutput {
                status: Status::Optimal,
                solution: None,
            }),
        }
    }
}

#[test]
fn solver_outcomes_are_propagated() {
    let demand = json!({ "kind": "mean", "mean": { "A": 5.0 } });
    let model = PlanningModel::build(Instance::new(ramp(demand)).unwrap()).unwrap();

    let solution = model.solve(&Stub::Infeasible).unwrap();
    assert_eq!(solution.status(), &Status::Infeasible);
    assert!(solution.values().is_none());

    assert!(matches!(
        model.solve(&Stub::Failing),
        Err(Error::Solver(SolverError::Backend(msg))) if msg == "license expired"
    ));
    assert!(matches!(
        model.solve(&Stub::ShortAnswer),
        Err(Error::Solver(SolverError::ValueCount { expected: 6, actual: 1 }))
    ));
    assert!(matches!(
        model.solve(&Stub::OptimalWithoutPoint),
        Err(Error::Solver(SolverError::MissingSolution))
    ));

    // demand of 5 in both periods cannot be met by producing nothing
    match model.solve(&Stub::Zeros) {
        Err(Error::Solver(SolverError::InfeasiblePoint { count, first })) => {
            assert_eq!(count, 2);
            assert_eq!(first, "constraint inventory[A,1] is violated by 5");
        }
        other => panic!("expected the point to be rejected, got {:?}", other.map(|s| s.report())),
    }
}

#[test]
fn models_can_be_shared_between_threads() {
    fn shareable<T: Send + Sync>() {}
    shareable::<Instance>();
    shareable::<PlanningModel>();
    shareable::<prodplan::PlanningSolution>();
}
