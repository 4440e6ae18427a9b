use std::{
    error::Error,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use clap::{ArgEnum, Parser};
use log::info;

use prodplan::{models::PlanningModel, solver, Instance, InstanceData, Solver};

#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Microlp,
    #[cfg(feature = "gurobi")]
    Gurobi,
}

/// Plans production under uncertain demand by solving the deterministic equivalent
#[derive(Parser, Debug)]
#[clap(name = "prodplan", version)]
struct Args {
    /// Instance file (JSON)
    instance: PathBuf,

    /// The LP solver to use
    #[clap(short, long, arg_enum, default_value = "microlp")]
    solver: Backend,

    /// Print the report as JSON instead of text
    #[clap(long)]
    json: bool,

    /// Write the linear program in LP format to this file
    #[clap(long)]
    write_lp: Option<PathBuf>,

    /// Replace scenario demand by its expected value before planning
    #[clap(long)]
    expected_value: bool,

    /// Let the solver print its own log, where supported
    #[clap(short, long)]
    verbose: bool,
}

fn backend(args: &Args) -> Box<dyn Solver> {
    match args.solver {
        Backend::Microlp => Box::new(solver::MicroLp),
        #[cfg(feature = "gurobi")]
        Backend::Gurobi => Box::new(solver::gurobi::Gurobi {
            verbose: args.verbose,
        }),
    }
}

fn read_instance(path: &Path) -> Result<InstanceData, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let data = read_instance(&args.instance)?;
    let mut instance = Instance::new(data)?;
    if args.expected_value {
        info!("Planning for the expected demand of '{}'", instance.name());
        instance = instance.expected_value();
    }

    let model = PlanningModel::build(instance)?;
    if let Some(path) = &args.write_lp {
        std::fs::write(path, model.lp().to_string())?;
        info!("Wrote linear program to {}", path.display());
    }

    let solution = model.solve(&backend(&args))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&solution.report())?);
    } else {
        print!("{}", solution);
    }

    Ok(())
}
