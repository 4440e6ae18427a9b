pub mod planning;
pub mod utils;

pub use planning::PlanningModel;
