pub mod plan;
#[allow(clippy::module_inception)]
pub mod planner;
