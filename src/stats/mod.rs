pub mod engine;
pub mod pipelines;

pub use engine::{FormulasAndElements, GlobalStats, GroupCount, StatsEngine, UserStats};
