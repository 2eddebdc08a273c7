pub mod lifecycle;

pub use lifecycle::{RunnerHandle, StrategyRunner};
