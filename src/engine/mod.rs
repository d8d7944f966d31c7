//! The plan engine's three passes: Generator (C), Optimizer (D), Executor (E).

pub mod executor;
pub mod generator;
pub mod optimizer;

pub use executor::{Executor, ProgressCallback};
pub use generator::Generator;
pub use optimizer::Optimizer;
