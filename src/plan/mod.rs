//! The plan engine: item identity (Module A) and the ordered plan
//! container that holds it (Module B).

pub mod item;
pub mod plan;

pub use item::{ItemStatus, ItemType, PlanItem};
pub use plan::{DownloadPlan, PlanStatistics};
