//! [MODULE G] Configuration data model and manager.

pub mod manager;
pub mod model;

pub use manager::{ConfigManager, ConfigStats};
pub use model::{
    AdvancedToggles, CacheSettings, Configuration, Credentials, OutputFormat, OverwritePolicy,
    RateLimitParameters, RetryParameters, SourceEntry,
};
