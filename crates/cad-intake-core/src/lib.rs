pub mod backup;
pub mod cad;
pub mod classify;
pub mod combine;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod freshness;
pub mod inbox;
pub mod model;
pub mod pipeline;
pub mod prepare;
pub mod preview;
pub mod progress;
pub mod report;
pub mod storage;
pub mod tables;

pub use cad::{CadEngine, ConsoleEngine};
pub use config::AppConfig;
pub use engine::{UpdateEngine, UpdateOptions, UpdateResult};
pub use error::{Error, Result};
pub use progress::{ProgressReporter, SilentReporter};
pub use report::RunReport;
pub use storage::{Database, MetadataStore};
