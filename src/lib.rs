pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::RefreshConfig;

pub use self::core::{
    charset::HeaderCharsetResolver, engine::TokioEngine, fetcher::ResourceFetcher,
    refresh::RefreshJob, scheduler::JobScheduler, storage::StorageWriter,
};
pub use domain::model::{FetchMode, JobKey, RefreshOutcome, Timestamp, Trigger};
pub use utils::error::{RefreshError, Result};
