pub mod charset;
pub mod engine;
pub mod fetcher;
pub mod refresh;
pub mod scheduler;
pub mod staleness;
pub mod storage;

pub use crate::domain::model::{FetchMode, JobKey, JobRegistration, RefreshOutcome, Timestamp, Trigger};
pub use crate::domain::ports::{CharsetResolver, Job, SchedulingEngine};
pub use crate::utils::error::Result;
