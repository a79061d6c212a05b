use crate::domain::ports::Job;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Milliseconds since the Unix epoch. Values produced by
/// [`crate::core::staleness::now`] are truncated to whole seconds.
pub type Timestamp = i64;

/// Identity under which a job is handed to the scheduling engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    /// The group is always `"<name> group"`.
    pub fn for_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            group: format!("{} group", name),
        }
    }

    /// Identity of the repeating trigger that drives job `name`.
    pub fn trigger_for_name(name: &str) -> Self {
        Self {
            name: format!("{} trigger", name),
            group: format!("{} triggerGroup", name),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fire exactly once.
    Once { start_at: DateTime<Utc> },
    /// Fire at `start_at` and then every `every`, forever.
    RepeatForever {
        start_at: DateTime<Utc>,
        every: Duration,
    },
}

impl Trigger {
    pub fn once(start_at: DateTime<Utc>) -> Self {
        Self::Once { start_at }
    }

    pub fn repeat_forever(start_at: DateTime<Utc>, every: Duration) -> Self {
        Self::RepeatForever { start_at, every }
    }

    pub fn start_at(&self) -> DateTime<Utc> {
        match self {
            Self::Once { start_at } | Self::RepeatForever { start_at, .. } => *start_at,
        }
    }
}

/// What the scheduler hands over to the engine. The engine owns it afterwards.
#[derive(Clone)]
pub struct JobRegistration {
    pub key: JobKey,
    pub trigger: Trigger,
    /// Set when the trigger has its own identity (hourly registrations).
    pub trigger_key: Option<JobKey>,
    pub job_type: &'static str,
    pub job: Arc<dyn Job>,
}

impl fmt::Debug for JobRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistration")
            .field("key", &self.key)
            .field("trigger", &self.trigger)
            .field("trigger_key", &self.trigger_key)
            .field("job_type", &self.job_type)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Decode the body into text lines and store them as CP1252.
    #[default]
    Lines,
    /// Store the body bytes verbatim.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Skipped { last_run: Timestamp },
    Lines { count: usize, run_at: Timestamp },
    Bytes { len: usize, run_at: Timestamp },
}
