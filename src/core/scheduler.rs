use crate::config::ScheduleConfig;
use crate::domain::model::{JobKey, JobRegistration, Trigger};
use crate::domain::ports::{Job, SchedulingEngine};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Registers jobs with a [`SchedulingEngine`].
///
/// Registration never fails loudly: a rejection from the engine is logged
/// and reported as `false`.
pub struct JobScheduler<E: SchedulingEngine> {
    engine: E,
    hourly_start_offset: Duration,
    repeat_interval: Duration,
}

impl<E: SchedulingEngine> JobScheduler<E> {
    pub fn new(engine: E) -> Self {
        Self::from_config(engine, &ScheduleConfig::default())
    }

    pub fn from_config(engine: E, config: &ScheduleConfig) -> Self {
        Self {
            engine,
            hourly_start_offset: config.hourly_start_offset(),
            repeat_interval: config.repeat_interval(),
        }
    }

    pub fn with_hourly_start_offset(mut self, offset: Duration) -> Self {
        self.hourly_start_offset = offset;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Registers `job` as `name` (group `"<name> group"`) with `trigger`.
    pub fn start_job<J: Job + 'static>(&self, job: J, trigger: Trigger, name: &str) -> bool {
        let job_type = std::any::type_name::<J>();
        tracing::info!(
            "Scheduling job {} with type {} at {}",
            name,
            job_type,
            trigger.start_at()
        );
        let registered = self.register(job, job_type, trigger, None, name);
        if registered {
            tracing::info!("Scheduling job {} with type {} worked", name, job_type);
        }
        registered
    }

    /// Registers `job` to start after the configured offset and then repeat
    /// forever at the configured interval (hourly by default).
    pub fn start_job_hourly<J: Job + 'static>(&self, job: J, name: &str) -> bool {
        let job_type = std::any::type_name::<J>();
        let trigger = self.hourly_trigger(Utc::now());
        tracing::info!(
            "Scheduling job {} with type {} at {}",
            name,
            job_type,
            trigger.start_at()
        );
        let trigger_key = JobKey::trigger_for_name(name);
        self.register(job, job_type, trigger, Some(trigger_key), name)
    }

    pub fn hourly_trigger(&self, now: DateTime<Utc>) -> Trigger {
        Trigger::repeat_forever(now + self.hourly_start_offset, self.repeat_interval)
    }

    fn register<J: Job + 'static>(
        &self,
        job: J,
        job_type: &'static str,
        trigger: Trigger,
        trigger_key: Option<JobKey>,
        name: &str,
    ) -> bool {
        let registration = JobRegistration {
            key: JobKey::for_name(name),
            trigger,
            trigger_key,
            job_type,
            job: Arc::new(job),
        };

        match self.engine.register(registration) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job = name, "{}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::{RefreshError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Accepts each identity once, like an engine without replace semantics.
    #[derive(Default)]
    struct RecordingEngine {
        registrations: Mutex<Vec<JobRegistration>>,
    }

    impl SchedulingEngine for RecordingEngine {
        fn register(&self, registration: JobRegistration) -> Result<()> {
            let mut registrations = self.registrations.lock().unwrap();
            if registrations.iter().any(|r| r.key == registration.key) {
                return Err(RefreshError::registration(
                    registration.key.name,
                    "already exists",
                ));
            }
            registrations.push(registration);
            Ok(())
        }
    }

    struct RejectingEngine;

    impl SchedulingEngine for RejectingEngine {
        fn register(&self, registration: JobRegistration) -> Result<()> {
            Err(RefreshError::registration(
                registration.key.name,
                "scheduler is shut down",
            ))
        }
    }

    #[test]
    fn test_start_job_uses_name_and_group() {
        let scheduler = JobScheduler::new(RecordingEngine::default());
        let at = Utc::now();

        assert!(scheduler.start_job(NoopJob, Trigger::once(at), "rates"));

        let registrations = scheduler.engine().registrations.lock().unwrap();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].key, JobKey::for_name("rates"));
        assert_eq!(registrations[0].key.group, "rates group");
        assert_eq!(registrations[0].trigger, Trigger::once(at));
        assert!(registrations[0].job_type.ends_with("NoopJob"));
        assert_eq!(registrations[0].trigger_key, None);
    }

    #[test]
    fn test_start_job_hourly_trigger() {
        let scheduler = JobScheduler::new(RecordingEngine::default());
        let before = Utc::now();

        assert!(scheduler.start_job_hourly(NoopJob, "rates"));

        let registrations = scheduler.engine().registrations.lock().unwrap();
        assert_eq!(
            registrations[0].trigger_key,
            Some(JobKey::trigger_for_name("rates"))
        );
        match &registrations[0].trigger {
            Trigger::RepeatForever { start_at, every } => {
                assert_eq!(*every, Duration::hours(1));
                assert!(*start_at >= before + Duration::minutes(102));
                assert!(*start_at <= Utc::now() + Duration::minutes(102));
            }
            other => panic!("unexpected trigger {:?}", other),
        }
    }

    #[test]
    fn test_hourly_offset_is_configurable() {
        let config = ScheduleConfig {
            hourly_start_offset_minutes: 5,
            repeat_interval_hours: 2,
        };
        let scheduler = JobScheduler::from_config(RecordingEngine::default(), &config);
        let now = Utc::now();

        assert_eq!(
            scheduler.hourly_trigger(now),
            Trigger::repeat_forever(now + Duration::minutes(5), Duration::hours(2))
        );

        let scheduler = scheduler.with_hourly_start_offset(Duration::zero());
        assert_eq!(scheduler.hourly_trigger(now).start_at(), now);
    }

    #[test]
    fn test_duplicate_hourly_registration_reports_false() {
        let scheduler = JobScheduler::new(RecordingEngine::default());

        assert!(scheduler.start_job_hourly(NoopJob, "rates"));
        assert!(!scheduler.start_job_hourly(NoopJob, "rates"));
        assert!(scheduler.start_job_hourly(NoopJob, "other"));
    }

    #[test]
    fn test_rejection_is_flattened_to_false() {
        let scheduler = JobScheduler::new(RejectingEngine);

        assert!(!scheduler.start_job(NoopJob, Trigger::once(Utc::now()), "rates"));
        assert!(!scheduler.start_job_hourly(NoopJob, "rates"));
    }
}
