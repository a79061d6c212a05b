use crate::domain::model::{JobKey, JobRegistration, Trigger};
use crate::domain::ports::{Job, SchedulingEngine};
use crate::utils::error::{RefreshError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// In-process engine that runs each registration on its own tokio task.
///
/// An identity can only be registered once while its task is alive; a
/// finished one-shot registration frees the identity again. The same holds
/// for trigger identities.
pub struct TokioEngine {
    handle: Handle,
    tasks: Mutex<HashMap<JobKey, Scheduled>>,
}

struct Scheduled {
    task: JoinHandle<()>,
    trigger_key: Option<JobKey>,
}

impl TokioEngine {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Engine on the runtime of the calling task. Panics outside a runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn registered(&self) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.lock_tasks().keys().cloned().collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        keys
    }

    pub fn is_finished(&self, key: &JobKey) -> bool {
        self.lock_tasks()
            .get(key)
            .map(|scheduled| scheduled.task.is_finished())
            .unwrap_or(true)
    }

    /// Identity of the trigger driving `key`, if it was registered with one.
    pub fn trigger_of(&self, key: &JobKey) -> Option<JobKey> {
        self.lock_tasks()
            .get(key)
            .and_then(|scheduled| scheduled.trigger_key.clone())
    }

    /// Waits for every registered task to end. Repeating triggers never end
    /// on their own, so only use this when all registrations are one-shot.
    pub async fn wait(&self) {
        let tasks: Vec<(JobKey, Scheduled)> = self.lock_tasks().drain().collect();
        for (key, scheduled) in tasks {
            if let Err(e) = scheduled.task.await {
                if !e.is_cancelled() {
                    tracing::error!("Job {} ended abnormally: {}", key, e);
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let mut tasks = self.lock_tasks();
        for (key, scheduled) in tasks.drain() {
            tracing::debug!("Stopping job {}", key);
            scheduled.task.abort();
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<JobKey, Scheduled>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SchedulingEngine for TokioEngine {
    fn register(&self, registration: JobRegistration) -> Result<()> {
        let mut tasks = self.lock_tasks();

        if tasks
            .get(&registration.key)
            .is_some_and(|scheduled| !scheduled.task.is_finished())
        {
            return Err(RefreshError::registration(
                registration.key.name.clone(),
                format!("a job with identity {} already exists", registration.key),
            ));
        }
        if let Some(trigger_key) = &registration.trigger_key {
            let taken = tasks.values().any(|scheduled| {
                !scheduled.task.is_finished() && scheduled.trigger_key.as_ref() == Some(trigger_key)
            });
            if taken {
                return Err(RefreshError::registration(
                    registration.key.name.clone(),
                    format!("a trigger with identity {} already exists", trigger_key),
                ));
            }
        }

        let JobRegistration {
            key,
            trigger,
            trigger_key,
            job,
            ..
        } = registration;
        match &trigger_key {
            Some(trigger_key) => tracing::debug!("Registering job {} with trigger {}", key, trigger_key),
            None => tracing::debug!("Registering job {}", key),
        }
        let task = self
            .handle
            .spawn(run_trigger(key.clone(), trigger, job));
        tasks.insert(key, Scheduled { task, trigger_key });
        Ok(())
    }
}

impl Drop for TokioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_trigger(key: JobKey, trigger: Trigger, job: Arc<dyn Job>) {
    sleep_until(trigger.start_at()).await;

    match trigger {
        Trigger::Once { .. } => fire(&key, job.as_ref()).await,
        Trigger::RepeatForever { every, .. } => {
            let period = every
                .to_std()
                .unwrap_or(Duration::ZERO)
                .max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                fire(&key, job.as_ref()).await;
            }
        }
    }
}

async fn sleep_until(start_at: DateTime<Utc>) {
    // 已過期的開始時間立即執行
    if let Ok(delay) = (start_at - Utc::now()).to_std() {
        tokio::time::sleep(delay).await;
    }
}

async fn fire(key: &JobKey, job: &dyn Job) {
    tracing::debug!("Firing job {}", key);
    if let Err(e) = job.execute().await {
        tracing::error!(
            "Job {} failed: {} (Category: {:?})",
            key,
            e,
            e.category()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    }
}
