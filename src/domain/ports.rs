use crate::domain::model::JobRegistration;
use crate::utils::error::Result;
use async_trait::async_trait;
use encoding_rs::Encoding;
use std::sync::Arc;

/// A unit of work the scheduling engine invokes on its own tasks.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self) -> Result<()>;
}

/// The external engine that fires registered jobs on their triggers.
pub trait SchedulingEngine: Send + Sync {
    fn register(&self, registration: JobRegistration) -> Result<()>;
}

impl<E: SchedulingEngine + ?Sized> SchedulingEngine for Arc<E> {
    fn register(&self, registration: JobRegistration) -> Result<()> {
        (**self).register(registration)
    }
}

/// Maps a `Content-Type` header to the character set of the body.
pub trait CharsetResolver: Send + Sync {
    fn resolve(&self, content_type: Option<&str>) -> &'static Encoding;
}
