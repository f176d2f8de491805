//! Sink adapters: a uniform `Sink` trait and a `SinkBackend` enum
//! dispatching to one of the two concrete adapters (spec §4.9). Mirrors
//! `backends::{Sink, SinkBackend}` in the teacher.

pub mod ratelimiter;
pub mod retry;
pub mod secrets_manager;
pub mod ssm;

use async_trait::async_trait;

use crate::model::{DispatchRecord, PutOutcome};

#[async_trait]
pub trait Sink {
    /// Classify and, unless `unchanged`, perform the write for one routed
    /// item (spec §4.9's outcome table). Rate limiting and retry are the
    /// adapter's own responsibility, not the caller's.
    async fn put(&self, record: &DispatchRecord) -> PutOutcome;
}

pub enum SinkBackend {
    Ssm(ssm::SsmSink),
    SecretsManager(secrets_manager::SecretsManagerSink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn put(&self, record: &DispatchRecord) -> PutOutcome {
        match self {
            SinkBackend::Ssm(s) => s.put(record).await,
            SinkBackend::SecretsManager(s) => s.put(record).await,
        }
    }
}
