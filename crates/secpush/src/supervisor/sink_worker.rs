//! One sink's worker loop: pull a dispatch record off the shared channel,
//! check the cancellation flag, write it, and classify the outcome.
//!
//! Adapted from `supervisors/workers/sink_worker.rs`'s receive-loop
//! structure — that worker buffers pages and flushes on a byte threshold;
//! this one has no buffering to do, so it's one record per `recv()`, gated
//! by the sink's own rate limiter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::model::{DispatchRecord, DispatchResult};
use crate::sinks::{Sink as _, SinkBackend};

pub struct SinkWorker {
    rx: Receiver<DispatchRecord>,
    sink: Arc<SinkBackend>,
    sink_name: String,
    cancelled: Arc<AtomicBool>,
    dispatched: Arc<AtomicUsize>,
}

impl SinkWorker {
    pub fn new(
        rx: Receiver<DispatchRecord>,
        sink: Arc<SinkBackend>,
        sink_name: String,
        cancelled: Arc<AtomicBool>,
        dispatched: Arc<AtomicUsize>,
    ) -> Self {
        Self { rx, sink, sink_name, cancelled, dispatched }
    }

    /// Run until the channel closes or cancellation is signalled. A
    /// cancellation check happens before each pull, never mid-write — the
    /// spec requires in-flight AWS calls to finish, not abort (spec §5).
    pub fn start(self) -> JoinHandle<Vec<DispatchResult>> {
        tokio::spawn(async move {
            let mut results = Vec::new();
            loop {
                if self.cancelled.load(Ordering::SeqCst) {
                    debug!(sink = %self.sink_name, "cancellation observed, worker stopping");
                    break;
                }
                match self.rx.recv().await {
                    Ok(record) => {
                        debug!(sink = %self.sink_name, full_name = %record.full_name, "dispatching item");
                        let put_outcome = self.sink.put(&record).await;
                        results.push(DispatchResult {
                            sink_name: self.sink_name.clone(),
                            full_name: record.full_name,
                            value: record.value,
                            previous_value: put_outcome.previous_value,
                            source_name: record.source_name,
                            outcome: put_outcome.outcome,
                        });
                        self.dispatched.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => break,
                }
            }
            results
        })
    }
}
