//! The per-sink dispatch supervisor (spec §4.9, §5): builds each sink's AWS
//! client, feeds its routed records into a bounded channel, and runs a fixed
//! pool of workers against it.
//!
//! Grounded on `supervisors.rs::start_workers`'s channel wiring and
//! `futures::future::join_all` fan-out — one queue, N workers, `result??`
//! double-unwrap (JoinHandle, then the worker's own panic boundary).

pub mod sink_worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::app_config::{AwsOptions, SinkSpec};
use crate::model::{DispatchRecord, DispatchResult};
use crate::router::RoutedSink;

/// Build every sink's backend and run its worker pool against its routed
/// records. Sinks run one after another (each sink owns its own worker pool
/// and rate limiter internally, so there's no cross-sink contention to
/// parallelize further here) — within a sink, the pool is fully concurrent.
pub async fn dispatch(
    sink_specs: &[SinkSpec],
    routed: Vec<RoutedSink>,
    aws: &AwsOptions,
    cancelled: Arc<AtomicBool>,
) -> anyhow::Result<Vec<DispatchResult>> {
    let mut all_results = Vec::new();

    for routed_sink in routed {
        let spec = sink_specs
            .iter()
            .find(|s| s.name == routed_sink.name)
            .expect("router only emits sinks it was given");

        if routed_sink.records.is_empty() {
            continue;
        }

        let total = routed_sink.records.len();
        info!(sink = %spec.name, count = total, "dispatching to sink");
        let backend = Arc::new(spec.build_backend(aws).await?);

        let (tx, rx) = async_channel::bounded::<DispatchRecord>(total);
        for record in routed_sink.records {
            tx.send(record).await.expect("channel freshly created, cannot be closed yet");
        }
        tx.close();

        let dispatched = Arc::new(AtomicUsize::new(0));
        let progress = progress_bar(&spec.name, total);

        let mut handles = Vec::with_capacity(spec.concurrency);
        for _ in 0..spec.concurrency {
            let worker = sink_worker::SinkWorker::new(
                rx.clone(),
                backend.clone(),
                spec.name.clone(),
                cancelled.clone(),
                dispatched.clone(),
            );
            handles.push(worker.start());
        }

        let ticker = {
            let progress = progress.clone();
            let dispatched = dispatched.clone();
            tokio::spawn(async move {
                loop {
                    progress.set_position(dispatched.load(Ordering::Relaxed) as u64);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
            })
        };

        let worker_results = futures::future::join_all(handles).await;
        ticker.abort();
        progress.set_position(dispatched.load(Ordering::Relaxed) as u64);
        progress.finish_and_clear();

        for handle_result in worker_results {
            let results = handle_result.map_err(|e| anyhow::anyhow!("sink worker task panicked: {e}"))?;
            all_results.extend(results);
        }
    }

    Ok(all_results)
}

/// A plain count-based progress bar for one sink's dispatch, styled after
/// `progress.rs`'s bar but without its byte/doc-rate tracking — there's no
/// throughput metric worth showing for a one-shot push of a few hundred items.
fn progress_bar(sink_name: &str, total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{prefix} [{bar:30}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_prefix(sink_name.to_string());
    bar
}
