//! secpush — the engine room: load config, collect from sources, route to
//! sinks, dispatch concurrently, report. One-way flow, no component calls
//! upstream (spec §2).

pub mod app_config;
pub mod collector;
pub mod error;
pub mod merge;
pub mod model;
pub mod reporter;
pub mod router;
pub mod sinks;
pub mod sources;
pub mod supervisor;
pub mod templating;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use tracing::info;

use crate::app_config::Config;
use crate::reporter::PrintFormat;

/// Flags that shape how a run reports, independent of what it loads (spec §6).
pub struct RunOptions {
    pub dry_run: bool,
    pub print_values: bool,
    pub print_format: PrintFormat,
    pub print_sync_details: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            print_values: false,
            print_format: PrintFormat::List,
            print_sync_details: false,
        }
    }
}

/// What a run produced, enough for the CLI to compute the exit code from
/// spec §6's table.
pub struct RunOutcome {
    pub results: Vec<model::DispatchResult>,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if reporter::Summary::from_results(&self.results).any_failed() {
            1
        } else {
            0
        }
    }
}

/// The driver (spec §2.9, §4.11): load → collect → route → dispatch →
/// summarize. Mirrors `kvx::run`'s shape (timed, `info!`-bookended) but
/// returns a structured outcome instead of bare `Ok(())` so the CLI can pick
/// an exit code rather than always exiting 0.
pub async fn run(config: Config, options: RunOptions) -> anyhow::Result<RunOutcome> {
    let start = SystemTime::now();
    info!(sources = config.sources.len(), sinks = config.sinks.len(), "starting run");

    let source_order: Vec<String> = config.sources.iter().map(|s| s.name.clone()).collect();

    // A source failure only gets tolerated (recorded, run continues) in the
    // dry-run preview path, and only when values were also asked for
    // (spec §4.7).
    let tolerate_source_errors = options.dry_run && options.print_values;
    let collection = collector::collect(&config.sources, &config.vars, tolerate_source_errors).await?;

    let routed = router::route(&config.sinks, &collection.sources, &source_order);

    if options.dry_run {
        let preview = reporter::build_preview(&config.sinks, &routed, &source_order);
        reporter::print_preview(&preview, options.print_format, &collection.errors);
        return Ok(RunOutcome { results: Vec::new(), cancelled: false });
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancelled.clone();
    let cancel_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_flag.store(true, Ordering::SeqCst);
        }
    });

    let results = supervisor::dispatch(&config.sinks, routed, &config.aws, cancelled.clone()).await?;
    cancel_watcher.abort();

    if options.print_sync_details {
        reporter::print_sync_details(&results, options.print_values);
    }
    reporter::print_summary(&results);

    info!(elapsed = ?start.elapsed().unwrap_or_default(), "run complete");

    Ok(RunOutcome { results, cancelled: cancelled.load(Ordering::SeqCst) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{AwsOptions, SinkOptions, SinkSpec, SourceOptions, SourceSpec, Sources};
    use crate::sinks::ssm::SsmOptions;
    use crate::sources::{SourceFilters, env};
    use std::collections::HashMap;

    #[tokio::test]
    async fn dry_run_produces_no_dispatch_results() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { std::env::set_var("SECPUSH_LIB_TEST_VAR", "x") };
        let config = Config {
            vars: HashMap::new(),
            aws: AwsOptions::default(),
            sources: vec![SourceSpec {
                name: "env".to_string(),
                options: SourceOptions::Env(env::EnvOptions),
                filters: SourceFilters {
                    keys: vec!["SECPUSH_LIB_TEST_VAR".to_string()],
                    include: Some(vec![]),
                    ..Default::default()
                },
            }],
            sinks: vec![SinkSpec {
                name: "ssm".to_string(),
                options: SinkOptions::Ssm(SsmOptions {
                    ssm_type: "SecureString".to_string(),
                    kms_key_id: None,
                    overwrite: true,
                }),
                prefix: "/app/".to_string(),
                sources: Sources::All,
                concurrency: 8,
                rate_limit_rps: 10.0,
            }],
        };
        let options = RunOptions { dry_run: true, ..RunOptions::default() };
        let outcome = run(config, options).await.unwrap();
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.exit_code(), 0);
        unsafe { std::env::remove_var("SECPUSH_LIB_TEST_VAR") };
    }
}
