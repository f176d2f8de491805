//! The Collector (spec §4.7): runs every source concurrently, applies the
//! common include/exclude/keys/strip_prefix post-processing, and emits one
//! `(source_name, items)` pair per source.
//!
//! Fan-out follows `supervisors.rs::start_workers`'s `futures::future::join_all`
//! pattern — one task per source, awaited together rather than sequentially.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::app_config::SourceSpec;
use crate::model::Item;
use crate::sources::{CollectContext, Source as _};

/// The authoritative item set produced by one source, after filtering.
pub struct CollectedSource {
    pub name: String,
    pub items: Vec<Item>,
}

/// A source that failed to collect. Only ever populated when the caller asked
/// to tolerate source failures (spec §4.7: `--dry-run` + `--print-values`).
pub struct SourceFailure {
    pub name: String,
    pub message: String,
}

pub struct Collection {
    pub sources: Vec<CollectedSource>,
    pub errors: Vec<SourceFailure>,
}

/// Collect every declared source. When `tolerate_errors` is false (the
/// default), the first source failure aborts the whole run. When true, the
/// failure is recorded in `errors` and the remaining sources still complete.
pub async fn collect(
    sources: &[SourceSpec],
    vars: &HashMap<String, String>,
    tolerate_errors: bool,
) -> anyhow::Result<Collection> {
    info!(count = sources.len(), "collecting from sources");

    let mut handles = Vec::with_capacity(sources.len());
    for spec in sources {
        let name = spec.name.clone();
        let backend = spec.build_backend();
        let filters = spec.filters.clone();
        let vars = vars.clone();
        handles.push(tokio::spawn(async move {
            let ctx = CollectContext { vars: &vars };
            let result = backend.collect(&ctx).await.and_then(|items| filters.apply(items));
            (name, result)
        }));
    }

    let mut collected = Vec::with_capacity(handles.len());
    let mut errors = Vec::new();

    for handle in handles {
        let (name, result) = handle.await.map_err(|e| anyhow::anyhow!("source collection task panicked: {e}"))?;
        match result {
            Ok(items) => {
                debug!(source = %name, count = items.len(), "source collected");
                collected.push(CollectedSource { name, items });
            }
            Err(err) if tolerate_errors => {
                errors.push(SourceFailure { name, message: err.to_string() });
            }
            Err(err) => {
                return Err(err.context(format!("source '{name}' failed")));
            }
        }
    }

    Ok(Collection { sources: collected, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::SourceOptions;
    use crate::sources::{SourceFilters, env};

    fn env_spec(name: &str) -> SourceSpec {
        SourceSpec {
            name: name.to_string(),
            options: SourceOptions::Env(env::EnvOptions),
            filters: SourceFilters::default(),
        }
    }

    #[tokio::test]
    async fn collects_all_sources_concurrently() {
        let specs = vec![env_spec("a"), env_spec("b")];
        let vars = HashMap::new();
        let result = collect(&specs, &vars, false).await.unwrap();
        assert_eq!(result.sources.len(), 2);
        assert!(result.errors.is_empty());
    }
}
