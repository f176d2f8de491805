//! The Reporter (spec §4.10): renders dry-run previews in list/table/json
//! format, prints per-item sync lines, and always prints a final summary.
//!
//! Table rendering follows `progress.rs`'s `comfy_table::Table` usage; the
//! unstructured `println!` lines for preview/sync output follow
//! `kvx-cli/src/main.rs`'s direct console-message style (structured state
//! goes through `tracing`, user-facing output goes straight to stdout).

use comfy_table::{Cell, ContentArrangement, Table};
use serde::Serialize;

use crate::app_config::{SinkOptions, SinkSpec};
use crate::collector::SourceFailure;
use crate::model::{DispatchResult, Outcome};
use crate::router::RoutedSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintFormat {
    List,
    Table,
    Json,
}

impl std::str::FromStr for PrintFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(PrintFormat::List),
            "table" => Ok(PrintFormat::Table),
            "json" => Ok(PrintFormat::Json),
            other => Err(format!("unknown print format '{other}' (expected list, table, or json)")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreviewItem {
    pub name: String,
    pub value: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SinkPreview {
    pub name: String,
    #[serde(rename = "type")]
    pub type_label: &'static str,
    pub prefix: String,
    pub sources: Vec<String>,
    pub items: Vec<PreviewItem>,
}

fn type_label(options: &SinkOptions) -> &'static str {
    match options {
        SinkOptions::Ssm(_) => "ssm",
        SinkOptions::SecretsManager(_) => "secrets_manager",
    }
}

/// Build the preview model for `--dry-run` from routed (but undispatched)
/// records, without making any AWS calls.
pub fn build_preview(sink_specs: &[SinkSpec], routed: &[RoutedSink], source_order: &[String]) -> Vec<SinkPreview> {
    sink_specs
        .iter()
        .map(|spec| {
            let records = routed
                .iter()
                .find(|r| r.name == spec.name)
                .map(|r| r.records.as_slice())
                .unwrap_or_default();

            let sources = match &spec.sources {
                crate::app_config::Sources::All => source_order.to_vec(),
                crate::app_config::Sources::Named(names) => names.clone(),
            };

            SinkPreview {
                name: spec.name.clone(),
                type_label: type_label(&spec.options),
                prefix: spec.prefix.clone(),
                sources,
                items: records
                    .iter()
                    .map(|r| PreviewItem {
                        name: r.full_name.clone(),
                        value: r.value.clone(),
                        description: r.description.clone().unwrap_or_default(),
                    })
                    .collect(),
            }
        })
        .collect()
}

/// Print the dry-run preview, plus any source errors recorded while
/// tolerating failures (spec §4.7).
pub fn print_preview(previews: &[SinkPreview], format: PrintFormat, source_errors: &[SourceFailure]) {
    for failure in source_errors {
        println!("source '{}' failed: {}", failure.name, failure.message);
    }

    match format {
        PrintFormat::Json => {
            let json = serde_json::to_string_pretty(previews).expect("preview model is always serializable");
            println!("{json}");
        }
        PrintFormat::List => {
            for sink in previews {
                println!("{} ({}) prefix={}", sink.name, sink.type_label, sink.prefix);
                for item in &sink.items {
                    println!("  {} = {}", item.name, item.value);
                }
            }
        }
        PrintFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Sink", "Type", "Name", "Value"]);
            for sink in previews {
                for item in &sink.items {
                    table.add_row(vec![
                        Cell::new(&sink.name),
                        Cell::new(sink.type_label),
                        Cell::new(&item.name),
                        Cell::new(&item.value),
                    ]);
                }
            }
            println!("{table}");
        }
    }
}

/// Print per-item sync lines (`--print-sync-details`), with value snapshots
/// appended when `--print-values` is also on (spec §4.10).
pub fn print_sync_details(results: &[DispatchResult], print_values: bool) {
    for result in results {
        let mut line = format!("{} {}:{}", result.outcome.label(), result.sink_name, result.full_name);
        if print_values {
            match &result.outcome {
                Outcome::Created => line.push_str(&format!(" '{}'", result.value)),
                Outcome::Changed => {
                    let previous = result.previous_value.as_deref().unwrap_or("?");
                    line.push_str(&format!(" '{previous}' -> '{}'", result.value));
                }
                Outcome::Unchanged => line.push_str(&format!(" '{}'", result.value)),
                Outcome::Failed(reason) => line.push_str(&format!(" ({reason})")),
            }
        }
        println!("{line}");
    }
}

/// A summary for the CLI's exit-code decision (spec §6): 0 iff no item
/// failed.
pub struct Summary {
    pub total: usize,
    pub created: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[DispatchResult]) -> Self {
        let mut summary = Summary { total: results.len(), created: 0, unchanged: 0, changed: 0, failed: 0 };
        for result in results {
            match result.outcome {
                Outcome::Created => summary.created += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Changed => summary.changed += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn any_failed(&self) -> bool {
        self.failed > 0
    }
}

/// Print the final summary: counts by outcome per sink, then overall.
pub fn print_summary(results: &[DispatchResult]) {
    let mut sink_names: Vec<&str> = results.iter().map(|r| r.sink_name.as_str()).collect();
    sink_names.sort_unstable();
    sink_names.dedup();

    for sink_name in sink_names {
        let sink_results: Vec<DispatchResult> = results.iter().filter(|r| r.sink_name == sink_name).cloned().collect();
        let summary = Summary::from_results(&sink_results);
        println!(
            "{sink_name}: {} created, {} unchanged, {} changed, {} failed",
            summary.created, summary.unchanged, summary.changed, summary.failed
        );
        for result in sink_results.iter().filter(|r| r.outcome.is_failed()) {
            if let Outcome::Failed(reason) = &result.outcome {
                println!("  failed: {} -> {reason}", result.full_name);
            }
        }
    }

    let overall = Summary::from_results(results);
    println!(
        "total: {} items, {} created, {} unchanged, {} changed, {} failed",
        overall.total, overall.created, overall.unchanged, overall.changed, overall.failed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    fn result(sink: &str, outcome: Outcome) -> DispatchResult {
        DispatchResult {
            sink_name: sink.to_string(),
            full_name: "/p/X".to_string(),
            value: "v".to_string(),
            previous_value: None,
            source_name: "s".to_string(),
            outcome,
        }
    }

    #[test]
    fn summary_counts_by_outcome() {
        let results = vec![
            result("ssm", Outcome::Created),
            result("ssm", Outcome::Unchanged),
            result("ssm", Outcome::Failed(FailureReason::Exists)),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.any_failed());
    }

    #[test]
    fn no_failures_means_success() {
        let results = vec![result("ssm", Outcome::Created)];
        assert!(!Summary::from_results(&results).any_failed());
    }
}
