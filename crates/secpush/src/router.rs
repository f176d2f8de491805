//! The Router (spec §4.8): distributes collected items to the sinks that
//! subscribe to their source, applying the sink's prefix and de-duplicating
//! by final name.
//!
//! No direct teacher analogue — `kvx` feeds its single sink straight off the
//! collector. Modeled as plain synchronous logic instead, resolving the
//! (sink, source) pairing up front the way `transforms.rs::from_configs`
//! resolves a transform from a source/sink config pair with a match
//! expression.

use std::collections::HashSet;

use tracing::warn;

use crate::app_config::{SinkSpec, Sources};
use crate::collector::CollectedSource;
use crate::model::DispatchRecord;

/// One sink's routed, de-duplicated dispatch records, in the order the
/// Router produced them (spec §5: dispatch order within a sink is
/// preserved even though completion may race).
pub struct RoutedSink {
    pub name: String,
    pub records: Vec<DispatchRecord>,
}

/// Route every collected item to the sinks declared to receive it
/// (spec §4.8). `source_order` is the config's source declaration order,
/// used to expand a sink's absent/`*` `sources` list (Open Question #1).
pub fn route(sinks: &[SinkSpec], collected: &[CollectedSource], source_order: &[String]) -> Vec<RoutedSink> {
    sinks
        .iter()
        .map(|sink| route_one(sink, collected, source_order))
        .collect()
}

fn route_one(sink: &SinkSpec, collected: &[CollectedSource], source_order: &[String]) -> RoutedSink {
    let sink_sources: Vec<&str> = match &sink.sources {
        Sources::All => source_order.iter().map(String::as_str).collect(),
        Sources::Named(names) => names.iter().map(String::as_str).collect(),
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for source_name in sink_sources {
        let Some(source) = collected.iter().find(|c| c.name == source_name) else {
            continue;
        };
        for item in &source.items {
            let full_name = format!("{}{}", sink.prefix, item.name);
            if !seen.insert(full_name.clone()) {
                warn!(
                    sink = %sink.name,
                    source = %source_name,
                    full_name = %full_name,
                    "routing conflict: duplicate full_name, keeping the earlier source's value"
                );
                continue;
            }
            records.push(DispatchRecord {
                full_name,
                value: item.value.clone(),
                description: item.description.clone(),
                source_name: source_name.to_string(),
            });
        }
    }

    RoutedSink { name: sink.name.clone(), records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::{SinkOptions, Sources};
    use crate::model::Item;
    use crate::sinks::ssm::SsmOptions;

    fn ssm_sink(name: &str, prefix: &str, sources: Sources) -> SinkSpec {
        SinkSpec {
            name: name.to_string(),
            options: SinkOptions::Ssm(SsmOptions {
                ssm_type: "SecureString".to_string(),
                kms_key_id: None,
                overwrite: true,
            }),
            prefix: prefix.to_string(),
            sources,
            concurrency: 8,
            rate_limit_rps: 10.0,
        }
    }

    #[test]
    fn earlier_source_wins_on_conflict() {
        let collected = vec![
            CollectedSource { name: "a".to_string(), items: vec![Item::new("DB_HOST", "from-a")] },
            CollectedSource { name: "b".to_string(), items: vec![Item::new("DB_HOST", "from-b")] },
        ];
        let sink = ssm_sink("p", "/p/", Sources::Named(vec!["a".to_string(), "b".to_string()]));
        let routed = route(&[sink], &collected, &["a".to_string(), "b".to_string()]);
        assert_eq!(routed[0].records.len(), 1);
        assert_eq!(routed[0].records[0].full_name, "/p/DB_HOST");
        assert_eq!(routed[0].records[0].value, "from-a");
    }

    #[test]
    fn sink_with_star_subscribes_to_all_in_declaration_order() {
        let collected = vec![
            CollectedSource { name: "a".to_string(), items: vec![Item::new("X", "1")] },
            CollectedSource { name: "b".to_string(), items: vec![Item::new("Y", "2")] },
        ];
        let sink = ssm_sink("s", "/env/", Sources::All);
        let routed = route(&[sink], &collected, &["a".to_string(), "b".to_string()]);
        assert_eq!(routed[0].records.len(), 2);
        assert_eq!(routed[0].records[0].full_name, "/env/X");
        assert_eq!(routed[0].records[1].full_name, "/env/Y");
    }

    #[test]
    fn unrouted_source_is_not_an_error() {
        let collected = vec![CollectedSource { name: "unused".to_string(), items: vec![Item::new("X", "1")] }];
        let sink = ssm_sink("s", "/p/", Sources::Named(vec![]));
        let routed = route(&[sink], &collected, &["unused".to_string()]);
        assert!(routed[0].records.is_empty());
    }
}
