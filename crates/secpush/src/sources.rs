//! Source adapters: a uniform `Source` trait, a `SourceBackend` enum
//! dispatching to one of the four concrete adapters, and the common
//! include/exclude/keys/strip_prefix post-processing from spec §4.2.
//!
//! Mirrors `backends::{Source, SourceBackend}` in the teacher: a trait for
//! the operation, an enum for the concrete set of implementations, no
//! dynamic dispatch needed since the variant set is closed.

pub mod env;
pub mod keeper;
pub mod onepassword;
pub mod yaml;

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use crate::model::{Item, TaggedRecord};

/// Context threaded into every adapter's `collect` call.
pub struct CollectContext<'a> {
    pub vars: &'a HashMap<String, String>,
}

#[async_trait]
pub trait Source {
    async fn collect(&self, ctx: &CollectContext) -> anyhow::Result<Vec<Item>>;
}

pub enum SourceBackend {
    Env(env::EnvSource),
    Yaml(yaml::YamlSource),
    OnePassword(onepassword::OnePasswordSource),
    Keeper(keeper::KeeperSource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn collect(&self, ctx: &CollectContext) -> anyhow::Result<Vec<Item>> {
        match self {
            SourceBackend::Env(s) => s.collect(ctx).await,
            SourceBackend::Yaml(s) => s.collect(ctx).await,
            SourceBackend::OnePassword(s) => s.collect(ctx).await,
            SourceBackend::Keeper(s) => s.collect(ctx).await,
        }
    }
}

/// The common post-processing every adapter's output goes through before
/// the Collector hands it to the Router (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct SourceFilters {
    pub include_regex: Option<String>,
    pub include: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub keys: Vec<String>,
    pub strip_prefix: Option<String>,
}

impl SourceFilters {
    pub fn apply(&self, items: Vec<Item>) -> anyhow::Result<Vec<Item>> {
        let mut result: Vec<Item> = if let Some(pattern) = &self.include_regex {
            let re = Regex::new(&format!("^(?:{pattern})$"))?;
            items.iter().filter(|i| re.is_match(&i.name)).cloned().collect()
        } else if let Some(globs) = &self.include {
            items
                .iter()
                .filter(|i| globs.iter().any(|g| glob_full_match(g, &i.name)))
                .cloned()
                .collect()
        } else {
            items.clone()
        };

        if !self.exclude.is_empty() {
            let patterns = self
                .exclude
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()?;
            result.retain(|item| !patterns.iter().any(|re| re.is_match(&item.name)));
        }

        for key in &self.keys {
            if result.iter().any(|i| &i.name == key) {
                continue;
            }
            if let Some(item) = items.iter().find(|i| &i.name == key) {
                result.push(item.clone());
            }
        }

        if let Some(prefix) = &self.strip_prefix {
            for item in result.iter_mut() {
                if let Some(stripped) = item.name.strip_prefix(prefix.as_str()) {
                    item.name = stripped.to_string();
                }
            }
        }

        Ok(result)
    }
}

fn glob_full_match(pattern: &str, text: &str) -> bool {
    let mut regex_src = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_src.push_str(".*"),
            '?' => regex_src.push('.'),
            other => regex_src.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex_src.push('$');
    Regex::new(&regex_src).map(|re| re.is_match(text)).unwrap_or(false)
}

/// Collapse a set of tagged records (1Password/Keeper) into one `Item` per
/// title using the priority rule from spec §4.6: the record whose
/// highest-priority tag (greatest index in `tag_filters`) wins; ties are
/// broken by discovery order, last one wins, with a warning.
pub fn resolve_by_tag_priority(records: Vec<TaggedRecord>, tag_filters: &[String]) -> Vec<Item> {
    let priority = |record: &TaggedRecord| -> i64 {
        record
            .tags
            .iter()
            .filter_map(|tag| tag_filters.iter().position(|f| f == tag))
            .map(|idx| idx as i64)
            .max()
            .unwrap_or(-1)
    };

    let mut by_title: HashMap<String, Vec<(usize, TaggedRecord)>> = HashMap::new();
    for (discovery_index, record) in records.into_iter().enumerate() {
        by_title
            .entry(record.title.clone())
            .or_default()
            .push((discovery_index, record));
    }

    let mut items = Vec::with_capacity(by_title.len());
    for (title, candidates) in by_title {
        if candidates.len() > 1 {
            let top = candidates
                .iter()
                .map(|(_, r)| priority(r))
                .max()
                .unwrap_or(-1);
            let tied_count = candidates.iter().filter(|(_, r)| priority(r) == top).count();
            if tied_count > 1 {
                let tag_name = if top >= 0 {
                    tag_filters.get(top as usize).cloned()
                } else {
                    None
                };
                tracing::warn!(
                    title = %title,
                    tag = ?tag_name,
                    "tag priority tie for '{title}' broken by discovery order"
                );
            }
        }

        let winner = candidates
            .into_iter()
            .max_by_key(|(idx, r)| (priority(r), *idx as i64))
            .expect("at least one candidate per title")
            .1;

        items.push(Item {
            name: title,
            value: winner.value,
            description: winner.description,
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_regex_full_match_only() {
        let filters = SourceFilters {
            include_regex: Some("^APP_.*".to_string()),
            exclude: vec!["^APP_DEBUG$".to_string()],
            strip_prefix: Some("APP_".to_string()),
            ..Default::default()
        };
        let items = vec![
            Item::new("APP_DB_URL", "x"),
            Item::new("APP_DEBUG", "1"),
            Item::new("UNRELATED", "z"),
        ];
        let result = filters.apply(items).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "DB_URL");
    }

    #[test]
    fn keys_unions_regardless_of_include() {
        let filters = SourceFilters {
            include: Some(vec!["X_*".to_string()]),
            keys: vec!["Y".to_string()],
            ..Default::default()
        };
        let items = vec![Item::new("X_A", "1"), Item::new("Y", "2"), Item::new("Z", "3")];
        let result = filters.apply(items).unwrap();
        let names: Vec<_> = result.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["X_A", "Y"]);
    }

    #[test]
    fn tag_priority_picks_highest_index() {
        let tag_filters = vec!["default".to_string(), "prod".to_string()];
        let records = vec![
            TaggedRecord {
                title: "APP_DB_PASSWORD".to_string(),
                value: "dev-pw".to_string(),
                description: None,
                tags: vec!["default".to_string()],
            },
            TaggedRecord {
                title: "APP_DB_PASSWORD".to_string(),
                value: "prod-pw".to_string(),
                description: None,
                tags: vec!["prod".to_string()],
            },
        ];
        let items = resolve_by_tag_priority(records, &tag_filters);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, "prod-pw");
    }

    #[test]
    fn tag_priority_tie_breaks_on_discovery_order() {
        let tag_filters = vec!["prod".to_string()];
        let records = vec![
            TaggedRecord {
                title: "T".to_string(),
                value: "first".to_string(),
                description: None,
                tags: vec!["prod".to_string()],
            },
            TaggedRecord {
                title: "T".to_string(),
                value: "second".to_string(),
                description: None,
                tags: vec!["prod".to_string()],
            },
        ];
        let items = resolve_by_tag_priority(records, &tag_filters);
        assert_eq!(items[0].value, "second");
    }
}
