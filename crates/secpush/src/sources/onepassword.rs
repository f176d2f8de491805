//! The `1password` adapter (spec §4.6): fetches tagged records through the
//! `op` CLI, bounded by `options.concurrency`, and collapses them to `Item`s
//! via tag priority. `op` is treated as an opaque JSON provider — its shape
//! is not re-specified here (out of scope per spec.md §1).

use std::sync::Arc;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::model::{Item, TaggedRecord};

use super::{CollectContext, Source};

#[derive(Debug, Clone)]
pub struct OnePasswordOptions {
    pub vault: String,
    pub tag_filters: Vec<String>,
    pub include_regex: Option<String>,
    pub concurrency: usize,
}

impl Default for OnePasswordOptions {
    fn default() -> Self {
        Self {
            vault: String::new(),
            tag_filters: Vec::new(),
            include_regex: None,
            concurrency: 8,
        }
    }
}

pub struct OnePasswordSource {
    options: OnePasswordOptions,
}

impl OnePasswordSource {
    pub fn new(options: OnePasswordOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Source for OnePasswordSource {
    async fn collect(&self, _ctx: &CollectContext) -> anyhow::Result<Vec<Item>> {
        let list = run_json_command(Command::new("op").args([
            "item",
            "list",
            "--vault",
            &self.options.vault,
            "--format",
            "json",
        ]))
        .await?;
        let entries = list.as_array().context("'op item list' did not return a JSON array")?;

        let title_filter = self
            .options
            .include_regex
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        let mut uids = Vec::new();
        for entry in entries {
            let title = entry.get("title").and_then(|v| v.as_str()).unwrap_or_default();
            if let Some(re) = &title_filter {
                if !re.is_match(title) {
                    continue;
                }
            }
            let uid = entry
                .get("id")
                .and_then(|v| v.as_str())
                .context("'op item list' entry missing 'id'")?
                .to_string();
            uids.push(uid);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(uids.len());
        for uid in uids {
            let permit_source = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                fetch_one(&uid).await
            }));
        }

        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(handle.await.context("1password fetch task panicked")??);
        }

        let tag_filters = &self.options.tag_filters;
        if !tag_filters.is_empty() {
            records.retain(|r: &TaggedRecord| r.tags.iter().any(|t| tag_filters.contains(t)));
        }

        Ok(super::resolve_by_tag_priority(records, tag_filters))
    }
}

async fn fetch_one(uid: &str) -> anyhow::Result<TaggedRecord> {
    let value = run_json_command(Command::new("op").args(["item", "get", uid, "--format", "json"])).await?;

    let title = value
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let tags = value
        .get("tags")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let fields = value
        .get("fields")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let field_value = select_field(&fields)
        .with_context(|| format!("1password item '{title}' has no usable field value"))?;

    Ok(TaggedRecord {
        title,
        value: field_value,
        description: None,
        tags,
    })
}

/// Field selection priority from spec §4.6: named `password` field → any
/// concealed field → first field with a non-empty value.
fn select_field(fields: &[serde_json::Value]) -> Option<String> {
    let by_label = |label: &str| {
        fields.iter().find(|f| {
            f.get("id").and_then(|v| v.as_str()) == Some(label)
                || f.get("label").and_then(|v| v.as_str()) == Some(label)
        })
    };

    if let Some(field) = by_label("password") {
        if let Some(v) = field.get("value").and_then(|v| v.as_str()) {
            return Some(v.to_string());
        }
    }

    if let Some(field) = fields.iter().find(|f| f.get("type").and_then(|v| v.as_str()) == Some("CONCEALED")) {
        if let Some(v) = field.get("value").and_then(|v| v.as_str()) {
            return Some(v.to_string());
        }
    }

    fields
        .iter()
        .find_map(|f| f.get("value").and_then(|v| v.as_str()).filter(|s| !s.is_empty()).map(str::to_string))
}

async fn run_json_command(command: &mut Command) -> anyhow::Result<serde_json::Value> {
    let output = command.output().await.context("failed to spawn 'op' subprocess")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("'op' exited with {}: {stderr}", output.status);
    }
    serde_json::from_slice(&output.stdout).context("'op' did not produce valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_named_password_field() {
        let fields = vec![
            serde_json::json!({"id": "username", "value": "bob"}),
            serde_json::json!({"id": "password", "value": "secret"}),
        ];
        assert_eq!(select_field(&fields), Some("secret".to_string()));
    }

    #[test]
    fn falls_back_to_concealed_field() {
        let fields = vec![
            serde_json::json!({"id": "notes", "value": "n/a"}),
            serde_json::json!({"type": "CONCEALED", "value": "hidden"}),
        ];
        assert_eq!(select_field(&fields), Some("hidden".to_string()));
    }

    #[test]
    fn falls_back_to_first_nonempty_value() {
        let fields = vec![
            serde_json::json!({"id": "empty", "value": ""}),
            serde_json::json!({"id": "other", "value": "x"}),
        ];
        assert_eq!(select_field(&fields), Some("x".to_string()));
    }
}
