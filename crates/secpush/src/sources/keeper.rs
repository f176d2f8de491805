//! The `keeper` adapter (spec §4.6): fetches tagged records through the
//! `keeper` CLI and collapses them to `Item`s via tag priority. Tags live in
//! a custom field literally named `tags`, comma-separated. `keeper` is
//! treated as an opaque JSON provider, same as `op`.

use std::sync::Arc;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::model::{Item, TaggedRecord};

use super::{CollectContext, Source};

#[derive(Debug, Clone)]
pub struct KeeperOptions {
    pub tag_filters: Vec<String>,
    pub include_regex: Option<String>,
    pub concurrency: usize,
}

impl Default for KeeperOptions {
    fn default() -> Self {
        Self {
            tag_filters: Vec::new(),
            include_regex: None,
            concurrency: 8,
        }
    }
}

pub struct KeeperSource {
    options: KeeperOptions,
}

impl KeeperSource {
    pub fn new(options: KeeperOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Source for KeeperSource {
    async fn collect(&self, _ctx: &CollectContext) -> anyhow::Result<Vec<Item>> {
        let list = run_json_command(Command::new("keeper").args(["list", "--format", "json"])).await?;
        let entries = list.as_array().context("'keeper list' did not return a JSON array")?;

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
                .get("uid")
                .and_then(|v| v.as_str())
                .context("'keeper list' entry missing 'uid'")?
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
            records.push(handle.await.context("keeper fetch task panicked")??);
        }

        let tag_filters = &self.options.tag_filters;
        if !tag_filters.is_empty() {
            records.retain(|r: &TaggedRecord| r.tags.iter().any(|t| tag_filters.contains(t)));
        }

        Ok(super::resolve_by_tag_priority(records, tag_filters))
    }
}

async fn fetch_one(uid: &str) -> anyhow::Result<TaggedRecord> {
    let record = run_json_command(Command::new("keeper").args(["get", uid, "--format", "json"])).await?;

    let title = record
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let tags = extract_tags(&record);
    let value = select_value(&record)
        .with_context(|| format!("keeper record '{title}' has no usable value"))?;

    Ok(TaggedRecord {
        title,
        value,
        description: None,
        tags,
    })
}

fn custom_fields(record: &serde_json::Value) -> &[serde_json::Value] {
    record
        .get("custom_fields")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn extract_tags(record: &serde_json::Value) -> Vec<String> {
    custom_fields(record)
        .iter()
        .find(|f| f.get("label").and_then(|v| v.as_str()) == Some("tags"))
        .and_then(|f| f.get("value").and_then(|v| v.as_str()))
        .map(|raw| raw.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
        .unwrap_or_default()
}

/// Value selection priority from spec §4.6: record-level password → any
/// `password`/`login`/`note` custom field → other custom fields (excluding
/// `tags`) → record notes body.
fn select_value(record: &serde_json::Value) -> Option<String> {
    if let Some(password) = record.get("password").and_then(|v| v.as_str()) {
        if !password.is_empty() {
            return Some(password.to_string());
        }
    }

    let fields = custom_fields(record);
    for label in ["password", "login", "note"] {
        if let Some(field) = fields.iter().find(|f| f.get("label").and_then(|v| v.as_str()) == Some(label)) {
            if let Some(v) = field.get("value").and_then(|v| v.as_str()) {
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }

    for field in fields {
        if field.get("label").and_then(|v| v.as_str()) == Some("tags") {
            continue;
        }
        if let Some(v) = field.get("value").and_then(|v| v.as_str()) {
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    record.get("notes").and_then(|v| v.as_str()).map(str::to_string)
}

async fn run_json_command(command: &mut Command) -> anyhow::Result<serde_json::Value> {
    let output = command.output().await.context("failed to spawn 'keeper' subprocess")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("'keeper' exited with {}: {stderr}", output.status);
    }
    serde_json::from_slice(&output.stdout).context("'keeper' did not produce valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_comma_separated_tags() {
        let record = serde_json::json!({
            "custom_fields": [{"label": "tags", "value": "default, prod"}]
        });
        assert_eq!(extract_tags(&record), vec!["default", "prod"]);
    }

    #[test]
    fn prefers_record_level_password() {
        let record = serde_json::json!({"password": "top-secret"});
        assert_eq!(select_value(&record), Some("top-secret".to_string()));
    }

    #[test]
    fn falls_back_to_notes_body() {
        let record = serde_json::json!({"notes": "the secret is in here"});
        assert_eq!(select_value(&record), Some("the secret is in here".to_string()));
    }
}
