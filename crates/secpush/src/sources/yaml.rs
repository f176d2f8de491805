//! The `yaml` adapter (spec §4.4): reads one or more files, merges them with
//! the same rules as the config loader, descends into an optional dot-path
//! key, and normalizes the result into `Item`s. Async file reads follow
//! `backends/file/file_source.rs`'s `tokio::fs` idiom.

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use async_trait::async_trait;
use serde_yaml::Value;

use crate::merge;
use crate::model::Item;
use crate::templating::{self, TemplateContext};

use super::{CollectContext, Source};

#[derive(Debug, Clone)]
pub struct YamlOptions {
    pub files: Vec<PathBuf>,
    pub key: Option<String>,
}

pub struct YamlSource {
    options: YamlOptions,
}

impl YamlSource {
    pub fn new(options: YamlOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Source for YamlSource {
    async fn collect(&self, ctx: &CollectContext) -> anyhow::Result<Vec<Item>> {
        if self.options.files.is_empty() {
            bail!("yaml source has no 'files' entries");
        }

        let mut merged = Value::Null;
        let mut last_file_dir = PathBuf::from(".");
        for file in &self.options.files {
            let contents = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading yaml source file '{}'", file.display()))?;
            let doc: Value = serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing yaml source file '{}'", file.display()))?;
            merged = merge::merge(&merged, &doc, &file.display().to_string());
            last_file_dir = file.parent().unwrap_or(std::path::Path::new(".")).to_path_buf();
        }

        let node = match &self.options.key {
            Some(key) => descend(&merged, key)?,
            None => &merged,
        };

        let mut items = normalize(node)?;
        for item in items.iter_mut() {
            let render_ctx = TemplateContext::new(ctx.vars, &last_file_dir, "yaml-source");
            item.value = templating::render(&item.value, &render_ctx)?;
        }
        Ok(items)
    }
}

fn descend<'a>(root: &'a Value, dot_path: &str) -> anyhow::Result<&'a Value> {
    let mut node = root;
    for part in dot_path.split('.') {
        node = node
            .get(part)
            .with_context(|| format!("yaml source missing path '{dot_path}' (stuck at '{part}')"))?;
    }
    Ok(node)
}

fn normalize(node: &Value) -> anyhow::Result<Vec<Item>> {
    if let Some(seq) = node.as_sequence() {
        return seq.iter().map(item_from_entry).collect();
    }
    if let Some(map) = node.as_mapping() {
        if let Some(values) = map.get(Value::from("values")) {
            let seq = values.as_sequence().context("'values' must be a list")?;
            return seq.iter().map(item_from_entry).collect();
        }
        return map
            .iter()
            .map(|(key, value)| {
                let name = key
                    .as_str()
                    .context("yaml source keys must be strings")?
                    .to_string();
                Ok(Item::new(name, scalar_to_string(value)?))
            })
            .collect();
    }
    bail!("yaml source value must be a mapping or a list")
}

fn item_from_entry(entry: &Value) -> anyhow::Result<Item> {
    let map = entry.as_mapping().context("expected a mapping with 'name'/'value'")?;
    let name = map
        .get(Value::from("name"))
        .and_then(Value::as_str)
        .context("yaml source entry missing 'name'")?
        .to_string();
    let value = match map.get(Value::from("value")) {
        Some(v) => scalar_to_string(v)?,
        None => String::new(),
    };
    let description = map
        .get(Value::from("description"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(Item { name, value, description })
}

fn scalar_to_string(value: &Value) -> anyhow::Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => bail!("expected a scalar value, found {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn reads_flat_mapping_shape() {
        let file = write_temp("FEATURE_FLAG: \"true\"\n");
        let source = YamlSource::new(YamlOptions {
            files: vec![file.path().to_path_buf()],
            key: None,
        });
        let vars = HashMap::new();
        let items = source.collect(&CollectContext { vars: &vars }).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "FEATURE_FLAG");
        assert_eq!(items[0].value, "true");
    }

    #[tokio::test]
    async fn reads_values_list_shape() {
        let file = write_temp("values:\n  - name: A\n    value: \"1\"\n  - name: B\n    value: \"2\"\n");
        let source = YamlSource::new(YamlOptions {
            files: vec![file.path().to_path_buf()],
            key: None,
        });
        let vars = HashMap::new();
        let items = source.collect(&CollectContext { vars: &vars }).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn later_file_overrides_earlier_one() {
        let defaults = write_temp("FEATURE_FLAG: \"false\"\n");
        let dev = write_temp("FEATURE_FLAG: \"true\"\n");
        let source = YamlSource::new(YamlOptions {
            files: vec![defaults.path().to_path_buf(), dev.path().to_path_buf()],
            key: None,
        });
        let vars = HashMap::new();
        let items = source.collect(&CollectContext { vars: &vars }).await.unwrap();
        assert_eq!(items[0].value, "true");
    }
}
