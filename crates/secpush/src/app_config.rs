//! Config loader & merger (spec §4.1): reads an ordered list of documents,
//! deep-merges them, resolves `vars` and templates, and validates the
//! result into a typed [`Config`].
//!
//! The teacher loads config through `Figment` layering env vars over a
//! single TOML file. This spec's merge rules (name-keyed list merge,
//! `declared_in` path tracking) don't fit Figment's provider model, so the
//! layering happens over [`crate::merge`] instead — same "later document
//! wins" idea, implemented by hand.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::info;

use crate::error::LoadError;
use crate::merge;
use crate::sources::{SourceFilters, env, keeper, onepassword, yaml};
use crate::templating::{self, TemplateContext};

#[derive(Debug, Clone, Default)]
pub struct AwsOptions {
    pub region: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SourceOptions {
    Env(env::EnvOptions),
    Yaml(yaml::YamlOptions),
    OnePassword(onepassword::OnePasswordOptions),
    Keeper(keeper::KeeperOptions),
}

pub struct SourceSpec {
    pub name: String,
    pub options: SourceOptions,
    pub filters: SourceFilters,
}

#[derive(Debug, Clone)]
pub enum SinkOptions {
    Ssm(crate::sinks::ssm::SsmOptions),
    SecretsManager(crate::sinks::secrets_manager::SecretsManagerOptions),
}

/// Which declared sources a sink subscribes to. An absent `sources:` list
/// is normalized to `All` here (Open Question #1 in spec.md §9), rather
/// than left implicit for the Router to special-case.
#[derive(Debug, Clone)]
pub enum Sources {
    All,
    Named(Vec<String>),
}

pub struct SinkSpec {
    pub name: String,
    pub options: SinkOptions,
    pub prefix: String,
    pub sources: Sources,
    pub concurrency: usize,
    pub rate_limit_rps: f64,
}

pub struct Config {
    pub vars: HashMap<String, String>,
    pub aws: AwsOptions,
    pub sources: Vec<SourceSpec>,
    pub sinks: Vec<SinkSpec>,
}

impl SourceSpec {
    /// Resolve this spec's typed options into a concrete adapter, mirroring
    /// `backends::{SourceBackend}`'s per-variant constructors in the teacher.
    pub fn build_backend(&self) -> crate::sources::SourceBackend {
        match &self.options {
            SourceOptions::Env(opts) => crate::sources::SourceBackend::Env(crate::sources::env::EnvSource::new(opts.clone())),
            SourceOptions::Yaml(opts) => crate::sources::SourceBackend::Yaml(crate::sources::yaml::YamlSource::new(opts.clone())),
            SourceOptions::OnePassword(opts) => {
                crate::sources::SourceBackend::OnePassword(crate::sources::onepassword::OnePasswordSource::new(opts.clone()))
            }
            SourceOptions::Keeper(opts) => crate::sources::SourceBackend::Keeper(crate::sources::keeper::KeeperSource::new(opts.clone())),
        }
    }
}

impl SinkSpec {
    /// Resolve this spec's typed options into a concrete adapter, building
    /// its AWS client along the way (spec §4.9).
    pub async fn build_backend(&self, aws: &AwsOptions) -> anyhow::Result<crate::sinks::SinkBackend> {
        match &self.options {
            SinkOptions::Ssm(opts) => {
                let sink = crate::sinks::ssm::SsmSink::new(opts.clone(), aws, self.rate_limit_rps).await?;
                Ok(crate::sinks::SinkBackend::Ssm(sink))
            }
            SinkOptions::SecretsManager(opts) => {
                let sink = crate::sinks::secrets_manager::SecretsManagerSink::new(opts.clone(), aws, self.rate_limit_rps).await?;
                Ok(crate::sinks::SinkBackend::SecretsManager(sink))
            }
        }
    }
}

/// Load and validate config from an ordered list of document paths. Later
/// documents override earlier ones (spec §4.1).
pub fn load(paths: &[PathBuf]) -> anyhow::Result<Config> {
    info!(documents = paths.len(), "loading configuration");

    let mut merged = Value::Null;
    for path in paths {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Other(format!("cannot read '{}': {e}", path.display())))?;
        let doc: Value = serde_yaml::from_str(&contents)
            .map_err(|e| LoadError::Other(format!("cannot parse '{}': {e}", path.display())))?;
        merged = merge::merge(&merged, &doc, &path.display().to_string());
    }

    let base_dir = paths
        .last()
        .and_then(|p| p.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let raw_vars = read_raw_vars(&merged)?;
    let vars = resolve_vars(raw_vars, &base_dir)?;

    render_all_strings(&mut merged, &vars, &base_dir, "config")?;

    let aws = parse_aws(&merged);
    let sources = parse_sources(&merged)?;
    let sinks = parse_sinks(&merged, &sources)?;

    Ok(Config { vars, aws, sources, sinks })
}

fn read_raw_vars(merged: &Value) -> anyhow::Result<HashMap<String, String>> {
    let mut raw = HashMap::new();
    if let Some(map) = merged.get("vars").and_then(Value::as_mapping) {
        for (k, v) in map {
            let key = k.as_str().ok_or_else(|| LoadError::Other("'vars' keys must be strings".into()))?;
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => return Err(LoadError::Other(format!("'vars.{key}' must be scalar, found {other:?}")).into()),
            };
            raw.insert(key.to_string(), value);
        }
    }
    Ok(raw)
}

/// Resolve `vars:` to a fixed point — entries may reference each other, so
/// keep rendering passes until nothing changes. Seeded with OS env so
/// `vars` can reference it and plain identifiers fall back to it too.
fn resolve_vars(raw_vars: HashMap<String, String>, base_dir: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut resolved: HashMap<String, String> = std::env::vars().collect();
    let mut pending = raw_vars;

    loop {
        if pending.is_empty() {
            break;
        }
        let mut still_pending = HashMap::new();
        let mut progressed = false;

        for (name, raw_value) in pending {
            let ctx = TemplateContext::new(&resolved, base_dir, "vars");
            match templating::render(&raw_value, &ctx) {
                Ok(rendered) if !templating::has_placeholder(&rendered) => {
                    resolved.insert(name, rendered);
                    progressed = true;
                }
                Ok(rendered) => {
                    still_pending.insert(name, rendered);
                }
                Err(_) => {
                    still_pending.insert(name, raw_value);
                }
            }
        }

        if still_pending.is_empty() {
            break;
        }
        if !progressed {
            let (name, _) = still_pending.into_iter().next().expect("non-empty");
            return Err(LoadError::UnresolvedTemplate { variable: name, file: "vars".to_string() }.into());
        }
        pending = still_pending;
    }

    Ok(resolved)
}

/// Render every string in the merged document tree, switching the template
/// base directory/origin whenever we descend into a list entry that the
/// merge tagged with `declared_in` (spec §4.1's relative-path rule).
fn render_all_strings(
    value: &mut Value,
    vars: &HashMap<String, String>,
    base_dir: &Path,
    origin: &str,
) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            let ctx = TemplateContext::new(vars, base_dir, origin);
            *s = templating::render(s, &ctx)?;
        }
        Value::Mapping(_) => {
            let (local_base_dir, local_origin) = match merge::declared_in(value) {
                Some(declared_in) => {
                    let dir = Path::new(&declared_in).parent().unwrap_or(Path::new(".")).to_path_buf();
                    (dir, declared_in)
                }
                None => (base_dir.to_path_buf(), origin.to_string()),
            };
            let map = value.as_mapping_mut().unwrap();
            for (key, v) in map.iter_mut() {
                if key.as_str() == Some(merge::DECLARED_IN_KEY) {
                    continue;
                }
                render_all_strings(v, vars, &local_base_dir, &local_origin)?;
            }
        }
        Value::Sequence(seq) => {
            for entry in seq.iter_mut() {
                render_all_strings(entry, vars, base_dir, origin)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_aws(merged: &Value) -> AwsOptions {
    let aws = merged.get("aws");
    AwsOptions {
        region: aws.and_then(|a| a.get("region")).and_then(Value::as_str).map(str::to_string),
        profile: aws.and_then(|a| a.get("profile")).and_then(Value::as_str).map(str::to_string),
    }
}

fn parse_sources(merged: &Value) -> anyhow::Result<Vec<SourceSpec>> {
    let mut specs = Vec::new();
    let mut seen_names = std::collections::HashSet::new();

    let entries = merged
        .get("sources")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default();

    for entry in &entries {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| LoadError::Other("source entry missing 'name'".into()))?
            .to_string();

        if !seen_names.insert(name.clone()) {
            return Err(LoadError::DuplicateSourceName { name }.into());
        }

        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| LoadError::Other(format!("source '{name}' missing 'type'")))?;

        let declared_dir = merge::declared_in(entry)
            .map(|d| Path::new(&d).parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let options = match kind {
            "env" => SourceOptions::Env(env::EnvOptions),
            "yaml" => {
                let files = entry
                    .get("files")
                    .and_then(Value::as_sequence)
                    .ok_or_else(|| LoadError::Other(format!("source '{name}' (yaml) missing 'files'")))?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|f| resolve_relative(&declared_dir, f))
                    .collect();
                let key = entry.get("key").and_then(Value::as_str).map(str::to_string);
                SourceOptions::Yaml(yaml::YamlOptions { files, key })
            }
            "1password" => {
                let vault = entry
                    .get("vault")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LoadError::Other(format!("source '{name}' (1password) missing 'vault'")))?
                    .to_string();
                SourceOptions::OnePassword(onepassword::OnePasswordOptions {
                    vault,
                    tag_filters: string_list(entry.get("tag_filters")),
                    include_regex: entry.get("include_regex").and_then(Value::as_str).map(str::to_string),
                    concurrency: entry.get("concurrency").and_then(Value::as_u64).unwrap_or(8) as usize,
                })
            }
            "keeper" => SourceOptions::Keeper(keeper::KeeperOptions {
                tag_filters: string_list(entry.get("tag_filters")),
                include_regex: entry.get("include_regex").and_then(Value::as_str).map(str::to_string),
                concurrency: entry.get("concurrency").and_then(Value::as_u64).unwrap_or(8) as usize,
            }),
            other => {
                return Err(LoadError::UnknownSourceType { source: name, kind: other.to_string() }.into());
            }
        };

        let filters = SourceFilters {
            include_regex: entry.get("include_regex").and_then(Value::as_str).map(str::to_string),
            include: entry.get("include").and_then(Value::as_sequence).map(|seq| {
                seq.iter().filter_map(Value::as_str).map(str::to_string).collect()
            }),
            exclude: string_list(entry.get("exclude")),
            keys: string_list(entry.get("keys")),
            strip_prefix: entry.get("strip_prefix").and_then(Value::as_str).map(str::to_string),
        };

        specs.push(SourceSpec { name, options, filters });
    }

    Ok(specs)
}

fn parse_sinks(merged: &Value, sources: &[SourceSpec]) -> anyhow::Result<Vec<SinkSpec>> {
    let mut specs = Vec::new();
    let declared_source_names: std::collections::HashSet<&str> =
        sources.iter().map(|s| s.name.as_str()).collect();

    let entries = merged
        .get("sinks")
        .and_then(Value::as_sequence)
        .cloned()
        .unwrap_or_default();

    for entry in &entries {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| LoadError::Other("sink entry missing 'name'".into()))?
            .to_string();

        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| LoadError::Other(format!("sink '{name}' missing 'type'")))?;

        let prefix = entry.get("prefix").and_then(Value::as_str).unwrap_or("").to_string();

        let sources_field = match entry.get("sources") {
            None => Sources::All,
            Some(Value::String(s)) if s == "*" => Sources::All,
            Some(Value::Sequence(seq)) => {
                let names: Vec<String> = seq.iter().filter_map(Value::as_str).map(str::to_string).collect();
                for referenced in &names {
                    if !declared_source_names.contains(referenced.as_str()) {
                        return Err(LoadError::UndeclaredSource { sink: name, referenced: referenced.clone() }.into());
                    }
                }
                Sources::Named(names)
            }
            Some(_) => return Err(LoadError::Other(format!("sink '{name}' has an invalid 'sources' value")).into()),
        };

        let concurrency_raw = entry.get("concurrency").and_then(Value::as_i64).unwrap_or(8);
        if concurrency_raw <= 0 {
            return Err(LoadError::NonPositiveConcurrency { sink: name, value: concurrency_raw }.into());
        }

        let rate_limit_raw = entry.get("rate_limit_rps").and_then(Value::as_f64).unwrap_or(10.0);
        if rate_limit_raw <= 0.0 {
            return Err(LoadError::NonPositiveRateLimit { sink: name, value: rate_limit_raw }.into());
        }

        let options = match kind {
            "ssm" => {
                let ssm_type = entry.get("ssm_type").and_then(Value::as_str).unwrap_or("SecureString");
                if ssm_type != "SecureString" && ssm_type != "String" {
                    return Err(LoadError::InvalidSsmType { sink: name, value: ssm_type.to_string() }.into());
                }
                let tier = entry.get("tier").and_then(Value::as_str);
                if let Some(tier_value) = tier {
                    if tier_value != "Standard" && tier_value != "Advanced" {
                        return Err(LoadError::InvalidTier { sink: name, value: tier_value.to_string() }.into());
                    }
                }
                SinkOptions::Ssm(crate::sinks::ssm::SsmOptions {
                    ssm_type: ssm_type.to_string(),
                    kms_key_id: entry.get("kms_key_id").and_then(Value::as_str).map(str::to_string),
                    overwrite: entry.get("overwrite").and_then(Value::as_bool).unwrap_or(true),
                })
            }
            "secrets_manager" => SinkOptions::SecretsManager(crate::sinks::secrets_manager::SecretsManagerOptions {
                kms_key_id: entry.get("kms_key_id").and_then(Value::as_str).map(str::to_string),
                overwrite: entry.get("overwrite").and_then(Value::as_bool).unwrap_or(true),
            }),
            other => return Err(LoadError::UnknownSinkType { sink: name, kind: other.to_string() }.into()),
        };

        specs.push(SinkSpec {
            name,
            options,
            prefix,
            sources: sources_field,
            concurrency: concurrency_raw as usize,
            rate_limit_rps: rate_limit_raw,
        });
    }

    Ok(specs)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_sequence)
        .map(|seq| seq.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn resolve_relative(base_dir: &Path, raw: &str) -> PathBuf {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_doc(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_env_source_and_ssm_sink() {
        let doc = write_doc(
            r#"
sources:
  - name: env
    type: env
sinks:
  - name: ssm
    type: ssm
    prefix: /app/
"#,
        );
        let config = load(&[doc.path().to_path_buf()]).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sinks.len(), 1);
        assert!(matches!(config.sinks[0].sources, Sources::All));
    }

    #[test]
    fn undeclared_source_reference_fails_load() {
        let doc = write_doc(
            r#"
sources: []
sinks:
  - name: ssm
    type: ssm
    sources: [missing]
"#,
        );
        assert!(load(&[doc.path().to_path_buf()]).is_err());
    }

    #[test]
    fn duplicate_source_name_fails_load() {
        let doc = write_doc(
            r#"
sources:
  - name: a
    type: env
  - name: a
    type: env
"#,
        );
        assert!(load(&[doc.path().to_path_buf()]).is_err());
    }

    #[test]
    fn invalid_ssm_type_fails_load() {
        let doc = write_doc(
            r#"
sources: []
sinks:
  - name: s
    type: ssm
    ssm_type: NotAType
"#,
        );
        assert!(load(&[doc.path().to_path_buf()]).is_err());
    }

    #[test]
    fn vars_template_config_values() {
        let doc = write_doc(
            "vars:\n  ENV: dev\nsources:\n  - name: y\n    type: yaml\n    files: [\"{{ ENV }}.yaml\"]\n",
        );
        let config = load(&[doc.path().to_path_buf()]).unwrap();
        match &config.sources[0].options {
            SourceOptions::Yaml(opts) => {
                assert!(opts.files[0].to_string_lossy().ends_with("dev.yaml"));
            }
            _ => panic!("expected yaml source"),
        }
    }

    #[test]
    fn layered_documents_override_in_order() {
        let defaults = write_doc("sources:\n  - name: a\n    type: env\nsinks:\n  - name: s\n    type: ssm\n    prefix: /a/\n");
        let dev = write_doc("sinks:\n  - name: s\n    type: ssm\n    prefix: /b/\n");
        let config = load(&[defaults.path().to_path_buf(), dev.path().to_path_buf()]).unwrap();
        assert_eq!(config.sinks[0].prefix, "/b/");
    }
}
