//! The `env` adapter (spec §4.3): reads the current process environment as
//! a flat mapping. No options, no I/O failure path beyond "always succeeds" —
//! grounded on the teacher's `InMemorySource` in its simplicity.

use async_trait::async_trait;

use crate::model::Item;

use super::{CollectContext, Source};

#[derive(Debug, Clone, Default)]
pub struct EnvOptions;

pub struct EnvSource {
    _options: EnvOptions,
}

impl EnvSource {
    pub fn new(options: EnvOptions) -> Self {
        Self { _options: options }
    }
}

#[async_trait]
impl Source for EnvSource {
    async fn collect(&self, _ctx: &CollectContext) -> anyhow::Result<Vec<Item>> {
        Ok(std::env::vars().map(|(name, value)| Item::new(name, value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn collects_current_environment() {
        // SAFETY: test-only, single-threaded access to this specific var.
        unsafe { std::env::set_var("SECPUSH_TEST_ENV_VAR", "present") };
        let source = EnvSource::new(EnvOptions);
        let vars = HashMap::new();
        let items = source.collect(&CollectContext { vars: &vars }).await.unwrap();
        assert!(items.iter().any(|i| i.name == "SECPUSH_TEST_ENV_VAR" && i.value == "present"));
        unsafe { std::env::remove_var("SECPUSH_TEST_ENV_VAR") };
    }
}
