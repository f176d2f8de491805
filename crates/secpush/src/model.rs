//! Core data types shared across the pipeline: collected items, tagged
//! intermediate records, and dispatch records (spec §3).

use serde::{Deserialize, Serialize};

/// A name/value secret, optionally carrying a human description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
}

impl Item {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// A 1Password/Keeper record before title-collapsing (spec §3, §4.6).
#[derive(Debug, Clone)]
pub struct TaggedRecord {
    pub title: String,
    pub value: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// The outcome of dispatching one item to one sink (spec §3, §4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Unchanged,
    Changed,
    Failed(crate::error::FailureReason),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Unchanged => "unchanged",
            Outcome::Changed => "changed",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// What a sink's `put` produced for one record: the classified outcome plus
/// whatever value previously lived under that name, if any (used by the
/// reporter's `'old' -> 'new'` snapshot lines).
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub outcome: Outcome,
    pub previous_value: Option<String>,
}

/// One routed item bound for one sink, post-prefixing (spec §3, §4.8).
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub full_name: String,
    pub value: String,
    pub description: Option<String>,
    pub source_name: String,
}

/// A dispatch record after it ran against its sink, ready for the reporter.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub sink_name: String,
    pub full_name: String,
    pub value: String,
    pub previous_value: Option<String>,
    pub source_name: String,
    pub outcome: Outcome,
}
