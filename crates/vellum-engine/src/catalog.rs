use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::IndexSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEvent {
    Create,
    Update,
    Delete,
}

impl TriggerEvent {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(TriggerEvent::Create),
            "update" => Some(TriggerEvent::Update),
            "delete" => Some(TriggerEvent::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerEvent::Create => "create",
            TriggerEvent::Update => "update",
            TriggerEvent::Delete => "delete",
        }
    }
}

/// A stored trigger. `func` is the raw statement list, interpreted by the
/// database layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
    pub key: String,
    pub on: TriggerEvent,
    pub func: Value,
    /// Echoed back as given.
    pub version: Option<Value>,
}

/// Per-collection definitions kept in the sys cf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Insertion order; the id index, once registered, sits first.
    pub indexes: Vec<IndexSpec>,
    pub rules: Option<Value>,
    pub schema: Option<Value>,
    pub triggers: Vec<TriggerDef>,
}

impl CollectionMeta {
    pub fn find_index(&self, spec: &IndexSpec) -> Option<usize> {
        self.indexes.iter().position(|s| s.equivalent(spec))
    }

    pub fn has_id_index(&self) -> bool {
        self.indexes.iter().any(IndexSpec::is_id)
    }

    /// Indexes that own physical entries (everything but the id index).
    pub fn physical_indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.indexes.iter().filter(|s| !s.is_id())
    }

    /// Insert or replace a trigger by key. `index` positions a new trigger.
    pub fn put_trigger(&mut self, trigger: TriggerDef, index: Option<usize>) {
        if let Some(pos) = self.triggers.iter().position(|t| t.key == trigger.key) {
            self.triggers.remove(pos);
        }
        let at = index.unwrap_or(self.triggers.len()).min(self.triggers.len());
        self.triggers.insert(at, trigger);
    }

    pub fn remove_trigger(&mut self, key: &str) -> bool {
        let before = self.triggers.len();
        self.triggers.retain(|t| t.key != key);
        self.triggers.len() != before
    }
}
