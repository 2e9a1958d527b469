use serde::Deserialize;
use vellum_query::DEFAULT_LIMIT;

use crate::error::DbError;

/// Settings for opening a [`Database`](crate::Database).
///
/// The contract fields (`contract_id` through `algorithms`) seed global state
/// the first time a database is opened on an empty store; later opens keep
/// whatever the stored state says.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub contract_id: String,
    pub version: String,
    pub owners: Vec<String>,
    /// Deny writes to collections without rules.
    pub secure: bool,
    pub can_evolve: bool,
    pub algorithms: Vec<String>,
    /// Trigger events at this depth or deeper are dropped.
    pub max_trigger_depth: usize,
    /// Bound on `request.method` redirections in rules.
    pub max_rule_hops: usize,
    /// Result cap for queries without a limit clause.
    pub default_limit: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            contract_id: String::new(),
            version: "0.1.0".to_string(),
            owners: Vec::new(),
            secure: false,
            can_evolve: true,
            algorithms: Vec::new(),
            max_trigger_depth: 10,
            max_rule_hops: 32,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl DatabaseConfig {
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        serde_json::from_str(json).map_err(|e| DbError::InvalidAction(format!("config: {e}")))
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owners.push(owner.into());
        self
    }
}
