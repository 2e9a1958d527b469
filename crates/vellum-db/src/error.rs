use std::fmt;

use vellum_engine::{EncodingError, EngineError};
use vellum_query::QueryParseError;
use vellum_rules::RuleError;
use vellum_store::StoreError;

#[derive(Debug)]
pub enum DbError {
    /// Schema rejection or a malformed definition (rules, schema, trigger).
    Validation(String),
    RuleDenied(String),
    RuleEval(String),
    QueryPlan(String),
    NotFound(String),
    CycleOrDepthExceeded(usize),
    PermissionDenied(String),
    Nonce { expected: u64, got: u64 },
    InvalidAction(String),
    InvalidQuery(String),
    InvalidPath(String),
    Evolving,
    Store(StoreError),
    Encoding(EncodingError),
}

impl DbError {
    /// Errors returned to the caller as `Err` instead of a failed receipt:
    /// malformed input and infrastructure failures.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DbError::InvalidAction(_)
                | DbError::InvalidQuery(_)
                | DbError::InvalidPath(_)
                | DbError::Store(_)
                | DbError::Encoding(_)
        )
    }

    /// The backing store failed; nothing above it can recover.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, DbError::Store(_) | DbError::Encoding(_))
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Validation(msg) => write!(f, "validation error: {msg}"),
            DbError::RuleDenied(msg) => write!(f, "denied by rules: {msg}"),
            DbError::RuleEval(msg) => write!(f, "rule evaluation error: {msg}"),
            DbError::QueryPlan(msg) => write!(f, "query plan error: {msg}"),
            DbError::NotFound(what) => write!(f, "not found: {what}"),
            DbError::CycleOrDepthExceeded(n) => write!(f, "cycle or too deep ({n} hops)"),
            DbError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            DbError::Nonce { expected, got } => {
                write!(f, "wrong nonce: expected {expected}, got {got}")
            }
            DbError::InvalidAction(msg) => write!(f, "invalid action: {msg}"),
            DbError::InvalidQuery(msg) => write!(f, "invalid query: {msg}"),
            DbError::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
            DbError::Evolving => write!(f, "contract is evolving"),
            DbError::Store(e) => write!(f, "store error: {e}"),
            DbError::Encoding(e) => write!(f, "encoding error: {e}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Store(e) => Some(e),
            DbError::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        DbError::Store(e)
    }
}

impl From<EncodingError> for DbError {
    fn from(e: EncodingError) -> Self {
        DbError::Encoding(e)
    }
}

impl From<bson::error::Error> for DbError {
    fn from(e: bson::error::Error) -> Self {
        DbError::Encoding(EncodingError::Bson(e))
    }
}

impl From<EngineError> for DbError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Store(e) => DbError::Store(e),
            EngineError::Encoding(e) => DbError::Encoding(e),
            EngineError::InvalidPath(msg) => DbError::InvalidPath(msg),
            EngineError::InvalidIndex(msg) => DbError::InvalidQuery(msg),
            EngineError::InvalidDocument(msg) => DbError::Validation(msg),
        }
    }
}

impl From<QueryParseError> for DbError {
    fn from(e: QueryParseError) -> Self {
        DbError::InvalidQuery(e.0)
    }
}

impl From<RuleError> for DbError {
    fn from(e: RuleError) -> Self {
        match e {
            RuleError::Parse(msg) => DbError::Validation(msg),
            RuleError::Eval(msg) | RuleError::Host(msg) => DbError::RuleEval(msg),
            RuleError::TooDeep(hops) => DbError::CycleOrDepthExceeded(hops),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::InvalidAction(e.to_string())
    }
}
