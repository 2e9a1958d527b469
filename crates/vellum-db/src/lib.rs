//! Deterministic document database: path-addressed JSON documents with
//! composite indexes, cursor queries, access rules, triggers and crons.

mod action;
mod admin;
mod config;
mod context;
mod cron;
pub(crate) mod database;
mod dispatch;
mod error;
mod executor;
mod hash;
mod mutation;
mod planner;
mod read;
mod receipt;
mod relay;
mod schema;
mod write;

pub use action::{Action, Read, SignedAction};
pub use config::DatabaseConfig;
pub use context::{ActionContext, Block, RelayInfo};
pub use database::{Database, DatabaseTransaction};
pub use error::DbError;
pub use executor::Row;
pub use receipt::Receipt;
pub use serde_json::{Value, json};

#[cfg(feature = "bench-internals")]
pub mod bench {
    pub use crate::executor::{RowIter, execute};
    pub use crate::planner::plan::{Node, Plan, ScanDirection, ScanRange};
    pub use crate::planner::planner::Planner;
}
