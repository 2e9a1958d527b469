use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Block the host is executing in. `timestamp` is in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: i64,
}

impl Block {
    pub fn new(height: u64, timestamp: i64) -> Self {
        Block { height, timestamp }
    }

    pub fn to_json(self) -> Value {
        json!({"height": self.height, "timestamp": self.timestamp})
    }
}

/// Caller identity and environment of one write action. The signer has
/// already been authenticated by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionContext {
    pub signer: String,
    pub nonce: u64,
    pub tx_id: String,
    pub block: Block,
}

impl ActionContext {
    pub fn new(signer: impl Into<String>, nonce: u64, tx_id: impl Into<String>, block: Block) -> Self {
        ActionContext {
            signer: signer.into(),
            nonce,
            tx_id: tx_id.into(),
            block,
        }
    }
}

/// Relayer details attached to a relayed action, visible to rules as
/// `request.auth.{relayer, jobID, extra}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayInfo {
    pub relayer: String,
    pub job_id: String,
    pub extra: Value,
}
