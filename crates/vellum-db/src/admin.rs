use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::DatabaseConfig;
use crate::error::DbError;

/// Global namespace for contract-wide state.
pub(crate) const CONTRACT_NS: &str = "contract";
pub(crate) const STATE_KEY: &str = "state";
pub(crate) const NONCE_NS: &str = "nonce";
pub(crate) const IDS_NS: &str = "ids";
pub(crate) const CRON_NS: &str = "cron";
pub(crate) const RELAYER_NS: &str = "relayer";
pub(crate) const LINK_NS: &str = "link";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolveEntry {
    pub signer: String,
    pub src: Option<String>,
    pub old_version: String,
    pub new_version: String,
}

/// Contract-wide settings and bookkeeping, stored as one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractState {
    pub contract_id: String,
    pub version: String,
    pub owners: Vec<String>,
    pub secure: bool,
    pub can_evolve: bool,
    pub algorithms: Vec<String>,
    /// Source announced by the latest `evolve`.
    pub evolve: Option<String>,
    pub is_evolving: bool,
    pub evolve_history: Vec<EvolveEntry>,
    /// Rolling hash over accepted writes.
    pub hash: Option<String>,
    /// Submitters allowed to send bundles. When set, document writes are
    /// only accepted from inside a bundle.
    #[serde(default)]
    pub bundlers: Vec<String>,
}

impl ContractState {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        ContractState {
            contract_id: config.contract_id.clone(),
            version: config.version.clone(),
            owners: config.owners.clone(),
            secure: config.secure,
            can_evolve: config.can_evolve,
            algorithms: config.algorithms.clone(),
            evolve: None,
            is_evolving: false,
            evolve_history: Vec::new(),
            hash: None,
            bundlers: Vec::new(),
        }
    }

    pub fn is_owner(&self, signer: &str) -> bool {
        self.owners.iter().any(|o| o == signer)
    }

    pub fn require_owner(&self, signer: &str) -> Result<(), DbError> {
        if self.is_owner(signer) {
            Ok(())
        } else {
            Err(DbError::PermissionDenied(format!("{signer} is not an owner")))
        }
    }

    /// Document writes outside a bundle are refused while bundlers are set.
    pub fn check_direct_write(&self) -> Result<(), DbError> {
        if self.bundlers.is_empty() {
            Ok(())
        } else {
            Err(DbError::PermissionDenied("only bundled writes are allowed".into()))
        }
    }

    pub fn check_bundler(&self, submitter: &str) -> Result<(), DbError> {
        if self.bundlers.is_empty() || self.bundlers.iter().any(|b| b == submitter) {
            Ok(())
        } else {
            Err(DbError::PermissionDenied(format!("{submitter} is not a bundler")))
        }
    }

    pub fn add_owner(&mut self, address: &str) -> Result<(), DbError> {
        if self.is_owner(address) {
            return Err(DbError::Validation(format!("{address} is already an owner")));
        }
        self.owners.push(address.to_string());
        Ok(())
    }

    pub fn remove_owner(&mut self, address: &str) -> Result<(), DbError> {
        if !self.is_owner(address) {
            return Err(DbError::NotFound(format!("owner {address}")));
        }
        self.owners.retain(|o| o != address);
        Ok(())
    }

    pub fn evolve(&mut self, src: &str) -> Result<(), DbError> {
        if !self.can_evolve {
            return Err(DbError::PermissionDenied("evolution is disabled".into()));
        }
        self.evolve = Some(src.to_string());
        self.is_evolving = true;
        Ok(())
    }

    pub fn migrate(&mut self, signer: &str, version: &str) -> Result<(), DbError> {
        if !self.is_evolving {
            return Err(DbError::Validation("contract is not evolving".into()));
        }
        self.evolve_history.push(EvolveEntry {
            signer: signer.to_string(),
            src: self.evolve.clone(),
            old_version: self.version.clone(),
            new_version: version.to_string(),
        });
        self.version = version.to_string();
        self.is_evolving = false;
        Ok(())
    }

    pub fn info(&self) -> Value {
        json!({
            "contractId": self.contract_id,
            "version": self.version,
            "owners": self.owners,
            "secure": self.secure,
            "canEvolve": self.can_evolve,
            "algorithms": self.algorithms,
            "evolve": self.evolve,
            "isEvolving": self.is_evolving,
            "evolveHistory": self.evolve_history.iter().map(EvolveEntry::to_json).collect::<Vec<_>>(),
            "bundlers": self.bundlers,
        })
    }

    pub fn evolve_json(&self) -> Value {
        json!({
            "canEvolve": self.can_evolve,
            "evolve": self.evolve,
            "isEvolving": self.is_evolving,
            "history": self.evolve_history.iter().map(EvolveEntry::to_json).collect::<Vec<_>>(),
        })
    }

    /// The `contract` object of rule and trigger contexts.
    pub fn context_json(&self) -> Value {
        json!({
            "id": self.contract_id,
            "version": self.version,
            "owners": self.owners,
        })
    }
}

impl EvolveEntry {
    fn to_json(&self) -> Value {
        json!({
            "signer": self.signer,
            "srcTxId": self.src,
            "oldVersion": self.old_version,
            "newVersion": self.new_version,
        })
    }
}
