use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DbError;
use crate::schema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultisigType {
    #[default]
    Number,
    Percent,
}

/// A relayer job: who may relay, who must co-sign, and the shape of the
/// extra data the relayer attaches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerJob {
    pub relayers: Option<Vec<String>>,
    pub signers: Option<Vec<String>>,
    pub multisig: Option<f64>,
    pub multisig_type: MultisigType,
    pub schema: Option<Value>,
}

impl RelayerJob {
    /// Accepts the camelCase wire keys (`multisig_type` or `multisigType`).
    pub fn from_json(v: &Value) -> Result<Self, DbError> {
        let mut v = v.clone();
        if let Some(obj) = v.as_object_mut() {
            if let Some(t) = obj.remove("multisigType") {
                obj.insert("multisig_type".into(), t);
            }
        }
        let job: RelayerJob = serde_json::from_value(v)
            .map_err(|e| DbError::Validation(format!("relayer job: {e}")))?;
        if let Some(s) = &job.schema {
            schema::check_schema(s)?;
        }
        if job.multisig.is_some_and(|m| m < 0.0) {
            return Err(DbError::Validation("multisig must not be negative".into()));
        }
        Ok(job)
    }

    /// Number of distinct listed signers required.
    pub fn threshold(&self) -> usize {
        let Some(m) = self.multisig else {
            return 0;
        };
        match self.multisig_type {
            MultisigType::Number => m.ceil() as usize,
            MultisigType::Percent => {
                let n = self.signers.as_ref().map_or(0, Vec::len) as f64;
                (n * m / 100.0).ceil() as usize
            }
        }
    }

    /// Check a relay attempt by `relayer` carrying `signatures` and `extra`.
    pub fn authorize(&self, relayer: &str, signatures: &[String], extra: &Value) -> Result<(), DbError> {
        if let Some(relayers) = &self.relayers {
            if !relayers.iter().any(|r| r == relayer) {
                return Err(DbError::PermissionDenied(format!("{relayer} is not a relayer")));
            }
        }
        let needed = self.threshold();
        if needed > 0 {
            let listed = self.signers.as_deref().unwrap_or_default();
            let valid: BTreeSet<&str> = signatures
                .iter()
                .map(String::as_str)
                .filter(|s| listed.iter().any(|l| l == s))
                .collect();
            if valid.len() < needed {
                return Err(DbError::PermissionDenied(format!(
                    "{} of {needed} required signatures",
                    valid.len()
                )));
            }
        }
        if let Some(s) = &self.schema {
            schema::validate(s, extra)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut v = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(obj) = v.as_object_mut() {
            if let Some(t) = obj.remove("multisig_type") {
                obj.insert("multisigType".into(), t);
            }
        }
        v
    }
}
