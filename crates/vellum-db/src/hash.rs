use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256, Sha384};

/// Length of generated document ids.
pub const ID_LEN: usize = 20;

/// Id for the `n`th document added by transaction `tx_id`.
pub fn generate_id(tx_id: &str, n: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx_id.as_bytes());
    hasher.update(b":");
    hasher.update(n.to_string().as_bytes());
    let mut id = URL_SAFE_NO_PAD.encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// Next value of the rolling state hash after a write by `tx_id`.
pub fn roll(prev: Option<&str>, tx_id: &str) -> String {
    match prev {
        None => tx_id.to_string(),
        Some(prev) => {
            let mut hasher = Sha384::new();
            hasher.update(prev.as_bytes());
            hasher.update(tx_id.as_bytes());
            STANDARD.encode(hasher.finalize())
        }
    }
}
