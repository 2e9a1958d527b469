use std::fmt;

use vellum_store::StoreError;

// ── EncodingError ─────────────────────────────────────────────

#[derive(Debug)]
pub enum EncodingError {
    Bson(bson::error::Error),
    MalformedKey(String),
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bson(e) => write!(f, "bson: {e}"),
            Self::MalformedKey(msg) => write!(f, "malformed key: {msg}"),
        }
    }
}

impl std::error::Error for EncodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bson(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bson::error::Error> for EncodingError {
    fn from(e: bson::error::Error) -> Self {
        Self::Bson(e)
    }
}

// ── EngineError ───────────────────────────────────────────────

#[derive(Debug)]
pub enum EngineError {
    Store(StoreError),
    Encoding(EncodingError),
    InvalidPath(String),
    InvalidIndex(String),
    InvalidDocument(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Encoding(e) => write!(f, "encoding error: {e}"),
            Self::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
            Self::InvalidIndex(msg) => write!(f, "invalid index: {msg}"),
            Self::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<EncodingError> for EngineError {
    fn from(e: EncodingError) -> Self {
        Self::Encoding(e)
    }
}

impl From<bson::error::Error> for EngineError {
    fn from(e: bson::error::Error) -> Self {
        Self::Encoding(EncodingError::Bson(e))
    }
}
