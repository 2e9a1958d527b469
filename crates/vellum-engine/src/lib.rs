mod catalog;
pub mod encoding;
mod error;
pub mod index;
mod key;
mod kv;
mod path;

pub use catalog::{CollectionMeta, TriggerDef, TriggerEvent};
pub use encoding::Record;
pub use error::{EncodingError, EngineError};
pub use index::{IndexChanges, IndexField, IndexKind, IndexSpec};
pub use key::{Key, KeyPrefix};
pub use kv::{DATA_CF, IndexEntry, KvEngine, KvTransaction, SYS_CF, WriteOutcome};
pub use path::{CollectionPath, DocPath, Path, validate_id};
