use crate::encoding::value::encode_id;

const RECORD_TAG: u8 = b'd';
const INDEX_TAG: u8 = b'x';
const COLLECTION_TAG: u8 = b'c';
const GLOBAL_TAG: u8 = b'g';
const SEP: u8 = 0x00;

/// Structured key for engine storage.
///
/// - `Record(collection, id)`: document record in the data cf,
///   `d\0{collection}\0{encoded id}`
/// - `Collection(collection)`: collection metadata in the sys cf
/// - `Global(namespace, name)`: contract-wide state in the sys cf
///
/// Collection paths are `/`-joined and never contain NUL, so the separator
/// keeps subcollections out of their parent's prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key<'a> {
    Record(&'a str, &'a str),
    Collection(&'a str),
    Global(&'a str, &'a str),
}

impl Key<'_> {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Record(collection, id) => {
                let mut out = KeyPrefix::Records(collection).encode();
                encode_id(id, &mut out);
                out
            }
            Key::Collection(collection) => {
                let mut out = KeyPrefix::Collections.encode();
                out.extend_from_slice(collection.as_bytes());
                out
            }
            Key::Global(ns, name) => {
                let mut out = KeyPrefix::Global(ns).encode();
                out.extend_from_slice(name.as_bytes());
                out
            }
        }
    }
}

/// Prefixes for range scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix<'a> {
    /// All records of one collection.
    Records(&'a str),
    /// All entries of one index: `x\0{collection}\0{index name}\0`.
    Index(&'a str, &'a str),
    /// Every collection metadata key.
    Collections,
    /// Every key of one global namespace.
    Global(&'a str),
}

impl KeyPrefix<'_> {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            KeyPrefix::Records(collection) => {
                out.push(RECORD_TAG);
                out.push(SEP);
                out.extend_from_slice(collection.as_bytes());
                out.push(SEP);
            }
            KeyPrefix::Index(collection, index) => {
                out.push(INDEX_TAG);
                out.push(SEP);
                out.extend_from_slice(collection.as_bytes());
                out.push(SEP);
                out.extend_from_slice(index.as_bytes());
                out.push(SEP);
            }
            KeyPrefix::Collections => {
                out.push(COLLECTION_TAG);
                out.push(SEP);
            }
            KeyPrefix::Global(ns) => {
                out.push(GLOBAL_TAG);
                out.push(SEP);
                out.extend_from_slice(ns.as_bytes());
                out.push(SEP);
            }
        }
        out
    }
}
