use std::fmt;

use crate::error::EngineError;

/// Check a collection name or document id.
///
/// Rejects empty names, `/` and NUL (both are key separators), and the
/// reserved `__name__` form.
pub fn validate_id(s: &str) -> Result<(), EngineError> {
    if s.is_empty() {
        return Err(EngineError::InvalidPath("empty name".into()));
    }
    if s.contains('/') || s.contains('\0') {
        return Err(EngineError::InvalidPath(format!("invalid character in '{s}'")));
    }
    if s.len() >= 4 && s.starts_with("__") && s.ends_with("__") {
        return Err(EngineError::InvalidPath(format!("reserved name '{s}'")));
    }
    Ok(())
}

/// Path to a collection: `col`, `col/doc/sub`, ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Result<Self, EngineError> {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.len() % 2 != 1 {
            return Err(EngineError::InvalidPath(format!(
                "collection path needs an odd number of segments: {}",
                segments.join("/")
            )));
        }
        for s in &segments {
            validate_id(s)?;
        }
        Ok(Self { segments })
    }

    /// Parse the `/`-joined storage form.
    pub fn parse(key: &str) -> Result<Self, EngineError> {
        Self::new(key.split('/'))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Name of the innermost collection.
    pub fn name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Storage key form: segments joined with `/`.
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    pub fn doc(&self, id: impl Into<String>) -> Result<DocPath, EngineError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(DocPath {
            collection: self.clone(),
            id,
        })
    }

    /// Document owning this collection, for subcollections.
    pub fn parent(&self) -> Option<DocPath> {
        if self.segments.len() < 3 {
            return None;
        }
        let n = self.segments.len();
        Some(DocPath {
            collection: CollectionPath {
                segments: self.segments[..n - 2].to_vec(),
            },
            id: self.segments[n - 2].clone(),
        })
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Path to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl DocPath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Result<Self, EngineError> {
        match Path::new(segments)? {
            Path::Document(doc) => Ok(doc),
            Path::Collection(col) => Err(EngineError::InvalidPath(format!(
                "expected a document path, got collection {col}"
            ))),
        }
    }

    /// Segments of the full path, ending with the document id.
    pub fn segments(&self) -> Vec<String> {
        let mut out = self.collection.segments().to_vec();
        out.push(self.id.clone());
        out
    }

    pub fn child(&self, name: impl Into<String>) -> Result<CollectionPath, EngineError> {
        let mut segments = self.segments();
        segments.push(name.into());
        CollectionPath::new(segments)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Either kind of path, decided by segment parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Path {
    Collection(CollectionPath),
    Document(DocPath),
}

impl Path {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Result<Self, EngineError> {
        let mut segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(EngineError::InvalidPath("empty path".into()));
        }
        if segments.len() % 2 == 1 {
            return CollectionPath::new(segments).map(Path::Collection);
        }
        let id = segments.pop().unwrap_or_default();
        CollectionPath::new(segments)?.doc(id).map(Path::Document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_decides_kind() {
        assert!(matches!(Path::new(["ppl"]).unwrap(), Path::Collection(_)));
        assert!(matches!(Path::new(["ppl", "Bob"]).unwrap(), Path::Document(_)));
        let sub = Path::new(["ppl", "Bob", "foods"]).unwrap();
        match sub {
            Path::Collection(c) => {
                assert_eq!(c.key(), "ppl/Bob/foods");
                assert_eq!(c.name(), "foods");
                assert_eq!(c.parent().unwrap().to_string(), "ppl/Bob");
            }
            _ => panic!("expected collection"),
        }
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(Path::new(["__ppl__"]).is_err());
        assert!(Path::new(["ppl", "a/b"]).is_err());
        assert!(Path::new(["ppl", ""]).is_err());
        assert!(Path::new(Vec::<String>::new()).is_err());
        assert!(validate_id("__").is_ok());
        assert!(validate_id("_ppl_").is_ok());
    }
}
