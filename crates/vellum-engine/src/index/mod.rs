mod sync;

pub use sync::IndexChanges;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_query::SortDirection;
use vellum_query::value::{ID_FIELD, get_path};

use crate::encoding::value::{encode_component, encode_id};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Asc,
    Desc,
    /// One entry per array element.
    Array,
}

impl IndexKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(IndexKind::Asc),
            "desc" => Some(IndexKind::Desc),
            "array" => Some(IndexKind::Array),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Asc => "asc",
            IndexKind::Desc => "desc",
            IndexKind::Array => "array",
        }
    }

    /// Byte direction of the stored component. Array elements sort ascending.
    pub fn direction(self) -> SortDirection {
        match self {
            IndexKind::Desc => SortDirection::Desc,
            IndexKind::Asc | IndexKind::Array => SortDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexField {
    pub path: String,
    pub kind: IndexKind,
}

impl IndexField {
    pub fn new(path: impl Into<String>, kind: IndexKind) -> Self {
        IndexField {
            path: path.into(),
            kind,
        }
    }
}

/// An ordered composite index definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<IndexField>,
}

impl IndexSpec {
    pub fn new(fields: Vec<IndexField>) -> Result<Self, EngineError> {
        let spec = IndexSpec { fields };
        spec.validate()?;
        Ok(spec)
    }

    /// The implicit document id index.
    pub fn id() -> Self {
        IndexSpec {
            fields: vec![IndexField::new(ID_FIELD, IndexKind::Asc)],
        }
    }

    pub fn single(path: impl Into<String>, kind: IndexKind) -> Self {
        IndexSpec {
            fields: vec![IndexField::new(path, kind)],
        }
    }

    /// Parse `[["age", "desc"], ["letters", "array"], ["name"]]`.
    pub fn parse(v: &Value) -> Result<Self, EngineError> {
        let items = v
            .as_array()
            .ok_or_else(|| EngineError::InvalidIndex(format!("expected a list: {v}")))?;
        let mut fields = Vec::with_capacity(items.len());
        for item in items {
            let parts = item
                .as_array()
                .ok_or_else(|| EngineError::InvalidIndex(format!("bad index field: {item}")))?;
            let path = parts
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::InvalidIndex(format!("bad index field: {item}")))?;
            let kind = match parts.get(1) {
                None => IndexKind::Asc,
                Some(k) => k.as_str().and_then(IndexKind::parse).ok_or_else(|| {
                    EngineError::InvalidIndex(format!("bad index direction: {k}"))
                })?,
            };
            if parts.len() > 2 {
                return Err(EngineError::InvalidIndex(format!("bad index field: {item}")));
            }
            fields.push(IndexField::new(path, kind));
        }
        Self::new(fields)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(
            self.fields
                .iter()
                .map(|f| {
                    Value::Array(vec![
                        Value::String(f.path.clone()),
                        Value::String(f.kind.as_str().to_string()),
                    ])
                })
                .collect(),
        )
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.fields.is_empty() {
            return Err(EngineError::InvalidIndex("index has no fields".into()));
        }
        let mut seen = BTreeSet::new();
        for f in &self.fields {
            if f.path.is_empty() || f.path.split('.').any(str::is_empty) {
                return Err(EngineError::InvalidIndex(format!("bad field path '{}'", f.path)));
            }
            if !seen.insert(f.path.as_str()) {
                return Err(EngineError::InvalidIndex(format!("field '{}' repeated", f.path)));
            }
        }
        if self.fields.iter().filter(|f| f.kind == IndexKind::Array).count() > 1 {
            return Err(EngineError::InvalidIndex(
                "at most one array field per index".into(),
            ));
        }
        if self.fields.iter().any(|f| f.path == ID_FIELD) && !self.is_id() {
            return Err(EngineError::InvalidIndex(format!(
                "{ID_FIELD} cannot be part of a composite index"
            )));
        }
        Ok(())
    }

    pub fn is_id(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].path == ID_FIELD
    }

    /// Stable storage name, e.g. `age:asc|letters:array`.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}:{}", f.path, f.kind.as_str()))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Unordered field identities used for deduplication. An array marker is
    /// a different identity than a scalar entry on the same path.
    pub fn identity(&self) -> BTreeSet<(&str, bool)> {
        self.fields
            .iter()
            .map(|f| (f.path.as_str(), f.kind == IndexKind::Array))
            .collect()
    }

    pub fn equivalent(&self, other: &IndexSpec) -> bool {
        self.identity() == other.identity()
    }

    pub fn array_field(&self) -> Option<&IndexField> {
        self.fields.iter().find(|f| f.kind == IndexKind::Array)
    }

    /// Encoded entry suffixes (components plus id) for a document. Empty when
    /// any indexed field is missing or the array field is not a non-empty
    /// array.
    pub fn entries(&self, id: &str, data: &Value) -> Vec<Vec<u8>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            match get_path(data, &f.path) {
                Some(v) => values.push(v),
                None => return Vec::new(),
            }
        }

        let mut out: Vec<Vec<u8>> = vec![Vec::new()];
        for (f, v) in self.fields.iter().zip(values) {
            match f.kind {
                IndexKind::Array => {
                    let Value::Array(items) = v else {
                        return Vec::new();
                    };
                    let mut elems = BTreeSet::new();
                    for item in items {
                        let mut e = Vec::new();
                        encode_component(item, SortDirection::Asc, &mut e);
                        elems.insert(e);
                    }
                    let mut next = Vec::with_capacity(out.len() * elems.len());
                    for base in &out {
                        for e in &elems {
                            let mut k = base.clone();
                            k.extend_from_slice(e);
                            next.push(k);
                        }
                    }
                    out = next;
                }
                kind => {
                    for k in &mut out {
                        encode_component(v, kind.direction(), k);
                    }
                }
            }
        }
        for k in &mut out {
            encode_id(id, k);
        }
        out
    }
}
