use serde_json::Value;

/// Marker key identifying a snapshot returned by `cget`.
pub const CURSOR_MARKER: &str = "__cursor__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    StartAt,
    StartAfter,
    EndAt,
    EndBefore,
}

impl CursorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "startAt" => Some(CursorKind::StartAt),
            "startAfter" => Some(CursorKind::StartAfter),
            "endAt" => Some(CursorKind::EndAt),
            "endBefore" => Some(CursorKind::EndBefore),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CursorKind::StartAt => "startAt",
            CursorKind::StartAfter => "startAfter",
            CursorKind::EndAt => "endAt",
            CursorKind::EndBefore => "endBefore",
        }
    }

    pub fn is_start(self) -> bool {
        matches!(self, CursorKind::StartAt | CursorKind::StartAfter)
    }

    pub fn is_inclusive(self) -> bool {
        matches!(self, CursorKind::StartAt | CursorKind::EndAt)
    }
}

/// What a cursor is positioned on.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// Literal values for the leading order-by fields.
    Values(Vec<Value>),
    /// A previously fetched document; bounds use its order-by values and id.
    Snapshot { id: String, data: Value },
}

impl Anchor {
    /// Recognize a `cget` snapshot: `{"__cursor__": true, "id": .., "data": ..}`.
    pub fn from_snapshot(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        if obj.get(CURSOR_MARKER).and_then(Value::as_bool) != Some(true) {
            return None;
        }
        let id = obj.get("id")?.as_str()?.to_string();
        let data = obj.get("data").cloned().unwrap_or(Value::Null);
        Some(Anchor::Snapshot { id, data })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub kind: CursorKind,
    pub anchor: Anchor,
}
