use crate::cursor::Cursor;
use crate::filter::Filter;
use crate::sort::Sort;

/// Result cap applied when a query names no limit.
pub const DEFAULT_LIMIT: usize = 1000;

/// Parsed clause set for one collection read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub sort: Vec<Sort>,
    pub filters: Vec<Filter>,
    pub start: Option<Cursor>,
    pub end: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        if cursor.kind.is_start() {
            self.start = Some(cursor);
        } else {
            self.end = Some(cursor);
        }
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_clauses(&self) -> bool {
        !self.sort.is_empty() || !self.filters.is_empty()
    }
}
