use std::ops::Bound;

use vellum_engine::{CollectionPath, IndexSpec};
use vellum_query::Filter;

/// Scan direction for index scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

/// Byte bounds on index entry suffixes (encoded components plus id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl ScanRange {
    pub fn full() -> Self {
        ScanRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Narrow to the tighter of each pair of bounds.
    pub fn intersect(self, other: ScanRange) -> Self {
        ScanRange {
            lower: tighter_lower(self.lower, other.lower),
            upper: tighter_upper(self.upper, other.upper),
        }
    }

    /// Whether no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }

    pub fn lower_ref(&self) -> Bound<&[u8]> {
        self.lower.as_ref().map(Vec::as_slice)
    }

    pub fn upper_ref(&self) -> Bound<&[u8]> {
        self.upper.as_ref().map(Vec::as_slice)
    }
}

fn tighter_lower(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i > e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}

fn tighter_upper(a: Bound<Vec<u8>>, b: Bound<Vec<u8>>) -> Bound<Vec<u8>> {
    match (a, b) {
        (Bound::Unbounded, x) | (x, Bound::Unbounded) => x,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i < e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Yields nothing.
    Empty,

    /// Ordered scan over one index, yielding entries.
    IndexScan {
        index: IndexSpec,
        range: ScanRange,
        direction: ScanDirection,
        /// Length of the fixed equality prefix. Sub-scans of a `Union` are
        /// merged on the bytes after it.
        strip: usize,
    },

    /// Merge of index scans in scan order, dropping repeated documents.
    Union {
        sources: Vec<Node>,
        direction: ScanDirection,
    },

    /// Fetch the record of every entry from `source`.
    KeyLookup { source: Box<Node> },

    /// Drop rows that fail any predicate.
    Filter {
        predicates: Vec<Filter>,
        source: Box<Node>,
    },

    /// Stop after `take` rows.
    Limit { take: usize, source: Box<Node> },
}

/// A planned read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub collection: CollectionPath,
    /// Index serving the query.
    pub index: IndexSpec,
    pub direction: ScanDirection,
    pub root: Node,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inc(b: &[u8]) -> Bound<Vec<u8>> {
        Bound::Included(b.to_vec())
    }

    fn exc(b: &[u8]) -> Bound<Vec<u8>> {
        Bound::Excluded(b.to_vec())
    }

    #[test]
    fn intersect_keeps_tighter_bounds() {
        let a = ScanRange {
            lower: inc(b"b"),
            upper: exc(b"y"),
        };
        let b = ScanRange {
            lower: exc(b"b"),
            upper: inc(b"m"),
        };
        let r = a.intersect(b);
        assert_eq!(r.lower, exc(b"b"));
        assert_eq!(r.upper, inc(b"m"));
        assert!(!r.is_empty());
    }

    #[test]
    fn detects_empty_ranges() {
        let r = ScanRange {
            lower: exc(b"k"),
            upper: inc(b"k"),
        };
        assert!(r.is_empty());
        let r = ScanRange {
            lower: inc(b"k"),
            upper: inc(b"k"),
        };
        assert!(!r.is_empty());
        assert!(!ScanRange::full().is_empty());
    }
}
