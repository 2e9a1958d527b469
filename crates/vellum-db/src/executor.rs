use std::collections::HashSet;

use vellum_engine::{IndexEntry, KvTransaction, Record};
use vellum_store::Store;

use crate::error::DbError;
use crate::planner::plan::{Node, Plan, ScanDirection};

/// A document produced by a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub record: Record,
}

pub type RowIter<'t> = Box<dyn Iterator<Item = Result<Row, DbError>> + 't>;
type EntryIter<'t> = Box<dyn Iterator<Item = Result<IndexEntry, DbError>> + 't>;

/// Run a plan, returning rows lazily in index order.
pub fn execute<'t, 'a, S: Store + 'a>(
    kv: &'t KvTransaction<'a, S>,
    plan: &'t Plan,
) -> Result<RowIter<'t>, DbError> {
    execute_row_node(kv, plan, &plan.root)
}

// ── Row tier ────────────────────────────────────────────────────

fn execute_row_node<'t, 'a, S: Store + 'a>(
    kv: &'t KvTransaction<'a, S>,
    plan: &'t Plan,
    node: &'t Node,
) -> Result<RowIter<'t>, DbError> {
    match node {
        Node::Limit { take, source } => {
            let rows = execute_row_node(kv, plan, source)?;
            Ok(Box::new(rows.take(*take)))
        }

        Node::Filter { predicates, source } => {
            let rows = execute_row_node(kv, plan, source)?;
            Ok(Box::new(rows.filter(move |r| match r {
                Ok(row) => predicates.iter().all(|p| p.matches(&row.id, &row.record.data)),
                Err(_) => true,
            })))
        }

        Node::KeyLookup { source } => {
            let entries = execute_entry_node(kv, plan, source)?;
            Ok(Box::new(entries.filter_map(move |entry| {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => return Some(Err(e)),
                };
                let path = match plan.collection.doc(entry.id.as_str()) {
                    Ok(p) => p,
                    Err(e) => return Some(Err(e.into())),
                };
                // Index entries and records move together, so a miss is
                // only possible for a corrupt store; skip it.
                match kv.get(&path) {
                    Ok(Some(record)) => Some(Ok(Row {
                        id: entry.id,
                        record,
                    })),
                    Ok(None) => None,
                    Err(e) => Some(Err(e.into())),
                }
            })))
        }

        _ => Err(DbError::QueryPlan("unexpected node above key lookup".into())),
    }
}

// ── Entry tier ──────────────────────────────────────────────────
//
// Nodes below KeyLookup yield index entries: the order key and the id.

fn execute_entry_node<'t, 'a, S: Store + 'a>(
    kv: &'t KvTransaction<'a, S>,
    plan: &'t Plan,
    node: &'t Node,
) -> Result<EntryIter<'t>, DbError> {
    match node {
        Node::Empty => Ok(Box::new(std::iter::empty())),

        Node::IndexScan {
            index,
            range,
            direction,
            ..
        } => {
            if range.is_empty() {
                return Ok(Box::new(std::iter::empty()));
            }
            let iter = kv.scan_index(
                &plan.collection,
                index,
                range.lower_ref(),
                range.upper_ref(),
                *direction == ScanDirection::Reverse,
            )?;
            Ok(Box::new(iter.map(|r| r.map_err(DbError::from))))
        }

        Node::Union { sources, direction } => {
            let mut iters = Vec::with_capacity(sources.len());
            let mut strips = Vec::with_capacity(sources.len());
            for source in sources {
                let strip = match source {
                    Node::IndexScan { strip, .. } => *strip,
                    _ => 0,
                };
                iters.push(execute_entry_node(kv, plan, source)?);
                strips.push(strip);
            }
            Ok(Box::new(MergeIter::new(iters, strips, *direction)))
        }

        _ => Err(DbError::QueryPlan("unexpected node below key lookup".into())),
    }
}

/// K-way merge of ordered entry streams. Each stream is compared on its
/// entry suffix past its own equality prefix; a document reached through
/// more than one stream is yielded once.
struct MergeIter<'t> {
    sources: Vec<EntryIter<'t>>,
    strips: Vec<usize>,
    heads: Vec<Option<IndexEntry>>,
    direction: ScanDirection,
    seen: HashSet<String>,
    primed: bool,
    done: bool,
}

impl<'t> MergeIter<'t> {
    fn new(sources: Vec<EntryIter<'t>>, strips: Vec<usize>, direction: ScanDirection) -> Self {
        let heads = sources.iter().map(|_| None).collect();
        Self {
            sources,
            strips,
            heads,
            direction,
            seen: HashSet::new(),
            primed: false,
            done: false,
        }
    }

    fn refill(&mut self, i: usize) -> Result<(), DbError> {
        self.heads[i] = self.sources[i].next().transpose()?;
        Ok(())
    }

    fn order_key(&self, i: usize) -> Option<&[u8]> {
        let entry = self.heads[i].as_ref()?;
        Some(entry.suffix.get(self.strips[i]..).unwrap_or_default())
    }

    /// Source whose head comes next in scan order.
    fn pick(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for i in 0..self.heads.len() {
            let Some(key) = self.order_key(i) else {
                continue;
            };
            let better = match best.and_then(|b| self.order_key(b)) {
                None => true,
                Some(current) => match self.direction {
                    ScanDirection::Forward => key < current,
                    ScanDirection::Reverse => key > current,
                },
            };
            if better {
                best = Some(i);
            }
        }
        best
    }

    fn advance(&mut self) -> Result<Option<IndexEntry>, DbError> {
        if !self.primed {
            for i in 0..self.sources.len() {
                self.refill(i)?;
            }
            self.primed = true;
        }
        while let Some(i) = self.pick() {
            let entry = self.heads[i].take();
            self.refill(i)?;
            if let Some(entry) = entry {
                if self.seen.insert(entry.id.clone()) {
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for MergeIter<'_> {
    type Item = Result<IndexEntry, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
