use std::collections::BTreeSet;
use std::ops::Bound;

use serde_json::Value;
use vellum_engine::encoding::value::{encode_component, encode_id, prefix_successor};
use vellum_engine::{CollectionPath, IndexField, IndexKind, IndexSpec};
use vellum_query::value::{ID_FIELD, field_value};
use vellum_query::{Anchor, Cursor, Filter, Operator, Query, Sort, SortDirection};

use crate::error::DbError;

use super::plan::{Node, Plan, ScanDirection, ScanRange};

/// Rule-based index selection over a collection's registered indexes.
pub struct Planner<'a> {
    indexes: &'a [IndexSpec],
    default_limit: usize,
}

/// Query clauses sorted by how an index serves them.
struct Shape<'q> {
    /// `==` filters, one per field.
    eq: Vec<&'q Filter>,
    /// `array-contains` or `array-contains-any` served by an array marker.
    array: Option<&'q Filter>,
    /// `in` on a field that is not ordered first; one sub-scan per value.
    in_eq: Option<&'q Filter>,
    /// `in` on the first order-by field.
    in_order: Option<&'q Filter>,
    ranges: Vec<&'q Filter>,
    residual: Vec<Filter>,
    sort: Vec<Sort>,
    /// Direction asked for `__id__` after it was dropped as a tie breaker.
    id_direction: Option<SortDirection>,
}

impl<'q> Shape<'q> {
    fn analyze(query: &'q Query) -> Result<Self, DbError> {
        let mut inequality: Option<&str> = None;
        let mut disjunctive: Option<&Filter> = None;
        for f in &query.filters {
            if f.op.is_inequality() {
                match inequality {
                    Some(field) if field != f.field => {
                        return Err(DbError::QueryPlan(format!(
                            "inequality filters on '{field}' and '{}'; only one field may have them",
                            f.field
                        )));
                    }
                    _ => inequality = Some(&f.field),
                }
            }
            if f.op.is_disjunctive() {
                if let Some(prev) = disjunctive {
                    return Err(DbError::QueryPlan(format!(
                        "'{}' and '{}' cannot be combined",
                        prev.op, f.op
                    )));
                }
                disjunctive = Some(f);
            }
        }

        let mut eq: Vec<&Filter> = Vec::new();
        let mut array = None;
        let mut ranges = Vec::new();
        let mut residual = Vec::new();
        let mut in_filter = None;
        for f in &query.filters {
            match f.op {
                Operator::Eq => {
                    if eq.iter().any(|e| e.field == f.field) {
                        residual.push(f.clone());
                    } else {
                        eq.push(f);
                    }
                }
                Operator::ArrayContains => {
                    if array.is_none() {
                        array = Some(f);
                    } else {
                        residual.push(f.clone());
                    }
                }
                Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => ranges.push(f),
                Operator::Ne | Operator::NotIn => residual.push(f.clone()),
                Operator::In => in_filter = Some(f),
                Operator::ArrayContainsAny => {}
            }
        }
        for f in query.filters.iter().filter(|f| f.op == Operator::ArrayContainsAny) {
            if array.is_none() {
                array = Some(f);
            } else {
                residual.push(f.clone());
            }
        }

        let mut sort: Vec<Sort> = query
            .sort
            .iter()
            .filter(|s| !eq.iter().any(|e| e.field == s.field))
            .cloned()
            .collect();

        if let Some(field) = inequality {
            match sort.first() {
                None if query
                    .filters
                    .iter()
                    .any(|f| f.field == field && f.op.is_exclusion()) =>
                {
                    return Err(DbError::QueryPlan(format!(
                        "!= and not-in on '{field}' need an order-by on '{field}'"
                    )));
                }
                None => sort.push(Sort::asc(field)),
                Some(first) if first.field != field => {
                    return Err(DbError::QueryPlan(format!(
                        "inequality field '{field}' must be the first order-by, not '{}'",
                        first.field
                    )));
                }
                Some(_) => {}
            }
        }

        let (mut in_eq, mut in_order) = (None, None);
        if let Some(f) = in_filter {
            if sort.is_empty() {
                sort.push(Sort::asc(&f.field));
            }
            if sort[0].field == f.field {
                in_order = Some(f);
            } else {
                sort.retain(|s| s.field != f.field);
                in_eq = Some(f);
            }
        }

        let mut shape = Shape {
            eq,
            array,
            in_eq,
            in_order,
            ranges,
            residual,
            sort,
            id_direction: None,
        };
        shape.place_id()?;
        Ok(shape)
    }

    fn has_equality(&self) -> bool {
        !self.eq.is_empty() || self.array.is_some() || self.in_eq.is_some()
    }

    /// The id index holds nothing but the id, so `__id__` clauses mixed with
    /// other fields become tie breakers or residual filters.
    fn place_id(&mut self) -> Result<(), DbError> {
        if let Some(pos) = self.eq.iter().position(|f| f.field == ID_FIELD) {
            let alone = self.eq.len() == 1
                && self.array.is_none()
                && self.in_eq.is_none()
                && self.sort.is_empty();
            if !alone {
                let f = self.eq.remove(pos);
                self.residual.push(f.clone());
            }
        }
        if let Some(pos) = self.sort.iter().position(|s| s.field == ID_FIELD) {
            if self.sort.len() > 1 || self.has_equality() {
                if pos + 1 != self.sort.len() {
                    return Err(DbError::QueryPlan(format!(
                        "{ID_FIELD} can only be the last order-by"
                    )));
                }
                self.id_direction = self.sort.pop().map(|s| s.direction);
            }
        }
        if let Some(f) = self.in_order {
            if self.sort.first().is_none_or(|s| s.field != f.field) {
                self.residual.push(f.clone());
                self.in_order = None;
            }
        }
        if !self.has_equality() && self.sort.is_empty() {
            let direction = self.id_direction.take().unwrap_or(SortDirection::Asc);
            self.sort.push(Sort {
                field: ID_FIELD.to_string(),
                direction,
            });
        }
        Ok(())
    }

    /// Unordered `(path, is_array)` set the leading index fields must match.
    fn equality(&self) -> BTreeSet<(&str, bool)> {
        let mut set: BTreeSet<(&str, bool)> =
            self.eq.iter().map(|f| (f.field.as_str(), false)).collect();
        if let Some(f) = self.in_eq {
            set.insert((f.field.as_str(), false));
        }
        if let Some(f) = self.array {
            set.insert((f.field.as_str(), true));
        }
        set
    }

    /// Candidate values for one leading index field.
    fn head_values(&self, field: &IndexField) -> Vec<&'q Value> {
        if field.kind == IndexKind::Array {
            return self.array.map(|f| f.operands().iter().collect()).unwrap_or_default();
        }
        if let Some(f) = self.in_eq.filter(|f| f.field == field.path) {
            return f.operands().iter().collect();
        }
        self.eq
            .iter()
            .filter(|f| f.field == field.path)
            .map(|f| &f.value)
            .collect()
    }

    /// Index definition that would serve this shape, for error messages.
    fn suggestion(&self) -> String {
        let mut fields: Vec<Value> = Vec::new();
        for f in &self.eq {
            fields.push(serde_json::json!([f.field, "asc"]));
        }
        if let Some(f) = self.in_eq {
            fields.push(serde_json::json!([f.field, "asc"]));
        }
        if let Some(f) = self.array {
            fields.push(serde_json::json!([f.field, "array"]));
        }
        for s in &self.sort {
            fields.push(serde_json::json!([s.field, s.direction.as_str()]));
        }
        Value::Array(fields).to_string()
    }
}

impl<'a> Planner<'a> {
    pub fn new(indexes: &'a [IndexSpec], default_limit: usize) -> Self {
        Self {
            indexes,
            default_limit,
        }
    }

    pub fn plan(&self, collection: &CollectionPath, query: &Query) -> Result<Plan, DbError> {
        let mut shape = Shape::analyze(query)?;
        let (index, direction) = self.choose(&shape)?;

        if let Some(d) = shape.id_direction {
            let scan = match direction {
                ScanDirection::Forward => SortDirection::Asc,
                ScanDirection::Reverse => SortDirection::Desc,
            };
            if !shape.sort.is_empty() && d != scan {
                return Err(DbError::QueryPlan(format!(
                    "{ID_FIELD} must follow the scan direction ({})",
                    scan.as_str()
                )));
            }
        }

        let n = shape.equality().len();
        let (head_fields, tail) = index.fields.split_at(n);

        let ranges = std::mem::take(&mut shape.ranges);
        let (served, unserved): (Vec<&Filter>, Vec<&Filter>) = ranges
            .into_iter()
            .partition(|f| tail.first().is_some_and(|t| t.path == f.field));
        shape.residual.extend(unserved.into_iter().cloned());

        let mut sources = Vec::new();
        for head in head_prefixes(&shape, head_fields) {
            let mut bounds = ScanRange::full();
            if let Some(first) = tail.first() {
                for f in &served {
                    bounds = bounds.intersect(range_bounds(&head, f, first.kind.direction()));
                }
            }
            for cursor in [&query.start, &query.end].into_iter().flatten() {
                let (key, exact) = cursor_key(cursor, &head, tail, index)?;
                bounds = bounds.intersect(cursor_range(cursor, key, exact, direction));
            }

            let fixed: Vec<Vec<u8>> = match (shape.in_order, tail.first()) {
                (Some(f), Some(first)) => dedup(f.operands().iter().map(|v| {
                    let mut k = head.clone();
                    encode_component(v, first.kind.direction(), &mut k);
                    k
                })),
                _ => vec![head.clone()],
            };
            for prefix in fixed {
                let range = prefix_range(&prefix).intersect(bounds.clone());
                if range.is_empty() {
                    continue;
                }
                sources.push(Node::IndexScan {
                    index: index.clone(),
                    range,
                    direction,
                    strip: head.len(),
                });
            }
        }

        let source = match sources.len() {
            0 => Node::Empty,
            1 => sources.remove(0),
            _ => Node::Union { sources, direction },
        };
        let mut node = Node::KeyLookup {
            source: Box::new(source),
        };
        if !shape.residual.is_empty() {
            node = Node::Filter {
                predicates: shape.residual,
                source: Box::new(node),
            };
        }
        Ok(Plan {
            collection: collection.clone(),
            index: index.clone(),
            direction,
            root: Node::Limit {
                take: query.limit.unwrap_or(self.default_limit),
                source: Box::new(node),
            },
        })
    }

    /// First index whose leading fields are the equality set and whose
    /// remaining fields are the order-by list, preferring a forward match.
    fn choose(&self, shape: &Shape<'_>) -> Result<(&'a IndexSpec, ScanDirection), DbError> {
        let want = shape.equality();
        let n = want.len();
        let mut reverse = None;
        for spec in self.indexes {
            if spec.fields.len() != n + shape.sort.len() {
                continue;
            }
            let (head, tail) = spec.fields.split_at(n);
            let have: BTreeSet<(&str, bool)> = head
                .iter()
                .map(|f| (f.path.as_str(), f.kind == IndexKind::Array))
                .collect();
            if have != want || tail.iter().any(|f| f.kind == IndexKind::Array) {
                continue;
            }
            if !tail.iter().zip(&shape.sort).all(|(f, s)| f.path == s.field) {
                continue;
            }
            let forward = tail
                .iter()
                .zip(&shape.sort)
                .all(|(f, s)| f.kind.direction() == s.direction);
            let backward = tail
                .iter()
                .zip(&shape.sort)
                .all(|(f, s)| f.kind.direction() == s.direction.reverse());
            let wants_reverse =
                shape.sort.is_empty() && shape.id_direction == Some(SortDirection::Desc);
            if forward && !wants_reverse {
                return Ok((spec, ScanDirection::Forward));
            }
            if backward && reverse.is_none() {
                reverse = Some(spec);
            }
        }
        reverse
            .map(|spec| (spec, ScanDirection::Reverse))
            .ok_or_else(|| {
                DbError::QueryPlan(format!("no matching index; add {}", shape.suggestion()))
            })
    }
}

fn dedup(keys: impl Iterator<Item = Vec<u8>>) -> Vec<Vec<u8>> {
    keys.collect::<BTreeSet<_>>().into_iter().collect()
}

/// Encoded equality prefixes, one per combination of leading values.
fn head_prefixes(shape: &Shape<'_>, fields: &[IndexField]) -> Vec<Vec<u8>> {
    let mut prefixes = vec![Vec::new()];
    for field in fields {
        let values = shape.head_values(field);
        let mut next = Vec::with_capacity(prefixes.len() * values.len());
        for p in &prefixes {
            for v in &values {
                let mut k = p.clone();
                encode_component(v, field.kind.direction(), &mut k);
                next.push(k);
            }
        }
        prefixes = next;
    }
    dedup(prefixes.into_iter())
}

fn prefix_range(prefix: &[u8]) -> ScanRange {
    if prefix.is_empty() {
        return ScanRange::full();
    }
    ScanRange {
        lower: Bound::Included(prefix.to_vec()),
        upper: prefix_successor(prefix).map_or(Bound::Unbounded, Bound::Excluded),
    }
}

/// Lower bound at `key`. Non-exact keys are prefixes: exclusion skips every
/// entry that starts with them.
fn lower_bound(key: Vec<u8>, inclusive: bool, exact: bool) -> Bound<Vec<u8>> {
    if inclusive {
        Bound::Included(key)
    } else if exact {
        Bound::Excluded(key)
    } else {
        match prefix_successor(&key) {
            Some(next) => Bound::Included(next),
            None => Bound::Excluded(key),
        }
    }
}

fn upper_bound(key: Vec<u8>, inclusive: bool, exact: bool) -> Bound<Vec<u8>> {
    if !inclusive {
        Bound::Excluded(key)
    } else if exact {
        Bound::Included(key)
    } else {
        prefix_successor(&key).map_or(Bound::Unbounded, Bound::Excluded)
    }
}

fn range_bounds(head: &[u8], f: &Filter, direction: SortDirection) -> ScanRange {
    let mut key = head.to_vec();
    encode_component(&f.value, direction, &mut key);
    let (at_least, inclusive) = match f.op {
        Operator::Gt => (true, false),
        Operator::Gte => (true, true),
        Operator::Lt => (false, false),
        Operator::Lte => (false, true),
        _ => return ScanRange::full(),
    };
    if at_least == (direction == SortDirection::Asc) {
        ScanRange {
            lower: lower_bound(key, inclusive, false),
            upper: Bound::Unbounded,
        }
    } else {
        ScanRange {
            lower: Bound::Unbounded,
            upper: upper_bound(key, inclusive, false),
        }
    }
}

/// Encode a cursor anchor. Returns the key and whether it names one exact
/// entry (snapshot anchors) rather than a prefix (literal values).
fn cursor_key(
    cursor: &Cursor,
    head: &[u8],
    tail: &[IndexField],
    index: &IndexSpec,
) -> Result<(Vec<u8>, bool), DbError> {
    let mut key = head.to_vec();
    match &cursor.anchor {
        Anchor::Values(values) => {
            if values.len() > tail.len() {
                return Err(DbError::InvalidQuery(format!(
                    "{} takes at most {} value(s) here",
                    cursor.kind.as_str(),
                    tail.len()
                )));
            }
            for (v, f) in values.iter().zip(tail) {
                encode_component(v, f.kind.direction(), &mut key);
            }
            Ok((key, false))
        }
        Anchor::Snapshot { id, data } => {
            for f in tail {
                let v = field_value(id, data, &f.path)
                    .ok_or_else(|| {
                        DbError::InvalidQuery(format!("cursor document has no '{}'", f.path))
                    })?
                    .to_value();
                encode_component(&v, f.kind.direction(), &mut key);
            }
            if !index.is_id() {
                encode_id(id, &mut key);
            }
            Ok((key, true))
        }
    }
}

/// Cursor kinds name positions in result order; a reverse scan swaps which
/// byte bound they set.
fn cursor_range(cursor: &Cursor, key: Vec<u8>, exact: bool, direction: ScanDirection) -> ScanRange {
    let inclusive = cursor.kind.is_inclusive();
    if cursor.kind.is_start() == (direction == ScanDirection::Forward) {
        ScanRange {
            lower: lower_bound(key, inclusive, exact),
            upper: Bound::Unbounded,
        }
    } else {
        ScanRange {
            lower: Bound::Unbounded,
            upper: upper_bound(key, inclusive, exact),
        }
    }
}
