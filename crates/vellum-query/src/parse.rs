use serde_json::Value;

use crate::cursor::{Anchor, Cursor, CursorKind};
use crate::filter::Filter;
use crate::operator::Operator;
use crate::query::Query;
use crate::sort::{Sort, SortDirection};

/// Parse error for query clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParseError(pub String);

impl std::fmt::Display for QueryParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query parse error: {}", self.0)
    }
}

impl std::error::Error for QueryParseError {}

/// Parse the clause list that follows a collection path.
///
/// Accepted clause forms:
/// - `n` (non-negative integer): limit
/// - `["field"]` / `["field", "asc" | "desc"]`: order-by
/// - `["field", op, value]`: filter
/// - `["startAt" | "startAfter" | "endAt" | "endBefore", values...]`: cursor,
///   where a single `cget` snapshot argument anchors on that document
pub fn parse_query(clauses: &[Value]) -> Result<Query, QueryParseError> {
    let mut query = Query::new();

    for clause in clauses {
        match clause {
            Value::Number(n) => {
                let limit = n
                    .as_u64()
                    .and_then(|l| usize::try_from(l).ok())
                    .ok_or_else(|| QueryParseError(format!("invalid limit: {n}")))?;
                if query.limit.is_some() {
                    return Err(QueryParseError("limit given more than once".into()));
                }
                query.limit = Some(limit);
            }
            Value::Array(parts) => parse_array_clause(parts, &mut query)?,
            other => {
                return Err(QueryParseError(format!("unsupported clause: {other}")));
            }
        }
    }

    Ok(query)
}

fn parse_array_clause(parts: &[Value], query: &mut Query) -> Result<(), QueryParseError> {
    let head = parts
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| QueryParseError("clause must start with a field name".into()))?;

    if let Some(kind) = CursorKind::parse(head) {
        let cursor = parse_cursor(kind, &parts[1..])?;
        let slot = if kind.is_start() {
            &mut query.start
        } else {
            &mut query.end
        };
        if slot.is_some() {
            return Err(QueryParseError(format!(
                "more than one {} cursor",
                if kind.is_start() { "start" } else { "end" }
            )));
        }
        *slot = Some(cursor);
        return Ok(());
    }

    match parts.len() {
        1 => query.sort.push(Sort::asc(head)),
        2 => {
            let direction = parts[1]
                .as_str()
                .and_then(SortDirection::parse)
                .ok_or_else(|| {
                    QueryParseError(format!("invalid sort direction: {}", parts[1]))
                })?;
            query.sort.push(Sort {
                field: head.to_string(),
                direction,
            });
        }
        3 => {
            let op = parts[1]
                .as_str()
                .and_then(Operator::parse)
                .ok_or_else(|| QueryParseError(format!("unknown operator: {}", parts[1])))?;
            let value = parts[2].clone();
            if op.is_disjunctive() && !matches!(&value, Value::Array(items) if !items.is_empty())
            {
                return Err(QueryParseError(format!(
                    "{op} requires a non-empty array operand"
                )));
            }
            query.filters.push(Filter::new(head, op, value));
        }
        n => {
            return Err(QueryParseError(format!(
                "clause on '{head}' has {n} elements"
            )));
        }
    }
    Ok(())
}

fn parse_cursor(kind: CursorKind, args: &[Value]) -> Result<Cursor, QueryParseError> {
    if args.is_empty() {
        return Err(QueryParseError(format!("{} needs a value", kind.as_str())));
    }
    let anchor = match args {
        [single] => Anchor::from_snapshot(single).unwrap_or_else(|| Anchor::Values(args.to_vec())),
        _ => Anchor::Values(args.to_vec()),
    };
    Ok(Cursor { kind, anchor })
}
