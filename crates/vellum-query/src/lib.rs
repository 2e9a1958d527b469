mod cursor;
mod filter;
mod operator;
mod parse;
mod query;
mod sort;
pub mod value;

pub use cursor::{Anchor, CURSOR_MARKER, Cursor, CursorKind};
pub use filter::Filter;
pub use operator::Operator;
pub use parse::{QueryParseError, parse_query};
pub use query::{DEFAULT_LIMIT, Query};
pub use sort::{Sort, SortDirection};
