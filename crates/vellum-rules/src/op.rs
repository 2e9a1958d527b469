/// Number of arguments a builtin takes before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Curried: fewer arguments yield a partial application.
    Fixed(usize),
    /// Runs with whatever it is given.
    Variadic,
}

/// Builtin functions. Names follow the functional (array) form; the
/// JSON-logic symbols map onto the same variants where they agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Comparison
    Equals,
    NotEquals,
    Gt,
    Gte,
    Lt,
    Lte,
    // Logic
    And,
    Or,
    Not,
    Truthy,
    IsNil,
    IsEmpty,
    Identity,
    Always,
    DefaultTo,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Plus,
    Times,
    Inc,
    Dec,
    Negate,
    Max,
    Min,
    Sum,
    // Objects
    Prop,
    Path,
    PropEq,
    Has,
    Keys,
    Values,
    Assoc,
    Dissoc,
    MergeLeft,
    MergeRight,
    // Lists and strings
    Includes,
    Append,
    Prepend,
    Concat,
    Head,
    Last,
    Tail,
    Length,
    Nth,
    Cat,
    ToLower,
    ToUpper,
    Split,
    Join,
    Trim,
    StartsWith,
    EndsWith,
    // Higher order
    Map,
    Filter,
    Reject,
    All,
    Any,
    When,
    Unless,
    Pipe,
    Compose,
    // Host
    Get,
}

impl Op {
    /// Resolve an array-form head such as `"propEq"` or `"get()"`.
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "equals" => Op::Equals,
            "gt" => Op::Gt,
            "gte" => Op::Gte,
            "lt" => Op::Lt,
            "lte" => Op::Lte,
            "and" => Op::And,
            "or" => Op::Or,
            "not" => Op::Not,
            "isNil" => Op::IsNil,
            "isEmpty" => Op::IsEmpty,
            "identity" => Op::Identity,
            "always" => Op::Always,
            "defaultTo" => Op::DefaultTo,
            "add" => Op::Add,
            "subtract" => Op::Subtract,
            "multiply" => Op::Multiply,
            "divide" => Op::Divide,
            "modulo" => Op::Modulo,
            "inc" => Op::Inc,
            "dec" => Op::Dec,
            "negate" => Op::Negate,
            "max" => Op::Max,
            "min" => Op::Min,
            "sum" => Op::Sum,
            "prop" => Op::Prop,
            "path" => Op::Path,
            "propEq" => Op::PropEq,
            "has" => Op::Has,
            "keys" => Op::Keys,
            "values" => Op::Values,
            "assoc" => Op::Assoc,
            "dissoc" => Op::Dissoc,
            "mergeLeft" => Op::MergeLeft,
            "mergeRight" | "merge" => Op::MergeRight,
            "includes" => Op::Includes,
            "append" => Op::Append,
            "prepend" => Op::Prepend,
            "concat" => Op::Concat,
            "head" => Op::Head,
            "last" => Op::Last,
            "tail" => Op::Tail,
            "length" => Op::Length,
            "nth" => Op::Nth,
            "toLower" => Op::ToLower,
            "toUpper" => Op::ToUpper,
            "split" => Op::Split,
            "join" => Op::Join,
            "trim" => Op::Trim,
            "startsWith" => Op::StartsWith,
            "endsWith" => Op::EndsWith,
            "map" => Op::Map,
            "filter" => Op::Filter,
            "reject" => Op::Reject,
            "all" => Op::All,
            "any" => Op::Any,
            "when" => Op::When,
            "unless" => Op::Unless,
            "pipe" => Op::Pipe,
            "compose" => Op::Compose,
            "get()" => Op::Get,
            other => return Self::parse_logic(other),
        };
        Some(op)
    }

    /// Resolve a JSON-logic operator key, e.g. `{"<": [a, b]}`.
    pub fn parse_logic(name: &str) -> Option<Self> {
        let op = match name {
            "==" | "===" => Op::Equals,
            "!=" | "!==" => Op::NotEquals,
            ">" => Op::Gt,
            ">=" => Op::Gte,
            "<" => Op::Lt,
            "<=" => Op::Lte,
            "!" => Op::Not,
            "!!" => Op::Truthy,
            "+" => Op::Plus,
            "-" => Op::Subtract,
            "*" => Op::Times,
            "/" => Op::Divide,
            "%" => Op::Modulo,
            "in" => Op::Includes,
            "cat" => Op::Cat,
            "and" => Op::And,
            "or" => Op::Or,
            _ => return None,
        };
        Some(op)
    }

    pub fn arity(self) -> Arity {
        match self {
            Op::And | Op::Or | Op::Plus | Op::Times | Op::Cat | Op::Pipe | Op::Compose => {
                Arity::Variadic
            }
            Op::Not
            | Op::Truthy
            | Op::IsNil
            | Op::IsEmpty
            | Op::Identity
            | Op::Inc
            | Op::Dec
            | Op::Negate
            | Op::Sum
            | Op::Keys
            | Op::Values
            | Op::Head
            | Op::Last
            | Op::Tail
            | Op::Length
            | Op::ToLower
            | Op::ToUpper
            | Op::Trim
            | Op::Get => Arity::Fixed(1),
            Op::PropEq | Op::Assoc | Op::When | Op::Unless => Arity::Fixed(3),
            _ => Arity::Fixed(2),
        }
    }

    /// `and`/`or` evaluate their arguments lazily.
    pub fn is_lazy(self) -> bool {
        matches!(self, Op::And | Op::Or)
    }
}
