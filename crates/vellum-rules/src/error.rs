use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// Malformed rule, trigger or cron definition.
    Parse(String),
    /// Runtime failure while evaluating an expression.
    Eval(String),
    /// `request.method` redirections exceeded the hop bound.
    TooDeep(usize),
    /// A lookup or write delegated to the host failed.
    Host(String),
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::Parse(msg) => write!(f, "rule parse error: {msg}"),
            RuleError::Eval(msg) => write!(f, "rule eval error: {msg}"),
            RuleError::TooDeep(hops) => write!(f, "cycle or too deep ({hops} hops)"),
            RuleError::Host(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RuleError {}
