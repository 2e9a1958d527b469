use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    ArrayContains,
    ArrayContainsAny,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Lte,
            ">" => Operator::Gt,
            ">=" => Operator::Gte,
            "in" => Operator::In,
            "not-in" => Operator::NotIn,
            "array-contains" => Operator::ArrayContains,
            "array-contains-any" => Operator::ArrayContainsAny,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::ArrayContains => "array-contains",
            Operator::ArrayContainsAny => "array-contains-any",
        }
    }

    /// Operators that constrain a field to a range or exclude values. At most
    /// one field per query may carry them.
    pub fn is_inequality(self) -> bool {
        matches!(
            self,
            Operator::Lt
                | Operator::Lte
                | Operator::Gt
                | Operator::Gte
                | Operator::Ne
                | Operator::NotIn
        )
    }

    /// Range operators translate directly into scan bounds.
    pub fn is_range(self) -> bool {
        matches!(self, Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte)
    }

    /// Operators that take a list operand and match any/none of it.
    pub fn is_disjunctive(self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::ArrayContainsAny
        )
    }

    /// `!=` and `not-in` are answered by skipping, which needs an order-by.
    pub fn is_exclusion(self) -> bool {
        matches!(self, Operator::Ne | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
