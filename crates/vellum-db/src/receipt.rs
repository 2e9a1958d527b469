use crate::error::DbError;

/// Outcome of one write action.
///
/// A failed receipt means the action's own changes were rolled back. Batch
/// and bundle actions succeed as a whole and report each item in `items`.
#[derive(Debug)]
pub struct Receipt {
    pub success: bool,
    pub error: Option<DbError>,
    /// Ids generated by `add`, in order.
    pub ids: Vec<String>,
    pub items: Vec<Result<(), DbError>>,
}

impl Receipt {
    pub(crate) fn success(ids: Vec<String>, items: Vec<Result<(), DbError>>) -> Self {
        Receipt {
            success: true,
            error: None,
            ids,
            items,
        }
    }

    pub(crate) fn failure(error: DbError) -> Self {
        Receipt {
            success: false,
            error: Some(error),
            ids: Vec::new(),
            items: Vec::new(),
        }
    }

    /// Per-item success flags of a batch or bundle.
    pub fn validity(&self) -> Vec<bool> {
        self.items.iter().map(Result::is_ok).collect()
    }

    /// Per-item error messages of a batch or bundle, `None` for items that
    /// went through.
    pub fn errors(&self) -> Vec<Option<String>> {
        self.items
            .iter()
            .map(|item| item.as_ref().err().map(ToString::to_string))
            .collect()
    }

    /// Turn a failed receipt into its error.
    pub fn into_result(self) -> Result<Self, DbError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}
