//! Filters, mutations and batch outcomes.

use crate::value::{Row, Value, ID_COLUMN};

/// A conjunction of column equalities.
///
/// An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(Vec<(String, Value)>);

impl Filter {
    /// Creates a filter matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a filter on the primary key.
    #[must_use]
    pub fn by_id(id: impl Into<Value>) -> Self {
        Self::all().and(ID_COLUMN, id)
    }

    /// Creates a filter on a single column.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(column, value)
    }

    /// Adds another equality to the filter.
    #[must_use]
    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((column.into(), value.into()));
        self
    }

    /// Returns the primary key this filter pins, if any.
    #[must_use]
    pub fn pinned_id(&self) -> Option<&Value> {
        self.0
            .iter()
            .find(|(column, _)| column == ID_COLUMN)
            .map(|(_, value)| value)
    }

    /// Returns true if `row` satisfies every equality.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.0
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

/// A single write against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a full row. The row must bind the primary key.
    Insert {
        /// Target table.
        table: String,
        /// Row to insert.
        row: Row,
    },
    /// Overwrite the bound columns of every matching row.
    Update {
        /// Target table.
        table: String,
        /// Rows to touch.
        filter: Filter,
        /// Columns to overwrite.
        changes: Row,
        /// Reject the batch when no row matches.
        require_match: bool,
    },
    /// Remove every matching row.
    Delete {
        /// Target table.
        table: String,
        /// Rows to remove.
        filter: Filter,
        /// Reject the batch when no row matches.
        require_match: bool,
    },
}

impl Mutation {
    /// Creates an insert.
    #[must_use]
    pub fn insert(table: impl Into<String>, row: Row) -> Self {
        Self::Insert {
            table: table.into(),
            row,
        }
    }

    /// Creates a conditional update that must touch at least one row.
    #[must_use]
    pub fn update(table: impl Into<String>, filter: Filter, changes: Row) -> Self {
        Self::Update {
            table: table.into(),
            filter,
            changes,
            require_match: true,
        }
    }

    /// Creates a conditional delete that must remove at least one row.
    #[must_use]
    pub fn delete(table: impl Into<String>, filter: Filter) -> Self {
        Self::Delete {
            table: table.into(),
            filter,
            require_match: true,
        }
    }

    /// Drops the match requirement, so zero affected rows is not a rejection.
    #[must_use]
    pub fn unconditional(self) -> Self {
        match self {
            Self::Update {
                table,
                filter,
                changes,
                ..
            } => Self::Update {
                table,
                filter,
                changes,
                require_match: false,
            },
            Self::Delete { table, filter, .. } => Self::Delete {
                table,
                filter,
                require_match: false,
            },
            insert @ Self::Insert { .. } => insert,
        }
    }

    /// Returns the target table.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }

    /// Returns true if zero affected rows rejects the batch.
    #[must_use]
    pub fn requires_match(&self) -> bool {
        match self {
            Self::Insert { .. } => false,
            Self::Update { require_match, .. } | Self::Delete { require_match, .. } => {
                *require_match
            }
        }
    }
}

/// Result of applying a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every mutation was applied.
    Applied {
        /// Affected row count per mutation, in batch order.
        affected: Vec<u64>,
    },
    /// A conditional mutation matched nothing; nothing was applied.
    Rejected {
        /// Position of the rejecting mutation in the batch.
        index: usize,
    },
}

impl BatchOutcome {
    /// Returns true if the batch was applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_all_equalities() {
        let row = Row::new().with(ID_COLUMN, 1_i64).with("Value", 3_i64);

        assert!(Filter::by_id(1_i64).matches(&row));
        assert!(Filter::by_id(1_i64).and("Value", 3_i64).matches(&row));
        assert!(!Filter::by_id(1_i64).and("Value", 2_i64).matches(&row));
        assert!(Filter::all().matches(&row));
    }

    #[test]
    fn filter_pinned_id() {
        assert_eq!(
            Filter::eq("Value", 1_i64).and(ID_COLUMN, 9_i64).pinned_id(),
            Some(&Value::Integer(9))
        );
        assert!(Filter::eq("Value", 1_i64).pinned_id().is_none());
    }

    #[test]
    fn update_and_delete_are_conditional_by_default() {
        let update = Mutation::update("T", Filter::by_id(1_i64), Row::new());
        assert!(update.requires_match());
        assert!(!update.unconditional().requires_match());

        let delete = Mutation::delete("T", Filter::by_id(1_i64));
        assert!(delete.requires_match());
        assert_eq!(delete.table(), "T");
    }
}
