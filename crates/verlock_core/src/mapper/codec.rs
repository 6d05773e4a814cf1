//! Record codec trait for mapped types.

use crate::error::CoreResult;
use verlock_store::Row;

/// Column holding the entity's version token ID.
pub const VERSION_ID_COLUMN: &str = "VersionId";

/// Trait for payload types stored by a [`super::DataMapper`].
///
/// Implementors map their own columns only. The mapper binds `Id` and
/// `VersionId` itself and strips them from whatever `to_row` returns.
///
/// # Example
///
/// ```rust
/// use verlock_core::{CoreResult, RecordCodec};
/// use verlock_store::Row;
///
/// #[derive(Clone)]
/// struct Customer {
///     name: String,
/// }
///
/// impl RecordCodec for Customer {
///     const TABLE: &'static str = "Customers";
///
///     fn to_row(&self) -> Row {
///         Row::new().with("Name", self.name.as_str())
///     }
///
///     fn from_row(row: &Row) -> CoreResult<Self> {
///         Ok(Self {
///             name: row.text("Name")?.to_string(),
///         })
///     }
/// }
/// ```
pub trait RecordCodec: Sized + Send + Sync + 'static {
    /// Table holding records of this type.
    const TABLE: &'static str;

    /// Encodes the type-specific columns.
    fn to_row(&self) -> Row;

    /// Decodes the type-specific columns.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or has the wrong type.
    fn from_row(row: &Row) -> CoreResult<Self>;
}
