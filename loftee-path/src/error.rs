use thiserror::Error;

// ----------------------------------------------------------------------------
// Path Error
// ----------------------------------------------------------------------------

/// Failures raised while constructing, resolving, or listing a [`PathDx`](crate::PathDx).
///
/// These are wrapped in a [`color_eyre::Report`] by the path methods. Callers
/// that need to branch on a specific failure use [`color_eyre::Report::downcast_ref`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PathError {
    /// A database name and a database id were both supplied.
    #[error("Both database ({database:?}) and database_id ({database_id:?}) are specified.")]
    InvalidArgument { database: String, database_id: String },

    /// No catalog entry matched the database name or id.
    #[error(
        "Database doesn't exist: {0:?}. Create with: SC.sql(\"CREATE DATABASE IF NOT EXISTS {0} LOCATION 'dnax://'\")"
    )]
    DatabaseNotFound(String),

    /// The catalog answered with more than one page of databases.
    #[error("Database catalog response is paginated (next = {0}), refusing to search a partial catalog.")]
    PaginatedCatalog(String),

    /// A remote listing returned no entries at all.
    #[error("Directory is empty OR path does not exist: {0}")]
    EmptyOrMissing(String),

    /// The listed path is a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A listed entry sits more than one segment beneath the queried folder.
    #[error("Unsupported nested path {entry:?} in folder {folder:?}")]
    UnsupportedNestedPath { folder: String, entry: String },

    /// A listed entry does not sit beneath the queried folder.
    #[error("Listed entry {entry:?} is outside of folder {folder:?}")]
    ForeignEntry { folder: String, entry: String },
}

impl PathError {
    /// Returns true for the ambiguous "empty or missing" listing outcome.
    ///
    /// ```rust
    /// use loftee_path::PathError;
    /// assert!(PathError::EmptyOrMissing("dnax://database-x/a".into()).is_empty_listing());
    /// assert!(!PathError::NotADirectory("dnax://database-x/a".into()).is_empty_listing());
    /// ```
    pub fn is_empty_listing(&self) -> bool {
        matches!(self, PathError::EmptyOrMissing(_))
    }
}

/// Returns true if a [`Report`](color_eyre::Report) wraps [`PathError::EmptyOrMissing`].
pub fn is_empty_listing(report: &color_eyre::Report) -> bool {
    report.downcast_ref::<PathError>().map(PathError::is_empty_listing).unwrap_or(false)
}
