//! Definitions of errors that the checkpoint reader can encounter

/// A [`std::result::Result`] that has the checkpoint [`Error`] as the error variant
pub type DeltaResult<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced while reading a checkpoint file.
///
/// Construction-time problems (a requested action kind that cannot be resolved, an empty kind
/// set) use [`Error::InvalidConfiguration`]. Anything wrong with the shape of the checkpoint
/// rows themselves is a [`Error::Schema`] or [`Error::UnexpectedColumnType`], and both are fatal
/// to the iteration that raised them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An error performing operations on arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// An error performing operations on parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// An error reading or closing the underlying file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// An error interacting with json (e.g. the table schema string)
    #[error("Json serde error: {0}")]
    JsonSerde(#[from] serde_json::Error),

    /// A catch-all error with a message
    #[error("Generic delta checkpoint error: {0}")]
    Generic(String),

    /// The reader was constructed with arguments that cannot work together
    #[error("Invalid reader configuration: {0}")]
    InvalidConfiguration(String),

    /// The checkpoint row shape does not match what the Delta protocol requires
    #[error("Schema error: {0}")]
    Schema(String),

    /// A field's value cannot be read as its declared type
    #[error("Unexpected column type: {0}")]
    UnexpectedColumnType(String),

    /// A required field is physically missing or null
    #[error("Data missing: {0}")]
    MissingData(String),

    /// An internal invariant was violated; this indicates a bug in the reader
    #[error("This indicates a bug in the checkpoint reader: {0}")]
    InternalError(String),
}

impl Error {
    pub fn generic(msg: impl ToString) -> Self {
        Self::Generic(msg.to_string())
    }

    pub fn invalid_configuration(msg: impl ToString) -> Self {
        Self::InvalidConfiguration(msg.to_string())
    }

    pub fn schema(msg: impl ToString) -> Self {
        Self::Schema(msg.to_string())
    }

    pub fn unexpected_column_type(msg: impl ToString) -> Self {
        Self::UnexpectedColumnType(msg.to_string())
    }

    pub fn missing_data(msg: impl ToString) -> Self {
        Self::MissingData(msg.to_string())
    }

    pub fn internal_error(msg: impl ToString) -> Self {
        Self::InternalError(msg.to_string())
    }
}
