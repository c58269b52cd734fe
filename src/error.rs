//! Error types for the data-access layer.

use std::fmt;

use crate::envelope::Status;

/// Result type for data-access operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the data-access layer.
///
/// Every fallible operation returns `Result<T>`. Variants fall into three
/// groups:
/// - local input validation (`InvalidColumn`, `InvalidTable`, `ValidationError`,
///   `Constraint`), reported with status 400 and never sent to the store as SQL
/// - lookups that found nothing (`NotFound`), status 404
/// - store and internal failures, status 500
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A sort or filter identifier is not on the entity's allow-list.
    ///
    /// Raised by `ColumnAllowList::resolve`. Page requests never surface it:
    /// unknown filter and sort keys are dropped during normalization.
    InvalidColumn(String),

    /// A table name failed the identifier pattern check.
    InvalidTable(String),

    /// Malformed request or value object.
    ///
    /// Common causes:
    /// - `page_size` above the configured maximum
    /// - non-finite numeric filter value
    /// - empty product or recipe name, negative cost, non-positive quantity
    ValidationError(String),

    /// The addressed row does not exist.
    NotFound(String),

    /// The store rejected a write because of a schema constraint
    /// (unique name, foreign key still referenced, check constraint).
    Constraint(String),

    /// The store could not be opened or read.
    ///
    /// **Recovery:** the caller may retry once the database file is reachable.
    StoreUnavailable(String),

    /// The store stayed busy or locked past the configured busy timeout.
    ///
    /// **Recovery:** the caller may retry.
    StoreTimeout(String),

    /// Any other failure reported by the store client.
    StoreError(String),

    /// A stored value could not be decoded into the expected type.
    SerializationError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Status code reported in the result envelope for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidColumn(_)
            | Error::InvalidTable(_)
            | Error::ValidationError(_)
            | Error::Constraint(_) => Status::BadRequest,
            Error::NotFound(_) => Status::NotFound,
            Error::StoreUnavailable(_)
            | Error::StoreTimeout(_)
            | Error::StoreError(_)
            | Error::SerializationError(_)
            | Error::Other(_) => Status::InternalError,
        }
    }

    /// Whether a caller-driven retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::StoreTimeout(_))
    }

    /// Message safe to show to the user.
    ///
    /// Client errors carry their own description. Server-side failures are
    /// reduced to a generic sentence so SQL text and driver details stay in the
    /// logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidColumn(name) => format!("Unknown column: {}", name),
            Error::InvalidTable(name) => format!("Unknown table: {}", name),
            Error::ValidationError(msg) | Error::NotFound(msg) | Error::Constraint(msg) => {
                msg.clone()
            }
            Error::StoreUnavailable(_) => {
                "The database is unavailable. Please try again.".to_string()
            }
            Error::StoreTimeout(_) => "The database is busy. Please try again.".to_string(),
            Error::StoreError(_) | Error::SerializationError(_) | Error::Other(_) => {
                "Unexpected error while accessing the database.".to_string()
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidColumn(name) => write!(f, "Invalid column: {}", name),
            Error::InvalidTable(name) => write!(f, "Invalid table: {}", name),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Constraint(msg) => write!(f, "Constraint violation: {}", msg),
            Error::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Error::StoreTimeout(msg) => write!(f, "Store timeout: {}", msg),
            Error::StoreError(msg) => write!(f, "Store error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                Error::StoreTimeout(e.to_string())
            }
            Some(ErrorCode::CannotOpen)
            | Some(ErrorCode::NotADatabase)
            | Some(ErrorCode::SystemIoFailure)
            | Some(ErrorCode::PermissionDenied) => Error::StoreUnavailable(e.to_string()),
            Some(ErrorCode::ConstraintViolation) => Error::Constraint(e.to_string()),
            _ => Error::StoreError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<bigdecimal::ParseBigDecimalError> for Error {
    fn from(e: bigdecimal::ParseBigDecimalError) -> Self {
        Error::SerializationError(format!("invalid decimal: {}", e))
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
