//! Uniform success/failure wrapper returned across the presentation boundary.
//!
//! Every public operation on [`crate::handler::DataHandler`] and
//! [`crate::repository::PagedRepository`] answers with a [`ResultEnvelope`]
//! instead of a `Result`, so the GUI layer never has to handle a Rust error
//! type. The serialized shape is fixed:
//!
//! ```text
//! { "ok": bool, "mensagem": string, "status": 200|400|401|404|500, "dados": any|null }
//! ```
//!
//! Consumers branch on `ok` before touching `dados`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Status codes carried by the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    BadRequest,
    Unauthorized,
    NotFound,
    InternalError,
}

impl Status {
    /// Numeric code written to the wire.
    pub const fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::InternalError => 500,
        }
    }

    /// Reverse of [`Status::code`]; unknown codes map to `None`.
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            200 => Some(Status::Ok),
            400 => Some(Status::BadRequest),
            401 => Some(Status::Unauthorized),
            404 => Some(Status::NotFound),
            500 => Some(Status::InternalError),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result envelope used by every boundary-crossing call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T> {
    pub ok: bool,
    #[serde(rename = "mensagem")]
    pub message: String,
    pub status: u16,
    #[serde(rename = "dados")]
    pub data: Option<T>,
}

impl<T> ResultEnvelope<T> {
    /// Successful envelope (status 200) carrying `data`.
    pub fn success(data: T, message: impl Into<String>) -> Self {
        ResultEnvelope {
            ok: true,
            message: message.into(),
            status: Status::Ok.code(),
            data: Some(data),
        }
    }

    /// Successful envelope with no payload.
    pub fn empty(message: impl Into<String>) -> Self {
        ResultEnvelope {
            ok: true,
            message: message.into(),
            status: Status::Ok.code(),
            data: None,
        }
    }

    /// Failed envelope with an explicit status.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        ResultEnvelope {
            ok: false,
            message: message.into(),
            status: status.code(),
            data: None,
        }
    }

    /// Convert an error into a failed envelope.
    ///
    /// Client errors are logged at `warn`, server errors at `error` with the
    /// full detail; the envelope only carries [`Error::user_message`].
    pub fn from_error(err: &Error) -> Self {
        let status = err.status();
        if status == Status::InternalError {
            error!("✗ data access failed: {}", err);
        } else {
            warn!("✗ request rejected ({}): {}", status, err);
        }
        Self::failure(status, err.user_message())
    }

    /// Wrap an operation result; `message` is used on success.
    pub fn from_result(result: Result<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::success(data, message),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Typed view of `status`, `None` if the code is not one of the five known
    /// values.
    pub fn status(&self) -> Option<Status> {
        Status::from_code(self.status)
    }

    /// Payload of a successful envelope.
    pub fn into_data(self) -> Option<T> {
        if self.ok {
            self.data
        } else {
            None
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ResultEnvelope<U> {
        ResultEnvelope {
            ok: self.ok,
            message: self.message,
            status: self.status,
            data: self.data.map(f),
        }
    }
}

impl ResultEnvelope<()> {
    /// Wrap a unit result; success carries `dados: null`.
    pub fn from_unit(result: Result<()>, message: impl Into<String>) -> Self {
        match result {
            Ok(()) => Self::empty(message),
            Err(err) => Self::from_error(&err),
        }
    }
}
