//! Error types

use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the codec, the handshake and the session
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed frame, leftover payload bytes, or a message that is not valid at this point
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication could not be performed with the given credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server asked for an authentication method this client does not implement
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuthentication(i32),

    /// `ErrorResponse` reported by the server
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The stream reached EOF or the session was already closed
    #[error("connection closed")]
    ConnectionClosed,

    /// A queued receive was dropped before it could run
    #[error("receive request cancelled before completion")]
    ReceiveCancelled,

    /// Illegal state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Framing or message-sequence violation; always fatal to the connection
    pub fn is_framing(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Failure while negotiating credentials
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_) | Error::UnsupportedAuthentication(_)
        )
    }

    /// The server-reported error, if this is one
    pub fn as_server(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            _ => None,
        }
    }
}

/// Structured `ErrorResponse` / `NoticeResponse` record
///
/// `message` and `severity` are always present on the wire; every other
/// field is keyed by its single-character protocol tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{severity}: {message}")]
pub struct ServerError {
    /// Primary human-readable message (`M`)
    pub message: String,
    /// Severity, e.g. `ERROR`, `FATAL`, `NOTICE` (`S`)
    pub severity: String,
    fields: BTreeMap<char, String>,
}

impl ServerError {
    /// Build an error record from its message, severity and tagged fields
    pub fn new(
        message: impl Into<String>,
        severity: impl Into<String>,
        fields: BTreeMap<char, String>,
    ) -> Self {
        Self {
            message: message.into(),
            severity: severity.into(),
            fields,
        }
    }

    /// Raw access to any tagged field other than `M` and `S`
    pub fn field(&self, tag: char) -> Option<&str> {
        self.fields.get(&tag).map(String::as_str)
    }

    /// All tagged fields other than `M` and `S`
    pub fn fields(&self) -> &BTreeMap<char, String> {
        &self.fields
    }

    /// SQLSTATE code (`C`)
    pub fn code(&self) -> Option<&str> {
        self.field('C')
    }

    /// Secondary message with more detail (`D`)
    pub fn detail(&self) -> Option<&str> {
        self.field('D')
    }

    /// Suggestion on how to fix the problem (`H`)
    pub fn hint(&self) -> Option<&str> {
        self.field('H')
    }

    /// 1-based character index into the query string (`P`)
    pub fn position(&self) -> Option<&str> {
        self.field('P')
    }

    /// Position inside an internally generated command (`p`)
    pub fn internal_position(&self) -> Option<&str> {
        self.field('p')
    }

    /// Text of the failed internally generated command (`q`)
    pub fn internal_query(&self) -> Option<&str> {
        self.field('q')
    }

    /// Context traceback (`W`)
    pub fn where_(&self) -> Option<&str> {
        self.field('W')
    }

    /// Schema name (`s`)
    pub fn schema(&self) -> Option<&str> {
        self.field('s')
    }

    /// Table name (`t`)
    pub fn table(&self) -> Option<&str> {
        self.field('t')
    }

    /// Column name (`c`)
    pub fn column(&self) -> Option<&str> {
        self.field('c')
    }

    /// Data type name (`d`)
    pub fn data_type(&self) -> Option<&str> {
        self.field('d')
    }

    /// Constraint name (`n`)
    pub fn constraint(&self) -> Option<&str> {
        self.field('n')
    }

    /// Server source file (`F`)
    pub fn file(&self) -> Option<&str> {
        self.field('F')
    }

    /// Server source line (`L`)
    pub fn line(&self) -> Option<&str> {
        self.field('L')
    }

    /// Server source routine (`R`)
    pub fn routine(&self) -> Option<&str> {
        self.field('R')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_error() -> ServerError {
        let mut fields = BTreeMap::new();
        fields.insert('C', "42601".to_string());
        fields.insert('P', "8".to_string());
        ServerError::new("syntax error", "ERROR", fields)
    }

    #[test]
    fn test_server_error_accessors() {
        let err = syntax_error();
        assert_eq!(err.message, "syntax error");
        assert_eq!(err.severity, "ERROR");
        assert_eq!(err.code(), Some("42601"));
        assert_eq!(err.position(), Some("8"));
        assert_eq!(err.hint(), None);
        assert_eq!(err.constraint(), None);
    }

    #[test]
    fn test_server_error_display() {
        assert_eq!(syntax_error().to_string(), "ERROR: syntax error");
    }

    #[test]
    fn test_error_classification() {
        let err = Error::from(syntax_error());
        assert!(!err.is_framing());
        assert_eq!(err.as_server().and_then(ServerError::code), Some("42601"));

        assert!(Error::Protocol("bad length".into()).is_framing());
        assert!(Error::UnsupportedAuthentication(10).is_authentication());
        assert!(Error::Authentication("no password".into()).is_authentication());
    }
}
