//! Protocol message types

use super::constants::{backend, frontend, tx_status};
use crate::error::ServerError;
use bytes::Bytes;
use std::fmt;

/// Frontend message kinds and their one-byte wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontendTag {
    /// Startup message (untagged)
    Startup,
    /// Cancel request (untagged)
    CancelRequest,
    /// Password message
    Password,
    /// Simple query
    Query,
    /// Parse
    Parse,
    /// Bind
    Bind,
    /// Describe
    Describe,
    /// Execute
    Execute,
    /// Close
    Close,
    /// Flush
    Flush,
    /// Sync
    Sync,
    /// Terminate
    Terminate,
}

impl FrontendTag {
    /// Tag byte, or `None` for the untagged startup-phase packets
    pub const fn code(self) -> Option<u8> {
        match self {
            Self::Startup | Self::CancelRequest => None,
            Self::Password => Some(frontend::PASSWORD),
            Self::Query => Some(frontend::QUERY),
            Self::Parse => Some(frontend::PARSE),
            Self::Bind => Some(frontend::BIND),
            Self::Describe => Some(frontend::DESCRIBE),
            Self::Execute => Some(frontend::EXECUTE),
            Self::Close => Some(frontend::CLOSE),
            Self::Flush => Some(frontend::FLUSH),
            Self::Sync => Some(frontend::SYNC),
            Self::Terminate => Some(frontend::TERMINATE),
        }
    }

    /// Upper-case protocol name, used as a metrics label
    pub const fn name(self) -> &'static str {
        match self {
            Self::Startup => "STARTUP_MESSAGE",
            Self::CancelRequest => "CANCEL_REQUEST",
            Self::Password => "PASSWORD_MESSAGE",
            Self::Query => "QUERY",
            Self::Parse => "PARSE",
            Self::Bind => "BIND",
            Self::Describe => "DESCRIBE",
            Self::Execute => "EXECUTE",
            Self::Close => "CLOSE",
            Self::Flush => "FLUSH",
            Self::Sync => "SYNC",
            Self::Terminate => "TERMINATE",
        }
    }
}

/// Backend message kinds and their one-byte wire codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendTag {
    /// Packet read in startup context (no tag byte on the wire)
    Untagged,
    /// Authentication request
    Authentication,
    /// Backend key data
    BackendKeyData,
    /// Bind complete
    BindComplete,
    /// Close complete
    CloseComplete,
    /// Command complete
    CommandComplete,
    /// Data row
    DataRow,
    /// Empty query response
    EmptyQueryResponse,
    /// Error response
    ErrorResponse,
    /// No data
    NoData,
    /// Notice response
    NoticeResponse,
    /// Asynchronous notification
    NotificationResponse,
    /// Parameter description
    ParameterDescription,
    /// Parameter status
    ParameterStatus,
    /// Parse complete
    ParseComplete,
    /// Portal suspended
    PortalSuspended,
    /// Ready for query
    ReadyForQuery,
    /// Row description
    RowDescription,
    /// Any tag this client does not know
    Unknown(u8),
}

impl BackendTag {
    /// Map a wire byte to its message kind
    pub const fn from_code(code: u8) -> Self {
        match code {
            backend::AUTHENTICATION => Self::Authentication,
            backend::BACKEND_KEY_DATA => Self::BackendKeyData,
            backend::BIND_COMPLETE => Self::BindComplete,
            backend::CLOSE_COMPLETE => Self::CloseComplete,
            backend::COMMAND_COMPLETE => Self::CommandComplete,
            backend::DATA_ROW => Self::DataRow,
            backend::EMPTY_QUERY_RESPONSE => Self::EmptyQueryResponse,
            backend::ERROR_RESPONSE => Self::ErrorResponse,
            backend::NO_DATA => Self::NoData,
            backend::NOTICE_RESPONSE => Self::NoticeResponse,
            backend::NOTIFICATION_RESPONSE => Self::NotificationResponse,
            backend::PARAMETER_DESCRIPTION => Self::ParameterDescription,
            backend::PARAMETER_STATUS => Self::ParameterStatus,
            backend::PARSE_COMPLETE => Self::ParseComplete,
            backend::PORTAL_SUSPENDED => Self::PortalSuspended,
            backend::READY_FOR_QUERY => Self::ReadyForQuery,
            backend::ROW_DESCRIPTION => Self::RowDescription,
            other => Self::Unknown(other),
        }
    }

    /// Upper-case protocol name
    pub fn name(self) -> String {
        let name = match self {
            Self::Untagged => "UNTAGGED",
            Self::Authentication => "AUTHENTICATION_REQUEST",
            Self::BackendKeyData => "BACKEND_KEY_DATA",
            Self::BindComplete => "BIND_COMPLETE",
            Self::CloseComplete => "CLOSE_COMPLETE",
            Self::CommandComplete => "COMMAND_COMPLETE",
            Self::DataRow => "DATA_ROW",
            Self::EmptyQueryResponse => "EMPTY_QUERY_RESPONSE",
            Self::ErrorResponse => "ERROR_RESPONSE",
            Self::NoData => "NO_DATA",
            Self::NoticeResponse => "NOTICE_RESPONSE",
            Self::NotificationResponse => "NOTIFICATION_RESPONSE",
            Self::ParameterDescription => "PARAMETER_DESCRIPTION",
            Self::ParameterStatus => "PARAMETER_STATUS",
            Self::ParseComplete => "PARSE_COMPLETE",
            Self::PortalSuspended => "PORTAL_SUSPENDED",
            Self::ReadyForQuery => "READY_FOR_QUERY",
            Self::RowDescription => "ROW_DESCRIPTION",
            Self::Unknown(code) => return format!("UNKNOWN({})", code as char),
        };
        name.to_string()
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Target of a Describe or Close message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    /// Bound portal
    Portal,
    /// Prepared statement
    Statement,
}

impl DescribeTarget {
    /// Wire selector byte
    pub const fn code(self) -> u8 {
        match self {
            Self::Portal => b'P',
            Self::Statement => b'S',
        }
    }
}

impl fmt::Display for DescribeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Portal => f.write_str("PORTAL"),
            Self::Statement => f.write_str("STATEMENT"),
        }
    }
}

/// Parameter / column format code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Text (0)
    #[default]
    Text,
    /// Binary (1)
    Binary,
}

impl Format {
    /// Wire format code
    pub const fn code(self) -> i16 {
        match self {
            Self::Text => 0,
            Self::Binary => 1,
        }
    }

    /// Interpret a wire format code; anything but 1 is text
    pub const fn from_code(code: i16) -> Self {
        match code {
            1 => Self::Binary,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// Transaction status reported by `ReadyForQuery`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Not in a transaction block
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
    /// Status byte not defined by the protocol
    Unknown(u8),
}

impl TransactionStatus {
    /// Decode the status byte; unknown bytes are kept, not rejected
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            tx_status::IDLE => Self::Idle,
            tx_status::IN_TRANSACTION => Self::InTransaction,
            tx_status::FAILED => Self::Failed,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("IDLE"),
            Self::InTransaction => f.write_str("TRANSACTION"),
            Self::Failed => f.write_str("ERROR"),
            Self::Unknown(byte) => write!(f, "UNKNOWN({})", *byte as char),
        }
    }
}

/// Frontend message (client → server)
#[derive(Debug, Clone)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters, in send order
        params: Vec<(String, String)>,
    },

    /// Cancel an in-flight query of another session
    CancelRequest {
        /// Backend process id
        process_id: i32,
        /// Backend secret key
        secret: [u8; 4],
    },

    /// Password message (cleartext or MD5 digest)
    Password(String),

    /// Simple query
    Query(String),

    /// Parse a statement
    Parse {
        /// Statement name ("" = unnamed)
        name: String,
        /// SQL text
        query: String,
        /// Parameter type oids (0 = let the server infer)
        param_types: Vec<u32>,
    },

    /// Bind parameters to a statement, creating a portal
    Bind {
        /// Portal name ("" = unnamed)
        portal: String,
        /// Statement name
        statement: String,
        /// Parameter formats (empty = all text)
        param_formats: Vec<Format>,
        /// Parameter values, `None` = SQL NULL
        values: Vec<Option<Bytes>>,
        /// Result column formats (empty = all text)
        result_formats: Vec<Format>,
    },

    /// Describe a portal or statement
    Describe {
        /// What to describe
        target: DescribeTarget,
        /// Its name
        name: String,
    },

    /// Execute a portal
    Execute {
        /// Portal name
        portal: String,
        /// Row limit (0 = no limit)
        max_rows: i32,
    },

    /// Close a portal or statement
    Close {
        /// What to close
        target: DescribeTarget,
        /// Its name
        name: String,
    },

    /// Flush
    Flush,

    /// Sync
    Sync,

    /// Terminate message
    Terminate,
}

impl FrontendMessage {
    /// The catalog entry for this message
    pub fn tag(&self) -> FrontendTag {
        match self {
            Self::Startup { .. } => FrontendTag::Startup,
            Self::CancelRequest { .. } => FrontendTag::CancelRequest,
            Self::Password(_) => FrontendTag::Password,
            Self::Query(_) => FrontendTag::Query,
            Self::Parse { .. } => FrontendTag::Parse,
            Self::Bind { .. } => FrontendTag::Bind,
            Self::Describe { .. } => FrontendTag::Describe,
            Self::Execute { .. } => FrontendTag::Execute,
            Self::Close { .. } => FrontendTag::Close,
            Self::Flush => FrontendTag::Flush,
            Self::Sync => FrontendTag::Sync,
            Self::Terminate => FrontendTag::Terminate,
        }
    }
}

/// Backend message (server → client)
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    /// Authentication request
    Authentication(AuthenticationRequest),

    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret: [u8; 4],
    },

    /// Bind complete
    BindComplete,

    /// Close complete
    CloseComplete,

    /// Command complete
    CommandComplete(String),

    /// Data row; `None` cells are SQL NULL
    DataRow(Vec<Option<Bytes>>),

    /// Empty query response
    EmptyQueryResponse,

    /// Error response
    ErrorResponse(ServerError),

    /// No data
    NoData,

    /// Notice response
    NoticeResponse(ServerError),

    /// Parameter description (type oids)
    ParameterDescription(Vec<u32>),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Parse complete
    ParseComplete,

    /// Portal suspended
    PortalSuspended,

    /// Ready for query
    ReadyForQuery(TransactionStatus),

    /// Row description
    RowDescription(Vec<FieldDescription>),

    /// A message whose payload is not interpreted
    Other(BackendTag),
}

impl BackendMessage {
    /// Whether this message ends a request cycle
    pub fn is_ready_for_query(&self) -> bool {
        matches!(self, Self::ReadyForQuery(_))
    }
}

/// Authentication message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationRequest {
    /// Authentication OK
    Ok,

    /// Cleartext password required
    CleartextPassword,

    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },

    /// Any method this client does not implement
    Unsupported(i32),
}

/// Field description (column metadata)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: u32,
    /// Column attribute number (0 if not a table column)
    pub column_attr: i16,
    /// Data type OID
    pub type_oid: u32,
    /// Data type size (negative for variable-width types)
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format code (0 = text, 1 = binary)
    pub format_code: i16,
}

impl FieldDescription {
    /// Decoded format code
    pub fn format(&self) -> Format {
        Format::from_code(self.format_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_codes() {
        assert_eq!(FrontendTag::Startup.code(), None);
        assert_eq!(FrontendTag::CancelRequest.code(), None);
        assert_eq!(FrontendTag::Query.code(), Some(b'Q'));
        assert_eq!(FrontendTag::Password.code(), Some(b'p'));
        assert_eq!(FrontendTag::Terminate.code(), Some(b'X'));
    }

    #[test]
    fn test_backend_tag_lookup() {
        assert_eq!(BackendTag::from_code(b'Z'), BackendTag::ReadyForQuery);
        assert_eq!(BackendTag::from_code(b'1'), BackendTag::ParseComplete);
        assert_eq!(BackendTag::from_code(b'!'), BackendTag::Unknown(b'!'));
        assert_eq!(BackendTag::ParseComplete.to_string(), "PARSE_COMPLETE");
        assert_eq!(BackendTag::Unknown(b'!').to_string(), "UNKNOWN(!)");
    }

    #[test]
    fn test_transaction_status_display() {
        assert_eq!(TransactionStatus::from_byte(b'I').to_string(), "IDLE");
        assert_eq!(TransactionStatus::from_byte(b'T').to_string(), "TRANSACTION");
        assert_eq!(TransactionStatus::from_byte(b'E').to_string(), "ERROR");
        assert_eq!(TransactionStatus::from_byte(b'X').to_string(), "UNKNOWN(X)");
    }

    #[test]
    fn test_format_codes() {
        assert_eq!(Format::from_code(1), Format::Binary);
        assert_eq!(Format::from_code(0), Format::Text);
        assert_eq!(Format::Binary.code(), 1);
    }
}
