//! Postgres protocol constants

/// Protocol version 3.0 (major << 16 | minor)
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// CancelRequest code (80877102 = 1234 << 16 | 5678)
pub const CANCEL_REQUEST_CODE: i32 = 0x04D2_162E;

/// Largest message body accepted from the server (1 GB), matching PostgreSQL's
/// `PQ_LARGE_MESSAGE_LIMIT`.
pub const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;

/// Frontend (client -> server) message tags
pub mod frontend {
    /// Bind
    pub const BIND: u8 = b'B';
    /// Close portal/statement
    pub const CLOSE: u8 = b'C';
    /// Describe portal/statement
    pub const DESCRIBE: u8 = b'D';
    /// Execute portal
    pub const EXECUTE: u8 = b'E';
    /// Flush
    pub const FLUSH: u8 = b'H';
    /// Parse
    pub const PARSE: u8 = b'P';
    /// Password message
    pub const PASSWORD: u8 = b'p';
    /// Simple query
    pub const QUERY: u8 = b'Q';
    /// Sync
    pub const SYNC: u8 = b'S';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Backend (server -> client) message tags
pub mod backend {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';
    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// Bind complete
    pub const BIND_COMPLETE: u8 = b'2';
    /// Close complete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// Command complete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// Data row
    pub const DATA_ROW: u8 = b'D';
    /// Empty query response
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';
    /// No data
    pub const NO_DATA: u8 = b'n';
    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// Asynchronous notification
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// Parameter description
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';
    /// Parse complete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// Portal suspended
    pub const PORTAL_SUSPENDED: u8 = b's';
    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// Row description
    pub const ROW_DESCRIPTION: u8 = b'T';
}

/// Authentication types
pub mod auth {
    /// Authentication successful
    pub const OK: i32 = 0;

    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: i32 = 3;

    /// MD5 password required
    pub const MD5_PASSWORD: i32 = 5;
}

/// Transaction status
pub mod tx_status {
    /// Idle (not in transaction)
    pub const IDLE: u8 = b'I';

    /// In transaction block
    pub const IN_TRANSACTION: u8 = b'T';

    /// Failed transaction (queries will be rejected until END)
    pub const FAILED: u8 = b'E';
}
