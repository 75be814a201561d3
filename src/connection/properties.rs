//! Server-reported connection properties

use super::cancel::CancelToken;
use crate::protocol::{BackendMessage, TransactionStatus};
use std::collections::HashMap;

/// What the server told us about this connection
///
/// Filled during the handshake and kept current by the session's reader
/// task; callers only ever see snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionProperties {
    /// `ParameterStatus` values (`server_version`, `TimeZone`, ...)
    pub parameters: HashMap<String, String>,
    /// Backend key data, needed for cancellation
    pub backend_key: Option<CancelToken>,
    /// Status from the most recent `ReadyForQuery`
    pub transaction_status: Option<TransactionStatus>,
}

impl ConnectionProperties {
    /// A server parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Backend process id
    pub fn process_id(&self) -> Option<i32> {
        self.backend_key.map(|key| key.process_id)
    }

    /// `server_version` as reported at startup
    pub fn server_version(&self) -> Option<&str> {
        self.parameter("server_version")
    }

    /// Fold one backend message in; everything else is ignored
    pub fn observe(&mut self, msg: &BackendMessage) {
        match msg {
            BackendMessage::ParameterStatus { name, value } => {
                self.parameters.insert(name.clone(), value.clone());
            }
            BackendMessage::BackendKeyData { process_id, secret } => {
                self.backend_key = Some(CancelToken {
                    process_id: *process_id,
                    secret: *secret,
                });
            }
            BackendMessage::ReadyForQuery(status) => {
                self.transaction_status = Some(*status);
            }
            _ => {}
        }
    }
}
