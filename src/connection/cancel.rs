//! Out-of-band query cancellation

use super::transport::Transport;
use crate::protocol::{encode_message, FrontendMessage};
use crate::Result;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Backend key data needed to cancel a session's running query
///
/// A cancel request travels on its own connection; the server closes that
/// connection without replying, and whether anything was cancelled is only
/// visible on the original session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelToken {
    /// Backend process id
    pub process_id: i32,
    /// Backend secret key
    pub secret: [u8; 4],
}

impl CancelToken {
    /// Write the `CancelRequest` packet to `stream` and shut it down
    pub async fn cancel_with<S>(&self, mut stream: S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let buf = encode_message(&FrontendMessage::CancelRequest {
            process_id: self.process_id,
            secret: self.secret,
        })?;
        stream.write_all(&buf).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        crate::metrics::counters::packet_sent("CANCEL_REQUEST");
        tracing::debug!(process_id = self.process_id, "cancel request sent");
        Ok(())
    }

    /// Cancel over a fresh TCP connection
    pub async fn cancel_tcp(&self, host: &str, port: u16) -> Result<()> {
        let transport = Transport::connect_tcp(host, port).await?;
        self.cancel_with(transport).await
    }

    /// Cancel over a fresh Unix socket connection
    pub async fn cancel_unix(&self, path: &Path) -> Result<()> {
        let transport = Transport::connect_unix(path).await?;
        self.cancel_with(transport).await
    }
}
