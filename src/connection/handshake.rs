//! Startup and authentication

use super::config::ConnectionConfig;
use super::inbound::BoxedRead;
use super::properties::ConnectionProperties;
use super::outbound::BoxedWrite;
use super::session::Session;
use super::state::ConnectionState;
use crate::auth::md5_password;
use crate::metrics::{counters, histograms, labels};
use crate::protocol::constants::PROTOCOL_VERSION;
use crate::protocol::{
    decode_backend, encode_message, AuthenticationRequest, BackendMessage, FrameReader,
    FrontendMessage,
};
use crate::sink::{EventSink, SharedSink};
use crate::{Error, Result};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

/// Run startup and authentication over `stream`, producing a ready session
///
/// Every packet sent and received is reported to `sink`, which then stays
/// attached to the session.
pub async fn handshake<S>(
    stream: S,
    config: &ConnectionConfig,
    sink: Option<Box<dyn EventSink>>,
) -> Result<Session>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    config.validate()?;

    let (read, write) = tokio::io::split(stream);
    let reader: BoxedRead = Box::new(read);
    let mut startup = Startup {
        config,
        sink: SharedSink::new(sink),
        frames: FrameReader::new(reader),
        writer: Box::new(write),
        properties: ConnectionProperties::default(),
        state: ConnectionState::Initial,
        mechanism: labels::MECHANISM_NONE,
        auth_start: Instant::now(),
    };

    let result = startup
        .run()
        .instrument(tracing::info_span!(
            "startup",
            user = %config.user,
            database = %config.database
        ))
        .await;

    if let Err(err) = result {
        // Failed is reachable from every pre-ready state
        let _ = startup.state.transition(ConnectionState::Failed);
        tracing::debug!(state = %startup.state, "handshake failed: {}", err);
        return Err(err);
    }

    Ok(Session::start(
        startup.frames,
        startup.writer,
        startup.properties,
        startup.sink,
        config.receive_queue_capacity,
    ))
}

struct Startup<'c> {
    config: &'c ConnectionConfig,
    sink: SharedSink,
    frames: FrameReader<BoxedRead>,
    writer: BoxedWrite,
    properties: ConnectionProperties,
    state: ConnectionState,
    mechanism: &'static str,
    auth_start: Instant,
}

impl Startup<'_> {
    async fn run(&mut self) -> Result<()> {
        let startup = FrontendMessage::Startup {
            version: PROTOCOL_VERSION,
            params: self.config.startup_parameters(),
        };
        self.write(&startup).await?;
        self.sink.sent(&startup);
        self.state.transition(ConnectionState::StartupSent)?;

        loop {
            let (tag, msg) = self
                .frames
                .read_packet(false, |tag, payload| Ok((tag, decode_backend(tag, payload)?)))
                .await
                .map_err(|err| {
                    if err.is_authentication() {
                        counters::auth_failed(self.mechanism, labels::REASON_PROTOCOL);
                    }
                    err
                })?;
            counters::packet_received(tag.name());
            self.sink.received(&msg);

            match msg {
                BackendMessage::Authentication(request) => self.authenticate(request).await?,
                BackendMessage::BackendKeyData { .. } => {
                    self.properties.observe(&msg);
                }
                BackendMessage::ParameterStatus { ref name, ref value } => {
                    tracing::debug!("parameter status: {} = {}", name, value);
                    self.properties.observe(&msg);
                }
                BackendMessage::NoticeResponse(ref notice) => {
                    tracing::debug!(severity = %notice.severity, "startup notice: {}", notice.message);
                }
                BackendMessage::ReadyForQuery(status) => {
                    if self.state != ConnectionState::Authenticated {
                        return Err(Error::Protocol(format!(
                            "READY_FOR_QUERY received before authentication completed (state: {})",
                            self.state
                        )));
                    }
                    self.state.transition(ConnectionState::Ready)?;
                    self.properties.observe(&msg);
                    tracing::info!(transaction_status = %status, "startup complete");
                    return Ok(());
                }
                BackendMessage::ErrorResponse(err) => {
                    if self.state != ConnectionState::Authenticated {
                        counters::auth_failed(self.mechanism, labels::REASON_SERVER_ERROR);
                    }
                    return Err(Error::Server(err));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected message during handshake: {:?}",
                        other
                    )));
                }
            }
        }
    }

    async fn authenticate(&mut self, request: AuthenticationRequest) -> Result<()> {
        match request {
            AuthenticationRequest::Ok => {
                self.state.transition(ConnectionState::Authenticated)?;
                tracing::debug!(mechanism = self.mechanism, "authentication successful");
                counters::auth_successful(self.mechanism);
                histograms::auth_duration(
                    self.mechanism,
                    self.auth_start.elapsed().as_millis() as u64,
                );
                // Keep reading until ReadyForQuery
            }
            AuthenticationRequest::CleartextPassword => {
                self.begin_auth(labels::MECHANISM_CLEARTEXT)?;
                let password = self.password()?.to_string();
                self.write(&FrontendMessage::Password(password)).await?;
                self.sink.with(|sink| sink.sent_password());
                self.state.transition(ConnectionState::Authenticating)?;
            }
            AuthenticationRequest::Md5Password { salt } => {
                self.begin_auth(labels::MECHANISM_MD5)?;
                let hashed = md5_password(&self.config.user, self.password()?, &salt);
                self.write(&FrontendMessage::Password(hashed)).await?;
                self.sink.with(|sink| sink.sent_md5_password());
                self.state.transition(ConnectionState::Authenticating)?;
            }
            AuthenticationRequest::Unsupported(code) => {
                tracing::debug!(code, "server requested an unsupported authentication method");
                counters::auth_failed(self.mechanism, labels::REASON_UNSUPPORTED);
                return Err(Error::UnsupportedAuthentication(code));
            }
        }
        Ok(())
    }

    fn begin_auth(&mut self, mechanism: &'static str) -> Result<()> {
        if !self.state.awaits_challenge() {
            return Err(Error::Protocol(format!(
                "unexpected authentication request in state {}",
                self.state
            )));
        }
        tracing::debug!(mechanism, "password requested");
        self.mechanism = mechanism;
        self.auth_start = Instant::now();
        counters::auth_attempted(mechanism);
        Ok(())
    }

    fn password(&self) -> Result<&str> {
        self.config.password.as_deref().ok_or_else(|| {
            counters::auth_failed(self.mechanism, labels::REASON_MISSING_PASSWORD);
            Error::Authentication("password required but none configured".into())
        })
    }

    async fn write(&mut self, msg: &FrontendMessage) -> Result<()> {
        let buf = encode_message(msg)?;
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        counters::packet_sent(msg.tag().name());
        Ok(())
    }
}
