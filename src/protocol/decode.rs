//! Protocol message decoding

use super::constants::{auth, MAX_MESSAGE_LENGTH};
use super::message::{
    AuthenticationRequest, BackendMessage, BackendTag, FieldDescription, TransactionStatus,
};
use crate::error::ServerError;
use crate::{Error, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt};

/// One framed backend packet: its tag and exactly its declared payload
#[derive(Debug, Clone)]
pub struct Frame {
    /// Message kind
    pub tag: BackendTag,
    /// Payload, without tag and length
    pub payload: Bytes,
}

/// Split one frame off the front of `data`
///
/// Returns `Ok(None)` when more bytes are needed. A declared length below 4
/// or above [`MAX_MESSAGE_LENGTH`] is a framing error; it is rejected before
/// any allocation.
pub fn decode_frame(data: &mut BytesMut, startup: bool) -> Result<Option<Frame>> {
    let header = if startup { 4 } else { 5 };
    if data.len() < header {
        return Ok(None);
    }

    let (tag, len_at) = if startup {
        (BackendTag::Untagged, 0)
    } else {
        (BackendTag::from_code(data[0]), 1)
    };
    let len = i32::from_be_bytes([
        data[len_at],
        data[len_at + 1],
        data[len_at + 2],
        data[len_at + 3],
    ]);

    let payload_size = i64::from(len) - 4;
    if payload_size < 0 {
        return Err(Error::Protocol(format!(
            "payload size should be non-negative: type={}, payloadSize={}",
            tag, payload_size
        )));
    }
    let payload_size = payload_size as usize;
    if payload_size > MAX_MESSAGE_LENGTH {
        return Err(Error::Protocol(format!(
            "message length {} exceeds maximum allowed {}",
            payload_size, MAX_MESSAGE_LENGTH
        )));
    }

    if data.len() < header + payload_size {
        data.reserve(header + payload_size - data.len());
        return Ok(None);
    }

    data.advance(header);
    let payload = data.split_to(payload_size).freeze();
    Ok(Some(Frame { tag, payload }))
}

/// Buffered frame reader over the inbound half of a stream
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8192),
        }
    }

    /// Read until one whole frame is buffered
    pub async fn read_frame(&mut self, startup: bool) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, startup)? {
                return Ok(frame);
            }

            // Need more data
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Read one packet and hand its scoped payload to `body`
    ///
    /// Any bytes `body` leaves unread are a framing error: the decoder for
    /// that message type did not consume its declared payload.
    pub async fn read_packet<T, F>(&mut self, startup: bool, body: F) -> Result<T>
    where
        F: FnOnce(BackendTag, &mut Payload) -> Result<T>,
    {
        let frame = self.read_frame(startup).await?;
        let mut payload = Payload::new(frame.payload);
        let out = body(frame.tag, &mut payload)?;
        payload.finish(frame.tag)?;
        Ok(out)
    }

    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Cursor over exactly one packet's payload
#[derive(Debug, Clone)]
pub struct Payload {
    data: Bytes,
}

impl Payload {
    /// Wrap payload bytes
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.data.len() < n {
            return Err(Error::Protocol(format!(
                "truncated {}: need {} bytes, {} left",
                what,
                n,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// One byte
    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1, "byte")?;
        Ok(self.data.get_u8())
    }

    /// Big-endian 16-bit signed integer
    pub fn read_i16(&mut self) -> Result<i16> {
        self.need(2, "int16")?;
        Ok(self.data.get_i16())
    }

    /// Big-endian 16-bit count
    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2, "count")?;
        Ok(self.data.get_u16())
    }

    /// Big-endian 32-bit signed integer
    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4, "int32")?;
        Ok(self.data.get_i32())
    }

    /// Big-endian 32-bit unsigned integer (oids)
    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4, "oid")?;
        Ok(self.data.get_u32())
    }

    /// Exactly `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n, "bytes")?;
        Ok(self.data.split_to(n))
    }

    /// Exactly `N` raw bytes as an array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N, "bytes")?;
        let mut out = [0u8; N];
        self.data.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Zero-terminated UTF-8 string; the terminator is consumed, not returned
    pub fn read_cstr(&mut self) -> Result<String> {
        let end = self.data.iter().position(|&b| b == 0).ok_or_else(|| {
            Error::Protocol("missing null terminator in string".into())
        })?;
        let raw = self.data.split_to(end);
        self.data.advance(1);
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string: {}", e)))
    }

    /// Length-prefixed blob; length -1 is SQL NULL
    pub fn read_nullable_bytes(&mut self) -> Result<Option<Bytes>> {
        let len = self.read_i32()?;
        match len {
            -1 => Ok(None),
            len if len < 0 => Err(Error::Protocol(format!("invalid value length: {}", len))),
            len => self.read_bytes(len as usize).map(Some),
        }
    }

    /// Drop whatever is left (payload of a message that is not interpreted)
    pub fn skip_rest(&mut self) {
        self.data.clear();
    }

    /// Fail if any payload byte was left undecoded
    pub fn finish(&self, tag: BackendTag) -> Result<()> {
        if !self.data.is_empty() {
            return Err(Error::Protocol(format!(
                "unexpected excessive {} bytes in message {}",
                self.data.len(),
                tag
            )));
        }
        Ok(())
    }
}

/// Decode a backend message body
pub fn decode_backend(tag: BackendTag, payload: &mut Payload) -> Result<BackendMessage> {
    let msg = match tag {
        BackendTag::Authentication => {
            BackendMessage::Authentication(decode_authentication(payload)?)
        }
        BackendTag::BackendKeyData => BackendMessage::BackendKeyData {
            process_id: payload.read_i32()?,
            secret: payload.read_array::<4>()?,
        },
        BackendTag::BindComplete => BackendMessage::BindComplete,
        BackendTag::CloseComplete => BackendMessage::CloseComplete,
        BackendTag::CommandComplete => BackendMessage::CommandComplete(payload.read_cstr()?),
        BackendTag::DataRow => decode_data_row(payload)?,
        BackendTag::EmptyQueryResponse => BackendMessage::EmptyQueryResponse,
        BackendTag::ErrorResponse => BackendMessage::ErrorResponse(decode_error_fields(payload)?),
        BackendTag::NoData => BackendMessage::NoData,
        BackendTag::NoticeResponse => {
            BackendMessage::NoticeResponse(decode_error_fields(payload)?)
        }
        BackendTag::ParameterDescription => {
            let count = payload.read_u16()?;
            let oids = (0..count)
                .map(|_| payload.read_u32())
                .collect::<Result<Vec<_>>>()?;
            BackendMessage::ParameterDescription(oids)
        }
        BackendTag::ParameterStatus => BackendMessage::ParameterStatus {
            name: payload.read_cstr()?,
            value: payload.read_cstr()?,
        },
        BackendTag::ParseComplete => BackendMessage::ParseComplete,
        BackendTag::PortalSuspended => BackendMessage::PortalSuspended,
        BackendTag::ReadyForQuery => decode_ready_for_query(payload)?,
        BackendTag::RowDescription => decode_row_description(payload)?,
        other @ (BackendTag::NotificationResponse
        | BackendTag::Untagged
        | BackendTag::Unknown(_)) => {
            payload.skip_rest();
            BackendMessage::Other(other)
        }
    };
    Ok(msg)
}

fn decode_authentication(payload: &mut Payload) -> Result<AuthenticationRequest> {
    let auth_type = payload.read_i32()?;

    let request = match auth_type {
        auth::OK => AuthenticationRequest::Ok,
        auth::CLEARTEXT_PASSWORD => AuthenticationRequest::CleartextPassword,
        auth::MD5_PASSWORD => {
            if payload.remaining() != 4 {
                return Err(Error::Authentication(format!(
                    "MD5 salt size is invalid: expected 4 bytes, received {}",
                    payload.remaining()
                )));
            }
            AuthenticationRequest::Md5Password {
                salt: payload.read_array::<4>()?,
            }
        }
        other => {
            // SASL and friends carry method-specific data we do not interpret
            payload.skip_rest();
            AuthenticationRequest::Unsupported(other)
        }
    };

    Ok(request)
}

fn decode_data_row(payload: &mut Payload) -> Result<BackendMessage> {
    let count = payload.read_u16()?;
    let mut cells = Vec::with_capacity(count as usize);
    for _ in 0..count {
        cells.push(payload.read_nullable_bytes()?);
    }
    Ok(BackendMessage::DataRow(cells))
}

/// Decode the tagged fields of an `ErrorResponse` or `NoticeResponse`
pub fn decode_error_fields(payload: &mut Payload) -> Result<ServerError> {
    let mut message = None;
    let mut severity = None;
    let mut fields = BTreeMap::new();

    while payload.remaining() > 0 {
        let field_type = payload.read_u8()?;
        if field_type == 0 {
            if payload.remaining() != 0 {
                return Err(Error::Protocol(format!(
                    "there are some remaining bytes in error message: {}",
                    payload.remaining()
                )));
            }
            break;
        }

        let value = payload.read_cstr()?;
        match field_type {
            b'M' => message = Some(value),
            b'S' => severity = Some(value),
            other => {
                fields.insert(other as char, value);
            }
        }
    }

    Ok(ServerError::new(
        message.unwrap_or_else(|| "No message".to_string()),
        severity.unwrap_or_else(|| "UNKNOWN".to_string()),
        fields,
    ))
}

fn decode_ready_for_query(payload: &mut Payload) -> Result<BackendMessage> {
    let size = payload.remaining();
    if size != 1 {
        return Err(Error::Protocol(format!(
            "READY_FOR_QUERY should have 1 byte of payload, got {}",
            size
        )));
    }
    let status = payload.read_u8()?;
    Ok(BackendMessage::ReadyForQuery(TransactionStatus::from_byte(
        status,
    )))
}

fn decode_row_description(payload: &mut Payload) -> Result<BackendMessage> {
    let count = payload.read_u16()?;
    let mut fields = Vec::with_capacity(count as usize);

    for _ in 0..count {
        fields.push(FieldDescription {
            name: payload.read_cstr()?,
            table_oid: payload.read_u32()?,
            column_attr: payload.read_i16()?,
            type_oid: payload.read_u32()?,
            type_size: payload.read_i16()?,
            type_modifier: payload.read_i32()?,
            format_code: payload.read_i16()?,
        });
    }

    Ok(BackendMessage::RowDescription(fields))
}
