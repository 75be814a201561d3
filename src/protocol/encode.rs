//! Protocol message encoding

use super::constants::CANCEL_REQUEST_CODE;
use super::message::{Format, FrontendMessage, FrontendTag};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Encode a frontend message into bytes
pub fn encode_message(msg: &FrontendMessage) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    encode_into(&mut buf, msg)?;
    Ok(buf)
}

/// Append a frontend message to `buf`
///
/// The whole packet is built in memory, so a caller writing `buf` in one
/// `write_all` never leaves a partial frame on the wire.
pub fn encode_into(buf: &mut BytesMut, msg: &FrontendMessage) -> Result<()> {
    match msg {
        FrontendMessage::Startup { version, params } => {
            write_packet(buf, FrontendTag::Startup, |buf| {
                buf.put_i32(*version);
                for (key, value) in params {
                    put_cstr(buf, key)?;
                    put_cstr(buf, value)?;
                }
                buf.put_u8(0);
                Ok(())
            })
        }
        FrontendMessage::CancelRequest { process_id, secret } => {
            write_packet(buf, FrontendTag::CancelRequest, |buf| {
                buf.put_i32(CANCEL_REQUEST_CODE);
                buf.put_i32(*process_id);
                buf.put_slice(secret);
                Ok(())
            })
        }
        FrontendMessage::Password(password) => {
            write_packet(buf, FrontendTag::Password, |buf| put_cstr(buf, password))
        }
        FrontendMessage::Query(query) => {
            write_packet(buf, FrontendTag::Query, |buf| put_cstr(buf, query))
        }
        FrontendMessage::Parse {
            name,
            query,
            param_types,
        } => write_packet(buf, FrontendTag::Parse, |buf| {
            put_cstr(buf, name)?;
            put_cstr(buf, query)?;
            buf.put_i16(count(param_types.len(), "parameter types")?);
            for oid in param_types {
                buf.put_u32(*oid);
            }
            Ok(())
        }),
        FrontendMessage::Bind {
            portal,
            statement,
            param_formats,
            values,
            result_formats,
        } => write_packet(buf, FrontendTag::Bind, |buf| {
            put_cstr(buf, portal)?;
            put_cstr(buf, statement)?;
            put_formats(buf, param_formats)?;
            buf.put_i16(count(values.len(), "parameter values")?);
            for value in values {
                put_nullable_bytes(buf, value.as_ref())?;
            }
            put_formats(buf, result_formats)
        }),
        FrontendMessage::Describe { target, name } => {
            write_packet(buf, FrontendTag::Describe, |buf| {
                buf.put_u8(target.code());
                put_cstr(buf, name)
            })
        }
        FrontendMessage::Execute { portal, max_rows } => {
            write_packet(buf, FrontendTag::Execute, |buf| {
                put_cstr(buf, portal)?;
                buf.put_i32(*max_rows);
                Ok(())
            })
        }
        FrontendMessage::Close { target, name } => write_packet(buf, FrontendTag::Close, |buf| {
            buf.put_u8(target.code());
            put_cstr(buf, name)
        }),
        FrontendMessage::Flush => write_packet(buf, FrontendTag::Flush, |_| Ok(())),
        FrontendMessage::Sync => write_packet(buf, FrontendTag::Sync, |_| Ok(())),
        FrontendMessage::Terminate => write_packet(buf, FrontendTag::Terminate, |_| Ok(())),
    }
}

/// Frame a packet: optional tag byte, self-inclusive big-endian length, payload
pub fn write_packet<F>(buf: &mut BytesMut, tag: FrontendTag, body: F) -> Result<()>
where
    F: FnOnce(&mut BytesMut) -> Result<()>,
{
    let start = buf.len();
    if let Some(code) = tag.code() {
        buf.put_u8(code);
    }

    // Reserve space for length (will be filled at end)
    let len_pos = buf.len();
    buf.put_i32(0);

    if let Err(err) = body(buf) {
        buf.truncate(start);
        return Err(err);
    }

    let len = buf.len() - len_pos;
    let Ok(len) = i32::try_from(len) else {
        buf.truncate(start);
        return Err(Error::Protocol(format!(
            "{} packet too large: {} bytes",
            tag.name(),
            len
        )));
    };
    buf[len_pos..len_pos + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// UTF-8 bytes followed by a zero terminator
pub fn put_cstr(buf: &mut BytesMut, value: &str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        return Err(Error::Protocol(format!(
            "string contains an interior NUL byte: {:?}",
            value
        )));
    }
    buf.put(value.as_bytes());
    buf.put_u8(0);
    Ok(())
}

/// Length-prefixed blob; `None` is written as length -1 (SQL NULL)
pub fn put_nullable_bytes(buf: &mut BytesMut, value: Option<&Bytes>) -> Result<()> {
    match value {
        None => buf.put_i32(-1),
        Some(bytes) => {
            let len = i32::try_from(bytes.len())
                .map_err(|_| Error::Protocol(format!("value too large: {} bytes", bytes.len())))?;
            buf.put_i32(len);
            buf.put_slice(bytes);
        }
    }
    Ok(())
}

fn put_formats(buf: &mut BytesMut, formats: &[Format]) -> Result<()> {
    buf.put_i16(count(formats.len(), "format codes")?);
    for format in formats {
        buf.put_i16(format.code());
    }
    Ok(())
}

fn count(len: usize, what: &str) -> Result<i16> {
    i16::try_from(len).map_err(|_| Error::Protocol(format!("too many {}: {}", what, len)))
}
