//! Postgres wire protocol: framing and the message catalog
//!
//! Everything here is transport-agnostic. Encoders append whole packets to a
//! `BytesMut`; decoders split frames off a buffer and interpret one payload at
//! a time through a cursor that refuses to leave bytes behind.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{decode_backend, decode_frame, Frame, FrameReader, Payload};
pub use encode::{encode_into, encode_message, write_packet};
pub use message::{
    AuthenticationRequest, BackendMessage, BackendTag, DescribeTarget, FieldDescription, Format,
    FrontendMessage, FrontendTag, TransactionStatus,
};
