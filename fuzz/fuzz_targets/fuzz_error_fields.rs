#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use pgline::protocol::{decode::decode_error_fields, Payload};

fuzz_target!(|data: &[u8]| {
    let mut payload = Payload::new(Bytes::copy_from_slice(data));
    let _ = decode_error_fields(&mut payload);
});
