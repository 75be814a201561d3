#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pgline::protocol::{decode_backend, decode_frame, Payload};

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several packets may arrive in one segment; stop at the first
    // incomplete or invalid one, as the session would.
    while let Ok(Some(frame)) = decode_frame(&mut buf, false) {
        let tag = frame.tag;
        let mut payload = Payload::new(frame.payload);
        if decode_backend(tag, &mut payload).is_err() {
            break;
        }
        if payload.finish(tag).is_err() {
            break;
        }
    }
});
