//! Fuzz target for wire message decoding
//!
//! Feeds arbitrary bytes to every decoder a server or client runs on
//! untrusted input. None of them may panic; malformed input returns `Err`.
//! Anything that decodes must re-encode and decode to the same value.

#![no_main]

use libfuzzer_sys::fuzz_target;
use quietbox_proto::{HybridHeader, Request, Response};

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = Request::decode(data) {
        let bytes = request.encode().expect("decoded request re-encodes");
        assert_eq!(Request::decode(&bytes).expect("re-encoded request decodes"), request);
    }

    if let Ok(response) = Response::decode(data) {
        let bytes = response.encode().expect("decoded response re-encodes");
        assert_eq!(Response::decode(&bytes).expect("re-encoded response decodes"), response);
    }

    if let Ok((header, body)) = HybridHeader::parse(data) {
        assert_eq!(body.len(), data.len() - HybridHeader::SIZE);
        assert_eq!(&header.to_bytes()[..], &data[..HybridHeader::SIZE]);
    }
});
