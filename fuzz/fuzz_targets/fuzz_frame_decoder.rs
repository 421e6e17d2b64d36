//! Fuzz target: `FrameDecoder::feed` + `decode_value`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder, split
//! at an arbitrary point, and decodes every frame it yields. Asserts that
//! nothing panics or overflows the stack, that frames respect the size
//! limit, and that decoded values can be re-encoded.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use proxify::port::codec::{FrameDecoder, decode_value, encode_value};

const MAX_FRAME: usize = 4096;
const MAX_DEPTH: usize = 64;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new(MAX_FRAME);
    let split = data.first().map_or(0, |&b| usize::from(b)).min(data.len());

    let mut frames = decoder.feed(&data[..split]);
    frames.extend(decoder.feed(&data[split..]));

    for frame in frames {
        assert!(!frame.is_empty(), "decoder must not yield empty payload");
        assert!(frame.len() <= MAX_FRAME, "payload exceeds the frame limit");
        if let Ok(value) = decode_value(&frame, MAX_DEPTH) {
            // Anything that decoded is plain data and must encode again.
            assert!(encode_value(&value, usize::MAX >> 1).is_ok());
        }
    }

    // After a reset the decoder must accept bytes cleanly again.
    decoder.reset();
    let _ = decoder.feed(data);
});
