//! Property test for the encode∘decode identity across the three payload
//! length bands called out in spec.md §8.

use beacon_ws::frame::{decode_frame, encode_text, Decoded};
use proptest::prelude::*;

fn roundtrips(payload: Vec<u8>) -> bool {
    let encoded = encode_text(&payload);
    match decode_frame(&encoded) {
        Decoded::Frame { frame, consumed } => frame.payload == payload && consumed == encoded.len(),
        Decoded::Incomplete => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrips_under_126_bytes(payload in prop::collection::vec(any::<u8>(), 0..126)) {
        prop_assert!(roundtrips(payload));
    }

    #[test]
    fn roundtrips_16bit_length_band(payload in prop::collection::vec(any::<u8>(), 126..2000)) {
        prop_assert!(roundtrips(payload));
    }
}

#[test]
fn roundtrips_64bit_length_band_sample() {
    // A single large sample rather than a proptest case: 65536+ byte
    // payloads make a 64-case sweep too slow to be worth it here.
    assert!(roundtrips(vec![0xAB; 70_000]));
}
