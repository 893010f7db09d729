// tests/property/slot_test.rs

//! Property-based tests for hash slot calculation.

use proptest::prelude::*;
use spinelproxy::core::routing::slot::{NUM_SLOTS, get_slot};

proptest! {
    #[test]
    fn test_slot_is_always_in_range(key in prop::collection::vec(any::<u8>(), 0..256)) {
        prop_assert!((get_slot(&key) as usize) < NUM_SLOTS);
    }

    #[test]
    fn test_hash_tag_decides_the_slot(
        tag in "[a-zA-Z0-9:_.]{1,32}",
        prefix in "[a-zA-Z0-9:_.]{0,16}",
        suffix in "[a-zA-Z0-9:_.{}]{0,16}",
    ) {
        let key = format!("{prefix}{{{tag}}}{suffix}");
        prop_assert_eq!(get_slot(key.as_bytes()), get_slot(tag.as_bytes()));
    }

    #[test]
    fn test_keys_without_a_usable_tag_hash_whole(key in "[a-zA-Z0-9:_.]{0,64}") {
        let empty_tag = format!("{{}}{key}");
        let crc = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);
        prop_assert_eq!(get_slot(key.as_bytes()), crc.checksum(key.as_bytes()) % NUM_SLOTS as u16);
        prop_assert_eq!(
            get_slot(empty_tag.as_bytes()),
            crc.checksum(empty_tag.as_bytes()) % NUM_SLOTS as u16
        );
    }
}
