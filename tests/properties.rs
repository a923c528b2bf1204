//! Property tests for the validation gate and the provider's failure mode.

mod common;

use hbcscope::{
    format::{validate, FILE_HEADER_SIZE},
    BytecodeForm, BytecodeProvider, Error,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn short_buffers_are_too_small(data in proptest::collection::vec(any::<u8>(), 0..FILE_HEADER_SIZE)) {
        let is_too_small = matches!(
            validate(&data, BytecodeForm::Execution),
            Err(Error::TooSmall { .. })
        );
        prop_assert!(is_too_small);

        let provider = BytecodeProvider::from_mem(data);
        prop_assert!(!provider.is_valid());
        let unavailable = matches!(provider.function_count(), Err(Error::Unavailable(_)));
        prop_assert!(unavailable);
    }

    #[test]
    fn any_magic_corruption_is_bad_magic(index in 0usize..8, flip in 1u8..=255) {
        let mut data = common::container(&[4, 4], b"", b"");
        data[index] ^= flip;

        let is_bad_magic = matches!(
            validate(&data, BytecodeForm::Execution),
            Err(Error::BadMagic { .. })
        );
        prop_assert!(is_bad_magic);
        prop_assert!(!BytecodeProvider::from_mem(data).is_valid());
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let provider = BytecodeProvider::from_mem(data);
        if provider.is_valid() {
            let count = provider.function_count().unwrap();
            for id in 0..count.min(16) {
                let _ = provider.function_header(id);
                let _ = provider.find_catch_target_offset(id, 0);
                let _ = provider.location_for_address(id, 0);
                let _ = provider.virtual_offset_for_function(id);
            }
            let _ = provider.epilogue();
        }
    }

    #[test]
    fn virtual_offsets_are_prefix_sums(sizes in proptest::collection::vec(0u32..512, 1..24)) {
        let provider = BytecodeProvider::from_mem(common::container(&sizes, b"", b""));
        let mut expected = 0u32;
        for (id, size) in sizes.iter().enumerate() {
            prop_assert_eq!(provider.virtual_offset_for_function(id as u32).unwrap(), expected);
            expected += size;
        }
    }
}
