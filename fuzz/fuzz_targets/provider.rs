#![no_main]

use libfuzzer_sys::fuzz_target;
use hbcscope::{BytecodeProvider, Hardening};

fuzz_target!(|data: &[u8]| {
    let _ = BytecodeProvider::prefetch(data, Hardening::Strict);

    let provider = BytecodeProvider::from_mem(data.to_vec());
    let Ok(count) = provider.function_count() else {
        return;
    };
    for id in 0..count.min(64) {
        let _ = provider.function_header(id);
        let _ = provider.function_bytecode(id);
        let _ = provider.find_catch_target_offset(id, 0);
        let _ = provider.location_for_address(id, 0);
        let _ = provider.virtual_offset_for_function(id);
    }
    for id in 0..provider.string_count().unwrap_or(0).min(64) {
        let _ = provider.string(id);
    }
    let _ = provider.epilogue();
});
