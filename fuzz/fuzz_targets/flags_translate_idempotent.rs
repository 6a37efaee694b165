#![no_main]

use hybridgrid_flags::translate_to_msvc;
use libfuzzer_sys::fuzz_target;

/// Translating an already-MSVC argv a second time must be a no-op: the
/// output only ever contains flags the first pass could itself produce.
fuzz_target!(|args: Vec<String>| {
    let once = translate_to_msvc(&args);
    let twice = translate_to_msvc(&once);
    assert_eq!(once, twice);
});
