#![no_main]

use hybridgrid_argparse::{parse, to_args};
use libfuzzer_sys::fuzz_target;

/// `to_args(parse(argv))` must parse back to the same `ParsedArgs`, even
/// for adversarial argv (empty strings, repeated flags, no inputs).
fuzz_target!(|argv: Vec<String>| {
    let parsed = parse(&argv);
    let reconstructed = to_args(&parsed);
    let reparsed = parse(&reconstructed);

    assert_eq!(parsed.compiler_family, reparsed.compiler_family);
    assert_eq!(parsed.mode, reparsed.mode);
    assert_eq!(parsed.inputs, reparsed.inputs);
    assert_eq!(parsed.is_distributable(), reparsed.is_distributable());
});
