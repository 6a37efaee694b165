#![no_main]

use hybridgrid_sanitize::sanitize;
use libfuzzer_sys::fuzz_target;

const SHELL_METACHARACTERS: &[char] =
    &[';', '|', '&', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '\n', '\r'];

/// No argument containing a shell metacharacter may survive sanitization,
/// and every removed argument must actually be absent from the output
/// (§4.5's sandbox-escape defense has no loopholes for arbitrary argv).
fuzz_target!(|args: Vec<String>| {
    let (sanitized, removed) = sanitize(&args);

    for arg in &sanitized {
        assert!(!arg.chars().any(|c| SHELL_METACHARACTERS.contains(&c)));
    }
    assert_eq!(sanitized.len() + removed.len(), args.len());
});
