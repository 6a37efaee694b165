#![no_main]

use hybridgrid_discovery::txt::{decode_txt_strings, parse_worker_txt};
use libfuzzer_sys::fuzz_target;

/// `decode_txt_strings`/`parse_worker_txt` must never panic on an mDNS TXT
/// record of arbitrary key=value entries, no matter how malformed.
fuzz_target!(|entries: Vec<String>| {
    let txt = decode_txt_strings(entries);
    let caps = parse_worker_txt(&txt);
    assert!(caps.docker_images.len() <= txt.get("images").map(|s| s.split(',').count()).unwrap_or(0));
});
