#![no_main]

use hybridgrid_types::{BuildType, CompileTask, LanguageConfig};
use hybridgrid_validate::validate_compile_task;
use libfuzzer_sys::fuzz_target;

#[derive(arbitrary::Arbitrary, Debug)]
struct Input {
    task_id: String,
    source_hash: String,
    compiler: String,
    target_platform: String,
    preprocessed_source: String,
    sanitized_args: Vec<String>,
    timeout_seconds: u32,
    priority: u8,
    build_type: u8,
}

/// An accepted task must actually satisfy every bound the validator claims
/// to enforce (§4.4) — a task that slips past with an out-of-range field is
/// the allow-list-turned-deny-list bug this harness exists to catch.
fuzz_target!(|input: Input| {
    let build_type = match input.build_type % 3 {
        0 => BuildType::C,
        1 => BuildType::Cxx,
        _ => BuildType::Unspecified,
    };
    let language_config = match build_type {
        BuildType::C => Some(LanguageConfig::C { std: None }),
        BuildType::Cxx => Some(LanguageConfig::Cxx { std: None }),
        BuildType::Unspecified => None,
    };

    let task = CompileTask {
        task_id: input.task_id,
        source_hash: input.source_hash,
        compiler: input.compiler,
        build_type,
        target_platform: input.target_platform,
        preprocessed_source: input.preprocessed_source,
        sanitized_args: input.sanitized_args,
        timeout_seconds: input.timeout_seconds,
        priority: input.priority,
        language_config,
    };

    if validate_compile_task(&task).is_ok() {
        assert!(!task.task_id.is_empty() && task.task_id.len() <= 128);
        assert!(task.task_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert!(task.source_hash.len() % 2 == 0 && task.source_hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!matches!(task.build_type, BuildType::Unspecified));
        assert!(task.sanitized_args.len() <= 256);
        assert!(task.timeout_seconds <= 3600);
        assert!(task.priority <= 100);
    }
});
