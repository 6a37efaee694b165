//! Structural validation of RPC requests (§4.4). Every violation is
//! collected rather than short-circuited, so a caller sees the full set of
//! problems in one round trip.

use hybridgrid_types::{BuildType, CompileTask, HandshakeRequest, HybridGridError};

const MAX_TASK_ID_LEN: usize = 128;
const MAX_SOURCE_BYTES: usize = 100 * 1024 * 1024;
const MAX_ARGS: usize = 256;
const MAX_TIMEOUT_SECONDS: u32 = 3600;
const MAX_PRIORITY: u8 = 100;
const ALLOWED_COMPILER_NAMES: &[&str] = &["gcc", "g++", "clang", "clang++", "cc", "c++"];

/// Validate a [`CompileTask`], returning [`HybridGridError::ValidationFailed`]
/// with every violation found.
pub fn validate_compile_task(task: &CompileTask) -> Result<(), HybridGridError> {
    let mut errors = Vec::new();

    if task.task_id.is_empty() {
        errors.push("task_id must not be empty".to_string());
    } else if task.task_id.len() > MAX_TASK_ID_LEN {
        errors.push(format!("task_id exceeds {MAX_TASK_ID_LEN} characters"));
    } else if !task.task_id.chars().all(is_id_char) {
        errors.push("task_id must match [A-Za-z0-9_-]+".to_string());
    }

    if !is_even_length_hex(&task.source_hash) {
        errors.push("source_hash must be even-length hex".to_string());
    }

    if matches!(task.build_type, BuildType::Unspecified) {
        errors.push("build_type must not be unspecified".to_string());
    }

    if task.target_platform.trim().is_empty() {
        errors.push("target_platform must not be empty".to_string());
    }

    match &task.language_config {
        None => errors.push("language_config is required".to_string()),
        Some(config) if !config.matches_build_type(&task.build_type) => {
            errors.push("language_config does not match build_type".to_string());
        }
        Some(_) => {}
    }

    if task.preprocessed_source.len() > MAX_SOURCE_BYTES {
        errors.push(format!("preprocessed_source exceeds {MAX_SOURCE_BYTES} bytes"));
    }

    if task.sanitized_args.len() > MAX_ARGS {
        errors.push(format!("sanitized_args exceeds {MAX_ARGS} entries"));
    }

    if task.timeout_seconds > MAX_TIMEOUT_SECONDS {
        errors.push(format!("timeout_seconds must be within 0..={MAX_TIMEOUT_SECONDS}"));
    }

    if task.priority > MAX_PRIORITY {
        errors.push(format!("priority must be within 0..={MAX_PRIORITY}"));
    }

    if !is_valid_compiler_name(&task.compiler) {
        errors.push("compiler must be an allow-listed name or a plain path".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(HybridGridError::ValidationFailed(errors))
    }
}

/// Validate a [`HandshakeRequest`].
pub fn validate_handshake(request: &HandshakeRequest) -> Result<(), HybridGridError> {
    let mut errors = Vec::new();
    let caps = &request.capabilities;

    if !caps.has_valid_worker_id() {
        errors.push("capabilities.worker_id is missing or malformed".to_string());
    }
    if caps.cpu_cores == 0 {
        errors.push("capabilities.cpu_cores must be > 0".to_string());
    }
    if caps.memory_bytes == 0 {
        errors.push("capabilities.memory_bytes must be > 0".to_string());
    }
    if matches!(caps.arch, hybridgrid_types::Arch::Unspecified) {
        errors.push("capabilities.arch must be set".to_string());
    }
    if request.address.trim().is_empty() {
        errors.push("address must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(HybridGridError::ValidationFailed(errors))
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_even_length_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_valid_compiler_name(name: &str) -> bool {
    ALLOWED_COMPILER_NAMES.contains(&name)
        || (!name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "/_.+-".contains(c)))
}
