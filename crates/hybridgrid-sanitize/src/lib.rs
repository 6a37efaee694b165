//! Request validation's independent sibling: stripping compiler flags, path
//! fragments, and image names that would otherwise enable a sandbox escape
//! on the worker (§4.5). Applied to a compiler-arg list immediately before
//! dispatch, regardless of whether [`hybridgrid_validate`] already passed.

const DANGEROUS_FLAGS: &[&str] = &[
    "--plugin",
    "-fplugin",
    "-B",
    "-specs",
    "--sysroot",
    "-Xlinker",
    "-Wl,--wrap",
    "-Wl,--defsym",
    "-fprofile-generate",
    "-fprofile-use",
    "-frepo",
    "-save-temps",
    "@",
];

const DANGEROUS_PREFIXES: &[&str] = &[
    "-fplugin=",
    "-fplugin-arg-",
    "-specs=",
    "--sysroot=",
    "-B/",
    "-B./",
    "-B..",
];

/// Dangerous flags that take a separate argv value, which must be consumed
/// (and dropped) along with the flag itself.
const CONSUMES_NEXT: &[&str] = &["--plugin", "-B", "-specs", "--sysroot"];

const SHELL_METACHARACTERS: &[char] =
    &[';', '|', '&', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '\n', '\r'];

const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Strip dangerous flags, shell metacharacters, and traversal paths from a
/// compiler-arg list. Returns `(sanitized, removed)`; `removed` is surfaced
/// for audit logging.
pub fn sanitize(args: &[String]) -> (Vec<String>, Vec<String>) {
    let mut sanitized = Vec::with_capacity(args.len());
    let mut removed = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if is_dangerous(arg) {
            removed.push(arg.clone());
            if CONSUMES_NEXT.contains(&arg.as_str()) {
                if let Some(value) = iter.next() {
                    removed.push(value.clone());
                }
            }
            continue;
        }

        if contains_shell_metacharacter(arg) {
            removed.push(arg.clone());
            continue;
        }

        if let Some(path) = arg.strip_prefix("-I") {
            if contains_traversal(path) {
                removed.push(arg.clone());
                continue;
            }
        }

        if arg.contains(">>") || arg.contains("> ") {
            removed.push(arg.clone());
            continue;
        }

        sanitized.push(arg.clone());
    }

    (sanitized, removed)
}

fn is_dangerous(arg: &str) -> bool {
    DANGEROUS_FLAGS.contains(&arg) || DANGEROUS_PREFIXES.iter().any(|p| arg.starts_with(p))
}

fn contains_shell_metacharacter(arg: &str) -> bool {
    arg.chars().any(|c| SHELL_METACHARACTERS.contains(&c))
}

fn contains_traversal(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    if lower.contains("%2e%2e") {
        return true;
    }
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Resolve `relative` against `base`, rejecting traversal outside `base` and
/// (on Windows-style checks) reserved names or illegal characters. Returns
/// an empty string on rejection.
pub fn sanitize_path(base: &str, relative: &str) -> String {
    if contains_traversal(relative) {
        return String::new();
    }
    if has_windows_illegal_characters(relative) || is_reserved_device_name(relative) {
        return String::new();
    }

    let base = base.trim_end_matches('/');
    format!("{base}/{relative}")
}

fn has_windows_illegal_characters(path: &str) -> bool {
    for (i, c) in path.chars().enumerate() {
        if "<>:\"|?*".contains(c) {
            // A colon is legal only at offset 1 as a drive letter (e.g. `C:`).
            if c == ':' && i == 1 {
                continue;
            }
            return true;
        }
    }
    false
}

fn is_reserved_device_name(path: &str) -> bool {
    let stem = path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .split('.')
        .next()
        .unwrap_or(path)
        .to_ascii_uppercase();
    WINDOWS_RESERVED_NAMES.contains(&stem.as_str())
}

/// Validate a Docker image name: `[A-Za-z0-9._/:@-]` only.
pub fn is_valid_docker_image(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._/:@-".contains(c))
}
