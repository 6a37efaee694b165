//! Local preprocessing: invoke the host compiler with `-E` over a parsed
//! invocation and capture a self-contained expanded translation unit so a
//! remote worker needs no include paths of its own.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use hybridgrid_types::{HybridGridError, ParsedArgs};

/// Default wall-clock budget for a local `-E` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const PREPROCESSING_FLAG_PREFIXES: &[&str] = &[
    "-include",
    "-imacros",
    "-isystem",
    "-idirafter",
    "-iprefix",
    "-nostdinc",
    "-trigraphs",
    "-ansi",
    "-traditional",
    "-f",
];

/// The result of a successful preprocess invocation.
#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub expanded_source: String,
    /// Lines from stderr containing `warning:`, newline-joined.
    pub warnings: String,
}

/// Build the `-E` invocation's argv for `args`, re-emitting the flags that
/// affect preprocessing (includes, defines, undefines, standard, language,
/// and the subset listed in `PREPROCESSING_FLAG_PREFIXES`).
pub fn build_invocation(args: &ParsedArgs) -> Vec<String> {
    let mut out = vec![args.compiler_path.clone(), "-E".to_string()];

    for dir in &args.include_dirs {
        out.push(format!("-I{dir}"));
    }
    for define in &args.defines {
        out.push(format!("-D{define}"));
    }
    for undef in &args.undefines {
        out.push(format!("-U{undef}"));
    }
    if let Some(std) = &args.standard {
        out.push(format!("-std={std}"));
    }
    for flag in &args.flags {
        if PREPROCESSING_FLAG_PREFIXES.iter().any(|p| flag.starts_with(p)) {
            out.push(flag.clone());
        }
    }
    for input in &args.inputs {
        out.push(input.clone());
    }
    out
}

/// Run the compiler's `-E` step against `args` in `working_dir`, bounded by
/// `timeout` (defaults to [`DEFAULT_TIMEOUT`]).
pub fn preprocess(
    args: &ParsedArgs,
    working_dir: &Path,
    timeout: Option<Duration>,
) -> Result<PreprocessOutcome, HybridGridError> {
    let invocation = build_invocation(args);
    let Some((program, rest)) = invocation.split_first() else {
        return Err(HybridGridError::Internal("empty preprocess invocation".into()));
    };

    let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
    let start = Instant::now();

    let mut command = Command::new(program);
    command
        .args(rest)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|e| HybridGridError::Internal(format!("failed to spawn {program}: {e}")))?;

    // Drain both pipes on dedicated threads as the child writes, rather than
    // after it exits: a translation unit larger than the OS pipe buffer
    // (~64 KiB on Linux) would otherwise make the child block on write()
    // while we sit in try_wait, deadlocking until the timeout kills it.
    let stdout_reader = child.stdout.take().map(|s| std::thread::spawn(move || read_pipe(Some(s))));
    let stderr_reader = child.stderr.take().map(|s| std::thread::spawn(move || read_pipe(Some(s))));

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = stdout_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
                let stderr = stderr_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
                return if status.success() {
                    Ok(PreprocessOutcome {
                        expanded_source: stdout,
                        warnings: extract_lines(&stderr, "warning:"),
                    })
                } else {
                    Err(preprocess_failed(&stderr))
                };
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    if let Some(h) = stdout_reader {
                        let _ = h.join();
                    }
                    if let Some(h) = stderr_reader {
                        let _ = h.join();
                    }
                    return Err(HybridGridError::PreprocessTimeout(start.elapsed()));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                return Err(HybridGridError::Internal(format!("failed to poll {program}: {e}")));
            }
        }
    }
}

fn preprocess_failed(stderr: &str) -> HybridGridError {
    let mut message = extract_lines(stderr, "error:");
    if message.is_empty() {
        message = extract_lines(stderr, "fatal error:");
    }
    if message.is_empty() {
        message = stderr.to_string();
    }
    if stderr.contains("No such file or directory") {
        message.push_str("\nhint: a header was not found — check include paths (-I)");
    }
    HybridGridError::PreprocessFailed(message)
}

fn extract_lines(text: &str, needle: &str) -> String {
    text.lines()
        .filter(|line| line.contains(needle))
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_pipe<R: Read + Send + 'static>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}
