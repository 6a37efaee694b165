//! Compiler-invocation argument parsing and distributability classification.
//!
//! [`parse`] turns an argv into a [`ParsedArgs`]; [`to_args`] reconstructs an
//! argv whose semantic effect equals the parsed input (the order of
//! unrelated flag groups may differ, but include directories and input
//! files stay in their original relative order).

use hybridgrid_types::{CompilerFamily, Language, ModeFlags, ParsedArgs};

const OBJECT_EXTENSIONS: &[&str] = &["o", "obj", "a", "lib", "so", "dylib", "dll"];

/// Parse a raw argv (`argv[0]` is the compiler path) into a [`ParsedArgs`].
pub fn parse(argv: &[String]) -> ParsedArgs {
    let mut result = ParsedArgs::default();
    let Some((compiler, rest)) = argv.split_first() else {
        return result;
    };
    result.compiler_path = compiler.clone();
    result.compiler_family = Some(CompilerFamily::detect(compiler));

    let mut iter = rest.iter().peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = take_value(arg, "-I", &mut iter) {
            result.include_dirs.push(value);
        } else if let Some(value) = take_value(arg, "-D", &mut iter) {
            result.defines.push(value);
        } else if let Some(value) = take_value(arg, "-U", &mut iter) {
            result.undefines.push(value);
        } else if let Some(value) = take_value(arg, "-o", &mut iter) {
            result.output = Some(value);
        } else if let Some(value) = take_value(arg, "-x", &mut iter) {
            result.language = match value.as_str() {
                "c" => Language::C,
                "c++" | "cxx" => Language::Cxx,
                _ => Language::Unspecified,
            };
        } else if let Some(std) = arg.strip_prefix("-std=") {
            result.standard = Some(std.to_string());
        } else if arg == "-c" {
            result.mode.compile_only = true;
        } else if arg == "-E" {
            result.mode.preprocess_only = true;
        } else if is_recognized_passthrough(arg) {
            result.flags.push(arg.clone());
        } else if arg.starts_with('-') {
            // Unknown flag: preserved verbatim for pass-through.
            result.flags.push(arg.clone());
        } else {
            result.inputs.push(arg.clone());
        }
    }

    result.mode.link = !result.mode.compile_only && !result.mode.preprocess_only;
    if result.language == Language::Unspecified {
        result.language = infer_language(&result.inputs);
    }
    result
}

/// Match `prefix` as either an attached (`-Ifoo`) or separated (`-I foo`)
/// flag and return the value, advancing `iter` when separated.
fn take_value(
    arg: &str,
    prefix: &str,
    iter: &mut std::iter::Peekable<std::slice::Iter<'_, String>>,
) -> Option<String> {
    if let Some(attached) = arg.strip_prefix(prefix) {
        if !attached.is_empty() {
            return Some(attached.to_string());
        }
        if arg == prefix {
            return iter.next().cloned();
        }
    }
    None
}

fn is_recognized_passthrough(arg: &str) -> bool {
    arg.starts_with("-O")
        || arg.starts_with("-g")
        || arg.starts_with("-W")
        || arg.starts_with("-f")
        || arg.starts_with("-m")
}

fn infer_language(inputs: &[String]) -> Language {
    let Some(first) = inputs.first() else {
        return Language::Unspecified;
    };
    match first.rsplit('.').next() {
        Some("c") => Language::C,
        Some("cc" | "cpp" | "cxx" | "c++" | "C") => Language::Cxx,
        _ => Language::Unspecified,
    }
}

/// Whether `args.inputs` consists solely of already-linkable object/archive
/// files — a link-only invocation, never distributable.
pub fn has_link_only_inputs(args: &ParsedArgs) -> bool {
    !args.inputs.is_empty()
        && args.inputs.iter().all(|input| {
            input
                .rsplit('.')
                .next()
                .map(|ext| OBJECT_EXTENSIONS.contains(&ext))
                .unwrap_or(false)
        })
}

/// Reconstruct an argv whose semantic effect equals `args`.
pub fn to_args(args: &ParsedArgs) -> Vec<String> {
    let mut out = vec![args.compiler_path.clone()];

    if args.mode.preprocess_only {
        out.push("-E".to_string());
    }
    if args.mode.compile_only {
        out.push("-c".to_string());
    }
    for flag in &args.flags {
        out.push(flag.clone());
    }
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
    match args.language {
        Language::C => {
            out.push("-x".to_string());
            out.push("c".to_string());
        }
        Language::Cxx => {
            out.push("-x".to_string());
            out.push("c++".to_string());
        }
        Language::Unspecified => {}
    }
    for input in &args.inputs {
        out.push(input.clone());
    }
    if let Some(output) = &args.output {
        out.push("-o".to_string());
        out.push(output.clone());
    }
    out
}
