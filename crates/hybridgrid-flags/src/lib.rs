//! GCC/Clang to MSVC compiler flag translation.
//!
//! [`translate_to_msvc`] maps a GCC/Clang-flavored argv to its MSVC
//! equivalent; [`augment_msvc_defaults`] idempotently appends the MSVC
//! defaults hybridgrid always wants on a translated invocation.

const DROPPED_PREFIXES: &[&str] = &[
    "-fPIC", "-fpic", "-fPIE", "-fpie", "-pthread", "-pie", "-march=", "-mtune=", "-m32", "-m64",
    "-fdiagnostics-color", "-fcolor-diagnostics", "-fno-diagnostics-color",
];

const MSVC_DEFAULTS: &[&str] = &["/nologo", "/EHsc", "/permissive-"];

/// `TranslateToMSVC`: GCC/Clang flag vocabulary → MSVC equivalents.
pub fn translate_to_msvc(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if arg == "-c" {
            out.push("/c".to_string());
        } else if arg == "-E" {
            out.push("/E".to_string());
        } else if let Some(file) = strip_output_flag(arg, &mut iter) {
            out.push(translate_output(&file));
        } else if let Some(value) = strip_prefixed(arg, "-I") {
            out.push(format!("/I{value}"));
        } else if let Some(value) = strip_prefixed(arg, "-D") {
            out.push(format!("/D{value}"));
        } else if let Some(value) = strip_prefixed(arg, "-U") {
            out.push(format!("/U{value}"));
        } else if arg == "-x" {
            if let Some(lang) = iter.next() {
                if let Some(flag) = translate_language(lang) {
                    out.push(flag);
                }
            }
        } else if let Some(value) = strip_prefixed(arg, "-x") {
            if let Some(flag) = translate_language(&value) {
                out.push(flag);
            }
        } else if let Some(std) = arg.strip_prefix("-std=") {
            if let Some(flag) = translate_std(std) {
                out.push(flag);
            }
        } else if arg.starts_with("-Wno-") {
            // Silencing a specific warning class has no direct MSVC
            // equivalent worth carrying; drop.
        } else if arg == "-Wall" || arg == "-Wextra" {
            push_unique(&mut out, "/W4");
        } else if arg == "-Werror" {
            push_unique(&mut out, "/WX");
        } else if arg == "-w" {
            push_unique(&mut out, "/W0");
        } else if let Some(level) = arg.strip_prefix("-O") {
            if !level.is_empty() || arg == "-O" {
                out.push(format!("/O{level}"));
            }
        } else if arg == "-g" || arg.starts_with("-g") {
            out.push("/Zi".to_string());
        } else if is_dropped(arg) {
            // PIC/arch/threading/diagnostic-color flags drop silently.
        } else if arg.starts_with('-') {
            // Unknown `-`-prefixed flags are discarded.
        } else {
            out.push(arg.clone());
        }
    }

    out
}

fn strip_output_flag(arg: &str, iter: &mut std::iter::Peekable<std::slice::Iter<'_, String>>) -> Option<String> {
    if let Some(rest) = arg.strip_prefix("-o") {
        if !rest.is_empty() {
            return Some(rest.to_string());
        }
        return iter.next().cloned();
    }
    None
}

fn translate_output(file: &str) -> String {
    let lower = file.to_ascii_lowercase();
    if lower.ends_with(".o") || lower.ends_with(".obj") {
        format!("/Fo{file}")
    } else {
        format!("/Fe{file}")
    }
}

fn strip_prefixed(arg: &str, prefix: &str) -> Option<String> {
    arg.strip_prefix(prefix).map(|s| s.to_string())
}

fn translate_language(lang: &str) -> Option<String> {
    match lang {
        "c" => Some("/Tc".to_string()),
        "c++" => Some("/Tp".to_string()),
        _ => None,
    }
}

fn translate_std(std: &str) -> Option<String> {
    match std {
        "c++11" | "c++14" | "gnu++11" | "gnu++14" => Some("/std:c++14".to_string()),
        "c++17" | "gnu++17" => Some("/std:c++17".to_string()),
        "c++20" | "gnu++20" => Some("/std:c++20".to_string()),
        "c++23" | "gnu++23" | "c++2b" => Some("/std:c++latest".to_string()),
        "c11" | "gnu11" => Some("/std:c11".to_string()),
        "c17" | "gnu17" => Some("/std:c17".to_string()),
        // C89/99 drop — MSVC's default mode is the nearest strict equivalent.
        "c89" | "c90" | "c99" | "gnu89" | "gnu90" | "gnu99" => None,
        _ => None,
    }
}

fn is_dropped(arg: &str) -> bool {
    DROPPED_PREFIXES.iter().any(|p| arg.starts_with(p))
}

fn push_unique(out: &mut Vec<String>, flag: &str) {
    if !out.iter().any(|existing| existing == flag) {
        out.push(flag.to_string());
    }
}

/// `AugmentMSVCDefaults`: idempotently append `/nologo`, `/EHsc`,
/// `/permissive-` when absent.
pub fn augment_msvc_defaults(args: &[String]) -> Vec<String> {
    let mut out = args.to_vec();
    for default in MSVC_DEFAULTS {
        if !out.iter().any(|a| a == default) {
            out.push(default.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn scenario_translate_to_msvc() {
        let input = v(&[
            "-c", "-O2", "-Wall", "-I./inc", "-DNDEBUG", "main.c", "-o", "main.o",
        ]);
        let expected = v(&["/c", "/O2", "/W4", "/I./inc", "/DNDEBUG", "main.c", "/Fomain.o"]);
        assert_eq!(translate_to_msvc(&input), expected);
    }

    #[test]
    fn output_flag_chooses_fo_or_fe() {
        assert_eq!(translate_output("main.o"), "/Fomain.o");
        assert_eq!(translate_output("main.obj"), "/Fomain.obj");
        assert_eq!(translate_output("main.exe"), "/Femain.exe");
    }

    #[test]
    fn adjoined_output_handled_identically() {
        let attached = translate_to_msvc(&v(&["-omain.o"]));
        let separated = translate_to_msvc(&v(&["-o", "main.o"]));
        assert_eq!(attached, separated);
    }

    #[test]
    fn cxx_standard_mapping() {
        assert_eq!(translate_std("c++11"), Some("/std:c++14".to_string()));
        assert_eq!(translate_std("c++23"), Some("/std:c++latest".to_string()));
        assert_eq!(translate_std("c99"), None);
    }

    #[test]
    fn warning_flags() {
        assert_eq!(translate_to_msvc(&v(&["-Wall"])), v(&["/W4"]));
        assert_eq!(translate_to_msvc(&v(&["-Wno-unused"])), Vec::<String>::new());
        assert_eq!(translate_to_msvc(&v(&["-Werror"])), v(&["/WX"]));
        assert_eq!(translate_to_msvc(&v(&["-w"])), v(&["/W0"]));
    }

    #[test]
    fn drops_pic_arch_and_color_flags() {
        let input = v(&["-fPIC", "-pthread", "-march=native", "-fdiagnostics-color=always", "main.c"]);
        assert_eq!(translate_to_msvc(&input), v(&["main.c"]));
    }

    #[test]
    fn augment_defaults_is_idempotent() {
        let once = augment_msvc_defaults(&v(&["/c", "main.c"]));
        let twice = augment_msvc_defaults(&once);
        assert_eq!(once, twice);
        assert!(once.contains(&"/nologo".to_string()));
        assert!(once.contains(&"/EHsc".to_string()));
        assert!(once.contains(&"/permissive-".to_string()));
    }

    proptest::proptest! {
        #[test]
        fn augment_is_always_idempotent(extra in proptest::collection::vec("[a-zA-Z/]{1,8}", 0..5)) {
            let once = augment_msvc_defaults(&extra);
            let twice = augment_msvc_defaults(&once);
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
