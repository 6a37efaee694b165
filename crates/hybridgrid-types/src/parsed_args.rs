use serde::{Deserialize, Serialize};

/// Source language recognized by the argument parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    C,
    Cxx,
    Unspecified,
}

/// Compiler family, detected by substring match on the invoked program name.
///
/// Detection precedence is `clang++, clang, g++, gcc`: a program name
/// containing `clang++` is classified before one merely containing `clang`,
/// so `clang++` never misclassifies as plain `clang`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerFamily {
    Gcc,
    Gxx,
    Clang,
    ClangXx,
    Msvc,
    Unknown,
}

impl CompilerFamily {
    /// Classify a compiler program name (e.g. `/usr/bin/clang++-17`).
    pub fn detect(program: &str) -> Self {
        let name = program.rsplit(['/', '\\']).next().unwrap_or(program);
        if name.contains("clang++") {
            Self::ClangXx
        } else if name.contains("clang") {
            Self::Clang
        } else if name.contains("g++") {
            Self::Gxx
        } else if name.contains("gcc") {
            Self::Gcc
        } else if name.contains("cl") && (name.ends_with("cl") || name.ends_with("cl.exe")) {
            Self::Msvc
        } else {
            Self::Unknown
        }
    }

    pub fn is_cxx(&self) -> bool {
        matches!(self, Self::Gxx | Self::ClangXx)
    }
}

/// The mode flags recognized on a compiler invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeFlags {
    /// `-c`: compile (and assemble) only, do not link.
    pub compile_only: bool,
    /// `-E`: preprocess only.
    pub preprocess_only: bool,
    /// Neither `-c` nor `-E` were given and no output suppresses linking.
    pub link: bool,
}

/// A structured view of a compiler invocation, derived from its argv.
///
/// `is_distributable` holds iff `compile_only && inputs.len() == 1 &&
/// !preprocess_only` — see [`ParsedArgs::is_distributable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedArgs {
    pub compiler_path: String,
    pub compiler_family: Option<CompilerFamily>,
    /// Flags not otherwise decomposed into the structured fields below,
    /// preserved in encounter order for faithful `to_args` reconstruction.
    pub flags: Vec<String>,
    pub include_dirs: Vec<String>,
    pub defines: Vec<String>,
    pub undefines: Vec<String>,
    pub inputs: Vec<String>,
    pub output: Option<String>,
    pub language: Language,
    pub standard: Option<String>,
    pub mode: ModeFlags,
}

impl ParsedArgs {
    /// `IsDistributable ⇔ compile-only ∧ exactly one input ∧ not preprocess-only`.
    pub fn is_distributable(&self) -> bool {
        self.mode.compile_only && !self.mode.preprocess_only && self.inputs.len() == 1
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::Unspecified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_detection_precedence() {
        assert_eq!(CompilerFamily::detect("/usr/bin/clang++-17"), CompilerFamily::ClangXx);
        assert_eq!(CompilerFamily::detect("clang"), CompilerFamily::Clang);
        assert_eq!(CompilerFamily::detect("x86_64-linux-gnu-g++"), CompilerFamily::Gxx);
        assert_eq!(CompilerFamily::detect("gcc-12"), CompilerFamily::Gcc);
        assert_eq!(CompilerFamily::detect("ld"), CompilerFamily::Unknown);
    }

    #[test]
    fn distributable_requires_single_input_compile_only() {
        let mut args = ParsedArgs {
            mode: ModeFlags { compile_only: true, ..Default::default() },
            inputs: vec!["foo.c".into()],
            ..Default::default()
        };
        assert!(args.is_distributable());

        args.inputs.push("bar.c".into());
        assert!(!args.is_distributable());

        args.inputs.truncate(1);
        args.mode.preprocess_only = true;
        assert!(!args.is_distributable());
    }
}
