// SPDX-License-Identifier: MIT
//! Per-language completion heuristics.
//!
//! Maps a file extension to a [`LanguageProfile`]: the language label used
//! in prompts, the end-of-line markers that mean "this statement is already
//! closed", and the stop words that signal the model has wandered into a
//! new top-level declaration.

/// Static per-language heuristics consulted by the engine and the stream
/// stop pipeline.
#[derive(Debug)]
pub struct LanguageProfile {
    /// Human-readable label heading the prompt's context block.
    pub name: &'static str,
    /// Tokens that close a statement or block. A cursor at end-of-line on a
    /// line ending in one of these yields no completion; a generated line
    /// consisting only of one of these arms the whitespace suppressor.
    pub eol_markers: &'static [&'static str],
    /// Stop sequences marking the start of an unrelated declaration.
    pub stop_words: &'static [&'static str],
}

static RUST: LanguageProfile = LanguageProfile {
    name: "Rust",
    eol_markers: &[";", "}"],
    stop_words: &["\nfn ", "\npub fn ", "\nstruct ", "\nenum ", "\nimpl ", "\nmod "],
};

static TYPESCRIPT: LanguageProfile = LanguageProfile {
    name: "TypeScript",
    eol_markers: &[";", "}"],
    stop_words: &["\nfunction ", "\nclass ", "\nexport ", "\nconst ", "\ninterface "],
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    name: "JavaScript",
    eol_markers: &[";", "}"],
    stop_words: &["\nfunction ", "\nclass ", "\nexport ", "\nconst "],
};

static PYTHON: LanguageProfile = LanguageProfile {
    name: "Python",
    // Python has no statement terminator; only a closing bracket counts.
    eol_markers: &[")", "]", "}"],
    stop_words: &["\ndef ", "\nclass ", "\nasync def ", "\nif __name__"],
};

static GO: LanguageProfile = LanguageProfile {
    name: "Go",
    eol_markers: &["}"],
    stop_words: &["\nfunc ", "\ntype ", "\nvar ", "\npackage "],
};

static JAVA: LanguageProfile = LanguageProfile {
    name: "Java",
    eol_markers: &[";", "}"],
    stop_words: &["\npublic ", "\nprivate ", "\nprotected ", "\nclass "],
};

static C_LIKE: LanguageProfile = LanguageProfile {
    name: "C",
    eol_markers: &[";", "}"],
    stop_words: &["\nstatic ", "\nvoid ", "\nstruct ", "\n#include"],
};

static PLAINTEXT: LanguageProfile = LanguageProfile {
    name: "plaintext",
    eol_markers: &[],
    stop_words: &[],
};

/// Resolve the profile for a file path by extension. Unknown extensions get
/// the plaintext profile (no markers, no stop words).
pub fn profile_for_path(file_path: &str) -> &'static LanguageProfile {
    let ext = std::path::Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext {
        "rs" => &RUST,
        "ts" | "tsx" => &TYPESCRIPT,
        "js" | "jsx" | "mjs" | "cjs" => &JAVASCRIPT,
        "py" | "pyw" => &PYTHON,
        "go" => &GO,
        "java" | "kt" | "kts" => &JAVA,
        "c" | "h" | "cpp" | "cc" | "cxx" | "hpp" | "cs" => &C_LIKE,
        _ => &PLAINTEXT,
    }
}

/// True when the line (ignoring trailing whitespace) ends with one of the
/// profile's end-of-line markers.
pub fn line_ends_with_marker(line: &str, profile: &LanguageProfile) -> bool {
    let trimmed = line.trim_end();
    !trimmed.is_empty() && profile.eol_markers.iter().any(|m| trimmed.ends_with(m))
}
