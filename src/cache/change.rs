// src/cache/change.rs

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Source extensions treated as code when no paired test file exists.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "go", "rs", "py", "js", "ts", "jsx", "tsx", "java", "rb", "c", "cc", "cpp", "h",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Test,
    Implementation,
    Other,
}

/// Classification of one edited file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: String,
    pub change_type: ChangeType,
    /// No cached result existed for `path` at analysis time.
    pub is_new: bool,
    /// Test identifiers the change affects, in declaration order.
    pub affected_tests: Vec<String>,
    /// blake3 of the file contents, when readable.
    pub content_hash: Option<String>,
}

static GO_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^func\s+(Test[A-Za-z0-9_]*)\s*\(").expect("valid Go test regex")
});

static RUST_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"#\[(?:tokio::)?test(?:\([^)]*\))?\]\s*(?:#\[[^\]]*\]\s*)*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("valid Rust test regex")
});

static PY_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(test_[A-Za-z0-9_]*)\s*\(")
        .expect("valid Python test regex")
});

/// Names of the tests declared in a test file's source.
pub fn declared_tests(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for re in [&*GO_TEST, &*RUST_TEST, &*PY_TEST] {
        for caps in re.captures_iter(source) {
            if let Some(m) = caps.get(1) {
                if m.as_str() == "TestMain" {
                    continue;
                }
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    let mut names: Vec<String> = Vec::with_capacity(found.len());
    for (_, name) in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
