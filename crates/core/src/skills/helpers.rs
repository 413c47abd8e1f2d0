//! Text and path heuristics shared by the executors.

use std::path::Path;

/// Language for a file path, by extension. Unknown extensions map to
/// `"unknown"`.
pub fn detect_language(file_path: &str) -> &'static str {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "rs" => "rust",
        "go" => "go",
        "rb" => "ruby",
        "php" => "php",
        "html" => "html",
        "css" => "css",
        "sql" => "sql",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "xml" => "xml",
        _ => "unknown",
    }
}

/// Most common language across `files`; ties go to the first seen
pub fn main_language(files: &[String]) -> &'static str {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for file in files {
        let lang = detect_language(file);
        match counts.iter_mut().find(|(l, _)| *l == lang) {
            Some((_, n)) => *n += 1,
            None => counts.push((lang, 1)),
        }
    }
    counts
        .iter()
        .fold(None, |best: Option<(&'static str, usize)>, &(lang, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((lang, n)),
        })
        .map(|(lang, _)| lang)
        .unwrap_or("unknown")
}

pub fn is_test_file(file_path: &str) -> bool {
    contains_any(&file_path.to_lowercase(), &["test", "spec"])
}

/// `haystack` must already be lowercase
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Sentences split on '.', trimmed, empties dropped
pub fn sentences(text: &str) -> Vec<&str> {
    text.split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn file_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_string()
}

pub fn file_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_string()
}

/// `user_service-v2.py` -> `UserServiceV2`
pub fn pascal_case(name: &str) -> String {
    file_stem(name)
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Char-boundary-safe prefix of at most `max` chars
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("src/lexer.py"), "python");
        assert_eq!(detect_language("web/App.TS"), "typescript");
        assert_eq!(detect_language("deploy.yml"), "yaml");
        assert_eq!(detect_language("Makefile"), "unknown");
    }

    #[test]
    fn test_main_language_prefers_majority() {
        let files = vec!["a.js".to_string(), "b.py".to_string(), "c.py".to_string()];
        assert_eq!(main_language(&files), "python");
        assert_eq!(main_language(&[]), "unknown");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("src/user_service-v2.py"), "UserServiceV2");
        assert_eq!(pascal_case("TOKENIZER.js"), "Tokenizer");
    }

    #[test]
    fn test_sentences_and_truncate() {
        assert_eq!(sentences("Fix it. Then test.  "), vec!["Fix it", "Then test"]);
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
