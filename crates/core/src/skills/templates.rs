//! Source templates bundled at compile time.
//!
//! Placeholders are written `{{name}}`. Unknown placeholders are left in
//! place so a missing binding shows up in the generated file.

/// Python module with a single processing class
pub const PYTHON_MODULE: &str = include_str!("templates/python_module.py");

/// Python entry point (`main.py`, `app.py`, `server.py`)
pub const PYTHON_MAIN: &str = include_str!("templates/python_main.py");

/// Python package marker
pub const PYTHON_INIT: &str = include_str!("templates/python_init.py");

/// unittest skeleton emitted alongside generated Python code
pub const PYTHON_TEST: &str = include_str!("templates/python_test.py");

/// JavaScript/TypeScript module (types are placeholders)
pub const JS_MODULE: &str = include_str!("templates/js_module.js");

pub const JS_TEST: &str = include_str!("templates/js_test.js");

pub const JAVA_CLASS: &str = include_str!("templates/java_class.java");

/// Comment-only stub for languages without a template
pub const GENERIC: &str = include_str!("templates/generic.txt");

/// Test suites written by the tester per source file
pub const SUITE_PYTHON: &str = include_str!("templates/suite_python.py");
pub const SUITE_JS: &str = include_str!("templates/suite_js.js");
pub const SUITE_GENERIC: &str = include_str!("templates/suite_generic.txt");

/// Substitute `{{key}}` for each binding
pub fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    bindings
        .iter()
        .fold(template.to_string(), |out, (key, value)| {
            out.replace(&format!("{{{{{}}}}}", key), value)
        })
}

/// Line comment token for a language
pub fn comment_prefix(language: &str) -> &'static str {
    match language {
        "python" | "ruby" | "yaml" | "unknown" => "#",
        "sql" => "--",
        "html" | "xml" | "css" | "json" => "",
        _ => "//",
    }
}
