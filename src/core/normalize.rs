//! Text normalization used for presence checks and anchor matching.
//!
//! Comparisons are textual. `normalize_compact` removes every whitespace
//! character, so `a.b( x )` and `a.b(x)` compare equal; two different
//! expressions that only differ in whitespace-separated tokens (for example
//! `new Foo()` and `newFoo()`) are also equal after compaction.

/// Trim surrounding whitespace and one trailing statement terminator.
pub fn normalize_trim(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed.strip_suffix(';').map(str::trim_end).unwrap_or(trimmed)
}

/// `normalize_trim` plus removal of all internal whitespace.
pub fn normalize_compact(text: &str) -> String {
    normalize_trim(text).chars().filter(|c| !c.is_whitespace()).collect()
}

/// `normalize_trim` applied per line, blank lines dropped. Indentation of
/// continuation lines does not matter, inner spacing of a line does.
pub fn normalize_lines(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    normalize_trim(&joined).to_string()
}

/// Name part of a using directive: `global using X;` and `X` both yield `X`.
pub fn using_name(text: &str) -> &str {
    let mut name = normalize_trim(text);
    if let Some(rest) = name.strip_prefix("global") {
        if rest.starts_with(char::is_whitespace) {
            name = rest.trim_start();
        }
    }
    if let Some(rest) = name.strip_prefix("using") {
        if rest.starts_with(char::is_whitespace) {
            name = rest.trim_start();
        }
    }
    name.trim()
}

/// Attribute text without surrounding brackets: `[Authorize]` -> `Authorize`.
pub fn attribute_text(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Append a `;` to statement-shaped fragments that lack a terminator.
pub fn terminated(block: &str) -> String {
    let trimmed = block.trim();
    if trimmed.ends_with(';') || trimmed.ends_with('}') {
        trimmed.to_string()
    } else {
        format!("{};", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trim_strips_single_terminator() {
        assert_eq!(normalize_trim("  app.Run();  "), "app.Run()");
        assert_eq!(normalize_trim("x;;"), "x;");
        assert_eq!(normalize_trim("public string Name { get; set; }"), "public string Name { get; set; }");
    }

    #[test]
    fn test_normalize_compact_ignores_internal_whitespace() {
        assert_eq!(normalize_compact("a.b( x );"), normalize_compact("a.b(x)"));
        assert_eq!(normalize_compact("services\n    .AddX();"), "services.AddX()");
    }

    #[test]
    fn test_normalize_lines_ignores_reindentation() {
        let authored = "public void Log()\n{\n    Console.WriteLine(1);\n}";
        let reindented = "public void Log()\n        {\n            Console.WriteLine(1);\n\n        }\n";

        assert_eq!(normalize_lines(authored), normalize_lines(reindented));
        assert_ne!(normalize_lines("int x;"), normalize_lines("int  x;"));
    }

    #[test]
    fn test_using_name() {
        assert_eq!(using_name("using System.Text;"), "System.Text");
        assert_eq!(using_name("global using System.Text;"), "System.Text");
        assert_eq!(using_name(" System.Text "), "System.Text");
        assert_eq!(using_name("usingless.Namespace"), "usingless.Namespace");
        assert_eq!(using_name("using static System.Math;"), "static System.Math");
    }

    #[test]
    fn test_attribute_text_and_terminator() {
        assert_eq!(attribute_text("[Authorize]"), "Authorize");
        assert_eq!(attribute_text("Route(\"api\")"), "Route(\"api\")");
        assert_eq!(terminated("app.Run()"), "app.Run();");
        assert_eq!(terminated("if (x) { y(); }"), "if (x) { y(); }");
    }
}
