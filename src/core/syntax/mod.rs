// src/core/syntax/mod.rs

//! # Parse/print primitives
//!
//! Minimal, lossless representations of the content kinds transforms work on.
//! Every parser here keeps the exact source text of the nodes it does not touch,
//! so printing an unmodified tree gives back the input byte-for-byte.
//!
//! - **`script`**: top-level statements of a JavaScript/TypeScript module.
//! - **`markup`**: an HTML-like element tree (components, pages), plus the
//!   selector subset the assertion driver evaluates.
//! - **`json`**: ordered key-value trees with set-if-absent and overwrite helpers.
//! - **`text`**: idempotent line and substring rewrites for opaque files.

pub mod json;
pub mod markup;
pub mod script;
pub mod text;

use thiserror::Error;

/// A failure to parse content handed to a transform.
#[derive(Error, Debug)]
pub enum SyntaxError {
    /// A quoted attribute value is never closed.
    #[error("Unterminated string literal starting at byte {offset}.")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        offset: usize,
    },
    /// A markup comment is never closed.
    #[error("Unterminated comment starting at byte {offset}.")]
    UnterminatedComment {
        /// Byte offset of the comment opener.
        offset: usize,
    },
    /// Script source tree-sitter could not parse cleanly.
    #[error("Invalid script at byte {offset}: {reason}")]
    Script {
        /// Byte offset of the first error node.
        offset: usize,
        /// The unexpected text, or the token the parser expected.
        reason: String,
    },
    /// The script grammar does not match the linked tree-sitter runtime.
    #[error("Could not load the script grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),
    /// Malformed markup (unterminated tag, stray closing tag, ...).
    #[error("Invalid markup at byte {offset}: {reason}")]
    Markup {
        /// Byte offset of the problem.
        offset: usize,
        /// What went wrong.
        reason: String,
    },
    /// No element matches the selector used as an anchor.
    #[error("No element matches '{selector}'.")]
    NoMatch {
        /// The selector text.
        selector: String,
    },
    /// A selector outside the supported subset.
    #[error("Unsupported selector '{selector}'.")]
    Selector {
        /// The selector text.
        selector: String,
    },
    /// Structured data that is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Removes the common leading indentation of all non-blank lines and trims
/// blank lines at both ends. Lets add-ons write embedded code as indented
/// multi-line literals.
pub fn dedent(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let body: Vec<&str> = lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .collect();

    let first = body.iter().position(|l| !l.trim().is_empty());
    let last = body.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => body
            .get(first..=last)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Canonical form used to decide whether two snippets are the same code:
/// whitespace runs collapse, whitespace next to punctuation disappears, quotes
/// are unified and a trailing semicolon is dropped.
pub fn normalize_code(code: &str) -> String {
    const PUNCTUATION: &[char] = &['{', '}', '(', ')', '[', ']', ',', ';', ':', '=', '<', '>'];

    let mut out = String::with_capacity(code.len());
    let mut pending_space = false;
    for c in code.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        let c = if c == '"' { '\'' } else { c };
        if pending_space
            && !out.is_empty()
            && !PUNCTUATION.contains(&c)
            && !out.ends_with(PUNCTUATION)
        {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    while out.ends_with(';') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_strips_common_indent_and_blank_edges() {
        let code = "\n        import a from 'a';\n\n        if (a) {\n            b();\n        }\n    ";
        assert_eq!(dedent(code), "import a from 'a';\n\nif (a) {\n    b();\n}");
    }

    #[test]
    fn test_normalize_code_ignores_formatting() {
        assert_eq!(
            normalize_code("import { db } from \"$lib/server/db\";"),
            normalize_code("import {db} from '$lib/server/db'")
        );
        assert_ne!(normalize_code("const a = 1;"), normalize_code("const a = 2;"));
    }
}
