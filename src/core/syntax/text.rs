// src/core/syntax/text.rs

//! Idempotent rewrites for files without a structural parser (`.env`,
//! compose files, plain configs).

/// Appends `line` unless a line with the same trimmed content already exists.
pub fn ensure_line(content: &str, line: &str) -> String {
    let wanted = line.trim();
    if wanted.is_empty() || content.lines().any(|l| l.trim() == wanted) {
        return content.to_string();
    }
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
    out
}

/// Replaces the first occurrence of `from` with `to`.
///
/// Nothing happens when `from` is absent, or when `to` is non-empty and already
/// present, so applying the same rewrite twice is a no-op.
pub fn replace_once(content: &str, from: &str, to: &str) -> String {
    if from.is_empty() || !content.contains(from) || (!to.is_empty() && content.contains(to)) {
        return content.to_string();
    }
    content.replacen(from, to, 1)
}

/// Removes the first line containing `needle`.
pub fn remove_line_containing(content: &str, needle: &str) -> String {
    if needle.is_empty() {
        return content.to_string();
    }
    let mut removed = false;
    let kept: Vec<&str> = content
        .split_inclusive('\n')
        .filter(|line| {
            if !removed && line.contains(needle) {
                removed = true;
                return false;
            }
            true
        })
        .collect();
    kept.concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ensure_line_is_idempotent() {
        let once = ensure_line("A=1", "DATABASE_URL=local.db");
        assert_eq!(once, "A=1\nDATABASE_URL=local.db\n");
        assert_eq!(ensure_line(&once, "DATABASE_URL=local.db"), once);
        assert_eq!(ensure_line("", "X=1"), "X=1\n");
    }

    #[test]
    fn test_replace_once() {
        let config = "export default defineConfig({\n\tstrict: true,\n\tverbose: true\n});\n";
        let stripped = replace_once(config, "strict: true,", "");
        assert!(!stripped.contains("strict"));
        assert_eq!(replace_once(&stripped, "strict: true,", ""), stripped);

        let once = replace_once("from 'vite'", "'vite'", "'vitest/config'");
        assert_eq!(once, "from 'vitest/config'");
        assert_eq!(replace_once(&once, "'vite'", "'vitest/config'"), once);
    }

    #[test]
    fn test_remove_line_containing() {
        let config = "a\n\tstrict: true,\nb\n";
        assert_eq!(remove_line_containing(config, "strict: true,"), "a\nb\n");
        assert_eq!(remove_line_containing("a\nb\n", "zzz"), "a\nb\n");
    }
}
