// src/core/syntax/json.rs

//! Ordered JSON documents (manifests, tsconfig files).
//!
//! Key order is preserved through `serde_json`'s `preserve_order` feature; the
//! indentation unit and trailing newline of the source are kept when printing.

use super::SyntaxError;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

const DEFAULT_INDENT: &str = "\t";

/// A JSON document plus the formatting needed to print it back the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDocument {
    value: Value,
    indent: String,
    trailing_newline: bool,
}

impl JsonDocument {
    /// Parses `source`. Blank input yields an empty object.
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        if source.trim().is_empty() {
            return Ok(Self {
                value: Value::Object(Map::new()),
                indent: DEFAULT_INDENT.to_string(),
                trailing_newline: true,
            });
        }
        let value = serde_json::from_str(source)?;
        Ok(Self {
            value,
            indent: detect_indent(source),
            trailing_newline: source.ends_with('\n'),
        })
    }

    /// The parsed value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Mutable access to the parsed value.
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Pretty-prints with the source's indentation unit.
    pub fn print(&self) -> Result<String, SyntaxError> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(self.indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.value.serialize(&mut serializer)?;

        let mut out = String::from_utf8_lossy(&buffer).into_owned();
        if self.trailing_newline {
            out.push('\n');
        }
        Ok(out)
    }
}

fn detect_indent(source: &str) -> String {
    source
        .lines()
        .skip(1)
        .find(|line| !line.trim().is_empty())
        .map(|line| {
            line.chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect::<String>()
        })
        .filter(|indent| !indent.is_empty())
        .unwrap_or_else(|| DEFAULT_INDENT.to_string())
}

/// Looks up a dotted path (`"scripts.test"`).
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    get_in(root, &split(path))
}

/// Looks up a path given as segments, for keys that contain dots.
pub fn get_in<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(*segment))
}

/// Sets `path` to `value` only when it is absent. Returns whether anything changed.
///
/// Missing intermediate objects are created. A non-object in the way leaves
/// the document untouched.
pub fn set_default(root: &mut Value, path: &str, value: Value) -> bool {
    set_default_in(root, &split(path), value)
}

/// Segment form of [`set_default`].
pub fn set_default_in(root: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let Some(object) = parent_object(root, parents, false) else {
        return false;
    };
    if object.contains_key(*last) {
        return false;
    }
    object.insert((*last).to_string(), value);
    true
}

/// Sets `path` to `value`, replacing whatever was there. Returns whether the
/// stored value changed.
///
/// Missing intermediate objects are created and non-objects in the way are
/// replaced by objects.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    set_in(root, &split(path), value)
}

/// Segment form of [`set`].
pub fn set_in(root: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let Some(object) = parent_object(root, parents, true) else {
        return false;
    };
    if object.get(*last) == Some(&value) {
        return false;
    }
    object.insert((*last).to_string(), value);
    true
}

fn parent_object<'a>(
    root: &'a mut Value,
    segments: &[&str],
    replace_non_objects: bool,
) -> Option<&'a mut Map<String, Value>> {
    let mut node = root;
    for segment in segments {
        let object = node.as_object_mut()?;
        let child = object
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            if !replace_non_objects {
                return None;
            }
            *child = Value::Object(Map::new());
        }
        node = child;
    }
    node.as_object_mut()
}

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MANIFEST: &str = "{\n  \"name\": \"app\",\n  \"scripts\": {\n    \"dev\": \"vite dev\"\n  },\n  \"type\": \"module\"\n}\n";

    #[test]
    fn test_print_preserves_order_and_indent() {
        let doc = JsonDocument::parse(MANIFEST).unwrap();
        assert_eq!(doc.print().unwrap(), MANIFEST);

        let tabbed = "{\n\t\"b\": 1,\n\t\"a\": 2\n}";
        assert_eq!(JsonDocument::parse(tabbed).unwrap().print().unwrap(), tabbed);
    }

    #[test]
    fn test_set_default_keeps_existing_values() {
        let mut doc = JsonDocument::parse(MANIFEST).unwrap();
        assert!(!set_default(doc.value_mut(), "scripts.dev", json!("other")));
        assert!(set_default(doc.value_mut(), "scripts.test", json!("vitest")));
        assert!(set_default(doc.value_mut(), "devDependencies.vitest", json!("^2.0.0")));
        assert_eq!(get(doc.value(), "scripts.dev"), Some(&json!("vite dev")));

        let printed = doc.print().unwrap();
        assert!(printed.contains("\"dev\": \"vite dev\",\n    \"test\": \"vitest\""));
        assert!(printed.ends_with("\"devDependencies\": {\n    \"vitest\": \"^2.0.0\"\n  }\n}\n"));
    }

    #[test]
    fn test_set_overwrites_and_reports_changes() {
        let mut value = json!({ "scripts": { "postinstall": "echo" }, "name": 1 });
        assert!(set(&mut value, "scripts.postinstall", json!("pnpm run db:push")));
        assert!(!set(&mut value, "scripts.postinstall", json!("pnpm run db:push")));
        assert!(set(&mut value, "name.first", json!("x")));
        assert!(!set_default(&mut value, "scripts.postinstall.nested", json!(1)));
        assert_eq!(value["scripts"]["postinstall"], json!("pnpm run db:push"));
        assert_eq!(value["name"], json!({ "first": "x" }));
    }

    #[test]
    fn test_segment_paths_allow_dotted_keys() {
        let mut value = json!({});
        assert!(set_in(&mut value, &["dependencies", "socket.io"], json!("^4")));
        assert_eq!(get_in(&value, &["dependencies", "socket.io"]), Some(&json!("^4")));
    }

    #[test]
    fn test_blank_and_invalid_input() {
        let doc = JsonDocument::parse("").unwrap();
        assert_eq!(doc.print().unwrap(), "{}\n");
        assert!(matches!(JsonDocument::parse("{ nope"), Err(SyntaxError::Json(_))));
    }
}
