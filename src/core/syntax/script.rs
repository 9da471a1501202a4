// src/core/syntax/script.rs

//! Statement-level representation of a JavaScript/TypeScript module.
//!
//! Sources are parsed with tree-sitter (TypeScript grammar, which also accepts
//! plain JavaScript). Only the top-level statements are kept, each as the
//! exact source slice of its node plus the trivia in front of it. That is
//! enough to add imports and declarations without disturbing anything else
//! in the file.

use super::{SyntaxError, dedent, normalize_code};
use lazy_static::lazy_static;
use regex::Regex;
use tree_sitter::{Node, Parser, Tree};

lazy_static! {
    static ref NAMED_SPECIFIERS_RE: Regex = Regex::new(r"\{([^}]*)\}").unwrap();
}

/// What a top-level statement is, as far as transforms care.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// An `import` declaration and the module it imports from.
    Import {
        /// The module specifier.
        source: String,
    },
    /// Any `export` declaration.
    Export,
    /// Everything else.
    Other,
}

/// One top-level statement with the trivia (whitespace, comments) preceding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Whitespace and comments between the previous statement and this one.
    pub leading: String,
    /// The statement source, including its terminating semicolon when present.
    pub text: String,
    /// Classification of the statement.
    pub kind: StatementKind,
}

impl Statement {
    fn new(leading: String, text: String) -> Self {
        let kind = classify(&text);
        Self {
            leading,
            text,
            kind,
        }
    }
}

/// An import to add to a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSpec {
    /// `import name from 'source';`
    Default {
        /// Local binding.
        name: String,
        /// Module specifier.
        from: String,
    },
    /// `import { a, b } from 'source';`
    Named {
        /// Imported bindings.
        names: Vec<String>,
        /// Module specifier.
        from: String,
    },
    /// `import * as name from 'source';`
    Namespace {
        /// Local binding.
        name: String,
        /// Module specifier.
        from: String,
    },
    /// `import 'source';`
    SideEffect {
        /// Module specifier.
        from: String,
    },
}

impl ImportSpec {
    /// `import name from 'from';`
    pub fn default_import(name: &str, from: &str) -> Self {
        Self::Default {
            name: name.to_string(),
            from: from.to_string(),
        }
    }

    /// `import { names } from 'from';`
    pub fn named(names: &[&str], from: &str) -> Self {
        Self::Named {
            names: names.iter().map(|s| s.to_string()).collect(),
            from: from.to_string(),
        }
    }

    fn source(&self) -> &str {
        match self {
            Self::Default { from, .. }
            | Self::Named { from, .. }
            | Self::Namespace { from, .. }
            | Self::SideEffect { from } => from,
        }
    }

    fn render(&self, quote: char) -> String {
        let q = |s: &str| format!("{quote}{s}{quote}");
        match self {
            Self::Default { name, from } => format!("import {name} from {};", q(from)),
            Self::Named { names, from } => {
                format!("import {{ {} }} from {};", names.join(", "), q(from))
            }
            Self::Namespace { name, from } => format!("import * as {name} from {};", q(from)),
            Self::SideEffect { from } => format!("import {};", q(from)),
        }
    }
}

/// A parsed module: its statements plus the trivia after the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptAst {
    statements: Vec<Statement>,
    trailing: String,
    indent: String,
}

impl ScriptAst {
    /// Parses module source. Comments between statements are kept as trivia.
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        let tree = parse_tree(source)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(script_error(root, source));
        }

        let mut statements = Vec::new();
        let mut cursor = 0;
        let mut walker = root.walk();
        for node in root.children(&mut walker) {
            if node.is_extra() {
                continue;
            }
            let (start, end) = (node.start_byte(), node.end_byte());
            statements.push(Statement {
                leading: slice(source, cursor, start),
                text: slice(source, start, end),
                kind: classify_node(node, source),
            });
            cursor = end;
        }

        let indent = detect_indent(&statements);
        Ok(Self {
            statements,
            trailing: slice(source, cursor, source.len()),
            indent,
        })
    }

    /// Prints the module. Untouched statements come out exactly as parsed.
    pub fn print(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(&statement.leading);
            out.push_str(&statement.text);
        }
        out.push_str(&self.trailing);
        out
    }

    /// The top-level statements in source order.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Whether the module has no statements.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Sets the indentation applied to statements added afterwards.
    pub fn set_indent(&mut self, indent: &str) {
        self.indent = indent.to_string();
    }

    /// Whether a statement equivalent to `code` (ignoring formatting) exists.
    pub fn contains(&self, code: &str) -> bool {
        let needle = normalize_code(code);
        self.statements
            .iter()
            .any(|s| normalize_code(&s.text) == needle)
    }

    /// Whether any statement's text contains `fragment` verbatim.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.statements.iter().any(|s| s.text.contains(fragment))
    }

    /// Whether the module imports from `source`.
    pub fn imports_from(&self, source: &str) -> bool {
        self.statements
            .iter()
            .any(|s| matches!(&s.kind, StatementKind::Import { source: src } if src == source))
    }

    /// Adds an import unless an equivalent one is already present.
    ///
    /// Missing named bindings are merged into an existing `{ ... }` import from
    /// the same module.
    pub fn add_import(&mut self, spec: &ImportSpec) {
        let quote = self.quote_style();
        let existing: Vec<usize> = self
            .statements
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(&s.kind, StatementKind::Import { source } if source == spec.source()))
            .map(|(i, _)| i)
            .collect();

        match spec {
            ImportSpec::SideEffect { .. } if !existing.is_empty() => return,
            ImportSpec::Default { name, .. } | ImportSpec::Namespace { name, .. }
                if existing
                    .iter()
                    .filter_map(|i| self.statements.get(*i))
                    .any(|s| mentions_binding(&s.text, name)) =>
            {
                return;
            }
            ImportSpec::Named { names, .. } => {
                let missing: Vec<&String> = names
                    .iter()
                    .filter(|n| {
                        !existing
                            .iter()
                            .filter_map(|i| self.statements.get(*i))
                            .any(|s| mentions_binding(&s.text, n))
                    })
                    .collect();
                if missing.is_empty() {
                    return;
                }
                let mergeable = existing.iter().find_map(|i| {
                    let statement = self.statements.get(*i)?;
                    NAMED_SPECIFIERS_RE
                        .captures(&statement.text)
                        .and_then(|c| c.get(1))
                        .map(|m| (*i, m.start(), m.end()))
                });
                if let Some((index, start, end)) = mergeable
                    && let Some(statement) = self.statements.get_mut(index)
                {
                    let current = statement.text.get(start..end).unwrap_or_default().trim();
                    let mut merged: Vec<String> = current
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                    merged.extend(missing.into_iter().cloned());
                    statement
                        .text
                        .replace_range(start..end, &format!(" {} ", merged.join(", ")));
                    return;
                }
                let spec = ImportSpec::Named {
                    names: missing.into_iter().cloned().collect(),
                    from: spec.source().to_string(),
                };
                self.insert_import(spec.render(quote));
                return;
            }
            _ => {}
        }
        self.insert_import(spec.render(quote));
    }

    /// Parses `code` and adds every statement not already present.
    ///
    /// Imports go after the last existing import, everything else is appended.
    /// Applying the same code twice leaves the module unchanged.
    pub fn add_from_string(&mut self, code: &str) -> Result<(), SyntaxError> {
        let snippet = Self::parse(&dedent(code))?;
        for statement in snippet.statements {
            if self.contains(&statement.text) {
                continue;
            }
            match statement.kind {
                StatementKind::Import { .. } => self.insert_import(statement.text),
                _ => self.append(statement.text),
            }
        }
        Ok(())
    }

    /// Replaces the first statement that contains `fragment` with `code`.
    /// Returns whether a statement was replaced.
    pub fn replace_statement(&mut self, fragment: &str, code: &str) -> bool {
        let replacement = self.indent_block(&dedent(code));
        match self.statements.iter_mut().find(|s| s.text.contains(fragment)) {
            Some(statement) => {
                statement.kind = classify(&replacement);
                statement.text = replacement;
                true
            }
            None => false,
        }
    }

    fn append(&mut self, text: String) {
        let leading = if self.statements.is_empty() {
            self.indent.clone()
        } else {
            format!("\n\n{}", self.indent)
        };
        let text = self.indent_block(&text);
        self.statements.push(Statement::new(leading, text));
        self.ensure_trailing_newline();
    }

    fn insert_import(&mut self, text: String) {
        let last_import = self
            .statements
            .iter()
            .rposition(|s| matches!(s.kind, StatementKind::Import { .. }));
        if let Some(index) = last_import {
            let statement = Statement::new(format!("\n{}", self.indent), text);
            self.statements.insert(index + 1, statement);
            return;
        }

        // First import: it takes over the leading trivia of the current first
        // statement, which moves down behind a blank line.
        let leading = match self.statements.first_mut() {
            Some(first) => std::mem::replace(&mut first.leading, format!("\n\n{}", self.indent)),
            None => self.indent.clone(),
        };
        self.statements.insert(0, Statement::new(leading, text));
        self.ensure_trailing_newline();
    }

    fn indent_block(&self, text: &str) -> String {
        if self.indent.is_empty() {
            return text.to_string();
        }
        text.lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 || line.trim().is_empty() {
                    line.to_string()
                } else {
                    format!("{}{line}", self.indent)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn ensure_trailing_newline(&mut self) {
        if !self.trailing.contains('\n') {
            self.trailing.insert(0, '\n');
        }
    }

    fn quote_style(&self) -> char {
        self.statements
            .iter()
            .filter(|s| matches!(s.kind, StatementKind::Import { .. }))
            .find_map(|s| s.text.chars().find(|c| *c == '\'' || *c == '"'))
            .unwrap_or('\'')
    }
}

fn classify(text: &str) -> StatementKind {
    let Ok(tree) = parse_tree(text) else {
        return StatementKind::Other;
    };
    let root = tree.root_node();
    let mut walker = root.walk();
    let kind = root
        .children(&mut walker)
        .find(|node| !node.is_extra())
        .map(|node| classify_node(node, text))
        .unwrap_or(StatementKind::Other);
    kind
}

fn classify_node(node: Node<'_>, src: &str) -> StatementKind {
    match node.kind() {
        "import_statement" => {
            let source = node
                .child_by_field_name("source")
                .and_then(|s| s.utf8_text(src.as_bytes()).ok())
                .map(|s| s.trim_matches(['\'', '"']).to_string())
                .unwrap_or_default();
            StatementKind::Import { source }
        }
        "export_statement" => StatementKind::Export,
        _ => StatementKind::Other,
    }
}

fn parse_tree(source: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;
    parser.parse(source, None).ok_or_else(|| SyntaxError::Script {
        offset: 0,
        reason: "the parser produced no tree".to_string(),
    })
}

/// The first error or missing node, depth first.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut walker = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut walker).collect();
    children
        .into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

fn script_error(root: Node<'_>, source: &str) -> SyntaxError {
    let Some(node) = first_error(root) else {
        return SyntaxError::Script {
            offset: 0,
            reason: "unparsable module".to_string(),
        };
    };
    let reason = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
        let first_line = text.lines().next().unwrap_or_default();
        let excerpt: String = first_line.chars().take(24).collect();
        format!("unexpected '{excerpt}'")
    };
    SyntaxError::Script {
        offset: node.start_byte(),
        reason,
    }
}

fn mentions_binding(text: &str, name: &str) -> bool {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .any(|word| word == name)
}

fn detect_indent(statements: &[Statement]) -> String {
    statements
        .first()
        .and_then(|s| s.leading.rsplit('\n').next())
        .filter(|tail| tail.chars().all(|c| c == ' ' || c == '\t'))
        .map(str::to_string)
        .unwrap_or_default()
}

fn slice(source: &str, start: usize, end: usize) -> String {
    source.get(start..end).unwrap_or_default().to_string()
}
