// src/core/syntax/markup.rs

//! HTML-like element tree for component files and rendered pages.
//!
//! Elements keep their raw opening and closing tags, so printing a tree gives
//! back the exact input. Component dialect treats `{...}` as opaque template
//! expressions; the HTML dialect is lenient about unclosed and stray tags.

use super::script::ScriptAst;
use super::{SyntaxError, dedent, normalize_code};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// How strictly input is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Component source: braces are template expressions, tags must balance.
    Component,
    /// Rendered HTML: unclosed elements close implicitly, stray closers are kept as text.
    Html,
}

/// An attribute as written in the opening tag. Values are unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name (or the whole `{...}` for shorthand/spread attributes).
    pub name: String,
    /// Value without surrounding quotes, if any.
    pub value: Option<String>,
}

/// An element and its raw tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    /// Parsed attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<Node>,
    open_tag: String,
    close_tag: Option<String>,
}

impl Element {
    /// Value of the named attribute. Valueless attributes yield `Some("")`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_deref().unwrap_or_default())
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Whether the element can hold children.
    pub fn is_container(&self) -> bool {
        self.close_tag.is_some()
    }

    fn print_into(&self, out: &mut String) {
        out.push_str(&self.open_tag);
        print_nodes(&self.children, out);
        if let Some(close) = &self.close_tag {
            out.push_str(close);
        }
    }
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with its subtree.
    Element(Element),
    /// Raw text, including template expressions.
    Text(String),
    /// A comment or `<!...>` declaration, raw.
    Comment(String),
}

/// Where a fragment goes in [`MarkupDocument::splice`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InsertAnchor {
    /// After the last top-level node.
    #[default]
    End,
    /// Before the first top-level node.
    Start,
    /// Right before the first element matching the selector.
    Before(String),
    /// Right after the first element matching the selector.
    After(String),
    /// As the last children of the first element matching the selector.
    AppendTo(String),
}

/// A parsed markup tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupDocument {
    nodes: Vec<Node>,
}

impl MarkupDocument {
    /// Parses component source.
    pub fn parse(source: &str) -> Result<Self, SyntaxError> {
        Self::parse_with(source, Dialect::Component)
    }

    /// Parses a rendered HTML page.
    pub fn parse_html(source: &str) -> Result<Self, SyntaxError> {
        Self::parse_with(source, Dialect::Html)
    }

    /// Parses with an explicit dialect.
    pub fn parse_with(source: &str, dialect: Dialect) -> Result<Self, SyntaxError> {
        let mut parser = Parser {
            src: source,
            bytes: source.as_bytes(),
            pos: 0,
            dialect,
            open: Vec::new(),
        };
        let (nodes, _) = parser.parse_nodes()?;
        Ok(Self { nodes })
    }

    /// Top-level nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Prints the tree.
    pub fn print(&self) -> String {
        let mut out = String::new();
        print_nodes(&self.nodes, &mut out);
        out
    }

    /// Whether `fragment` already appears in the document, ignoring formatting.
    pub fn contains(&self, fragment: &str) -> bool {
        let needle = normalize_code(fragment);
        !needle.is_empty() && normalize_code(&self.print()).contains(&needle)
    }

    /// All elements matching `selector`, in document order.
    pub fn select_all(&self, selector: &str) -> Result<Vec<&Element>, SyntaxError> {
        let selector = Selector::parse(selector)?;
        let mut found = Vec::new();
        walk(&self.nodes, &mut Vec::new(), &mut Vec::new(), &mut |el, ancestors, _| {
            if selector.matches(el, ancestors) {
                found.push(el);
            }
        });
        Ok(found)
    }

    /// The first element matching `selector`.
    pub fn select_first(&self, selector: &str) -> Result<Option<&Element>, SyntaxError> {
        Ok(self.select_all(selector)?.into_iter().next())
    }

    /// Inserts `fragment` at `anchor`. Returns `false` (and changes nothing) when
    /// the fragment is already present.
    pub fn splice(&mut self, anchor: &InsertAnchor, fragment: &str) -> Result<bool, SyntaxError> {
        let fragment = dedent(fragment);
        if self.contains(&fragment) {
            return Ok(false);
        }
        let parsed = Self::parse(&fragment)?.nodes;

        match anchor {
            InsertAnchor::End => {
                let printed = self.print();
                if !printed.is_empty() && !printed.ends_with('\n') {
                    self.nodes.push(Node::Text("\n".to_string()));
                }
                self.nodes.extend(parsed);
                self.nodes.push(Node::Text("\n".to_string()));
            }
            InsertAnchor::Start => {
                let mut head = parsed;
                head.push(Node::Text("\n".to_string()));
                insert_all(&mut self.nodes, 0, head);
            }
            InsertAnchor::Before(selector) | InsertAnchor::After(selector) => {
                let path = self.find_path(selector)?;
                let (index, parent) = path
                    .split_last()
                    .ok_or_else(|| SyntaxError::NoMatch {
                        selector: selector.clone(),
                    })?;
                let siblings = self
                    .children_at_mut(parent)
                    .ok_or_else(|| SyntaxError::NoMatch {
                        selector: selector.clone(),
                    })?;
                if matches!(anchor, InsertAnchor::Before(_)) {
                    let mut nodes = parsed;
                    nodes.push(Node::Text("\n".to_string()));
                    insert_all(siblings, *index, nodes);
                } else {
                    let mut nodes = vec![Node::Text("\n".to_string())];
                    nodes.extend(parsed);
                    insert_all(siblings, index + 1, nodes);
                }
            }
            InsertAnchor::AppendTo(selector) => {
                let path = self.find_path(selector)?;
                let element = self
                    .element_at_mut(&path)
                    .ok_or_else(|| SyntaxError::NoMatch {
                        selector: selector.clone(),
                    })?;
                if !element.is_container() {
                    return Err(SyntaxError::Markup {
                        offset: 0,
                        reason: format!("<{}> cannot contain children", element.name),
                    });
                }
                element.children.push(Node::Text("\n".to_string()));
                element.children.extend(parsed);
                element.children.push(Node::Text("\n".to_string()));
            }
        }
        Ok(true)
    }

    fn find_path(&self, selector: &str) -> Result<Vec<usize>, SyntaxError> {
        let parsed = Selector::parse(selector)?;
        let mut found: Option<Vec<usize>> = None;
        walk(&self.nodes, &mut Vec::new(), &mut Vec::new(), &mut |el, ancestors, path| {
            if found.is_none() && parsed.matches(el, ancestors) {
                found = Some(path.to_vec());
            }
        });
        found.ok_or_else(|| SyntaxError::NoMatch {
            selector: selector.to_string(),
        })
    }

    fn children_at_mut(&mut self, path: &[usize]) -> Option<&mut Vec<Node>> {
        match path.split_last() {
            None => Some(&mut self.nodes),
            Some(_) => self.element_at_mut(path).map(|el| &mut el.children),
        }
    }

    fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut current = match self.nodes.get_mut(*first)? {
            Node::Element(el) => el,
            _ => return None,
        };
        for index in rest {
            current = match current.children.get_mut(*index)? {
                Node::Element(el) => el,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// A component file split into its instance script and the rest of its markup.
#[derive(Debug, Clone)]
pub struct ComponentFile {
    /// Body of the instance `<script>` block (empty when the file has none).
    pub script: ScriptAst,
    /// The whole markup tree. The instance script element's body is replaced by
    /// `script` when printing.
    pub markup: MarkupDocument,
    /// Whether the parsed source had an instance script.
    has_script: bool,
    typescript: bool,
}

impl ComponentFile {
    /// Parses a component. `typescript` decides the `lang` of a script block
    /// created for files that lack one.
    pub fn parse(source: &str, typescript: bool) -> Result<Self, SyntaxError> {
        let markup = MarkupDocument::parse(source)?;
        let script_index = instance_script_index(&markup.nodes);

        let script = match script_index.and_then(|i| markup.nodes.get(i)) {
            Some(Node::Element(el)) => ScriptAst::parse(&el.text_content())?,
            _ => {
                let mut script = ScriptAst::default();
                script.set_indent("\t");
                script
            }
        };

        Ok(Self {
            script,
            markup,
            has_script: script_index.is_some(),
            typescript,
        })
    }

    /// Prints the component with the current script body.
    ///
    /// The instance script is looked up again here: splices may have moved it.
    pub fn print(&self) -> String {
        let index = instance_script_index(&self.markup.nodes).filter(|_| self.has_script);
        let Some(index) = index else {
            let markup = self.markup.print();
            if self.script.is_empty() {
                return markup;
            }
            let open = if self.typescript {
                "<script lang=\"ts\">"
            } else {
                "<script>"
            };
            let mut out = format!("{open}\n{}</script>\n", self.script.print());
            if !markup.is_empty() {
                out.push('\n');
                out.push_str(&markup);
            }
            return out;
        };

        let mut out = String::new();
        for (i, node) in self.markup.nodes.iter().enumerate() {
            match node {
                Node::Element(el) if i == index => {
                    out.push_str(&el.open_tag);
                    out.push_str(&self.script.print());
                    if let Some(close) = &el.close_tag {
                        out.push_str(close);
                    }
                }
                other => print_nodes(std::slice::from_ref(other), &mut out),
            }
        }
        out
    }
}

/// Position of the top-level `<script>` that is not a module script.
fn instance_script_index(nodes: &[Node]) -> Option<usize> {
    nodes.iter().position(|node| {
        matches!(node, Node::Element(el)
            if el.name == "script"
                && el.attr("context") != Some("module")
                && el.attr("module").is_none())
    })
}

fn insert_all(target: &mut Vec<Node>, at: usize, nodes: Vec<Node>) {
    let tail = target.split_off(at.min(target.len()));
    target.extend(nodes);
    target.extend(tail);
}

fn print_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => el.print_into(out),
            Node::Text(text) | Node::Comment(text) => out.push_str(text),
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => collect_text(&el.children, out),
            Node::Text(text) => out.push_str(text),
            Node::Comment(_) => {}
        }
    }
}

fn walk<'a>(
    nodes: &'a [Node],
    ancestors: &mut Vec<&'a Element>,
    path: &mut Vec<usize>,
    visit: &mut dyn FnMut(&'a Element, &[&'a Element], &[usize]),
) {
    for (i, node) in nodes.iter().enumerate() {
        if let Node::Element(el) = node {
            path.push(i);
            visit(el, ancestors, path);
            ancestors.push(el);
            walk(&el.children, ancestors, path, visit);
            ancestors.pop();
            path.pop();
        }
    }
}

// --- PARSER ---

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    dialect: Dialect,
    open: Vec<String>,
}

impl Parser<'_> {
    fn peek(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn rest(&self) -> &str {
        self.src.get(self.pos..).unwrap_or_default()
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.src.get(start..end).unwrap_or_default().to_string()
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> SyntaxError {
        SyntaxError::Markup {
            offset,
            reason: reason.into(),
        }
    }

    /// Parses siblings until the closing tag of the innermost open element.
    /// Returns the nodes and the raw closing tag, if one was consumed.
    fn parse_nodes(&mut self) -> Result<(Vec<Node>, Option<String>), SyntaxError> {
        let mut nodes = Vec::new();

        while self.pos < self.bytes.len() {
            let start = self.pos;
            if self.rest().starts_with("<!--") {
                let end = self
                    .rest()
                    .find("-->")
                    .ok_or(SyntaxError::UnterminatedComment { offset: start })?;
                self.pos += end + 3;
                nodes.push(Node::Comment(self.slice(start, self.pos)));
            } else if self.rest().starts_with("<!") || self.rest().starts_with("<?") {
                let end = self
                    .rest()
                    .find('>')
                    .ok_or_else(|| self.error(start, "unterminated declaration"))?;
                self.pos += end + 1;
                nodes.push(Node::Comment(self.slice(start, self.pos)));
            } else if self.peek(0) == b'<' && self.peek(1) == b'/' {
                let end = self
                    .rest()
                    .find('>')
                    .ok_or_else(|| self.error(start, "unterminated closing tag"))?;
                let raw = self.slice(start, start + end + 1);
                let name = raw
                    .trim_start_matches("</")
                    .trim_end_matches('>')
                    .trim()
                    .to_ascii_lowercase();

                if self.open.last() == Some(&name) {
                    self.pos += end + 1;
                    return Ok((nodes, Some(raw)));
                }
                match self.dialect {
                    Dialect::Component => {
                        return Err(self.error(start, format!("unexpected closing tag </{name}>")));
                    }
                    Dialect::Html if self.open.contains(&name) => {
                        // Closes an ancestor: this element ends implicitly.
                        return Ok((nodes, None));
                    }
                    Dialect::Html => {
                        self.pos += end + 1;
                        nodes.push(Node::Text(raw));
                    }
                }
            } else if self.peek(0) == b'<' && self.peek(1).is_ascii_alphabetic() {
                nodes.push(Node::Element(self.parse_element()?));
            } else {
                self.scan_text()?;
                nodes.push(Node::Text(self.slice(start, self.pos)));
            }
        }

        match (self.dialect, self.open.last()) {
            (Dialect::Component, Some(name)) => {
                Err(self.error(self.pos, format!("<{name}> is never closed")))
            }
            _ => Ok((nodes, None)),
        }
    }

    fn parse_element(&mut self) -> Result<Element, SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'>' => break,
                q @ (b'"' | b'\'') => self.skip_quoted(q)?,
                b'{' if self.dialect == Dialect::Component => self.skip_braces()?,
                _ => self.pos += 1,
            }
        }
        if self.peek(0) != b'>' {
            return Err(self.error(start, "unterminated tag"));
        }
        self.pos += 1;

        let open_tag = self.slice(start, self.pos);
        let inner = open_tag
            .get(1..open_tag.len() - 1)
            .unwrap_or_default()
            .trim_end_matches('/');
        let name_end = inner
            .find(|c: char| c.is_whitespace() || c == '/')
            .unwrap_or(inner.len());
        let name = inner.get(..name_end).unwrap_or_default().to_ascii_lowercase();
        let attributes = parse_attributes(inner.get(name_end..).unwrap_or_default(), self.dialect);
        let self_closing = open_tag.ends_with("/>");

        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            return Ok(Element {
                name,
                attributes,
                children: Vec::new(),
                open_tag,
                close_tag: None,
            });
        }

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let closer = format!("</{name}");
            let body_start = self.pos;
            let Some(offset) = find_ignore_case(self.rest(), &closer) else {
                return match self.dialect {
                    Dialect::Component => Err(self.error(start, format!("<{name}> is never closed"))),
                    Dialect::Html => {
                        self.pos = self.bytes.len();
                        Ok(Element {
                            name,
                            attributes,
                            children: vec![Node::Text(self.slice(body_start, self.pos))],
                            open_tag,
                            close_tag: None,
                        })
                    }
                };
            };
            let body_end = body_start + offset;
            let close_end = self
                .src
                .get(body_end..)
                .and_then(|s| s.find('>'))
                .map(|i| body_end + i + 1)
                .ok_or_else(|| self.error(body_end, "unterminated closing tag"))?;
            self.pos = close_end;
            let body = self.slice(body_start, body_end);
            return Ok(Element {
                name,
                attributes,
                children: if body.is_empty() { Vec::new() } else { vec![Node::Text(body)] },
                open_tag,
                close_tag: Some(self.slice(body_end, close_end)),
            });
        }

        self.open.push(name.clone());
        let (children, close_tag) = self.parse_nodes()?;
        self.open.pop();
        Ok(Element {
            name,
            attributes,
            children,
            open_tag,
            // Implicitly closed HTML elements still accept appended children.
            close_tag: close_tag.or_else(|| Some(String::new())),
        })
    }

    fn scan_text(&mut self) -> Result<(), SyntaxError> {
        // Always consume at least one byte so a lone '<' becomes text.
        let mut first = true;
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'<' if !first
                    && (self.peek(1).is_ascii_alphabetic() || matches!(self.peek(1), b'/' | b'!' | b'?')) =>
                {
                    return Ok(());
                }
                b'{' if self.dialect == Dialect::Component => self.skip_braces()?,
                _ => self.advance_char(),
            }
            first = false;
        }
        Ok(())
    }

    fn advance_char(&mut self) {
        let width = self
            .rest()
            .chars()
            .next()
            .map(char::len_utf8)
            .unwrap_or(1);
        self.pos += width;
    }

    fn skip_quoted(&mut self, quote: u8) -> Result<(), SyntaxError> {
        let start = self.pos;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            if self.peek(0) == quote {
                self.pos += 1;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(SyntaxError::UnterminatedString { offset: start })
    }

    fn skip_braces(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let mut depth = 0usize;
        while self.pos < self.bytes.len() {
            match self.peek(0) {
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                q @ (b'"' | b'\'' | b'`') => self.skip_quoted(q)?,
                _ => self.pos += 1,
            }
        }
        Err(self.error(start, "unbalanced braces"))
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn parse_attributes(source: &str, dialect: Dialect) -> Vec<Attribute> {
    let chars: Vec<char> = source.chars().collect();
    let mut attributes = Vec::new();
    let mut i = 0;

    let take_until = |i: &mut usize, stop: &dyn Fn(char) -> bool| -> String {
        let start = *i;
        while chars.get(*i).is_some_and(|c| !stop(*c)) {
            *i += 1;
        }
        chars.get(start..*i).map(|s| s.iter().collect()).unwrap_or_default()
    };
    let take_braced = |i: &mut usize| -> String {
        let start = *i;
        let mut depth = 0usize;
        while let Some(c) = chars.get(*i) {
            *i += 1;
            match c {
                '{' => depth += 1,
                '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
        }
        chars.get(start..*i).map(|s| s.iter().collect()).unwrap_or_default()
    };

    while i < chars.len() {
        match chars.get(i) {
            Some(c) if c.is_whitespace() || *c == '/' => i += 1,
            Some('{') if dialect == Dialect::Component => {
                let name = take_braced(&mut i);
                attributes.push(Attribute { name, value: None });
            }
            Some(_) => {
                let name = take_until(&mut i, &|c| c.is_whitespace() || c == '=' || c == '/');
                let value = if chars.get(i) == Some(&'=') {
                    i += 1;
                    match chars.get(i) {
                        Some(q @ ('"' | '\'')) => {
                            let q = *q;
                            i += 1;
                            let value = take_until(&mut i, &|c| c == q);
                            i += 1;
                            Some(value)
                        }
                        Some('{') if dialect == Dialect::Component => Some(take_braced(&mut i)),
                        _ => Some(take_until(&mut i, &|c| c.is_whitespace())),
                    }
                } else {
                    None
                };
                if !name.is_empty() {
                    attributes.push(Attribute { name, value });
                }
            }
            None => break,
        }
    }
    attributes
}

// --- SELECTORS ---

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Contains(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, AttrOp)>,
}

impl Compound {
    fn matches(&self, el: &Element) -> bool {
        if self.tag.as_ref().is_some_and(|t| !t.eq_ignore_ascii_case(&el.name)) {
            return false;
        }
        if self.id.as_ref().is_some_and(|id| el.attr("id") != Some(id.as_str())) {
            return false;
        }
        let classes: Vec<&str> = el.attr("class").unwrap_or_default().split_whitespace().collect();
        if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
            return false;
        }
        self.attributes.iter().all(|(name, op)| match (el.attr(name), op) {
            (None, _) => false,
            (Some(_), AttrOp::Exists) => true,
            (Some(v), AttrOp::Equals(expected)) => v == expected,
            (Some(v), AttrOp::Prefix(prefix)) => v.starts_with(prefix.as_str()),
            (Some(v), AttrOp::Contains(part)) => v.contains(part.as_str()),
        })
    }
}

/// A parsed selector: compounds joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selector {
    parts: Vec<Compound>,
}

impl Selector {
    fn parse(selector: &str) -> Result<Self, SyntaxError> {
        let unsupported = || SyntaxError::Selector {
            selector: selector.to_string(),
        };

        let mut parts = Vec::new();
        for token in split_outside_brackets(selector) {
            let mut compound = Compound::default();
            let chars: Vec<char> = token.chars().collect();
            let mut i = 0;
            let ident = |i: &mut usize| -> String {
                let start = *i;
                while chars
                    .get(*i)
                    .is_some_and(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                {
                    *i += 1;
                }
                chars.get(start..*i).map(|s| s.iter().collect()).unwrap_or_default()
            };

            while let Some(c) = chars.get(i) {
                match c {
                    '*' if i == 0 => i += 1,
                    '#' => {
                        i += 1;
                        compound.id = Some(ident(&mut i)).filter(|s| !s.is_empty());
                        if compound.id.is_none() {
                            return Err(unsupported());
                        }
                    }
                    '.' => {
                        i += 1;
                        let class = ident(&mut i);
                        if class.is_empty() {
                            return Err(unsupported());
                        }
                        compound.classes.push(class);
                    }
                    '[' => {
                        let close = chars
                            .iter()
                            .skip(i)
                            .position(|c| *c == ']')
                            .map(|p| p + i)
                            .ok_or_else(unsupported)?;
                        let body: String = chars
                            .get(i + 1..close)
                            .map(|s| s.iter().collect())
                            .unwrap_or_default();
                        compound.attributes.push(parse_attr_selector(&body).ok_or_else(unsupported)?);
                        i = close + 1;
                    }
                    c if c.is_alphabetic() && i == 0 => {
                        compound.tag = Some(ident(&mut i).to_ascii_lowercase());
                    }
                    _ => return Err(unsupported()),
                }
            }
            parts.push(compound);
        }

        if parts.is_empty() {
            return Err(unsupported());
        }
        Ok(Self { parts })
    }

    /// `ancestors` runs from the root down to the element's parent.
    fn matches(&self, el: &Element, ancestors: &[&Element]) -> bool {
        let Some((last, rest)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(el) {
            return false;
        }
        let mut remaining = ancestors.iter().rev();
        rest.iter()
            .rev()
            .all(|part| remaining.any(|ancestor| part.matches(ancestor)))
    }
}

fn split_outside_brackets(selector: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for c in selector.trim().chars() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            c if c.is_whitespace() && !in_brackets => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_attr_selector(body: &str) -> Option<(String, AttrOp)> {
    let unquote = |v: &str| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    if let Some((name, value)) = body.split_once("^=") {
        return Some((name.trim().to_string(), AttrOp::Prefix(unquote(value))));
    }
    if let Some((name, value)) = body.split_once("*=") {
        return Some((name.trim().to_string(), AttrOp::Contains(unquote(value))));
    }
    if let Some((name, value)) = body.split_once('=') {
        return Some((name.trim().to_string(), AttrOp::Equals(unquote(value))));
    }
    let name = body.trim();
    if name.is_empty() || name.contains(|c: char| c.is_whitespace()) {
        return None;
    }
    Some((name.to_string(), AttrOp::Exists))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "<script lang=\"ts\">\n\texport let data;\n</script>\n\n<!-- users -->\n<main class=\"app wide\">\n\t<h1 id=\"title\">Users {data.count}</h1>\n\t<img src=\"a.png\">\n\t<Counter on:click={() => count++} />\n</main>\n";

    #[test]
    fn test_parse_print_is_lossless() {
        let doc = MarkupDocument::parse(PAGE).unwrap();
        assert_eq!(doc.print(), PAGE);
    }

    #[test]
    fn test_selectors() {
        let doc = MarkupDocument::parse(PAGE).unwrap();
        let title = doc.select_first("main h1#title").unwrap().unwrap();
        assert_eq!(title.text_content(), "Users {data.count}");
        assert_eq!(doc.select_all(".wide").unwrap().len(), 1);
        assert_eq!(doc.select_all("[src^=a]").unwrap().len(), 1);
        assert_eq!(doc.select_all("[src*='png']").unwrap().len(), 1);
        assert_eq!(doc.select_all("[src=b.png]").unwrap().len(), 0);
        assert_eq!(doc.select_all("section h1").unwrap().len(), 0);
        assert!(matches!(
            doc.select_all("main > h1"),
            Err(SyntaxError::Selector { .. })
        ));
    }

    #[test]
    fn test_splice_anchors_and_idempotence() {
        let mut doc = MarkupDocument::parse("<main>\n\t<h1>Hi</h1>\n</main>\n").unwrap();
        assert!(doc.splice(&InsertAnchor::AppendTo("main".into()), "<p>one</p>").unwrap());
        assert!(doc.splice(&InsertAnchor::Before("h1".into()), "<nav></nav>").unwrap());
        assert!(doc.splice(&InsertAnchor::End, "<footer />").unwrap());
        let once = doc.print();
        assert_eq!(
            once,
            "<main>\n\t<nav></nav>\n<h1>Hi</h1>\n\n<p>one</p>\n</main>\n<footer />\n"
        );

        assert!(!doc.splice(&InsertAnchor::End, "<footer />").unwrap());
        assert!(!doc.splice(&InsertAnchor::AppendTo("main".into()), "<p>one</p>").unwrap());
        assert_eq!(doc.print(), once);

        assert!(matches!(
            doc.splice(&InsertAnchor::After("aside".into()), "<b></b>"),
            Err(SyntaxError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_each_block_fragment_is_queryable() {
        let mut doc = MarkupDocument::parse("").unwrap();
        doc.splice(
            &InsertAnchor::End,
            "{#each data.users as user}<span data-test-id=\"user-id-{user.id}\">{user.id} {user.name}</span>{/each}",
        )
        .unwrap();
        let span = doc.select_first("[data-test-id]").unwrap().unwrap();
        assert_eq!(span.attr("data-test-id"), Some("user-id-{user.id}"));
    }

    #[test]
    fn test_component_script_is_edited_in_place() {
        let mut component = ComponentFile::parse(PAGE, true).unwrap();
        component
            .script
            .add_from_string("import { page } from '$app/stores';")
            .unwrap();
        let printed = component.print();
        assert!(printed.starts_with("<script lang=\"ts\">\n\timport { page } from '$app/stores';\n\n\texport let data;\n</script>"));
        assert!(printed.ends_with(PAGE.split_once("</script>").unwrap().1));
    }

    #[test]
    fn test_script_edits_survive_top_level_splices() {
        let mut component = ComponentFile::parse("<script>\n\tlet a = 1;\n</script>\n\n<h1>hi</h1>\n", false).unwrap();
        component.script.add_from_string("let b = 2;").unwrap();
        component.markup.splice(&InsertAnchor::Start, "<nav></nav>").unwrap();
        component.markup.splice(&InsertAnchor::Before("h1".into()), "<header></header>").unwrap();
        component.markup.splice(&InsertAnchor::After("h1".into()), "<footer></footer>").unwrap();
        assert_eq!(
            component.print(),
            "<nav></nav>\n<script>\n\tlet a = 1;\n\n\tlet b = 2;\n</script>\n\n<header></header>\n<h1>hi</h1>\n<footer></footer>\n"
        );
    }

    #[test]
    fn test_component_without_script_gets_one() {
        let mut component = ComponentFile::parse("<h1>Hi</h1>\n", true).unwrap();
        assert_eq!(component.print(), "<h1>Hi</h1>\n");
        component.script.add_from_string("export let data;").unwrap();
        assert_eq!(
            component.print(),
            "<script lang=\"ts\">\n\texport let data;\n</script>\n\n<h1>Hi</h1>\n"
        );
    }

    #[test]
    fn test_html_dialect_is_lenient() {
        let html = "<!doctype html><html><body><ul><li>a<li>b</ul><p>x</span></p></body></html>";
        let doc = MarkupDocument::parse_html(html).unwrap();
        assert_eq!(doc.select_all("ul li").unwrap().len(), 2);
        assert_eq!(doc.print(), html);
        assert!(MarkupDocument::parse("<p>x</span>").is_err());
        assert!(MarkupDocument::parse("<p>x").is_err());
    }
}
