//! A small subset of XPath 1.0 over the child axis.
//!
//! Supported: absolute (`/web-app/filter`) and relative (`./param-value`, `init-param`, `.`)
//! location paths, name tests and `*`, predicates of the form `[child='literal']` and
//! `[@attr='literal']` (several per step), and a trailing `text()` step.

use crate::document::{Document, Node};
use crate::element::Element;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// Some child element with this name has this string value.
    Child(String, String),
    Attribute(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A compiled path expression.
///
/// ```
/// use webxml_filter::{Document, PathExpr};
///
/// let doc = Document::parse_str(
///     "<web-app><filter><filter-name>f</filter-name></filter></web-app>",
/// ).unwrap();
/// let expr = PathExpr::compile("/web-app/filter[filter-name='f']").unwrap();
/// assert!(expr.select_first(&doc, doc.container()).is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    absolute: bool,
    steps: Vec<Step>,
    text: bool, // ends with text()
}

impl PathExpr {
    /// # Errors
    ///
    /// - [`Error::MalformedPath`]: The expression uses syntax outside the supported subset.
    pub fn compile(expr: &str) -> Result<PathExpr> {
        let malformed = |why: &str| Error::MalformedPath(format!("{}: {}", why, expr));
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty expression"));
        }
        let (absolute, body) = match trimmed.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if body.starts_with('/') {
            return Err(malformed("descendant axis is not supported"));
        }

        let raw_steps = split_steps(body).ok_or_else(|| malformed("unbalanced brackets or quotes"))?;
        let mut steps = Vec::new();
        let mut text = false;
        let count = raw_steps.len();
        for (i, raw) in raw_steps.into_iter().enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(malformed("empty step"));
            }
            if raw == "." {
                if absolute {
                    return Err(malformed("'.' in an absolute path"));
                }
                continue;
            }
            if raw == "text()" {
                if i + 1 != count {
                    return Err(malformed("text() must be the last step"));
                }
                text = true;
                continue;
            }
            steps.push(parse_step(raw).ok_or_else(|| malformed("cannot parse step"))?);
        }
        if absolute && steps.is_empty() {
            return Err(malformed("absolute path without steps"));
        }
        Ok(PathExpr {
            absolute,
            steps,
            text,
        })
    }

    /// All matching elements in document order.
    ///
    /// Absolute paths ignore `context` and start from the document's top-level nodes.
    pub fn select(&self, document: &Document, context: Element) -> Vec<Element> {
        let mut current = if self.absolute {
            vec![document.container()]
        } else {
            vec![context]
        };
        for step in &self.steps {
            let mut next = Vec::new();
            for elem in current {
                for child in elem.child_elements(document) {
                    if step.matches(document, child) {
                        next.push(child);
                    }
                }
            }
            current = next;
        }
        current
    }

    pub fn select_first(&self, document: &Document, context: Element) -> Option<Element> {
        self.select(document, context).into_iter().next()
    }

    /// String value of the first match. With a trailing `text()`, the first text node
    /// of the first match. Empty if nothing matches.
    pub fn string(&self, document: &Document, context: Element) -> String {
        let first = match self.select_first(document, context) {
            Some(elem) => elem,
            None => return String::new(),
        };
        if !self.text {
            return first.text_content(document);
        }
        first
            .children(document)
            .iter()
            .find_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl Step {
    fn matches(&self, document: &Document, elem: Element) -> bool {
        let name_ok = match &self.test {
            NameTest::Any => true,
            NameTest::Name(name) => elem.full_name(document) == name,
        };
        name_ok && self.predicates.iter().all(|p| p.matches(document, elem))
    }
}

impl Predicate {
    fn matches(&self, document: &Document, elem: Element) -> bool {
        match self {
            Predicate::Child(name, value) => elem
                .find_all(document, name)
                .iter()
                .any(|child| child.text_content(document) == *value),
            Predicate::Attribute(name, value) => {
                elem.attribute(document, name) == Some(value.as_str())
            }
        }
    }
}

/// Quote `value` as a literal for substitution into an expression.
/// `None` if it contains both kinds of quote.
pub fn literal(value: &str) -> Option<String> {
    if !value.contains('\'') {
        Some(format!("'{}'", value))
    } else if !value.contains('"') {
        Some(format!("\"{}\"", value))
    } else {
        None
    }
}

// Splits on '/' outside of predicates and quotes.
fn split_steps(body: &str) -> Option<Vec<&str>> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.checked_sub(1)?,
            (None, '/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    steps.push(&body[start..]);
    Some(steps)
}

fn parse_step(raw: &str) -> Option<Step> {
    let (name, mut rest) = match raw.find('[') {
        Some(pos) => (raw[..pos].trim(), &raw[pos..]),
        None => (raw, ""),
    };
    let test = match name {
        "*" => NameTest::Any,
        name if is_name(name) => NameTest::Name(name.to_string()),
        _ => return None,
    };
    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let inner_start = rest.strip_prefix('[')?;
        let end = predicate_end(inner_start)?;
        predicates.push(parse_predicate(&inner_start[..end])?);
        rest = inner_start[end + 1..].trim_start();
    }
    Some(Step { test, predicates })
}

// Index of the ']' closing a predicate, skipping quoted text.
fn predicate_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(inner: &str) -> Option<Predicate> {
    let (lhs, rhs) = inner.split_once('=')?;
    let lhs = lhs.trim();
    let rhs = rhs.trim();
    let value = unquote(rhs)?;
    match lhs.strip_prefix('@') {
        Some(attr) if is_name(attr) => Some(Predicate::Attribute(attr.to_string(), value)),
        Some(_) => None,
        None if is_name(lhs) => Some(Predicate::Child(lhs.to_string(), value)),
        None => None,
    }
}

fn unquote(s: &str) -> Option<String> {
    let quote = s.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let inner = s.strip_prefix(quote)?.strip_suffix(quote)?;
    if inner.contains(quote) {
        return None;
    }
    Some(inner.to_string())
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
