//! Minimal CSS selector engine over any `Page`.
//!
//! Supports what the discovery strategies need and nothing more:
//! `tag`, `*`, `.class`, `[attr]`, `[attr=value]` / `[attr="value"]`,
//! compounds like `img.lazy`, the descendant combinator (`.read-box img`)
//! and comma-separated lists. Parsing is tolerant: a malformed part is
//! dropped rather than failing the whole selector.

use super::{has_class, NodeId, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Class(String),
    HasAttr(String),
    AttrEquals(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    conditions: Vec<Condition>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.conditions.is_empty()
    }

    fn matches(&self, page: &dyn Page, node: NodeId) -> bool {
        if let Some(tag) = &self.tag {
            if page.tag_name(node) != *tag {
                return false;
            }
        }
        self.conditions.iter().all(|c| match c {
            Condition::Class(class) => has_class(page, node, class),
            Condition::HasAttr(name) => page.attribute(node, name).is_some(),
            Condition::AttrEquals(name, value) => {
                page.attribute(node, name).as_deref() == Some(value.as_str())
            }
        })
    }
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Each alternative is a chain of compounds joined by descendant combinators.
    alternatives: Vec<Vec<Compound>>,
}

impl Selector {
    pub fn new(source: &str) -> Self {
        let alternatives = split_top_level(source)
            .into_iter()
            .map(parse_complex)
            .filter(|chain| !chain.is_empty())
            .collect();
        Self { alternatives }
    }

    pub fn matches(&self, page: &dyn Page, node: NodeId) -> bool {
        self.alternatives
            .iter()
            .any(|chain| matches_chain(page, node, chain))
    }
}

fn matches_chain(page: &dyn Page, node: NodeId, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !last.matches(page, node) {
        return false;
    }
    // Descendant-only chains: greedy nearest-ancestor matching is exact.
    let mut current = page.parent(node);
    for compound in ancestors.iter().rev() {
        loop {
            match current {
                Some(n) if compound.matches(page, n) => {
                    current = page.parent(n);
                    break;
                }
                Some(n) => current = page.parent(n),
                None => return false,
            }
        }
    }
    true
}

/// Split on commas that are not inside `[...]`.
fn split_top_level(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in source.char_indices() {
        match (ch, quote) {
            ('"' | '\'', None) if depth > 0 => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            ('[', None) => depth += 1,
            (']', None) => depth = depth.saturating_sub(1),
            (',', None) if depth == 0 => {
                parts.push(&source[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn parse_complex(source: &str) -> Vec<Compound> {
    let mut chain = Vec::new();
    let mut current = Compound::default();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            if !current.is_empty() {
                chain.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }
        match ch {
            '.' => {
                let (ident, next) = read_ident(&chars, i + 1);
                if !ident.is_empty() {
                    current.conditions.push(Condition::Class(ident));
                }
                i = next;
            }
            '[' => {
                let end = find_bracket_end(&chars, i + 1);
                let inner: String = chars[i + 1..end].iter().collect();
                if let Some(cond) = parse_attr(&inner) {
                    current.conditions.push(cond);
                } else {
                    log::debug!("[SELECTOR] Dropping malformed attribute part [{}]", inner);
                }
                i = (end + 1).min(chars.len());
            }
            '*' => i += 1,
            ':' => {
                // Pseudo-classes are unsupported: skip the name and any argument.
                let mut next = i;
                while next < chars.len() && chars[next] == ':' {
                    next += 1;
                }
                let (_, mut next) = read_ident(&chars, next);
                if next < chars.len() && chars[next] == '(' {
                    while next < chars.len() && chars[next] != ')' {
                        next += 1;
                    }
                    next += 1;
                }
                i = next.min(chars.len());
            }
            _ => {
                let (ident, next) = read_ident(&chars, i);
                if ident.is_empty() {
                    // Other combinators (`>`, `+`, `~`) degrade to descendant.
                    if matches!(ch, '>' | '+' | '~') && !current.is_empty() {
                        chain.push(std::mem::take(&mut current));
                    }
                    i += 1;
                } else {
                    current.tag = Some(ident.to_ascii_lowercase());
                    i = next;
                }
            }
        }
    }
    if !current.is_empty() {
        chain.push(current);
    }
    chain
}

fn read_ident(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '-' || chars[end] == '_') {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

fn find_bracket_end(chars: &[char], start: usize) -> usize {
    let mut quote: Option<char> = None;
    for (offset, &ch) in chars[start..].iter().enumerate() {
        match (ch, quote) {
            ('"' | '\'', None) => quote = Some(ch),
            (c, Some(q)) if c == q => quote = None,
            (']', None) => return start + offset,
            _ => {}
        }
    }
    chars.len()
}

fn parse_attr(inner: &str) -> Option<Condition> {
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }
    match inner.split_once('=') {
        None => Some(Condition::HasAttr(inner.to_ascii_lowercase())),
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            Some(Condition::AttrEquals(
                name.to_ascii_lowercase(),
                value.to_string(),
            ))
        }
    }
}
