//! Element patterns for event subscriptions.
//!
//! A deliberately small selector language: a name test (`p`, `tei|p`,
//! `*`), class tests (`.figure`, matched against whitespace-separated
//! tokens of the no-namespace `class` attribute), and the descendant
//! (space) and child (`>`) combinators. Everything else in CSS —
//! attribute selectors, pseudo-classes, selector lists, sibling
//! combinators — is rejected at parse time so subscriptions fail loudly
//! instead of silently never firing.
//!
//! A bare name matches the local name in any namespace; `ns|name` pins
//! the namespace too.

use crate::errors::PatternError;
use vellum_dom::{Document, NodeId, QualName};

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Local(String),
    Qualified { ns: String, local: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compound {
    name: NameTest,
    classes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// A parsed pattern. Matching runs right to left from the candidate
/// element, walking up the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    parts: Vec<Compound>,
    // combinators[i] sits between parts[i] and parts[i + 1]
    combinators: Vec<Combinator>,
}

impl Pattern {
    pub fn parse(input: &str) -> Result<Pattern, PatternError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }
        for ch in trimmed.chars() {
            if matches!(ch, ',' | ':' | '[' | ']' | '(' | ')' | '+' | '~') {
                return Err(PatternError::Unsupported(ch));
            }
        }

        let mut parts = Vec::new();
        let mut combinators = Vec::new();
        let mut pending: Option<Combinator> = None;
        for token in tokenize(trimmed) {
            match token {
                Token::Child => {
                    if parts.is_empty() || pending.is_some() {
                        return Err(PatternError::Malformed("'>' needs a selector on both sides".into()));
                    }
                    pending = Some(Combinator::Child);
                }
                Token::Compound(text) => {
                    let compound = parse_compound(text)?;
                    if !parts.is_empty() {
                        combinators.push(pending.take().unwrap_or(Combinator::Descendant));
                    }
                    parts.push(compound);
                }
            }
        }
        if pending.is_some() {
            return Err(PatternError::Malformed("'>' needs a selector on both sides".into()));
        }
        Ok(Pattern { parts, combinators })
    }

    /// Does `node` match? Non-elements never match.
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if !doc.node(node).is_element() {
            return false;
        }
        self.match_from(doc, node, self.parts.len() - 1)
    }

    fn match_from(&self, doc: &Document, node: NodeId, part: usize) -> bool {
        if !self.parts[part].matches(doc, node) {
            return false;
        }
        if part == 0 {
            return true;
        }
        match self.combinators[part - 1] {
            Combinator::Child => match doc.parent(node) {
                Some(parent) if doc.node(parent).is_element() => self.match_from(doc, parent, part - 1),
                _ => false,
            },
            Combinator::Descendant => {
                // try every ancestor, so `a b` still matches through an
                // intermediate that also looks like `b`
                let mut cur = doc.parent(node);
                while let Some(ancestor) = cur {
                    if doc.node(ancestor).is_element() && self.match_from(doc, ancestor, part - 1) {
                        return true;
                    }
                    cur = doc.parent(ancestor);
                }
                false
            }
        }
    }
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(el) = doc.node(node).as_element() else {
            return false;
        };
        match &self.name {
            NameTest::Any => {}
            NameTest::Local(local) => {
                if el.name.local != *local {
                    return false;
                }
            }
            NameTest::Qualified { ns, local } => {
                if el.name.ns.as_deref() != Some(ns.as_str()) || el.name.local != *local {
                    return false;
                }
            }
        }
        if self.classes.is_empty() {
            return true;
        }
        let Some(value) = doc.attribute_value(node, &QualName::new("class")) else {
            return false;
        };
        self.classes
            .iter()
            .all(|class| value.split_whitespace().any(|token| token == class))
    }
}

enum Token<'a> {
    Compound(&'a str),
    Child,
}

fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (ix, ch) in input.char_indices() {
        if ch.is_whitespace() || ch == '>' {
            if let Some(s) = start.take() {
                tokens.push(Token::Compound(&input[s..ix]));
            }
            if ch == '>' {
                tokens.push(Token::Child);
            }
        } else if start.is_none() {
            start = Some(ix);
        }
    }
    if let Some(s) = start {
        tokens.push(Token::Compound(&input[s..]));
    }
    tokens
}

fn parse_compound(text: &str) -> Result<Compound, PatternError> {
    let mut segments = text.split('.');
    let head = segments.next().unwrap_or("");
    let name = if head.is_empty() || head == "*" {
        NameTest::Any
    } else if let Some((ns, local)) = head.split_once('|') {
        if !is_name(ns) || !is_name(local) {
            return Err(PatternError::Malformed(format!("bad name {head:?}")));
        }
        NameTest::Qualified {
            ns: ns.to_string(),
            local: local.to_string(),
        }
    } else {
        if !is_name(head) {
            return Err(PatternError::Malformed(format!("bad name {head:?}")));
        }
        NameTest::Local(head.to_string())
    };
    let mut classes = Vec::new();
    for class in segments {
        if !is_name(class) {
            return Err(PatternError::Malformed(format!("bad class {class:?}")));
        }
        classes.push(class.to_string());
    }
    if head.is_empty() && classes.is_empty() {
        return Err(PatternError::Malformed(format!("empty selector step {text:?}")));
    }
    Ok(Compound { name, classes })
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_dom::Document;

    fn fixture() -> (Document, NodeId, NodeId, NodeId, NodeId) {
        // <doc><div class="note wide"><p><hi/></p></div></doc> with hi in ns "tei"
        let mut doc = Document::new();
        let top = doc.create_element(QualName::new("doc"));
        let div = doc.create_element(QualName::new("div"));
        doc.set_attribute_value(div, &QualName::new("class"), Some("note wide"));
        let p = doc.create_element(QualName::new("p"));
        let hi = doc.create_element(QualName::namespaced("tei", "hi"));
        doc.append_child(top, div);
        doc.append_child(div, p);
        doc.append_child(p, hi);
        (doc, top, div, p, hi)
    }

    #[test]
    fn name_tests() {
        let (doc, _, div, p, hi) = fixture();
        assert!(Pattern::parse("p").unwrap().matches(&doc, p));
        assert!(!Pattern::parse("p").unwrap().matches(&doc, div));
        // bare name ignores the namespace
        assert!(Pattern::parse("hi").unwrap().matches(&doc, hi));
        assert!(Pattern::parse("tei|hi").unwrap().matches(&doc, hi));
        assert!(!Pattern::parse("other|hi").unwrap().matches(&doc, hi));
        assert!(Pattern::parse("*").unwrap().matches(&doc, hi));
    }

    #[test]
    fn class_tests_use_whitespace_tokens() {
        let (doc, _, div, p, _) = fixture();
        assert!(Pattern::parse(".note").unwrap().matches(&doc, div));
        assert!(Pattern::parse(".wide.note").unwrap().matches(&doc, div));
        assert!(Pattern::parse("div.note").unwrap().matches(&doc, div));
        assert!(!Pattern::parse(".not").unwrap().matches(&doc, div));
        assert!(!Pattern::parse(".note").unwrap().matches(&doc, p));
    }

    #[test]
    fn combinators() {
        let (doc, top, div, p, hi) = fixture();
        assert!(Pattern::parse("div p").unwrap().matches(&doc, p));
        assert!(Pattern::parse("doc hi").unwrap().matches(&doc, hi));
        assert!(Pattern::parse("doc > div").unwrap().matches(&doc, div));
        assert!(!Pattern::parse("doc > p").unwrap().matches(&doc, p));
        assert!(Pattern::parse("doc > div > p").unwrap().matches(&doc, p));
        assert!(!Pattern::parse("p div").unwrap().matches(&doc, div));
        assert!(!Pattern::parse("div").unwrap().matches(&doc, top));
    }

    #[test]
    fn descendant_backtracks_over_lookalike_ancestors() {
        // <a><b><b><c/></b></b></a>: `a b c` must match c even though the
        // nearer b has no a above another b
        let mut doc = Document::new();
        let a = doc.create_element(QualName::new("a"));
        let b1 = doc.create_element(QualName::new("b"));
        let b2 = doc.create_element(QualName::new("b"));
        let c = doc.create_element(QualName::new("c"));
        doc.append_child(a, b1);
        doc.append_child(b1, b2);
        doc.append_child(b2, c);
        assert!(Pattern::parse("a b c").unwrap().matches(&doc, c));
        assert!(Pattern::parse("a > b > b > c").unwrap().matches(&doc, c));
        assert!(!Pattern::parse("c b").unwrap().matches(&doc, b2));
    }

    #[test]
    fn unsupported_syntax_is_rejected() {
        for input in ["p, div", "p:first-child", "p[rend]", "p(x)", "p + div", "p ~ div"] {
            assert!(
                matches!(Pattern::parse(input), Err(PatternError::Unsupported(_))),
                "{input:?} should be rejected"
            );
        }
        assert!(matches!(Pattern::parse(""), Err(PatternError::Empty)));
        assert!(matches!(Pattern::parse("   "), Err(PatternError::Empty)));
        for input in [">", "p >", "> p", "p > > div", "a..b", "a.", "a|", "|a", "a|b|c", "a*"] {
            assert!(
                matches!(Pattern::parse(input), Err(PatternError::Malformed(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn text_nodes_never_match() {
        let mut doc = Document::new();
        let p = doc.create_element(QualName::new("p"));
        let t = doc.create_text("x");
        doc.append_child(p, t);
        assert!(!Pattern::parse("*").unwrap().matches(&doc, t));
    }
}
