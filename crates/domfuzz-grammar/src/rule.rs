//! In-memory representation of production rules

use std::sync::Arc;

use crate::tag::Tag;

/// Whether a rule came from a grammar line or a code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `<sym> = ...` production; expanding it returns the filled-in string.
    Grammar,
    /// A line from a `!begin lines` / `!begin helperlines` block; expanding
    /// it appends a statement to the context and returns a variable name.
    Code,
}

/// One element of a rule's right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Literal text between tags
    Text(String),
    /// A `<...>` tag to resolve at expansion time
    Tag(Tag),
}

/// A production rule.
///
/// Rules are shared via [`Arc`]: a code rule is registered under every
/// symbol it creates and (unless it is a helper line) under `line` as well.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Grammar production or code line
    pub kind: RuleKind,
    /// Right-hand side, in order
    pub parts: Vec<Part>,
    /// For grammar rules the single left-hand-side tag; for code rules the
    /// `new` tags in declaration order.
    pub creates: Vec<Tag>,
    /// Grammar rules only: some right-hand-side tag names the rule's own
    /// symbol.
    pub recursive: bool,
}

/// Shared handle to a rule.
pub type RuleRef = Arc<Rule>;

impl Rule {
    /// The tag that declares `symbol` for this rule: the left-hand side of
    /// a grammar rule, or the first matching `new` tag of a code rule.
    pub fn create_tag_for(&self, symbol: &str) -> Option<&Tag> {
        match self.kind {
            RuleKind::Grammar => self.creates.first(),
            RuleKind::Code => self.creates.iter().find(|tag| tag.name() == symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_rule_create_tag_matches_by_symbol() {
        let rule = Rule {
            kind: RuleKind::Code,
            parts: Vec::new(),
            creates: vec![Tag::parse("new A").unwrap(), Tag::parse("new B p=0.2").unwrap()],
            recursive: false,
        };
        assert_eq!(rule.create_tag_for("B").unwrap().name(), "B");
        assert!(rule.create_tag_for("C").is_none());
    }

    #[test]
    fn grammar_rule_create_tag_is_the_lhs() {
        let rule = Rule {
            kind: RuleKind::Grammar,
            parts: Vec::new(),
            creates: vec![Tag::parse("expr root").unwrap()],
            recursive: true,
        };
        assert_eq!(rule.create_tag_for("expr").unwrap().name(), "expr");
    }
}
