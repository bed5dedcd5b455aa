/*!
AST for parsed regular expressions.

Node kinds are a single sum type so that every analysis dispatch is
exhaustive. Each node carries the span of the source text it was parsed
from; spans are propagated into the automaton states and ultimately into
the hotspot reported by the diagnostics.
*/

use crate::flags::Flags;
use crate::parser::charset::CharSet;

/// A byte range into the original pattern source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both operands.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Anchor kinds. `Start`/`End` are `^`/`$` outside multiline mode,
/// `LineStart`/`LineEnd` the multiline variants, `TextStart`/`TextEnd`
/// are `\A`/`\Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    Start,
    End,
    LineStart,
    LineEnd,
    WordBoundary,
    NonWordBoundary,
    TextStart,
    TextEnd,
}

impl AnchorKind {
    pub fn is_end(&self) -> bool {
        matches!(
            self,
            AnchorKind::End | AnchorKind::LineEnd | AnchorKind::TextEnd
        )
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self,
            AnchorKind::Start | AnchorKind::LineStart | AnchorKind::TextStart
        )
    }
}

/// A node of the pattern AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Matches nothing, e.g. an empty alternative in `(a|)`.
    Empty(Span),
    /// A single character. Case-insensitive literals whose fold is larger
    /// than themselves are parsed as [`Node::Class`] instead.
    Literal { c: char, span: Span },
    /// A character class with negation and case folding already applied.
    Class { set: CharSet, span: Span },
    /// The dot outside `dot_matches_new_line` mode.
    Dot { span: Span },
    /// The dot under `dot_matches_new_line`: any character at all.
    AnyChar { span: Span },
    Concat { children: Vec<Node>, span: Span },
    Alt { children: Vec<Node>, span: Span },
    Repeat {
        child: Box<Node>,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        span: Span,
    },
    Group {
        child: Box<Node>,
        /// Capture index, 1-based. `None` for non-capturing groups.
        index: Option<u32>,
        name: Option<String>,
        span: Span,
    },
    Anchor { kind: AnchorKind, span: Span },
    Backref { index: u32, name: Option<String>, span: Span },
    Look {
        child: Box<Node>,
        behind: bool,
        negated: bool,
        span: Span,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Empty(span) => *span,
            Node::Literal { span, .. }
            | Node::Class { span, .. }
            | Node::Dot { span }
            | Node::AnyChar { span }
            | Node::Concat { span, .. }
            | Node::Alt { span, .. }
            | Node::Repeat { span, .. }
            | Node::Group { span, .. }
            | Node::Anchor { span, .. }
            | Node::Backref { span, .. }
            | Node::Look { span, .. } => *span,
        }
    }

    /// Calls `f` on this node and all descendants, pre-order. Traversal
    /// stops early when `f` returns false.
    pub fn walk(&self, f: &mut impl FnMut(&Node) -> bool) -> bool {
        if !f(self) {
            return false;
        }
        match self {
            Node::Concat { children, .. } | Node::Alt { children, .. } => {
                children.iter().all(|c| c.walk(f))
            }
            Node::Repeat { child, .. }
            | Node::Group { child, .. }
            | Node::Look { child, .. } => child.walk(f),
            _ => true,
        }
    }

    fn any(&self, pred: &impl Fn(&Node) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |n| {
            if pred(n) {
                found = true;
                return false;
            }
            true
        });
        found
    }

    /// The character set this node can consume, resolved against `flags`.
    /// `None` for nodes that do not consume a character by themselves.
    pub fn char_set(&self, flags: &Flags) -> Option<CharSet> {
        match self {
            Node::Literal { c, .. } => Some(CharSet::single(*c)),
            Node::Class { set, .. } => Some(set.clone()),
            Node::Dot { .. } => {
                Some(CharSet::dot(flags.dot_matches_new_line))
            }
            Node::AnyChar { .. } => Some(CharSet::dot(true)),
            _ => None,
        }
    }

    pub fn has_backreferences(&self) -> bool {
        self.any(&|n| matches!(n, Node::Backref { .. }))
    }

    pub fn has_lookaround(&self) -> bool {
        self.any(&|n| matches!(n, Node::Look { .. }))
    }

    /// Whether the pattern contains an end anchor (`$`, `\Z`). End anchors
    /// force matching to continue to the end of the input, which is what
    /// makes ambiguity in a trailing position exploitable.
    pub fn has_end_anchor(&self) -> bool {
        self.any(&|n| {
            matches!(n, Node::Anchor { kind, .. } if kind.is_end())
        })
    }

    /// Whether every match attempt must begin at the start of the input,
    /// i.e. all paths through the pattern begin with a start anchor.
    pub fn is_start_anchored(&self) -> bool {
        match self {
            Node::Anchor { kind, .. } => kind.is_start(),
            Node::Concat { children, .. } => children
                .iter()
                .find(|c| !matches!(c, Node::Empty(_)))
                .is_some_and(|c| c.is_start_anchored()),
            Node::Alt { children, .. } => {
                !children.is_empty()
                    && children.iter().all(|c| c.is_start_anchored())
            }
            Node::Group { child, .. } => child.is_start_anchored(),
            Node::Repeat { child, min, .. } => {
                *min >= 1 && child.is_start_anchored()
            }
            _ => false,
        }
    }

    /// Number of AST nodes.
    pub fn size(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| {
            n += 1;
            true
        });
        n
    }

    /// Number of nodes after bounded repetitions are unrolled, which is
    /// what the ε-NFA construction actually materializes. Saturating.
    pub fn expanded_size(&self) -> usize {
        match self {
            Node::Concat { children, .. } | Node::Alt { children, .. } => {
                children
                    .iter()
                    .fold(1usize, |n, c| n.saturating_add(c.expanded_size()))
            }
            Node::Repeat { child, min, max, .. } => {
                let copies = match max {
                    Some(max) => *max as usize,
                    None => (*min as usize).saturating_add(1),
                }
                .max(1);
                child.expanded_size().saturating_mul(copies)
            }
            Node::Group { child, .. } | Node::Look { child, .. } => {
                child.expanded_size().saturating_add(1)
            }
            _ => 1,
        }
    }

    /// Union of all character sets the pattern mentions. Used to pick a
    /// character guaranteed to be foreign to the pattern.
    pub fn mentioned_chars(&self, flags: &Flags) -> CharSet {
        let mut union = CharSet::empty();
        self.walk(&mut |n| {
            if let Some(set) = n.char_set(flags) {
                union.union(&set);
            }
            true
        });
        union
    }
}

/// A parsed pattern: the original source, its flags and the AST root.
/// Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub source: String,
    pub flags: Flags,
    pub root: Node,
    /// Number of capturing groups.
    pub captures: u32,
}

impl Pattern {
    /// The text a hotspot span points at.
    pub fn span_text(&self, span: &Span) -> &str {
        let end = span.end.min(self.source.len());
        let start = span.start.min(end);
        &self.source[start..end]
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;
    use crate::Flags;

    #[test]
    fn start_anchoring() {
        let anchored = ["^a+$", "^(a|b)", "(^a|^b)", "(?:^)a"];
        for src in anchored {
            let p = parse(src, Flags::default()).unwrap();
            assert!(p.root.is_start_anchored(), "{src}");
        }
        let unanchored = ["a^", "(^a|b)", "a+", "x^y"];
        for src in unanchored {
            let p = parse(src, Flags::default()).unwrap();
            assert!(!p.root.is_start_anchored(), "{src}");
        }
    }

    #[test]
    fn end_anchor_detection() {
        let p = parse("a+$", Flags::default()).unwrap();
        assert!(p.root.has_end_anchor());
        let p = parse(r"a+\Z", Flags::default()).unwrap();
        assert!(p.root.has_end_anchor());
        let p = parse("a+", Flags::default()).unwrap();
        assert!(!p.root.has_end_anchor());
    }

    #[test]
    fn expanded_size_counts_unrolled_copies() {
        let small = parse("a{2}", Flags::default()).unwrap();
        let large = parse("a{200}", Flags::default()).unwrap();
        assert!(large.root.expanded_size() > small.root.expanded_size());
        assert!(large.root.expanded_size() >= 200);
    }
}
