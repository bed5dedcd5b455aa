/*!
Thompson-style ε-NFA built from the pattern AST.

Every state is allocated in a single arena and identified by index; edges
are ordered so that the first edge out of a state is the one a
backtracking engine tries first. This ordering encodes greediness and is
preserved through every later transformation.

End anchors become transitions on a virtual end-of-input symbol. That
keeps "must still consume something" visible to the exploitability
analysis: a state inside `^(a+)+$` cannot reach the accept state through
ε-transitions alone, while the same state in `(a+)+` can.
*/

use smallvec::SmallVec;

use crate::errors::Error;
use crate::parser::ast::{AnchorKind, Node, Pattern, Span};
use crate::parser::charset::CharSet;

pub(crate) type StateId = u32;

#[derive(Debug, Clone)]
pub(crate) enum EpsLabel {
    Eps,
    Char(CharSet),
    /// Virtual end-of-input symbol for `$` / `\Z`.
    End,
}

#[derive(Debug, Clone)]
pub(crate) struct EpsEdge {
    pub label: EpsLabel,
    pub target: StateId,
}

#[derive(Debug)]
pub(crate) struct EpsNfa {
    /// Source span per state.
    pub spans: Vec<Span>,
    /// Ordered outgoing edges per state.
    pub edges: Vec<SmallVec<[EpsEdge; 2]>>,
    pub initial: StateId,
    pub accept: StateId,
}

impl EpsNfa {
    /// Builds the ε-NFA for `pattern`.
    ///
    /// Fails with [`Error::UnsupportedFeature`] when the AST contains
    /// backreferences or look-around; the caller is expected to route
    /// such patterns to the fuzz checker.
    pub fn build(pattern: &Pattern) -> Result<EpsNfa, Error> {
        let mut builder = Builder {
            nfa: EpsNfa {
                spans: Vec::new(),
                edges: Vec::new(),
                initial: 0,
                accept: 0,
            },
            pattern,
        };
        let span = pattern.root.span();
        let (entry, exit) = builder.compile(&pattern.root, true)?;
        builder.nfa.initial = entry;
        builder.nfa.accept = builder.state(span);
        let accept = builder.nfa.accept;
        builder.connect(exit, EpsLabel::Eps, accept);
        let mut nfa = builder.nfa;
        nfa.drop_dangling_end_edges();
        Ok(nfa)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Removes end-symbol edges that cannot be part of an accepting run,
    /// e.g. the `$` in `a$b`. A valid end edge leads to a state from
    /// which the accept state is reachable through ε and end edges only.
    fn drop_dangling_end_edges(&mut self) {
        let mut completing = vec![false; self.len()];
        completing[self.accept as usize] = true;
        // Fixed point over the reversed ε/end edges.
        let mut changed = true;
        while changed {
            changed = false;
            for s in 0..self.len() {
                if completing[s] {
                    continue;
                }
                let reaches = self.edges[s].iter().any(|e| {
                    matches!(e.label, EpsLabel::Eps | EpsLabel::End)
                        && completing[e.target as usize]
                });
                if reaches {
                    completing[s] = true;
                    changed = true;
                }
            }
        }
        for s in 0..self.len() {
            self.edges[s].retain(|e| {
                !matches!(e.label, EpsLabel::End)
                    || completing[e.target as usize]
            });
        }
    }
}

struct Builder<'a> {
    nfa: EpsNfa,
    pattern: &'a Pattern,
}

impl Builder<'_> {
    fn state(&mut self, span: Span) -> StateId {
        let id = self.nfa.len() as StateId;
        self.nfa.spans.push(span);
        self.nfa.edges.push(SmallVec::new());
        id
    }

    fn connect(&mut self, from: StateId, label: EpsLabel, to: StateId) {
        self.nfa.edges[from as usize].push(EpsEdge { label, target: to });
    }

    /// Compiles `node` into a fresh (entry, exit) state pair. `at_start`
    /// is true while the node can only match at the beginning of the
    /// input, which decides whether a start anchor is satisfiable.
    fn compile(
        &mut self,
        node: &Node,
        at_start: bool,
    ) -> Result<(StateId, StateId), Error> {
        let span = node.span();
        match node {
            Node::Empty(_) => {
                let entry = self.state(span);
                let exit = self.state(span);
                self.connect(entry, EpsLabel::Eps, exit);
                Ok((entry, exit))
            }
            Node::Literal { .. }
            | Node::Class { .. }
            | Node::Dot { .. }
            | Node::AnyChar { .. } => {
                let set = node
                    .char_set(&self.pattern.flags)
                    .expect("character node always has a set");
                let entry = self.state(span);
                let exit = self.state(span);
                self.connect(entry, EpsLabel::Char(set), exit);
                Ok((entry, exit))
            }
            Node::Concat { children, .. } => {
                let entry = self.state(span);
                let mut prev = entry;
                let mut still_at_start = at_start;
                for child in children {
                    let (c_entry, c_exit) =
                        self.compile(child, still_at_start)?;
                    self.connect(prev, EpsLabel::Eps, c_entry);
                    prev = c_exit;
                    still_at_start = still_at_start && zero_width(child);
                }
                Ok((entry, prev))
            }
            Node::Alt { children, .. } => {
                let entry = self.state(span);
                let exit = self.state(span);
                // Left alternative first: edge order is priority order.
                for child in children {
                    let (c_entry, c_exit) = self.compile(child, at_start)?;
                    self.connect(entry, EpsLabel::Eps, c_entry);
                    self.connect(c_exit, EpsLabel::Eps, exit);
                }
                Ok((entry, exit))
            }
            Node::Group { child, .. } => {
                // Captures only matter to the VM.
                self.compile(child, at_start)
            }
            Node::Repeat { child, min, max, greedy, .. } => {
                self.compile_repeat(child, *min, *max, *greedy, span, at_start)
            }
            Node::Anchor { kind, .. } => {
                let entry = self.state(span);
                let exit = self.state(span);
                match kind {
                    AnchorKind::End
                    | AnchorKind::LineEnd
                    | AnchorKind::TextEnd => {
                        self.connect(entry, EpsLabel::End, exit);
                    }
                    AnchorKind::Start | AnchorKind::TextStart => {
                        // Satisfiable only at the very beginning; a dead
                        // edge otherwise (the exit stays unreachable and
                        // is trimmed later).
                        if at_start {
                            self.connect(entry, EpsLabel::Eps, exit);
                        }
                    }
                    AnchorKind::LineStart => {
                        // Multiline `^` can hold mid-input after a line
                        // terminator; approximated as ε.
                        self.connect(entry, EpsLabel::Eps, exit);
                    }
                    AnchorKind::WordBoundary
                    | AnchorKind::NonWordBoundary => {
                        // Zero-width and input-dependent; approximated as
                        // ε. The VM implements the exact semantics.
                        self.connect(entry, EpsLabel::Eps, exit);
                    }
                }
                Ok((entry, exit))
            }
            Node::Backref { .. } => {
                Err(Error::UnsupportedFeature { feature: "backreferences" })
            }
            Node::Look { .. } => {
                Err(Error::UnsupportedFeature { feature: "look-around" })
            }
        }
    }

    fn compile_repeat(
        &mut self,
        child: &Node,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        span: Span,
        at_start: bool,
    ) -> Result<(StateId, StateId), Error> {
        match (min, max) {
            // X*: choice state with a loop back to itself.
            (0, None) => {
                let entry = self.state(span);
                let exit = self.state(span);
                let (c_entry, c_exit) = self.compile(child, false)?;
                if greedy {
                    self.connect(entry, EpsLabel::Eps, c_entry);
                    self.connect(entry, EpsLabel::Eps, exit);
                } else {
                    self.connect(entry, EpsLabel::Eps, exit);
                    self.connect(entry, EpsLabel::Eps, c_entry);
                }
                self.connect(c_exit, EpsLabel::Eps, entry);
                Ok((entry, exit))
            }
            // X+: one mandatory pass, then the same choice.
            (1, None) => {
                let (c_entry, c_exit) = self.compile(child, at_start)?;
                let again = self.state(span);
                let exit = self.state(span);
                self.connect(c_exit, EpsLabel::Eps, again);
                if greedy {
                    self.connect(again, EpsLabel::Eps, c_entry);
                    self.connect(again, EpsLabel::Eps, exit);
                } else {
                    self.connect(again, EpsLabel::Eps, exit);
                    self.connect(again, EpsLabel::Eps, c_entry);
                }
                Ok((c_entry, exit))
            }
            // X{n,}: n-1 mandatory copies, then X+.
            (min, None) => {
                let entry = self.state(span);
                let mut prev = entry;
                let mut still_at_start = at_start;
                for _ in 0..min - 1 {
                    let (c_entry, c_exit) =
                        self.compile(child, still_at_start)?;
                    self.connect(prev, EpsLabel::Eps, c_entry);
                    prev = c_exit;
                    still_at_start = still_at_start && zero_width(child);
                }
                let (p_entry, p_exit) = self.compile_repeat(
                    child,
                    1,
                    None,
                    greedy,
                    span,
                    still_at_start,
                )?;
                self.connect(prev, EpsLabel::Eps, p_entry);
                Ok((entry, p_exit))
            }
            // X{n,m}: n mandatory copies and m-n optional ones, each of
            // which may bail out to the common exit.
            (min, Some(max)) => {
                let entry = self.state(span);
                let exit = self.state(span);
                let mut prev = entry;
                let mut still_at_start = at_start;
                for _ in 0..min {
                    let (c_entry, c_exit) =
                        self.compile(child, still_at_start)?;
                    self.connect(prev, EpsLabel::Eps, c_entry);
                    prev = c_exit;
                    still_at_start = still_at_start && zero_width(child);
                }
                for _ in min..max {
                    let choice = self.state(span);
                    self.connect(prev, EpsLabel::Eps, choice);
                    let (c_entry, c_exit) = self.compile(child, false)?;
                    if greedy {
                        self.connect(choice, EpsLabel::Eps, c_entry);
                        self.connect(choice, EpsLabel::Eps, exit);
                    } else {
                        self.connect(choice, EpsLabel::Eps, exit);
                        self.connect(choice, EpsLabel::Eps, c_entry);
                    }
                    prev = c_exit;
                }
                self.connect(prev, EpsLabel::Eps, exit);
                Ok((entry, exit))
            }
        }
    }
}

/// Whether the node never consumes input, used to keep the `at_start`
/// flag alive across leading anchors and empty groups.
fn zero_width(node: &Node) -> bool {
    match node {
        Node::Empty(_) | Node::Anchor { .. } | Node::Look { .. } => true,
        Node::Group { child, .. } => zero_width(child),
        Node::Concat { children, .. } | Node::Alt { children, .. } => {
            children.iter().all(zero_width)
        }
        Node::Repeat { child, max, .. } => {
            *max == Some(0) || zero_width(child)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{EpsLabel, EpsNfa};
    use crate::errors::Error;
    use crate::parser::parse;
    use crate::Flags;

    fn build(src: &str) -> EpsNfa {
        EpsNfa::build(&parse(src, Flags::default()).unwrap()).unwrap()
    }

    fn count_labels(nfa: &EpsNfa) -> (usize, usize, usize) {
        let mut eps = 0;
        let mut chars = 0;
        let mut ends = 0;
        for edges in &nfa.edges {
            for edge in edges {
                match edge.label {
                    EpsLabel::Eps => eps += 1,
                    EpsLabel::Char(_) => chars += 1,
                    EpsLabel::End => ends += 1,
                }
            }
        }
        (eps, chars, ends)
    }

    #[test]
    fn literal_chain() {
        let nfa = build("abc");
        let (_, chars, ends) = count_labels(&nfa);
        assert_eq!(chars, 3);
        assert_eq!(ends, 0);
    }

    #[test]
    fn end_anchor_becomes_end_edge() {
        let nfa = build("a$");
        let (_, chars, ends) = count_labels(&nfa);
        assert_eq!(chars, 1);
        assert_eq!(ends, 1);
    }

    #[test]
    fn impossible_end_anchor_is_dropped() {
        // The `$` in `a$b` can never take part in a match.
        let nfa = build("a$b");
        let (_, _, ends) = count_labels(&nfa);
        assert_eq!(ends, 0);
    }

    #[test]
    fn bounded_repeat_unrolls() {
        let nfa = build("a{3,5}");
        let (_, chars, _) = count_labels(&nfa);
        assert_eq!(chars, 5);
    }

    #[test]
    fn alternation_orders_children() {
        let nfa = build("a|b");
        // The entry state of the alternation has its ε-edges in source
        // order.
        let entry_edges = &nfa.edges[nfa.initial as usize];
        assert!(entry_edges.len() >= 2);
    }

    #[test]
    fn unsupported_features_are_reported() {
        let pattern = parse(r"(a)\1", Flags::default()).unwrap();
        assert!(matches!(
            EpsNfa::build(&pattern),
            Err(Error::UnsupportedFeature { .. })
        ));
        let pattern = parse(r"(?=a)b", Flags::default()).unwrap();
        assert!(matches!(
            EpsNfa::build(&pattern),
            Err(Error::UnsupportedFeature { .. })
        ));
    }
}
