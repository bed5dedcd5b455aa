/*!
Compiles a pattern AST into VM instructions.

Unanchored patterns are wrapped in a lazy scan loop so that one program
execution performs leftmost search; the loop prefers attempting a match
at the current position and only then advances, which reproduces the
retry-per-start-position cost of a real backtracking engine.
*/

use crate::parser::ast::{Node, Pattern};
use crate::parser::charset::CharSet;
use crate::vm::instr::{Instr, InstrPtr, Program};

pub(crate) struct Compiler<'a> {
    pattern: &'a Pattern,
    prog: Program,
}

impl<'a> Compiler<'a> {
    pub fn new(pattern: &'a Pattern) -> Self {
        Self { pattern, prog: Program::default() }
    }

    pub fn compile(mut self) -> Program {
        if !self.pattern.root.is_start_anchored() {
            // Lazy scan loop:
            //   0: split 3, 1    ; try the pattern here first
            //   1: any
            //   2: jmp 0
            let split = self.emit(Instr::Split(0, 0));
            self.emit(Instr::Any);
            self.emit(Instr::Jmp(split));
            let body = self.here();
            self.prog.instrs[split as usize] = Instr::Split(body, split + 1);
        }
        self.emit(Instr::Save(0));
        let pattern = self.pattern;
        self.node(&pattern.root);
        self.emit(Instr::Save(1));
        self.emit(Instr::Match);
        self.prog.n_slots = 2 * (self.pattern.captures as usize + 1);
        self.prog
    }

    /// Compiles a look-around body: no scan loop, no outer save pair.
    fn compile_sub(pattern: &'a Pattern, node: &Node) -> Program {
        let mut sub = Compiler { pattern, prog: Program::default() };
        sub.node(node);
        sub.emit(Instr::Match);
        sub.prog.n_slots = 2 * (pattern.captures as usize + 1);
        sub.prog
    }

    fn here(&self) -> InstrPtr {
        self.prog.instrs.len() as InstrPtr
    }

    fn emit(&mut self, instr: Instr) -> InstrPtr {
        let ip = self.here();
        self.prog.instrs.push(instr);
        ip
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::Empty(_) => {}
            Node::Literal { c, .. } => {
                self.emit(Instr::Char(*c));
            }
            Node::Class { set, .. } => {
                self.emit(Instr::Class(set.clone()));
            }
            Node::Dot { .. } => {
                self.emit(Instr::Class(CharSet::dot(false)));
            }
            Node::AnyChar { .. } => {
                self.emit(Instr::Any);
            }
            Node::Concat { children, .. } => {
                for child in children {
                    self.node(child);
                }
            }
            Node::Alt { children, .. } => self.alternation(children),
            Node::Group { child, index, .. } => match index {
                Some(index) => {
                    self.emit(Instr::Save(2 * *index as u16));
                    self.node(child);
                    self.emit(Instr::Save(2 * *index as u16 + 1));
                }
                None => self.node(child),
            },
            Node::Repeat { child, min, max, greedy, .. } => {
                self.repeat(child, *min, *max, *greedy);
            }
            Node::Anchor { kind, .. } => {
                self.emit(Instr::Anchor(*kind));
            }
            Node::Backref { index, .. } => {
                self.emit(Instr::Backref(*index as u16));
            }
            Node::Look { child, behind, negated, .. } => {
                let sub = Compiler::compile_sub(self.pattern, child);
                let prog = self.prog.subs.len() as u16;
                self.prog.subs.push(sub);
                self.emit(Instr::Look {
                    prog,
                    behind: *behind,
                    negated: *negated,
                });
            }
        }
    }

    fn alternation(&mut self, children: &[Node]) {
        let mut jumps: Vec<InstrPtr> = Vec::new();
        let n = children.len();
        for (i, child) in children.iter().enumerate() {
            if i + 1 < n {
                let split = self.emit(Instr::Split(0, 0));
                let body = self.here();
                self.node(child);
                jumps.push(self.emit(Instr::Jmp(0)));
                let next = self.here();
                self.prog.instrs[split as usize] = Instr::Split(body, next);
            } else {
                self.node(child);
            }
        }
        let end = self.here();
        for jump in jumps {
            self.prog.instrs[jump as usize] = Instr::Jmp(end);
        }
    }

    fn repeat(
        &mut self,
        child: &Node,
        min: u32,
        max: Option<u32>,
        greedy: bool,
    ) {
        match (min, max) {
            (0, None) => self.star(child, greedy),
            (min, None) => {
                for _ in 0..min - 1 {
                    self.node(child);
                }
                // X+ as body followed by a loop-back choice.
                let guarded = nullable(child);
                let mark = if guarded { Some(self.new_mark()) } else { None };
                let body = self.here();
                if let Some(mark) = mark {
                    self.emit(Instr::Mark(mark));
                }
                self.node(child);
                if let Some(mark) = mark {
                    self.emit(Instr::ProgressCheck(mark));
                }
                let split = self.emit(Instr::Split(0, 0));
                let end = self.here();
                self.prog.instrs[split as usize] = if greedy {
                    Instr::Split(body, end)
                } else {
                    Instr::Split(end, body)
                };
            }
            (min, Some(max)) => {
                for _ in 0..min {
                    self.node(child);
                }
                let mut splits: Vec<InstrPtr> = Vec::new();
                for _ in min..max {
                    splits.push(self.emit(Instr::Split(0, 0)));
                    self.node(child);
                }
                let end = self.here();
                // Each optional copy may bail straight to the end.
                let mut body_starts: Vec<InstrPtr> =
                    splits.iter().map(|&s| s + 1).collect();
                body_starts.push(end);
                for (i, split) in splits.into_iter().enumerate() {
                    let body = body_starts[i];
                    self.prog.instrs[split as usize] = if greedy {
                        Instr::Split(body, end)
                    } else {
                        Instr::Split(end, body)
                    };
                }
            }
        }
    }

    fn star(&mut self, child: &Node, greedy: bool) {
        let guarded = nullable(child);
        let mark = if guarded { Some(self.new_mark()) } else { None };
        let split = self.emit(Instr::Split(0, 0));
        let body = self.here();
        if let Some(mark) = mark {
            self.emit(Instr::Mark(mark));
        }
        self.node(child);
        if let Some(mark) = mark {
            self.emit(Instr::ProgressCheck(mark));
        }
        self.emit(Instr::Jmp(split));
        let end = self.here();
        self.prog.instrs[split as usize] = if greedy {
            Instr::Split(body, end)
        } else {
            Instr::Split(end, body)
        };
    }

    fn new_mark(&mut self) -> u16 {
        let mark = self.prog.n_marks as u16;
        self.prog.n_marks += 1;
        mark
    }
}

/// Whether the node can match the empty string. Loops over nullable
/// bodies get a progress guard so empty iterations terminate.
fn nullable(node: &Node) -> bool {
    match node {
        Node::Empty(_) | Node::Anchor { .. } | Node::Look { .. } => true,
        Node::Literal { .. }
        | Node::Class { .. }
        | Node::Dot { .. }
        | Node::AnyChar { .. } => false,
        Node::Concat { children, .. } => children.iter().all(nullable),
        Node::Alt { children, .. } => children.iter().any(nullable),
        Node::Repeat { child, min, .. } => *min == 0 || nullable(child),
        Node::Group { child, .. } => nullable(child),
        // Conservative: an empty referenced group matches emptily.
        Node::Backref { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::Compiler;
    use crate::parser::parse;
    use crate::vm::instr::Instr;
    use crate::Flags;

    fn compile(src: &str) -> crate::vm::instr::Program {
        let pattern = parse(src, Flags::default()).unwrap();
        Compiler::new(&pattern).compile()
    }

    #[test]
    fn anchored_pattern_has_no_scan_loop() {
        let prog = compile("^ab$");
        assert!(matches!(prog.instrs[0], Instr::Save(0)));
    }

    #[test]
    fn unanchored_pattern_gets_scan_loop() {
        let prog = compile("ab");
        assert!(matches!(prog.instrs[0], Instr::Split(3, 1)));
        assert!(matches!(prog.instrs[1], Instr::Any));
        assert!(matches!(prog.instrs[2], Instr::Jmp(0)));
    }

    #[test]
    fn greedy_star_prefers_the_body() {
        let prog = compile("^a*$");
        let split = prog
            .instrs
            .iter()
            .find_map(|i| match i {
                Instr::Split(a, b) => Some((*a, *b)),
                _ => None,
            })
            .unwrap();
        // Greedy: the body target comes first and sits right after the
        // split instruction.
        assert!(split.0 < split.1);
    }

    #[test]
    fn lazy_star_prefers_the_exit() {
        let prog = compile("^a*?$");
        let split = prog
            .instrs
            .iter()
            .find_map(|i| match i {
                Instr::Split(a, b) => Some((*a, *b)),
                _ => None,
            })
            .unwrap();
        assert!(split.0 > split.1);
    }

    #[test]
    fn nullable_loop_bodies_get_progress_guards() {
        let prog = compile("^(a*)*$");
        assert!(prog.n_marks > 0);
        assert!(prog
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::ProgressCheck(_))));
        // Non-nullable bodies stay unguarded.
        let prog = compile("^(a+)+$");
        assert_eq!(prog.n_marks, 0);
    }

    #[test]
    fn captures_emit_save_pairs() {
        let prog = compile("^(a)(b)$");
        let saves: Vec<u16> = prog
            .instrs
            .iter()
            .filter_map(|i| match i {
                Instr::Save(k) => Some(*k),
                _ => None,
            })
            .collect();
        assert_eq!(saves, vec![0, 2, 3, 4, 5, 1]);
        assert_eq!(prog.n_slots, 6);
    }

    #[test]
    fn lookaround_compiles_to_subprogram() {
        let prog = compile("^(?=ab)a");
        assert_eq!(prog.subs.len(), 1);
        assert!(prog
            .instrs
            .iter()
            .any(|i| matches!(i, Instr::Look { behind: false, .. })));
    }
}
