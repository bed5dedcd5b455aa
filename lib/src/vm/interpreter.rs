/*!
Backtracking interpreter with a step counter.

This is not a production matcher: it exists to *measure* backtracking
work. Every instruction dispatch and every character comparison bumps a
counter, and execution stops once a step limit or the wall-clock budget
is hit. The search order matches a classic depth-first backtracker
(first split target first), so step counts grow the way a vulnerable
engine's running time would.

The interpreter is re-entrant: look-around assertions run their
sub-program through the same machine, sharing the step counter.
*/

use crate::config::Budget;
use crate::parser::ast::AnchorKind;
use crate::vm::instr::{Instr, Program};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Outcome {
    pub matched: bool,
    pub steps: u64,
    /// The step limit or deadline was hit; `matched` is unreliable.
    pub limited: bool,
}

pub(crate) struct Interpreter<'p> {
    prog: &'p Program,
    max_steps: u64,
    budget: Budget,
}

struct Machine<'i> {
    input: &'i [char],
    steps: u64,
    max_steps: u64,
    budget: Budget,
    limited: bool,
}

enum TrailEntry {
    Cap { slot: u16, old: Option<usize> },
    Mark { slot: u16, old: usize },
}

struct Frame {
    ip: u32,
    pos: usize,
    trail_len: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(prog: &'p Program, max_steps: u64, budget: Budget) -> Self {
        Self { prog, max_steps, budget }
    }

    pub fn run(&self, input: &[char]) -> Outcome {
        let mut machine = Machine {
            input,
            steps: 0,
            max_steps: self.max_steps,
            budget: self.budget,
            limited: false,
        };
        let mut caps = vec![None; self.prog.n_slots];
        let matched = machine.exec(self.prog, 0, None, &mut caps);
        Outcome {
            matched: matched && !machine.limited,
            steps: machine.steps,
            limited: machine.limited,
        }
    }
}

impl Machine<'_> {
    /// Runs `prog` from `start_pos`. When `exact_end` is set the match
    /// must end exactly there (used for look-behind).
    fn exec(
        &mut self,
        prog: &Program,
        start_pos: usize,
        exact_end: Option<usize>,
        caps: &mut Vec<Option<usize>>,
    ) -> bool {
        let mut marks = vec![usize::MAX; prog.n_marks];
        let mut trail: Vec<TrailEntry> = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();
        let mut ip: u32 = 0;
        let mut pos = start_pos;

        macro_rules! backtrack {
            () => {
                match stack.pop() {
                    Some(frame) => {
                        while trail.len() > frame.trail_len {
                            match trail.pop().unwrap() {
                                TrailEntry::Cap { slot, old } => {
                                    caps[slot as usize] = old
                                }
                                TrailEntry::Mark { slot, old } => {
                                    marks[slot as usize] = old
                                }
                            }
                        }
                        ip = frame.ip;
                        pos = frame.pos;
                        continue;
                    }
                    None => return false,
                }
            };
        }

        loop {
            self.steps += 1;
            if self.steps & 0xfff == 0 && self.budget.expired() {
                self.limited = true;
            }
            if self.steps >= self.max_steps {
                self.limited = true;
            }
            if self.limited {
                return false;
            }

            match &prog.instrs[ip as usize] {
                Instr::Char(c) => {
                    if pos < self.input.len() && self.input[pos] == *c {
                        pos += 1;
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Any => {
                    if pos < self.input.len() {
                        pos += 1;
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Class(set) => {
                    if pos < self.input.len() && set.contains(self.input[pos])
                    {
                        pos += 1;
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Match => match exact_end {
                    Some(end) if pos != end => backtrack!(),
                    _ => return true,
                },
                Instr::Jmp(t) => ip = *t,
                Instr::Split(a, b) => {
                    stack.push(Frame {
                        ip: *b,
                        pos,
                        trail_len: trail.len(),
                    });
                    ip = *a;
                }
                Instr::Save(slot) => {
                    trail.push(TrailEntry::Cap {
                        slot: *slot,
                        old: caps[*slot as usize],
                    });
                    caps[*slot as usize] = Some(pos);
                    ip += 1;
                }
                Instr::Backref(group) => {
                    let (s, e) = (
                        caps[2 * *group as usize],
                        caps[2 * *group as usize + 1],
                    );
                    // A reference to a group that did not participate
                    // fails, as in a backtracking engine.
                    let (Some(s), Some(e)) = (s, e) else { backtrack!() };
                    let len = e - s;
                    if pos + len > self.input.len() {
                        backtrack!();
                    }
                    let mut ok = true;
                    for i in 0..len {
                        self.steps += 1;
                        if self.input[s + i] != self.input[pos + i] {
                            ok = false;
                            break;
                        }
                    }
                    if ok {
                        pos += len;
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Anchor(kind) => {
                    if self.anchor_holds(*kind, pos) {
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Look { prog: sub, behind, negated } => {
                    let sub = &prog.subs[*sub as usize];
                    let mut sub_caps = caps.clone();
                    let held = if *behind {
                        let mut held = false;
                        for start in (0..=pos).rev() {
                            if self.exec(
                                sub,
                                start,
                                Some(pos),
                                &mut sub_caps,
                            ) {
                                held = true;
                                break;
                            }
                            if self.limited {
                                return false;
                            }
                        }
                        held
                    } else {
                        self.exec(sub, pos, None, &mut sub_caps)
                    };
                    if self.limited {
                        return false;
                    }
                    if held != *negated {
                        ip += 1;
                    } else {
                        backtrack!();
                    }
                }
                Instr::Mark(slot) => {
                    trail.push(TrailEntry::Mark {
                        slot: *slot,
                        old: marks[*slot as usize],
                    });
                    marks[*slot as usize] = pos;
                    ip += 1;
                }
                Instr::ProgressCheck(slot) => {
                    if marks[*slot as usize] == pos {
                        backtrack!();
                    } else {
                        ip += 1;
                    }
                }
            }
        }
    }

    fn anchor_holds(&self, kind: AnchorKind, pos: usize) -> bool {
        let len = self.input.len();
        match kind {
            AnchorKind::Start | AnchorKind::TextStart => pos == 0,
            AnchorKind::End | AnchorKind::TextEnd => pos == len,
            AnchorKind::LineStart => {
                pos == 0 || self.input[pos - 1] == '\n'
            }
            AnchorKind::LineEnd => pos == len || self.input[pos] == '\n',
            AnchorKind::WordBoundary => {
                self.word_before(pos) != self.word_at(pos)
            }
            AnchorKind::NonWordBoundary => {
                self.word_before(pos) == self.word_at(pos)
            }
        }
    }

    fn word_before(&self, pos: usize) -> bool {
        pos > 0 && is_word(self.input[pos - 1])
    }

    fn word_at(&self, pos: usize) -> bool {
        pos < self.input.len() && is_word(self.input[pos])
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{Interpreter, Outcome};
    use crate::config::Budget;
    use crate::parser::parse;
    use crate::vm::compiler::Compiler;
    use crate::Flags;

    fn run(src: &str, input: &str) -> Outcome {
        run_flags(src, input, Flags::default())
    }

    fn run_flags(src: &str, input: &str, flags: Flags) -> Outcome {
        let pattern = parse(src, flags).unwrap();
        let prog = Compiler::new(&pattern).compile();
        let chars: Vec<char> = input.chars().collect();
        Interpreter::new(&prog, 1 << 24, Budget::unlimited()).run(&chars)
    }

    #[test]
    fn basic_matching() {
        assert!(run("^abc$", "abc").matched);
        assert!(!run("^abc$", "abx").matched);
        assert!(run("abc", "xxabcxx").matched);
        assert!(!run("abc", "xxabxcx").matched);
        assert!(run("^a*$", "aaaa").matched);
        assert!(run("^(a|b)+$", "abba").matched);
        assert!(!run("^(a|b)+$", "abca").matched);
        assert!(run("^a{2,4}$", "aaa").matched);
        assert!(!run("^a{2,4}$", "a").matched);
        assert!(!run("^a{2,4}$", "aaaaa").matched);
    }

    #[test]
    fn anchors() {
        assert!(run(r"^a\b", "a b").matched);
        assert!(!run(r"^a\b", "ab").matched);
        assert!(run(r"^a\B", "ab").matched);
        let multiline = Flags::default().multiline(true);
        assert!(run_flags("^b", "a\nb", multiline).matched);
        assert!(run_flags("a$", "a\nb", multiline).matched);
        assert!(!run("^b", "a\nb").matched);
    }

    #[test]
    fn backrefs() {
        assert!(run(r"^(ab)\1$", "abab").matched);
        assert!(!run(r"^(ab)\1$", "abba").matched);
        assert!(run(r"^(a|(b))\2?c$", "ac").matched);
    }

    #[test]
    fn lookaround() {
        assert!(run("^(?=ab)a", "ab").matched);
        assert!(!run("^(?=ab)a", "ax").matched);
        assert!(run("^(?!ab)a", "ax").matched);
        assert!(run("a(?<=a)b", "ab").matched);
        assert!(run("ab(?<=ab)c", "abc").matched);
        assert!(!run("ab(?<!ab)c", "abc").matched);
    }

    #[test]
    fn zero_width_loops_terminate() {
        let outcome = run("^(a*)*$", "aaa!");
        assert!(!outcome.matched);
        assert!(!outcome.limited);
    }

    #[test]
    fn exponential_step_growth() {
        let short = run("^(a+)+$", &format!("{}!", "a".repeat(8)));
        let long = run("^(a+)+$", &format!("{}!", "a".repeat(16)));
        assert!(!short.matched);
        assert!(!long.matched);
        // 8 extra pump characters multiply the work by far more than the
        // input-length ratio.
        assert!(long.steps > short.steps.saturating_mul(16));
    }

    #[test]
    fn quadratic_step_growth() {
        let s1 = run(".*a.*a.*", &format!("{}!", "b".repeat(32)));
        let s2 = run(".*a.*a.*", &format!("{}!", "b".repeat(64)));
        let ratio = s2.steps as f64 / s1.steps as f64;
        assert!(ratio > 3.0, "expected quadratic growth, ratio {ratio}");
        assert!(ratio < 6.0, "expected quadratic growth, ratio {ratio}");
    }

    #[test]
    fn linear_patterns_stay_linear() {
        let s1 = run("^[a-z]+$", &"x".repeat(64));
        let s2 = run("^[a-z]+$", &"x".repeat(128));
        assert!(s2.steps < s1.steps * 3);
    }

    #[test]
    fn step_limit_reports_limited() {
        let pattern = parse("^(a+)+$", Flags::default()).unwrap();
        let prog = Compiler::new(&pattern).compile();
        let chars: Vec<char> =
            format!("{}!", "a".repeat(30)).chars().collect();
        let outcome =
            Interpreter::new(&prog, 10_000, Budget::unlimited()).run(&chars);
        assert!(outcome.limited);
        assert!(!outcome.matched);
        assert!(outcome.steps >= 10_000);
    }
}
