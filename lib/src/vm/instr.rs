/*!
Instruction set for the step-counting backtracking VM.

The program layout mirrors the ε-NFA: `Split` encodes an ordered choice
(first target preferred, which is what makes quantifiers greedy), `Jmp`
closes loops, and `Save` records capture offsets. Look-around bodies are
compiled into separate sub-programs referenced by index.
*/

use std::fmt::{Display, Formatter};

use crate::parser::ast::AnchorKind;
use crate::parser::charset::CharSet;

pub(crate) type InstrPtr = u32;

#[derive(Debug, Clone)]
pub(crate) enum Instr {
    /// Matches one specific character.
    Char(char),
    /// Matches any character at all.
    Any,
    /// Matches one character from the set.
    Class(CharSet),
    /// The pattern matched.
    Match,
    Jmp(InstrPtr),
    /// Ordered choice: try the first target, fall back to the second.
    Split(InstrPtr, InstrPtr),
    /// Stores the current position in capture slot `k`.
    Save(u16),
    /// Matches the text captured by group `k` again.
    Backref(u16),
    /// Zero-width anchor check.
    Anchor(AnchorKind),
    /// Runs sub-program `prog` as a look-around assertion.
    Look { prog: u16, behind: bool, negated: bool },
    /// Records the current position in loop mark `k`.
    Mark(u16),
    /// Fails when the position has not advanced since `Mark(k)`,
    /// cutting off zero-width loop iterations.
    ProgressCheck(u16),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    pub instrs: Vec<Instr>,
    /// Look-around sub-programs.
    pub subs: Vec<Program>,
    /// Number of capture slots (two per group, plus the implicit
    /// whole-match group 0).
    pub n_slots: usize,
    /// Number of loop progress marks.
    pub n_marks: usize,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instrs.len()
    }
}

impl Display for Program {
    /// Renders a program listing, one instruction per line.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (ip, instr) in self.instrs.iter().enumerate() {
            write!(f, "{ip:03}: ")?;
            match instr {
                Instr::Char(c) => writeln!(f, "char {c:?}")?,
                Instr::Any => writeln!(f, "any")?,
                Instr::Class(set) => {
                    write!(f, "class")?;
                    for (lo, hi) in set.ranges().take(4) {
                        if lo == hi {
                            write!(f, " {lo:?}")?;
                        } else {
                            write!(f, " {lo:?}-{hi:?}")?;
                        }
                    }
                    writeln!(f)?;
                }
                Instr::Match => writeln!(f, "match")?,
                Instr::Jmp(t) => writeln!(f, "jmp {t:03}")?,
                Instr::Split(a, b) => writeln!(f, "split {a:03}, {b:03}")?,
                Instr::Save(k) => writeln!(f, "save {k}")?,
                Instr::Backref(k) => writeln!(f, "backref {k}")?,
                Instr::Anchor(kind) => writeln!(f, "anchor {kind:?}")?,
                Instr::Look { prog, behind, negated } => {
                    let dir = if *behind { "behind" } else { "ahead" };
                    let neg = if *negated { " negated" } else { "" };
                    writeln!(f, "look {dir}{neg} sub={prog}")?;
                }
                Instr::Mark(k) => writeln!(f, "mark {k}")?,
                Instr::ProgressCheck(k) => writeln!(f, "progress {k}")?,
            }
        }
        Ok(())
    }
}
