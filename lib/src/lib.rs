/*! A hybrid ReDoS analyzer for regular expressions.

Given a pattern and optional match flags, `redoscan` classifies the
worst-case matching time a backtracking engine would exhibit as linear,
polynomial of some degree, or exponential, and for vulnerable patterns
produces a structured attack witness: a (prefix, pump, suffix) triple
such that `prefix + pump × n + suffix` drives the matching time
super-linear.

The analyzer is hybrid. Patterns within the regular fragment go through
a static pipeline: a parser, a Thompson ε-NFA, a priority-preserving
ε-elimination, a look-ahead augmented product automaton that prunes
branches unable to reach acceptance, and an SCC-based ambiguity test
distinguishing exponential from polynomial blowups. Patterns the
automatons cannot model (backreferences, look-around) fall back to a
fuzzing loop over a step-counting backtracking VM. Either way, witnesses
are validated by replaying them on the VM before being reported.

# Example

```rust
let result = redoscan::check(r"^(a+)+$");
assert!(result.is_vulnerable());

let attack = result.attack.unwrap();
// "aaaa…!": each additional pump character doubles the work.
assert_eq!(attack.pump, "a");

assert!(redoscan::is_safe(r"^[a-z]+$"));
```

Checks are self-contained and share no mutable state; one [`Config`]
can serve concurrent `check` calls from many threads.
*/

pub use checker::{check, check_with, is_safe, is_vulnerable, HybridChecker};
pub use config::{
    AccelerationMode, CheckerKind, Config, MatchMode, SeederKind,
};
pub use diagnostics::{
    AttackPattern, Checker, Complexity, Diagnostics, Hotspot, Status,
};
pub use errors::Error;
pub use flags::Flags;

mod automaton;
mod checker;
mod config;
mod diagnostics;
mod errors;
mod flags;
mod fuzz;
pub mod parser;
mod recall;
mod vm;

#[cfg(test)]
mod tests;
