/*!
The hybrid checker: feasibility gate, automaton/fuzz dispatch, recall
validation and diagnostics assembly.

Everything recoverable flows through [`Diagnostics`] values; only parse
failures surface as `Status::Error`. The gate rules follow a strict
order: unsupported features and oversize patterns divert to fuzzing, an
explicitly requested checker is never overridden, and a diverted fuzz
run that finds nothing reports `Unknown`; fuzzing proves presence, not
absence.
*/

use log::debug;

use crate::automaton::{AutomatonChecker, AutomatonOutcome};
use crate::config::{Budget, CheckerKind, Config};
use crate::diagnostics::{Checker, Diagnostics};
use crate::errors::Error;
use crate::flags::Flags;
use crate::fuzz::{FuzzChecker, FuzzOutcome};
use crate::parser::ast::Pattern;
use crate::parser::parse;
use crate::recall::{RecallResult, RecallValidator};
use crate::vm;

/// Checks a pattern with default flags and configuration.
pub fn check(pattern: &str) -> Diagnostics {
    check_with(pattern, Flags::default(), &Config::default())
}

/// Checks a pattern with explicit flags and configuration.
pub fn check_with(pattern: &str, flags: Flags, config: &Config) -> Diagnostics {
    HybridChecker::new(config).check(pattern, flags)
}

/// True when `check` classifies the pattern as vulnerable.
pub fn is_vulnerable(pattern: &str) -> bool {
    check(pattern).is_vulnerable()
}

/// True when `check` classifies the pattern as safe.
pub fn is_safe(pattern: &str) -> bool {
    check(pattern).is_safe()
}

/// A checker bound to a configuration. Carries no mutable state; one
/// instance can serve any number of `check` calls.
pub struct HybridChecker<'a> {
    config: &'a Config,
}

impl<'a> HybridChecker<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn check(&self, source: &str, flags: Flags) -> Diagnostics {
        let budget = Budget::new(self.config.timeout);

        let pattern = match parse(source, flags) {
            Ok(pattern) => pattern,
            Err(err) => {
                return Diagnostics::error(source, flags, err.to_string())
            }
        };
        self.dispatch(&pattern, &budget)
    }

    /// Checks an already-parsed pattern.
    pub fn check_pattern(&self, pattern: &Pattern) -> Diagnostics {
        let budget = Budget::new(self.config.timeout);
        self.dispatch(pattern, &budget)
    }

    fn dispatch(&self, pattern: &Pattern, budget: &Budget) -> Diagnostics {
        let unsupported = pattern.root.has_backreferences()
            || pattern.root.has_lookaround();
        let oversize =
            pattern.root.expanded_size() > self.config.max_pattern_size;

        match self.config.checker {
            CheckerKind::Automaton => {
                if unsupported {
                    return Diagnostics::unknown(
                        &pattern.source,
                        pattern.flags,
                        Checker::Automaton,
                        "pattern contains backreferences or look-around; \
                         the automaton checker cannot analyze it",
                    );
                }
                self.automaton(pattern, budget, false)
            }
            CheckerKind::Fuzz => self.fuzz(pattern, budget, unsupported),
            CheckerKind::Auto => {
                if unsupported || oversize {
                    debug!(
                        "gate: diverting to fuzz (unsupported: \
                         {unsupported}, oversize: {oversize})"
                    );
                    self.fuzz(pattern, budget, true)
                } else {
                    self.automaton(pattern, budget, true)
                }
            }
        }
    }

    /// Automaton path. `may_fall_back` allows switching to fuzz when a
    /// construction outgrows its cap.
    fn automaton(
        &self,
        pattern: &Pattern,
        budget: &Budget,
        may_fall_back: bool,
    ) -> Diagnostics {
        let outcome =
            AutomatonChecker::new(self.config).check(pattern, budget);
        match outcome {
            Ok(AutomatonOutcome::Safe) => Diagnostics::safe(
                &pattern.source,
                pattern.flags,
                Checker::Automaton,
                "no exploitable ambiguity found",
            ),
            Ok(AutomatonOutcome::Budget(phase)) => Diagnostics::unknown(
                &pattern.source,
                pattern.flags,
                Checker::Automaton,
                format!("timeout budget exceeded during {phase}"),
            ),
            Ok(AutomatonOutcome::Vulnerable { complexity, witnesses }) => {
                if self.config.skip_recall {
                    let witness = &witnesses[0];
                    return Diagnostics::vulnerable(
                        &pattern.source,
                        pattern.flags,
                        Checker::Automaton,
                        complexity,
                        witness.attack.clone(),
                        Some(witness.hotspot.clone()),
                    );
                }
                let validator = RecallValidator::new(self.config);
                let prog = vm::compile(pattern);
                for witness in
                    witnesses.iter().take(self.config.recall_limit)
                {
                    match validator.validate(
                        &prog,
                        &witness.attack,
                        complexity,
                        budget,
                    ) {
                        RecallResult::Confirmed => {
                            return Diagnostics::vulnerable(
                                &pattern.source,
                                pattern.flags,
                                Checker::Automaton,
                                complexity,
                                witness.attack.clone(),
                                Some(witness.hotspot.clone()),
                            )
                        }
                        RecallResult::Rejected => continue,
                        RecallResult::Budget => {
                            return Diagnostics::unknown(
                                &pattern.source,
                                pattern.flags,
                                Checker::Automaton,
                                "recall_timeout budget exceeded while \
                                 validating witnesses",
                            )
                        }
                    }
                }
                Diagnostics::unknown(
                    &pattern.source,
                    pattern.flags,
                    Checker::Automaton,
                    "ambiguity detected but no witness survived recall \
                     validation",
                )
            }
            Err(err @ Error::TooLarge { .. }) if may_fall_back => {
                debug!("automaton fallback: {err}");
                self.fuzz(pattern, budget, true)
            }
            Err(err @ Error::UnsupportedFeature { .. })
                if may_fall_back =>
            {
                debug!("automaton fallback: {err}");
                self.fuzz(pattern, budget, true)
            }
            Err(err) => Diagnostics::unknown(
                &pattern.source,
                pattern.flags,
                Checker::Automaton,
                format!("automaton analysis gave up: {err}"),
            ),
        }
    }

    /// Fuzz path. When `diverted` the pattern could not be analyzed
    /// statically, so finding nothing must stay `Unknown` rather than
    /// `Safe`.
    fn fuzz(
        &self,
        pattern: &Pattern,
        budget: &Budget,
        diverted: bool,
    ) -> Diagnostics {
        let outcome = FuzzChecker::new(self.config).check(pattern, budget);
        match outcome {
            FuzzOutcome::Vulnerable { complexity, attack } => {
                if !self.config.skip_recall {
                    let prog = vm::compile(pattern);
                    let validator = RecallValidator::new(self.config);
                    match validator.validate(
                        &prog, &attack, complexity, budget,
                    ) {
                        RecallResult::Confirmed => {}
                        RecallResult::Rejected => {
                            return Diagnostics::unknown(
                                &pattern.source,
                                pattern.flags,
                                Checker::Fuzz,
                                "fuzzed witness failed recall validation",
                            )
                        }
                        RecallResult::Budget => {
                            return Diagnostics::unknown(
                                &pattern.source,
                                pattern.flags,
                                Checker::Fuzz,
                                "recall_timeout budget exceeded while \
                                 validating the fuzzed witness",
                            )
                        }
                    }
                }
                Diagnostics::vulnerable(
                    &pattern.source,
                    pattern.flags,
                    Checker::Fuzz,
                    complexity,
                    attack,
                    None,
                )
            }
            FuzzOutcome::Budget(which) => Diagnostics::unknown(
                &pattern.source,
                pattern.flags,
                Checker::Fuzz,
                format!("{which} budget exceeded during fuzzing"),
            ),
            FuzzOutcome::NoWitness => {
                if diverted {
                    Diagnostics::unknown(
                        &pattern.source,
                        pattern.flags,
                        Checker::Fuzz,
                        format!(
                            "no witness found within max_iterations \
                             ({}); the pattern could not be analyzed \
                             statically",
                            self.config.max_iterations
                        ),
                    )
                } else {
                    Diagnostics::safe(
                        &pattern.source,
                        pattern.flags,
                        Checker::Fuzz,
                        "fuzzing found no witness within budget (not a \
                         proof of safety)",
                    )
                }
            }
        }
    }
}
