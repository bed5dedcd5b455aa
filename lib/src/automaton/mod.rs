/*!
The automaton-based checker: ε-NFA → ordered NFA → look-ahead product →
SCC ambiguity analysis → witness synthesis.
*/

mod eps_nfa;
mod nfa_wla;
mod ordered_nfa;
mod scc;
mod witness;

use log::debug;

use crate::config::{Budget, Config};
use crate::diagnostics::Complexity;
use crate::errors::Error;
use crate::parser::ast::Pattern;

pub(crate) use witness::Witness;

#[derive(Debug)]
pub(crate) enum AutomatonOutcome {
    Safe,
    Vulnerable { complexity: Complexity, witnesses: Vec<Witness> },
    /// The deadline expired; the message names the phase.
    Budget(&'static str),
}

pub(crate) struct AutomatonChecker<'a> {
    config: &'a Config,
}

impl<'a> AutomatonChecker<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Runs the full automaton pipeline.
    ///
    /// Returns [`Error::UnsupportedFeature`] for backreferences and
    /// look-around, and [`Error::TooLarge`] when a construction exceeds
    /// `max_nfa_size`; the driver falls back to fuzzing in both cases.
    pub fn check(
        &self,
        pattern: &Pattern,
        budget: &Budget,
    ) -> Result<AutomatonOutcome, Error> {
        let eps = eps_nfa::EpsNfa::build(pattern)?;
        debug!("ε-NFA: {} states", eps.len());

        let ordered = ordered_nfa::OrderedNfa::from_eps_nfa(&eps);
        debug!(
            "ordered NFA: {} atoms, multi-transitions: {}",
            ordered.atoms.len(),
            ordered.has_multi_transitions()
        );
        if budget.expired() {
            return Ok(AutomatonOutcome::Budget("ordered-NFA construction"));
        }

        let wla = nfa_wla::NfaWla::build(&ordered, self.config.max_nfa_size)?;
        debug!("look-ahead product: {} states", wla.len());
        if budget.expired() {
            return Ok(AutomatonOutcome::Budget("look-ahead construction"));
        }

        let options = scc::AnalyzerOptions {
            match_mode: self.config.match_mode,
            has_end_anchor: pattern.root.has_end_anchor(),
            attack_limit: self.config.attack_limit,
        };
        match scc::analyze(&wla, &options, budget) {
            scc::Verdict::Safe => Ok(AutomatonOutcome::Safe),
            scc::Verdict::Budget => {
                Ok(AutomatonOutcome::Budget("ambiguity analysis"))
            }
            scc::Verdict::Vulnerable { complexity, candidates } => {
                let witnesses: Vec<Witness> = candidates
                    .iter()
                    .filter_map(|c| {
                        witness::synthesize(
                            &wla,
                            pattern,
                            c,
                            complexity,
                            self.config.max_attack_length,
                        )
                    })
                    .collect();
                if witnesses.is_empty() {
                    // Ambiguity without a constructible attack; report
                    // it as safe rather than invent a witness.
                    debug!("ambiguity found but no witness constructible");
                    return Ok(AutomatonOutcome::Safe);
                }
                debug!(
                    "{} witness candidate(s), complexity {}",
                    witnesses.len(),
                    complexity
                );
                Ok(AutomatonOutcome::Vulnerable { complexity, witnesses })
            }
        }
    }
}
