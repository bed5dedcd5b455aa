/*!
Dynamic fuzz checker.

Used when the automaton path cannot model the pattern (backreferences,
look-around, oversize constructions) or when explicitly selected. Seeds
derived from the AST and their mutations are run through the VM at three
growing lengths; step growth is fitted against the configured thresholds
to classify the pattern. Finding nothing within the budget proves
nothing; the driver decides whether that means safe or unknown.
*/

mod mutator;
mod seeder;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AccelerationMode, Budget, Config};
use crate::diagnostics::{AttackPattern, Complexity};
use crate::parser::ast::Pattern;
use crate::vm;

/// Step cap per VM run.
const MAX_FUZZ_STEPS: u64 = 1 << 18;

/// Base pump count for growth measurement.
const BASE_REPEAT: usize = 4;

#[derive(Debug)]
pub(crate) enum FuzzOutcome {
    Vulnerable { complexity: Complexity, attack: AttackPattern },
    /// Budget spent without a witness. Not a proof of safety.
    NoWitness,
    Budget(&'static str),
}

pub(crate) struct FuzzChecker<'a> {
    config: &'a Config,
}

impl<'a> FuzzChecker<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn check(&self, pattern: &Pattern, budget: &Budget) -> FuzzOutcome {
        let prog = vm::compile(pattern);
        let seeds = seeder::Seeder::seeds(pattern, self.config.seeder);
        debug!(
            "fuzzing a {}-instruction program with {} seeds",
            prog.len(),
            seeds.len()
        );
        if seeds.is_empty() {
            return FuzzOutcome::NoWitness;
        }

        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let mut mutator = mutator::Mutator::new(
            pattern,
            StdRng::seed_from_u64(self.config.random_seed ^ 0x9e37_79b9),
        );
        let mut corpus: Vec<AttackPattern> = seeds;

        for iteration in 0..self.config.max_iterations {
            if budget.expired() {
                return FuzzOutcome::Budget("timeout");
            }
            let candidate = if iteration < corpus.len() {
                corpus[iteration].clone()
            } else {
                let parent = rng.gen_range(0..corpus.len());
                let mutated = mutator.mutate(&corpus[parent]);
                corpus.push(mutated.clone());
                mutated
            };

            if let Some((complexity, attack)) =
                self.evaluate(&prog, &candidate, budget)
            {
                debug!(
                    "fuzz witness after {} iterations: {attack}",
                    iteration + 1
                );
                return FuzzOutcome::Vulnerable { complexity, attack };
            }
        }
        FuzzOutcome::NoWitness
    }

    /// Measures step growth of a candidate at growing pump counts and
    /// classifies it, or returns `None` when growth stays linear.
    fn evaluate(
        &self,
        prog: &vm::Program,
        candidate: &AttackPattern,
        budget: &Budget,
    ) -> Option<(Complexity, AttackPattern)> {
        let pump_len = candidate.pump.chars().count().max(1);
        let max_r = self
            .config
            .max_attack_length
            .saturating_sub(candidate.base)
            / (4 * pump_len);
        let r = BASE_REPEAT.min(max_r).max(1);

        let accelerate = match self.config.acceleration {
            AccelerationMode::On | AccelerationMode::Auto => true,
            AccelerationMode::Off => false,
        };
        let counts: Vec<usize> = if accelerate {
            vec![r, 4 * r]
        } else {
            vec![r, 2 * r, 4 * r]
        };

        let mut steps = Vec::with_capacity(counts.len());
        let mut limited = false;
        let mut lens = Vec::with_capacity(counts.len());
        for &n in &counts {
            let outcome = vm::measure(
                prog,
                &candidate.string(n),
                MAX_FUZZ_STEPS,
                *budget,
            );
            steps.push(outcome.steps.max(1));
            lens.push(candidate.len_at(n).max(1));
            if outcome.limited {
                limited = true;
                break;
            }
        }

        let first = steps[0];
        let last = *steps.last().unwrap();

        // Saturating the cap while the shortest input stayed cheap is
        // the exponential signature.
        if limited {
            if steps.len() > 1 || first >= MAX_FUZZ_STEPS {
                return Some((
                    Complexity::Exponential,
                    self.fitted(candidate, Complexity::Exponential),
                ));
            }
            return None;
        }

        let per_doubling_threshold = self.config.exponential_threshold;
        let exponential = if accelerate {
            // One measurement spanning two doublings.
            (last as f64 / first as f64)
                >= per_doubling_threshold * per_doubling_threshold
        } else {
            steps
                .windows(2)
                .all(|w| (w[1] as f64 / w[0] as f64) >= per_doubling_threshold)
        };
        if exponential {
            return Some((
                Complexity::Exponential,
                self.fitted(candidate, Complexity::Exponential),
            ));
        }

        let slope = (last as f64 / first as f64).ln()
            / (*lens.last().unwrap() as f64 / lens[0] as f64).ln();
        if slope >= self.config.polynomial_threshold {
            let degree = (slope.round() as u32).max(2);
            let complexity = Complexity::Polynomial(degree);
            return Some((complexity, self.fitted(candidate, complexity)));
        }
        None
    }

    /// Refits the default repeat so the default attack string fills the
    /// configured length budget.
    fn fitted(
        &self,
        candidate: &AttackPattern,
        complexity: Complexity,
    ) -> AttackPattern {
        let pump_len = candidate.pump.chars().count().max(1);
        let fit = self
            .config
            .max_attack_length
            .saturating_sub(candidate.base)
            / pump_len;
        let repeat = match complexity {
            Complexity::Exponential => fit.min(64),
            _ => fit,
        }
        .max(1);
        AttackPattern::new(
            candidate.prefix.clone(),
            candidate.pump.clone(),
            candidate.suffix.clone(),
            repeat,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{FuzzChecker, FuzzOutcome};
    use crate::config::{Budget, Config};
    use crate::diagnostics::Complexity;
    use crate::parser::parse;
    use crate::Flags;

    fn fuzz(src: &str) -> FuzzOutcome {
        let config = Config::default();
        let pattern = parse(src, Flags::default()).unwrap();
        FuzzChecker::new(&config).check(&pattern, &Budget::unlimited())
    }

    #[test]
    fn finds_classic_exponential_blowup() {
        match fuzz("^(a+)+$") {
            FuzzOutcome::Vulnerable { complexity, attack } => {
                assert_eq!(complexity, Complexity::Exponential);
                assert!(attack.pump.contains('a'));
            }
            other => panic!("expected witness, got {other:?}"),
        }
    }

    #[test]
    fn finds_overlap_ambiguity() {
        match fuzz("^(a|b|ab)*$") {
            FuzzOutcome::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Exponential);
            }
            other => panic!("expected witness, got {other:?}"),
        }
    }

    #[test]
    fn finds_backreference_blowup() {
        // Automaton analysis cannot model this; fuzzing can still
        // demonstrate the blowup.
        match fuzz(r"^(a+)\1+$") {
            FuzzOutcome::Vulnerable { .. } => {}
            other => panic!("expected witness, got {other:?}"),
        }
    }

    #[test]
    fn reports_nothing_for_safe_patterns() {
        for src in ["^a+$", "^[a-z]+$", "^hello$"] {
            match fuzz(src) {
                FuzzOutcome::NoWitness => {}
                other => {
                    panic!("{src}: expected no witness, got {other:?}")
                }
            }
        }
    }

    #[test]
    fn fuzzing_is_deterministic() {
        let outcome_attack = |_: ()| match fuzz("^(a+)+$") {
            FuzzOutcome::Vulnerable { attack, .. } => attack,
            other => panic!("expected witness, got {other:?}"),
        };
        assert_eq!(outcome_attack(()), outcome_attack(()));
    }
}
