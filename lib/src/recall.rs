/*!
Recall validation: runs a generated attack through the VM at three
growing pump counts and checks that the measured step growth is actually
super-linear. A witness that does not reproduce is rejected so the
driver can try the next candidate, or downgrade the verdict to unknown.
*/

use log::debug;

use crate::config::{Budget, Config};
use crate::diagnostics::{AttackPattern, Complexity};
use crate::vm;
use crate::vm::Program;

/// Step cap per trial. Saturating it at a small input is itself a
/// super-linearity signal.
const MAX_RECALL_STEPS: u64 = 1 << 20;

/// Base pump count n₁; trials run at n₁, 2n₁ and 3n₁.
const BASE_PUMP: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecallResult {
    Confirmed,
    Rejected,
    /// The overall deadline expired before the trials finished.
    Budget,
}

pub(crate) struct RecallValidator<'a> {
    config: &'a Config,
}

impl<'a> RecallValidator<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn validate(
        &self,
        prog: &Program,
        attack: &AttackPattern,
        claimed: Complexity,
        budget: &Budget,
    ) -> RecallResult {
        if budget.expired() {
            return RecallResult::Budget;
        }

        let pump_len = attack.pump.chars().count().max(1);
        let max_n1 = self
            .config
            .max_attack_length
            .saturating_sub(attack.base)
            / (3 * pump_len);
        let n1 = BASE_PUMP.min(max_n1).max(1);
        let counts = [n1, 2 * n1, 3 * n1];

        let mut steps = [0u64; 3];
        let mut limited = [false; 3];
        let mut lens = [0usize; 3];
        for (i, &n) in counts.iter().enumerate() {
            if budget.expired() {
                return RecallResult::Budget;
            }
            let trial_budget = budget.limited_by(self.config.recall_timeout);
            let outcome = vm::measure(
                prog,
                &attack.string(n),
                MAX_RECALL_STEPS,
                trial_budget,
            );
            steps[i] = outcome.steps.max(1);
            limited[i] = outcome.limited;
            lens[i] = attack.len_at(n).max(1);
        }

        debug!(
            "recall: pump {:?} counts {:?} steps {:?} limited {:?}",
            attack.pump, counts, steps, limited
        );

        // Hitting the step cap on inputs this small is super-linear by
        // itself.
        if limited.iter().any(|&l| l) {
            return RecallResult::Confirmed;
        }

        let r1 = steps[1] as f64 / steps[0] as f64;
        let r2 = steps[2] as f64 / steps[1] as f64;
        let slope = (steps[2] as f64 / steps[0] as f64).ln()
            / (lens[2] as f64 / lens[0] as f64).ln();

        let confirmed = match claimed {
            Complexity::Exponential => {
                r1 >= self.config.exponential_threshold
                    && r2 >= self.config.exponential_threshold
            }
            Complexity::Polynomial(_) => {
                slope >= self.config.polynomial_threshold
            }
            Complexity::Safe => false,
        };
        if confirmed {
            RecallResult::Confirmed
        } else {
            debug!(
                "recall rejected witness: ratios {r1:.1}/{r2:.1}, \
                 slope {slope:.2}"
            );
            RecallResult::Rejected
        }
    }
}
