/*!
Analysis configuration and budget tracking.

A [`Config`] is plain data; it can be shared freely between `check` calls
and carries no state. Budgets are materialized per call as [`Budget`]
deadlines that the analysis phases consult at coarse points.
*/

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Which analysis path to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckerKind {
    /// Let the feasibility gate decide.
    #[default]
    Auto,
    /// Force the automaton path; patterns it cannot model come back
    /// `Unknown`.
    Automaton,
    /// Force the fuzz path.
    Fuzz,
}

/// How implicit trailing context is treated when judging exploitability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Ambiguity is exploitable when an end anchor or a mandatory
    /// continuation forces backtracking.
    #[default]
    Auto,
    /// Assume the engine must match the whole input; every ambiguity is
    /// exploitable.
    Full,
    /// Require both an end anchor and a mandatory continuation.
    Partial,
}

/// Seed generation strategy for the fuzz checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeederKind {
    /// Seeds derived from the AST only.
    #[default]
    Static,
    /// Static seeds plus an up-front round of mutations.
    Dynamic,
}

/// Whether the fuzz checker may skip intermediate lengths once growth
/// looks flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationMode {
    #[default]
    Auto,
    On,
    Off,
}

/// Default RNG seed; fuzzing is deterministic unless a caller supplies
/// its own seed.
pub const DEFAULT_SEED: u64 = 0x5eed_0d0c;

/// Configuration for a `check` call. Create with [`Config::default`] and
/// refine with the builder-style setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Analysis path selection.
    pub checker: CheckerKind,
    /// Exploitability mode, see [`MatchMode`].
    pub match_mode: MatchMode,
    /// Overall wall-clock budget for one `check` call.
    pub timeout: Duration,
    /// Wall-clock budget for a single recall trial.
    pub recall_timeout: Duration,
    /// Maximum length, in characters, of a generated attack string.
    pub max_attack_length: usize,
    /// Maximum number of witness candidates retained for validation.
    pub attack_limit: usize,
    /// Fuzzing iteration budget.
    pub max_iterations: usize,
    /// State-count cap for the look-ahead product automaton; beyond it
    /// the analysis falls back to fuzzing.
    pub max_nfa_size: usize,
    /// Cap on the unrolled AST size; beyond it the analysis falls back
    /// to fuzzing.
    pub max_pattern_size: usize,
    /// Maximum number of recall attempts per check.
    pub recall_limit: usize,
    /// Bypass recall validation and trust the static witness.
    pub skip_recall: bool,
    /// RNG seed for the fuzz path.
    pub random_seed: u64,
    /// Seed generation strategy.
    pub seeder: SeederKind,
    /// Fuzzing acceleration, see [`AccelerationMode`].
    pub acceleration: AccelerationMode,
    /// Step-growth ratio per pump doubling above which growth is called
    /// exponential. A linear pattern stays close to 2.
    pub exponential_threshold: f64,
    /// Log-log slope below which growth is considered linear.
    pub polynomial_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checker: CheckerKind::Auto,
            match_mode: MatchMode::Auto,
            timeout: Duration::from_secs(10),
            recall_timeout: Duration::from_secs(1),
            max_attack_length: 4096,
            attack_limit: 20,
            max_iterations: 500,
            max_nfa_size: 20_000,
            max_pattern_size: 1_500,
            recall_limit: 12,
            skip_recall: false,
            random_seed: DEFAULT_SEED,
            seeder: SeederKind::Static,
            acceleration: AccelerationMode::Auto,
            exponential_threshold: 8.0,
            polynomial_threshold: 1.5,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checker(mut self, checker: CheckerKind) -> Self {
        self.checker = checker;
        self
    }

    pub fn match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn recall_timeout(mut self, timeout: Duration) -> Self {
        self.recall_timeout = timeout;
        self
    }

    pub fn max_attack_length(mut self, len: usize) -> Self {
        self.max_attack_length = len;
        self
    }

    pub fn attack_limit(mut self, limit: usize) -> Self {
        self.attack_limit = limit;
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    pub fn max_nfa_size(mut self, size: usize) -> Self {
        self.max_nfa_size = size;
        self
    }

    pub fn max_pattern_size(mut self, size: usize) -> Self {
        self.max_pattern_size = size;
        self
    }

    pub fn recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    pub fn skip_recall(mut self, yes: bool) -> Self {
        self.skip_recall = yes;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn seeder(mut self, seeder: SeederKind) -> Self {
        self.seeder = seeder;
        self
    }

    pub fn acceleration(mut self, mode: AccelerationMode) -> Self {
        self.acceleration = mode;
        self
    }
}

/// A wall-clock deadline consulted at coarse points. Cloneable so that
/// sub-phases can carry their own copy.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    pub fn new(timeout: Duration) -> Self {
        Self { deadline: Instant::now().checked_add(timeout) }
    }

    /// A budget that never expires, for unit tests.
    #[cfg(test)]
    pub fn unlimited() -> Self {
        Self { deadline: None }
    }

    pub fn expired(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// The tighter of this budget and `timeout` from now.
    pub fn limited_by(&self, timeout: Duration) -> Budget {
        let other = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, other) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Budget { deadline }
    }
}
