/*!
Analysis results: status, complexity class, attack pattern, hotspot and the
[`Diagnostics`] record that packages them.

The JSON field names produced here are stable and part of the public
contract; see the `serialization_round_trip` test.
*/

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::flags::Flags;

/// Overall verdict for a checked pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Safe,
    Vulnerable,
    Unknown,
    Error,
}

/// Which analysis path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checker {
    Automaton,
    Fuzz,
}

/// Worst-case matching-time class.
///
/// Ordered: `Safe < Polynomial(2) < Polynomial(3) < … < Exponential`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ComplexityRepr", try_from = "ComplexityRepr")]
pub enum Complexity {
    Safe,
    Polynomial(u32),
    Exponential,
}

impl Complexity {
    pub fn is_safe(&self) -> bool {
        matches!(self, Complexity::Safe)
    }

    pub fn is_polynomial(&self) -> bool {
        matches!(self, Complexity::Polynomial(_))
    }

    pub fn is_exponential(&self) -> bool {
        matches!(self, Complexity::Exponential)
    }

    pub fn degree(&self) -> Option<u32> {
        match self {
            Complexity::Polynomial(k) => Some(*k),
            _ => None,
        }
    }

    /// Canonical O-notation label.
    pub fn summary(&self) -> String {
        match self {
            Complexity::Safe => "O(n)".to_string(),
            Complexity::Polynomial(k) => format!("O(n^{k})"),
            Complexity::Exponential => "O(2^n)".to_string(),
        }
    }

    fn rank(&self) -> u64 {
        match self {
            Complexity::Safe => 0,
            Complexity::Polynomial(k) => u64::from(*k),
            Complexity::Exponential => u64::MAX,
        }
    }
}

impl PartialOrd for Complexity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Complexity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Display for Complexity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Stable serialized form of [`Complexity`].
#[derive(Serialize, Deserialize, Clone)]
struct ComplexityRepr {
    #[serde(rename = "type")]
    kind: String,
    degree: Option<u32>,
    summary: String,
}

impl From<Complexity> for ComplexityRepr {
    fn from(c: Complexity) -> Self {
        let kind = match c {
            Complexity::Safe => "safe",
            Complexity::Polynomial(_) => "polynomial",
            Complexity::Exponential => "exponential",
        };
        Self { kind: kind.to_string(), degree: c.degree(), summary: c.summary() }
    }
}

impl TryFrom<ComplexityRepr> for Complexity {
    type Error = String;

    fn try_from(repr: ComplexityRepr) -> Result<Self, Self::Error> {
        match (repr.kind.as_str(), repr.degree) {
            ("safe", _) => Ok(Complexity::Safe),
            ("polynomial", Some(k)) => Ok(Complexity::Polynomial(k)),
            ("exponential", _) => Ok(Complexity::Exponential),
            (kind, _) => Err(format!("bad complexity type `{kind}`")),
        }
    }
}

/// A structured attack witness. The attack string for pump count `n` is
/// `prefix + pump × n + suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "AttackRepr", from = "AttackRepr")]
pub struct AttackPattern {
    pub prefix: String,
    pub pump: String,
    pub suffix: String,
    /// Length of the fixed part of the attack.
    pub base: usize,
    /// Default pump count, chosen so the attack fits the configured
    /// maximum length.
    pub repeat: usize,
}

impl AttackPattern {
    pub fn new(
        prefix: impl Into<String>,
        pump: impl Into<String>,
        suffix: impl Into<String>,
        repeat: usize,
    ) -> Self {
        let prefix = prefix.into();
        let suffix = suffix.into();
        let base = prefix.chars().count() + suffix.chars().count();
        Self { prefix, pump: pump.into(), suffix, base, repeat }
    }

    /// Materializes the attack string for a given pump count.
    pub fn string(&self, n: usize) -> String {
        let mut s = String::with_capacity(
            self.prefix.len() + self.pump.len() * n + self.suffix.len(),
        );
        s.push_str(&self.prefix);
        for _ in 0..n {
            s.push_str(&self.pump);
        }
        s.push_str(&self.suffix);
        s
    }

    /// Attack string at the default pump count.
    pub fn default_string(&self) -> String {
        self.string(self.repeat)
    }

    /// Total length in characters at pump count `n`.
    pub fn len_at(&self, n: usize) -> usize {
        self.base + self.pump.chars().count() * n
    }
}

impl Display for AttackPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} + {:?} × {} + {:?}",
            self.prefix, self.pump, self.repeat, self.suffix
        )
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct AttackRepr {
    prefix: String,
    pump: String,
    suffix: String,
    base: usize,
    repeat: usize,
    string: String,
}

impl From<AttackPattern> for AttackRepr {
    fn from(a: AttackPattern) -> Self {
        let string = a.default_string();
        Self {
            prefix: a.prefix,
            pump: a.pump,
            suffix: a.suffix,
            base: a.base,
            repeat: a.repeat,
            string,
        }
    }
}

impl From<AttackRepr> for AttackPattern {
    fn from(r: AttackRepr) -> Self {
        Self {
            prefix: r.prefix,
            pump: r.pump,
            suffix: r.suffix,
            base: r.base,
            repeat: r.repeat,
        }
    }
}

/// The region of the pattern source responsible for the ambiguity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotspot {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// The full result of checking one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub status: Status,
    pub source: String,
    #[serde(
        serialize_with = "flags_to_string",
        deserialize_with = "flags_from_string"
    )]
    pub flags: Flags,
    pub complexity: Option<Complexity>,
    pub attack: Option<AttackPattern>,
    pub hotspot: Option<Hotspot>,
    pub checker: Checker,
    pub message: String,
    pub error: Option<String>,
}

fn flags_to_string<S: Serializer>(
    flags: &Flags,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&flags.to_string())
}

fn flags_from_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Flags, D::Error> {
    let s = String::deserialize(deserializer)?;
    Flags::parse(&s).map_err(|c| {
        serde::de::Error::custom(format!("unknown flag `{c}`"))
    })
}

impl Diagnostics {
    pub fn safe(
        source: impl Into<String>,
        flags: Flags,
        checker: Checker,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: Status::Safe,
            source: source.into(),
            flags,
            complexity: Some(Complexity::Safe),
            attack: None,
            hotspot: None,
            checker,
            message: message.into(),
            error: None,
        }
    }

    pub fn vulnerable(
        source: impl Into<String>,
        flags: Flags,
        checker: Checker,
        complexity: Complexity,
        attack: AttackPattern,
        hotspot: Option<Hotspot>,
    ) -> Self {
        let message = format!(
            "vulnerable: {} worst-case matching time, attack {}",
            complexity.summary(),
            attack,
        );
        Self {
            status: Status::Vulnerable,
            source: source.into(),
            flags,
            complexity: Some(complexity),
            attack: Some(attack),
            hotspot,
            checker,
            message,
            error: None,
        }
    }

    pub fn unknown(
        source: impl Into<String>,
        flags: Flags,
        checker: Checker,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: Status::Unknown,
            source: source.into(),
            flags,
            complexity: None,
            attack: None,
            hotspot: None,
            checker,
            message: message.into(),
            error: None,
        }
    }

    pub fn error(
        source: impl Into<String>,
        flags: Flags,
        error: impl Into<String>,
    ) -> Self {
        let error = error.into();
        Self {
            status: Status::Error,
            source: source.into(),
            flags,
            complexity: None,
            attack: None,
            hotspot: None,
            checker: Checker::Automaton,
            message: format!("error: {error}"),
            error: Some(error),
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        self.status == Status::Vulnerable
    }

    pub fn is_safe(&self) -> bool {
        self.status == Status::Safe
    }

    /// Serializes with the stable field names of the JSON contract.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("diagnostics always serialize")
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
