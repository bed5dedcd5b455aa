/*!
Seed derivation for the fuzz checker.

Seeds are structured strings with a pump region, derived from the AST:
every unbounded (or large-bound) repetition contributes its shortest
sample word as a pump, alternations under a repetition additionally
contribute pairwise concatenations of their branch samples (the shape
that exposes overlap ambiguity like `(a|b|ab)*`), and the suffix is a
character foreign to the pattern so that match attempts fail.
*/

use itertools::Itertools;

use crate::config::SeederKind;
use crate::diagnostics::AttackPattern;
use crate::flags::Flags;
use crate::parser::ast::{Node, Pattern};

/// Repetitions with a bound at least this large are treated as pumps.
const PUMP_BOUND: u32 = 4;

/// Cap on generated seeds.
const MAX_SEEDS: usize = 64;

pub(crate) struct Seeder<'a> {
    pattern: &'a Pattern,
    fail_char: char,
    seeds: Vec<AttackPattern>,
}

impl<'a> Seeder<'a> {
    pub fn seeds(pattern: &'a Pattern, kind: SeederKind) -> Vec<AttackPattern> {
        let fail_char = pattern
            .root
            .mentioned_chars(&pattern.flags)
            .complement_sample()
            .unwrap_or('\u{0}');
        let mut seeder = Seeder { pattern, fail_char, seeds: Vec::new() };
        seeder.collect(&pattern.root);

        // A seed for the pattern as a whole: its own sample, repeated.
        if let Some(sample) = sample_min(&pattern.root, &pattern.flags) {
            if !sample.is_empty() {
                seeder.push("", &sample, &fail_char.to_string());
            }
        }

        let mut seeds = seeder.seeds;
        if kind == SeederKind::Dynamic {
            // Dynamic seeding primes the corpus with doubled pumps up
            // front instead of waiting for mutation to find them.
            let doubled: Vec<AttackPattern> = seeds
                .iter()
                .map(|s| {
                    AttackPattern::new(
                        s.prefix.clone(),
                        format!("{}{}", s.pump, s.pump),
                        s.suffix.clone(),
                        s.repeat,
                    )
                })
                .collect();
            seeds.extend(doubled);
        }
        seeds.truncate(MAX_SEEDS);
        seeds
    }

    fn push(&mut self, prefix: &str, pump: &str, suffix: &str) {
        if pump.is_empty() || self.seeds.len() >= MAX_SEEDS {
            return;
        }
        let attack = AttackPattern::new(prefix, pump, suffix, 4);
        if !self.seeds.contains(&attack) {
            self.seeds.push(attack);
        }
    }

    fn collect(&mut self, node: &Node) {
        match node {
            Node::Repeat { child, min, max, .. } => {
                if max.map_or(true, |m| m >= PUMP_BOUND) {
                    self.pumps_for(child);
                    // Repetition expansions: empty, one and min+1 copies
                    // are the interesting lengths around the bound.
                    if let Some(sample) =
                        sample_min(child, &self.pattern.flags)
                    {
                        if !sample.is_empty() && *min > 1 {
                            let expanded =
                                sample.repeat(*min as usize + 1);
                            self.push(
                                "",
                                &expanded,
                                &self.fail_char.to_string(),
                            );
                        }
                    }
                }
                self.collect(child);
            }
            Node::Concat { children, .. } | Node::Alt { children, .. } => {
                for child in children {
                    self.collect(child);
                }
            }
            Node::Group { child, .. } | Node::Look { child, .. } => {
                self.collect(child)
            }
            _ => {}
        }
    }

    /// Pump words for a repetition body: its sample, and for an
    /// alternation body every branch sample plus pairwise
    /// concatenations.
    fn pumps_for(&mut self, body: &Node) {
        let flags = self.pattern.flags;
        let suffix = self.fail_char.to_string();
        if let Some(sample) = sample_min(body, &flags) {
            self.push("", &sample, &suffix);
            self.push("", &sample, "");
        }
        let alt = match body {
            Node::Alt { .. } => Some(body),
            Node::Group { child, .. } => match child.as_ref() {
                Node::Alt { .. } => Some(child.as_ref()),
                _ => None,
            },
            _ => None,
        };
        if let Some(Node::Alt { children, .. }) = alt {
            let samples: Vec<String> = children
                .iter()
                .filter_map(|c| sample_min(c, &flags))
                .filter(|s| !s.is_empty())
                .collect();
            for sample in &samples {
                self.push("", sample, &suffix);
            }
            for (a, b) in
                samples.iter().cartesian_product(samples.iter())
            {
                if a != b {
                    self.push("", &format!("{a}{b}"), &suffix);
                }
            }
        }
    }
}

/// Shortest sample string the node can match. Zero-width nodes sample
/// as the empty string; backreferences approximate to empty.
pub(crate) fn sample_min(node: &Node, flags: &Flags) -> Option<String> {
    match node {
        Node::Empty(_)
        | Node::Anchor { .. }
        | Node::Look { .. }
        | Node::Backref { .. } => Some(String::new()),
        Node::Literal { c, .. } => Some(c.to_string()),
        Node::Class { .. } | Node::Dot { .. } | Node::AnyChar { .. } => {
            node.char_set(flags)?.sample().map(|c| c.to_string())
        }
        Node::Concat { children, .. } => {
            let mut s = String::new();
            for child in children {
                s.push_str(&sample_min(child, flags)?);
            }
            Some(s)
        }
        Node::Alt { children, .. } => {
            sample_min(children.first()?, flags)
        }
        Node::Repeat { child, min, .. } => {
            let unit = sample_min(child, flags)?;
            Some(unit.repeat(*min as usize))
        }
        Node::Group { child, .. } => sample_min(child, flags),
    }
}

#[cfg(test)]
mod tests {
    use super::{sample_min, Seeder};
    use crate::config::SeederKind;
    use crate::parser::parse;
    use crate::Flags;

    #[test]
    fn samples_are_minimal() {
        let pattern = parse("^a{3}(b|cd)$", Flags::default()).unwrap();
        assert_eq!(
            sample_min(&pattern.root, &pattern.flags).unwrap(),
            "aaab"
        );
    }

    #[test]
    fn repetition_bodies_become_pumps() {
        let pattern = parse("^(a+)+$", Flags::default()).unwrap();
        let seeds = Seeder::seeds(&pattern, SeederKind::Static);
        assert!(seeds.iter().any(|s| s.pump == "a"));
        // Suffix is foreign to the pattern.
        assert!(seeds.iter().all(|s| !s.suffix.contains('a')));
    }

    #[test]
    fn alternation_pumps_include_concatenations() {
        let pattern = parse("^(a|b|ab)*$", Flags::default()).unwrap();
        let seeds = Seeder::seeds(&pattern, SeederKind::Static);
        let pumps: Vec<&str> =
            seeds.iter().map(|s| s.pump.as_str()).collect();
        assert!(pumps.contains(&"ab"));
        assert!(pumps.contains(&"ba") || pumps.contains(&"aab"));
    }

    #[test]
    fn dynamic_seeder_adds_doubled_pumps() {
        let pattern = parse("^(a+)+$", Flags::default()).unwrap();
        let static_seeds =
            Seeder::seeds(&pattern, SeederKind::Static).len();
        let dynamic_seeds =
            Seeder::seeds(&pattern, SeederKind::Dynamic).len();
        assert!(dynamic_seeds > static_seeds);
    }
}
