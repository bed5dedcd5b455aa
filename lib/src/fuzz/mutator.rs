/*!
Biased mutation of seed strings.

Mutations favor the edits that historically expose backtracking blowups:
growing the pump, splicing in characters from the pattern's own classes,
and rotating the pump so that overlapping parses line up differently.
All randomness comes from the seeded RNG, so runs are reproducible.
*/

use rand::rngs::StdRng;
use rand::Rng;

use crate::diagnostics::AttackPattern;
use crate::flags::Flags;
use crate::parser::ast::{Node, Pattern};

pub(crate) struct Mutator {
    rng: StdRng,
    /// Sample characters drawn from the pattern's literals and classes.
    alphabet: Vec<char>,
    fail_char: char,
}

impl Mutator {
    pub fn new(pattern: &Pattern, rng: StdRng) -> Self {
        let alphabet = pattern_alphabet(&pattern.root, &pattern.flags);
        let fail_char = pattern
            .root
            .mentioned_chars(&pattern.flags)
            .complement_sample()
            .unwrap_or('\u{0}');
        Self { rng, alphabet, fail_char }
    }

    pub fn mutate(&mut self, seed: &AttackPattern) -> AttackPattern {
        let mut prefix = seed.prefix.clone();
        let mut pump = seed.pump.clone();
        let mut suffix = seed.suffix.clone();

        match self.rng.gen_range(0..6u8) {
            // Double the pump.
            0 => pump = format!("{pump}{pump}"),
            // Splice a class character into the pump.
            1 => {
                if let Some(&c) = self.pick() {
                    let at = self.rng.gen_range(0..=pump.chars().count());
                    let mut chars: Vec<char> = pump.chars().collect();
                    chars.insert(at, c);
                    pump = chars.into_iter().collect();
                }
            }
            // Rotate the pump by one character.
            2 => {
                let mut chars: Vec<char> = pump.chars().collect();
                if chars.len() > 1 {
                    chars.rotate_left(1);
                    pump = chars.into_iter().collect();
                }
            }
            // Grow the prefix with a class character.
            3 => {
                if let Some(&c) = self.pick() {
                    prefix.push(c);
                }
            }
            // Toggle the suffix between failing and empty.
            4 => {
                suffix = if suffix.is_empty() {
                    self.fail_char.to_string()
                } else {
                    String::new()
                };
            }
            // Append half of the pump to itself, offsetting overlaps.
            _ => {
                let chars: Vec<char> = pump.chars().collect();
                let half: String =
                    chars[..chars.len().div_ceil(2)].iter().collect();
                pump = format!("{pump}{half}");
            }
        }

        AttackPattern::new(prefix, pump, suffix, seed.repeat)
    }

    fn pick(&mut self) -> Option<&char> {
        if self.alphabet.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..self.alphabet.len());
        self.alphabet.get(i)
    }
}

fn pattern_alphabet(root: &Node, flags: &Flags) -> Vec<char> {
    let mut alphabet = Vec::new();
    root.walk(&mut |node| {
        if let Some(set) = node.char_set(flags) {
            if let Some(c) = set.sample() {
                if !alphabet.contains(&c) && alphabet.len() < 16 {
                    alphabet.push(c);
                }
            }
        }
        true
    });
    alphabet
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::Mutator;
    use crate::diagnostics::AttackPattern;
    use crate::parser::parse;
    use crate::Flags;

    #[test]
    fn mutation_is_deterministic_for_a_seed() {
        let pattern = parse("^(a|b)+c$", Flags::default()).unwrap();
        let seed = AttackPattern::new("", "ab", "!", 4);
        let run = |seed_value: u64| {
            let mut mutator =
                Mutator::new(&pattern, StdRng::seed_from_u64(seed_value));
            (0..8).map(|_| mutator.mutate(&seed)).collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn mutations_keep_a_pump() {
        let pattern = parse("^(a+)+$", Flags::default()).unwrap();
        let mut mutator =
            Mutator::new(&pattern, StdRng::seed_from_u64(7));
        let seed = AttackPattern::new("", "a", "!", 4);
        for _ in 0..32 {
            let mutated = mutator.mutate(&seed);
            assert!(!mutated.pump.is_empty());
        }
    }
}
