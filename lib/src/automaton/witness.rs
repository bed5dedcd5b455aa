/*!
Turns ambiguity candidates into concrete attack patterns.

The pump word comes from the candidate's cycle. The prefix is the
shortest word driving the automaton from an initial state onto the
cycle, dropped entirely when the pump itself already spells it. The
suffix is a single character chosen so that it can neither continue the
pattern after the ambiguous region nor extend the pump, which forces the
failure that triggers backtracking.
*/

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::automaton::nfa_wla::NfaWla;
use crate::automaton::scc::Candidate;
use crate::diagnostics::{AttackPattern, Complexity, Hotspot};
use crate::parser::ast::Pattern;
use crate::parser::charset::CharSet;

/// Cap on the default pump count of exponential attacks; doubling work
/// per pump makes longer defaults pointless.
const MAX_EXPONENTIAL_REPEAT: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct Witness {
    pub attack: AttackPattern,
    pub hotspot: Hotspot,
}

pub(crate) fn synthesize(
    wla: &NfaWla,
    pattern: &Pattern,
    candidate: &Candidate,
    complexity: Complexity,
    max_attack_length: usize,
) -> Option<Witness> {
    let pump: String = candidate
        .pump
        .iter()
        .map(|&atom| wla.atoms[atom as usize].sample())
        .collect::<Option<String>>()?;
    if pump.is_empty() {
        return None;
    }

    let mut prefix = prefix_word(wla, candidate.anchor)?;
    if is_pump_aligned(&prefix, &pump) {
        prefix.clear();
    }

    let suffix = suffix_char(wla, candidate)?;

    let base = prefix.chars().count() + 1;
    let pump_len = pump.chars().count();
    let fit = max_attack_length.saturating_sub(base) / pump_len;
    let repeat = match complexity {
        Complexity::Exponential => fit.min(MAX_EXPONENTIAL_REPEAT),
        _ => fit,
    }
    .max(1);

    let attack =
        AttackPattern::new(prefix, pump, suffix.to_string(), repeat);
    let hotspot = hotspot(wla, pattern, &candidate.involved);
    Some(Witness { attack, hotspot })
}

/// Shortest word from an initial state to `target`, as sample chars.
fn prefix_word(wla: &NfaWla, target: u32) -> Option<String> {
    let mut prev: FxHashMap<u32, (u32, u32)> = FxHashMap::default();
    let mut queue: VecDeque<u32> = VecDeque::new();
    let mut seen: FxHashSet<u32> = FxHashSet::default();
    for &init in &wla.initials {
        if init == target {
            return Some(String::new());
        }
        if seen.insert(init) {
            queue.push_back(init);
        }
    }
    while let Some(s) = queue.pop_front() {
        for edge in &wla.edges[s as usize] {
            if edge.atom == wla.end_atom || !seen.insert(edge.target) {
                continue;
            }
            prev.insert(edge.target, (s, edge.atom));
            if edge.target == target {
                let mut atoms = Vec::new();
                let mut cur = target;
                while let Some(&(p, atom)) = prev.get(&cur) {
                    atoms.push(atom);
                    cur = p;
                }
                atoms.reverse();
                return atoms
                    .into_iter()
                    .map(|a| wla.atoms[a as usize].sample())
                    .collect();
            }
            queue.push_back(edge.target);
        }
    }
    None
}

/// Whether `prefix` is a prefix of the infinitely repeated pump; such a
/// prefix is redundant, the first pump copies play its role.
fn is_pump_aligned(prefix: &str, pump: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    prefix
        .chars()
        .zip(pump.chars().cycle())
        .all(|(a, b)| a == b)
}

/// A character that can neither leave the ambiguous region toward the
/// rest of the pattern nor continue the pump. When the two sets cover
/// the whole alphabet, avoiding the continuation alone is enough: a
/// suffix that keeps looping still fails the pattern, it just fails
/// one character later.
fn suffix_char(wla: &NfaWla, candidate: &Candidate) -> Option<char> {
    let involved: FxHashSet<u32> =
        candidate.involved.iter().copied().collect();
    let mut exits = CharSet::empty();
    for &s in &candidate.involved {
        for edge in &wla.edges[s as usize] {
            if edge.atom != wla.end_atom && !involved.contains(&edge.target)
            {
                exits.union(&wla.atoms[edge.atom as usize]);
            }
        }
    }
    let mut pump_chars = CharSet::empty();
    for &atom in &candidate.pump {
        pump_chars.union(&wla.atoms[atom as usize]);
    }
    let mut blocked = exits.clone();
    blocked.union(&pump_chars);
    blocked
        .complement_sample()
        .or_else(|| exits.complement_sample())
        .or_else(|| pump_chars.complement_sample())
        .or(Some('\u{0}'))
}

fn hotspot(wla: &NfaWla, pattern: &Pattern, involved: &[u32]) -> Hotspot {
    let mut start = usize::MAX;
    let mut end = 0usize;
    for &s in involved {
        let span = wla.spans[s as usize];
        start = start.min(span.start);
        end = end.max(span.end);
    }
    if start > end {
        start = 0;
        end = pattern.source.len();
    }
    Hotspot {
        start,
        end,
        text: pattern
            .span_text(&crate::parser::ast::Span::new(start, end))
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_pump_aligned, synthesize};
    use crate::automaton::eps_nfa::EpsNfa;
    use crate::automaton::nfa_wla::NfaWla;
    use crate::automaton::ordered_nfa::OrderedNfa;
    use crate::automaton::scc::{analyze, AnalyzerOptions, Verdict};
    use crate::config::{Budget, MatchMode};
    use crate::parser::parse;
    use crate::Flags;

    fn witnesses(src: &str) -> Vec<super::Witness> {
        let pattern = parse(src, Flags::default()).unwrap();
        let ordered =
            OrderedNfa::from_eps_nfa(&EpsNfa::build(&pattern).unwrap());
        let wla = NfaWla::build(&ordered, 20_000).unwrap();
        let options = AnalyzerOptions {
            match_mode: MatchMode::Auto,
            has_end_anchor: pattern.root.has_end_anchor(),
            attack_limit: 20,
        };
        match analyze(&wla, &options, &Budget::unlimited()) {
            Verdict::Vulnerable { complexity, candidates } => candidates
                .iter()
                .filter_map(|c| {
                    synthesize(&wla, &pattern, c, complexity, 4096)
                })
                .collect(),
            other => panic!("expected vulnerable, got {other:?}"),
        }
    }

    #[test]
    fn pump_alignment() {
        assert!(is_pump_aligned("", "a"));
        assert!(is_pump_aligned("a", "a"));
        assert!(is_pump_aligned("ab", "ab"));
        assert!(is_pump_aligned("aba", "ab"));
        assert!(!is_pump_aligned("b", "ab"));
    }

    #[test]
    fn nested_plus_attack_shape() {
        let witnesses = witnesses("^(a+)+$");
        let attack = &witnesses[0].attack;
        assert_eq!(attack.prefix, "");
        assert_eq!(attack.pump, "a");
        assert_eq!(attack.suffix, "!");
        assert!(attack.repeat >= 20);
        // The hotspot points inside the pattern.
        let hotspot = &witnesses[0].hotspot;
        assert!(hotspot.text.contains('a'));
    }

    #[test]
    fn continuation_aware_suffix() {
        // `@` continues the pattern, so the suffix must avoid it.
        let witnesses = witnesses("^([^@]+)+@");
        let attack = &witnesses[0].attack;
        assert_eq!(attack.pump, "a");
        assert_ne!(attack.suffix, "@");
    }

    #[test]
    fn polynomial_candidates_include_a_failing_pump() {
        let witnesses = witnesses(".*a.*a.*");
        // The chain atom 'a' comes first, but a pump avoiding 'a' is
        // among the candidates for recall to pick.
        assert_eq!(witnesses[0].attack.pump, "a");
        assert!(witnesses.iter().any(|w| w.attack.pump != "a"));
    }
}
