/*!
SCC-based ambiguity analysis of the look-ahead product.

Two ambiguity shapes are searched inside the strongly connected
components of the product automaton:

- **EDA** (exponential): a state that loops back to itself through two
  distinguishable paths spelling the same word. Evidence is either a
  transition duplicated by ε-path multiplicity, or a pair-graph component
  containing both a diagonal and a non-diagonal pair.
- **IDA** (polynomial): a chain of distinct components that all loop on a
  common symbol and are connected by paths spelling only that symbol.
  The polynomial degree is the length of the longest such chain.

Both are filtered by exploitability before being reported: a loop whose
states can already accept through ε alone never forces backtracking, so
ambiguity inside it is harmless; this is what keeps `(a*)*` safe while
`^(a*)*$` stays exponential.
*/

use rustc_hash::{FxHashMap, FxHashSet};

use crate::automaton::nfa_wla::NfaWla;
use crate::config::{Budget, MatchMode};
use crate::diagnostics::Complexity;

/// Upper bound on pair-graph size; larger components skip the pair-graph
/// test (the multi-transition test still applies).
const MAX_PAIR_STATES: usize = 250_000;

/// A witness candidate handed to the attack synthesizer. Candidates are
/// ordered best-first; the recall validator picks the first one that
/// demonstrably blows up.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Pump word as atom indices.
    pub pump: Vec<u32>,
    /// A product state on the pump cycle.
    pub anchor: u32,
    /// Product states participating in the ambiguity, for the hotspot.
    pub involved: Vec<u32>,
}

#[derive(Debug)]
pub(crate) enum Verdict {
    Safe,
    Vulnerable { complexity: Complexity, candidates: Vec<Candidate> },
    /// The analysis deadline expired mid-phase.
    Budget,
}

pub(crate) struct AnalyzerOptions {
    pub match_mode: MatchMode,
    /// AST-level: the pattern contains `$` or `\Z`.
    pub has_end_anchor: bool,
    /// Cap on retained candidates.
    pub attack_limit: usize,
}

/// Iterative Tarjan. Returns a component id per node; ids are assigned
/// in reverse-topological completion order.
pub(crate) fn strongly_connected_components(adj: &[Vec<u32>]) -> Vec<u32> {
    const UNDEF: u32 = u32::MAX;
    let n = adj.len();
    let mut index = vec![UNDEF; n];
    let mut low = vec![0u32; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<u32> = Vec::new();
    let mut comp = vec![UNDEF; n];
    let mut next_index = 0u32;
    let mut n_comps = 0u32;
    let mut frames: Vec<(u32, usize)> = Vec::new();

    for root in 0..n as u32 {
        if index[root as usize] != UNDEF {
            continue;
        }
        frames.push((root, 0));
        while let Some(frame) = frames.last_mut() {
            let (v, i) = (frame.0 as usize, &mut frame.1);
            if *i == 0 {
                index[v] = next_index;
                low[v] = next_index;
                next_index += 1;
                stack.push(v as u32);
                on_stack[v] = true;
            }
            if *i < adj[v].len() {
                let w = adj[v][*i] as usize;
                *i += 1;
                if index[w] == UNDEF {
                    frames.push((w as u32, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
            } else {
                let v_low = low[v];
                frames.pop();
                if let Some(parent) = frames.last() {
                    let p = parent.0 as usize;
                    low[p] = low[p].min(v_low);
                }
                if v_low == index[v] {
                    loop {
                        let w = stack.pop().unwrap() as usize;
                        on_stack[w] = false;
                        comp[w] = n_comps;
                        if w == v {
                            break;
                        }
                    }
                    n_comps += 1;
                }
            }
        }
    }
    comp
}

pub(crate) fn analyze(
    wla: &NfaWla,
    options: &AnalyzerOptions,
    budget: &Budget,
) -> Verdict {
    let n = wla.len();
    if n == 0 {
        return Verdict::Safe;
    }
    if budget.expired() {
        return Verdict::Budget;
    }

    // SCCs over character transitions only; the end symbol cannot be
    // pumped.
    let char_adj: Vec<Vec<u32>> = (0..n)
        .map(|s| {
            wla.edges[s]
                .iter()
                .filter(|e| e.atom != wla.end_atom)
                .map(|e| e.target)
                .collect()
        })
        .collect();
    let comp = strongly_connected_components(&char_adj);
    let n_comps =
        comp.iter().copied().max().map(|c| c as usize + 1).unwrap_or(0);

    let mut comp_states: Vec<Vec<u32>> = vec![Vec::new(); n_comps];
    for s in 0..n {
        comp_states[comp[s] as usize].push(s as u32);
    }

    let mut nontrivial = vec![false; n_comps];
    for (c, states) in comp_states.iter().enumerate() {
        nontrivial[c] = states.len() > 1
            || states.iter().any(|&s| {
                wla.edges[s as usize]
                    .iter()
                    .any(|e| e.atom != wla.end_atom && e.target == s)
            });
    }

    // Exploitability: ambiguity in a loop only forces backtracking when
    // the loop cannot freely accept.
    let exploitable: Vec<bool> = comp_states
        .iter()
        .enumerate()
        .map(|(c, states)| {
            if !nontrivial[c] {
                return false;
            }
            let no_free_accept =
                states.iter().all(|&s| !wla.free_accept[s as usize]);
            match options.match_mode {
                MatchMode::Full => true,
                MatchMode::Auto => no_free_accept,
                MatchMode::Partial => {
                    options.has_end_anchor && no_free_accept
                }
            }
        })
        .collect();

    let eda = find_eda(wla, &comp, &comp_states, &exploitable, budget);
    if budget.expired() {
        return Verdict::Budget;
    }
    if !eda.is_empty() {
        let mut candidates = eda;
        candidates.truncate(options.attack_limit);
        return Verdict::Vulnerable {
            complexity: Complexity::Exponential,
            candidates,
        };
    }

    let (degree, candidates) =
        find_ida(wla, &comp, &comp_states, &exploitable, options);
    if budget.expired() {
        return Verdict::Budget;
    }
    if degree >= 2 && !candidates.is_empty() {
        return Verdict::Vulnerable {
            complexity: Complexity::Polynomial(degree),
            candidates,
        };
    }

    Verdict::Safe
}

// -------------------------------------------------------------------
// EDA
// -------------------------------------------------------------------

fn find_eda(
    wla: &NfaWla,
    comp: &[u32],
    comp_states: &[Vec<u32>],
    exploitable: &[bool],
    budget: &Budget,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    // A transition reachable through two distinct ε-paths, sitting on a
    // cycle, can be pumped into exponentially many derivations. Also
    // covers literally duplicated (atom, target) transitions.
    for s in 0..wla.len() as u32 {
        let c = comp[s as usize] as usize;
        if !exploitable[c] {
            continue;
        }
        let mut seen: FxHashSet<(u32, u32)> = FxHashSet::default();
        for edge in &wla.edges[s as usize] {
            if edge.atom == wla.end_atom
                || comp[edge.target as usize] as usize != c
            {
                continue;
            }
            let duplicated = !seen.insert((edge.atom, edge.target));
            if edge.multi || duplicated {
                let mut pump = vec![edge.atom];
                pump.extend(shortest_path_word(
                    wla,
                    &comp_states[c],
                    edge.target,
                    s,
                ));
                candidates.push(Candidate {
                    pump,
                    anchor: s,
                    involved: comp_states[c].clone(),
                });
                break;
            }
        }
    }

    if !candidates.is_empty() || budget.expired() {
        return candidates;
    }

    // Pair-graph test: two divergent same-word paths that reconverge.
    for (c, states) in comp_states.iter().enumerate() {
        if !exploitable[c] {
            continue;
        }
        if let Some(candidate) = pair_graph_eda(wla, states) {
            candidates.push(candidate);
        }
        if budget.expired() {
            break;
        }
    }
    candidates
}

/// Shortest word spelled by a path `from → to` inside one component.
/// Empty when `from == to`.
fn shortest_path_word(
    wla: &NfaWla,
    states: &[u32],
    from: u32,
    to: u32,
) -> Vec<u32> {
    if from == to {
        return Vec::new();
    }
    let members: FxHashSet<u32> = states.iter().copied().collect();
    let mut prev: FxHashMap<u32, (u32, u32)> = FxHashMap::default();
    let mut queue = std::collections::VecDeque::from([from]);
    while let Some(s) = queue.pop_front() {
        for edge in &wla.edges[s as usize] {
            if edge.atom == wla.end_atom || !members.contains(&edge.target) {
                continue;
            }
            if edge.target != from && !prev.contains_key(&edge.target) {
                prev.insert(edge.target, (s, edge.atom));
                if edge.target == to {
                    let mut word = Vec::new();
                    let mut cur = to;
                    while cur != from {
                        let (p, atom) = prev[&cur];
                        word.push(atom);
                        cur = p;
                    }
                    word.reverse();
                    return word;
                }
                queue.push_back(edge.target);
            }
        }
    }
    Vec::new()
}

/// Builds the self-product of one component and looks for a pair-SCC
/// containing both a diagonal `(q, q)` and a divergent pair: two
/// distinct paths spelling the same word from `q` back to `q`.
fn pair_graph_eda(wla: &NfaWla, states: &[u32]) -> Option<Candidate> {
    let k = states.len();
    if k < 2 || k * k > MAX_PAIR_STATES {
        if k * k > MAX_PAIR_STATES {
            log::warn!(
                "skipping pair-graph test on a component of {k} states"
            );
        }
        return None;
    }
    let local: FxHashMap<u32, usize> =
        states.iter().enumerate().map(|(i, &s)| (s, i)).collect();

    // In-component edges grouped by atom.
    let mut by_atom: FxHashMap<u32, Vec<(usize, usize)>> =
        FxHashMap::default();
    for (i, &s) in states.iter().enumerate() {
        for edge in &wla.edges[s as usize] {
            if edge.atom == wla.end_atom {
                continue;
            }
            if let Some(&j) = local.get(&edge.target) {
                by_atom.entry(edge.atom).or_default().push((i, j));
            }
        }
    }

    let pair = |a: usize, b: usize| a * k + b;
    let mut adj: Vec<Vec<u32>> = vec![Vec::new(); k * k];
    let mut labels: FxHashMap<(u32, u32), u32> = FxHashMap::default();
    let mut atoms: Vec<u32> = by_atom.keys().copied().collect();
    atoms.sort_unstable();
    for &atom in &atoms {
        let edges = &by_atom[&atom];
        if edges.len() * edges.len() > MAX_PAIR_STATES {
            log::warn!("pair-graph edge explosion, skipping atom {atom}");
            continue;
        }
        for &(u, u2) in edges {
            for &(v, v2) in edges {
                let from = pair(u, v) as u32;
                let to = pair(u2, v2) as u32;
                adj[from as usize].push(to);
                labels.entry((from, to)).or_insert(atom);
            }
        }
    }

    let pcomp = strongly_connected_components(&adj);
    let mut pcomp_size: FxHashMap<u32, usize> = FxHashMap::default();
    for &c in &pcomp {
        *pcomp_size.entry(c).or_insert(0) += 1;
    }
    let mut diagonal_of: FxHashMap<u32, usize> = FxHashMap::default();
    for d in 0..k {
        diagonal_of.insert(pcomp[pair(d, d)], d);
    }
    // Find a divergent pair sharing a component with a diagonal.
    let mut found: Option<(usize, usize, usize)> = None;
    'outer: for a in 0..k {
        for b in 0..k {
            if a == b {
                continue;
            }
            if let Some(&d) = diagonal_of.get(&pcomp[pair(a, b)]) {
                // The pair component must have an actual cycle.
                let has_cycle = pcomp_size[&pcomp[pair(a, b)]] > 1
                    || adj[pair(a, b)].contains(&(pair(a, b) as u32));
                if has_cycle {
                    found = Some((d, a, b));
                    break 'outer;
                }
            }
        }
    }
    let (d, a, b) = found?;

    // Pump word: diagonal → divergent pair → diagonal, restricted to the
    // pair component.
    let target_comp = pcomp[pair(a, b)];
    let word1 = pair_path_word(
        &adj,
        &labels,
        &pcomp,
        target_comp,
        pair(d, d) as u32,
        pair(a, b) as u32,
    )?;
    let word2 = pair_path_word(
        &adj,
        &labels,
        &pcomp,
        target_comp,
        pair(a, b) as u32,
        pair(d, d) as u32,
    )?;
    let mut pump = word1;
    pump.extend(word2);
    if pump.is_empty() {
        return None;
    }
    Some(Candidate {
        pump,
        anchor: states[d],
        involved: states.to_vec(),
    })
}

fn pair_path_word(
    adj: &[Vec<u32>],
    labels: &FxHashMap<(u32, u32), u32>,
    pcomp: &[u32],
    within: u32,
    from: u32,
    to: u32,
) -> Option<Vec<u32>> {
    if from == to {
        return Some(Vec::new());
    }
    let mut prev: FxHashMap<u32, u32> = FxHashMap::default();
    let mut queue = std::collections::VecDeque::from([from]);
    while let Some(s) = queue.pop_front() {
        for &t in &adj[s as usize] {
            if pcomp[t as usize] != within {
                continue;
            }
            if t != from && !prev.contains_key(&t) {
                prev.insert(t, s);
                if t == to {
                    let mut word = Vec::new();
                    let mut cur = to;
                    while cur != from {
                        let p = prev[&cur];
                        word.push(labels[&(p, cur)]);
                        cur = p;
                    }
                    word.reverse();
                    return Some(word);
                }
                queue.push_back(t);
            }
        }
    }
    None
}

// -------------------------------------------------------------------
// IDA
// -------------------------------------------------------------------

/// A component loops on an atom when its atom-restricted subgraph has a
/// cycle; the cycle provides the pump for that component.
fn atom_cycle(
    wla: &NfaWla,
    states: &[u32],
    atom: u32,
) -> Option<(u32, usize)> {
    let members: FxHashSet<u32> = states.iter().copied().collect();
    // Self-loops first: they give the shortest pump.
    for &s in states {
        if wla.edges[s as usize]
            .iter()
            .any(|e| e.atom == atom && e.target == s)
        {
            return Some((s, 1));
        }
    }
    // Otherwise find any cycle in the atom-only subgraph via BFS back to
    // the origin.
    for &s in states {
        let mut dist: FxHashMap<u32, usize> = FxHashMap::default();
        let mut queue = std::collections::VecDeque::from([(s, 0usize)]);
        while let Some((u, d)) = queue.pop_front() {
            for edge in &wla.edges[u as usize] {
                if edge.atom != atom || !members.contains(&edge.target) {
                    continue;
                }
                if edge.target == s {
                    return Some((s, d + 1));
                }
                if !dist.contains_key(&edge.target) {
                    dist.insert(edge.target, d + 1);
                    queue.push_back((edge.target, d + 1));
                }
            }
        }
    }
    None
}

fn find_ida(
    wla: &NfaWla,
    comp: &[u32],
    comp_states: &[Vec<u32>],
    exploitable: &[bool],
    options: &AnalyzerOptions,
) -> (u32, Vec<Candidate>) {
    let n_comps = comp_states.len();
    let n_atoms = wla.end_atom;

    // Atoms each exploitable component loops on, with the cycle witness.
    let mut loops: Vec<FxHashMap<u32, (u32, usize)>> =
        vec![FxHashMap::default(); n_comps];
    for c in 0..n_comps {
        if !exploitable[c] {
            continue;
        }
        for atom in 0..n_atoms {
            if let Some(cycle) = atom_cycle(wla, &comp_states[c], atom) {
                loops[c].insert(atom, cycle);
            }
        }
    }

    let mut best_degree = 0u32;
    let mut best: Option<(u32, Vec<usize>)> = None; // (atom, chain comps)

    for atom in 0..n_atoms {
        let looping: Vec<usize> = (0..n_comps)
            .filter(|&c| loops[c].contains_key(&atom))
            .collect();
        if looping.len() < 2 {
            continue;
        }

        // Meta edges: C → C' when some atom-only path leaves C and enters
        // C'. Distinct components cannot reach each other both ways, so
        // the meta graph is a DAG.
        let looping_set: FxHashSet<usize> =
            looping.iter().copied().collect();
        let mut meta: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for &c in &looping {
            let mut reached: FxHashSet<u32> = FxHashSet::default();
            let mut queue: std::collections::VecDeque<u32> =
                comp_states[c].iter().copied().collect();
            let origin: FxHashSet<u32> =
                comp_states[c].iter().copied().collect();
            while let Some(s) = queue.pop_front() {
                for edge in &wla.edges[s as usize] {
                    if edge.atom != atom {
                        continue;
                    }
                    if !origin.contains(&edge.target)
                        && reached.insert(edge.target)
                    {
                        queue.push_back(edge.target);
                    }
                }
            }
            let mut targets: Vec<usize> = reached
                .iter()
                .map(|&s| comp[s as usize] as usize)
                .filter(|t| *t != c && looping_set.contains(t))
                .collect();
            targets.sort_unstable();
            targets.dedup();
            meta.insert(c, targets);
        }

        // Longest chain in the meta DAG.
        let mut memo: FxHashMap<usize, (u32, Option<usize>)> =
            FxHashMap::default();
        for &c in &looping {
            chain_length(c, &meta, &mut memo);
        }
        for &c in &looping {
            let (len, _) = memo[&c];
            if len > best_degree {
                let mut chain = vec![c];
                let mut cur = c;
                while let Some(next) = memo[&cur].1 {
                    chain.push(next);
                    cur = next;
                }
                best_degree = len;
                best = Some((atom, chain));
            }
        }
    }

    let Some((chain_atom, chain)) = best else { return (0, Vec::new()) };
    if best_degree < 2 {
        return (best_degree, Vec::new());
    }

    let involved: Vec<u32> = chain
        .iter()
        .flat_map(|&c| comp_states[c].iter().copied())
        .collect();
    let first = chain[0];

    // Witness candidates: pump the chain atom first, then any other
    // symbol the head component loops on. The recall validator decides
    // which one actually blows up.
    let mut candidates = Vec::new();
    let mut atoms: Vec<u32> = loops[first].keys().copied().collect();
    atoms.sort_unstable();
    atoms.retain(|&a| a != chain_atom);
    atoms.insert(0, chain_atom);
    for atom in atoms {
        let (anchor, len) = loops[first][&atom];
        candidates.push(Candidate {
            pump: vec![atom; len],
            anchor,
            involved: involved.clone(),
        });
        if candidates.len() >= options.attack_limit {
            break;
        }
    }
    (best_degree, candidates)
}

fn chain_length(
    c: usize,
    meta: &FxHashMap<usize, Vec<usize>>,
    memo: &mut FxHashMap<usize, (u32, Option<usize>)>,
) -> u32 {
    if let Some(&(len, _)) = memo.get(&c) {
        return len;
    }
    // Mark to guard against unexpected cycles.
    memo.insert(c, (1, None));
    let mut best = (1u32, None);
    if let Some(targets) = meta.get(&c) {
        for &t in targets {
            let len = chain_length(t, meta, memo) + 1;
            if len > best.0 {
                best = (len, Some(t));
            }
        }
    }
    memo.insert(c, best);
    best.0
}

#[cfg(test)]
mod tests {
    use super::{analyze, strongly_connected_components, AnalyzerOptions, Verdict};
    use crate::automaton::eps_nfa::EpsNfa;
    use crate::automaton::nfa_wla::NfaWla;
    use crate::automaton::ordered_nfa::OrderedNfa;
    use crate::config::{Budget, MatchMode};
    use crate::diagnostics::Complexity;
    use crate::parser::parse;
    use crate::Flags;

    fn verdict(src: &str) -> Verdict {
        verdict_with(src, MatchMode::Auto)
    }

    fn verdict_with(src: &str, match_mode: MatchMode) -> Verdict {
        let pattern = parse(src, Flags::default()).unwrap();
        let ordered =
            OrderedNfa::from_eps_nfa(&EpsNfa::build(&pattern).unwrap());
        let wla = NfaWla::build(&ordered, 20_000).unwrap();
        let options = AnalyzerOptions {
            match_mode,
            has_end_anchor: pattern.root.has_end_anchor(),
            attack_limit: 20,
        };
        analyze(&wla, &options, &Budget::unlimited())
    }

    #[test]
    fn tarjan_splits_components() {
        // 0 ↔ 1, 2 alone, 3 self-loop.
        let adj = vec![vec![1], vec![0], vec![0], vec![3]];
        let comp = strongly_connected_components(&adj);
        assert_eq!(comp[0], comp[1]);
        assert_ne!(comp[0], comp[2]);
        assert_ne!(comp[2], comp[3]);
    }

    #[test]
    fn safe_patterns() {
        for src in ["^a+$", "^[a-z]+$", "^(a|b)+$", "^\\d{1,10}$", "^hello$"]
        {
            assert!(
                matches!(verdict(src), Verdict::Safe),
                "{src} must be safe"
            );
        }
    }

    #[test]
    fn classic_exponential_patterns() {
        for src in ["^(a+)+$", "^(a|a)*$", "^(a|b|ab)*$", "^([a-z]+)+$", "^(a*)*$"]
        {
            match verdict(src) {
                Verdict::Vulnerable { complexity, candidates } => {
                    assert_eq!(
                        complexity,
                        Complexity::Exponential,
                        "{src}"
                    );
                    assert!(!candidates.is_empty(), "{src}");
                }
                other => panic!("{src} must be exponential, got {other:?}"),
            }
        }
    }

    #[test]
    fn anchoring_gates_exploitability() {
        // Free acceptance defuses the ambiguity.
        assert!(matches!(verdict("(a*)*"), Verdict::Safe));
        // A mandatory continuation keeps it exploitable without `$`.
        match verdict("^([^@]+)+@") {
            Verdict::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Exponential)
            }
            other => panic!("expected exponential, got {other:?}"),
        }
        // Full match mode is conservative.
        match verdict_with("(a*)*", MatchMode::Full) {
            Verdict::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Exponential)
            }
            other => panic!("expected exponential, got {other:?}"),
        }
    }

    #[test]
    fn polynomial_chains() {
        match verdict(".*a.*a.*") {
            Verdict::Vulnerable { complexity, candidates } => {
                assert_eq!(complexity, Complexity::Polynomial(2));
                assert!(candidates.len() >= 2);
            }
            other => panic!("expected polynomial, got {other:?}"),
        }
        match verdict(".*a.*a.*a.*") {
            Verdict::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Polynomial(3));
            }
            other => panic!("expected polynomial, got {other:?}"),
        }
    }

    #[test]
    fn overlapping_stars_are_polynomial() {
        match verdict("^a*aa*$") {
            Verdict::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Polynomial(2));
            }
            other => panic!("expected polynomial, got {other:?}"),
        }
    }

    #[test]
    fn disjoint_alternation_stays_safe() {
        for src in ["^(foo|bar)+$", "^([a-c]|[x-z])+$", "^(\\w|\\W)*$"] {
            assert!(
                matches!(verdict(src), Verdict::Safe),
                "{src} must be safe"
            );
        }
    }

    #[test]
    fn case_insensitive_overlap_is_detected() {
        let pattern =
            parse("^(a|B|Ab)*$", Flags::default().ignore_case(true))
                .unwrap();
        let ordered =
            OrderedNfa::from_eps_nfa(&EpsNfa::build(&pattern).unwrap());
        let wla = NfaWla::build(&ordered, 20_000).unwrap();
        let options = AnalyzerOptions {
            match_mode: MatchMode::Auto,
            has_end_anchor: true,
            attack_limit: 20,
        };
        match analyze(&wla, &options, &Budget::unlimited()) {
            Verdict::Vulnerable { complexity, .. } => {
                assert_eq!(complexity, Complexity::Exponential)
            }
            other => panic!("expected exponential, got {other:?}"),
        }
    }
}
