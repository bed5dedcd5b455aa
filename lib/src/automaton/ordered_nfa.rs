/*!
Priority-preserving ε-elimination.

The ordered NFA keeps the ε-NFA state identifiers but replaces ε-edges by
directly materialized character transitions, listed in the order a
backtracking engine would try them.

While eliminating ε-edges the builder counts, for every materialized
transition, the number of distinct ε-paths that lead from the closure
origin to the transition's source. Two or more paths mean the engine can
reach the very same transition in two different ways: the
multi-transition evidence behind patterns like `(a+)+`, where the inner
loop can be re-entered either directly or through the outer loop.
Counts saturate at two, and an ε-cycle anywhere on the way (an empty-
matching group under a repetition, say) saturates immediately.
*/

use smallvec::SmallVec;

use indexmap::IndexMap;

use crate::automaton::eps_nfa::{EpsLabel, EpsNfa, StateId};
use crate::automaton::scc::strongly_connected_components;
use crate::parser::ast::Span;
use crate::parser::charset::{atomize, CharSet};

/// A materialized transition. `atoms` are indices into
/// [`OrderedNfa::atoms`] (or the end symbol); edges keep their relative
/// priority order within the source state's list.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub atoms: SmallVec<[u32; 4]>,
    pub target: StateId,
    /// Reachable through two or more distinct ε-paths.
    pub multi: bool,
}

#[derive(Debug)]
pub(crate) struct OrderedNfa {
    pub n_states: usize,
    pub initial: StateId,
    /// Ordered transitions per state.
    pub edges: Vec<Vec<Edge>>,
    /// Whether the state can accept without consuming anything further
    /// (the accept state is in its pure-ε closure). This is the "free
    /// acceptance" predicate the exploitability filter relies on.
    pub accept: Vec<bool>,
    pub spans: Vec<Span>,
    /// Disjoint character classes forming the finite alphabet.
    pub atoms: Vec<CharSet>,
    /// Index of the virtual end-of-input symbol.
    pub end_atom: u32,
}

impl OrderedNfa {
    pub fn from_eps_nfa(eps: &EpsNfa) -> OrderedNfa {
        let n = eps.len();

        // ε-subgraph SCCs; a non-trivial component means unboundedly many
        // ε-paths through it.
        let mut eps_adj: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (s, edges) in eps.edges.iter().enumerate() {
            for edge in edges {
                if matches!(edge.label, EpsLabel::Eps) {
                    eps_adj[s].push(edge.target);
                }
            }
        }
        let comp = strongly_connected_components(&eps_adj);
        let n_comps =
            comp.iter().copied().max().map(|c| c as usize + 1).unwrap_or(0);
        let mut nontrivial = vec![false; n_comps];
        let mut comp_size = vec![0usize; n_comps];
        for s in 0..n {
            comp_size[comp[s] as usize] += 1;
        }
        for (s, targets) in eps_adj.iter().enumerate() {
            for &t in targets {
                if comp[s] == comp[t as usize] {
                    // Covers both self-loops and larger ε-cycles.
                    if comp_size[comp[s] as usize] > 1 || s == t as usize {
                        nontrivial[comp[s] as usize] = true;
                    }
                }
            }
        }

        let mut raw_edges: Vec<Vec<(CharSet, bool, StateId, bool)>> =
            Vec::with_capacity(n);
        let mut accept = vec![false; n];

        for q in 0..n {
            let walk = ClosureWalk::run(eps, q as StateId);
            accept[q] = walk.closure.contains(&eps.accept);

            let mult = path_multiplicity(
                eps,
                q as StateId,
                &walk.closure,
                &comp,
                &nontrivial,
            );

            let mut out = Vec::with_capacity(walk.emitted.len());
            for (source, edge_idx) in walk.emitted {
                let edge = &eps.edges[source as usize][edge_idx];
                let multi = mult[&source] >= 2;
                match &edge.label {
                    EpsLabel::Char(set) => {
                        out.push((set.clone(), false, edge.target, multi))
                    }
                    EpsLabel::End => out.push((
                        CharSet::empty(),
                        true,
                        edge.target,
                        multi,
                    )),
                    EpsLabel::Eps => unreachable!(),
                }
            }
            raw_edges.push(out);
        }

        // Deduplicate the character sets and split them into atoms.
        let mut set_keys: IndexMap<Vec<(u32, u32)>, CharSet> = IndexMap::new();
        for edges in &raw_edges {
            for (set, is_end, _, _) in edges {
                if !is_end {
                    set_keys.entry(set_key(set)).or_insert_with(|| set.clone());
                }
            }
        }
        let unique_sets: Vec<&CharSet> = set_keys.values().collect();
        let (atoms, memberships) = atomize(&unique_sets);
        let end_atom = atoms.len() as u32;

        let edges = raw_edges
            .into_iter()
            .map(|edges| {
                edges
                    .into_iter()
                    .map(|(set, is_end, target, multi)| {
                        let atoms: SmallVec<[u32; 4]> = if is_end {
                            SmallVec::from_slice(&[end_atom])
                        } else {
                            let idx = set_keys
                                .get_index_of(&set_key(&set))
                                .expect("set was interned above");
                            SmallVec::from_slice(&memberships[idx])
                        };
                        Edge { atoms, target, multi }
                    })
                    .collect()
            })
            .collect();

        OrderedNfa {
            n_states: n,
            initial: eps.initial,
            edges,
            accept,
            spans: eps.spans.clone(),
            atoms,
            end_atom,
        }
    }

    /// True if any transition anywhere carries the multi flag. Cheap
    /// pre-signal; the SCC analysis decides whether it is pumpable.
    pub fn has_multi_transitions(&self) -> bool {
        self.edges
            .iter()
            .any(|edges| edges.iter().any(|e| e.multi))
    }
}

fn set_key(set: &CharSet) -> Vec<(u32, u32)> {
    set.ranges().map(|(lo, hi)| (lo as u32, hi as u32)).collect()
}

/// Ordered depth-first ε-closure walk. Emits the character and end
/// transitions encountered, in the order a backtracker would try them,
/// and records the closure member set.
struct ClosureWalk {
    closure: Vec<StateId>,
    /// (source state, edge index) of each emitted non-ε transition.
    emitted: Vec<(StateId, usize)>,
}

impl ClosureWalk {
    fn run(eps: &EpsNfa, start: StateId) -> ClosureWalk {
        let mut walk =
            ClosureWalk { closure: Vec::new(), emitted: Vec::new() };
        let mut visited = vec![false; eps.len()];
        walk.visit(eps, start, &mut visited);
        walk
    }

    fn visit(&mut self, eps: &EpsNfa, state: StateId, visited: &mut [bool]) {
        if visited[state as usize] {
            return;
        }
        visited[state as usize] = true;
        self.closure.push(state);
        for (idx, edge) in eps.edges[state as usize].iter().enumerate() {
            match edge.label {
                EpsLabel::Eps => self.visit(eps, edge.target, visited),
                EpsLabel::Char(_) | EpsLabel::End => {
                    self.emitted.push((state, idx))
                }
            }
        }
    }
}

/// Number of distinct ε-paths from `start` to each closure member,
/// saturated at 2. Works on the condensation of the ε-subgraph so that
/// ε-cycles (unboundedly many paths) saturate immediately.
fn path_multiplicity(
    eps: &EpsNfa,
    start: StateId,
    closure: &[StateId],
    comp: &[u32],
    nontrivial: &[bool],
) -> rustc_hash::FxHashMap<StateId, u32> {
    use rustc_hash::{FxHashMap, FxHashSet};

    let members: FxHashSet<StateId> = closure.iter().copied().collect();

    // Multigraph between the components present in this closure; parallel
    // ε-edges between the same pair of components are two distinct paths,
    // so they are counted, not collapsed.
    let mut comp_edges: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    let mut in_degree: FxHashMap<u32, usize> = FxHashMap::default();
    let mut present: FxHashSet<u32> = FxHashSet::default();
    for &s in closure {
        present.insert(comp[s as usize]);
    }
    for &s in closure {
        for edge in &eps.edges[s as usize] {
            if !matches!(edge.label, EpsLabel::Eps) {
                continue;
            }
            if !members.contains(&edge.target) {
                continue;
            }
            let (cu, cv) = (comp[s as usize], comp[edge.target as usize]);
            if cu != cv {
                comp_edges.entry(cu).or_default().push(cv);
                *in_degree.entry(cv).or_insert(0) += 1;
            }
        }
    }

    // Kahn topological pass over the condensation, accumulating counts.
    let mut count: FxHashMap<u32, u32> = FxHashMap::default();
    let start_comp = comp[start as usize];
    count.insert(
        start_comp,
        if nontrivial[start_comp as usize] { 2 } else { 1 },
    );
    let mut queue: Vec<u32> = present
        .iter()
        .copied()
        .filter(|c| !in_degree.contains_key(c))
        .collect();
    queue.sort_unstable();
    let mut in_degree = in_degree;
    while let Some(c) = queue.pop() {
        let c_count = count.get(&c).copied().unwrap_or(0);
        let c_count = if c_count > 0 && nontrivial[c as usize] {
            2
        } else {
            c_count
        };
        count.insert(c, c_count);
        if let Some(targets) = comp_edges.get(&c) {
            for &t in targets {
                *count.entry(t).or_insert(0) =
                    (count.get(&t).copied().unwrap_or(0) + c_count).min(2);
                let d = in_degree.get_mut(&t).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push(t);
                }
            }
        }
    }

    closure
        .iter()
        .map(|&s| {
            let c = count.get(&comp[s as usize]).copied().unwrap_or(1);
            (s, c.max(1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::OrderedNfa;
    use crate::automaton::eps_nfa::EpsNfa;
    use crate::parser::parse;
    use crate::Flags;

    fn ordered(src: &str) -> OrderedNfa {
        let pattern = parse(src, Flags::default()).unwrap();
        OrderedNfa::from_eps_nfa(&EpsNfa::build(&pattern).unwrap())
    }

    #[test]
    fn simple_plus_has_no_multi_transitions() {
        assert!(!ordered("^a+$").has_multi_transitions());
        assert!(!ordered("^[a-z]+$").has_multi_transitions());
        assert!(!ordered("^(a|b)+$").has_multi_transitions());
    }

    #[test]
    fn nested_plus_has_multi_transitions() {
        // Inner loop re-enterable directly or through the outer loop.
        assert!(ordered("^(a+)+$").has_multi_transitions());
        assert!(ordered("^([a-z]+)+$").has_multi_transitions());
    }

    #[test]
    fn nested_star_saturates_through_eps_cycle() {
        assert!(ordered("^(a*)*$").has_multi_transitions());
    }

    #[test]
    fn free_acceptance() {
        // Unanchored: the loop exit reaches accept through ε only.
        let nfa = ordered("(a*)*");
        assert!(nfa.accept.iter().any(|&a| a));
        assert!(nfa.accept[nfa.initial as usize]);

        // Anchored: every acceptance must consume the end symbol first.
        let nfa = ordered("^(a*)*$");
        assert!(!nfa.accept[nfa.initial as usize]);
    }

    #[test]
    fn atoms_split_overlapping_classes() {
        let nfa = ordered("[ab]x[bc]");
        // {a}, {b}, {c}, {x}; b is shared so it becomes its own atom.
        assert_eq!(nfa.atoms.len(), 4);
    }

    #[test]
    fn priority_order_is_preserved() {
        let nfa = ordered("a|b");
        let edges = &nfa.edges[nfa.initial as usize];
        assert_eq!(edges.len(), 2);
        let a_atom = edges[0].atoms[0];
        assert!(nfa.atoms[a_atom as usize].contains('a'));
    }
}
