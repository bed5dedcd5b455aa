/*!
Look-ahead augmented NFA.

The ordered NFA is reversed and determinized by subset construction; the
resulting DFA state `D` at input position `i` is exactly the set of NFA
states from which the remaining input can reach acceptance. The product
automaton pairs every NFA state `q` with such a context `D`, restricted
to *consistent* pairs `q ∈ D`: a transition whose target context cannot
reach acceptance simply never materializes. This restriction is the
look-ahead pruning: ambiguity that only exists on dead branches becomes
invisible to the SCC analysis.

The product is then trimmed to states that are both reachable from the
initial pairs and co-reachable to the accepting pairs.
*/

use bitvec::vec::BitVec;
use indexmap::IndexMap;

use crate::automaton::eps_nfa::StateId;
use crate::automaton::ordered_nfa::OrderedNfa;
use crate::errors::Error;
use crate::parser::ast::Span;
use crate::parser::charset::CharSet;

/// A transition of the product automaton.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PEdge {
    pub atom: u32,
    pub target: u32,
    /// Carried over from the ordered NFA: this transition is reachable
    /// through two or more distinct ε-paths.
    pub multi: bool,
    /// Priority of the originating ordered-NFA transition; used only to
    /// keep iteration deterministic.
    pub order: u32,
}

#[derive(Debug)]
pub(crate) struct NfaWla {
    /// Disjoint character classes; indices are the `atom` values on edges.
    pub atoms: Vec<CharSet>,
    /// Index of the virtual end-of-input symbol.
    pub end_atom: u32,
    /// `(q, D)` per product state, `q` an ordered-NFA state and `D` a
    /// reverse-DFA state id.
    pub states: Vec<(StateId, u32)>,
    pub edges: Vec<Vec<PEdge>>,
    pub initials: Vec<u32>,
    /// True end-of-run accepting product states.
    pub accepting: Vec<bool>,
    /// Free acceptance of the underlying `q`: accept reachable through
    /// ε-transitions alone, with no further input.
    pub free_accept: Vec<bool>,
    pub spans: Vec<Span>,
}

impl NfaWla {
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Builds the pruned product. `max_size` bounds both the subset
    /// construction and the product; exceeding it reports
    /// [`Error::TooLarge`] so the caller can fall back to fuzzing.
    pub fn build(nfa: &OrderedNfa, max_size: usize) -> Result<NfaWla, Error> {
        let n = nfa.n_states;
        let n_symbols = nfa.end_atom as usize + 1;

        // Predecessors per (atom, state): rev[a][t] = sources with t
        // reachable on a.
        let mut rev: Vec<Vec<Vec<StateId>>> =
            vec![vec![Vec::new(); n]; n_symbols];
        // Forward transitions grouped by atom, in priority order.
        let mut fwd: Vec<Vec<(StateId, StateId, bool, u32)>> =
            vec![Vec::new(); n_symbols];
        for q in 0..n {
            for (order, edge) in nfa.edges[q].iter().enumerate() {
                for &atom in &edge.atoms {
                    rev[atom as usize][edge.target as usize]
                        .push(q as StateId);
                    fwd[atom as usize].push((
                        q as StateId,
                        edge.target,
                        edge.multi,
                        order as u32,
                    ));
                }
            }
        }

        // Subset construction over the reversed NFA. The initial subset
        // is the set of accepting states (empty remaining input).
        let accept_subset: Vec<StateId> = (0..n)
            .filter(|&q| nfa.accept[q])
            .map(|q| q as StateId)
            .collect();
        if accept_subset.is_empty() {
            return Ok(NfaWla::empty(nfa));
        }

        let mut subsets: IndexMap<Vec<StateId>, u32> = IndexMap::new();
        let mut member: Vec<BitVec> = Vec::new();
        let mut delta: Vec<Vec<Option<u32>>> = Vec::new();

        let intern = |subset: Vec<StateId>,
                      subsets: &mut IndexMap<Vec<StateId>, u32>,
                      member: &mut Vec<BitVec>,
                      delta: &mut Vec<Vec<Option<u32>>>|
         -> u32 {
            if let Some(&id) = subsets.get(&subset) {
                return id;
            }
            let id = subsets.len() as u32;
            let mut bits = BitVec::repeat(false, n);
            for &q in &subset {
                bits.set(q as usize, true);
            }
            member.push(bits);
            delta.push(vec![None; n_symbols]);
            subsets.insert(subset, id);
            id
        };

        intern(accept_subset, &mut subsets, &mut member, &mut delta);
        let mut next_unprocessed = 0usize;
        while next_unprocessed < subsets.len() {
            let d = next_unprocessed;
            next_unprocessed += 1;
            let current: Vec<StateId> =
                subsets.get_index(d).unwrap().0.clone();
            for atom in 0..n_symbols {
                let mut pred: Vec<StateId> = Vec::new();
                for &q in &current {
                    pred.extend_from_slice(&rev[atom][q as usize]);
                }
                if pred.is_empty() {
                    continue;
                }
                pred.sort_unstable();
                pred.dedup();
                let id =
                    intern(pred, &mut subsets, &mut member, &mut delta);
                delta[d][atom] = Some(id);
                if subsets.len() > max_size {
                    return Err(Error::TooLarge {
                        what: "look-ahead DFA",
                        size: subsets.len(),
                        limit: max_size,
                    });
                }
            }
        }
        let n_dfa = subsets.len();

        // Product over consistent pairs. A forward step on `a` from
        // context D to context D' requires D = δR(D', a).
        let mut product: IndexMap<(StateId, u32), u32> = IndexMap::new();
        let mut edges: Vec<Vec<PEdge>> = Vec::new();
        let mut intern_pair = |pair: (StateId, u32),
                               product: &mut IndexMap<(StateId, u32), u32>,
                               edges: &mut Vec<Vec<PEdge>>|
         -> u32 {
            *product.entry(pair).or_insert_with(|| {
                edges.push(Vec::new());
                (edges.len() - 1) as u32
            })
        };

        let mut edge_count = 0usize;
        for d_next in 0..n_dfa {
            for atom in 0..n_symbols {
                let Some(d_cur) = delta[d_next][atom] else { continue };
                for &(q, t, multi, order) in &fwd[atom] {
                    if !member[d_cur as usize][q as usize]
                        || !member[d_next][t as usize]
                    {
                        continue;
                    }
                    let src = intern_pair(
                        (q, d_cur),
                        &mut product,
                        &mut edges,
                    );
                    let dst = intern_pair(
                        (t, d_next as u32),
                        &mut product,
                        &mut edges,
                    );
                    edges[src as usize].push(PEdge {
                        atom: atom as u32,
                        target: dst,
                        multi,
                        order,
                    });
                    edge_count += 1;
                    if edge_count > max_size * 4 {
                        return Err(Error::TooLarge {
                            what: "look-ahead product",
                            size: edge_count,
                            limit: max_size * 4,
                        });
                    }
                }
            }
        }

        // The accepting pairs pair an accepting q with the empty-suffix
        // context (subset 0). They may not have appeared as edge
        // endpoints (single-state runs), so intern them explicitly.
        for &q in subsets.get_index(0).unwrap().0 {
            intern_pair((q, 0), &mut product, &mut edges);
        }
        // Same for initial pairs.
        for d in 0..n_dfa {
            if member[d][nfa.initial as usize] {
                intern_pair(
                    (nfa.initial, d as u32),
                    &mut product,
                    &mut edges,
                );
            }
        }

        let states: Vec<(StateId, u32)> =
            product.keys().copied().collect();
        let initials: Vec<u32> = states
            .iter()
            .enumerate()
            .filter(|(_, &(q, _))| q == nfa.initial)
            .map(|(i, _)| i as u32)
            .collect();
        let accepting: Vec<bool> =
            states.iter().map(|&(q, d)| d == 0 && nfa.accept[q as usize]).collect();

        let mut wla = NfaWla {
            atoms: nfa.atoms.clone(),
            end_atom: nfa.end_atom,
            free_accept: states
                .iter()
                .map(|&(q, _)| nfa.accept[q as usize])
                .collect(),
            spans: states
                .iter()
                .map(|&(q, _)| nfa.spans[q as usize])
                .collect(),
            states,
            edges,
            initials,
            accepting,
        };
        wla.trim();
        if wla.len() > max_size {
            return Err(Error::TooLarge {
                what: "look-ahead product",
                size: wla.len(),
                limit: max_size,
            });
        }
        Ok(wla)
    }

    fn empty(nfa: &OrderedNfa) -> NfaWla {
        NfaWla {
            atoms: nfa.atoms.clone(),
            end_atom: nfa.end_atom,
            states: Vec::new(),
            edges: Vec::new(),
            initials: Vec::new(),
            accepting: Vec::new(),
            free_accept: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Keeps only states reachable from an initial pair and co-reachable
    /// to an accepting pair, then renumbers compactly.
    fn trim(&mut self) {
        let n = self.len();
        let mut fwd_reach = vec![false; n];
        let mut stack: Vec<u32> = self.initials.clone();
        for &s in &stack {
            fwd_reach[s as usize] = true;
        }
        while let Some(s) = stack.pop() {
            for edge in &self.edges[s as usize] {
                if !fwd_reach[edge.target as usize] {
                    fwd_reach[edge.target as usize] = true;
                    stack.push(edge.target);
                }
            }
        }

        let mut rev_adj: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (s, edges) in self.edges.iter().enumerate() {
            for edge in edges {
                rev_adj[edge.target as usize].push(s as u32);
            }
        }
        let mut bwd_reach = vec![false; n];
        let mut stack: Vec<u32> = (0..n as u32)
            .filter(|&s| self.accepting[s as usize])
            .collect();
        for &s in &stack {
            bwd_reach[s as usize] = true;
        }
        while let Some(s) = stack.pop() {
            for &p in &rev_adj[s as usize] {
                if !bwd_reach[p as usize] {
                    bwd_reach[p as usize] = true;
                    stack.push(p);
                }
            }
        }

        let mut remap: Vec<Option<u32>> = vec![None; n];
        let mut kept = 0u32;
        for s in 0..n {
            if fwd_reach[s] && bwd_reach[s] {
                remap[s] = Some(kept);
                kept += 1;
            }
        }

        let keep = |v: &[u32], remap: &[Option<u32>]| -> Vec<u32> {
            v.iter().filter_map(|&s| remap[s as usize]).collect()
        };

        self.initials = keep(&self.initials, &remap);
        let mut states = Vec::with_capacity(kept as usize);
        let mut edges = Vec::with_capacity(kept as usize);
        let mut accepting = Vec::with_capacity(kept as usize);
        let mut free_accept = Vec::with_capacity(kept as usize);
        let mut spans = Vec::with_capacity(kept as usize);
        for s in 0..n {
            let Some(_) = remap[s] else { continue };
            states.push(self.states[s]);
            accepting.push(self.accepting[s]);
            free_accept.push(self.free_accept[s]);
            spans.push(self.spans[s]);
            let mut out: Vec<PEdge> = self.edges[s]
                .iter()
                .filter_map(|e| {
                    remap[e.target as usize].map(|t| PEdge {
                        atom: e.atom,
                        target: t,
                        multi: e.multi,
                        order: e.order,
                    })
                })
                .collect();
            out.sort_by_key(|e| (e.order, e.atom, e.target));
            edges.push(out);
        }
        self.states = states;
        self.edges = edges;
        self.accepting = accepting;
        self.free_accept = free_accept;
        self.spans = spans;
    }
}
