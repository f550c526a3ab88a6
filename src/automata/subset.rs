//! Subset construction: NFA → DFA.
//!
//! Standard powerset construction over every symbol appearing in the NFA's
//! transition table:
//! 1. The DFA start state is the epsilon closure of the NFA start.
//! 2. For each unmarked subset and symbol, `move` then epsilon-close; new
//!    nonempty subsets get fresh DFA states and join the worklist.
//! 3. A subset accepts iff it contains an NFA accept state; the winning style
//!    is that of the member with the numerically smallest priority.
//!
//! Subsets are canonicalized as sorted state-id vectors and memoized, so the
//! DFA state count equals the number of distinct reachable subsets. No
//! minimization pass is performed.

use std::collections::{BTreeSet, HashMap};

use super::nfa::epsilon_closure;
use super::{Dfa, DfaState, Nfa, StateId, Style};

/// Convert an NFA into a DFA, resolving rule priorities.
pub fn determinize(nfa: &Nfa) -> Dfa {
    let symbols: Vec<char> = nfa.symbols().into_iter().collect();
    let mut dfa = Dfa::new();

    // canonical subset -> DFA state id
    let mut state_map: HashMap<Vec<StateId>, StateId> = HashMap::new();
    let mut worklist: Vec<Vec<StateId>> = Vec::new();

    let start_set = epsilon_closure(nfa, &[nfa.start]);
    dfa.states[0].accept = resolve_accept(nfa, &start_set);
    state_map.insert(start_set.clone(), 0);
    worklist.push(start_set);

    while let Some(current_set) = worklist.pop() {
        let current = *state_map.get(&current_set).expect("subset is memoized");

        for &symbol in &symbols {
            let mut moved: BTreeSet<StateId> = BTreeSet::new();
            for &nfa_state in &current_set {
                if let Some(targets) = nfa.states[nfa_state as usize].transitions.get(&symbol) {
                    moved.extend(targets);
                }
            }
            if moved.is_empty() {
                continue;
            }

            let target_set =
                epsilon_closure(nfa, &moved.into_iter().collect::<Vec<StateId>>());
            let target = if let Some(&existing) = state_map.get(&target_set) {
                existing
            } else {
                let accept = resolve_accept(nfa, &target_set);
                let id = dfa.add_state(DfaState { transitions: Default::default(), accept });
                state_map.insert(target_set.clone(), id);
                worklist.push(target_set);
                id
            };
            dfa.set_transition(current, symbol, target);
        }
    }

    dfa
}

/// Winning style for a subset: smallest priority wins; on equal priorities
/// the accept state appearing first in the sorted subset wins
/// (implementation-defined, see DESIGN.md — true ties only arise between
/// accept states copied from the same rule).
fn resolve_accept(nfa: &Nfa, states: &[StateId]) -> Option<Style> {
    states
        .iter()
        .filter_map(|&s| nfa.states[s as usize].accept.as_ref())
        .min_by_key(|info| info.priority)
        .map(|info| info.style.clone())
}
