//! Thompson composition over NFAs.
//!
//! Every operator here is pure: operands are copied and renumbered into a
//! fresh automaton, never mutated. The compiler builds pattern fragments
//! bottom-up from these operators; [`union`] is the cross-rule combinator
//! that assigns priorities from declaration order.

use std::collections::BTreeSet;

use super::{Nfa, NfaState, Priority, StateId, Style};

/// Copy every state of `src` into `dest`, renumbering by offset.
/// Returns the offset to add to any `src` state id.
fn copy_states(dest: &mut Nfa, src: &Nfa) -> StateId {
    let offset = dest.states.len() as StateId;
    for state in &src.states {
        let mut copy = NfaState {
            transitions: Default::default(),
            epsilon: state.epsilon.iter().map(|&t| t + offset).collect(),
            accept: state.accept.clone(),
        };
        for (&symbol, targets) in &state.transitions {
            copy.transitions
                .insert(symbol, targets.iter().map(|&t| t + offset).collect());
        }
        dest.states.push(copy);
    }
    offset
}

/// An empty fresh automaton (no states at all) used as a copy target.
fn blank() -> Nfa {
    Nfa { states: Vec::new(), start: 0 }
}

/// A single-symbol automaton: `start --symbol--> accept(style)`.
pub fn symbol(symbol: char, style: Style) -> Nfa {
    let mut nfa = Nfa::new();
    let accept = nfa.add_state(NfaState::accepting(style, 0));
    nfa.add_transition(nfa.start, symbol, accept);
    nfa
}

/// A one-transition-per-member automaton for a character class:
/// `start --c--> accept(style)` for every `c` in `members`.
///
/// An empty member set is permitted (a fully negated class); the accept state
/// is simply unreachable.
pub fn symbol_set(members: &BTreeSet<char>, style: Style) -> Nfa {
    let mut nfa = Nfa::new();
    let accept = nfa.add_state(NfaState::accepting(style, 0));
    for &c in members {
        nfa.add_transition(nfa.start, c, accept);
    }
    nfa
}

/// An automaton matching only the empty string: `start -e-> accept(style)`.
/// Used for zero-minimum bounded repetition.
pub fn empty(style: Style) -> Nfa {
    let mut nfa = Nfa::new();
    let accept = nfa.add_state(NfaState::accepting(style, 0));
    nfa.add_epsilon(nfa.start, accept);
    nfa
}

/// Concatenation: epsilon-link every accept of `left` to the start of
/// `right`; the result accepts where `right` accepted.
pub fn concat(left: &Nfa, right: &Nfa) -> Nfa {
    let mut result = blank();
    let loff = copy_states(&mut result, left);
    let roff = copy_states(&mut result, right);
    result.start = left.start + loff;
    for id in left.accepting_states() {
        let state = &mut result.states[(id + loff) as usize];
        state.accept = None;
        state.epsilon.insert(right.start + roff);
    }
    result
}

/// Kleene star. New start/accept pair with the classic four epsilon edges:
///
/// ```text
///   new_start -e-> old_start        (enter the operand)
///   new_start -e-> new_accept       (empty match)
///   old_accept -e-> new_accept      (leave after a repetition)
///   old_accept -e-> old_start       (loop)
/// ```
pub fn star(operand: &Nfa) -> Nfa {
    let style = operand_style(operand);
    let mut result = blank();
    let off = copy_states(&mut result, operand);
    let new_start = result.add_state(NfaState::new());
    let new_accept = result.add_state(NfaState::accepting(style, 0));
    result.start = new_start;
    result.add_epsilon(new_start, operand.start + off);
    result.add_epsilon(new_start, new_accept);
    for id in operand.accepting_states() {
        let state = &mut result.states[(id + off) as usize];
        state.accept = None;
        state.epsilon.insert(new_accept);
        state.epsilon.insert(operand.start + off);
    }
    result
}

/// One-or-more: the operand concatenated with its own star.
pub fn plus(operand: &Nfa) -> Nfa {
    concat(operand, &star(operand))
}

/// Zero-or-one. Same shape as [`star`] without the loop edge.
pub fn optional(operand: &Nfa) -> Nfa {
    let style = operand_style(operand);
    let mut result = blank();
    let off = copy_states(&mut result, operand);
    let new_start = result.add_state(NfaState::new());
    let new_accept = result.add_state(NfaState::accepting(style, 0));
    result.start = new_start;
    result.add_epsilon(new_start, operand.start + off);
    result.add_epsilon(new_start, new_accept);
    for id in operand.accepting_states() {
        let state = &mut result.states[(id + off) as usize];
        state.accept = None;
        state.epsilon.insert(new_accept);
    }
    result
}

/// In-pattern alternation: fresh start and accept, both branches wired in.
/// Unlike [`union`] this keeps a single accept state and does not touch
/// priorities — both branches belong to the same rule.
pub fn alt(left: &Nfa, right: &Nfa) -> Nfa {
    let style = operand_style(left);
    let mut result = blank();
    let loff = copy_states(&mut result, left);
    let roff = copy_states(&mut result, right);
    let new_start = result.add_state(NfaState::new());
    let new_accept = result.add_state(NfaState::accepting(style, 0));
    result.start = new_start;
    result.add_epsilon(new_start, left.start + loff);
    result.add_epsilon(new_start, right.start + roff);
    for id in left.accepting_states() {
        let state = &mut result.states[(id + loff) as usize];
        state.accept = None;
        state.epsilon.insert(new_accept);
    }
    for id in right.accepting_states() {
        let state = &mut result.states[(id + roff) as usize];
        state.accept = None;
        state.epsilon.insert(new_accept);
    }
    result
}

/// N-ary union of compiled rules. Order-sensitive: a new start state gets an
/// epsilon edge to every operand's renumbered start, and each operand's
/// accept states are carried through with `priority = operand index`
/// (declaration order; lower wins ties during determinization).
pub fn union(operands: &[Nfa]) -> Nfa {
    let mut result = Nfa::new();
    for (index, operand) in operands.iter().enumerate() {
        let off = copy_states(&mut result, operand);
        result.add_epsilon(result.start, operand.start + off);
        for id in operand.accepting_states() {
            let state = &mut result.states[(id + off) as usize];
            if let Some(info) = &mut state.accept {
                info.priority = index as Priority;
            }
        }
    }
    result
}

/// The style carried by an operand's accept states. Within one compiled
/// pattern every accept state carries the same style, so any accept works.
fn operand_style(operand: &Nfa) -> Style {
    operand
        .states
        .iter()
        .find_map(|s| s.accept.as_ref())
        .map(|info| info.style.clone())
        .expect("operand fragment has no accepting state")
}

/// Epsilon closure: all states reachable from `states` via zero or more
/// epsilon transitions. Worklist walk; the result is sorted and deduplicated
/// so it can serve directly as a canonical subset key.
pub fn epsilon_closure(nfa: &Nfa, states: &[StateId]) -> Vec<StateId> {
    let mut closure: Vec<StateId> = states.to_vec();
    let mut stack: Vec<StateId> = states.to_vec();
    let mut visited = vec![false; nfa.states.len()];

    for &s in states {
        visited[s as usize] = true;
    }

    while let Some(state) = stack.pop() {
        for &target in &nfa.states[state as usize].epsilon {
            if !visited[target as usize] {
                visited[target as usize] = true;
                closure.push(target);
                stack.push(target);
            }
        }
    }

    closure.sort_unstable();
    closure.dedup();
    closure
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> Style {
        Style::new("s")
    }

    #[test]
    fn test_symbol_automaton() {
        let nfa = symbol('a', style());
        assert_eq!(nfa.states.len(), 2);
        assert_eq!(nfa.accepting_states().len(), 1);
        let targets = &nfa.states[nfa.start as usize].transitions[&'a'];
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_concat_clears_left_accepts() {
        let a = symbol('a', style());
        let b = symbol('b', style());
        let ab = concat(&a, &b);
        assert_eq!(ab.states.len(), 4);
        assert_eq!(
            ab.accepting_states().len(),
            1,
            "concat must accept only where the right operand accepted"
        );
    }

    #[test]
    fn test_star_shape() {
        let a = symbol('a', style());
        let starred = star(&a);
        // operand's 2 states + new start + new accept
        assert_eq!(starred.states.len(), 4);
        // the new start must epsilon-reach the new accept (empty match)
        let closure = epsilon_closure(&starred, &[starred.start]);
        assert!(closure
            .iter()
            .any(|&s| starred.states[s as usize].accept.is_some()));
    }

    #[test]
    fn test_optional_has_no_loop() {
        let a = symbol('a', style());
        let opt = optional(&a);
        // old accept must not epsilon back to old start
        let old_accept = opt
            .states
            .iter()
            .position(|s| s.epsilon.len() == 1 && s.transitions.is_empty() && s.accept.is_none());
        assert!(old_accept.is_some(), "operand accept should only exit forward");
    }

    #[test]
    fn test_union_assigns_priorities() {
        let a = symbol('a', style());
        let b = symbol('b', Style::new("t"));
        let u = union(&[a, b]);
        let mut priorities: Vec<Priority> = u
            .states
            .iter()
            .filter_map(|s| s.accept.as_ref().map(|i| i.priority))
            .collect();
        priorities.sort_unstable();
        assert_eq!(priorities, vec![0, 1]);
    }

    #[test]
    fn test_union_operands_untouched() {
        let a = symbol('a', style());
        let before = a.states.len();
        let _u = union(&[a.clone(), a.clone()]);
        assert_eq!(a.states.len(), before, "operators must not mutate operands");
        assert!(a.states.iter().any(|s| s
            .accept
            .as_ref()
            .map(|i| i.priority == 0)
            .unwrap_or(false)));
    }

    #[test]
    fn test_epsilon_closure_chain() {
        let mut nfa = Nfa::new();
        let s1 = nfa.add_state(NfaState::new());
        let s2 = nfa.add_state(NfaState::new());
        let s3 = nfa.add_state(NfaState::new());
        nfa.add_epsilon(0, s1);
        nfa.add_epsilon(s1, s2);
        nfa.add_epsilon(s2, s3);
        assert_eq!(epsilon_closure(&nfa, &[0]), vec![0, s1, s2, s3]);
    }
}
