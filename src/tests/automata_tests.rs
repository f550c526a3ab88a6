//! Tests for NFA composition, determinization, and the Mealy conversion as
//! one pipeline.

use super::machine_for;
use crate::automata::mealy::{scan, Mealy};
use crate::automata::nfa::{epsilon_closure, union};
use crate::automata::regex::compile;
use crate::automata::subset::determinize;
use crate::automata::{Style, Token};

#[test]
fn test_union_start_reaches_every_rule() {
    let rules = [
        compile("if", Style::new("kw")).unwrap(),
        compile("[0-9]+", Style::new("num")).unwrap(),
        compile(" +", Style::new("ws")).unwrap(),
    ];
    let merged = union(&rules);
    let closure = epsilon_closure(&merged, &[merged.start]);
    // the closure of the fresh start must reach each operand's start; each
    // operand contributes at least one state with outgoing symbol transitions
    let symbols: std::collections::BTreeSet<char> = closure
        .iter()
        .flat_map(|&s| merged.states[s as usize].transitions.keys().copied())
        .collect();
    assert!(symbols.contains(&'i'));
    assert!(symbols.contains(&'0'));
    assert!(symbols.contains(&' '));
}

#[test]
fn test_union_preserves_declaration_priorities() {
    let rules = [
        compile("a", Style::new("first")).unwrap(),
        compile("b", Style::new("second")).unwrap(),
        compile("c", Style::new("third")).unwrap(),
    ];
    let merged = union(&rules);
    for state in &merged.states {
        if let Some(info) = &state.accept {
            let expected = match info.style.0.as_str() {
                "first" => 0,
                "second" => 1,
                "third" => 2,
                other => panic!("unexpected style {}", other),
            };
            assert_eq!(info.priority, expected);
        }
    }
}

#[test]
fn test_determinize_empty_union() {
    let dfa = determinize(&union(&[]));
    assert_eq!(dfa.states.len(), 1);
    assert!(dfa.states[0].accept.is_none());
    assert!(dfa.states[0].transitions.is_empty());
}

#[test]
fn test_determinize_is_deterministic_across_runs() {
    let build = || {
        let rules = [
            compile("if|else|for|while", Style::new("kw")).unwrap(),
            compile("[a-zA-Z]+", Style::new("id")).unwrap(),
        ];
        determinize(&union(&rules))
    };
    let a = build();
    let b = build();
    assert_eq!(a.states.len(), b.states.len());
    for (sa, sb) in a.states.iter().zip(&b.states) {
        assert_eq!(sa.transitions, sb.transitions);
        assert_eq!(sa.accept, sb.accept);
    }
}

#[test]
fn test_mealy_carries_no_priorities() {
    // after conversion only the winning style remains; scanning must still
    // honor declaration order resolved during determinization
    let machine = machine_for(&[("if", "keyword"), ("[a-z]+", "identifier")]);
    assert_eq!(
        scan(&machine, "if"),
        vec![Token { start: 0, end: 1, style: Style::new("keyword") }]
    );
    assert_eq!(
        scan(&machine, "ifx"),
        vec![Token { start: 0, end: 2, style: Style::new("identifier") }]
    );
}

#[test]
fn test_mealy_structural_parity_with_dfa() {
    let rules = [
        compile("[a-z]+", Style::new("id")).unwrap(),
        compile("[0-9]+", Style::new("num")).unwrap(),
    ];
    let dfa = determinize(&union(&rules));
    let machine = Mealy::from_dfa(&dfa);
    assert_eq!(machine.num_states(), dfa.states.len());
    for (id, state) in dfa.states.iter().enumerate() {
        let id = id as crate::automata::StateId;
        assert_eq!(machine.accept_style(id), state.accept.as_ref());
        for (&symbol, &target) in &state.transitions {
            assert_eq!(machine.transition(id, symbol), Some(target));
        }
    }
}

#[test]
fn test_dfa_state_count_stays_reasonable() {
    // subset construction without minimization still only materializes
    // reachable subsets
    let rules = [
        compile("if|else|for|while", Style::new("kw")).unwrap(),
        compile("[a-zA-Z_][a-zA-Z0-9_]*", Style::new("id")).unwrap(),
        compile("[0-9]+", Style::new("num")).unwrap(),
        compile("[ \t\n]+", Style::new("ws")).unwrap(),
    ];
    let dfa = determinize(&union(&rules));
    assert!(
        dfa.states.len() < 40,
        "expected a compact DFA, got {} states",
        dfa.states.len()
    );
}
