//! Property-based end-to-end checks: the DFA scanner against a brute-force
//! NFA subset simulation, scan invariants, longest-match behavior, and
//! incremental/batch equivalence under random edit scripts.

use proptest::prelude::*;

use super::machine_for;
use crate::automata::mealy::{scan, Mealy};
use crate::automata::nfa::{epsilon_closure, union};
use crate::automata::regex::compile;
use crate::automata::{Nfa, StateId, Style, Token};
use crate::lextree::LexTree;

// ══════════════════════════════════════════════════════════════════════════════
// Reference implementation: scan by direct NFA subset simulation
// ══════════════════════════════════════════════════════════════════════════════

fn set_accept<'a>(nfa: &'a Nfa, set: &[StateId]) -> Option<&'a Style> {
    set.iter()
        .filter_map(|&s| nfa.states[s as usize].accept.as_ref())
        .min_by_key(|info| info.priority)
        .map(|info| &info.style)
}

/// The same trap-reset tokenization loop as `scan`, but walking epsilon-closed
/// NFA state sets directly instead of a determinized table.
fn nfa_scan(nfa: &Nfa, input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let start_set = epsilon_closure(nfa, &[nfa.start]);
    let mut set = start_set.clone();
    let mut tokens = Vec::new();
    let mut position = 0;
    let mut lexeme_start = 0;

    while position < chars.len() {
        let moved: Vec<StateId> = set
            .iter()
            .flat_map(|&s| {
                nfa.states[s as usize]
                    .transitions
                    .get(&chars[position])
                    .into_iter()
                    .flatten()
                    .copied()
            })
            .collect();
        let next = if moved.is_empty() { Vec::new() } else { epsilon_closure(nfa, &moved) };

        if !next.is_empty() {
            set = next;
            position += 1;
        } else {
            match set_accept(nfa, &set) {
                Some(style) if position > lexeme_start => {
                    tokens.push(Token {
                        start: lexeme_start,
                        end: position - 1,
                        style: style.clone(),
                    });
                },
                _ => position += 1,
            }
            set = start_set.clone();
            lexeme_start = position;
        }
    }

    if position > lexeme_start {
        if let Some(style) = set_accept(nfa, &set) {
            tokens.push(Token { start: lexeme_start, end: position - 1, style: style.clone() });
        }
    }

    tokens
}

const RULESET: &[(&str, &str)] = &[
    ("if|else|for|while", "keyword"),
    ("[a-z]+", "identifier"),
    ("[0-9]+", "number"),
    (" +", "whitespace"),
];

fn ruleset_nfa() -> Nfa {
    let nfas: Vec<Nfa> = RULESET
        .iter()
        .map(|(p, s)| compile(p, Style::new(*s)).expect("ruleset compiles"))
        .collect();
    union(&nfas)
}

fn ruleset_machine() -> Mealy {
    machine_for(RULESET)
}

/// Whole-string acceptance against the machine (for the brute-force longest
/// match reference).
fn accepts(machine: &Mealy, chars: &[char]) -> bool {
    let mut state = machine.start;
    for &c in chars {
        match machine.transition(state, c) {
            Some(next) => state = next,
            None => return false,
        }
    }
    machine.is_accepting(state)
}

fn per_char_styles(machine: &Mealy, text: &str) -> Vec<Option<Style>> {
    let mut out = vec![None; text.chars().count()];
    for token in scan(machine, text) {
        for slot in &mut out[token.start..=token.end] {
            *slot = Some(token.style.clone());
        }
    }
    out
}

fn tree_styles(tree: &LexTree) -> Vec<Option<Style>> {
    let mut out = Vec::new();
    for id in tree.leaves() {
        let style = tree.style_of(id).cloned();
        for _ in 0..tree.text_of(id).chars().count() {
            out.push(style.clone());
        }
    }
    out
}

// ══════════════════════════════════════════════════════════════════════════════
// Properties
// ══════════════════════════════════════════════════════════════════════════════

proptest! {
    /// Determinization preserves tokenization: the DFA scanner and the
    /// brute-force NFA simulation agree token for token.
    #[test]
    fn prop_dfa_scan_equals_nfa_scan(input in "[a-z0-9 +#]{0,60}") {
        let machine = ruleset_machine();
        let nfa = ruleset_nfa();
        prop_assert_eq!(scan(&machine, &input), nfa_scan(&nfa, &input));
    }

    /// Scanning is deterministic.
    #[test]
    fn prop_scan_deterministic(input in "[a-z0-9 .#]{0,80}") {
        let machine = ruleset_machine();
        prop_assert_eq!(scan(&machine, &input), scan(&machine, &input));
    }

    /// Tokens are ordered, non-overlapping, and in range.
    #[test]
    fn prop_token_coverage_invariant(input in "[a-z0-9 +#]{0,80}") {
        let machine = ruleset_machine();
        let tokens = scan(&machine, &input);
        let len = input.chars().count();
        for t in &tokens {
            prop_assert!(t.start <= t.end);
            prop_assert!(t.end < len);
        }
        for pair in tokens.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }

    /// Longest match: over this ruleset every consumed prefix keeps an
    /// accepting rule alive, so each emitted token must span the longest
    /// whole-string-accepted substring at its start position.
    #[test]
    fn prop_longest_match(input in "[a-z0-9 ]{0,60}") {
        let machine = ruleset_machine();
        let chars: Vec<char> = input.chars().collect();
        for token in scan(&machine, &input) {
            let longest = (token.start..chars.len())
                .rev()
                .find(|&end| accepts(&machine, &chars[token.start..=end]));
            prop_assert_eq!(
                longest,
                Some(token.end),
                "token {} is not the longest match at {}",
                token.clone(),
                token.start
            );
        }
    }

    /// Building the tree reproduces the text exactly and its styles agree
    /// with a batch scan.
    #[test]
    fn prop_tree_build_matches_batch(input in "[a-z0-9 +#]{0,60}") {
        let machine = ruleset_machine();
        let tree = LexTree::build(machine.clone(), &input);
        prop_assert_eq!(tree.text(), input.clone());
        prop_assert_eq!(tree_styles(&tree), per_char_styles(&machine, &input));
    }

    /// Incremental/batch equivalence under random edit scripts: after every
    /// single-leaf edit (replacement or deletion), the tree's text and styles
    /// equal a fresh scan of the concatenated text.
    #[test]
    fn prop_incremental_equals_batch(
        initial in "[a-z0-9 #]{0,40}",
        edits in prop::collection::vec(
            (any::<prop::sample::Index>(), "[a-z0-9 #]{0,10}"),
            0..8,
        ),
    ) {
        let machine = ruleset_machine();
        let mut tree = LexTree::build(machine.clone(), &initial);

        for (index, replacement) in edits {
            let leaves = tree.leaves();
            if leaves.is_empty() {
                if !replacement.is_empty() {
                    tree.insert(&replacement);
                }
            } else {
                let leaf = leaves[index.index(leaves.len())];

                // the expected text is the old text with this leaf's span
                // replaced
                let mut expected = String::new();
                for &id in &leaves {
                    if id == leaf {
                        expected.push_str(&replacement);
                    } else {
                        expected.push_str(tree.text_of(id));
                    }
                }
                tree.text_change(leaf, &replacement);
                prop_assert_eq!(tree.text(), expected);
            }

            let text = tree.text();
            prop_assert_eq!(
                tree_styles(&tree),
                per_char_styles(&machine, &text),
                "styles diverged after editing to {:?}",
                text
            );
        }
    }
}
