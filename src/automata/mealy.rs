//! Mealy machine and the greedy longest-match scanner.
//!
//! The Mealy machine is a structural copy of the DFA transition table plus an
//! accept-style lookup. Priorities are gone — they were resolved during
//! determinization.
//!
//! Tokenization is maximal munch with backtracking-to-start: only a trap (no
//! transition for the next symbol) ends a lexeme, so the longest match always
//! wins; when a lexeme ends, the trapped symbol is re-evaluated from the
//! machine start. Unrecognized symbols are skipped, not emitted.

use super::{Dfa, StateId, Style, Token};

/// Deterministic symbol-output machine driving both the whole-string scanner
/// and the incremental lex tree.
#[derive(Debug, Clone)]
pub struct Mealy {
    pub start: StateId,
    transitions: Vec<std::collections::BTreeMap<char, StateId>>,
    accept: Vec<Option<Style>>,
}

impl Mealy {
    /// Direct structural copy of the DFA plus the accept-style table.
    pub fn from_dfa(dfa: &Dfa) -> Mealy {
        Mealy {
            start: dfa.start,
            transitions: dfa.states.iter().map(|s| s.transitions.clone()).collect(),
            accept: dfa.states.iter().map(|s| s.accept.clone()).collect(),
        }
    }

    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }

    /// Deterministic transition lookup; `None` is a trap.
    #[inline]
    pub fn transition(&self, state: StateId, symbol: char) -> Option<StateId> {
        self.transitions[state as usize].get(&symbol).copied()
    }

    /// The style emitted when a lexeme ends in `state`, if it accepts.
    #[inline]
    pub fn accept_style(&self, state: StateId) -> Option<&Style> {
        self.accept[state as usize].as_ref()
    }

    #[inline]
    pub fn is_accepting(&self, state: StateId) -> bool {
        self.accept[state as usize].is_some()
    }

    /// Single-symbol transition with trap-reset semantics. This is the step
    /// function whose fold over a text yields the lex tree's transfer arrays;
    /// it agrees with [`scan`]'s state evolution symbol by symbol.
    ///
    /// - transition exists: follow it;
    /// - trap on an accepting state: the lexeme ended, the symbol is
    ///   re-evaluated from the machine start;
    /// - trap on a non-accepting state: the symbol is skipped as
    ///   unrecognized, landing on the machine start.
    #[inline]
    pub fn step(&self, state: StateId, symbol: char) -> StateId {
        match self.transition(state, symbol) {
            Some(next) => next,
            None => {
                if self.is_accepting(state) {
                    self.transition(self.start, symbol).unwrap_or(self.start)
                } else {
                    self.start
                }
            },
        }
    }
}

/// Tokenize a whole string. Greedy longest match, first-declared rule wins
/// priority ties (already resolved in the machine), unrecognized runs
/// skipped.
///
/// Guard: a trap on an accepting state from which no symbol has been
/// consumed (`position == lexeme_start`) is treated as the unrecognized-skip
/// case; otherwise a rule matching the empty string would emit a zero-width
/// token at the same position forever.
pub fn scan(machine: &Mealy, input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut state = machine.start;
    let mut position = 0;
    let mut lexeme_start = 0;

    while position < chars.len() {
        match machine.transition(state, chars[position]) {
            Some(next) => {
                state = next;
                position += 1;
            },
            None => {
                match machine.accept_style(state) {
                    Some(style) if position > lexeme_start => {
                        tokens.push(Token {
                            start: lexeme_start,
                            end: position - 1,
                            style: style.clone(),
                        });
                        // the trapped symbol is re-evaluated from the start
                    },
                    _ => {
                        // no lexeme ended here: skip the unrecognized symbol
                        position += 1;
                    },
                }
                state = machine.start;
                lexeme_start = position;
            },
        }
    }

    // trailing lexeme: accepting final state with at least one symbol consumed
    if position > lexeme_start {
        if let Some(style) = machine.accept_style(state) {
            tokens.push(Token { start: lexeme_start, end: position - 1, style: style.clone() });
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::nfa::union;
    use crate::automata::regex::compile;
    use crate::automata::subset::determinize;

    fn machine(rules: &[(&str, &str)]) -> Mealy {
        let nfas: Vec<_> = rules
            .iter()
            .map(|(p, s)| compile(p, Style::new(*s)).expect("test pattern compiles"))
            .collect();
        Mealy::from_dfa(&determinize(&union(&nfas)))
    }

    #[test]
    fn test_from_dfa_is_structural() {
        let dfa = determinize(&union(&[compile("ab", Style::new("x")).unwrap()]));
        let m = Mealy::from_dfa(&dfa);
        assert_eq!(m.num_states(), dfa.states.len());
        assert_eq!(m.start, dfa.start);
        for (id, state) in dfa.states.iter().enumerate() {
            for (&sym, &target) in &state.transitions {
                assert_eq!(m.transition(id as StateId, sym), Some(target));
            }
            assert_eq!(m.accept_style(id as StateId), state.accept.as_ref());
        }
    }

    #[test]
    fn test_step_matches_scan_evolution() {
        let m = machine(&[("[a-z]+", "ident"), ("\\d+", "num")]);
        // 'a' then '1': the trap on '1' ends the ident lexeme and re-evaluates
        // '1' from the start.
        let s1 = m.step(m.start, 'a');
        assert!(m.is_accepting(s1));
        let s2 = m.step(s1, '1');
        assert!(m.is_accepting(s2), "re-evaluated '1' must land in the num state");
        // trap on a non-accepting path skips the symbol entirely
        let s3 = m.step(m.start, '#');
        assert_eq!(s3, m.start);
    }

    #[test]
    fn test_scan_empty_input() {
        let m = machine(&[("[a-z]+", "ident")]);
        assert_eq!(scan(&m, ""), vec![]);
    }

    #[test]
    fn test_scan_full_trap() {
        let m = machine(&[("[a-z]+", "ident")]);
        assert_eq!(scan(&m, "0123 456"), vec![]);
    }

    #[test]
    fn test_scan_keyword_identifier_scenario() {
        let m = machine(&[("if|else|for|while", "keyword"), ("[a-zA-Z]+", "identifier")]);
        let tokens = scan(&m, "if variable for unknown");
        let expected = vec![
            Token { start: 0, end: 1, style: Style::new("keyword") },
            Token { start: 3, end: 10, style: Style::new("identifier") },
            Token { start: 12, end: 14, style: Style::new("keyword") },
            Token { start: 16, end: 22, style: Style::new("identifier") },
        ];
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_scan_priority_tie_on_identical_span() {
        // Both rules can match "test1" entirely; the longest match is decided
        // by the trap, and rule B owns the accepting state for the full span.
        let m = machine(&[("[a-z]+", "a"), ("[a-z]+\\d", "b")]);
        assert_eq!(
            scan(&m, "test1"),
            vec![Token { start: 0, end: 4, style: Style::new("b") }]
        );
    }

    #[test]
    fn test_scan_reevaluates_trapped_symbol() {
        let m = machine(&[("[a-z]+", "ident"), ("\\d+", "num")]);
        assert_eq!(
            scan(&m, "abc123"),
            vec![
                Token { start: 0, end: 2, style: Style::new("ident") },
                Token { start: 3, end: 5, style: Style::new("num") },
            ]
        );
    }

    #[test]
    fn test_scan_abandons_dead_prefix_without_backtracking() {
        // "ab" is consumed hoping for "ab1"; the trap on '2' finds no
        // accepting state and the consumed symbols are not re-evaluated.
        // This is the documented no-backtrack behavior.
        let m = machine(&[("ab1", "x"), ("a", "y")]);
        assert_eq!(scan(&m, "ab2"), vec![]);
        assert_eq!(scan(&m, "a"), vec![Token { start: 0, end: 0, style: Style::new("y") }]);
        assert_eq!(scan(&m, "ab1"), vec![Token { start: 0, end: 2, style: Style::new("x") }]);
    }

    #[test]
    fn test_scan_empty_match_rule_terminates() {
        let m = machine(&[("a*", "as")]);
        // 'b' is unrecognized even though the start state accepts the empty
        // string; the zero-width guard skips it.
        assert_eq!(scan(&m, "b"), vec![]);
        assert_eq!(
            scan(&m, "aab"),
            vec![Token { start: 0, end: 1, style: Style::new("as") }]
        );
    }

    #[test]
    fn test_scan_deterministic() {
        let m = machine(&[("if|else", "kw"), ("[a-z]+", "id"), ("\\s+", "ws")]);
        let input = "if x else yy";
        assert_eq!(scan(&m, input), scan(&m, input));
    }
}
