//! Automata infrastructure for the highlighting pipeline.
//!
//! Provides the NFA/DFA value types and the compilation pipeline:
//! `Rules -> NFA (Thompson) -> DFA (subset construction) -> Mealy -> scan`
//!
//! NFAs are value-like: the composition operators in [`nfa`] copy and renumber
//! their operands into a fresh automaton rather than mutating them. The
//! determinizer resolves rule priorities, so the downstream [`mealy::Mealy`]
//! machine carries a single winning style per accepting state and nothing else.

pub mod mealy;
pub mod nfa;
pub mod regex;
pub mod subset;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier for an automaton state. Opaque: unique within one automaton
/// instance, no meaning beyond identity.
pub type StateId = u32;

/// Rule priority. Assigned by [`nfa::union`] from declaration order;
/// lower value wins ties between rules matching the same longest span.
pub type Priority = u32;

/// A display style attached to recognized lexemes. Supplied by the host,
/// carried through the pipeline unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Style(pub String);

impl Style {
    pub fn new(name: impl Into<String>) -> Self {
        Style(name.into())
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Style {
    fn from(name: &str) -> Self {
        Style(name.to_string())
    }
}

/// A styled span emitted by the scanner. `start` and `end` are char indices;
/// `end` is the inclusive index of the token's last character.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub style: Style,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}:{}]", self.start, self.end, self.style)
    }
}

/// Accept annotation on an NFA state: the style the owning rule emits, and
/// the rule's priority (0 until overwritten by `union`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptInfo {
    pub style: Style,
    pub priority: Priority,
}

/// NFA state with per-symbol and epsilon transitions.
#[derive(Debug, Clone, Default)]
pub struct NfaState {
    /// Symbol transitions: symbol -> set of destination states.
    pub transitions: BTreeMap<char, BTreeSet<StateId>>,
    /// Epsilon transitions: states reachable without consuming input.
    pub epsilon: BTreeSet<StateId>,
    /// Accept annotation, if this state accepts.
    pub accept: Option<AcceptInfo>,
}

impl NfaState {
    /// A fresh non-accepting state with no transitions.
    pub fn new() -> Self {
        NfaState::default()
    }

    /// A fresh accepting state carrying `style` at `priority`.
    pub fn accepting(style: Style, priority: Priority) -> Self {
        NfaState {
            transitions: BTreeMap::new(),
            epsilon: BTreeSet::new(),
            accept: Some(AcceptInfo { style, priority }),
        }
    }
}

/// A nondeterministic finite automaton: states, a start state, symbol and
/// epsilon transitions, and accept annotations.
///
/// Every state reachable from `start` is a member of `states` by
/// construction: states are only created through [`Nfa::add_state`] and
/// transitions only reference created states.
#[derive(Debug, Clone)]
pub struct Nfa {
    pub states: Vec<NfaState>,
    pub start: StateId,
}

impl Nfa {
    /// A new NFA with a single non-accepting start state.
    pub fn new() -> Self {
        Nfa { states: vec![NfaState::new()], start: 0 }
    }

    /// Add a state and return its id.
    pub fn add_state(&mut self, state: NfaState) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(state);
        id
    }

    /// Add an epsilon transition `from -> to`.
    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.states[from as usize].epsilon.insert(to);
    }

    /// Add a symbol transition `from --symbol--> to`.
    pub fn add_transition(&mut self, from: StateId, symbol: char, to: StateId) {
        self.states[from as usize]
            .transitions
            .entry(symbol)
            .or_default()
            .insert(to);
    }

    /// All symbols appearing anywhere in the transition table. This is the
    /// alphabet the determinizer iterates over.
    pub fn symbols(&self) -> BTreeSet<char> {
        self.states
            .iter()
            .flat_map(|s| s.transitions.keys().copied())
            .collect()
    }

    /// Ids of all accepting states.
    pub fn accepting_states(&self) -> Vec<StateId> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.accept.is_some())
            .map(|(i, _)| i as StateId)
            .collect()
    }
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

/// DFA state: at most one destination per symbol, plus the winning style if
/// the state accepts.
#[derive(Debug, Clone, Default)]
pub struct DfaState {
    pub transitions: BTreeMap<char, StateId>,
    pub accept: Option<Style>,
}

/// A deterministic finite automaton produced by subset construction.
///
/// Conceptually each state is labeled by the NFA-state subset it represents;
/// the subsets themselves live only in the construction's memo table, the
/// final automaton keeps dense ids.
#[derive(Debug, Clone)]
pub struct Dfa {
    pub states: Vec<DfaState>,
    pub start: StateId,
}

impl Dfa {
    pub fn new() -> Self {
        Dfa { states: vec![DfaState::default()], start: 0 }
    }

    pub fn add_state(&mut self, state: DfaState) -> StateId {
        let id = self.states.len() as StateId;
        self.states.push(state);
        id
    }

    /// Deterministic transition lookup.
    #[inline]
    pub fn transition(&self, state: StateId, symbol: char) -> Option<StateId> {
        self.states[state as usize].transitions.get(&symbol).copied()
    }

    #[inline]
    pub fn set_transition(&mut self, state: StateId, symbol: char, target: StateId) {
        self.states[state as usize].transitions.insert(symbol, target);
    }
}

impl Default for Dfa {
    fn default() -> Self {
        Self::new()
    }
}
