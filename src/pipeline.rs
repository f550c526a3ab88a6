//! Rule-set orchestration: compile every rule, union in declaration order,
//! determinize, convert to a Mealy machine.
//!
//! Pipeline: `Rules -> NFA (per rule) -> union -> DFA -> Mealy`. The stats
//! struct reports automaton sizes for diagnostics; the pipeline itself never
//! prints.

use crate::automata::mealy::Mealy;
use crate::automata::nfa::union;
use crate::automata::regex::{compile, CompileError};
use crate::automata::subset::determinize;
use crate::automata::Style;

/// One highlighting rule: a pattern and the style its lexemes display as.
/// Rule order is priority order — earlier rules win ties.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub style: Style,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, style: impl Into<Style>) -> Self {
        Rule { pattern: pattern.into(), style: style.into() }
    }
}

/// Sizes from the compilation pipeline, for diagnostics.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub num_rules: usize,
    pub num_nfa_states: usize,
    pub num_dfa_states: usize,
    /// Alphabet size: distinct symbols in the unioned NFA's transition table.
    pub num_symbols: usize,
}

/// Build the tokenization machine for a rule set.
///
/// # Errors
///
/// Returns the first rule's [`CompileError`]; a caller that wants to skip bad
/// rules compiles them individually and unions the survivors.
pub fn build_machine(rules: &[Rule]) -> Result<(Mealy, PipelineStats), CompileError> {
    let nfas = rules
        .iter()
        .map(|rule| compile(&rule.pattern, rule.style.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let merged = union(&nfas);
    let num_nfa_states = merged.states.len();
    let num_symbols = merged.symbols().len();

    let dfa = determinize(&merged);
    let num_dfa_states = dfa.states.len();

    let machine = Mealy::from_dfa(&dfa);
    let stats = PipelineStats {
        num_rules: rules.len(),
        num_nfa_states,
        num_dfa_states,
        num_symbols,
    };
    Ok((machine, stats))
}
