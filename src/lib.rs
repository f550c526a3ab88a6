//! # relex — incremental syntax-highlighting lexer engine
//!
//! Compiles a set of (pattern, style) rules into one deterministic
//! recognizer and tokenizes text against it, with an incremental mode that
//! re-tokenizes only the edited region of a document.
//!
//! ## Architecture
//!
//! ```text
//!  rules: (pattern, style)*
//!        │
//!        ▼
//!  ┌────────────────────────────────────────────────┐
//!  │ 1. Regex compiler (recursive descent):          │
//!  │    pattern → NFA fragment (Thompson operators)  │
//!  │                                                 │
//!  │ 2. union: one NFA, priority = declaration order │
//!  │                                                 │
//!  │ 3. determinize: subset construction, priority   │
//!  │    resolution → DFA                             │
//!  │                                                 │
//!  │ 4. Mealy machine: transition table + accept     │
//!  │    styles                                       │
//!  └────────────────────────────────────────────────┘
//!        │
//!        ├──▶ scan(machine, text)       whole-document tokens
//!        │
//!        └──▶ LexTree::build(machine, text)
//!             incremental re-tokenization: balanced fragment tree,
//!             cached transfer arrays, backward style signals
//! ```
//!
//! Everything is synchronous and single-threaded; the engine performs no I/O
//! and holds no global state. Hosts embedding it in a concurrent editor
//! serialize edits externally, one fully-propagated edit at a time.
//!
//! ## Example
//!
//! ```
//! use relex::{build_machine, scan, LexTree, Rule};
//!
//! let (machine, _stats) = build_machine(&[
//!     Rule::new("if|else|for|while", "keyword"),
//!     Rule::new("[a-zA-Z]+", "identifier"),
//!     Rule::new(" +", "whitespace"),
//! ])
//! .unwrap();
//!
//! let tokens = scan(&machine, "if x");
//! assert_eq!(tokens.len(), 3);
//!
//! let mut tree = LexTree::build(machine, "if x");
//! let leaf = tree.leaves()[2];
//! tree.text_change(leaf, "y");
//! assert_eq!(tree.text(), "if y");
//! ```

pub mod automata;
pub mod charclass;
pub mod lextree;
pub mod pipeline;

#[cfg(test)]
mod tests;

pub use automata::mealy::{scan, Mealy};
pub use automata::nfa::{alt, concat, epsilon_closure, optional, plus, star, union};
pub use automata::regex::{compile, validate, CompileError};
pub use automata::subset::determinize;
pub use automata::{Dfa, Nfa, Priority, StateId, Style, Token};
pub use lextree::trace::{NoTrace, TreeTrace};
pub use lextree::{LexTree, NodeId, Signal, TreeEvent};
pub use pipeline::{build_machine, PipelineStats, Rule};
