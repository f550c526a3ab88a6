//! Aggregate test suites for the pipeline: regex compilation, automata
//! construction, scanning, the incremental tree, and property-based
//! end-to-end checks.

mod automata_tests;
mod integration_tests;

use crate::automata::mealy::Mealy;
use crate::pipeline::{build_machine, Rule};

/// Build the Mealy machine for a (pattern, style) rule list.
pub(crate) fn machine_for(rules: &[(&str, &str)]) -> Mealy {
    let rules: Vec<Rule> = rules.iter().map(|(p, s)| Rule::new(*p, *s)).collect();
    build_machine(&rules).expect("test rules compile").0
}
