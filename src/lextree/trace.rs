//! Injected tracing collaborator for tree operations.
//!
//! The tree never consults a global debug flag; a host that wants visibility
//! into rescans, signals and structural edits passes its own [`TreeTrace`]
//! when building the tree. The default [`NoTrace`] does nothing.

use super::NodeId;
use crate::automata::Style;

/// Observer for incremental-tree internals. All hooks default to no-ops, so
/// an implementor only overrides what it cares about.
pub trait TreeTrace {
    /// A leaf was rescanned from an incoming state and produced `pieces`
    /// fragments.
    fn on_rescan(&mut self, leaf: NodeId, pieces: usize) {
        let _ = (leaf, pieces);
    }

    /// A node emitted or updated a boundary signal.
    fn on_signal(&mut self, node: NodeId, style: Option<&Style>) {
        let _ = (node, style);
    }

    /// A leaf's display style was painted.
    fn on_paint(&mut self, leaf: NodeId, style: Option<&Style>) {
        let _ = (leaf, style);
    }

    /// A structural edit: `"split"`, `"delete"`, `"collapse"`, `"insert"`.
    fn on_structure(&mut self, op: &'static str, node: NodeId) {
        let _ = (op, node);
    }
}

/// The default tracer: ignores everything.
pub struct NoTrace;

impl TreeTrace for NoTrace {}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    /// Test tracer that records structural operations.
    #[derive(Default)]
    pub struct Recording {
        pub ops: std::rc::Rc<std::cell::RefCell<Vec<(&'static str, NodeId)>>>,
    }

    impl TreeTrace for Recording {
        fn on_structure(&mut self, op: &'static str, node: NodeId) {
            self.ops.borrow_mut().push((op, node));
        }
    }
}
