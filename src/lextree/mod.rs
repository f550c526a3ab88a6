//! Incremental lex tree: a balanced binary tree over text fragments with
//! cached per-node transfer functions.
//!
//! Each node caches a transfer array `A` mapping every hypothetical incoming
//! automaton state to the state reached after consuming the node's entire
//! text (leaf: a trap-reset scan from every start state; internal node:
//! composition `A = right.A ∘ left.A`). A single-fragment edit therefore
//! updates the token stream in time proportional to tree depth, not document
//! length: ancestors recompose their arrays, and re-threading of start states
//! into neighboring subtrees stops as soon as change detection finds an
//! unchanged incoming state.
//!
//! Style discovery is backward: a lexeme's style is only known once its end
//! is found, by the leaf (or the right sentinel) that traps on its first
//! symbol. That leaf emits a *signal* carrying the ended lexeme's style,
//! which is painted leftward onto every leaf that contributed to the lexeme.
//! The two pseudo (sentinel) leaves bracketing the document seed and
//! terminate this propagation; they carry no text and are never edited.
//!
//! Nodes live in an arena indexed by integer handles; children hold a parent
//! handle for O(1) upward navigation. Hosts observe updates by draining the
//! event queue after each edit — there are no stored callbacks.

pub mod trace;

use std::collections::VecDeque;

use crate::automata::mealy::Mealy;
use crate::automata::{StateId, Style};
use self::trace::{NoTrace, TreeTrace};

/// Arena handle of a tree node.
pub type NodeId = u32;

/// A boundary marker: the style of the lexeme that ended at the owning
/// node's left edge (`None` when the ended run was unrecognized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub style: Option<Style>,
}

/// Change notification drained by the host after each edit. Events reference
/// nodes by handle; a host should drain before issuing the next edit, since
/// handles of removed nodes may be reused afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A leaf's display style changed.
    NewStyle { leaf: NodeId, style: Option<Style> },
    /// A leaf was removed after an empty-text edit.
    Delete { leaf: NodeId },
    /// A leaf was structurally split; `new_leaves` replace it left to right.
    Replace { leaf: NodeId, new_leaves: Vec<NodeId> },
}

#[derive(Debug)]
struct LeafNode {
    parent: Option<NodeId>,
    /// `None` marks a pseudo (sentinel) leaf.
    text: Option<String>,
    /// Assigned incoming state: the finish state of the left neighbor, or
    /// the machine start for the leftmost position.
    start_state: StateId,
    /// Transfer array `A`.
    transfer: Vec<StateId>,
    /// Boundary signal, present when this leaf's left edge ends a lexeme.
    signal: Option<Signal>,
    /// Current display style.
    style: Option<Style>,
}

#[derive(Debug)]
struct InternalNode {
    parent: Option<NodeId>,
    /// Children are absent only transiently during structural edits.
    left: Option<NodeId>,
    right: Option<NodeId>,
    /// Assigned incoming state; mirrors the leftmost descendant's.
    start_state: StateId,
    /// Composed transfer array.
    transfer: Vec<StateId>,
    /// Mirror of the leftmost descendant's signal.
    signal: Option<Signal>,
}

#[derive(Debug)]
enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(l) => l.parent,
            Node::Internal(i) => i.parent,
        }
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(l) => l.parent = parent,
            Node::Internal(i) => i.parent = parent,
        }
    }

    fn transfer(&self) -> &[StateId] {
        match self {
            Node::Leaf(l) => &l.transfer,
            Node::Internal(i) => &i.transfer,
        }
    }

    fn start_state(&self) -> StateId {
        match self {
            Node::Leaf(l) => l.start_state,
            Node::Internal(i) => i.start_state,
        }
    }

    fn signal(&self) -> Option<&Signal> {
        match self {
            Node::Leaf(l) => l.signal.as_ref(),
            Node::Internal(i) => i.signal.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------------------------
// Fragment scanning

/// A maximal-munch piece of a leaf's text. `start..end` are char offsets
/// within the leaf; `style` is the completing style for closed recognized
/// pieces, `None` for unrecognized runs, and the tentative accept style for
/// the trailing piece.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fragment {
    start: usize,
    end: usize,
    style: Option<Style>,
}

/// Result of scanning a leaf's text from an incoming state.
#[derive(Debug)]
struct LeafScan {
    /// Present when the first trap occurred before any reset while the scan
    /// began mid-run (`incoming != start`): the preceding lexeme ended at
    /// the leaf's left edge with this style.
    boundary: Option<Signal>,
    /// Pieces closed inside the leaf (completed lexemes and unrecognized
    /// runs).
    fragments: Vec<Fragment>,
    /// The trailing piece still open at the end of the leaf, if any.
    tail: Option<Fragment>,
    /// State after consuming the whole text (equals `A[incoming]`).
    finish: StateId,
}

impl LeafScan {
    fn pieces(&self) -> usize {
        self.fragments.len() + usize::from(self.tail.is_some())
    }
}

fn push_unrecognized(fragments: &mut Vec<Fragment>, from: usize, to: usize) {
    if let Some(last) = fragments.last_mut() {
        if last.style.is_none() && last.end == from {
            last.end = to;
            return;
        }
    }
    fragments.push(Fragment { start: from, end: to, style: None });
}

/// Run the machine over `chars` from `incoming` with the same trap semantics
/// as `scan`, recording piece boundaries instead of tokens.
fn scan_leaf_text(machine: &Mealy, chars: &[char], incoming: StateId) -> LeafScan {
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut boundary: Option<Signal> = None;
    let mut first_trap = true;
    let mut state = incoming;
    let mut pos = 0;
    let mut frag_start = 0;

    while pos < chars.len() {
        match machine.transition(state, chars[pos]) {
            Some(next) => {
                state = next;
                pos += 1;
            },
            None => {
                let accept = machine.accept_style(state).cloned();
                if first_trap && incoming != machine.start {
                    // the run carried in from the left ends here
                    boundary = Some(Signal { style: accept.clone() });
                }
                first_trap = false;
                if accept.is_some() && pos > frag_start {
                    // a lexeme completed strictly inside the leaf
                    fragments.push(Fragment { start: frag_start, end: pos, style: accept });
                    state = machine.start; // trapped symbol re-evaluated
                    frag_start = pos;
                } else if accept.is_some() && state != machine.start {
                    // boundary at the left edge, nothing consumed yet:
                    // re-evaluate the symbol from the machine start
                    state = machine.start;
                } else {
                    // nothing ended: dead prefix and trapped symbol are
                    // unrecognized
                    push_unrecognized(&mut fragments, frag_start, pos + 1);
                    pos += 1;
                    state = machine.start;
                    frag_start = pos;
                }
            },
        }
    }

    let tail = if frag_start < chars.len() {
        Some(Fragment {
            start: frag_start,
            end: chars.len(),
            style: machine.accept_style(state).cloned(),
        })
    } else {
        None
    };

    LeafScan { boundary, fragments, tail, finish: state }
}

/// Transfer array of a text: `A[s]` = state after consuming the text from
/// `s`, computed by literally running the step function from every state.
fn leaf_transfer(machine: &Mealy, chars: &[char]) -> Vec<StateId> {
    (0..machine.num_states() as StateId)
        .map(|s| chars.iter().fold(s, |state, &c| machine.step(state, c)))
        .collect()
}

fn identity_transfer(num_states: usize) -> Vec<StateId> {
    (0..num_states as StateId).collect()
}

/// Function composition: consume the left text, then the right.
fn compose(left: &[StateId], right: &[StateId]) -> Vec<StateId> {
    left.iter().map(|&mid| right[mid as usize]).collect()
}

// ---------------------------------------------------------------------------------------------
// The tree

/// Incremental tokenization state for one document.
pub struct LexTree {
    machine: Mealy,
    slots: Vec<Option<Node>>,
    free_list: Vec<NodeId>,
    root: NodeId,
    left_pseudo: NodeId,
    right_pseudo: NodeId,
    events: VecDeque<TreeEvent>,
    trace: Box<dyn TreeTrace>,
    /// Leaves whose display style may be stale after the current edit.
    dirty: Vec<NodeId>,
}

impl LexTree {
    /// Build the tree for `text`: maximal-munch fragments become leaves,
    /// bracketed by two pseudo leaves, under a balanced binary tree. Initial
    /// styles are discovered by threading start states left to right; the
    /// resulting `NewStyle` events are left in the queue for the host.
    pub fn build(machine: Mealy, text: &str) -> LexTree {
        Self::build_traced(machine, text, Box::new(NoTrace))
    }

    /// [`LexTree::build`] with an injected tracer.
    pub fn build_traced(machine: Mealy, text: &str, trace: Box<dyn TreeTrace>) -> LexTree {
        let start = machine.start;
        let mut tree = LexTree {
            machine,
            slots: Vec::new(),
            free_list: Vec::new(),
            root: 0,
            left_pseudo: 0,
            right_pseudo: 0,
            events: VecDeque::new(),
            trace,
            dirty: Vec::new(),
        };

        let chars: Vec<char> = text.chars().collect();
        let scan = scan_leaf_text(&tree.machine, &chars, start);
        let real = tree.leaves_for_pieces(&chars, &scan);

        tree.left_pseudo = tree.new_pseudo();
        tree.right_pseudo = tree.new_pseudo();
        let mut sequence = vec![tree.left_pseudo];
        sequence.extend(&real);
        sequence.push(tree.right_pseudo);
        tree.root = tree.build_balanced(&sequence);

        tree.apply_new_start_state(tree.root, start, true);
        tree.repair_dirty();
        tree
    }

    // -- accessors --------------------------------------------------------

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn machine(&self) -> &Mealy {
        &self.machine
    }

    /// Real leaves, left to right.
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(self.root, &mut out);
        out
    }

    /// The two sentinel leaves bracketing the document.
    pub fn pseudo_leaves(&self) -> (NodeId, NodeId) {
        (self.left_pseudo, self.right_pseudo)
    }

    pub fn is_pseudo(&self, id: NodeId) -> bool {
        matches!(self.node(id), Node::Leaf(l) if l.text.is_none())
    }

    /// A leaf's text (empty for pseudo leaves).
    pub fn text_of(&self, id: NodeId) -> &str {
        self.leaf(id).text.as_deref().unwrap_or("")
    }

    /// A leaf's current display style; `None` for unrecognized runs.
    pub fn style_of(&self, id: NodeId) -> Option<&Style> {
        self.leaf(id).style.as_ref()
    }

    /// A leaf's current boundary signal.
    pub fn signal_of(&self, id: NodeId) -> Option<&Signal> {
        self.leaf(id).signal.as_ref()
    }

    /// The whole document: leaf texts concatenated left to right.
    pub fn text(&self) -> String {
        self.leaves().iter().map(|&id| self.text_of(id)).collect()
    }

    /// Drain pending change notifications.
    pub fn drain_events(&mut self) -> Vec<TreeEvent> {
        self.events.drain(..).collect()
    }

    // -- edits ------------------------------------------------------------

    /// The sole mutation entry point: replace one leaf's text. Empty text
    /// removes the leaf. Editing a pseudo leaf is a host bug and panics.
    pub fn text_change(&mut self, id: NodeId, new_text: &str) {
        assert!(!self.is_pseudo(id), "attempt to edit a pseudo sentinel leaf");

        if new_text.is_empty() {
            self.events.push_back(TreeEvent::Delete { leaf: id });
            self.trace.on_structure("delete", id);
            if self.leaf(id).signal.is_some() {
                self.mark_left_run_dirty(id);
            }
            let parent = self.leaf(id).parent.expect("real leaf always has a parent");
            let anchor = self.delete_child(parent, id);
            self.refresh_upward(anchor);
            self.repair_dirty();
            return;
        }

        let chars: Vec<char> = new_text.chars().collect();
        let transfer = leaf_transfer(&self.machine, &chars);
        {
            let leaf = self.leaf_mut(id);
            leaf.text = Some(new_text.to_string());
            leaf.transfer = transfer;
        }
        let incoming = self.leaf(id).start_state;
        let parent = self.leaf(id).parent;
        self.rescan_leaf(id, incoming);
        self.refresh_upward(parent);
        self.repair_dirty();
    }

    /// Populate an empty tree. Panics if real leaves exist.
    pub fn insert(&mut self, text: &str) {
        assert!(self.leaves().is_empty(), "insert is only defined on an empty tree");
        if text.is_empty() {
            return;
        }

        let start = self.machine.start;
        let chars: Vec<char> = text.chars().collect();
        let scan = scan_leaf_text(&self.machine, &chars, start);
        let real = self.leaves_for_pieces(&chars, &scan);

        self.free_internals(self.root);
        let mut sequence = vec![self.left_pseudo];
        sequence.extend(&real);
        sequence.push(self.right_pseudo);
        self.root = self.build_balanced(&sequence);
        self.node_mut(self.root).set_parent(None);
        self.trace.on_structure("insert", self.root);

        self.apply_new_start_state(self.root, start, true);
        self.repair_dirty();
    }

    // -- arena ------------------------------------------------------------

    fn node(&self, id: NodeId) -> &Node {
        self.slots[id as usize].as_ref().expect("stale node handle")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id as usize].as_mut().expect("stale node handle")
    }

    fn leaf(&self, id: NodeId) -> &LeafNode {
        match self.node(id) {
            Node::Leaf(l) => l,
            Node::Internal(_) => panic!("node {} is not a leaf", id),
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode {
        match self.node_mut(id) {
            Node::Leaf(l) => l,
            Node::Internal(_) => panic!("node {} is not a leaf", id),
        }
    }

    fn internal(&self, id: NodeId) -> &InternalNode {
        match self.node(id) {
            Node::Internal(i) => i,
            Node::Leaf(_) => panic!("node {} is not an internal node", id),
        }
    }

    fn internal_mut(&mut self, id: NodeId) -> &mut InternalNode {
        match self.node_mut(id) {
            Node::Internal(i) => i,
            Node::Leaf(_) => panic!("node {} is not an internal node", id),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free_list.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(node);
                id
            },
            None => {
                let id = self.slots.len() as NodeId;
                self.slots.push(Some(node));
                id
            },
        }
    }

    fn release(&mut self, id: NodeId) {
        self.slots[id as usize] = None;
        self.free_list.push(id);
    }

    fn new_leaf(&mut self, text: &str) -> NodeId {
        let chars: Vec<char> = text.chars().collect();
        let transfer = leaf_transfer(&self.machine, &chars);
        self.alloc(Node::Leaf(LeafNode {
            parent: None,
            text: Some(text.to_string()),
            start_state: self.machine.start,
            transfer,
            signal: None,
            style: None,
        }))
    }

    fn new_pseudo(&mut self) -> NodeId {
        let transfer = identity_transfer(self.machine.num_states());
        self.alloc(Node::Leaf(LeafNode {
            parent: None,
            text: None,
            start_state: self.machine.start,
            transfer,
            signal: None,
            style: None,
        }))
    }

    /// An internal node over two existing children. The two-child invariant
    /// is enforced by the signature; the children's parent handles are wired
    /// here.
    fn new_internal(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let transfer = compose(self.node(left).transfer(), self.node(right).transfer());
        let signal = self.node(left).signal().cloned();
        let start_state = self.machine.start;
        let id = self.alloc(Node::Internal(InternalNode {
            parent: None,
            left: Some(left),
            right: Some(right),
            start_state,
            transfer,
            signal,
        }));
        self.node_mut(left).set_parent(Some(id));
        self.node_mut(right).set_parent(Some(id));
        id
    }

    /// Balanced binary tree over a leaf sequence by midpoint split.
    fn build_balanced(&mut self, ids: &[NodeId]) -> NodeId {
        match ids.len() {
            0 => panic!("cannot build a tree over no nodes"),
            1 => ids[0],
            n => {
                let mid = n / 2;
                let left = self.build_balanced(&ids[..mid]);
                let right = self.build_balanced(&ids[mid..]);
                self.new_internal(left, right)
            },
        }
    }

    fn leaves_for_pieces(&mut self, chars: &[char], scan: &LeafScan) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for fragment in scan.fragments.iter().chain(scan.tail.iter()) {
            let text: String = chars[fragment.start..fragment.end].iter().collect();
            let id = self.new_leaf(&text);
            self.dirty.push(id);
            ids.push(id);
        }
        ids
    }

    fn free_internals(&mut self, id: NodeId) {
        if let Node::Internal(i) = self.node(id) {
            let (left, right) = (i.left, i.right);
            if let Some(l) = left {
                self.free_internals(l);
            }
            if let Some(r) = right {
                self.free_internals(r);
            }
            self.release(id);
        }
    }

    fn collect_leaves(&self, id: NodeId, out: &mut Vec<NodeId>) {
        match self.node(id) {
            Node::Leaf(l) => {
                if l.text.is_some() {
                    out.push(id);
                }
            },
            Node::Internal(i) => {
                let (left, right) = (i.left, i.right);
                if let Some(l) = left {
                    self.collect_leaves(l, out);
                }
                if let Some(r) = right {
                    self.collect_leaves(r, out);
                }
            },
        }
    }

    fn finish_of(&self, id: NodeId) -> StateId {
        let node = self.node(id);
        node.transfer()[node.start_state() as usize]
    }

    fn leftmost_leaf(&self, mut id: NodeId) -> NodeId {
        loop {
            match self.node(id) {
                Node::Leaf(_) => return id,
                Node::Internal(i) => {
                    id = i.left.or(i.right).expect("internal node must have a child")
                },
            }
        }
    }

    fn rightmost_leaf(&self, mut id: NodeId) -> NodeId {
        loop {
            match self.node(id) {
                Node::Leaf(_) => return id,
                Node::Internal(i) => {
                    id = i.right.or(i.left).expect("internal node must have a child")
                },
            }
        }
    }

    /// In-order successor leaf (pseudo leaves included).
    fn next_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut child = id;
        loop {
            let parent = self.node(child).parent()?;
            if self.internal(parent).left == Some(child) {
                if let Some(right) = self.internal(parent).right {
                    return Some(self.leftmost_leaf(right));
                }
            }
            child = parent;
        }
    }

    /// In-order predecessor leaf (pseudo leaves included).
    fn prev_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut child = id;
        loop {
            let parent = self.node(child).parent()?;
            if self.internal(parent).right == Some(child) {
                if let Some(left) = self.internal(parent).left {
                    return Some(self.rightmost_leaf(left));
                }
            }
            child = parent;
        }
    }

    /// A boundary at `from` is disappearing: the run that used to close
    /// there merges into whatever follows, so every leaf of that run needs
    /// its style re-resolved against the new closing signal.
    fn mark_left_run_dirty(&mut self, from: NodeId) {
        let mut current = from;
        loop {
            let Some(prev) = self.prev_leaf(current) else { return };
            let leaf = self.leaf(prev);
            if leaf.text.is_none() {
                return; // left sentinel
            }
            let begins_run = leaf.signal.is_some() || leaf.start_state == self.machine.start;
            self.dirty.push(prev);
            if begins_run {
                return;
            }
            current = prev;
        }
    }

    // -- threading and signals -------------------------------------------

    /// Thread a new incoming state into a subtree. `force` disables change
    /// gating and is used for freshly built subtrees; everywhere else an
    /// unchanged incoming state stops propagation immediately.
    fn apply_new_start_state(&mut self, id: NodeId, state: StateId, force: bool) {
        if !force && self.node(id).start_state() == state {
            return;
        }
        match self.node(id) {
            Node::Leaf(leaf) => {
                if leaf.text.is_none() {
                    self.apply_to_pseudo(id, state);
                } else {
                    self.rescan_leaf(id, state);
                }
            },
            Node::Internal(_) => {
                self.internal_mut(id).start_state = state;
                let left = self.internal(id).left.expect("internal node must have a left child");
                self.apply_new_start_state(left, state, force);
                // a split may have replaced the child: re-read
                let left = self.internal(id).left.expect("internal node must have a left child");
                let left_finish = self.finish_of(left);
                let right =
                    self.internal(id).right.expect("internal node must have a right child");
                self.apply_new_start_state(right, left_finish, force);
                self.recompute_internal(id);
            },
        }
    }

    /// The right sentinel turns a document-final finish state into the
    /// trailing-lexeme signal; the left sentinel only ever sees the machine
    /// start and stays silent.
    fn apply_to_pseudo(&mut self, id: NodeId, state: StateId) {
        let new_signal = if state != self.machine.start {
            Some(Signal { style: self.machine.accept_style(state).cloned() })
        } else {
            None
        };
        let old_signal = {
            let leaf = self.leaf_mut(id);
            leaf.start_state = state;
            std::mem::replace(&mut leaf.signal, new_signal.clone())
        };
        if new_signal != old_signal {
            self.trace
                .on_signal(id, new_signal.as_ref().and_then(|s| s.style.as_ref()));
            match new_signal {
                Some(signal) => self.paint_left_of(id, signal.style),
                None => self.mark_left_run_dirty(id),
            }
        }
    }

    /// Re-derive a real leaf's fragments from an incoming state: the
    /// zero/one/many piece cases of the edit contract.
    fn rescan_leaf(&mut self, id: NodeId, incoming: StateId) {
        let chars: Vec<char> = self
            .leaf(id)
            .text
            .as_deref()
            .expect("rescan on a pseudo leaf")
            .chars()
            .collect();
        let scan = scan_leaf_text(&self.machine, &chars, incoming);
        self.trace.on_rescan(id, scan.pieces());
        debug_assert_eq!(
            scan.finish,
            self.leaf(id).transfer[incoming as usize],
            "leaf scan and transfer array disagree"
        );

        if scan.pieces() >= 2 {
            // the text now holds several lexeme boundaries: structural split
            self.split_leaf(id, &chars, &scan, incoming);
            return;
        }

        let old_signal = {
            let leaf = self.leaf_mut(id);
            leaf.start_state = incoming;
            std::mem::replace(&mut leaf.signal, scan.boundary.clone())
        };
        self.dirty.push(id);

        if scan.boundary != old_signal {
            self.trace
                .on_signal(id, scan.boundary.as_ref().and_then(|s| s.style.as_ref()));
            match &scan.boundary {
                Some(signal) => self.paint_left_of(id, signal.style.clone()),
                None => self.mark_left_run_dirty(id),
            }
        }

        // a whole-leaf unrecognized run never receives a closing signal
        if scan.tail.is_none() {
            if let Some(fragment) = scan.fragments.first() {
                if fragment.style.is_none() {
                    self.set_leaf_style(id, None);
                }
            }
        }
    }

    fn split_leaf(&mut self, id: NodeId, chars: &[char], scan: &LeafScan, incoming: StateId) {
        let parent = self.leaf(id).parent.expect("real leaf always has a parent");
        if self.leaf(id).signal.is_some() {
            // the old boundary goes away with the leaf; its left run may
            // merge into the first replacement piece
            self.mark_left_run_dirty(id);
        }
        let new_leaves = self.leaves_for_pieces(chars, scan);
        self.trace.on_structure("split", id);
        self.events
            .push_back(TreeEvent::Replace { leaf: id, new_leaves: new_leaves.clone() });

        let sub_root = self.build_balanced(&new_leaves);
        self.replace_child(parent, id, sub_root);
        self.release(id);
        self.apply_new_start_state(sub_root, incoming, true);
    }

    fn recompute_internal(&mut self, id: NodeId) {
        let left = self.internal(id).left.expect("internal node must have a left child");
        let right = self.internal(id).right.expect("internal node must have a right child");
        let transfer = compose(self.node(left).transfer(), self.node(right).transfer());
        let signal = self.node(left).signal().cloned();
        let node = self.internal_mut(id);
        node.transfer = transfer;
        node.signal = signal;
    }

    /// Recompose cached transfers and re-thread right siblings on the path
    /// from `from` to the root. Descents into siblings are change-gated; the
    /// recomposition itself is O(depth × states).
    fn refresh_upward(&mut self, from: Option<NodeId>) {
        let mut current = from;
        while let Some(id) = current {
            let assigned = self.internal(id).start_state;
            let left = self.internal(id).left.expect("internal node must have a left child");
            self.apply_new_start_state(left, assigned, false);
            let left = self.internal(id).left.expect("internal node must have a left child");
            let left_finish = self.finish_of(left);
            let right = self.internal(id).right.expect("internal node must have a right child");
            self.apply_new_start_state(right, left_finish, false);
            self.recompute_internal(id);
            current = self.internal(id).parent;
        }
    }

    // -- structural edits -------------------------------------------------

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        if let Node::Leaf(leaf) = self.node(old) {
            assert!(leaf.text.is_some(), "attempt to replace a pseudo sentinel leaf");
        }
        let node = self.internal_mut(parent);
        if node.left == Some(old) {
            node.left = Some(new);
        } else if node.right == Some(old) {
            node.right = Some(new);
        } else {
            panic!("node {} is not a child of {}", old, parent);
        }
        self.node_mut(new).set_parent(Some(parent));
    }

    /// Remove `child` from `parent`. The node left with a single child
    /// collapses: the survivor is spliced into the grandparent; a node left
    /// with no child asks its own parent to delete it in turn (bounded by
    /// tree height). Returns the node to refresh upward from.
    fn delete_child(&mut self, parent: NodeId, child: NodeId) -> Option<NodeId> {
        if let Node::Leaf(leaf) = self.node(child) {
            assert!(leaf.text.is_some(), "attempt to delete a pseudo sentinel leaf");
        }
        {
            let node = self.internal_mut(parent);
            if node.left == Some(child) {
                node.left = None;
            } else if node.right == Some(child) {
                node.right = None;
            } else {
                panic!("node {} is not a child of {}", child, parent);
            }
        }
        self.release(child);

        let remaining = {
            let node = self.internal(parent);
            node.left.or(node.right)
        };
        match remaining {
            Some(survivor) => {
                self.trace.on_structure("collapse", parent);
                let assigned = self.internal(parent).start_state;
                match self.internal(parent).parent {
                    Some(grand) => {
                        let node = self.internal_mut(grand);
                        if node.left == Some(parent) {
                            node.left = Some(survivor);
                        } else if node.right == Some(parent) {
                            node.right = Some(survivor);
                        } else {
                            panic!("node {} is not a child of {}", parent, grand);
                        }
                        self.node_mut(survivor).set_parent(Some(grand));
                        self.release(parent);
                        self.apply_new_start_state(survivor, assigned, false);
                        Some(grand)
                    },
                    None => {
                        // the collapsed node was the root
                        self.node_mut(survivor).set_parent(None);
                        self.root = survivor;
                        self.release(parent);
                        let start = self.machine.start;
                        self.apply_new_start_state(survivor, start, false);
                        self.node(survivor).parent()
                    },
                }
            },
            None => match self.internal(parent).parent {
                Some(grand) => self.delete_child(grand, parent),
                // unreachable in practice: the pseudo leaves are permanent
                None => panic!("tree lost its last node"),
            },
        }
    }

    // -- painting ---------------------------------------------------------

    /// Paint the run of leaves left of `from` with the style of the lexeme
    /// that just ended there.
    fn paint_left_of(&mut self, from: NodeId, style: Option<Style>) {
        let mut child = from;
        while let Some(parent) = self.node(child).parent() {
            if self.internal(parent).right == Some(child) {
                if let Some(left) = self.internal(parent).left {
                    if !self.apply_style_from_signal(left, &style) {
                        return;
                    }
                }
            }
            child = parent;
        }
    }

    /// Apply a signal's style to a subtree: right child first; the left
    /// child is only painted if the right subtree was painted all the way
    /// through its left edge without meeting the start of a fresh lexeme.
    /// Returns whether painting ran past this subtree's left edge.
    fn apply_style_from_signal(&mut self, id: NodeId, style: &Option<Style>) -> bool {
        match self.node(id) {
            Node::Leaf(leaf) => {
                if leaf.text.is_none() {
                    // sentinels terminate propagation
                    return false;
                }
                // a leaf that scans from the machine start begins the ended
                // lexeme: paint it and stop
                let begins_run =
                    leaf.signal.is_some() || leaf.start_state == self.machine.start;
                self.set_leaf_style(id, style.clone());
                !begins_run
            },
            Node::Internal(node) => {
                let (left, right) = (node.left, node.right);
                if let Some(right) = right {
                    if !self.apply_style_from_signal(right, style) {
                        return false;
                    }
                }
                match left {
                    Some(left) => self.apply_style_from_signal(left, style),
                    None => true,
                }
            },
        }
    }

    fn set_leaf_style(&mut self, id: NodeId, style: Option<Style>) {
        if self.leaf(id).style == style {
            return;
        }
        self.trace.on_paint(id, style.as_ref());
        self.leaf_mut(id).style = style.clone();
        self.events.push_back(TreeEvent::NewStyle { leaf: id, style });
    }

    // -- style repair ------------------------------------------------------

    /// Resolve the closing style for the lexeme containing `id` by walking
    /// right to the leaf where the next fresh scan begins.
    fn closing_style_for(&self, id: NodeId) -> Option<Style> {
        let mut current = id;
        loop {
            let next = self.next_leaf(current)?;
            let leaf = self.leaf(next);
            if leaf.text.is_none() {
                // the right sentinel carries the document-end signal
                return leaf.signal.as_ref().and_then(|s| s.style.clone());
            }
            if let Some(signal) = &leaf.signal {
                return signal.style.clone();
            }
            if leaf.start_state == self.machine.start {
                // a fresh run begins with no boundary signal: the run ending
                // at its left edge was unrecognized
                return None;
            }
            current = next;
        }
    }

    /// Re-resolve the display style of every leaf touched by the edit. This
    /// closes the cases change gating cannot see, e.g. a leaf that became a
    /// continuation of a lexeme whose closing signal kept its old value.
    fn repair_dirty(&mut self) {
        let dirty = std::mem::take(&mut self.dirty);
        let mut seen = std::collections::BTreeSet::new();
        for id in dirty {
            if !seen.insert(id) {
                continue;
            }
            let is_live_leaf = matches!(
                self.slots.get(id as usize).and_then(|slot| slot.as_ref()),
                Some(Node::Leaf(leaf)) if leaf.text.is_some()
            );
            if !is_live_leaf {
                continue; // removed or replaced during this edit
            }
            let style = self.closing_style_for(id);
            self.set_leaf_style(id, style);
        }
    }
}
