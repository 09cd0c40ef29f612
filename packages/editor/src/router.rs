//! # Change-Notification Multiplexer
//!
//! [`EventRouter`] turns the editor's low-level record stream into
//! semantic events and fans them out to pattern-filtered subscriptions.
//! One router watches one root; records touching nodes outside that
//! root's subtree produce no events.
//!
//! Events around a deletion are matched against the tree *before* the
//! node detaches, while ancestors still exist, and the post-deletion
//! half is delivered right after the mutation. Handlers therefore see
//! `Removed`/`Excluded` for nodes that are already out of the tree; the
//! events carry what the handler can no longer look up.
//!
//! Handlers receive `&Document` and cannot mutate. Follow-up mutations go
//! through [`Triggers`]: a handler fires a named trigger, and the
//! application later drains the queue with [`Triggers::process_immediately`],
//! which hands each trigger handler the `&mut TreeEditor` it needs.

use crate::pattern::Pattern;
use crate::records::{ChangeRecord, EditOp, Phase};
use crate::tree_editor::TreeEditor;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::debug;
use vellum_dom::{Document, NodeId, QualName, Root};

/// Semantic view of one mutation, delivered to matching subscriptions.
///
/// `Added`/`Removed` report the node an operation named; `Included`/
/// `Excluding`/`Excluded` report every element of the affected subtree,
/// top first, with the subtree's top for context. All five fire for
/// elements only. `ChildrenChanging`/`ChildrenChanged` report the parent
/// whose child list is about to change / has changed, around both
/// insertions and deletions, carrying the diff and the siblings flanking
/// the change point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticEvent {
    /// An element was inserted into `parent`.
    Added { node: NodeId, parent: NodeId },
    /// An element was deleted; `parent` is where it used to be.
    Removed { node: NodeId, parent: NodeId },
    /// An element entered the root's subtree as part of inserting `top`.
    Included { node: NodeId, top: NodeId },
    /// An element is about to leave the root's subtree with `top`. Fired
    /// before the mutation, so the tree can still be inspected.
    Excluding { node: NodeId, top: NodeId },
    /// An element has left the root's subtree with `top`.
    Excluded { node: NodeId, top: NodeId },
    /// The child list of `parent` is about to change.
    ChildrenChanging {
        parent: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        /// Sibling just before the change point, if any.
        prev: Option<NodeId>,
        /// Sibling just after the change point, if any.
        next: Option<NodeId>,
    },
    /// The child list of `parent` has changed.
    ChildrenChanged {
        parent: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
        prev: Option<NodeId>,
        next: Option<NodeId>,
    },
    /// A text node's value changed. Subscriptions match on its parent.
    TextChanged {
        node: NodeId,
        old: String,
        new: String,
    },
    /// An attribute of `node` was set or removed; `None` means absent.
    AttributeChanged {
        node: NodeId,
        name: QualName,
        old: Option<String>,
        new: Option<String>,
    },
}

/// Subscription key: which [`SemanticEvent`] variant to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
    Included,
    Excluding,
    Excluded,
    ChildrenChanging,
    ChildrenChanged,
    TextChanged,
    AttributeChanged,
}

impl SemanticEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SemanticEvent::Added { .. } => EventKind::Added,
            SemanticEvent::Removed { .. } => EventKind::Removed,
            SemanticEvent::Included { .. } => EventKind::Included,
            SemanticEvent::Excluding { .. } => EventKind::Excluding,
            SemanticEvent::Excluded { .. } => EventKind::Excluded,
            SemanticEvent::ChildrenChanging { .. } => EventKind::ChildrenChanging,
            SemanticEvent::ChildrenChanged { .. } => EventKind::ChildrenChanged,
            SemanticEvent::TextChanged { .. } => EventKind::TextChanged,
            SemanticEvent::AttributeChanged { .. } => EventKind::AttributeChanged,
        }
    }

    /// The node the event is about. For the children events this is the
    /// parent whose child list changes.
    pub fn node(&self) -> NodeId {
        match self {
            SemanticEvent::Added { node, .. }
            | SemanticEvent::Removed { node, .. }
            | SemanticEvent::Included { node, .. }
            | SemanticEvent::Excluding { node, .. }
            | SemanticEvent::Excluded { node, .. }
            | SemanticEvent::TextChanged { node, .. }
            | SemanticEvent::AttributeChanged { node, .. } => *node,
            SemanticEvent::ChildrenChanging { parent, .. }
            | SemanticEvent::ChildrenChanged { parent, .. } => *parent,
        }
    }
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubId(u64);

/// Shared, reentrancy-safe event handler.
pub type EventHandler = Rc<RefCell<dyn FnMut(&Document, &SemanticEvent)>>;

struct Subscription {
    id: u64,
    kind: EventKind,
    pattern: Pattern,
    handler: EventHandler,
}

/// One planned handler invocation.
type Delivery = (SemanticEvent, Vec<EventHandler>);

struct RouterCore {
    root: Root,
    subs: Vec<Subscription>,
    next_id: u64,
    listening: bool,
    // post-deletion deliveries, planned at Before while the tree is whole
    stash: Vec<Delivery>,
}

/// The multiplexer. Clones share one subscription list and trigger
/// queue; attach it to an editor once with [`EventRouter::attach`].
#[derive(Clone)]
pub struct EventRouter {
    core: Rc<RefCell<RouterCore>>,
    triggers: Triggers,
}

impl EventRouter {
    pub fn new(root: Root) -> Self {
        Self {
            core: Rc::new(RefCell::new(RouterCore {
                root,
                subs: Vec::new(),
                next_id: 0,
                listening: true,
                stash: Vec::new(),
            })),
            triggers: Triggers::new(),
        }
    }

    /// Register this router on `editor`'s record stream.
    pub fn attach(&self, editor: &mut TreeEditor) {
        let core = Rc::clone(&self.core);
        editor.add_listener(Box::new(move |doc, record| dispatch(&core, doc, record)));
    }

    /// Subscribe `handler` to `kind` events whose subject matches
    /// `pattern`. For [`EventKind::TextChanged`] the pattern is matched
    /// against the text node's parent; for the children events against
    /// the parent whose list changes; otherwise against the event's node.
    pub fn subscribe<F>(&self, kind: EventKind, pattern: Pattern, handler: F) -> SubId
    where
        F: FnMut(&Document, &SemanticEvent) + 'static,
    {
        let mut core = self.core.borrow_mut();
        let id = core.next_id;
        core.next_id += 1;
        core.subs.push(Subscription {
            id,
            kind,
            pattern,
            handler: Rc::new(RefCell::new(handler)),
        });
        SubId(id)
    }

    /// Drop a subscription. Returns whether it existed. A handler removed
    /// mid-dispatch still receives the events already planned for it.
    pub fn unsubscribe(&self, id: SubId) -> bool {
        let mut core = self.core.borrow_mut();
        let before = core.subs.len();
        core.subs.retain(|s| s.id != id.0);
        core.subs.len() != before
    }

    /// Resume event production.
    pub fn start_listening(&self) {
        self.core.borrow_mut().listening = true;
    }

    /// Stop producing events. Records arriving meanwhile are dropped, not
    /// queued.
    pub fn stop_listening(&self) {
        let mut core = self.core.borrow_mut();
        core.listening = false;
        core.stash.clear();
    }

    /// The trigger queue shared by this router's handlers.
    pub fn triggers(&self) -> Triggers {
        self.triggers.clone()
    }
}

fn dispatch(core: &Rc<RefCell<RouterCore>>, doc: &Document, record: &ChangeRecord) {
    // plan under the borrow, invoke with it released so handlers can
    // subscribe, unsubscribe or stop the router
    let deliveries = {
        let mut core = core.borrow_mut();
        if !core.listening {
            return;
        }
        core.plan(doc, record)
    };
    for (event, handlers) in deliveries {
        debug!(event = ?event.kind(), node = %event.node(), "event");
        for handler in handlers {
            (*handler.borrow_mut())(doc, &event);
        }
    }
}

impl RouterCore {
    fn plan(&mut self, doc: &Document, record: &ChangeRecord) -> Vec<Delivery> {
        let root = self.root.node();
        let mut now = Vec::new();
        match (record.phase, &record.op) {
            (Phase::Before, EditOp::InsertNode { parent, index, node }) => {
                if doc.in_subtree(root, *parent) {
                    let (prev, next) = flanking(doc, *parent, *index, 0);
                    self.push(
                        doc,
                        SemanticEvent::ChildrenChanging {
                            parent: *parent,
                            added: vec![*node],
                            removed: Vec::new(),
                            prev,
                            next,
                        },
                        &mut now,
                    );
                }
            }
            (Phase::After, EditOp::InsertNode { parent, index, node }) => {
                if doc.in_subtree(root, *node) {
                    if doc.node(*node).is_element() {
                        self.push(
                            doc,
                            SemanticEvent::Added {
                                node: *node,
                                parent: *parent,
                            },
                            &mut now,
                        );
                    }
                    for el in subtree_elements(doc, *node) {
                        self.push(doc, SemanticEvent::Included { node: el, top: *node }, &mut now);
                    }
                }
                if doc.in_subtree(root, *parent) {
                    let (prev, next) = flanking(doc, *parent, *index, 1);
                    self.push(
                        doc,
                        SemanticEvent::ChildrenChanged {
                            parent: *parent,
                            added: vec![*node],
                            removed: Vec::new(),
                            prev,
                            next,
                        },
                        &mut now,
                    );
                }
            }
            (Phase::Before, EditOp::DeleteNode { node, parent, index }) => {
                debug_assert!(self.stash.is_empty(), "unpaired delete records");
                if doc.in_subtree(root, *node) {
                    for el in subtree_elements(doc, *node) {
                        self.push(doc, SemanticEvent::Excluding { node: el, top: *node }, &mut now);
                    }
                }
                let in_parent = doc.in_subtree(root, *parent);
                let (prev, next) = flanking(doc, *parent, *index, 1);
                if in_parent {
                    self.push(
                        doc,
                        SemanticEvent::ChildrenChanging {
                            parent: *parent,
                            added: Vec::new(),
                            removed: vec![*node],
                            prev,
                            next,
                        },
                        &mut now,
                    );
                }
                // plan the post side while ancestors are still in place
                let mut stash = Vec::new();
                if doc.in_subtree(root, *node) {
                    if doc.node(*node).is_element() {
                        self.push(
                            doc,
                            SemanticEvent::Removed {
                                node: *node,
                                parent: *parent,
                            },
                            &mut stash,
                        );
                    }
                    for el in subtree_elements(doc, *node) {
                        self.push(doc, SemanticEvent::Excluded { node: el, top: *node }, &mut stash);
                    }
                }
                if in_parent {
                    self.push(
                        doc,
                        SemanticEvent::ChildrenChanged {
                            parent: *parent,
                            added: Vec::new(),
                            removed: vec![*node],
                            prev,
                            next,
                        },
                        &mut stash,
                    );
                }
                self.stash = stash;
            }
            (Phase::After, EditOp::DeleteNode { .. }) => {
                now = std::mem::take(&mut self.stash);
            }
            (Phase::After, EditOp::SetText { node, old, new }) => {
                if doc.in_subtree(root, *node) {
                    self.push(
                        doc,
                        SemanticEvent::TextChanged {
                            node: *node,
                            old: old.clone(),
                            new: new.clone(),
                        },
                        &mut now,
                    );
                }
            }
            (Phase::After, EditOp::SetAttribute { node, name, old, new }) => {
                if doc.in_subtree(root, *node) {
                    self.push(
                        doc,
                        SemanticEvent::AttributeChanged {
                            node: *node,
                            name: name.clone(),
                            old: old.clone(),
                            new: new.clone(),
                        },
                        &mut now,
                    );
                }
            }
            (Phase::Before, EditOp::SetText { .. }) | (Phase::Before, EditOp::SetAttribute { .. }) => {}
        }
        now
    }

    fn push(&self, doc: &Document, event: SemanticEvent, out: &mut Vec<Delivery>) {
        let handlers = self.matching_handlers(doc, &event);
        if !handlers.is_empty() {
            out.push((event, handlers));
        }
    }

    fn matching_handlers(&self, doc: &Document, event: &SemanticEvent) -> Vec<EventHandler> {
        let Some(target) = match_target(doc, event) else {
            return Vec::new();
        };
        let kind = event.kind();
        self.subs
            .iter()
            .filter(|s| s.kind == kind && s.pattern.matches(doc, target))
            .map(|s| Rc::clone(&s.handler))
            .collect()
    }
}

/// The element a subscription pattern is tested against.
fn match_target(doc: &Document, event: &SemanticEvent) -> Option<NodeId> {
    match event {
        SemanticEvent::TextChanged { node, .. } => doc.parent(*node),
        other => Some(other.node()),
    }
}

/// Elements of the subtree under (and including) `node`, top first.
fn subtree_elements(doc: &Document, node: NodeId) -> Vec<NodeId> {
    doc.descendants(node).filter(|&n| doc.node(n).is_element()).collect()
}

/// Siblings on either side of the change point. `occupied` is 1 when the
/// changing node currently sits at `index`, 0 when the slot is empty.
fn flanking(
    doc: &Document,
    parent: NodeId,
    index: usize,
    occupied: usize,
) -> (Option<NodeId>, Option<NodeId>) {
    let children = doc.children(parent);
    let prev = index.checked_sub(1).and_then(|i| children.get(i)).copied();
    let next = children.get(index + occupied).copied();
    (prev, next)
}

// ----------------------------------------------------------------------
// Triggers

type TriggerHandler = Box<dyn FnMut(&mut TreeEditor)>;

#[derive(Default)]
struct TriggerQueue {
    pending: VecDeque<String>,
    pending_set: HashSet<String>,
    handlers: HashMap<String, Vec<TriggerHandler>>,
}

/// Named, deferred follow-up work.
///
/// Event handlers cannot mutate the tree, so they fire triggers instead;
/// the application drains the queue once the current mutation has
/// settled. Firing an already-pending trigger is a no-op, which keeps a
/// cascade of events from queuing the same cleanup many times over.
#[derive(Clone)]
pub struct Triggers {
    queue: Rc<RefCell<TriggerQueue>>,
}

impl Triggers {
    fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(TriggerQueue::default())),
        }
    }

    /// Run `handler` whenever the named trigger is processed. Multiple
    /// handlers per name run in registration order.
    pub fn add_handler<F>(&self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&mut TreeEditor) + 'static,
    {
        self.queue
            .borrow_mut()
            .handlers
            .entry(name.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Queue the named trigger, once.
    pub fn fire(&self, name: impl Into<String>) {
        let name = name.into();
        let mut queue = self.queue.borrow_mut();
        if queue.pending_set.insert(name.clone()) {
            debug!(trigger = %name, "fire");
            queue.pending.push_back(name);
        }
    }

    /// Names currently queued, in firing order.
    pub fn pending(&self) -> Vec<String> {
        self.queue.borrow().pending.iter().cloned().collect()
    }

    /// Drop everything queued without running it.
    pub fn clear_pending(&self) {
        let mut queue = self.queue.borrow_mut();
        queue.pending.clear();
        queue.pending_set.clear();
    }

    /// Drain the queue, running every pending trigger's handlers with
    /// `editor`. Triggers fired while processing are processed too, in
    /// the same pass.
    pub fn process_immediately(&self, editor: &mut TreeEditor) {
        loop {
            let name = {
                let mut queue = self.queue.borrow_mut();
                match queue.pending.pop_front() {
                    Some(name) => {
                        queue.pending_set.remove(&name);
                        name
                    }
                    None => break,
                }
            };
            debug!(trigger = %name, "process");
            // take the handlers out so they can fire triggers or add
            // handlers without hitting the borrow
            let mut handlers = self.queue.borrow_mut().handlers.remove(&name).unwrap_or_default();
            for handler in handlers.iter_mut() {
                handler(editor);
            }
            let mut queue = self.queue.borrow_mut();
            match queue.handlers.entry(name) {
                Entry::Occupied(mut slot) => {
                    // handlers added while running go after the originals
                    let added = std::mem::take(slot.get_mut());
                    handlers.extend(added);
                    *slot.get_mut() = handlers;
                }
                Entry::Vacant(slot) => {
                    slot.insert(handlers);
                }
            }
        }
    }
}
