//! Bridge from the record stream to the undo engine.
//!
//! [`UndoRecorder::attach`] listens to an editor and records one
//! [`EditCommand`] per After record. The command is the operation's own
//! description: replaying it forward re-runs the primitive with the new
//! values, replaying it backward runs the primitive with the old ones.
//! Deleted nodes stay in the arena, so re-inserting them on undo is just
//! another insert.
//!
//! The recorder checks the history's [`ReplayHandle`] before touching the
//! history itself: records emitted *by* an undo or redo arrive while the
//! history is mutably borrowed by that very replay, and must not be
//! recorded again anyway.

use crate::records::{EditOp, NodeSpec, Phase};
use crate::tree_editor::TreeEditor;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::error;
use vellum_history::{Command, History};

/// A recorded primitive, replayable in both directions.
pub struct EditCommand {
    op: EditOp,
}

impl EditCommand {
    pub fn new(op: EditOp) -> Self {
        Self { op }
    }
}

impl Command<TreeEditor> for EditCommand {
    fn undo(&mut self, editor: &mut TreeEditor) {
        let result = match &self.op {
            EditOp::InsertNode { node, .. } => editor.delete_node(*node),
            EditOp::DeleteNode { node, parent, index } => editor
                .insert_node_at(*parent, *index, NodeSpec::Node(*node))
                .map(|_| ()),
            EditOp::SetText { node, old, .. } => editor.set_text_node(*node, old),
            EditOp::SetAttribute { node, name, old, .. } => {
                editor.set_attribute(*node, name, old.as_deref())
            }
        };
        if let Err(error) = result {
            error!(%error, label = self.label(), "undo failed");
        }
    }

    fn redo(&mut self, editor: &mut TreeEditor) {
        let result = match &self.op {
            EditOp::InsertNode { parent, index, node } => editor
                .insert_node_at(*parent, *index, NodeSpec::Node(*node))
                .map(|_| ()),
            EditOp::DeleteNode { node, .. } => editor.delete_node(*node),
            EditOp::SetText { node, new, .. } => editor.set_text_node(*node, new),
            EditOp::SetAttribute { node, name, new, .. } => {
                editor.set_attribute(*node, name, new.as_deref())
            }
        };
        if let Err(error) = result {
            error!(%error, label = self.label(), "redo failed");
        }
    }

    fn label(&self) -> &str {
        match self.op {
            EditOp::InsertNode { .. } => "insert node",
            EditOp::DeleteNode { .. } => "delete node",
            EditOp::SetText { .. } => "edit text",
            EditOp::SetAttribute { .. } => "set attribute",
        }
    }
}

/// Feeds an editor's mutations into a [`History`].
pub struct UndoRecorder;

impl UndoRecorder {
    /// Start recording `editor`'s mutations into `history`. Call once per
    /// editor; records produced by replays are not re-recorded.
    pub fn attach(editor: &mut TreeEditor, history: &Rc<RefCell<History<TreeEditor>>>) {
        let handle = history.borrow().replay_handle();
        let history = Rc::clone(history);
        editor.add_listener(Box::new(move |_doc, record| {
            if record.phase != Phase::After {
                return;
            }
            // replay in progress holds the history borrow; skip first
            if handle.is_replaying() {
                return;
            }
            let command = EditCommand::new(record.op.clone());
            history.borrow_mut().record(Box::new(command));
        }));
    }
}
