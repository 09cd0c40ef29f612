//! # Vellum Editor
//!
//! Core mutation engine for Vellum structured documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ application: carets, commands, UI           │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: TreeEditor mutation protocol        │
//! │  - Four validated primitives                │
//! │  - Compound ops built from primitives       │
//! │  - Before/After records to listeners        │
//! └─────────────────────────────────────────────┘
//!           ↓                        ↓
//! ┌──────────────────────┐ ┌──────────────────────┐
//! │ router: records →    │ │ recorder: records →  │
//! │ semantic events +    │ │ reversible commands  │
//! │ deferred triggers    │ │ in a History         │
//! └──────────────────────┘ └──────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **One writer**: every change goes through `TreeEditor`'s primitives
//! 2. **Records are the truth**: Before/After pairs describe each mutation
//!    completely, so listeners and the undo engine derive everything
//! 3. **Validate, then announce**: an operation that can fail fails before
//!    its first record; no partial mutations
//! 4. **Handlers observe, triggers mutate**: event handlers get `&Document`;
//!    follow-up edits run later through the trigger queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vellum_dom::{Document, QualName};
//! use vellum_editor::{EventKind, EventRouter, Pattern, TreeEditor};
//!
//! let mut doc = Document::new();
//! let top = doc.create_element(QualName::new("doc"));
//! let root = doc.mark_root(top)?;
//!
//! let mut editor = TreeEditor::new(doc, root);
//! let router = EventRouter::new(root);
//! router.attach(&mut editor);
//!
//! router.subscribe(EventKind::Added, Pattern::parse("p")?, |_doc, event| {
//!     // react to new paragraphs
//! });
//!
//! let p = editor.insert_text(top, 0, "hello", true)?;
//! ```
//!
//! ### Undo
//!
//! ```rust,ignore
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use vellum_editor::{History, TreeEditor, UndoRecorder};
//!
//! let history = Rc::new(RefCell::new(History::new()));
//! UndoRecorder::attach(&mut editor, &history);
//!
//! editor.insert_text(top, 0, "hello", true)?;
//! history.borrow_mut().undo(&mut editor);
//! ```

mod errors;
mod pattern;
mod recorder;
mod records;
mod router;
mod tree_editor;

pub use errors::{EditError, EditResult, PatternError};
pub use pattern::Pattern;
pub use recorder::{EditCommand, UndoRecorder};
pub use records::{ChangeRecord, EditOp, NodeSpec, Phase};
pub use router::{EventHandler, EventKind, EventRouter, SemanticEvent, SubId, Triggers};
pub use tree_editor::{InsertedText, RecordListener, TreeEditor};

// Re-export the data model and the undo engine for convenience
pub use vellum_dom::{Document, Location, LocationError, NodeId, QualName, Root};
pub use vellum_history::{Command, History, ReplayEvent, ReplayHandle, ReplayKind};
