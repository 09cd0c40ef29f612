//! Tests for undo recording and replay
//!
//! This tests:
//! - Exact markup round-trips through undo and redo
//! - Grouped compound operations undoing atomically
//! - Redo truncation when a new edit branches the history
//! - Replay suppression: undone work is not recorded again
//! - History limits and labels

use std::cell::RefCell;
use std::rc::Rc;
use vellum_dom::{to_markup, Document, NodeId, QualName};
use vellum_editor::{
    EventKind, EventRouter, History, Location, NodeSpec, Pattern, ReplayKind, TreeEditor,
    UndoRecorder,
};

type SharedHistory = Rc<RefCell<History<TreeEditor>>>;

/// `<doc><p>abcd</p></doc>` with an undo recorder attached.
fn fixture() -> (TreeEditor, SharedHistory, NodeId, NodeId, NodeId) {
    let mut doc = Document::new();
    let top = doc.create_element(QualName::new("doc"));
    let p = doc.create_element(QualName::new("p"));
    let t = doc.create_text("abcd");
    doc.append_child(top, p);
    doc.append_child(p, t);
    let root = doc.mark_root(top).unwrap();
    let mut editor = TreeEditor::new(doc, root);
    let history = Rc::new(RefCell::new(History::new()));
    UndoRecorder::attach(&mut editor, &history);
    (editor, history, top, p, t)
}

#[test]
fn test_undo_and_redo_restore_exact_markup() {
    let (mut editor, history, top, p, t) = fixture();
    let before = to_markup(editor.document(), top);

    editor.insert_text(t, 4, "!", true).unwrap();
    editor
        .set_attribute(p, &QualName::new("rend"), Some("x"))
        .unwrap();
    let after = to_markup(editor.document(), top);
    assert_eq!(after, "<doc><p rend=\"x\">abcd!</p></doc>");
    assert_eq!(history.borrow().undo_levels(), 2);

    assert!(history.borrow_mut().undo(&mut editor));
    assert!(history.borrow_mut().undo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), before);
    assert!(!history.borrow_mut().undo(&mut editor));

    assert!(history.borrow_mut().redo(&mut editor));
    assert!(history.borrow_mut().redo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), after);
    assert!(!history.borrow_mut().redo(&mut editor));
}

#[test]
fn test_every_primitive_round_trips() {
    let (mut editor, history, top, p, t) = fixture();

    // insert
    let hi = editor.create_element(QualName::new("hi"));
    let before = to_markup(editor.document(), top);
    editor.insert_node_at(p, 1, NodeSpec::Node(hi)).unwrap();
    let after = to_markup(editor.document(), top);
    history.borrow_mut().undo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), before);
    history.borrow_mut().redo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), after);

    // delete
    let before = after;
    editor.delete_node(hi).unwrap();
    let after = to_markup(editor.document(), top);
    history.borrow_mut().undo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), before);
    history.borrow_mut().redo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), after);

    // text
    let before = after;
    editor.set_text_node(t, "wxyz").unwrap();
    let after = to_markup(editor.document(), top);
    history.borrow_mut().undo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), before);
    history.borrow_mut().redo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), after);

    // attribute
    let before = after;
    editor
        .set_attribute(p, &QualName::new("rend"), Some("it"))
        .unwrap();
    history.borrow_mut().undo(&mut editor);
    assert_eq!(to_markup(editor.document(), top), before);
}

#[test]
fn test_grouped_split_undoes_atomically() {
    let (mut editor, history, top, p, t) = fixture();
    editor
        .set_attribute(p, &QualName::new("rend"), Some("x"))
        .unwrap();
    let before = to_markup(editor.document(), top);

    history.borrow_mut().start_group("split paragraph");
    editor.split_at(p, t, 2).unwrap();
    history.borrow_mut().end_group().unwrap();
    let after = to_markup(editor.document(), top);
    assert_eq!(
        after,
        "<doc><p rend=\"x\">ab</p><p rend=\"x\">cd</p></doc>"
    );

    // one undo steps over the whole group and restores the original
    // paragraph, children and all
    assert_eq!(history.borrow().undo_levels(), 2);
    assert!(history.borrow_mut().undo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), before);
    assert_eq!(editor.document().children(p), &[t]);

    assert!(history.borrow_mut().redo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), after);
}

#[test]
fn test_grouped_cut_round_trips() {
    let mut doc = Document::new();
    let top = doc.create_element(QualName::new("doc"));
    let p = doc.create_element(QualName::new("p"));
    let t1 = doc.create_text("before");
    let term1 = doc.create_element(QualName::new("term"));
    let term1_text = doc.create_text("x");
    let t2 = doc.create_text(" between ");
    let term2 = doc.create_element(QualName::new("term"));
    let term2_text = doc.create_text("y");
    let t3 = doc.create_text(" after");
    doc.append_child(top, p);
    doc.append_child(p, t1);
    doc.append_child(p, term1);
    doc.append_child(term1, term1_text);
    doc.append_child(p, t2);
    doc.append_child(p, term2);
    doc.append_child(term2, term2_text);
    doc.append_child(p, t3);
    let root = doc.mark_root(top).unwrap();
    let mut editor = TreeEditor::new(doc, root);
    let history = Rc::new(RefCell::new(History::new()));
    UndoRecorder::attach(&mut editor, &history);

    let before = to_markup(editor.document(), top);
    assert_eq!(
        before,
        "<doc><p>before<term>x</term> between <term>y</term> after</p></doc>"
    );

    history.borrow_mut().start_group("cut selection");
    let a = Location {
        root,
        node: t1,
        offset: 4,
    };
    let b = Location {
        root,
        node: t3,
        offset: 3,
    };
    editor.cut(a, b).unwrap();
    history.borrow_mut().end_group().unwrap();
    assert_eq!(to_markup(editor.document(), top), "<doc><p>befoter</p></doc>");

    // the cut is many primitives with shifting indices; reversing them
    // one by one must still land exactly on the original tree
    assert!(history.borrow_mut().undo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), before);
    assert_eq!(editor.document().children(p), &[t1, term1, t2, term2, t3]);

    assert!(history.borrow_mut().redo(&mut editor));
    assert_eq!(to_markup(editor.document(), top), "<doc><p>befoter</p></doc>");
}

#[test]
fn test_new_edits_truncate_the_redo_branch() {
    let (mut editor, history, _top, _p, t) = fixture();
    editor.set_text_node(t, "v1").unwrap();
    editor.set_text_node(t, "v2").unwrap();
    editor.set_text_node(t, "v3").unwrap();

    history.borrow_mut().undo(&mut editor);
    history.borrow_mut().undo(&mut editor);
    assert_eq!(editor.document().text(t), Some("v1"));
    assert_eq!(history.borrow().redo_levels(), 2);

    // branching point: the undone future is gone
    editor.set_text_node(t, "branch").unwrap();
    assert_eq!(history.borrow().redo_levels(), 0);
    assert_eq!(history.borrow().undo_levels(), 2);
    assert!(!history.borrow().can_redo());

    history.borrow_mut().undo(&mut editor);
    assert_eq!(editor.document().text(t), Some("v1"));
}

#[test]
fn test_replayed_work_is_not_recorded_again() {
    let (mut editor, history, _top, _p, t) = fixture();
    editor.set_text_node(t, "one").unwrap();
    editor.set_text_node(t, "two").unwrap();
    assert_eq!(history.borrow().undo_levels(), 2);

    // the undo replays a primitive, which emits records; the recorder
    // must let them pass without growing the history
    let version_before = editor.version();
    history.borrow_mut().undo(&mut editor);
    assert!(editor.version() > version_before);
    assert_eq!(history.borrow().undo_levels(), 1);
    assert_eq!(history.borrow().redo_levels(), 1);

    history.borrow_mut().redo(&mut editor);
    assert_eq!(history.borrow().undo_levels(), 2);
    assert_eq!(history.borrow().redo_levels(), 0);
}

#[test]
fn test_labels_and_observer_report_replays() {
    let (mut editor, history, _top, p, t) = fixture();
    let seen: Rc<RefCell<Vec<(ReplayKind, String, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    history.borrow_mut().set_observer(Box::new(move |event| {
        sink.borrow_mut()
            .push((event.kind, event.label.to_string(), event.is_group));
    }));

    editor.set_text_node(t, "xyz").unwrap();
    assert_eq!(history.borrow().undo_label(), Some("edit text"));

    history.borrow_mut().start_group("emphasize");
    editor
        .set_attribute(p, &QualName::new("rend"), Some("it"))
        .unwrap();
    editor.set_text_node(t, "XYZ").unwrap();
    history.borrow_mut().end_group().unwrap();
    assert_eq!(history.borrow().undo_label(), Some("emphasize"));

    // group members replay in reverse on undo, then the group reports
    history.borrow_mut().undo(&mut editor);
    assert_eq!(
        *seen.borrow(),
        vec![
            (ReplayKind::Undo, "edit text".to_string(), false),
            (ReplayKind::Undo, "set attribute".to_string(), false),
            (ReplayKind::Undo, "emphasize".to_string(), true),
        ]
    );
    assert_eq!(history.borrow().redo_label(), Some("emphasize"));
}

#[test]
fn test_history_limit_drops_the_oldest_entries() {
    let mut doc = Document::new();
    let top = doc.create_element(QualName::new("doc"));
    let p = doc.create_element(QualName::new("p"));
    let t = doc.create_text("a");
    doc.append_child(top, p);
    doc.append_child(p, t);
    let root = doc.mark_root(top).unwrap();
    let mut editor = TreeEditor::new(doc, root);
    let history = Rc::new(RefCell::new(History::with_limit(2)));
    UndoRecorder::attach(&mut editor, &history);

    editor.set_text_node(t, "b").unwrap();
    editor.set_text_node(t, "c").unwrap();
    editor.set_text_node(t, "d").unwrap();
    assert_eq!(history.borrow().undo_levels(), 2);

    history.borrow_mut().undo(&mut editor);
    history.borrow_mut().undo(&mut editor);
    // the first edit fell off the end: "b" is as far back as undo goes
    assert_eq!(editor.document().text(t), Some("b"));
    assert!(!history.borrow_mut().undo(&mut editor));
}

#[test]
fn test_events_still_fire_during_replay() {
    let (mut editor, history, _top, _p, t) = fixture();
    let router = EventRouter::new(editor.root());
    router.attach(&mut editor);
    let count = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&count);
    router.subscribe(
        EventKind::TextChanged,
        Pattern::parse("p").unwrap(),
        move |_, _| {
            *sink.borrow_mut() += 1;
        },
    );

    editor.set_text_node(t, "edited").unwrap();
    assert_eq!(*count.borrow(), 1);
    // undo and redo mutate through the same primitives, so views keep up
    history.borrow_mut().undo(&mut editor);
    assert_eq!(*count.borrow(), 2);
    history.borrow_mut().redo(&mut editor);
    assert_eq!(*count.borrow(), 3);
}
