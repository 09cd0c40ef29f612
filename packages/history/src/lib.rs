//! # Undo/Redo History
//!
//! Generic engine for grouped, reversible commands replayed against a
//! target of type `T`. The crate knows nothing about documents or trees;
//! recorders in higher layers decide what a command is.
//!
//! ## Design
//!
//! - A linear list of entries plus a cursor; undo moves the cursor left,
//!   redo moves it right
//! - Recording while the cursor is not at the end discards the entries to
//!   its right (no redo branches)
//! - Groups nest; a group replays as one unit, members in reverse on undo
//! - An optional observer sees every replayed member, members before the
//!   group that contains them
//! - `undoing_or_redoing` is true for the whole dynamic extent of a replay
//!   so recorders can keep replayed commands from re-recording themselves
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history: History<MyTarget> = History::new();
//! history.start_group("rename");
//! history.record(Box::new(cmd_a));
//! history.record(Box::new(cmd_b));
//! history.end_group()?;
//! history.undo(&mut target); // replays cmd_b then cmd_a
//! ```

use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// A reversible command replayed against a target.
pub trait Command<T> {
    /// Reverse the effect of this command.
    fn undo(&mut self, target: &mut T);

    /// Apply the effect of this command again.
    fn redo(&mut self, target: &mut T);

    /// Short human-readable description, used for labels and logs.
    fn label(&self) -> &str;
}

/// History errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// `end_group` was called with no group open.
    #[error("no open undo group")]
    NoOpenGroup,
}

/// Phase of a replay, as seen by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayKind {
    Undo,
    Redo,
}

/// What the observer is told about each replayed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayEvent<'a> {
    pub kind: ReplayKind,
    pub label: &'a str,
    /// True for group entries; the group event follows its members.
    pub is_group: bool,
}

/// Clonable view of the replay state, for recorders.
#[derive(Debug, Clone)]
pub struct ReplayHandle(Rc<Cell<usize>>);

impl ReplayHandle {
    /// True while an undo or redo is replaying commands.
    pub fn is_replaying(&self) -> bool {
        self.0.get() > 0
    }
}

enum Entry<T> {
    Single(Box<dyn Command<T>>),
    Group(Group<T>),
}

impl<T> Entry<T> {
    fn label(&self) -> &str {
        match self {
            Entry::Single(cmd) => cmd.label(),
            Entry::Group(g) => &g.label,
        }
    }
}

struct Group<T> {
    label: String,
    members: Vec<Entry<T>>,
    end_hook: Option<Box<dyn FnOnce()>>,
}

/// Callback observing replayed entries.
pub type Observer = Box<dyn FnMut(ReplayEvent<'_>)>;

/// Linear undo/redo history with nested grouping.
pub struct History<T> {
    entries: Vec<Entry<T>>,
    /// Entries `..cursor` are undoable, `cursor..` redoable.
    cursor: usize,
    /// Stack of open groups, innermost last.
    open: Vec<Group<T>>,
    /// Maximum kept entries; 0 means unlimited.
    limit: usize,
    depth: Rc<Cell<usize>>,
    observer: Option<Observer>,
}

const DEFAULT_LIMIT: usize = 100;

impl<T> History<T> {
    /// History with the default limit of 100 entries.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// History keeping at most `limit` entries (0 = unlimited). The oldest
    /// entries are dropped first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            open: Vec::new(),
            limit,
            depth: Rc::new(Cell::new(0)),
            observer: None,
        }
    }

    /// Record a command at the cursor, or into the innermost open group.
    ///
    /// Recording during a replay is a recorder bug and is ignored; use
    /// [`History::replay_handle`] to suppress at the source.
    pub fn record(&mut self, cmd: Box<dyn Command<T>>) {
        if self.undoing_or_redoing() {
            debug_assert!(false, "record called during replay");
            return;
        }
        match self.open.last_mut() {
            Some(group) => group.members.push(Entry::Single(cmd)),
            None => self.commit(Entry::Single(cmd)),
        }
    }

    /// Open a group. Until the matching [`History::end_group`], recorded
    /// commands become members of this group.
    pub fn start_group(&mut self, label: impl Into<String>) {
        self.open.push(Group {
            label: label.into(),
            members: Vec::new(),
            end_hook: None,
        });
    }

    /// Like [`History::start_group`] with a hook that runs when the group
    /// is closed, by whichever path closes it.
    pub fn start_group_with_hook(&mut self, label: impl Into<String>, hook: Box<dyn FnOnce()>) {
        self.open.push(Group {
            label: label.into(),
            members: Vec::new(),
            end_hook: Some(hook),
        });
    }

    /// Close the innermost open group and record it into its parent group,
    /// or commit it at the cursor. Empty groups are discarded.
    pub fn end_group(&mut self) -> Result<(), HistoryError> {
        let mut group = self.open.pop().ok_or(HistoryError::NoOpenGroup)?;
        if let Some(hook) = group.end_hook.take() {
            hook();
        }
        if group.members.is_empty() {
            return Ok(());
        }
        match self.open.last_mut() {
            Some(outer) => outer.members.push(Entry::Group(group)),
            None => self.commit(Entry::Group(group)),
        }
        Ok(())
    }

    /// Close every open group, innermost first.
    pub fn end_all_groups(&mut self) {
        while !self.open.is_empty() {
            let _ = self.end_group();
        }
    }

    /// Undo the entry left of the cursor. Open groups are closed first.
    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self, target: &mut T) -> bool {
        self.end_all_groups();
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        let ix = self.cursor;
        debug!(label = self.entries[ix].label(), "undo");
        self.depth.set(self.depth.get() + 1);
        let History {
            entries, observer, ..
        } = self;
        replay(&mut entries[ix], target, observer, ReplayKind::Undo);
        self.depth.set(self.depth.get() - 1);
        true
    }

    /// Redo the entry right of the cursor. Open groups are closed first.
    /// Returns false when there is nothing to redo.
    pub fn redo(&mut self, target: &mut T) -> bool {
        self.end_all_groups();
        if self.cursor >= self.entries.len() {
            return false;
        }
        let ix = self.cursor;
        self.cursor += 1;
        debug!(label = self.entries[ix].label(), "redo");
        self.depth.set(self.depth.get() + 1);
        let History {
            entries, observer, ..
        } = self;
        replay(&mut entries[ix], target, observer, ReplayKind::Redo);
        self.depth.set(self.depth.get() - 1);
        true
    }

    /// Whether [`History::undo`] would replay something, counting members
    /// of still-open groups.
    pub fn can_undo(&self) -> bool {
        self.cursor > 0 || self.open.iter().any(|g| !g.members.is_empty())
    }

    /// Whether [`History::redo`] would replay something.
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// True while a replay is in progress, including inside callbacks
    /// triggered by replayed commands.
    pub fn undoing_or_redoing(&self) -> bool {
        self.depth.get() > 0
    }

    /// A clonable handle answering [`History::undoing_or_redoing`] without
    /// borrowing the history. Recorders hold one so they can check the
    /// replay state from inside change callbacks while the history itself
    /// is mutably borrowed by the replay.
    pub fn replay_handle(&self) -> ReplayHandle {
        ReplayHandle(Rc::clone(&self.depth))
    }

    /// Observer called after each replayed member and each replayed group.
    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = Some(observer);
    }

    /// Label of the entry the next undo would replay.
    pub fn undo_label(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|ix| self.entries.get(ix))
            .map(Entry::label)
    }

    /// Label of the entry the next redo would replay.
    pub fn redo_label(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(Entry::label)
    }

    /// Number of undoable entries.
    pub fn undo_levels(&self) -> usize {
        self.cursor
    }

    /// Number of redoable entries.
    pub fn redo_levels(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Drop all entries and open groups.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.open.clear();
    }

    fn commit(&mut self, entry: Entry<T>) {
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        self.cursor = self.entries.len();
        if self.limit > 0 && self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
            self.cursor -= overflow;
        }
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn replay<T>(entry: &mut Entry<T>, target: &mut T, observer: &mut Option<Observer>, kind: ReplayKind) {
    match entry {
        Entry::Single(cmd) => {
            match kind {
                ReplayKind::Undo => cmd.undo(target),
                ReplayKind::Redo => cmd.redo(target),
            }
            notify(observer, kind, cmd.label(), false);
        }
        Entry::Group(group) => {
            match kind {
                ReplayKind::Undo => {
                    for member in group.members.iter_mut().rev() {
                        replay(member, target, observer, kind);
                    }
                }
                ReplayKind::Redo => {
                    for member in group.members.iter_mut() {
                        replay(member, target, observer, kind);
                    }
                }
            }
            notify(observer, kind, &group.label, true);
        }
    }
}

fn notify(observer: &mut Option<Observer>, kind: ReplayKind, label: &str, is_group: bool) {
    if let Some(obs) = observer {
        obs(ReplayEvent {
            kind,
            label,
            is_group,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add {
        n: i64,
        label: String,
    }

    impl Add {
        fn boxed(n: i64, label: &str) -> Box<dyn Command<i64>> {
            Box::new(Add {
                n,
                label: label.to_string(),
            })
        }
    }

    impl Command<i64> for Add {
        fn undo(&mut self, target: &mut i64) {
            *target -= self.n;
        }
        fn redo(&mut self, target: &mut i64) {
            *target += self.n;
        }
        fn label(&self) -> &str {
            &self.label
        }
    }

    #[test]
    fn test_record_undo_redo() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        history.record(Add::boxed(1, "one"));
        history.record(Add::boxed(10, "ten"));

        assert!(history.can_undo());
        assert_eq!(history.undo_label(), Some("ten"));

        assert!(history.undo(&mut target));
        assert_eq!(target, -10);
        assert!(history.can_redo());
        assert_eq!(history.redo_label(), Some("ten"));

        assert!(history.undo(&mut target));
        assert_eq!(target, -11);
        assert!(!history.undo(&mut target));

        assert!(history.redo(&mut target));
        assert!(history.redo(&mut target));
        assert_eq!(target, 0);
        assert!(!history.redo(&mut target));
    }

    #[test]
    fn test_recording_truncates_redo() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        history.record(Add::boxed(1, "a"));
        history.record(Add::boxed(2, "b"));
        history.undo(&mut target);

        assert_eq!(history.redo_levels(), 1);
        history.record(Add::boxed(4, "c"));
        assert_eq!(history.redo_levels(), 0);
        assert_eq!(history.undo_levels(), 2);

        // b is gone for good
        history.undo(&mut target);
        history.undo(&mut target);
        assert_eq!(target, -7);
    }

    #[test]
    fn test_groups_replay_as_one() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        history.record(Add::boxed(100, "outside"));
        history.start_group("pair");
        history.record(Add::boxed(1, "a"));
        history.record(Add::boxed(2, "b"));
        history.end_group().unwrap();

        assert_eq!(history.undo_levels(), 2);
        history.undo(&mut target);
        assert_eq!(target, -3);
        history.redo(&mut target);
        assert_eq!(target, 0);
    }

    #[test]
    fn test_nested_groups() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        history.start_group("outer");
        history.record(Add::boxed(1, "a"));
        history.start_group("inner");
        history.record(Add::boxed(2, "b"));
        history.end_group().unwrap();
        history.record(Add::boxed(4, "c"));
        history.end_group().unwrap();

        assert_eq!(history.undo_levels(), 1);
        history.undo(&mut target);
        assert_eq!(target, -7);
    }

    #[test]
    fn test_observer_sees_members_before_their_group() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        let log = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        history.set_observer(Box::new(move |ev| {
            sink.borrow_mut()
                .push(format!("{:?} {} group={}", ev.kind, ev.label, ev.is_group));
        }));

        history.start_group("outer");
        history.record(Add::boxed(1, "a"));
        history.start_group("inner");
        history.record(Add::boxed(2, "b"));
        history.end_group().unwrap();
        history.end_group().unwrap();

        history.undo(&mut target);
        assert_eq!(
            *log.borrow(),
            vec![
                "Undo b group=false",
                "Undo inner group=true",
                "Undo a group=false",
                "Undo outer group=true",
            ]
        );

        log.borrow_mut().clear();
        history.redo(&mut target);
        assert_eq!(
            *log.borrow(),
            vec![
                "Redo a group=false",
                "Redo b group=false",
                "Redo inner group=true",
                "Redo outer group=true",
            ]
        );
    }

    #[test]
    fn test_undo_closes_open_groups_first() {
        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        history.start_group("open");
        history.record(Add::boxed(5, "a"));
        assert!(history.can_undo());

        history.undo(&mut target);
        assert_eq!(target, -5);
        assert!(history.open.is_empty());
    }

    #[test]
    fn test_end_group_errors_and_hooks() {
        let mut history: History<i64> = History::new();
        assert_eq!(history.end_group(), Err(HistoryError::NoOpenGroup));

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        history.start_group_with_hook("h", Box::new(move || flag.set(true)));
        history.end_group().unwrap();
        assert!(fired.get());
        // empty group left nothing behind
        assert_eq!(history.undo_levels(), 0);
    }

    #[test]
    fn test_replay_handle_tracks_replay_extent() {
        struct Probe {
            handle: ReplayHandle,
            seen: Rc<Cell<bool>>,
        }
        impl Command<i64> for Probe {
            fn undo(&mut self, _: &mut i64) {
                self.seen.set(self.handle.is_replaying());
            }
            fn redo(&mut self, _: &mut i64) {
                self.seen.set(self.handle.is_replaying());
            }
            fn label(&self) -> &str {
                "probe"
            }
        }

        let mut target = 0i64;
        let mut history: History<i64> = History::new();
        let handle = history.replay_handle();
        assert!(!handle.is_replaying());

        let seen = Rc::new(Cell::new(false));
        history.record(Box::new(Probe {
            handle: history.replay_handle(),
            seen: Rc::clone(&seen),
        }));
        history.undo(&mut target);
        assert!(seen.get());
        assert!(!handle.is_replaying());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut target = 0i64;
        let mut history: History<i64> = History::with_limit(2);
        for i in 0..3 {
            history.record(Add::boxed(1 << i, &format!("e{i}")));
        }
        assert_eq!(history.undo_levels(), 2);
        history.undo(&mut target);
        history.undo(&mut target);
        assert!(!history.undo(&mut target));
        // only the last two entries replayed
        assert_eq!(target, -6);
    }
}
