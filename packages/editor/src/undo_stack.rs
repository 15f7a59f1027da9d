//! # Undo/Redo Log
//!
//! Time-windowed transaction log of paired do/undo closures.
//!
//! ## Design
//!
//! - `apply_do_undo` runs `do` immediately and records the pair
//! - Actions landing within the grouping window of the previous one join its
//!   group; undo/redo always move whole groups
//! - Any new recorded action clears the redo stack
//! - A live [`DisableUndoScope`] guard turns recording off (depth counted)
//! - Starting a recorded action while another is running is reported as
//!   [`UndoError::Reentrant`]; the nested mutation is still applied but never
//!   recorded
//!
//! ## Example
//!
//! ```rust,ignore
//! let log = UndoRedoLog::new();
//! let mut value = 0;
//! log.apply_do_undo(&mut value, |v| *v = 5, |v| *v = 0, "Set value")?;
//! log.undo(&mut value);
//! assert_eq!(value, 0);
//! ```

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_GROUPING: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UndoError {
    #[error("'{description}' was started while another undoable action was running")]
    Reentrant { description: String },
}

/// Time source for grouping decisions.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock; clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

type ActionFn<T> = Box<dyn Fn(&mut T)>;

pub struct UndoRedoAction<T> {
    do_action: ActionFn<T>,
    undo_action: ActionFn<T>,
    pub description: String,
}

/// Actions undone and redone together.
pub struct UndoRedoGroup<T> {
    id: u64,
    actions: Vec<UndoRedoAction<T>>,
    last_action_time: Instant,
}

impl<T> UndoRedoGroup<T> {
    /// Distinct action descriptions joined with `,`.
    pub fn description(&self) -> String {
        let mut seen: Vec<&str> = Vec::new();
        for action in &self.actions {
            if !seen.contains(&action.description.as_str()) {
                seen.push(&action.description);
            }
        }
        seen.join(",")
    }

    fn marker(&self) -> SavePoint {
        SavePoint {
            group: self.id,
            actions: self.actions.len(),
        }
    }
}

/// Identity of the undo-stack top at save time. The action count makes a
/// merge into the saved group count as a modification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SavePoint {
    group: u64,
    actions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HistoryKind {
    Undo,
    Redo,
}

/// One row of the history list, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub description: String,
    pub kind: HistoryKind,
    pub is_save_point: bool,
    pub is_current: bool,
}

/// RAII guard returned by [`UndoRedoLog::disable_undo_scope`]. Recording
/// stays off until every live guard is dropped.
#[must_use = "recording resumes as soon as the scope is dropped"]
pub struct DisableUndoScope {
    depth: Rc<Cell<usize>>,
}

impl Drop for DisableUndoScope {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

struct ApplyingGuard<'a>(&'a Cell<bool>);

impl<'a> ApplyingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ApplyingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Undo/redo log for a target of type `T`.
///
/// Methods take `&self` so closures running inside the log can reach it
/// again; that path is what reentrancy detection guards.
pub struct UndoRedoLog<T> {
    undo_stack: RefCell<Vec<UndoRedoGroup<T>>>,
    redo_stack: RefCell<Vec<UndoRedoGroup<T>>>,
    grouping: Duration,
    /// Maximum number of groups kept (0 = unlimited)
    max_levels: usize,
    clock: Box<dyn Clock>,
    disabled: Rc<Cell<usize>>,
    applying: Cell<bool>,
    reentered: Cell<bool>,
    save_point: Cell<Option<SavePoint>>,
    next_group_id: Cell<u64>,
}

impl<T> UndoRedoLog<T> {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemClock))
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            undo_stack: RefCell::new(Vec::new()),
            redo_stack: RefCell::new(Vec::new()),
            grouping: DEFAULT_GROUPING,
            max_levels: 0,
            clock,
            disabled: Rc::new(Cell::new(0)),
            applying: Cell::new(false),
            reentered: Cell::new(false),
            save_point: Cell::new(None),
            next_group_id: Cell::new(0),
        }
    }

    pub fn with_grouping(mut self, grouping: Duration) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn grouping(&self) -> Duration {
        self.grouping
    }

    /// Run `do_action` and record it with its inverse.
    pub fn apply_do_undo(
        &self,
        target: &mut T,
        do_action: impl Fn(&mut T) + 'static,
        undo_action: impl Fn(&mut T) + 'static,
        description: impl Into<String>,
    ) -> Result<(), UndoError> {
        self.try_apply_do_undo(target, do_action, undo_action, |_| Ok(()), description)
    }

    /// Like [`apply_do_undo`](Self::apply_do_undo), but `check` runs after
    /// `do_action`. When it fails, `undo_action` restores `target` and
    /// nothing is recorded.
    pub fn try_apply_do_undo<E: From<UndoError>>(
        &self,
        target: &mut T,
        do_action: impl Fn(&mut T) + 'static,
        undo_action: impl Fn(&mut T) + 'static,
        check: impl FnOnce(&mut T) -> Result<(), E>,
        description: impl Into<String>,
    ) -> Result<(), E> {
        let description = description.into();

        if self.is_undo_disabled() {
            do_action(target);
            if let Err(err) = check(target) {
                undo_action(target);
                return Err(err);
            }
            return Ok(());
        }

        if self.applying.get() {
            error!(description = %description, "undoable action started inside another");
            do_action(target);
            self.reentered.set(true);
            return Err(UndoError::Reentrant { description }.into());
        }

        self.reentered.set(false);
        let checked = {
            let _applying = ApplyingGuard::enter(&self.applying);
            do_action(target);
            check(target)
        };
        let reentered = self.reentered.replace(false);

        if let Err(err) = checked {
            warn!(description = %description, "action rolled back");
            undo_action(target);
            return Err(err);
        }

        self.record(UndoRedoAction {
            do_action: Box::new(do_action),
            undo_action: Box::new(undo_action),
            description: description.clone(),
        });

        if reentered {
            Err(UndoError::Reentrant { description }.into())
        } else {
            Ok(())
        }
    }

    fn record(&self, action: UndoRedoAction<T>) {
        let now = self.clock.now();
        {
            let mut undo_stack = self.undo_stack.borrow_mut();
            let within_window = undo_stack.last().is_some_and(|group| {
                now.saturating_duration_since(group.last_action_time) <= self.grouping
            });

            match undo_stack.last_mut() {
                Some(group) if within_window => {
                    debug!(
                        group = group.id,
                        description = %action.description,
                        "action joined group"
                    );
                    group.actions.push(action);
                    group.last_action_time = now;
                }
                _ => {
                    let id = self.next_group_id.get();
                    self.next_group_id.set(id + 1);
                    undo_stack.push(UndoRedoGroup {
                        id,
                        actions: vec![action],
                        last_action_time: now,
                    });
                    if self.max_levels > 0 && undo_stack.len() > self.max_levels {
                        undo_stack.remove(0);
                    }
                }
            }
        }
        self.redo_stack.borrow_mut().clear();
    }

    /// Undo the most recent group. Returns false when there is nothing to undo.
    pub fn undo(&self, target: &mut T) -> bool {
        let group = match self.undo_stack.borrow_mut().pop() {
            Some(group) => group,
            None => return false,
        };
        {
            let _applying = ApplyingGuard::enter(&self.applying);
            for action in group.actions.iter().rev() {
                (action.undo_action)(target);
            }
        }
        debug!(group = group.id, description = %group.description(), "undo");
        self.redo_stack.borrow_mut().push(group);
        true
    }

    /// Redo the most recently undone group.
    pub fn redo(&self, target: &mut T) -> bool {
        let group = match self.redo_stack.borrow_mut().pop() {
            Some(group) => group,
            None => return false,
        };
        {
            let _applying = ApplyingGuard::enter(&self.applying);
            for action in &group.actions {
                (action.do_action)(target);
            }
        }
        debug!(group = group.id, description = %group.description(), "redo");
        self.undo_stack.borrow_mut().push(group);
        true
    }

    /// Undo up to `count` groups, returning how many were undone.
    pub fn undo_n(&self, target: &mut T, count: usize) -> usize {
        (0..count).take_while(|_| self.undo(target)).count()
    }

    pub fn redo_n(&self, target: &mut T, count: usize) -> usize {
        (0..count).take_while(|_| self.redo(target)).count()
    }

    pub fn disable_undo_scope(&self) -> DisableUndoScope {
        self.disabled.set(self.disabled.get() + 1);
        DisableUndoScope {
            depth: Rc::clone(&self.disabled),
        }
    }

    pub fn is_undo_disabled(&self) -> bool {
        self.disabled.get() > 0
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.borrow().is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.borrow().is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.borrow().len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.borrow().len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.borrow().last().map(UndoRedoGroup::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.borrow().last().map(UndoRedoGroup::description)
    }

    pub fn mark_save_point(&self) {
        let top = self.undo_stack.borrow().last().map(UndoRedoGroup::marker);
        self.save_point.set(top);
    }

    pub fn is_modified(&self) -> bool {
        let top = self.undo_stack.borrow().last().map(UndoRedoGroup::marker);
        top != self.save_point.get()
    }

    /// Undo groups oldest first, then redo groups in the order they would be
    /// redone.
    pub fn history(&self) -> Vec<HistoryEntry> {
        let save_point = self.save_point.get();
        let undo_stack = self.undo_stack.borrow();
        let redo_stack = self.redo_stack.borrow();
        let current = undo_stack.last().map(|group| group.id);

        let undo = undo_stack.iter().map(|group| HistoryEntry {
            description: group.description(),
            kind: HistoryKind::Undo,
            is_save_point: save_point == Some(group.marker()),
            is_current: current == Some(group.id),
        });
        let redo = redo_stack.iter().rev().map(|group| HistoryEntry {
            description: group.description(),
            kind: HistoryKind::Redo,
            is_save_point: save_point == Some(group.marker()),
            is_current: false,
        });
        undo.chain(redo).collect()
    }

    /// Clear all undo/redo history. A save point taken on a discarded group
    /// can no longer be reached, so the target then reads as modified.
    pub fn clear(&self) {
        self.undo_stack.borrow_mut().clear();
        self.redo_stack.borrow_mut().clear();
    }
}

impl<T> Default for UndoRedoLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for UndoRedoLog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoRedoLog")
            .field("undo_levels", &self.undo_levels())
            .field("redo_levels", &self.redo_levels())
            .field("grouping", &self.grouping)
            .field("disabled", &self.disabled.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_clock<T>() -> (UndoRedoLog<T>, ManualClock) {
        let clock = ManualClock::new();
        (UndoRedoLog::with_clock(Box::new(clock.clone())), clock)
    }

    fn push(log: &UndoRedoLog<Vec<i32>>, target: &mut Vec<i32>, value: i32) {
        log.apply_do_undo(
            target,
            move |v: &mut Vec<i32>| v.push(value),
            |v: &mut Vec<i32>| {
                v.pop();
            },
            format!("Push {}", value),
        )
        .unwrap();
    }

    #[test]
    fn test_log_creation() {
        let log: UndoRedoLog<Vec<i32>> = UndoRedoLog::new();
        assert_eq!(log.undo_levels(), 0);
        assert!(!log.can_undo());
        assert!(!log.can_redo());
        assert!(!log.is_modified());
    }

    #[test]
    fn test_actions_within_window_are_grouped() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        push(&log, &mut target, 1);
        clock.advance(Duration::from_millis(400));
        push(&log, &mut target, 2);

        assert_eq!(log.undo_levels(), 1);
        assert_eq!(log.undo_description().as_deref(), Some("Push 1,Push 2"));

        log.undo(&mut target);
        assert!(target.is_empty());
    }

    #[test]
    fn test_actions_outside_window_are_separate() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        push(&log, &mut target, 1);
        clock.advance(Duration::from_millis(600));
        push(&log, &mut target, 2);

        assert_eq!(log.undo_levels(), 2);
        log.undo(&mut target);
        assert_eq!(target, vec![1]);
    }

    #[test]
    fn test_group_window_is_measured_from_last_action() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        for value in 0..4 {
            push(&log, &mut target, value);
            clock.advance(Duration::from_millis(300));
        }
        assert_eq!(log.undo_levels(), 1);
    }

    #[test]
    fn test_duplicate_descriptions_are_collapsed() {
        let (log, _clock) = log_with_clock();
        let mut target = 0;
        for _ in 0..3 {
            log.apply_do_undo(&mut target, |v| *v += 1, |v| *v -= 1, "Increment")
                .unwrap();
        }
        assert_eq!(log.undo_description().as_deref(), Some("Increment"));
    }

    #[test]
    fn test_new_action_clears_redo() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        push(&log, &mut target, 1);
        log.undo(&mut target);
        assert!(log.can_redo());

        clock.advance(Duration::from_secs(1));
        push(&log, &mut target, 2);
        assert!(!log.can_redo());
    }

    #[test]
    fn test_undo_redo_counts() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();
        for value in 0..5 {
            push(&log, &mut target, value);
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(log.undo_n(&mut target, 3), 3);
        assert_eq!(target, vec![0, 1]);
        assert_eq!(log.redo_n(&mut target, 10), 3);
        assert_eq!(target, vec![0, 1, 2, 3, 4]);
        assert!(!log.redo(&mut target));
    }

    #[test]
    fn test_disable_scope_suppresses_recording() {
        let (log, _clock) = log_with_clock();
        let mut target = Vec::new();

        {
            let _outer = log.disable_undo_scope();
            {
                let _inner = log.disable_undo_scope();
                push(&log, &mut target, 1);
            }
            assert!(log.is_undo_disabled());
            push(&log, &mut target, 2);
        }
        assert!(!log.is_undo_disabled());
        assert_eq!(target, vec![1, 2]);
        assert_eq!(log.undo_levels(), 0);
    }

    fn push_checked(
        log: &UndoRedoLog<Vec<i32>>,
        target: &mut Vec<i32>,
        value: i32,
    ) -> Result<(), UndoError> {
        log.try_apply_do_undo(
            target,
            move |v: &mut Vec<i32>| v.push(value),
            |v: &mut Vec<i32>| {
                v.pop();
            },
            |v: &mut Vec<i32>| match v.last() {
                Some(last) if *last < 0 => Err(UndoError::Reentrant {
                    description: "negative".to_string(),
                }),
                _ => Ok(()),
            },
            format!("Push {}", value),
        )
    }

    #[test]
    fn test_failed_check_rolls_back_without_recording() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        push_checked(&log, &mut target, 1).unwrap();
        log.undo(&mut target);
        assert!(log.can_redo());

        clock.advance(Duration::from_secs(1));
        assert!(push_checked(&log, &mut target, -1).is_err());
        assert!(target.is_empty());
        assert_eq!(log.undo_levels(), 0);
        assert!(log.can_redo(), "a rejected action leaves redo alone");

        let _disabled = log.disable_undo_scope();
        assert!(push_checked(&log, &mut target, -2).is_err());
        assert!(target.is_empty());
    }

    #[test]
    fn test_save_point_tracks_modification() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();

        push(&log, &mut target, 1);
        assert!(log.is_modified());
        log.mark_save_point();
        assert!(!log.is_modified());

        // Joining the saved group still counts as a change.
        push(&log, &mut target, 2);
        assert!(log.is_modified());

        clock.advance(Duration::from_secs(1));
        log.mark_save_point();
        push(&log, &mut target, 3);
        assert!(log.is_modified());
        log.undo(&mut target);
        assert!(!log.is_modified());
        log.redo(&mut target);
        assert!(log.is_modified());
    }

    #[test]
    fn test_max_levels_enforced() {
        let (log, clock) = log_with_clock();
        let log = log.with_max_levels(2);
        let mut target = Vec::new();
        for value in 0..3 {
            push(&log, &mut target, value);
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(log.undo_levels(), 2);
        assert_eq!(log.undo_n(&mut target, 5), 2);
        assert_eq!(target, vec![0]);
    }

    #[test]
    fn test_history_entries() {
        let (log, clock) = log_with_clock();
        let mut target = Vec::new();
        for value in 0..3 {
            push(&log, &mut target, value);
            clock.advance(Duration::from_secs(1));
        }
        log.undo(&mut target);
        log.mark_save_point();

        let history = log.history();
        let descriptions: Vec<&str> = history.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Push 0", "Push 1", "Push 2"]);
        assert_eq!(history[2].kind, HistoryKind::Redo);
        assert!(history[1].is_current);
        assert!(history[1].is_save_point);
        assert!(!history[0].is_current);
    }

    struct Host {
        log: Rc<UndoRedoLog<Host>>,
        value: i32,
        nested: Option<Result<(), UndoError>>,
    }

    #[test]
    fn test_reentrant_apply_is_reported() {
        let log = Rc::new(UndoRedoLog::new());
        let mut host = Host {
            log: Rc::clone(&log),
            value: 0,
            nested: None,
        };

        let result = log.apply_do_undo(
            &mut host,
            |h: &mut Host| {
                h.value += 1;
                let log = Rc::clone(&h.log);
                let nested = log.apply_do_undo(h, |h| h.value += 10, |h| h.value -= 10, "Inner");
                h.nested = Some(nested);
            },
            |h: &mut Host| h.value -= 1,
            "Outer",
        );

        assert!(matches!(result, Err(UndoError::Reentrant { .. })));
        assert!(matches!(host.nested, Some(Err(UndoError::Reentrant { .. }))));
        assert_eq!(host.value, 11);
        assert_eq!(log.undo_levels(), 1);
        assert_eq!(log.undo_description().as_deref(), Some("Outer"));
    }
}
