//! Undo/redo stacks and batch accumulation.
//!
//! A history frame is the list of reverse ops restoring the state before one
//! local change (a single mutation, a batch, or everything recorded while
//! history was paused). Frames are replayed as UndoRedo ops.

use crate::constants::MAX_UNDO_FRAMES;
use crate::op::Op;
use crate::update::{StorageUpdate, merge_updates};

#[derive(Debug, Default)]
pub(crate) struct History {
    undo: Vec<Vec<Op>>,
    redo: Vec<Vec<Op>>,
    paused: Option<Vec<Op>>,
}

impl History {
    /// Records the reverse ops of a local change. While paused the ops are
    /// folded into the paused frame; they precede everything already there.
    pub(crate) fn record(&mut self, reverse: Vec<Op>) {
        if reverse.is_empty() {
            return;
        }
        match &mut self.paused {
            Some(frame) => {
                frame.splice(0..0, reverse);
            }
            None => self.push_undo(reverse),
        }
    }

    pub(crate) fn push_undo(&mut self, frame: Vec<Op>) {
        if frame.is_empty() {
            return;
        }
        if self.undo.len() >= MAX_UNDO_FRAMES {
            self.undo.remove(0);
        }
        self.undo.push(frame);
    }

    pub(crate) fn push_redo(&mut self, frame: Vec<Op>) {
        if !frame.is_empty() {
            self.redo.push(frame);
        }
    }

    /// Pops the newest undo frame. A paused frame is closed first so that it
    /// is the one undone.
    pub(crate) fn pop_undo(&mut self) -> Option<Vec<Op>> {
        self.resume();
        self.undo.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Vec<Op>> {
        self.redo.pop()
    }

    pub(crate) fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub(crate) fn pause(&mut self) {
        if self.paused.is_none() {
            self.paused = Some(Vec::new());
        }
    }

    pub(crate) fn resume(&mut self) {
        if let Some(frame) = self.paused.take() {
            self.push_undo(frame);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.undo.is_empty() || self.paused.as_ref().is_some_and(|frame| !frame.is_empty())
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

/// Everything produced by the local mutations of one open batch.
#[derive(Debug, Default)]
pub(crate) struct Batch {
    pub(crate) ops: Vec<Op>,
    pub(crate) reverse: Vec<Op>,
    pub(crate) updates: Vec<StorageUpdate>,
}

impl Batch {
    pub(crate) fn add(&mut self, ops: Vec<Op>, reverse: Vec<Op>, updates: Vec<StorageUpdate>) {
        self.ops.extend(ops);
        self.reverse.splice(0..0, reverse);
        for update in updates {
            merge_updates(&mut self.updates, update);
        }
    }
}
