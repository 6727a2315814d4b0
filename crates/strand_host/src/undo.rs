//! The host's single global undo stack

use strand_core::UndoFn;

/// One user-visible undo step
pub struct UndoStep {
    pub name: String,
    pub(crate) undo: UndoFn,
    pub(crate) redo: UndoFn,
}

/// Undo/redo history stack.
pub struct UndoStack {
    /// Steps that can be undone
    undo_stack: Vec<UndoStep>,
    /// Steps that can be redone
    redo_stack: Vec<UndoStep>,
    /// Maximum history size
    max_size: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoStack {
    /// Default maximum history size.
    pub const DEFAULT_MAX_SIZE: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Name of the step `undo` would revert
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|s| s.name.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|s| s.name.as_str())
    }

    /// Push a step whose forward action has already run
    pub fn push(&mut self, step: UndoStep) {
        self.undo_stack.push(step);
        self.redo_stack.clear();

        while self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    pub fn pop_undo(&mut self) -> Option<UndoStep> {
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<UndoStep> {
        self.redo_stack.pop()
    }

    /// Return a redone step to the undo stack without clearing redo
    pub fn push_to_undo(&mut self, step: UndoStep) {
        self.undo_stack.push(step);
    }

    pub fn push_to_redo(&mut self, step: UndoStep) {
        self.redo_stack.push(step);
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> UndoStep {
        UndoStep {
            name: name.to_string(),
            undo: Box::new(|| Ok(())),
            redo: Box::new(|| Ok(())),
        }
    }

    #[test]
    fn test_push_clears_redo() {
        let mut stack = UndoStack::new();
        stack.push(step("a"));
        let a = stack.pop_undo().unwrap();
        stack.push_to_redo(a);
        assert!(stack.can_redo());

        stack.push(step("b"));
        assert!(!stack.can_redo());
        assert_eq!(stack.undo_description(), Some("b"));
    }

    #[test]
    fn test_trims_to_capacity() {
        let mut stack = UndoStack::with_capacity(2);
        stack.push(step("a"));
        stack.push(step("b"));
        stack.push(step("c"));
        assert_eq!(stack.undo_count(), 2);
        assert_eq!(stack.pop_undo().map(|s| s.name), Some("c".to_string()));
        assert_eq!(stack.pop_undo().map(|s| s.name), Some("b".to_string()));
    }
}
