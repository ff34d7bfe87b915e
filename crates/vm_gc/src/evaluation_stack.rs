//! Evaluation stack module for the Neo Virtual Machine.
//!
//! Every slot of the stack is a root: pushing an item adds a stack reference to
//! it and taking an item off the stack removes one.

use crate::error::{VmError, VmResult};
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;

/// Represents the evaluation stack in the VM.
#[derive(Debug)]
pub struct EvaluationStack {
    /// The underlying stack storage
    stack: Vec<StackItem>,

    /// The reference counter for managing object lifetimes
    reference_counter: ReferenceCounter,
}

impl EvaluationStack {
    /// Creates a new evaluation stack with the specified reference counter.
    #[must_use]
    pub fn new(reference_counter: ReferenceCounter) -> Self {
        Self {
            stack: Vec::new(),
            reference_counter,
        }
    }

    /// Returns the reference counter for this evaluation stack.
    #[must_use]
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Pushes an item onto the stack.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.reference_counter.add_stack_reference(&item)?;
        self.stack.push(item);
        Ok(())
    }

    /// Pops an item from the stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        let item = self.stack.pop().ok_or_else(|| {
            VmError::invariant_violation_msg("pop from an empty evaluation stack")
        })?;
        self.reference_counter.remove_stack_reference(&item)?;
        Ok(item)
    }

    /// Returns the item `n` positions below the top of the stack.
    ///
    /// A negative `n` counts from the bottom of the stack instead.
    pub fn peek(&self, n: isize) -> VmResult<&StackItem> {
        let index = self.top_index(n)?;
        Ok(&self.stack[index])
    }

    /// Returns the number of items on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Returns true if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Removes the item `n` positions below the top of the stack.
    pub fn remove(&mut self, n: usize) -> VmResult<StackItem> {
        if n >= self.stack.len() {
            return Err(VmError::invalid_operation_msg(format!(
                "Remove index {n} out of range for stack of size {}",
                self.stack.len()
            )));
        }

        let item = self.stack.remove(self.stack.len() - 1 - n);
        self.reference_counter.remove_stack_reference(&item)?;
        Ok(item)
    }

    /// Inserts an item `n` positions below the top of the stack.
    pub fn insert(&mut self, n: usize, item: StackItem) -> VmResult<()> {
        if n > self.stack.len() {
            return Err(VmError::invalid_operation_msg("Insert index out of range"));
        }

        self.reference_counter.add_stack_reference(&item)?;
        let index = self.stack.len() - n;
        self.stack.insert(index, item);
        Ok(())
    }

    /// Reverses the order of n items at the top of the stack.
    pub fn reverse(&mut self, n: usize) -> VmResult<()> {
        if n > self.stack.len() {
            return Err(VmError::invalid_operation_msg("Reverse count out of range"));
        }

        if n <= 1 {
            return Ok(());
        }

        let start = self.stack.len() - n;
        self.stack[start..].reverse();
        Ok(())
    }

    /// Clears the stack, releasing every root it held.
    ///
    /// Every item is released even when one release fails; the first error is returned.
    pub fn clear(&mut self) -> VmResult<()> {
        let mut result = Ok(());
        for item in std::mem::take(&mut self.stack) {
            let released = self.reference_counter.remove_stack_reference(&item);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    /// Iterates from the bottom of the stack to the top.
    pub fn iter(&self) -> std::slice::Iter<'_, StackItem> {
        self.stack.iter()
    }

    fn top_index(&self, n: isize) -> VmResult<usize> {
        let len = self.stack.len() as isize;
        let n = if n < 0 { n + len } else { n };
        if n < 0 || n >= len {
            return Err(VmError::invalid_operation_msg(format!(
                "Peek index out of range for stack of size {len}"
            )));
        }
        Ok((len - 1 - n) as usize)
    }
}

impl Drop for EvaluationStack {
    fn drop(&mut self) {
        let _ = self.clear();
    }
}
