//! Struct stack item implementation for the Neo Virtual Machine.
//!
//! A struct is an ordered container like an array; it differs only in copy
//! semantics, exposed through [`Struct::clone_struct`].

use crate::error::{VmError, VmResult};
use crate::execution_engine_limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::compound::CompoundList;
use crate::stack_item::stack_item_type::StackItemType;
use crate::stack_item::StackItem;
use std::collections::VecDeque;
use std::ops::Deref;

/// Represents a struct of stack items in the VM.
#[derive(Debug, Clone)]
pub struct Struct(CompoundList);

impl Struct {
    /// Creates a new struct with the specified items and reference counter.
    pub fn new(
        items: Vec<StackItem>,
        reference_counter: Option<ReferenceCounter>,
    ) -> VmResult<Self> {
        CompoundList::new(items, reference_counter).map(Self)
    }

    /// Creates a new struct without a reference counter.
    #[must_use]
    pub fn new_untracked(items: Vec<StackItem>) -> Self {
        Self(CompoundList::new_untracked(items))
    }

    /// Gets the type of the stack item.
    #[must_use]
    pub const fn stack_item_type(&self) -> StackItemType {
        StackItemType::Struct
    }

    /// Copies this struct and every struct nested in it; other compound children
    /// are shared. The copy is bounded by `max_live_items` so a struct that
    /// contains itself fails instead of looping.
    pub fn clone_struct(&self, limits: &ExecutionEngineLimits) -> VmResult<Struct> {
        let reference_counter = self.reference_counter();
        let mut remaining = limits.max_live_items.saturating_sub(1);
        let result = Struct::new(Vec::new(), reference_counter.clone())?;

        let mut queue = VecDeque::from([(result.clone(), self.clone())]);
        while let Some((target, source)) = queue.pop_front() {
            for item in source.items() {
                remaining = remaining
                    .checked_sub(1)
                    .ok_or_else(|| VmError::invalid_operation_msg("Beyond clone limits!"))?;
                match item {
                    StackItem::Struct(nested) => {
                        let copy = Struct::new(Vec::new(), reference_counter.clone())?;
                        target.push(StackItem::Struct(copy.clone()))?;
                        queue.push_back((copy, nested));
                    }
                    other => target.push(other)?,
                }
            }
        }

        Ok(result)
    }

    pub(crate) fn into_list(self) -> CompoundList {
        self.0
    }
}

impl Deref for Struct {
    type Target = CompoundList;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
