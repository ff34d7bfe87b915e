//! Slot storage for local variables, arguments and static fields.
//!
//! A slot owns a fixed-size collection of [`StackItem`]s. Every element is a
//! root, so the slot keeps the VM reference counter in sync whenever its
//! content changes.

use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Stores local variables, arguments or static fields for a single execution context.
#[derive(Debug)]
pub struct Slot {
    items: Vec<StackItem>,
    reference_counter: ReferenceCounter,
}

impl Slot {
    /// Creates a slot populated with the provided items.
    pub fn new(items: Vec<StackItem>, reference_counter: ReferenceCounter) -> VmResult<Self> {
        let mut slot = Self {
            items: Vec::with_capacity(items.len()),
            reference_counter,
        };

        for item in items {
            slot.push_internal(item)?;
        }

        Ok(slot)
    }

    /// Creates a slot of the requested size initialised with `StackItem::null()`.
    pub fn with_count(count: usize, reference_counter: ReferenceCounter) -> VmResult<Self> {
        Self::new(vec![StackItem::null(); count], reference_counter)
    }

    /// Returns the number of elements stored in the slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when the slot does not contain any items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `index`.
    pub fn get(&self, index: usize) -> VmResult<&StackItem> {
        self.items
            .get(index)
            .ok_or_else(|| self.index_out_of_range(index))
    }

    /// Replaces the item stored at `index`, updating reference counters accordingly.
    ///
    /// The new value is referenced before the old one is released, so storing an
    /// item over itself never frees it.
    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index >= self.items.len() {
            return Err(self.index_out_of_range(index));
        }

        self.reference_counter.add_stack_reference(&item)?;
        let old_value = std::mem::replace(&mut self.items[index], item);
        self.reference_counter.remove_stack_reference(&old_value)
    }

    /// Releases every stack reference held by this slot and empties it.
    ///
    /// Every item is released even when one release fails; the first error is returned.
    pub fn clear_references(&mut self) -> VmResult<()> {
        let mut result = Ok(());
        for item in std::mem::take(&mut self.items) {
            let released = self.reference_counter.remove_stack_reference(&item);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    /// Returns an iterator over the contained items.
    pub fn iter(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter()
    }

    fn push_internal(&mut self, item: StackItem) -> VmResult<()> {
        self.reference_counter.add_stack_reference(&item)?;
        self.items.push(item);
        Ok(())
    }

    fn index_out_of_range(&self, index: usize) -> VmError {
        VmError::invalid_operation_msg(format!(
            "Index {index} out of range for slot of size {}",
            self.items.len()
        ))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let _ = self.clear_references();
    }
}
