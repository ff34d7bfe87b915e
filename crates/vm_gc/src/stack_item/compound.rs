//! Ordered child storage shared by [`crate::stack_item::Array`] and
//! [`crate::stack_item::Struct`].
//!
//! Every mutation reports the exact child occurrences it adds or removes to the
//! owning [`ReferenceCounter`]. The storage lock is always released before the
//! counter is notified, because the counter may need to read this container
//! (for example when a container is appended to itself).

use crate::error::{VmError, VmResult};
use crate::reference_counter::{ItemId, ReferenceCounter};
use crate::stack_item::next_stack_item_id;
use crate::stack_item::stack_item::release_nested;
use crate::stack_item::StackItem;
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle to an ordered list of stack items with reference identity.
#[derive(Debug, Clone)]
pub struct CompoundList {
    inner: Arc<ListInner>,
}

#[derive(Debug)]
struct ListInner {
    /// Unique identifier mirroring reference equality semantics.
    id: ItemId,
    /// Reference counter shared with the VM.
    reference_counter: Option<ReferenceCounter>,
    state: Mutex<ListState>,
}

#[derive(Debug, Default)]
struct ListState {
    items: Vec<StackItem>,
    is_read_only: bool,
}

impl Drop for ListInner {
    fn drop(&mut self) {
        let items = std::mem::take(&mut self.state.get_mut().items);
        release_nested(items);
    }
}

impl CompoundList {
    /// Creates a list with the specified items.
    ///
    /// No reference is reported yet: the list enters the counter when it is first
    /// referenced, and its children are accounted at that moment.
    pub fn new(
        items: Vec<StackItem>,
        reference_counter: Option<ReferenceCounter>,
    ) -> VmResult<Self> {
        for item in &items {
            validate_compound_reference(reference_counter.as_ref(), item)?;
        }
        Ok(Self::from_parts(items, reference_counter))
    }

    /// Creates a list that reports to no reference counter.
    pub fn new_untracked(items: Vec<StackItem>) -> Self {
        Self::from_parts(items, None)
    }

    fn from_parts(items: Vec<StackItem>, reference_counter: Option<ReferenceCounter>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                id: next_stack_item_id(),
                reference_counter,
                state: Mutex::new(ListState {
                    items,
                    is_read_only: false,
                }),
            }),
        }
    }

    /// Returns the unique identifier of this list.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    /// Returns the reference counter associated with this list, if any.
    #[must_use]
    pub fn reference_counter(&self) -> Option<ReferenceCounter> {
        self.inner.reference_counter.clone()
    }

    /// Returns whether the list is marked as read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.state.lock().is_read_only
    }

    /// Sets the read-only flag.
    pub fn set_read_only(&self, read_only: bool) {
        self.inner.state.lock().is_read_only = read_only;
    }

    /// Snapshot of the items.
    #[must_use]
    pub fn items(&self) -> Vec<StackItem> {
        self.inner.state.lock().items.clone()
    }

    /// Gets the item at the specified index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<StackItem> {
        self.inner.state.lock().items.get(index).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    /// Appends an item.
    pub fn push(&self, item: StackItem) -> VmResult<()> {
        validate_compound_reference(self.inner.reference_counter.as_ref(), &item)?;
        {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            state.items.push(item.clone());
        }
        self.report_added(&item)
    }

    /// Replaces the item at the specified index.
    pub fn set(&self, index: usize, item: StackItem) -> VmResult<()> {
        validate_compound_reference(self.inner.reference_counter.as_ref(), &item)?;
        let previous = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            let slot = state
                .items
                .get_mut(index)
                .ok_or_else(|| index_out_of_range(index))?;
            std::mem::replace(slot, item.clone())
        };
        // Add before remove so an item replaced by itself is never released.
        self.report_added(&item)?;
        self.report_removed(&previous)
    }

    /// Inserts an item at the specified index.
    pub fn insert(&self, index: usize, item: StackItem) -> VmResult<()> {
        validate_compound_reference(self.inner.reference_counter.as_ref(), &item)?;
        {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            if index > state.items.len() {
                return Err(index_out_of_range(index));
            }
            state.items.insert(index, item.clone());
        }
        self.report_added(&item)
    }

    /// Removes and returns the item at the specified index.
    pub fn remove(&self, index: usize) -> VmResult<StackItem> {
        let removed = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            if index >= state.items.len() {
                return Err(index_out_of_range(index));
            }
            state.items.remove(index)
        };
        self.report_removed(&removed)?;
        Ok(removed)
    }

    /// Removes and returns the last item.
    pub fn pop(&self) -> VmResult<StackItem> {
        let removed = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            state
                .items
                .pop()
                .ok_or_else(|| VmError::invalid_operation_msg("Collection is empty"))?
        };
        self.report_removed(&removed)?;
        Ok(removed)
    }

    /// Removes all items, releasing one reference per occurrence.
    pub fn clear(&self) -> VmResult<()> {
        let removed = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            std::mem::take(&mut state.items)
        };
        for item in &removed {
            self.report_removed(item)?;
        }
        release_nested(removed);
        Ok(())
    }

    /// Reverses the order of items. Edge multiplicities are unaffected.
    pub fn reverse_items(&self) -> VmResult<()> {
        let mut state = self.inner.state.lock();
        ensure_mutable(state.is_read_only)?;
        state.items.reverse();
        Ok(())
    }

    pub(crate) fn take_items(&self) -> Vec<StackItem> {
        std::mem::take(&mut self.inner.state.lock().items)
    }

    pub(crate) fn into_exclusive_items(self) -> Vec<StackItem> {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => std::mem::take(&mut inner.state.get_mut().items),
            Err(_) => Vec::new(),
        }
    }

    fn report_added(&self, item: &StackItem) -> VmResult<()> {
        match &self.inner.reference_counter {
            Some(rc) => rc.add_reference(item, self.inner.id),
            None => Ok(()),
        }
    }

    fn report_removed(&self, item: &StackItem) -> VmResult<()> {
        match &self.inner.reference_counter {
            Some(rc) => rc.remove_reference(item, self.inner.id),
            None => Ok(()),
        }
    }
}

pub(crate) fn ensure_mutable(is_read_only: bool) -> VmResult<()> {
    if is_read_only {
        Err(VmError::invalid_operation_msg(
            "The collection is readonly, can not modify.",
        ))
    } else {
        Ok(())
    }
}

fn index_out_of_range(index: usize) -> VmError {
    VmError::invalid_operation_msg(format!("Index out of range: {index}"))
}

/// A container bound to a counter only accepts compound children bound to the same counter.
pub(crate) fn validate_compound_reference(
    owner: Option<&ReferenceCounter>,
    item: &StackItem,
) -> VmResult<()> {
    let Some(owner) = owner else {
        return Ok(());
    };
    if !item.is_compound() {
        return Ok(());
    }
    match item.reference_counter() {
        Some(child_rc) if child_rc.ptr_eq(owner) => Ok(()),
        _ => Err(VmError::invalid_operation_msg(format!(
            "Can not set a {:?} without a ReferenceCounter.",
            item.stack_item_type()
        ))),
    }
}
