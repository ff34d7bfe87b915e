#![allow(clippy::mutable_key_type)]

//! Map stack item implementation for the Neo Virtual Machine.
//!
//! Keys are primitive leaves; both the key and the value of every entry are
//! reported to the reference counter.

use crate::error::{VmError, VmResult};
use crate::reference_counter::{ItemId, ReferenceCounter};
use crate::stack_item::compound::{ensure_mutable, validate_compound_reference};
use crate::stack_item::next_stack_item_id;
use crate::stack_item::stack_item::release_nested;
use crate::stack_item::stack_item_type::StackItemType;
use crate::stack_item::StackItem;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Maximum size in bytes of a map key.
pub const MAX_KEY_SIZE: usize = 64;

/// Represents an insertion-ordered map of stack items in the VM.
#[derive(Debug, Clone)]
pub struct Map {
    inner: Arc<MapInner>,
}

#[derive(Debug)]
struct MapInner {
    /// Unique identifier mirroring reference equality semantics.
    id: ItemId,
    /// Reference counter shared with the VM.
    reference_counter: Option<ReferenceCounter>,
    state: Mutex<MapState>,
}

#[derive(Debug, Default)]
struct MapState {
    entries: IndexMap<StackItem, StackItem>,
    is_read_only: bool,
}

impl Drop for MapInner {
    fn drop(&mut self) {
        let entries = std::mem::take(&mut self.state.get_mut().entries);
        release_nested(flatten(entries));
    }
}

impl Map {
    /// Creates an empty map.
    #[must_use]
    pub fn new(reference_counter: Option<ReferenceCounter>) -> Self {
        Self {
            inner: Arc::new(MapInner {
                id: next_stack_item_id(),
                reference_counter,
                state: Mutex::new(MapState::default()),
            }),
        }
    }

    /// Returns the unique identifier for this map (used for reference equality).
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    /// Returns the reference counter associated with this map, if any.
    #[must_use]
    pub fn reference_counter(&self) -> Option<ReferenceCounter> {
        self.inner.reference_counter.clone()
    }

    /// Gets the type of the stack item.
    #[must_use]
    pub const fn stack_item_type(&self) -> StackItemType {
        StackItemType::Map
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.state.lock().is_read_only
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.state.lock().is_read_only = read_only;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().entries.is_empty()
    }

    /// Gets the value for the specified key.
    pub fn get(&self, key: &StackItem) -> VmResult<Option<StackItem>> {
        validate_key(key)?;
        Ok(self.inner.state.lock().entries.get(key).cloned())
    }

    /// Returns true if the map contains the key.
    pub fn contains_key(&self, key: &StackItem) -> VmResult<bool> {
        validate_key(key)?;
        Ok(self.inner.state.lock().entries.contains_key(key))
    }

    /// Snapshot of the keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<StackItem> {
        self.inner.state.lock().entries.keys().cloned().collect()
    }

    /// Snapshot of the values in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<StackItem> {
        self.inner.state.lock().entries.values().cloned().collect()
    }

    /// Sets the value for the specified key, returning the replaced value.
    pub fn set(&self, key: StackItem, value: StackItem) -> VmResult<Option<StackItem>> {
        validate_key(&key)?;
        validate_compound_reference(self.inner.reference_counter.as_ref(), &value)?;
        let previous = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            state.entries.insert(key.clone(), value.clone())
        };

        if previous.is_none() {
            self.report_added(&key)?;
        }
        self.report_added(&value)?;
        if let Some(old_value) = &previous {
            self.report_removed(old_value)?;
        }
        Ok(previous)
    }

    /// Removes the entry for the specified key, returning its value.
    pub fn remove(&self, key: &StackItem) -> VmResult<Option<StackItem>> {
        validate_key(key)?;
        let removed = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            state.entries.shift_remove_entry(key)
        };

        match removed {
            Some((old_key, old_value)) => {
                self.report_removed(&old_key)?;
                self.report_removed(&old_value)?;
                Ok(Some(old_value))
            }
            None => Ok(None),
        }
    }

    /// Removes all entries.
    pub fn clear(&self) -> VmResult<()> {
        let removed = {
            let mut state = self.inner.state.lock();
            ensure_mutable(state.is_read_only)?;
            flatten(std::mem::take(&mut state.entries))
        };
        for item in &removed {
            self.report_removed(item)?;
        }
        release_nested(removed);
        Ok(())
    }

    pub(crate) fn sub_items(&self) -> Vec<StackItem> {
        let state = self.inner.state.lock();
        let mut items = Vec::with_capacity(state.entries.len() * 2);
        for (key, value) in &state.entries {
            items.push(key.clone());
            items.push(value.clone());
        }
        items
    }

    pub(crate) fn take_sub_items(&self) -> Vec<StackItem> {
        let entries = std::mem::take(&mut self.inner.state.lock().entries);
        flatten(entries)
    }

    pub(crate) fn into_exclusive_sub_items(self) -> Vec<StackItem> {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => flatten(std::mem::take(&mut inner.state.get_mut().entries)),
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

fn flatten(entries: IndexMap<StackItem, StackItem>) -> Vec<StackItem> {
    entries
        .into_iter()
        .flat_map(|(key, value)| [key, value])
        .collect()
}

fn validate_key(key: &StackItem) -> VmResult<()> {
    if !key.stack_item_type().is_primitive() {
        return Err(VmError::invalid_operation_msg(format!(
            "Key of type {:?} is not allowed in a Map.",
            key.stack_item_type()
        )));
    }
    if key.primitive_size() > MAX_KEY_SIZE {
        return Err(VmError::invalid_operation_msg(format!(
            "MaxKeySize exceed: {}",
            key.primitive_size()
        )));
    }
    Ok(())
}
