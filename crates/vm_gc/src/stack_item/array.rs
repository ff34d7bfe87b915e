//! Array stack item implementation for the Neo Virtual Machine.

use crate::error::VmResult;
use crate::reference_counter::ReferenceCounter;
use crate::stack_item::compound::CompoundList;
use crate::stack_item::stack_item_type::StackItemType;
use crate::stack_item::StackItem;
use std::ops::Deref;

/// Represents an array of stack items in the VM.
///
/// Duplicates and self references are allowed; `[x, x, x]` is a single edge to
/// `x` with multiplicity three as far as the reference counter is concerned.
#[derive(Debug, Clone)]
pub struct Array(CompoundList);

impl Array {
    /// Creates a new array with the specified items.
    pub fn new(
        items: Vec<StackItem>,
        reference_counter: Option<ReferenceCounter>,
    ) -> VmResult<Self> {
        CompoundList::new(items, reference_counter).map(Self)
    }

    /// Creates a new array without a reference counter.
    #[must_use]
    pub fn new_untracked(items: Vec<StackItem>) -> Self {
        Self(CompoundList::new_untracked(items))
    }

    /// Gets the type of the stack item.
    #[must_use]
    pub const fn stack_item_type(&self) -> StackItemType {
        StackItemType::Array
    }

    pub(crate) fn into_list(self) -> CompoundList {
        self.0
    }
}

impl Deref for Array {
    type Target = CompoundList;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for &Array {
    type Item = StackItem;
    type IntoIter = std::vec::IntoIter<StackItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_creation() {
        let items = vec![StackItem::from_int(1), StackItem::from_int(2)];
        let array = Array::new(items.clone(), None).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.items(), items);
        assert_eq!(array.stack_item_type(), StackItemType::Array);
    }

    #[test]
    fn test_array_iterates_snapshot() {
        let array = Array::new_untracked(vec![StackItem::from_int(1), StackItem::from_int(2)]);
        let values: Vec<i64> = (&array).into_iter().filter_map(|i| i.as_i64()).collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_array_can_contain_itself() {
        let array = Array::new_untracked(vec![]);
        array.push(StackItem::Array(array.clone())).unwrap();
        assert_eq!(array.get(0), Some(StackItem::Array(array.clone())));
        // Break the host-level cycle so the test does not leak.
        array.clear().unwrap();
    }
}
