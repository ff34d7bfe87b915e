//! Stack item module for the Neo Virtual Machine.
//!
//! This module provides the stack item types used in the Neo VM. Arrays, structs,
//! maps and buffers have identity; every other item is an immutable value.

pub mod array;
pub mod buffer;
pub mod compound;
pub mod map;
#[allow(clippy::module_inception)]
pub mod stack_item;
pub mod stack_item_type;
pub mod struct_item;

pub use array::Array;
pub use buffer::Buffer;
pub use compound::CompoundList;
pub use map::Map;
pub use stack_item::InteropInterface;
pub use stack_item::StackItem;
pub use stack_item_type::StackItemType;
pub use struct_item::Struct;

use crate::reference_counter::ItemId;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_STACK_ITEM_ID: AtomicUsize = AtomicUsize::new(1);

/// Allocates a process-unique identity for an item with reference semantics.
pub(crate) fn next_stack_item_id() -> ItemId {
    NEXT_STACK_ITEM_ID.fetch_add(1, Ordering::Relaxed)
}
