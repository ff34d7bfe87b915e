//! Buffer stack item implementation for the Neo Virtual Machine.
//!
//! A buffer is mutable, so unlike a byte string it has identity: two pushes of
//! the same buffer are one live item. It holds no children.

use crate::error::{VmError, VmResult};
use crate::reference_counter::ItemId;
use crate::stack_item::next_stack_item_id;
use crate::stack_item::stack_item_type::StackItemType;
use parking_lot::Mutex;
use std::sync::Arc;

/// Represents a mutable byte buffer in the VM.
#[derive(Debug, Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

#[derive(Debug)]
struct BufferInner {
    id: ItemId,
    data: Mutex<Vec<u8>>,
}

impl Buffer {
    /// Creates a buffer holding a copy of `data`.
    pub fn new<T: Into<Vec<u8>>>(data: T) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                id: next_stack_item_id(),
                data: Mutex::new(data.into()),
            }),
        }
    }

    /// Creates a zero-filled buffer of the given size.
    pub fn with_size(size: usize) -> Self {
        Self::new(vec![0u8; size])
    }

    #[must_use]
    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    #[must_use]
    pub const fn stack_item_type(&self) -> StackItemType {
        StackItemType::Buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.lock().is_empty()
    }

    /// Copy of the buffer contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.inner.data.lock().clone()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<u8> {
        self.inner.data.lock().get(index).copied()
    }

    pub fn set(&self, index: usize, value: u8) -> VmResult<()> {
        let mut data = self.inner.data.lock();
        let byte = data.get_mut(index).ok_or_else(|| {
            VmError::invalid_operation_msg(format!("Index out of range: {index}"))
        })?;
        *byte = value;
        Ok(())
    }
}
