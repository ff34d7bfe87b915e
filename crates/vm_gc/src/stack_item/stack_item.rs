//! Stack item implementation for the Neo Virtual Machine.
//!
//! A [`StackItem`] is a node of the object graph the reference counter tracks.
//! Items with identity ([`Array`], [`Struct`], [`Map`], [`Buffer`]) are shared
//! handles: cloning one yields another handle to the same node. All other
//! variants are leaves with value semantics.

use crate::reference_counter::{ItemId, ReferenceCounter};
use crate::stack_item::stack_item_type::StackItemType;
use crate::stack_item::{Array, Buffer, Map, Struct};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A trait for interop interfaces that can be wrapped by a stack item.
///
/// Interop objects are opaque to the VM and are accounted as leaves.
pub trait InteropInterface: fmt::Debug + Send + Sync {
    /// Gets the type of the interop interface.
    fn interface_type(&self) -> &str;
}

/// Represents a value in the Neo VM.
#[derive(Debug, Clone)]
pub enum StackItem {
    /// Represents a null value.
    Null,

    /// Represents a boolean value.
    Boolean(bool),

    /// Represents an integer value.
    Integer(BigInt),

    /// Represents an immutable byte string.
    ByteString(Vec<u8>),

    /// Represents a mutable byte buffer.
    Buffer(Buffer),

    /// Represents an array of stack items.
    Array(Array),

    /// Represents a struct of stack items.
    Struct(Struct),

    /// Represents an ordered map from primitive keys to stack items.
    Map(Map),

    /// Represents a pointer to a position in a script.
    Pointer(usize),

    /// Represents an interop interface.
    InteropInterface(Arc<dyn InteropInterface>),
}

impl StackItem {
    /// The singleton Null value.
    pub fn null() -> Self {
        StackItem::Null
    }

    /// Creates a boolean stack item.
    pub fn from_bool(value: bool) -> Self {
        StackItem::Boolean(value)
    }

    /// Creates an integer stack item.
    pub fn from_int<T: Into<BigInt>>(value: T) -> Self {
        StackItem::Integer(value.into())
    }

    /// Creates a byte string stack item.
    pub fn from_byte_string<T: Into<Vec<u8>>>(value: T) -> Self {
        StackItem::ByteString(value.into())
    }

    /// Creates a pointer stack item.
    pub fn from_pointer(position: usize) -> Self {
        StackItem::Pointer(position)
    }

    /// Creates an interop interface stack item.
    pub fn from_interface<T: InteropInterface + 'static>(value: T) -> Self {
        StackItem::InteropInterface(Arc::new(value))
    }

    /// Returns the type of the stack item.
    pub fn stack_item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// Returns true if the stack item is null.
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Returns true for arrays, structs and maps.
    pub fn is_compound(&self) -> bool {
        self.stack_item_type().is_compound()
    }

    /// Returns the identity of items with reference semantics.
    ///
    /// Only these items get an entry in the reference counter; leaves are
    /// accounted per occurrence.
    pub fn tracked_id(&self) -> Option<ItemId> {
        match self {
            StackItem::Buffer(buffer) => Some(buffer.id()),
            StackItem::Array(array) => Some(array.id()),
            StackItem::Struct(structure) => Some(structure.id()),
            StackItem::Map(map) => Some(map.id()),
            _ => None,
        }
    }

    /// Returns the reference counter a compound item reports its mutations to.
    pub fn reference_counter(&self) -> Option<ReferenceCounter> {
        match self {
            StackItem::Array(array) => array.reference_counter(),
            StackItem::Struct(structure) => structure.reference_counter(),
            StackItem::Map(map) => map.reference_counter(),
            _ => None,
        }
    }

    /// Number of child occurrences held by a compound item (map entries count twice).
    pub fn sub_items_count(&self) -> usize {
        match self {
            StackItem::Array(array) => array.len(),
            StackItem::Struct(structure) => structure.len(),
            StackItem::Map(map) => map.len() * 2,
            _ => 0,
        }
    }

    /// Snapshot of the children of a compound item, map keys and values interleaved.
    pub fn sub_items(&self) -> Vec<StackItem> {
        match self {
            StackItem::Array(array) => array.items(),
            StackItem::Struct(structure) => structure.items(),
            StackItem::Map(map) => map.sub_items(),
            _ => Vec::new(),
        }
    }

    /// Empties the storage of a compound item without notifying the reference
    /// counter. Used once the counter has proven the item unreachable.
    pub(crate) fn take_sub_items(&self) -> Vec<StackItem> {
        match self {
            StackItem::Array(array) => array.take_items(),
            StackItem::Struct(structure) => structure.take_items(),
            StackItem::Map(map) => map.take_sub_items(),
            _ => Vec::new(),
        }
    }

    /// Moves the children out of a compound item if this is its last handle.
    fn into_exclusive_sub_items(self) -> Vec<StackItem> {
        match self {
            StackItem::Array(array) => array.into_list().into_exclusive_items(),
            StackItem::Struct(structure) => structure.into_list().into_exclusive_items(),
            StackItem::Map(map) => map.into_exclusive_sub_items(),
            _ => Vec::new(),
        }
    }

    /// Converts the stack item to a boolean.
    pub fn as_bool(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(value) => *value,
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::ByteString(bytes) => bytes.iter().any(|b| *b != 0),
            _ => true,
        }
    }

    /// Returns the integer value, if this is an integer item.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            StackItem::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the integer value as `i64` when it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_int().and_then(ToPrimitive::to_i64)
    }

    /// Returns the byte length of a primitive value, used to bound map keys.
    pub(crate) fn primitive_size(&self) -> usize {
        match self {
            StackItem::Boolean(_) => 1,
            StackItem::Integer(value) => value.to_signed_bytes_le().len(),
            StackItem::ByteString(bytes) => bytes.len(),
            _ => 0,
        }
    }
}

/// Drops a batch of items, unpacking containers whose last handle is being
/// released so that nesting depth never becomes call-stack depth.
pub(crate) fn release_nested(mut pending: Vec<StackItem>) {
    while let Some(item) = pending.pop() {
        pending.extend(item.into_exclusive_sub_items());
    }
}

impl PartialEq for StackItem {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StackItem::Null, StackItem::Null) => true,
            (StackItem::Boolean(a), StackItem::Boolean(b)) => a == b,
            (StackItem::Integer(a), StackItem::Integer(b)) => a == b,
            (StackItem::ByteString(a), StackItem::ByteString(b)) => a == b,
            (StackItem::Pointer(a), StackItem::Pointer(b)) => a == b,
            (StackItem::Buffer(a), StackItem::Buffer(b)) => a.id() == b.id(),
            (StackItem::Array(a), StackItem::Array(b)) => a.id() == b.id(),
            (StackItem::Struct(a), StackItem::Struct(b)) => a.id() == b.id(),
            (StackItem::Map(a), StackItem::Map(b)) => a.id() == b.id(),
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => {
                std::ptr::eq(
                    Arc::as_ptr(a) as *const (),
                    Arc::as_ptr(b) as *const (),
                )
            }
            _ => false,
        }
    }
}

impl Eq for StackItem {}

impl Hash for StackItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stack_item_type().hash(state);
        match self {
            StackItem::Null => {}
            StackItem::Boolean(value) => value.hash(state),
            StackItem::Integer(value) => value.hash(state),
            StackItem::ByteString(bytes) => bytes.hash(state),
            StackItem::Pointer(position) => position.hash(state),
            StackItem::Buffer(_) | StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_) => {
                self.tracked_id().hash(state)
            }
            StackItem::InteropInterface(interface) => {
                (Arc::as_ptr(interface) as *const () as usize).hash(state)
            }
        }
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::Boolean(value)
    }
}

impl From<i32> for StackItem {
    fn from(value: i32) -> Self {
        StackItem::from_int(value)
    }
}

impl From<i64> for StackItem {
    fn from(value: i64) -> Self {
        StackItem::from_int(value)
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        StackItem::Integer(value)
    }
}

impl From<Array> for StackItem {
    fn from(value: Array) -> Self {
        StackItem::Array(value)
    }
}

impl From<Struct> for StackItem {
    fn from(value: Struct) -> Self {
        StackItem::Struct(value)
    }
}

impl From<Map> for StackItem {
    fn from(value: Map) -> Self {
        StackItem::Map(value)
    }
}

impl From<Buffer> for StackItem {
    fn from(value: Buffer) -> Self {
        StackItem::Buffer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Handle;

    impl InteropInterface for Handle {
        fn interface_type(&self) -> &str {
            "Handle"
        }
    }

    #[test]
    fn test_primitives_compare_by_value() {
        assert_eq!(StackItem::from_int(7), StackItem::from_int(7));
        assert_eq!(StackItem::from_byte_string(b"ab".to_vec()), StackItem::from_byte_string("ab"));
        assert_ne!(StackItem::from_int(1), StackItem::from_bool(true));
        assert!(StackItem::from_int(7).tracked_id().is_none());
    }

    #[test]
    fn test_compounds_compare_by_identity() {
        let a = StackItem::Array(Array::new_untracked(vec![]));
        let b = StackItem::Array(Array::new_untracked(vec![]));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.tracked_id(), b.tracked_id());
    }

    #[test]
    fn test_interop_is_leaf() {
        let handle = StackItem::from_interface(Handle);
        assert_eq!(handle.stack_item_type(), StackItemType::InteropInterface);
        assert!(handle.tracked_id().is_none());
        assert_eq!(handle, handle.clone());
        assert_ne!(handle, StackItem::from_interface(Handle));
    }

    #[test]
    fn test_sub_items_of_map_are_interleaved() {
        let map = Map::new(None);
        map.set(StackItem::from_int(1), StackItem::from_bool(true)).unwrap();
        let item = StackItem::Map(map);
        assert_eq!(item.sub_items_count(), 2);
        assert_eq!(
            item.sub_items(),
            vec![StackItem::from_int(1), StackItem::from_bool(true)]
        );
    }

    #[test]
    fn test_deep_nesting_drops_without_recursion() {
        let mut item = StackItem::from_int(0);
        for _ in 0..200_000 {
            item = StackItem::Array(Array::new_untracked(vec![item]));
        }
        drop(item);
    }
}
