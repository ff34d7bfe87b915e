//! # Neo VM object lifetime tracking
//!
//! Reference counting and cycle collection for the items of a Neo Virtual
//! Machine, together with the parts of the engine that feed it: the evaluation
//! stack, static field slots and the post-instruction checkpoint.
//!
//! ## Model
//!
//! - **Roots**: every slot of the evaluation stack and of a [`Slot`] holds one
//!   stack reference on its item.
//! - **Containers**: [`Array`], [`Struct`] and [`Map`] report every child
//!   occurrence they gain or lose to their [`ReferenceCounter`].
//! - **Live items**: [`ReferenceCounter::count`] counts each item with identity
//!   once and each leaf value once per occurrence. The engine faults when it
//!   rises above [`ExecutionEngineLimits::max_live_items`].
//! - **Collection**: acyclic garbage is released as soon as its last reference
//!   goes away. Cycles are found by [`ReferenceCounter::check_zero_referred`],
//!   which runs Tarjan's algorithm over the collection candidates.
//!
//! ## Example
//!
//! ```rust
//! use neo_vm_gc::{ExecutionEngine, StackItem, VmResult};
//!
//! # fn example() -> VmResult<()> {
//! let mut engine = ExecutionEngine::new();
//! let array = engine.new_array(vec![])?;
//!
//! engine.execute_instruction(|engine| engine.push(StackItem::Array(array.clone())))?;
//! array.push(StackItem::Array(array.clone()))?;
//! assert_eq!(engine.live_items(), 1);
//!
//! // Dropping the only root leaves an unreachable self-cycle.
//! engine.execute_instruction(|engine| engine.pop().map(drop))?;
//! assert_eq!(engine.live_items(), 0);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

/// VM error types and result handling
pub mod error;
/// Type-safe evaluation stack implementation
pub mod evaluation_stack;
/// Low-level VM execution engine
pub mod execution_engine;
/// Configurable execution limits
pub mod execution_engine_limits;
/// Memory management for complex data structures
pub mod reference_counter;
/// Local, argument and static field storage
pub mod slot;
/// Polymorphic data types for VM values
pub mod stack_item;
/// Graph algorithms for garbage collection
pub mod strongly_connected_components;
/// VM execution state
pub mod vm_state;

pub use error::{VmError, VmResult};
pub use evaluation_stack::EvaluationStack;
pub use execution_engine::ExecutionEngine;
pub use execution_engine_limits::ExecutionEngineLimits;
pub use reference_counter::{CollectionStats, ItemId, ReferenceCounter};
pub use slot::Slot;
pub use stack_item::{
    Array, Buffer, CompoundList, InteropInterface, Map, StackItem, StackItemType, Struct,
};
pub use strongly_connected_components::Tarjan;
pub use vm_state::VMState;
