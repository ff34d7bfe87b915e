//! Strongly connected components of the stack item graph.
//!
//! The reference counter uses these to find cycles of containers that are no
//! longer reachable from any root.

pub mod tarjan;

pub use tarjan::Tarjan;
