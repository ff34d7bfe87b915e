//! Reference counter for the Neo Virtual Machine.
//!
//! The counter keeps, for every live item with identity, the number of root
//! references (stack slots, context variables) and the number of incoming
//! references from live containers. Each live container also records its
//! outgoing edges, one per distinct child, with the number of occurrences of
//! that child as multiplicity.
//!
//! Acyclic garbage is released immediately: an item whose root and container
//! references both reach zero is freed, and so are its children in turn.
//! Containers that lose their last root while still referenced by some
//! container become candidates. [`ReferenceCounter::check_zero_referred`] runs
//! Tarjan's algorithm over the candidates and everything reachable from them,
//! and frees every strongly connected component that is no longer referenced
//! from outside itself.
//!
//! [`ReferenceCounter::count`] is the number of live items: tracked items plus
//! one for every occurrence of a leaf value held by a root or a live container.
//! Candidates stay counted until a collection pass proves them unreachable.

use crate::error::{VmError, VmResult};
use crate::stack_item::stack_item::release_nested;
use crate::stack_item::StackItem;
use crate::strongly_connected_components::Tarjan;
use hashbrown::{HashMap, HashSet};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Identity of an item with reference semantics.
pub type ItemId = usize;

/// Counters describing the work done by collection passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Passes that had at least one candidate to examine.
    pub passes: u64,
    /// Strongly connected components examined over all passes.
    pub components_examined: u64,
    /// Items freed because they belonged to an unreachable component.
    pub items_collected: u64,
}

/// Used for reference counting of objects in the VM.
///
/// Cloning yields another handle to the same counter. Every container bound to
/// a counter reports its mutations through such a handle.
#[derive(Clone, Default)]
pub struct ReferenceCounter {
    inner: Arc<Mutex<CounterState>>,
}

#[derive(Debug)]
struct TrackedItem {
    item: StackItem,
    stack_references: usize,
    object_references: usize,
    /// Outgoing edges to tracked children, with multiplicity.
    children: IndexMap<ItemId, usize>,
    /// Occurrences of leaf values held by this container.
    leaf_children: usize,
}

impl TrackedItem {
    fn new(item: StackItem) -> Self {
        Self {
            item,
            stack_references: 0,
            object_references: 0,
            children: IndexMap::new(),
            leaf_children: 0,
        }
    }
}

#[derive(Debug, Default)]
struct CounterState {
    tracked: HashMap<ItemId, TrackedItem>,
    zero_referred: IndexSet<ItemId>,
    references_count: usize,
    /// Highest `references_count` reached since the last [`ReferenceCounter::reset_peak_count`].
    peak_count: usize,
    stats: CollectionStats,
}

impl ReferenceCounter {
    /// Creates an empty reference counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if both handles refer to the same counter.
    #[must_use]
    pub fn ptr_eq(&self, other: &ReferenceCounter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current number of live items. Uncollected candidates are included.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.lock().references_count
    }

    /// Adds one root reference to `item`.
    pub fn add_stack_reference(&self, item: &StackItem) -> VmResult<()> {
        self.add_stack_references(item, 1)
    }

    /// Adds `count` root references to `item`.
    pub fn add_stack_references(&self, item: &StackItem, count: usize) -> VmResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.ensure_bound(item)?;

        let mut state = self.inner.lock();
        let Some(id) = item.tracked_id() else {
            state.increase_count(count);
            return Ok(());
        };

        state.track(id, item);
        if let Some(entry) = state.tracked.get_mut(&id) {
            entry.stack_references += count;
        }
        state.zero_referred.swap_remove(&id);
        Ok(())
    }

    /// Removes one root reference from `item`.
    ///
    /// An item left without any reference is freed at once; an item still held
    /// by a container becomes a collection candidate.
    pub fn remove_stack_reference(&self, item: &StackItem) -> VmResult<()> {
        let mut state = self.inner.lock();
        let Some(id) = item.tracked_id() else {
            return state.decrease_count(1);
        };

        let entry = state.tracked.get_mut(&id).ok_or_else(|| {
            invariant_violation(format!("stack reference removed from untracked item {id}"))
        })?;
        if entry.stack_references == 0 {
            return Err(invariant_violation(format!(
                "stack references of item {id} would go negative"
            )));
        }
        entry.stack_references -= 1;
        if entry.stack_references > 0 {
            return Ok(());
        }

        if entry.object_references == 0 {
            state.free(id)
        } else {
            state.zero_referred.insert(id);
            Ok(())
        }
    }

    /// Records one more occurrence of `item` inside the container `parent`.
    ///
    /// Containers that are not live are not accounted; their contents are
    /// counted when they first become referenced.
    pub fn add_reference(&self, item: &StackItem, parent: ItemId) -> VmResult<()> {
        self.ensure_bound(item)?;

        let mut state = self.inner.lock();
        if !state.tracked.contains_key(&parent) {
            return Ok(());
        }
        let mut pending = Vec::new();
        state.link(parent, item, &mut pending);
        state.expand(pending);
        Ok(())
    }

    /// Records that one occurrence of `item` left the container `parent`.
    pub fn remove_reference(&self, item: &StackItem, parent: ItemId) -> VmResult<()> {
        let mut state = self.inner.lock();
        let Some(parent_entry) = state.tracked.get_mut(&parent) else {
            return Ok(());
        };

        let Some(child) = item.tracked_id() else {
            if parent_entry.leaf_children == 0 {
                return Err(invariant_violation(format!(
                    "container {parent} released a value it does not hold"
                )));
            }
            parent_entry.leaf_children -= 1;
            return state.decrease_count(1);
        };

        let remaining = match parent_entry.children.get_mut(&child) {
            Some(multiplicity) if *multiplicity > 0 => {
                *multiplicity -= 1;
                *multiplicity
            }
            _ => {
                return Err(invariant_violation(format!(
                    "multiplicity of edge {parent} -> {child} would go negative"
                )))
            }
        };
        if remaining == 0 {
            parent_entry.children.swap_remove(&child);
        }
        state.release(child, 1)
    }

    /// Registers `item` and marks it as a collection candidate without adding a
    /// reference. The next [`Self::check_zero_referred`] frees it unless it has
    /// been referenced by then.
    pub fn add_zero_referred(&self, item: &StackItem) -> VmResult<()> {
        self.ensure_bound(item)?;

        let mut state = self.inner.lock();
        let Some(id) = item.tracked_id() else {
            return Ok(());
        };
        state.track(id, item);
        if state
            .tracked
            .get(&id)
            .is_some_and(|entry| entry.stack_references == 0)
        {
            state.zero_referred.insert(id);
        }
        Ok(())
    }

    /// Runs a collection pass over the candidates and returns the live item count.
    pub fn check_zero_referred(&self) -> VmResult<usize> {
        let mut state = self.inner.lock();
        state.collect()?;
        Ok(state.references_count)
    }

    /// Root references currently held on `item` (zero for leaves and dead items).
    #[must_use]
    pub fn stack_references(&self, item: &StackItem) -> usize {
        self.with_entry(item, |entry| entry.stack_references)
    }

    /// References to `item` from live containers, weighted by multiplicity.
    #[must_use]
    pub fn object_references(&self, item: &StackItem) -> usize {
        self.with_entry(item, |entry| entry.object_references)
    }

    /// Number of occurrences of `child` inside the live container `parent`.
    #[must_use]
    pub fn edge_multiplicity(&self, parent: &StackItem, child: &StackItem) -> usize {
        let Some(child) = child.tracked_id() else {
            return 0;
        };
        self.with_entry(parent, |entry| {
            entry.children.get(&child).copied().unwrap_or(0)
        })
    }

    /// Returns true if `item` currently has an entry in the counter.
    #[must_use]
    pub fn is_tracked(&self, item: &StackItem) -> bool {
        item.tracked_id()
            .is_some_and(|id| self.inner.lock().tracked.contains_key(&id))
    }

    /// Number of items waiting for the next collection pass.
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.inner.lock().zero_referred.len()
    }

    /// Number of items with identity currently live.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().tracked.len()
    }

    /// Totals of the collection passes run so far.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        self.inner.lock().stats
    }

    /// Highest live item count reached since the last reset, never below [`Self::count`].
    ///
    /// Frees and collection passes do not lower it, so an overflow that was
    /// released again before anyone looked at [`Self::count`] is still visible.
    #[must_use]
    pub fn peak_count(&self) -> usize {
        let state = self.inner.lock();
        state.peak_count.max(state.references_count)
    }

    /// Restarts peak tracking from the current live item count.
    pub fn reset_peak_count(&self) {
        let mut state = self.inner.lock();
        state.peak_count = state.references_count;
    }

    fn with_entry<F>(&self, item: &StackItem, f: F) -> usize
    where
        F: FnOnce(&TrackedItem) -> usize,
    {
        let Some(id) = item.tracked_id() else {
            return 0;
        };
        self.inner.lock().tracked.get(&id).map_or(0, f)
    }

    fn ensure_bound(&self, item: &StackItem) -> VmResult<()> {
        if !item.is_compound() {
            return Ok(());
        }
        match item.reference_counter() {
            Some(rc) if rc.ptr_eq(self) => Ok(()),
            Some(_) => Err(VmError::invalid_operation_msg(format!(
                "{:?} is bound to a different ReferenceCounter.",
                item.stack_item_type()
            ))),
            None => Err(VmError::invalid_operation_msg(format!(
                "Can not reference a {:?} without a ReferenceCounter.",
                item.stack_item_type()
            ))),
        }
    }
}

impl fmt::Debug for ReferenceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCounter").finish_non_exhaustive()
    }
}

impl CounterState {
    /// Gives `item` an entry if it has none, accounting everything it holds.
    fn track(&mut self, id: ItemId, item: &StackItem) {
        if self.tracked.contains_key(&id) {
            return;
        }
        self.insert_tracked(id, item.clone());
        self.expand(vec![(id, item.clone())]);
    }

    fn insert_tracked(&mut self, id: ItemId, item: StackItem) {
        trace!(id, item_type = ?item.stack_item_type(), "tracking item");
        self.tracked.insert(id, TrackedItem::new(item));
        self.increase_count(1);
    }

    /// Accounts the children of freshly tracked containers, breadth by explicit work list.
    fn expand(&mut self, mut pending: Vec<(ItemId, StackItem)>) {
        while let Some((parent, container)) = pending.pop() {
            for child in container.sub_items() {
                self.link(parent, &child, &mut pending);
            }
        }
    }

    /// Adds one occurrence of `child` under the live container `parent`.
    fn link(&mut self, parent: ItemId, child: &StackItem, pending: &mut Vec<(ItemId, StackItem)>) {
        let Some(child_id) = child.tracked_id() else {
            self.increase_count(1);
            if let Some(entry) = self.tracked.get_mut(&parent) {
                entry.leaf_children += 1;
            }
            return;
        };

        if !self.tracked.contains_key(&child_id) {
            self.insert_tracked(child_id, child.clone());
            pending.push((child_id, child.clone()));
        }
        if let Some(entry) = self.tracked.get_mut(&parent) {
            *entry.children.entry(child_id).or_insert(0) += 1;
        }
        if let Some(entry) = self.tracked.get_mut(&child_id) {
            entry.object_references += 1;
            if entry.object_references == 1 && entry.stack_references == 0 {
                self.zero_referred.insert(child_id);
            }
        }
    }

    /// Drops `multiplicity` container references from `id`.
    fn release(&mut self, id: ItemId, multiplicity: usize) -> VmResult<()> {
        let entry = self.tracked.get_mut(&id).ok_or_else(|| {
            invariant_violation(format!("reference released from untracked item {id}"))
        })?;
        entry.object_references = entry
            .object_references
            .checked_sub(multiplicity)
            .ok_or_else(|| {
                invariant_violation(format!("object references of item {id} would go negative"))
            })?;

        if entry.stack_references > 0 {
            return Ok(());
        }
        if entry.object_references == 0 {
            self.free(id)
        } else {
            self.zero_referred.insert(id);
            Ok(())
        }
    }

    /// Frees an unreferenced item and, transitively, every child left unreferenced.
    fn free(&mut self, id: ItemId) -> VmResult<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(entry) = self.tracked.remove(&id) else {
                continue;
            };
            if entry.stack_references > 0 || entry.object_references > 0 {
                return Err(invariant_violation(format!(
                    "item {id} freed while still referenced"
                )));
            }
            self.zero_referred.swap_remove(&id);
            self.decrease_count(1 + entry.leaf_children)?;
            trace!(id, "freed unreferenced item");

            for (child, multiplicity) in entry.children {
                let child_entry = self.tracked.get_mut(&child).ok_or_else(|| {
                    invariant_violation(format!("edge {id} -> {child} points to an untracked item"))
                })?;
                child_entry.object_references = child_entry
                    .object_references
                    .checked_sub(multiplicity)
                    .ok_or_else(|| {
                        invariant_violation(format!(
                            "object references of item {child} would go negative"
                        ))
                    })?;
                if child_entry.stack_references > 0 {
                    continue;
                }
                if child_entry.object_references == 0 {
                    pending.push(child);
                } else {
                    self.zero_referred.insert(child);
                }
            }
        }
        Ok(())
    }

    fn collect(&mut self) -> VmResult<()> {
        if self.zero_referred.is_empty() {
            return Ok(());
        }

        let candidates: Vec<ItemId> = std::mem::take(&mut self.zero_referred)
            .into_iter()
            .filter(|id| self.tracked.contains_key(id))
            .collect();
        let candidate_count = candidates.len();

        let components = {
            let tracked = &self.tracked;
            let mut tarjan = Tarjan::new();
            tarjan.find_components(candidates, |id: &ItemId| {
                tracked
                    .get(id)
                    .into_iter()
                    .flat_map(|entry| entry.children.keys().copied())
            })
        };

        // Components arrive sinks first; walk them parents first so that every
        // container referencing a component has been judged before it.
        let mut collected = 0usize;
        for component in components.iter().rev() {
            if self.is_unreachable(component) {
                collected += component.len();
                self.free_component(component)?;
            }
        }

        // Whatever survived was judged with complete information in this pass.
        let visited: HashSet<ItemId> = components.iter().flatten().copied().collect();
        self.zero_referred.retain(|id| !visited.contains(id));

        self.stats.passes += 1;
        self.stats.components_examined += components.len() as u64;
        self.stats.items_collected += collected as u64;
        debug!(
            candidates = candidate_count,
            components = components.len(),
            collected,
            count = self.references_count,
            "collection pass finished"
        );
        Ok(())
    }

    /// A component is garbage when no member is rooted and every container
    /// reference to a member comes from inside the component.
    fn is_unreachable(&self, component: &[ItemId]) -> bool {
        let members: HashSet<ItemId> = component.iter().copied().collect();
        let mut internal: HashMap<ItemId, usize> = HashMap::new();

        for id in component {
            let Some(entry) = self.tracked.get(id) else {
                return false;
            };
            if entry.stack_references > 0 {
                return false;
            }
            for (child, multiplicity) in &entry.children {
                if members.contains(child) {
                    *internal.entry(*child).or_insert(0) += multiplicity;
                }
            }
        }

        component.iter().all(|id| {
            self.tracked.get(id).is_some_and(|entry| {
                entry.object_references == internal.get(id).copied().unwrap_or(0)
            })
        })
    }

    fn free_component(&mut self, component: &[ItemId]) -> VmResult<()> {
        let members: HashSet<ItemId> = component.iter().copied().collect();
        let mut removed = Vec::with_capacity(component.len());
        for id in component {
            if let Some(entry) = self.tracked.remove(id) {
                self.zero_referred.swap_remove(id);
                removed.push(entry);
            }
        }

        let released: usize = removed.iter().map(|entry| 1 + entry.leaf_children).sum();
        self.decrease_count(released)?;
        trace!(members = removed.len(), released, "collected unreachable component");

        // Empty the containers first so dropping them never walks a host-level cycle.
        let mut storage = Vec::new();
        for entry in &removed {
            storage.extend(entry.item.take_sub_items());
        }

        for entry in removed {
            for (child, multiplicity) in entry.children {
                if !members.contains(&child) {
                    self.release(child, multiplicity)?;
                }
            }
        }

        release_nested(storage);
        Ok(())
    }

    fn increase_count(&mut self, amount: usize) {
        self.references_count += amount;
        self.peak_count = self.peak_count.max(self.references_count);
    }

    fn decrease_count(&mut self, amount: usize) -> VmResult<()> {
        self.references_count = self
            .references_count
            .checked_sub(amount)
            .ok_or_else(|| invariant_violation("live item count would go negative"))?;
        Ok(())
    }
}

fn invariant_violation<S: Into<String>>(message: S) -> VmError {
    let message = message.into();
    error!(%message, "reference counter invariant violated");
    VmError::invariant_violation_msg(message)
}
