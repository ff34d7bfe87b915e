//! Integration tests for the Neo VM reference counter.

use neo_vm_gc::reference_counter::ReferenceCounter;
use neo_vm_gc::stack_item::{Array, Map, StackItem, Struct};
use neo_vm_gc::{ExecutionEngineLimits, VmError};

fn array(counter: &ReferenceCounter, items: Vec<StackItem>) -> Array {
    Array::new(items, Some(counter.clone())).unwrap()
}

#[test]
fn test_reference_counter_creation() {
    let counter = ReferenceCounter::new();

    assert_eq!(counter.count(), 0);
    assert_eq!(counter.tracked_count(), 0);
    assert_eq!(counter.candidate_count(), 0);
    assert_eq!(counter.check_zero_referred().unwrap(), 0);
}

#[test]
fn test_push_and_pop_primitives_restores_count() {
    let counter = ReferenceCounter::new();
    let outer = StackItem::Array(array(&counter, vec![]));
    counter.add_stack_reference(&outer).unwrap();
    let before = counter.count();

    for n in [0usize, 1, 7, 100] {
        let items: Vec<StackItem> = (0..n).map(|i| StackItem::from_int(i as i64)).collect();
        for item in &items {
            counter.add_stack_reference(item).unwrap();
        }
        assert_eq!(counter.count(), before + n);
        for item in items.iter().rev() {
            counter.remove_stack_reference(item).unwrap();
        }
        assert_eq!(counter.count(), before);
    }
}

#[test]
fn test_removing_one_duplicate_keeps_child_alive() {
    let counter = ReferenceCounter::new();
    let x = StackItem::Array(array(&counter, vec![]));
    let parent = array(&counter, vec![x.clone(), x.clone()]);
    let parent_item = StackItem::Array(parent.clone());

    counter.add_stack_reference(&parent_item).unwrap();
    assert_eq!(counter.count(), 2);
    assert_eq!(counter.edge_multiplicity(&parent_item, &x), 2);
    assert_eq!(counter.object_references(&x), 2);

    parent.remove(0).unwrap();
    assert_eq!(counter.object_references(&x), 1);
    assert_eq!(counter.edge_multiplicity(&parent_item, &x), 1);
    assert!(counter.is_tracked(&x));
    assert_eq!(counter.count(), 2);

    // Still referenced by its parent, so a pass keeps it.
    assert_eq!(counter.check_zero_referred().unwrap(), 2);

    parent.remove(0).unwrap();
    assert!(!counter.is_tracked(&x));
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_self_reference_is_freed_only_by_collection() {
    let counter = ReferenceCounter::new();
    let a = array(&counter, vec![]);
    let item = StackItem::Array(a.clone());

    counter.add_stack_reference(&item).unwrap();
    a.push(item.clone()).unwrap();
    assert_eq!(counter.count(), 1);
    assert_eq!(counter.edge_multiplicity(&item, &item), 1);

    counter.remove_stack_reference(&item).unwrap();
    assert_eq!(counter.count(), 1);
    assert_eq!(counter.candidate_count(), 1);

    assert_eq!(counter.check_zero_referred().unwrap(), 0);
    assert_eq!(counter.tracked_count(), 0);
    assert!(a.is_empty());
}

#[test]
fn test_mutual_cycle_without_root_is_collected() {
    let counter = ReferenceCounter::new();
    let a = array(&counter, vec![]);
    let b = array(&counter, vec![]);
    let (a_item, b_item) = (StackItem::Array(a.clone()), StackItem::Array(b.clone()));

    counter.add_stack_reference(&a_item).unwrap();
    counter.add_stack_reference(&b_item).unwrap();
    a.push(b_item.clone()).unwrap();
    b.push(a_item.clone()).unwrap();
    a.push(StackItem::from_int(7)).unwrap();
    assert_eq!(counter.count(), 3);

    counter.remove_stack_reference(&a_item).unwrap();
    counter.remove_stack_reference(&b_item).unwrap();
    assert_eq!(counter.count(), 3);

    assert_eq!(counter.check_zero_referred().unwrap(), 0);
    let stats = counter.stats();
    assert_eq!(stats.passes, 1);
    assert_eq!(stats.components_examined, 1);
    assert_eq!(stats.items_collected, 2);
}

#[test]
fn test_mutual_cycle_with_root_survives() {
    let counter = ReferenceCounter::new();
    let a = array(&counter, vec![]);
    let b = array(&counter, vec![]);
    let (a_item, b_item) = (StackItem::Array(a.clone()), StackItem::Array(b.clone()));

    counter.add_stack_reference(&a_item).unwrap();
    counter.add_stack_reference(&b_item).unwrap();
    a.push(b_item.clone()).unwrap();
    b.push(a_item.clone()).unwrap();

    counter.remove_stack_reference(&a_item).unwrap();
    assert_eq!(counter.check_zero_referred().unwrap(), 2);
    assert_eq!(counter.candidate_count(), 0);
    assert_eq!(counter.stats().items_collected, 0);

    counter.remove_stack_reference(&b_item).unwrap();
    assert_eq!(counter.check_zero_referred().unwrap(), 0);
}

#[test]
fn test_re_rooted_candidate_is_not_collected() {
    let counter = ReferenceCounter::new();
    let a = array(&counter, vec![]);
    let item = StackItem::Array(a.clone());
    counter.add_stack_reference(&item).unwrap();
    a.push(item.clone()).unwrap();

    counter.remove_stack_reference(&item).unwrap();
    assert_eq!(counter.candidate_count(), 1);
    counter.add_stack_reference(&item).unwrap();
    assert_eq!(counter.candidate_count(), 0);

    assert_eq!(counter.check_zero_referred().unwrap(), 1);
    assert_eq!(a.len(), 1);
    a.clear().unwrap();
}

#[test]
fn test_acyclic_release_cascades() {
    let counter = ReferenceCounter::new();
    let c = array(&counter, vec![StackItem::from_int(1)]);
    let b = array(&counter, vec![StackItem::Array(c)]);
    let a = StackItem::Array(array(&counter, vec![StackItem::Array(b)]));

    counter.add_stack_reference(&a).unwrap();
    assert_eq!(counter.count(), 4);
    assert_eq!(counter.tracked_count(), 3);

    counter.remove_stack_reference(&a).unwrap();
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.tracked_count(), 0);
    assert_eq!(counter.candidate_count(), 0);
}

#[test]
fn test_clear_releases_every_occurrence() {
    let counter = ReferenceCounter::new();
    let x = StackItem::Array(array(&counter, vec![]));
    let parent = array(&counter, vec![x.clone(), x.clone(), StackItem::from_int(1)]);
    counter
        .add_stack_reference(&StackItem::Array(parent.clone()))
        .unwrap();
    assert_eq!(counter.count(), 3);

    parent.clear().unwrap();
    assert_eq!(counter.count(), 1);
    assert!(!counter.is_tracked(&x));
}

#[test]
fn test_set_same_item_keeps_it_alive() {
    let counter = ReferenceCounter::new();
    let x = StackItem::Array(array(&counter, vec![]));
    let parent = array(&counter, vec![x.clone()]);
    let parent_item = StackItem::Array(parent.clone());
    counter.add_stack_reference(&parent_item).unwrap();

    parent.set(0, x.clone()).unwrap();
    assert!(counter.is_tracked(&x));
    assert_eq!(counter.edge_multiplicity(&parent_item, &x), 1);
    assert_eq!(counter.count(), 2);

    parent.set(0, StackItem::from_bool(true)).unwrap();
    assert!(!counter.is_tracked(&x));
    assert_eq!(counter.count(), 2);
}

#[test]
fn test_map_counts_keys_and_values() {
    let counter = ReferenceCounter::new();
    let map = Map::new(Some(counter.clone()));
    let item = StackItem::Map(map.clone());
    counter.add_stack_reference(&item).unwrap();
    assert_eq!(counter.count(), 1);

    map.set(StackItem::from_int(1), StackItem::from_int(10)).unwrap();
    map.set(StackItem::from_int(2), StackItem::from_int(20)).unwrap();
    assert_eq!(counter.count(), 5);

    map.set(StackItem::from_int(2), StackItem::from_int(21)).unwrap();
    assert_eq!(counter.count(), 5);

    map.remove(&StackItem::from_int(1)).unwrap();
    assert_eq!(counter.count(), 3);

    map.clear().unwrap();
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_map_holding_itself_is_collected() {
    let counter = ReferenceCounter::new();
    let map = Map::new(Some(counter.clone()));
    let item = StackItem::Map(map.clone());
    counter.add_stack_reference(&item).unwrap();
    map.set(StackItem::from_int(1), item.clone()).unwrap();
    assert_eq!(counter.count(), 2);

    counter.remove_stack_reference(&item).unwrap();
    assert_eq!(counter.count(), 2);
    assert_eq!(counter.check_zero_referred().unwrap(), 0);
    assert!(map.is_empty());
}

#[test]
fn test_freed_container_is_counted_again_when_rooted() {
    let counter = ReferenceCounter::new();
    let a = StackItem::Array(array(
        &counter,
        vec![StackItem::from_int(1), StackItem::from_int(2)],
    ));

    counter.add_stack_reference(&a).unwrap();
    counter.remove_stack_reference(&a).unwrap();
    assert_eq!(counter.count(), 0);

    counter.add_stack_reference(&a).unwrap();
    assert_eq!(counter.count(), 3);
}

#[test]
fn test_foreign_compound_is_rejected() {
    let counter = ReferenceCounter::new();
    let other = ReferenceCounter::new();
    let foreign = StackItem::Array(array(&other, vec![]));

    assert!(matches!(
        Array::new(vec![foreign.clone()], Some(counter.clone())),
        Err(VmError::InvalidOperation { .. })
    ));

    let local = array(&counter, vec![]);
    assert!(local.push(foreign).is_err());
    assert!(local.is_empty());
}

#[test]
fn test_struct_clone_is_counted_on_reference() {
    let counter = ReferenceCounter::new();
    let inner = Struct::new(vec![StackItem::from_int(1)], Some(counter.clone())).unwrap();
    let outer = Struct::new(
        vec![StackItem::Struct(inner), StackItem::from_int(2)],
        Some(counter.clone()),
    )
    .unwrap();

    let copy = outer.clone_struct(&ExecutionEngineLimits::DEFAULT).unwrap();
    assert_eq!(counter.count(), 0);

    counter
        .add_stack_reference(&StackItem::Struct(copy))
        .unwrap();
    // copy, its nested copy, and the two integers.
    assert_eq!(counter.count(), 4);
}

#[test]
fn test_struct_clone_respects_limits() {
    let counter = ReferenceCounter::new();
    let items = (0..10).map(StackItem::from_int).collect();
    let big = Struct::new(items, Some(counter)).unwrap();
    let limits = ExecutionEngineLimits {
        max_live_items: 5,
        ..ExecutionEngineLimits::DEFAULT
    };
    assert!(big.clone_struct(&limits).is_err());
}
