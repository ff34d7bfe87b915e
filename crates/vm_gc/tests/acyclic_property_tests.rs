//! Property-based tests for acyclic object graphs.
//!
//! Without cycles the counter must be exact after every single operation: the
//! live item count equals what a brute-force walk from the evaluation stack finds.

use neo_vm_gc::stack_item::{Array, StackItem};
use neo_vm_gc::{ExecutionEngine, ItemId};
use proptest::prelude::*;
use hashbrown::HashSet;

const POOL_SIZE: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    PushArray(usize),
    PushInt(i64),
    Pop,
    AppendArray(usize, usize),
    AppendInt(usize, i64),
    RemoveLast(usize),
    SetFirst(usize, usize),
    Clear(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let index = 0..POOL_SIZE;
    prop_oneof![
        index.clone().prop_map(Op::PushArray),
        any::<i64>().prop_map(Op::PushInt),
        Just(Op::Pop),
        (index.clone(), index.clone()).prop_map(|(a, b)| Op::AppendArray(a, b)),
        (index.clone(), any::<i64>()).prop_map(|(a, v)| Op::AppendInt(a, v)),
        index.clone().prop_map(Op::RemoveLast),
        (index.clone(), index.clone()).prop_map(|(a, b)| Op::SetFirst(a, b)),
        index.prop_map(Op::Clear),
    ]
}

/// Edges only go from a lower pool index to a higher one, so the graph stays acyclic.
fn apply(engine: &mut ExecutionEngine, pool: &[Array], op: &Op) {
    match *op {
        Op::PushArray(i) => engine.push(StackItem::Array(pool[i].clone())).unwrap(),
        Op::PushInt(value) => engine.push(StackItem::from_int(value)).unwrap(),
        Op::Pop => {
            if !engine.evaluation_stack().is_empty() {
                engine.pop().unwrap();
            }
        }
        Op::AppendArray(a, b) if a != b => {
            let (parent, child) = (a.min(b), a.max(b));
            pool[parent]
                .push(StackItem::Array(pool[child].clone()))
                .unwrap();
        }
        Op::AppendInt(a, value) => pool[a].push(StackItem::from_int(value)).unwrap(),
        Op::RemoveLast(a) => {
            if !pool[a].is_empty() {
                pool[a].pop().unwrap();
            }
        }
        Op::SetFirst(a, b) if a != b => {
            let (parent, child) = (a.min(b), a.max(b));
            if !pool[parent].is_empty() {
                pool[parent]
                    .set(0, StackItem::Array(pool[child].clone()))
                    .unwrap();
            }
        }
        Op::Clear(a) => pool[a].clear().unwrap(),
        Op::AppendArray(..) | Op::SetFirst(..) => {}
    }
}

/// Distinct reachable arrays plus every leaf occurrence in a root or a reachable array.
fn reachable_count(engine: &ExecutionEngine) -> usize {
    let mut visited: HashSet<ItemId> = HashSet::new();
    let mut leaves = 0;
    let mut pending: Vec<StackItem> = engine.evaluation_stack().iter().cloned().collect();

    while let Some(item) = pending.pop() {
        match &item {
            StackItem::Array(array) => {
                if visited.insert(array.id()) {
                    for child in array.items() {
                        match child {
                            StackItem::Array(_) => pending.push(child),
                            _ => leaves += 1,
                        }
                    }
                }
            }
            _ => leaves += 1,
        }
    }

    visited.len() + leaves
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Test that the live item count is exact for acyclic graphs
    #[test]
    fn test_count_matches_reachability(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let mut engine = ExecutionEngine::new();
        let pool: Vec<Array> = (0..POOL_SIZE)
            .map(|_| engine.new_array(vec![]).unwrap())
            .collect();

        for op in &ops {
            apply(&mut engine, &pool, op);
            prop_assert_eq!(engine.live_items(), reachable_count(&engine), "after {:?}", op);
        }

        engine.collect().unwrap();
        prop_assert_eq!(engine.live_items(), reachable_count(&engine));
    }

    /// Test that pushing and popping primitives restores the count
    #[test]
    fn test_push_pop_restores_count(values in prop::collection::vec(any::<i64>(), 0..64)) {
        let mut engine = ExecutionEngine::new();
        let before = engine.live_items();
        for value in &values {
            engine.push(StackItem::from_int(*value)).unwrap();
        }
        prop_assert_eq!(engine.live_items(), before + values.len());
        for _ in &values {
            engine.pop().unwrap();
        }
        prop_assert_eq!(engine.live_items(), before);
    }
}
