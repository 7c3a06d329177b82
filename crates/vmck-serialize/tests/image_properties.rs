//! Property tests for canonical image stability.

use proptest::prelude::*;
use vmck_kernel::{
    ClassId, ClassInfo, ClassLoaderInfo, FieldInfo, KernelState, MethodId, MethodInfo, ObjRef,
    StackFrame, ThreadId, ThreadInfo,
};
use vmck_serialize::{CanonicalSerializer, StateSerializer};

/// Singly linked chain of the given values; `reverse_alloc` flips the order
/// the nodes hit the heap without changing the reachable shape.
fn chain_state(vals: &[i32], reverse_alloc: bool) -> KernelState {
    let mut ks = KernelState::new();
    ks.classes
        .register(ClassInfo::new(ClassId(0), "Node").with_instance_fields(vec![
            FieldInfo::new("val", 0),
            FieldInfo::new("next", 1).reference(),
        ]));
    ks.methods
        .register(MethodInfo::new(MethodId(0), "Main.run", 2));
    ks.class_loaders.push(ClassLoaderInfo::new(0));

    let root = if reverse_alloc {
        let mut next = ObjRef::NULL;
        for &v in vals.iter().rev() {
            next = ks.heap.alloc_object(ClassId(0), vec![v, next.as_word()]);
        }
        next
    } else {
        let nodes: Vec<ObjRef> = vals
            .iter()
            .map(|&v| ks.heap.alloc_object(ClassId(0), vec![v, -1]))
            .collect();
        for w in nodes.windows(2) {
            ks.heap.set_slot(w[0], 1, w[1].as_word());
        }
        nodes[0]
    };

    let mut frame = StackFrame::new(MethodId(0), Some(0));
    frame.push_ref(root);
    let mut ti = ThreadInfo::new(ThreadId(0), ObjRef::NULL);
    ti.frames.push(frame);
    ks.threads.add(ti);
    ks
}

proptest! {
    #[test]
    fn canonical_image_is_allocation_order_independent(
        vals in proptest::collection::vec(-100i32..100, 1..8)
    ) {
        let mut ser = CanonicalSerializer::default();
        let a = ser.compute_state_image(&mut chain_state(&vals, false)).unwrap();
        let b = ser.compute_state_image(&mut chain_state(&vals, true)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn canonical_image_is_stable_across_repeated_passes(
        vals in proptest::collection::vec(-100i32..100, 1..8),
        passes in 2usize..5
    ) {
        let mut ks = chain_state(&vals, false);
        let mut ser = CanonicalSerializer::default();
        let first = ser.compute_state_image(&mut ks).unwrap();
        for _ in 1..passes {
            prop_assert_eq!(&first, &ser.compute_state_image(&mut ks).unwrap());
        }
    }

    #[test]
    fn distinct_values_give_distinct_images(
        vals in proptest::collection::vec(-100i32..100, 1..8),
        idx in 0usize..8,
        bump in 1i32..50
    ) {
        let idx = idx % vals.len();
        let mut changed = vals.clone();
        changed[idx] += bump;

        let mut ser = CanonicalSerializer::default();
        let a = ser.compute_state_image(&mut chain_state(&vals, false)).unwrap();
        let b = ser.compute_state_image(&mut chain_state(&changed, false)).unwrap();
        prop_assert_ne!(a, b);
    }
}
