//! End-to-end behavior of the serializer variants over hand-built states.

use vmck_kernel::{
    ClassId, ClassInfo, ClassLoaderInfo, FieldInfo, KernelState, MethodId, MethodInfo, ObjRef,
    StackFrame, StaticsEntry, ThreadId, ThreadInfo, ThreadState, STATUS_UNINITIALIZED,
};
use vmck_serialize::{
    AdaptiveSerializer, CanonicalSerializer, DebugSerializer, FilteringSerializer, StateSerializer,
    TopFrameSerializer, TraversalError,
};

fn node_class() -> ClassInfo {
    ClassInfo::new(ClassId(0), "Node").with_instance_fields(vec![
        FieldInfo::new("val", 0),
        FieldInfo::new("next", 1).reference(),
    ])
}

fn base_state() -> KernelState {
    let mut ks = KernelState::new();
    ks.classes.register(node_class());
    ks.methods
        .register(MethodInfo::new(MethodId(0), "Main.run", 2));
    ks.class_loaders.push(ClassLoaderInfo::new(0));
    ks
}

fn add_thread_with_root(ks: &mut KernelState, root: ObjRef) {
    let mut frame = StackFrame::new(MethodId(0), Some(0));
    frame.push_ref(root);
    let mut ti = ThreadInfo::new(ThreadId(0), ObjRef::NULL);
    ti.frames.push(frame);
    ks.threads.add(ti);
}

/// Two-node list `root -> tail`, with the allocation order controlled by the
/// caller. The reachable shape is identical either way.
fn two_node_state(tail_allocated_first: bool) -> KernelState {
    let mut ks = base_state();
    let root = if tail_allocated_first {
        let tail = ks.heap.alloc_object(ClassId(0), vec![20, -1]);
        ks.heap.alloc_object(ClassId(0), vec![10, tail.as_word()])
    } else {
        let root = ks.heap.alloc_object(ClassId(0), vec![10, -1]);
        let tail = ks.heap.alloc_object(ClassId(0), vec![20, -1]);
        ks.heap.set_slot(root, 1, tail.as_word());
        root
    };
    add_thread_with_root(&mut ks, root);
    ks
}

#[test]
fn canonical_images_ignore_allocation_order() {
    let mut a = two_node_state(false);
    let mut b = two_node_state(true);

    let mut ser = CanonicalSerializer::default();
    let img_a = ser.compute_state_image(&mut a).unwrap();
    let img_b = ser.compute_state_image(&mut b).unwrap();
    assert_eq!(img_a, img_b);
}

#[test]
fn direct_images_expose_allocation_order() {
    let mut a = two_node_state(false);
    let mut b = two_node_state(true);

    let mut ser = FilteringSerializer::default();
    let img_a = ser.compute_state_image(&mut a).unwrap();
    let img_b = ser.compute_state_image(&mut b).unwrap();
    assert_ne!(img_a, img_b);
}

#[test]
fn serialization_is_idempotent() {
    for canonical in [false, true] {
        let mut ks = two_node_state(false);
        let mut ser: Box<dyn StateSerializer> = if canonical {
            Box::new(CanonicalSerializer::default())
        } else {
            Box::new(FilteringSerializer::default())
        };

        let first = ser.compute_state_image(&mut ks).unwrap();
        let second = ser.compute_state_image(&mut ks).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn distinct_serializers_never_share_numbering_state() {
    let mut ks = two_node_state(false);
    let mut first = CanonicalSerializer::default();
    let mut second = CanonicalSerializer::default();

    // a pass by one instance must not poison another instance's view of
    // which objects are already numbered
    let a = first.compute_state_image(&mut ks).unwrap();
    let b = second.compute_state_image(&mut ks).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.compute_state_image(&mut ks).unwrap(), a);
}

#[test]
fn terminated_threads_do_not_affect_the_image() {
    let mut a = two_node_state(false);
    let mut b = two_node_state(false);
    let mut dead = ThreadInfo::new(ThreadId(7), ObjRef::NULL);
    dead.state = ThreadState::Terminated;
    b.threads.add(dead);

    let mut ser = CanonicalSerializer::default();
    let img_a = ser.compute_state_image(&mut a).unwrap();
    let img_b = ser.compute_state_image(&mut b).unwrap();
    assert_eq!(img_a, img_b);
}

#[test]
fn value_changes_change_the_image() {
    let mut a = two_node_state(false);
    let mut b = two_node_state(false);
    b.heap.set_slot(ObjRef::from_index(1), 0, 99); // tail.val

    let mut ser = CanonicalSerializer::default();
    let img_a = ser.compute_state_image(&mut a).unwrap();
    let img_b = ser.compute_state_image(&mut b).unwrap();
    assert_ne!(img_a, img_b);
}

#[test]
fn filtered_fields_do_not_reach_the_image() {
    let class = ClassInfo::new(ClassId(0), "Obj").with_instance_fields(vec![
        FieldInfo::new("x", 0),
        FieldInfo::new("__monitor", 1),
    ]);

    let build = |monitor_word: i32| {
        let mut ks = KernelState::new();
        ks.classes.register(class.clone());
        ks.methods
            .register(MethodInfo::new(MethodId(0), "Main.run", 2));
        ks.class_loaders.push(ClassLoaderInfo::new(0));
        let root = ks.heap.alloc_object(ClassId(0), vec![7, monitor_word]);
        add_thread_with_root(&mut ks, root);
        ks
    };

    let mut ser = CanonicalSerializer::default();
    let img_a = ser.compute_state_image(&mut build(0)).unwrap();
    let img_b = ser.compute_state_image(&mut build(5)).unwrap();
    assert_eq!(img_a, img_b);
}

#[test]
fn lock_set_fold_is_order_independent() {
    let build = |locks: &[usize]| {
        let mut ks = base_state();
        let a = ks.heap.alloc_object(ClassId(0), vec![1, -1]);
        let b = ks.heap.alloc_object(ClassId(0), vec![2, -1]);
        let c = ks.heap.alloc_object(ClassId(0), vec![3, -1]);
        let objs = [a, b, c];
        add_thread_with_root(&mut ks, a);
        // keep b and c reachable so the fold is the only difference
        ks.heap.set_slot(a, 1, b.as_word());
        ks.heap.set_slot(b, 1, c.as_word());
        let ti = ks.threads.get_mut(ThreadId(0)).unwrap();
        ti.held_locks = locks.iter().map(|&i| objs[i]).collect();
        ks
    };

    let mut ser = FilteringSerializer::default();
    let ab = ser.compute_state_image(&mut build(&[0, 1])).unwrap();
    let ba = ser.compute_state_image(&mut build(&[1, 0])).unwrap();
    let ac = ser.compute_state_image(&mut build(&[0, 2])).unwrap();

    assert_eq!(ab, ba);
    assert_ne!(ab, ac);
}

#[test]
fn adaptive_scope_shrinks_between_scheduling_points() {
    let build = |deep_val: i32, at_scheduling_point: bool| {
        let mut ks = two_node_state(false);
        ks.heap.set_slot(ObjRef::from_index(1), 0, deep_val);
        ks.at_scheduling_point = at_scheduling_point;
        ks
    };

    // off a scheduling point the tail is one hop past the budget, so a
    // change there is invisible
    let mut ser = AdaptiveSerializer::default();
    let a = ser.compute_state_image(&mut build(20, false)).unwrap();
    let b = ser.compute_state_image(&mut build(99, false)).unwrap();
    assert_eq!(a, b);

    // at a scheduling point the full graph is back in scope
    let a = ser.compute_state_image(&mut build(20, true)).unwrap();
    let b = ser.compute_state_image(&mut build(99, true)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn top_frame_serializer_collapses_caller_frames() {
    let build = |caller_word: i32| {
        let mut ks = base_state();
        ks.methods
            .register(MethodInfo::new(MethodId(1), "Main.helper", 1));
        let root = ks.heap.alloc_object(ClassId(0), vec![10, -1]);

        let mut top = StackFrame::new(MethodId(1), Some(4));
        top.push_ref(root);
        let mut caller = StackFrame::new(MethodId(0), Some(8));
        caller.push_word(caller_word);

        let mut ti = ThreadInfo::new(ThreadId(0), ObjRef::NULL);
        ti.frames.push(top);
        ti.frames.push(caller);
        ks.threads.add(ti);
        ks
    };

    let mut ser = TopFrameSerializer::default();
    let a = ser.compute_state_image(&mut build(1)).unwrap();
    let b = ser.compute_state_image(&mut build(2)).unwrap();
    assert_eq!(a, b);

    let mut full = CanonicalSerializer::default();
    let a = full.compute_state_image(&mut build(1)).unwrap();
    let b = full.compute_state_image(&mut build(2)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn debug_serializer_matches_canonical_and_traces() {
    let mut ks = two_node_state(false);
    let mut dbg = DebugSerializer::default();
    let mut canon = CanonicalSerializer::default();

    let img = dbg.compute_state_image(&mut ks).unwrap();
    let reference = canon.compute_state_image(&mut ks).unwrap();
    assert_eq!(img, reference);

    let dump = dbg.last_dump();
    assert!(dump.contains("thread-0"));
    assert!(dump.contains("Main.run"));
}

#[test]
fn statics_participate_in_matching() {
    let class = ClassInfo::new(ClassId(0), "G")
        .with_static_fields(vec![FieldInfo::new("counter", 0).static_field()]);

    let build = |counter: i32| {
        let mut ks = KernelState::new();
        ks.classes.register(class.clone());
        ks.methods
            .register(MethodInfo::new(MethodId(0), "Main.run", 2));
        let mut cl = ClassLoaderInfo::new(0);
        cl.statics.add(StaticsEntry::new(ClassId(0), vec![counter]));
        ks.class_loaders.push(cl);
        add_thread_with_root(&mut ks, ObjRef::NULL);
        ks
    };

    let mut ser = CanonicalSerializer::default();
    let a = ser.compute_state_image(&mut build(0)).unwrap();
    let b = ser.compute_state_image(&mut build(1)).unwrap();
    assert_ne!(a, b);
}

#[test]
fn uninitialized_class_aborts_the_pass() {
    let mut ks = base_state();
    let mut entry = StaticsEntry::new(ClassId(0), vec![]);
    entry.status = STATUS_UNINITIALIZED;
    ks.class_loaders[0].statics.add(entry);
    add_thread_with_root(&mut ks, ObjRef::NULL);

    let mut ser = CanonicalSerializer::default();
    assert!(matches!(
        ser.compute_state_image(&mut ks),
        Err(TraversalError::UninitializedClass { .. })
    ));
}

#[test]
fn dangling_reference_aborts_the_pass() {
    let mut ks = base_state();
    add_thread_with_root(&mut ks, ObjRef::from_index(42));

    let mut ser = CanonicalSerializer::default();
    assert!(matches!(
        ser.compute_state_image(&mut ks),
        Err(TraversalError::DanglingReference { .. })
    ));
}

#[test]
fn direct_pass_leaves_no_marks_behind() {
    let mut ks = two_node_state(false);
    let mut ser = FilteringSerializer::default();
    ser.compute_state_image(&mut ks).unwrap();
    assert!(ks.heap.live().all(|(_, ei)| !ei.marked));
}
