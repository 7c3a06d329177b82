//! The shared traversal engine behind all serializer variants.
//!
//! One pass walks thread stacks, static storage and the reachable heap in a
//! fixed order and appends words to a flat buffer. The public serializer
//! types differ only in how references are encoded ([`RefMode`]) and in how
//! much of the state is in scope ([`Scope`]); everything else is this engine.
//!
//! Traversal order is breadth-first from the stack roots: stacks first, then
//! statics, then the heap queue in discovery order, then thread/lock state.
//! For the canonical mode that discovery order is exactly what defines the
//! object numbering, so two states whose reachable graphs are isomorphic get
//! identical images no matter where the allocator placed the objects.

use crate::error::TraversalError;
use crate::filter::FilterConfiguration;
use crate::image::StateImage;
use crate::masks::FilterMasks;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt::Write as _;
use tracing::debug;
use vmck_kernel::{
    ClassLoaderInfo, Classes, Fields, Heap, KernelState, Methods, ObjRef, ThreadList,
};

/// How heap references are encoded in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefMode {
    /// Raw arena index. Fast, but images differ across allocation orders.
    Direct,
    /// Traversal-order canonical id. Heap-symmetry reducing.
    Canonical,
}

/// Which parts of the state a pass covers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope {
    /// Serialize static storage areas.
    pub statics: bool,
    /// Serialize only the topmost frame of each thread.
    pub top_frame_only: bool,
    /// Stop expanding objects past this many hops from a root. `None` means
    /// the full reachable graph.
    pub hop_limit: Option<u32>,
    /// Shrink scope (skip statics, one hop) between scheduling points.
    pub adaptive: bool,
}

impl Default for Scope {
    fn default() -> Self {
        Self {
            statics: true,
            top_frame_only: false,
            hop_limit: None,
            adaptive: false,
        }
    }
}

/// Copied object payload; lets the engine release its heap borrow before
/// reference processing mutates per-object bookkeeping.
enum Payload {
    Done,
    Refs(SmallVec<[ObjRef; 8]>),
    Slots(SmallVec<[i32; 16]>),
}

pub(crate) struct Engine {
    masks: FilterMasks,
    mode: RefMode,
    scope: Scope,
    buf: Vec<i32>,
    queue: VecDeque<(ObjRef, u32)>,
    /// Generation of the in-progress canonical pass, drawn from the heap's
    /// own counter so that distinct engine instances over one heap never
    /// reuse a generation; objects with a stale `sid_gen` are unnumbered
    /// without any reset sweep.
    pass: u32,
    next_sid: i32,
    dump: Option<String>,
}

impl Engine {
    pub(crate) fn new(filter: FilterConfiguration, mode: RefMode, scope: Scope, dump: bool) -> Self {
        Self {
            masks: FilterMasks::new(filter),
            mode,
            scope,
            buf: Vec::new(),
            queue: VecDeque::new(),
            pass: 0,
            next_sid: 1,
            dump: dump.then(String::new),
        }
    }

    /// Human-readable trace of the last pass, when dumping is enabled.
    pub(crate) fn last_dump(&self) -> Option<&str> {
        self.dump.as_deref()
    }

    pub(crate) fn compute(&mut self, ks: &mut KernelState) -> Result<StateImage, TraversalError> {
        self.buf.clear();
        self.queue.clear();
        if let Some(d) = &mut self.dump {
            d.clear();
        }
        if self.mode == RefMode::Canonical {
            self.pass = ks.heap.begin_pass();
            self.next_sid = 1;
        }

        let at_scheduling_point = ks.at_scheduling_point;
        let statics_on = self.scope.statics && (!self.scope.adaptive || at_scheduling_point);
        let hop = if self.scope.adaptive && !at_scheduling_point {
            Some(1)
        } else {
            self.scope.hop_limit
        };

        let KernelState {
            heap,
            classes,
            methods,
            threads,
            class_loaders,
            ..
        } = ks;

        self.serialize_stacks(heap, methods, threads, hop)?;
        if statics_on {
            self.serialize_statics(heap, classes, class_loaders, hop)?;
        }
        self.drain_queue(heap, classes, hop)?;
        if self.mode == RefMode::Direct {
            heap.unmark_all();
        }
        self.serialize_thread_states(heap, threads)?;

        debug!(
            words = self.buf.len(),
            objects = self.next_sid - 1,
            "state image computed"
        );
        Ok(StateImage::new(self.buf.clone()))
    }

    fn serialize_stacks(
        &mut self,
        heap: &mut Heap,
        methods: &Methods,
        threads: &ThreadList,
        hop: Option<u32>,
    ) -> Result<(), TraversalError> {
        self.buf.push(threads.iter_live().count() as i32);

        for ti in threads.iter_live() {
            if let Some(d) = &mut self.dump {
                let _ = writeln!(d, "{} {:?} frames={}", ti.id, ti.state, ti.frames.len());
            }
            // the thread object itself is a root
            self.process_reference(heap, ti.object_ref, 0, hop)?;

            for frame in &ti.frames {
                let mi = methods.get(frame.method);
                let policy = self.masks.frame_policy(mi);

                self.buf.push(mi.id.0 as i32);
                if policy.include_pc {
                    self.buf.push(frame.pc.map_or(-1, |pc| pc as i32));
                }
                self.buf.push(frame.slot_count() as i32);
                if let Some(d) = &mut self.dump {
                    let _ = writeln!(
                        d,
                        "  frame {} pc={:?} slots={}",
                        mi.full_name,
                        frame.pc,
                        frame.slot_count()
                    );
                }

                for i in 0..frame.slot_count() {
                    let is_local = i < mi.max_locals;
                    if is_local && !policy.include_locals {
                        continue;
                    }
                    if !is_local && !policy.include_ops {
                        continue;
                    }
                    if frame.is_reference_slot(i) {
                        self.process_reference(heap, frame.ref_at(i), 0, hop)?;
                    } else {
                        self.buf.push(frame.slots()[i]);
                    }
                }

                if self.scope.top_frame_only || !policy.recurse {
                    break;
                }
            }
        }
        Ok(())
    }

    fn serialize_statics(
        &mut self,
        heap: &mut Heap,
        classes: &Classes,
        class_loaders: &[ClassLoaderInfo],
        hop: Option<u32>,
    ) -> Result<(), TraversalError> {
        let live: SmallVec<[&ClassLoaderInfo; 2]> =
            class_loaders.iter().filter(|cl| cl.alive).collect();
        self.buf.push(live.len() as i32);

        for cl in live {
            self.buf.push(cl.statics.len() as i32);
            for entry in cl.statics.live() {
                let ci = classes.get(entry.class);
                if entry.status < 0 {
                    return Err(TraversalError::UninitializedClass {
                        class: ci.name.clone(),
                    });
                }
                self.buf.push(entry.status);
                if let Some(d) = &mut self.dump {
                    let _ = writeln!(d, "statics {} status={}", ci.name, entry.status);
                }

                let filtered = self.masks.static_filter_mask(ci)?;
                let refs = self.masks.static_ref_mask(ci)?;
                for (i, &w) in entry.slots.iter().enumerate().take(ci.static_data_size()) {
                    if filtered.get(i) {
                        continue;
                    }
                    if refs.get(i) {
                        self.process_reference(heap, ref_from_word(w), 0, hop)?;
                    } else {
                        self.buf.push(w);
                    }
                }
            }
        }
        Ok(())
    }

    fn drain_queue(
        &mut self,
        heap: &mut Heap,
        classes: &Classes,
        hop: Option<u32>,
    ) -> Result<(), TraversalError> {
        while let Some((r, depth)) = self.queue.pop_front() {
            let ei = heap
                .get(r)
                .ok_or(TraversalError::DanglingReference { reference: r })?;
            let class = ei.class;
            self.buf.push(class.0 as i32);

            let payload = match &ei.fields {
                Fields::IntArray(elems) => {
                    self.buf.push(elems.len() as i32);
                    self.buf.extend_from_slice(elems);
                    Payload::Done
                }
                Fields::RefArray(elems) => {
                    self.buf.push(elems.len() as i32);
                    Payload::Refs(elems.iter().copied().collect())
                }
                Fields::Named { slots } => Payload::Slots(slots.iter().copied().collect()),
            };
            if let Some(d) = &mut self.dump {
                let _ = writeln!(d, "object {} {}", r, class);
            }

            match payload {
                Payload::Done => {}
                Payload::Refs(elems) => {
                    for e in elems {
                        self.process_reference(heap, e, depth + 1, hop)?;
                    }
                }
                Payload::Slots(words) => {
                    let ci = classes.get(class);
                    let filtered = self.masks.instance_filter_mask(ci)?;
                    let refs = self.masks.instance_ref_mask(ci)?;
                    for (i, &w) in words.iter().enumerate() {
                        if filtered.get(i) {
                            continue;
                        }
                        if refs.get(i) {
                            self.process_reference(heap, ref_from_word(w), depth + 1, hop)?;
                        } else {
                            self.buf.push(w);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn serialize_thread_states(
        &mut self,
        heap: &Heap,
        threads: &ThreadList,
    ) -> Result<(), TraversalError> {
        for ti in threads.iter_live() {
            self.buf.push(ti.id.0);
            self.buf.push(ti.state.ordinal());
            self.buf.push(ti.stack_depth() as i32);
            match ti.lock_ref {
                Some(r) => {
                    let w = self.serialized_ref_value(heap, r)?;
                    self.buf.push(w);
                }
                None => self.buf.push(-1),
            }

            // fold the held-lock set into one word without depending on
            // acquisition order
            let n = ti.held_locks.len();
            self.buf.push(n as i32);
            if n == 1 {
                let w = self.serialized_ref_value(heap, ti.held_locks[0])?;
                self.buf.push(w);
            } else if n >= 2 {
                let mut h: i32 = ((n as i32) << 16) + (n as i32 % 3);
                for &lock in &ti.held_locks {
                    let w = self.serialized_ref_value(heap, lock)?;
                    h ^= w.rotate_left(w.unsigned_abs() % 31);
                }
                self.buf.push(h);
            }
        }
        Ok(())
    }

    /// Append the encoded value of a reference slot and schedule the target
    /// for expansion if it was not seen this pass and is within the hop
    /// budget.
    fn process_reference(
        &mut self,
        heap: &mut Heap,
        r: ObjRef,
        depth: u32,
        hop: Option<u32>,
    ) -> Result<(), TraversalError> {
        if r.is_null() {
            self.buf.push(-1);
            return Ok(());
        }
        let ei = heap
            .get_mut(r)
            .ok_or(TraversalError::DanglingReference { reference: r })?;
        let within_budget = hop.map_or(true, |h| depth < h);

        match self.mode {
            RefMode::Canonical => {
                if ei.sid_gen != self.pass {
                    ei.sid = self.next_sid;
                    ei.sid_gen = self.pass;
                    self.next_sid += 1;
                    if within_budget {
                        self.queue.push_back((r, depth));
                    }
                }
                self.buf.push(ei.sid);
            }
            RefMode::Direct => {
                if !ei.marked {
                    ei.marked = true;
                    if within_budget {
                        self.queue.push_back((r, depth));
                    }
                }
                self.buf.push(r.as_word());
            }
        }
        Ok(())
    }

    /// Reference value as it appears in the image, without scheduling the
    /// target. Used for lock state, which is serialized after the queue has
    /// been drained; an object never visited this pass encodes as 0.
    fn serialized_ref_value(&self, heap: &Heap, r: ObjRef) -> Result<i32, TraversalError> {
        if r.is_null() {
            return Ok(-1);
        }
        let ei = heap
            .get(r)
            .ok_or(TraversalError::DanglingReference { reference: r })?;
        Ok(match self.mode {
            RefMode::Canonical => {
                if ei.sid_gen == self.pass {
                    ei.sid
                } else {
                    0
                }
            }
            RefMode::Direct => r.as_word(),
        })
    }
}

#[inline]
fn ref_from_word(w: i32) -> ObjRef {
    if w < 0 {
        ObjRef::NULL
    } else {
        ObjRef::from_index(w as usize)
    }
}
