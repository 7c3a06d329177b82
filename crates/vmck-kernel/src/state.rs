//! The aggregate kernel state handed to the serializers.

use crate::class::{Classes, Methods};
use crate::heap::Heap;
use crate::statics::ClassLoaderInfo;
use crate::thread::ThreadList;

/// Everything reachable from one decision point: heap, class/method
/// metadata, threads and per-loader static storage.
///
/// The search driver owns and mutates this between decision points; a
/// serialization pass gets exclusive access for its whole (synchronous)
/// duration, which is what makes the shared mark/sid bookkeeping safe.
#[derive(Debug, Clone, Default)]
pub struct KernelState {
    pub heap: Heap,
    pub classes: Classes,
    pub methods: Methods,
    pub threads: ThreadList,
    pub class_loaders: Vec<ClassLoaderInfo>,
    /// Set by the driver when the current decision point is a genuine
    /// scheduling point; consumed by the adaptive serializer.
    pub at_scheduling_point: bool,
}

impl KernelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live class loaders, in declared order.
    pub fn live_class_loaders(&self) -> impl Iterator<Item = &ClassLoaderInfo> {
        self.class_loaders.iter().filter(|cl| cl.alive)
    }
}
