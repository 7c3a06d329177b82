//! Emulated-VM state substrate for the vmck model checker.
//!
//! This crate holds the data model the checker core operates on: the object
//! heap, class and method metadata, thread and call-stack state, static
//! storage, and the string-keyed configuration namespace. The interpreter and
//! search driver (external to this workspace) mutate these structures; the
//! choice and serialization crates only read them, except for the mark bit
//! and canonical-id slot on heap objects.

pub mod class;
pub mod config;
pub mod heap;
pub mod stack;
pub mod state;
pub mod statics;
pub mod thread;

pub use class::{ClassId, ClassInfo, Classes, FieldInfo, FilterMark, MethodId, MethodInfo, Methods};
pub use config::{Config, ConfigError};
pub use heap::{ElementInfo, Fields, Heap, ObjRef};
pub use stack::StackFrame;
pub use state::KernelState;
pub use statics::{
    ClassLoaderInfo, Statics, StaticsEntry, STATUS_INITIALIZED, STATUS_UNINITIALIZED,
};
pub use thread::{ThreadId, ThreadInfo, ThreadList, ThreadState};
