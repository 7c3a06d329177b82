//! Simulated-thread state.
//!
//! The checker itself runs single-threaded; these are the *target* program's
//! threads, represented purely as data. A [`ThreadId`] is the handle that
//! thread-schedule choice generators enumerate.

use crate::heap::ObjRef;
use crate::stack::StackFrame;
use std::fmt;

/// Handle for a simulated thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub i32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread-{}", self.0)
    }
}

/// Lifecycle state of a simulated thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Runnable,
    Blocked,
    Waiting,
    TimedOut,
    Terminated,
}

impl ThreadState {
    /// Ordinal word used in the state image.
    #[inline]
    pub fn ordinal(self) -> i32 {
        match self {
            ThreadState::New => 0,
            ThreadState::Runnable => 1,
            ThreadState::Blocked => 2,
            ThreadState::Waiting => 3,
            ThreadState::TimedOut => 4,
            ThreadState::Terminated => 5,
        }
    }
}

/// One simulated thread: lifecycle state, call stack (top frame first),
/// blocked-on object and held-lock set.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub state: ThreadState,
    /// The thread's own heap object; serialized as a traversal root.
    pub object_ref: ObjRef,
    /// Frames, topmost first.
    pub frames: Vec<StackFrame>,
    /// The object this thread is blocked on or waiting for, if any.
    pub lock_ref: Option<ObjRef>,
    /// Objects whose monitors this thread currently holds. Treated as a set;
    /// serialization must not depend on acquisition order.
    pub held_locks: Vec<ObjRef>,
}

impl ThreadInfo {
    pub fn new(id: ThreadId, object_ref: ObjRef) -> Self {
        Self {
            id,
            state: ThreadState::Runnable,
            object_ref,
            frames: Vec::new(),
            lock_ref: None,
            held_locks: Vec::new(),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Terminated
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state == ThreadState::Runnable
    }

    #[inline]
    pub fn stack_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.frames.first()
    }
}

/// All simulated threads, in declared (creation) order. Declared order is
/// what fixes the serializer's traversal order across interleavings.
#[derive(Debug, Clone, Default)]
pub struct ThreadList {
    threads: Vec<ThreadInfo>,
}

impl ThreadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ti: ThreadInfo) -> ThreadId {
        let id = ti.id;
        self.threads.push(ti);
        id
    }

    pub fn get(&self, id: ThreadId) -> Option<&ThreadInfo> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut ThreadInfo> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    /// All threads in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.iter()
    }

    /// Live threads in declared order.
    pub fn iter_live(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.iter().filter(|t| t.is_alive())
    }

    /// Runnable thread handles, in declared order; the usual input for a
    /// scheduling-point choice generator.
    pub fn runnable(&self) -> Vec<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_runnable())
            .map(|t| t.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
