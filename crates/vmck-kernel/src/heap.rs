//! Object heap arena.
//!
//! Objects live in an index-addressed arena; an [`ObjRef`] is a plain index
//! with a null sentinel, so references serialize as single words. Each object
//! carries the traversal bookkeeping the serializers need: a mark bit (used
//! by the non-canonical serializer's work queue) and a canonical-id slot with
//! a last-seen pass generation (used by the canonicalizing serializers to
//! answer "already numbered this pass?" in O(1) without a reset sweep).

use crate::class::ClassId;
use std::fmt;

/// Heap reference: arena index with a null sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    pub const NULL: ObjRef = ObjRef(u32::MAX);

    pub fn from_index(idx: usize) -> Self {
        ObjRef(idx as u32)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Word encoding used by the non-canonical serializer: null is -1.
    #[inline]
    pub fn as_word(self) -> i32 {
        if self.is_null() {
            -1
        } else {
            self.0 as i32
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

/// Object payload: either named instance fields (word slots) or an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fields {
    /// Named instance fields, laid out per the class's field offsets.
    Named { slots: Vec<i32> },
    /// Primitive array payload (element words).
    IntArray(Vec<i32>),
    /// Reference array payload.
    RefArray(Vec<ObjRef>),
}

impl Fields {
    /// Array length, if this is an array payload.
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Fields::Named { .. } => None,
            Fields::IntArray(v) => Some(v.len()),
            Fields::RefArray(v) => Some(v.len()),
        }
    }
}

/// A live heap object.
#[derive(Debug, Clone)]
pub struct ElementInfo {
    pub class: ClassId,
    pub fields: Fields,
    /// Work-queue mark, owned by the non-canonical serializer. Must be false
    /// outside of a traversal pass.
    pub marked: bool,
    /// Canonical reference id, valid only when `sid_gen` equals the current
    /// serialization pass.
    pub sid: i32,
    /// Pass generation in which `sid` was last assigned.
    pub sid_gen: u32,
}

impl ElementInfo {
    pub fn new(class: ClassId, fields: Fields) -> Self {
        Self {
            class,
            fields,
            marked: false,
            sid: 0,
            sid_gen: 0,
        }
    }
}

/// Index-addressed object arena.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    objects: Vec<ElementInfo>,
    /// Latest canonical pass generation handed out. Owned by the heap so
    /// that every serializer pass over it, whichever instance runs it,
    /// draws a generation no object's `sid_gen` can already carry.
    pass_gen: u32,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new canonical numbering pass and return its generation.
    pub fn begin_pass(&mut self) -> u32 {
        self.pass_gen = self.pass_gen.wrapping_add(1);
        self.pass_gen
    }

    /// Allocate an object with named fields.
    pub fn alloc_object(&mut self, class: ClassId, slots: Vec<i32>) -> ObjRef {
        self.alloc(ElementInfo::new(class, Fields::Named { slots }))
    }

    /// Allocate a primitive array.
    pub fn alloc_int_array(&mut self, class: ClassId, elems: Vec<i32>) -> ObjRef {
        self.alloc(ElementInfo::new(class, Fields::IntArray(elems)))
    }

    /// Allocate a reference array.
    pub fn alloc_ref_array(&mut self, class: ClassId, elems: Vec<ObjRef>) -> ObjRef {
        self.alloc(ElementInfo::new(class, Fields::RefArray(elems)))
    }

    fn alloc(&mut self, ei: ElementInfo) -> ObjRef {
        let r = ObjRef::from_index(self.objects.len());
        self.objects.push(ei);
        r
    }

    #[inline]
    pub fn get(&self, r: ObjRef) -> Option<&ElementInfo> {
        if r.is_null() {
            None
        } else {
            self.objects.get(r.index())
        }
    }

    #[inline]
    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut ElementInfo> {
        if r.is_null() {
            None
        } else {
            self.objects.get_mut(r.index())
        }
    }

    /// Store a word into a named field slot (test/driver convenience).
    pub fn set_slot(&mut self, r: ObjRef, slot: usize, value: i32) {
        if let Some(ei) = self.get_mut(r) {
            if let Fields::Named { slots } = &mut ei.fields {
                slots[slot] = value;
            }
        }
    }

    pub fn live(&self) -> impl Iterator<Item = (ObjRef, &ElementInfo)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, ei)| (ObjRef::from_index(i), ei))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Clear all mark bits. Called once per non-canonical pass after the
    /// reference queue has been drained.
    pub fn unmark_all(&mut self) {
        for ei in &mut self.objects {
            ei.marked = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_encoding() {
        assert!(ObjRef::NULL.is_null());
        assert_eq!(ObjRef::NULL.as_word(), -1);
        assert_eq!(ObjRef::from_index(3).as_word(), 3);
    }

    #[test]
    fn alloc_and_mark() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(ClassId(0), vec![1, 2]);
        let b = heap.alloc_int_array(ClassId(1), vec![7; 4]);

        heap.get_mut(a).unwrap().marked = true;
        heap.get_mut(b).unwrap().marked = true;
        assert_eq!(heap.get(b).unwrap().fields.array_len(), Some(4));

        heap.unmark_all();
        assert!(heap.live().all(|(_, ei)| !ei.marked));
    }

    #[test]
    fn pass_generations_are_fresh() {
        let mut heap = Heap::new();
        let first = heap.begin_pass();
        let second = heap.begin_pass();
        assert_ne!(first, second);
        assert_eq!(second, first + 1);
    }
}
