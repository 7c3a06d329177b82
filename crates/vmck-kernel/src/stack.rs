//! Call-stack frames.

use crate::class::MethodId;
use crate::heap::ObjRef;

/// One call-stack frame: slot words plus a parallel reference mask.
///
/// Slots `0..max_locals` of the owning method are locals, the rest is the
/// operand stack; the frame itself only stores the flat word array. Named
/// locals are kept for choice-value resolution from configuration specs.
#[derive(Debug, Clone)]
pub struct StackFrame {
    pub method: MethodId,
    /// Current instruction offset; `None` when unknown (e.g. a frame whose
    /// next pc was cleared by the driver mid-transition).
    pub pc: Option<u32>,
    slots: Vec<i32>,
    ref_slots: Vec<bool>,
    named_locals: Vec<(String, usize)>,
}

impl StackFrame {
    pub fn new(method: MethodId, pc: Option<u32>) -> Self {
        Self {
            method,
            pc,
            slots: Vec::new(),
            ref_slots: Vec::new(),
            named_locals: Vec::new(),
        }
    }

    /// Push a non-reference slot word.
    pub fn push_word(&mut self, value: i32) -> &mut Self {
        self.slots.push(value);
        self.ref_slots.push(false);
        self
    }

    /// Push a reference slot.
    pub fn push_ref(&mut self, r: ObjRef) -> &mut Self {
        self.slots.push(r.as_word());
        self.ref_slots.push(true);
        self
    }

    /// Push a named local (non-reference word).
    pub fn push_local(&mut self, name: impl Into<String>, value: i32) -> &mut Self {
        self.named_locals.push((name.into(), self.slots.len()));
        self.push_word(value)
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[i32] {
        &self.slots
    }

    #[inline]
    pub fn is_reference_slot(&self, i: usize) -> bool {
        self.ref_slots[i]
    }

    /// Reference value of slot `i`; meaningful only when
    /// [`is_reference_slot`](Self::is_reference_slot) holds.
    #[inline]
    pub fn ref_at(&self, i: usize) -> ObjRef {
        let w = self.slots[i];
        if w < 0 {
            ObjRef::NULL
        } else {
            ObjRef::from_index(w as usize)
        }
    }

    /// Resolve a named local or field by name, used when a choice-value spec
    /// refers to a variable instead of a literal.
    pub fn local_or_field_value(&self, name: &str) -> Option<i64> {
        self.named_locals
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, slot)| self.slots[slot] as i64)
    }
}
