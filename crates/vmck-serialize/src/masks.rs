//! Cached per-class filter bitmasks and per-method frame policies.
//!
//! Classes are immutable once loaded, so the masks are computed lazily on
//! first use and never invalidated for the process lifetime. Two masks per
//! storage area: "filtered" (word is excluded from the image) and "refs"
//! (word holds a reference that must go through reference processing).

use crate::error::TraversalError;
use crate::filter::{check_field_kind, FilterConfiguration, FramePolicy};
use ahash::AHashMap;
use std::sync::Arc;
use vmck_kernel::{ClassId, ClassInfo, MethodId, MethodInfo};

/// Immutable bitset; reads beyond the built length return false.
#[derive(Debug, Clone)]
pub struct FinalBits {
    words: Arc<[u64]>,
}

impl FinalBits {
    #[inline]
    pub fn get(&self, i: usize) -> bool {
        match self.words.get(i / 64) {
            Some(w) => (w >> (i % 64)) & 1 != 0,
            None => false,
        }
    }
}

/// Mutable builder frozen into a [`FinalBits`].
#[derive(Debug, Default)]
struct BitsBuf {
    words: Vec<u64>,
}

impl BitsBuf {
    fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn all_set(len: usize) -> Self {
        let mut b = Self::with_len(len);
        for w in &mut b.words {
            *w = u64::MAX;
        }
        b
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    fn clear(&mut self, i: usize) {
        self.words[i / 64] &= !(1 << (i % 64));
    }

    fn freeze(self) -> FinalBits {
        FinalBits {
            words: self.words.into(),
        }
    }
}

/// Lazily built mask and frame-policy caches around a filter configuration.
///
/// Read-mostly and shared across the whole run; never mutated concurrently
/// with a traversal that reads it (guaranteed by the single-pass invariant).
pub struct FilterMasks {
    filter: FilterConfiguration,
    instance_filter: AHashMap<ClassId, FinalBits>,
    instance_refs: AHashMap<ClassId, FinalBits>,
    static_filter: AHashMap<ClassId, FinalBits>,
    static_refs: AHashMap<ClassId, FinalBits>,
    frame_policies: AHashMap<MethodId, FramePolicy>,
}

impl FilterMasks {
    pub fn new(filter: FilterConfiguration) -> Self {
        Self {
            filter,
            instance_filter: AHashMap::new(),
            instance_refs: AHashMap::new(),
            static_filter: AHashMap::new(),
            static_refs: AHashMap::new(),
            frame_policies: AHashMap::new(),
        }
    }

    pub fn frame_policy(&mut self, mi: &MethodInfo) -> FramePolicy {
        if let Some(p) = self.frame_policies.get(&mi.id) {
            return *p;
        }
        let p = self.filter.frame_policy(mi);
        self.frame_policies.insert(mi.id, p);
        p
    }

    pub fn instance_filter_mask(&mut self, ci: &ClassInfo) -> Result<FinalBits, TraversalError> {
        if let Some(m) = self.instance_filter.get(&ci.id) {
            return Ok(m.clone());
        }
        let mut b = BitsBuf::all_set(ci.instance_data_size());
        for fi in self.filter.matched_instance_fields(ci) {
            check_field_kind(ci, fi)?;
            for i in fi.offset..fi.offset + fi.storage_size {
                b.clear(i);
            }
        }
        let m = b.freeze();
        self.instance_filter.insert(ci.id, m.clone());
        Ok(m)
    }

    pub fn instance_ref_mask(&mut self, ci: &ClassInfo) -> Result<FinalBits, TraversalError> {
        if let Some(m) = self.instance_refs.get(&ci.id) {
            return Ok(m.clone());
        }
        let mut b = BitsBuf::with_len(ci.instance_data_size());
        for fi in self.filter.matched_instance_fields(ci) {
            if fi.is_reference {
                b.set(fi.offset);
            }
        }
        let m = b.freeze();
        self.instance_refs.insert(ci.id, m.clone());
        Ok(m)
    }

    pub fn static_filter_mask(&mut self, ci: &ClassInfo) -> Result<FinalBits, TraversalError> {
        if let Some(m) = self.static_filter.get(&ci.id) {
            return Ok(m.clone());
        }
        let mut b = BitsBuf::all_set(ci.static_data_size());
        for fi in self.filter.matched_static_fields(ci) {
            check_field_kind(ci, fi)?;
            for i in fi.offset..fi.offset + fi.storage_size {
                b.clear(i);
            }
        }
        let m = b.freeze();
        self.static_filter.insert(ci.id, m.clone());
        Ok(m)
    }

    pub fn static_ref_mask(&mut self, ci: &ClassInfo) -> Result<FinalBits, TraversalError> {
        if let Some(m) = self.static_refs.get(&ci.id) {
            return Ok(m.clone());
        }
        let mut b = BitsBuf::with_len(ci.static_data_size());
        for fi in self.filter.matched_static_fields(ci) {
            if fi.is_reference {
                b.set(fi.offset);
            }
        }
        let m = b.freeze();
        self.static_refs.insert(ci.id, m.clone());
        Ok(m)
    }
}
