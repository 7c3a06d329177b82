//! Heap-object enumeration.

use crate::generator::{check_index, CgBase, Choice, ChoiceGenerator, ChoiceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;
use vmck_kernel::{Classes, Heap, ObjRef};

/// Enumerates the live heap objects of a named class, in allocation order.
///
/// The candidate set is snapshotted at construction. Objects allocated after
/// the decision point was created are deliberately not picked up: the
/// enumeration must stay stable across backtracks. Like the frame-resolved
/// value specs, this generator needs heap access and is therefore constructed
/// by the driver rather than through the factory registry.
#[derive(Debug, Clone)]
pub struct TypedObjectChoice {
    base: CgBase,
    values: Vec<ObjRef>,
    count: i64,
}

impl TypedObjectChoice {
    pub fn new(id: impl Into<String>, heap: &Heap, classes: &Classes, class_name: &str) -> Self {
        let base = CgBase::new(id);
        let values: Vec<ObjRef> = heap
            .live()
            .filter(|(_, ei)| classes.get(ei.class).name == class_name)
            .map(|(r, _)| r)
            .collect();
        debug!(
            id = %base.id,
            class = class_name,
            n = values.len(),
            "typed object choice generator"
        );
        Self {
            base,
            values,
            count: -1,
        }
    }

    pub fn choices(&self) -> &[ObjRef] {
        &self.values
    }
}

impl ChoiceGenerator for TypedObjectChoice {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.count >= 0 && (self.count as usize) < self.values.len() {
            Some(Choice::Object(self.values[self.count as usize]))
        } else {
            None
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.values.len() as u64)?;
        Ok(Choice::Object(self.values[index as usize]))
    }

    fn advance(&mut self) {
        if self.count < self.values.len() as i64 - 1 {
            self.count += 1;
        }
    }

    fn has_more_choices(&self) -> bool {
        !self.base.done && self.count < self.values.len() as i64 - 1
    }

    fn reset(&mut self) {
        self.count = -1;
        self.base.done = false;
    }

    fn total_choices(&self) -> u64 {
        self.values.len() as u64
    }

    fn processed_choices(&self) -> u64 {
        (self.count + 1) as u64
    }

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        let mut cg = self.clone();
        cg.values.shuffle(rng);
        cg.count = -1;
        Box::new(cg)
    }
}
