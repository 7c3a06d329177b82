//! Integer interval enumeration.

use crate::generator::{check_index, CgBase, Choice, ChoiceError, ChoiceGenerator, ChoiceResult};
use crate::list::IntChoiceFromList;
use rand::rngs::StdRng;
use std::cmp::Ordering;
use tracing::debug;
use vmck_kernel::Config;

/// Enumerates `min..=max` in steps of `delta` (counting down for a negative
/// delta). Bounds given in reverse are normalized; a zero delta is a fatal
/// construction error.
#[derive(Debug, Clone)]
pub struct IntIntervalGenerator {
    base: CgBase,
    min: i64,
    max: i64,
    delta: i64,
    next: i64,
}

impl IntIntervalGenerator {
    pub fn new(id: impl Into<String>, min: i64, max: i64, delta: i64) -> ChoiceResult<Self> {
        let mut cg = Self {
            base: CgBase::new(id),
            min,
            max,
            delta,
            next: 0,
        };
        cg.reset_cursor()?;
        Ok(cg)
    }

    /// Build from `<id>.min`, `<id>.max` and optional `<id>.delta`.
    pub fn from_config(config: &Config, id: &str) -> ChoiceResult<Self> {
        let min = config.int(&format!("{id}.min"))?;
        let max = config.int(&format!("{id}.max"))?;
        let delta = config.int_or(&format!("{id}.delta"), 1)?;
        debug!(id, min, max, delta, "int interval choice generator");
        Self::new(id, min, max, delta)
    }

    fn reset_cursor(&mut self) -> ChoiceResult<()> {
        self.base.done = false;

        if self.delta == 0 {
            return Err(ChoiceError::ZeroDelta {
                id: self.base.id.clone(),
            });
        }
        if self.min > self.max {
            std::mem::swap(&mut self.min, &mut self.max);
        }
        self.next = if self.delta > 0 {
            self.min - self.delta
        } else {
            self.max - self.delta
        };
        Ok(())
    }

    pub fn is_ascending(&self) -> bool {
        self.delta > 0
    }

    /// Flip the enumeration direction. Only meaningful before the first
    /// advance, since it resets the cursor.
    pub fn reverse(&mut self) {
        self.delta = -self.delta;
        // delta was validated non-zero at construction
        let _ = self.reset_cursor();
    }

    /// All choices in enumeration order.
    pub fn materialize(&self) -> Vec<i64> {
        let n = self.total_choices();
        let mut v = if self.delta > 0 { self.min } else { self.max };
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            out.push(v);
            v += self.delta;
        }
        out
    }
}

impl ChoiceGenerator for IntIntervalGenerator {
    fn base(&self) -> &CgBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CgBase {
        &mut self.base
    }

    fn next_choice(&self) -> Option<Choice> {
        if self.processed_choices() == 0 {
            None
        } else {
            Some(Choice::Int(self.next))
        }
    }

    fn choice(&self, index: u64) -> ChoiceResult<Choice> {
        check_index(index, self.total_choices())?;
        let v = if self.delta > 0 {
            self.min + index as i64 * self.delta
        } else {
            self.max + index as i64 * self.delta
        };
        Ok(Choice::Int(v))
    }

    fn advance(&mut self) {
        if self.has_more_choices() {
            self.next += self.delta;
        }
    }

    fn has_more_choices(&self) -> bool {
        // comparing `next` against the raw bound would admit one extra step
        // whenever the span is not a multiple of delta
        !self.base.done && self.processed_choices() < self.total_choices()
    }

    fn reset(&mut self) {
        // construction already validated delta and bounds
        let _ = self.reset_cursor();
    }

    fn total_choices(&self) -> u64 {
        ((self.max - self.min) / self.delta).unsigned_abs() + 1
    }

    fn processed_choices(&self) -> u64 {
        if self.delta > 0 {
            if self.next < self.min {
                0
            } else {
                ((self.next - self.min) / self.delta).unsigned_abs() + 1
            }
        } else if self.next > self.max {
            0
        } else {
            ((self.max - self.next) / self.delta).unsigned_abs() + 1
        }
    }

    fn randomize(&self, rng: &mut StdRng) -> Box<dyn ChoiceGenerator> {
        IntChoiceFromList::new(self.base.id.clone(), self.materialize()).randomize(rng)
    }

    fn supports_reordering(&self) -> bool {
        true
    }

    fn reorder(
        &self,
        comparator: &dyn Fn(&Choice, &Choice) -> Ordering,
    ) -> ChoiceResult<Box<dyn ChoiceGenerator>> {
        let mut values = self.materialize();
        values.sort_by(|a, b| comparator(&Choice::Int(*a), &Choice::Int(*b)));
        Ok(Box::new(IntChoiceFromList::new(
            self.base.id.clone(),
            values,
        )))
    }
}
